use crate::error::EngineResult;
use crate::models::{ContentItem, MediaType};

pub mod tmdb;

pub use tmdb::TmdbCatalog;

/// Upstream content catalog abstraction
///
/// The pool loader asks for three independent content sets and treats the
/// wire-level query format (AND vs OR genre combination, sort order, paging)
/// as entirely the provider's concern.
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    /// Items containing every requested genre
    async fn fetch_all_genre_matches(
        &self,
        media_type: MediaType,
        genre_ids: &[u32],
        page_budget: u32,
    ) -> EngineResult<Vec<ContentItem>>;

    /// Items containing at least one requested genre
    async fn fetch_any_genre_matches(
        &self,
        media_type: MediaType,
        genre_ids: &[u32],
        page_budget: u32,
    ) -> EngineResult<Vec<ContentItem>>;

    /// Popular items with no genre constraint
    async fn fetch_popular(
        &self,
        media_type: MediaType,
        page_budget: u32,
    ) -> EngineResult<Vec<ContentItem>>;
}
