//! TMDB catalog provider.
//!
//! Genre-constrained sets come from `/discover` sorted by popularity:
//! `with_genres` ids joined with `,` mean AND, joined with `|` mean OR. The
//! popular fallback uses the plain `/popular` listing. Responses are paged;
//! the caller's page budget bounds how many pages are pulled per set.

use reqwest::Client as HttpClient;
use serde::Deserialize;

use crate::error::{EngineError, EngineResult};
use crate::models::{ContentItem, MediaType};

use super::CatalogClient;

#[derive(Clone)]
pub struct TmdbCatalog {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
}

/// One page of TMDB results
#[derive(Debug, Deserialize)]
struct TmdbPage {
    page: u32,
    total_pages: u32,
    results: Vec<TmdbEntry>,
}

/// Raw TMDB row; movies use `title`/`release_date`, TV uses
/// `name`/`first_air_date`.
#[derive(Debug, Deserialize)]
struct TmdbEntry {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    genre_ids: Vec<u32>,
    #[serde(default)]
    vote_average: f64,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    first_air_date: Option<String>,
}

impl TmdbEntry {
    /// Normalizes a raw row, dropping entries without a usable title
    fn into_content_item(self) -> Option<ContentItem> {
        let title = self.title.or(self.name).filter(|t| !t.trim().is_empty())?;
        let release_date = self
            .release_date
            .or(self.first_air_date)
            .filter(|d| !d.is_empty());

        Some(ContentItem {
            id: self.id.to_string(),
            title,
            poster_path: self.poster_path,
            overview: self.overview.unwrap_or_default(),
            genre_ids: self.genre_ids,
            rating: self.vote_average.clamp(0.0, 10.0),
            release_date,
        })
    }
}

impl TmdbCatalog {
    pub fn new(api_key: String, api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url,
        }
    }

    async fn fetch_page(&self, path: &str, query: &[(&str, String)]) -> EngineResult<TmdbPage> {
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::UpstreamUnavailable(format!(
                "TMDB returned status {}: {}",
                status, body
            )));
        }

        let page: TmdbPage = response.json().await?;
        Ok(page)
    }

    /// Pulls up to `page_budget` pages, stopping early when the catalog runs
    /// out of pages.
    async fn fetch_paged(
        &self,
        path: &str,
        base_query: &[(&str, String)],
        page_budget: u32,
    ) -> EngineResult<Vec<ContentItem>> {
        let mut items = Vec::new();

        for page_number in 1..=page_budget.max(1) {
            let mut query = base_query.to_vec();
            query.push(("page", page_number.to_string()));

            let page = self.fetch_page(path, &query).await?;
            items.extend(page.results.into_iter().filter_map(TmdbEntry::into_content_item));

            if page.page >= page.total_pages {
                break;
            }
        }

        tracing::debug!(path = %path, items = items.len(), "Catalog fetch completed");
        Ok(items)
    }

    fn discover_path(media_type: MediaType) -> String {
        format!("/discover/{}", media_type)
    }
}

#[async_trait::async_trait]
impl CatalogClient for TmdbCatalog {
    async fn fetch_all_genre_matches(
        &self,
        media_type: MediaType,
        genre_ids: &[u32],
        page_budget: u32,
    ) -> EngineResult<Vec<ContentItem>> {
        if genre_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = vec![
            ("with_genres", join_genres(genre_ids, ",")),
            ("sort_by", "popularity.desc".to_string()),
        ];
        self.fetch_paged(&Self::discover_path(media_type), &query, page_budget)
            .await
    }

    async fn fetch_any_genre_matches(
        &self,
        media_type: MediaType,
        genre_ids: &[u32],
        page_budget: u32,
    ) -> EngineResult<Vec<ContentItem>> {
        if genre_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = vec![
            ("with_genres", join_genres(genre_ids, "|")),
            ("sort_by", "popularity.desc".to_string()),
        ];
        self.fetch_paged(&Self::discover_path(media_type), &query, page_budget)
            .await
    }

    async fn fetch_popular(
        &self,
        media_type: MediaType,
        page_budget: u32,
    ) -> EngineResult<Vec<ContentItem>> {
        self.fetch_paged(&format!("/{}/popular", media_type), &[], page_budget)
            .await
    }
}

fn join_genres(genre_ids: &[u32], separator: &str) -> String {
    genre_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}
