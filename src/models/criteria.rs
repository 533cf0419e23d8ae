use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Maximum number of genres a room filter may select
pub const MAX_GENRES_PER_FILTER: usize = 3;

/// TMDB genre ids the catalog understands
const KNOWN_GENRE_IDS: &[u32] = &[
    28,    // Action
    12,    // Adventure
    16,    // Animation
    35,    // Comedy
    80,    // Crime
    99,    // Documentary
    18,    // Drama
    10751, // Family
    14,    // Fantasy
    36,    // History
    27,    // Horror
    10402, // Music
    9648,  // Mystery
    10749, // Romance
    878,   // Science Fiction
    53,    // Thriller
    10752, // War
    37,    // Western
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Movie => write!(f, "movie"),
            MediaType::Tv => write!(f, "tv"),
        }
    }
}

/// Filter criteria a host selects for a room
///
/// The canonical form (sorted, deduplicated genre ids) is the basis of the
/// cache key, so two callers passing the same genres in different order hit
/// the same cached pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub media_type: MediaType,
    pub genre_ids: Vec<u32>,
    pub room_id: String,
}

impl FilterCriteria {
    /// Validates and canonicalizes criteria at the boundary
    pub fn new(
        media_type: MediaType,
        genre_ids: Vec<u32>,
        room_id: impl Into<String>,
    ) -> EngineResult<Self> {
        let room_id = room_id.into();
        if room_id.trim().is_empty() {
            return Err(EngineError::Validation("room id must not be empty".into()));
        }

        let mut genre_ids = genre_ids;
        genre_ids.sort_unstable();
        genre_ids.dedup();

        if genre_ids.len() > MAX_GENRES_PER_FILTER {
            return Err(EngineError::Validation(format!(
                "at most {} genres may be selected, got {}",
                MAX_GENRES_PER_FILTER,
                genre_ids.len()
            )));
        }
        if let Some(unknown) = genre_ids.iter().find(|id| !KNOWN_GENRE_IDS.contains(id)) {
            return Err(EngineError::Validation(format!(
                "unknown genre id {}",
                unknown
            )));
        }

        Ok(Self {
            media_type,
            genre_ids,
            room_id,
        })
    }

    /// Order-independent genre portion of the cache key
    ///
    /// Sorts and deduplicates independently of the constructor so the key is
    /// canonical even for hand-built values.
    pub fn genre_key(&self) -> String {
        let mut ids = self.genre_ids.clone();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            "any".to_string()
        } else {
            ids.iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join("-")
        }
    }
}
