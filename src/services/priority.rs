use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::{ContentItem, PoolEntry};

/// Bounded size of every room's candidate pool
pub const CONTENT_POOL_SIZE: usize = 30;

/// The three raw content sets a pool is built from, in priority order.
///
/// `all_genres` holds items matching every requested genre, `any_genre`
/// items matching at least one (minus the first set), `popular` the
/// unconstrained fallback (minus both). When no genres are requested the
/// first two sets are empty and `popular` is the sole tier.
#[derive(Debug, Default, Clone)]
pub struct RawTiers {
    pub all_genres: Vec<ContentItem>,
    pub any_genre: Vec<ContentItem>,
    pub popular: Vec<ContentItem>,
}

impl RawTiers {
    /// Enforces tier disjointness: an item classified in a higher tier never
    /// reappears in a lower one, whatever the catalog returned.
    pub fn deduplicated(self) -> Self {
        let mut seen: HashSet<String> = HashSet::new();
        let keep = |seen: &mut HashSet<String>, items: Vec<ContentItem>| -> Vec<ContentItem> {
            items
                .into_iter()
                .filter(|item| seen.insert(item.id.clone()))
                .collect()
        };

        let all_genres = keep(&mut seen, self.all_genres);
        let any_genre = keep(&mut seen, self.any_genre);
        let popular = keep(&mut seen, self.popular);
        Self {
            all_genres,
            any_genre,
            popular,
        }
    }
}

/// Builds a ranked, intra-tier-shuffled pool of at most `size` items.
///
/// Pure in-memory transform: excluded ids are dropped, each tier is shuffled
/// independently with the caller's random source, tiers are concatenated in
/// priority order, and sequence indices are assigned after truncation. Empty
/// tiers are skipped; fewer than `size` available items is not an error.
pub fn build_pool<R>(
    tiers: RawTiers,
    exclude: &HashSet<String>,
    size: usize,
    rng: &mut R,
) -> Vec<PoolEntry>
where
    R: Rng + ?Sized,
{
    let tiers = tiers.deduplicated();
    let mut ranked: Vec<(u8, ContentItem)> = Vec::new();

    for (tier, items) in [
        (1u8, tiers.all_genres),
        (2u8, tiers.any_genre),
        (3u8, tiers.popular),
    ] {
        let mut kept: Vec<ContentItem> = items
            .into_iter()
            .filter(|item| !exclude.contains(&item.id))
            .collect();
        kept.shuffle(rng);
        ranked.extend(kept.into_iter().map(|item| (tier, item)));
    }

    ranked.truncate(size);
    ranked
        .into_iter()
        .enumerate()
        .map(|(sequence_index, (priority_tier, item))| PoolEntry {
            item,
            priority_tier,
            sequence_index,
        })
        .collect()
}
