//! Name search over the cached resident list.
//!
//! Ranking: prefix matches first, then substring matches, then fuzzy
//! matches above [`MIN_SIMILARITY`]. Ties keep cache order.

use strsim::{jaro_winkler, normalized_levenshtein};

use super::ResidentService;
use crate::models::Resident;
use crate::store::{BlobStore, DocumentStore};

/// Minimum fuzzy similarity for a non-substring match.
pub const MIN_SIMILARITY: f64 = 0.75;

impl<D: DocumentStore, B: BlobStore> ResidentService<D, B> {
    /// Search cached residents by full name. An empty query returns the first
    /// `limit` cached residents.
    pub fn search_residents(&self, query: &str, limit: usize) -> Vec<Resident> {
        let query = query.trim().to_lowercase();
        let residents = self.residents();

        if query.is_empty() {
            return residents.into_iter().take(limit).collect();
        }

        let mut scored: Vec<(f64, Resident)> = residents
            .into_iter()
            .filter_map(|r| {
                let score = name_score(&query, &r.full_name.to_lowercase());
                (score >= MIN_SIMILARITY).then_some((score, r))
            })
            .collect();

        // Stable sort keeps cache order among equal scores
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(limit).map(|(_, r)| r).collect()
    }
}

/// Score a lowercase query against a lowercase name.
fn name_score(query: &str, name: &str) -> f64 {
    if name.starts_with(query) || name.split_whitespace().any(|w| w.starts_with(query)) {
        return 3.0;
    }
    if name.contains(query) {
        return 2.0;
    }
    fuzzy_match(query, name)
}

/// Compute fuzzy string similarity using combined metrics.
fn fuzzy_match(a: &str, b: &str) -> f64 {
    // Jaro-Winkler favours shared prefixes, Levenshtein overall shape
    let jw = jaro_winkler(a, b);
    let lev = normalized_levenshtein(a, b);
    jw * 0.6 + lev * 0.4
}
