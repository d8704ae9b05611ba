//! Typo-tolerant stop lookup by name or id.

use std::cmp;

use super::{StopCatalog, StopRecord};

/// Ranks catalog stations against a free-text query.
///
/// A candidate's similarity is the best of its name and id scores, where 1.0
/// is an exact match. Candidates below `1.0 - threshold` are dropped.
#[derive(Debug, Clone)]
pub struct StopSearch {
    pub threshold: f64,
    pub min_query_chars: usize,
    pub limit: usize,
}

impl Default for StopSearch {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            min_query_chars: 3,
            limit: 5,
        }
    }
}

impl StopSearch {
    pub fn search<'a>(&self, catalog: &'a StopCatalog, query: &str) -> Vec<&'a StopRecord> {
        let needle = query.trim().to_lowercase();
        if needle.chars().count() < self.min_query_chars {
            return Vec::new();
        }

        let cutoff = 1.0 - self.threshold;
        let mut ranked: Vec<(&StopRecord, f64)> = catalog
            .stations()
            .filter_map(|(stop, name)| {
                let by_name = similarity(&needle, name);
                let by_id = score_inner(&needle, &stop.stop_id.to_lowercase());
                let best = by_name.max(by_id);
                (best >= cutoff).then_some((stop, best))
            })
            .collect();

        // stable: ties keep catalog order
        ranked.sort_by(|(_, a), (_, b)| b.total_cmp(a));
        ranked
            .into_iter()
            .take(self.limit)
            .map(|(stop, _)| stop)
            .collect()
    }
}

/// Word-by-word similarity, raised when the needle appears verbatim.
fn similarity(needle: &str, hay: &str) -> f64 {
    let tokens = score(needle, hay);
    if hay == needle {
        1.0
    } else if hay.contains(needle) {
        // a verbatim hit never outranks an exact match
        tokens.max(0.95)
    } else {
        tokens.min(0.99)
    }
}

pub(crate) fn distance(s1_in: &str, s2_in: &str) -> usize {
    if s1_in == s2_in {
        return 0;
    }

    let s1: Vec<char> = s1_in.chars().collect();
    let s2: Vec<char> = s2_in.chars().collect();

    let mut prev: Vec<usize> = (0..=s2.len()).collect();
    let mut curr = vec![0usize; s2.len() + 1];
    for (i, c1) in s1.iter().enumerate() {
        curr[0] = i + 1;
        for (j, c2) in s2.iter().enumerate() {
            let sub_cost = if c1 == c2 { 0 } else { 1 };
            curr[j + 1] = cmp::min(cmp::min(prev[j + 1] + 1, curr[j] + 1), prev[j] + sub_cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[s2.len()]
}

/// Mean per-token similarity of `needle` against the leading tokens of `hay`.
pub(crate) fn score(needle: &str, hay: &str) -> f64 {
    let needle_tokens: Vec<_> = needle.split_whitespace().collect();
    let hay_tokens: Vec<_> = hay.split_whitespace().collect();
    if needle_tokens.is_empty() {
        return 0.0;
    }

    let total: f64 = needle_tokens
        .iter()
        .zip(&hay_tokens)
        .map(|(n, h)| score_inner(n, h))
        .sum();
    total / needle_tokens.len() as f64
}

fn score_inner(s1: &str, s2: &str) -> f64 {
    let dist = distance(s1, s2);
    if dist == 0 {
        1.0
    } else {
        1.0 - (dist as f64 / cmp::max(s1.chars().count(), s2.chars().count()) as f64)
    }
}
