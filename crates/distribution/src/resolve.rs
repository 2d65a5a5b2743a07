//! Approximate matching of free-text region labels to canonical names.
//!
//! Scores are in `[0, 1]`: the indel similarity `2·LCS / (|a| + |b|)` of the
//! normalized strings, or of their token-sorted forms when that is higher
//! (so "Region North" still matches "North Region"). Normalization lowercases
//! and turns every non-alphanumeric run into a single space.

use log::{debug, warn};

use crate::error::DistributionError;

/// Best scores under this are logged as suspicious when no minimum is configured.
pub const LOW_CONFIDENCE: f64 = 0.6;

/// A label resolved to a canonical region.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub label: String,
    pub name: String,
    pub id: String,
    pub score: f64,
}

/// Resolves labels against canonical `(name, id)` pairs.
#[derive(Debug, Clone)]
pub struct LabelResolver {
    candidates: Vec<(String, String)>,
    normalized: Vec<(Vec<char>, Vec<char>)>,
    min_similarity: Option<f64>,
}

impl LabelResolver {
    pub fn new(candidates: Vec<(String, String)>) -> Self {
        let normalized = candidates
            .iter()
            .map(|(name, _)| prepare(name))
            .collect();
        Self {
            candidates,
            normalized,
            min_similarity: None,
        }
    }

    /// Reject best matches scoring below `min`. Without it every label resolves.
    pub fn with_min_similarity(mut self, min: Option<f64>) -> Self {
        self.min_similarity = min;
        self
    }

    /// Pick the single highest-scoring candidate; ties keep the earliest one.
    pub fn resolve(&self, label: &str) -> Result<Resolution, DistributionError> {
        let (plain, sorted) = prepare(label);

        let mut best: Option<(usize, f64)> = None;
        for (i, (cand_plain, cand_sorted)) in self.normalized.iter().enumerate() {
            let score = indel_ratio(&plain, cand_plain).max(indel_ratio(&sorted, cand_sorted));
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }

        let min_similarity = self.min_similarity.unwrap_or(0.0);
        let Some((idx, score)) = best else {
            return Err(DistributionError::AmbiguousMatch {
                label: label.to_string(),
                best: None,
                score: 0.0,
                min_similarity,
            });
        };
        let (name, id) = &self.candidates[idx];

        match self.min_similarity {
            Some(min) if score < min => {
                return Err(DistributionError::AmbiguousMatch {
                    label: label.to_string(),
                    best: Some(name.clone()),
                    score,
                    min_similarity: min,
                });
            }
            None if score < LOW_CONFIDENCE => {
                warn!("label '{label}' resolved to '{name}' with low similarity {score:.3}");
            }
            _ => debug!("label '{label}' -> '{name}' ({id}), score {score:.3}"),
        }

        Ok(Resolution {
            label: label.to_string(),
            name: name.clone(),
            id: id.clone(),
            score,
        })
    }
}

/// Similarity of two strings in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let (a_plain, a_sorted) = prepare(a);
    let (b_plain, b_sorted) = prepare(b);
    indel_ratio(&a_plain, &b_plain).max(indel_ratio(&a_sorted, &b_sorted))
}

fn prepare(s: &str) -> (Vec<char>, Vec<char>) {
    let lowered = s.to_lowercase();
    let mut tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let plain: Vec<char> = tokens.join(" ").chars().collect();
    tokens.sort_unstable();
    let sorted: Vec<char> = tokens.join(" ").chars().collect();
    (plain, sorted)
}

fn indel_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * lcs_len(a, b) as f64 / total as f64
}

/// Longest common subsequence length, two-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}
