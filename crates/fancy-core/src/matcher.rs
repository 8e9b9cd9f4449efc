// ── Fuzzy configuration matcher ──
//
// Ranks the backend's configs list against the computer model so the user
// is offered the most plausible fan configurations first.

use serde::Serialize;

use crate::model::ConfigInfo;

/// Entries must score strictly above this to be kept.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.5;

/// A config kept by the matcher, with its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigMatch {
    pub config: ConfigInfo,
    pub score: f64,
}

/// Similarity of `query` to `name`.
///
/// Each whitespace-separated query token contributes its best match among
/// the name tokens: the length of the shared case-insensitive prefix over
/// the length of the longer token. Identical strings score the number of
/// query tokens; strings without a shared prefix score zero.
pub fn similarity(query: &str, name: &str) -> f64 {
    let name_tokens: Vec<Vec<char>> = name.split_whitespace().map(lowercase).collect();
    query
        .split_whitespace()
        .map(lowercase)
        .map(|q| {
            name_tokens
                .iter()
                .map(|n| token_similarity(&q, n))
                .fold(0.0, f64::max)
        })
        .sum()
}

fn lowercase(token: &str) -> Vec<char> {
    token.chars().flat_map(char::to_lowercase).collect()
}

fn token_similarity(a: &[char], b: &[char]) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 0.0;
    }
    let shared = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    count_f64(shared) / count_f64(longest)
}

fn count_f64(n: usize) -> f64 {
    f64::from(u32::try_from(n).unwrap_or(u32::MAX))
}

/// Ranks configs against a model name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigMatcher {
    threshold: f64,
}

impl Default for ConfigMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl ConfigMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Configs scoring above the threshold, best first. Ties keep their
    /// order from `configs`.
    pub fn rank(&self, query: &str, configs: &[ConfigInfo]) -> Vec<ConfigMatch> {
        let mut matches: Vec<ConfigMatch> = configs
            .iter()
            .filter_map(|config| {
                let score = similarity(query, config.display_name());
                (score > self.threshold).then(|| ConfigMatch {
                    config: config.clone(),
                    score,
                })
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches
    }
}
