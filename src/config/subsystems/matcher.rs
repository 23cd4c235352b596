// src/config/subsystems/matcher.rs

use serde::{Serialize, Deserialize};
use crate::error::{Error, Result};
use crate::config::FromIni;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimilarityMetric {
    /// Indel ratio: `1 - indel_distance / (len1 + len2)`
    Ratio,
    Levenshtein,
    JaroWinkler,
    SorensenDice,
    Exact,
}

impl SimilarityMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMetric::Ratio => "ratio",
            SimilarityMetric::Levenshtein => "levenshtein",
            SimilarityMetric::JaroWinkler => "jaro_winkler",
            SimilarityMetric::SorensenDice => "sorensen_dice",
            SimilarityMetric::Exact => "exact",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim_matches('"').to_lowercase().as_str() {
            "ratio" => Some(Self::Ratio),
            "levenshtein" => Some(Self::Levenshtein),
            "jaro_winkler" | "jarowinkler" => Some(Self::JaroWinkler),
            "sorensen_dice" | "dice" => Some(Self::SorensenDice),
            "exact" => Some(Self::Exact),
            _ => None,
        }
    }
}

impl Default for SimilarityMetric {
    fn default() -> Self {
        Self::Ratio
    }
}

/// What a field with similarity exactly 0 contributes to a distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZeroSimilarityPolicy {
    /// Contributes nothing, like an empty field.
    Skip,
    /// Contributes `weight * zero_similarity_penalty`.
    Penalize,
}

impl ZeroSimilarityPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZeroSimilarityPolicy::Skip => "skip",
            ZeroSimilarityPolicy::Penalize => "penalize",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim_matches('"').to_lowercase().as_str() {
            "skip" => Some(Self::Skip),
            "penalize" | "penalise" => Some(Self::Penalize),
            _ => None,
        }
    }
}

impl Default for ZeroSimilarityPolicy {
    fn default() -> Self {
        Self::Skip
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    pub similarity_metric: SimilarityMetric,
    pub zero_similarity: ZeroSimilarityPolicy,
    // Inverse similarity charged for a zero-similarity field under Penalize
    pub zero_similarity_penalty: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            similarity_metric: SimilarityMetric::default(),
            zero_similarity: ZeroSimilarityPolicy::default(),
            zero_similarity_penalty: 100.0,
        }
    }
}

impl FromIni for MatcherConfig {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        if section_name != "matcher" {
            return None;
        }

        match key {
            "similarity_metric" => {
                self.similarity_metric = match SimilarityMetric::from_str(value) {
                    Some(metric) => metric,
                    None => return Some(Err(Error::Config(
                        format!("Invalid similarity metric: {}", value)
                    ))),
                };
                Some(Ok(()))
            },
            "zero_similarity" => {
                self.zero_similarity = match ZeroSimilarityPolicy::from_str(value) {
                    Some(policy) => policy,
                    None => return Some(Err(Error::Config(
                        format!("Invalid zero_similarity (must be 'skip' or 'penalize'): {}", value)
                    ))),
                };
                Some(Ok(()))
            },
            "zero_similarity_penalty" => {
                match value.parse::<f64>() {
                    Ok(penalty) if penalty.is_finite() && penalty >= 1.0 => {
                        self.zero_similarity_penalty = penalty;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid zero_similarity_penalty (must be >= 1): {}", value)
                    ))),
                }
            },
            _ => None,
        }
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.zero_similarity_penalty.is_finite() || self.zero_similarity_penalty < 1.0 {
            return Err(Error::Config(
                "zero_similarity_penalty must be finite and >= 1".to_string()
            ));
        }
        Ok(())
    }
}
