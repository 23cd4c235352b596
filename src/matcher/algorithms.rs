use crate::error::Result;
use crate::config::subsystems::matcher::SimilarityMetric;

/// Normalized string similarity applied to one field's value from two records.
/// Scores are in `[0, 1]` with `1.0` meaning identical; implementations are
/// expected to be symmetric.
pub trait FieldSimilarity: Send + Sync {
    fn similarity(&self, source: &str, target: &str) -> Result<f64>;
}

impl<F> FieldSimilarity for F
where
    F: Fn(&str, &str) -> Result<f64> + Send + Sync,
{
    fn similarity(&self, source: &str, target: &str) -> Result<f64> {
        self(source, target)
    }
}

/// Indel ratio: `(len1 + len2 - indel_distance) / (len1 + len2)`, where
/// the indel distance only counts insertions and deletions. Equivalent to
/// `2 * lcs / (len1 + len2)`.
pub struct RatioSimilarity;

impl RatioSimilarity {
    pub fn new() -> Self {
        Self
    }

    fn longest_common_subsequence(source: &[char], target: &[char]) -> usize {
        // Two rolling rows instead of the full table
        let mut previous = vec![0usize; target.len() + 1];
        let mut current = vec![0usize; target.len() + 1];

        for s in source {
            for (j, t) in target.iter().enumerate() {
                current[j + 1] = if s == t {
                    previous[j] + 1
                } else {
                    previous[j + 1].max(current[j])
                };
            }
            std::mem::swap(&mut previous, &mut current);
        }

        previous[target.len()]
    }
}

impl Default for RatioSimilarity {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldSimilarity for RatioSimilarity {
    fn similarity(&self, source: &str, target: &str) -> Result<f64> {
        let source_chars: Vec<char> = source.chars().collect();
        let target_chars: Vec<char> = target.chars().collect();

        let total = source_chars.len() + target_chars.len();
        if total == 0 {
            return Ok(1.0);
        }

        let lcs = Self::longest_common_subsequence(&source_chars, &target_chars);
        Ok(2.0 * lcs as f64 / total as f64)
    }
}

/// `1 - levenshtein / max_len`
pub struct LevenshteinSimilarity;

impl FieldSimilarity for LevenshteinSimilarity {
    #[inline]
    fn similarity(&self, source: &str, target: &str) -> Result<f64> {
        Ok(strsim::normalized_levenshtein(source, target))
    }
}

pub struct JaroWinklerSimilarity;

impl FieldSimilarity for JaroWinklerSimilarity {
    #[inline]
    fn similarity(&self, source: &str, target: &str) -> Result<f64> {
        Ok(strsim::jaro_winkler(source, target))
    }
}

/// Bigram overlap
pub struct SorensenDiceSimilarity;

impl FieldSimilarity for SorensenDiceSimilarity {
    #[inline]
    fn similarity(&self, source: &str, target: &str) -> Result<f64> {
        Ok(strsim::sorensen_dice(source, target))
    }
}

pub struct ExactSimilarity;

impl FieldSimilarity for ExactSimilarity {
    #[inline]
    fn similarity(&self, source: &str, target: &str) -> Result<f64> {
        Ok(if source == target { 1.0 } else { 0.0 })
    }
}

pub struct SimilarityAlgorithmFactory;

impl SimilarityAlgorithmFactory {
    pub fn create(metric: SimilarityMetric) -> Box<dyn FieldSimilarity> {
        match metric {
            SimilarityMetric::Ratio => Box::new(RatioSimilarity::new()),
            SimilarityMetric::Levenshtein => Box::new(LevenshteinSimilarity),
            SimilarityMetric::JaroWinkler => Box::new(JaroWinklerSimilarity),
            SimilarityMetric::SorensenDice => Box::new(SorensenDiceSimilarity),
            SimilarityMetric::Exact => Box::new(ExactSimilarity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRICS: [SimilarityMetric; 5] = [
        SimilarityMetric::Ratio,
        SimilarityMetric::Levenshtein,
        SimilarityMetric::JaroWinkler,
        SimilarityMetric::SorensenDice,
        SimilarityMetric::Exact,
    ];

    #[test]
    fn test_ratio_known_values() {
        let ratio = RatioSimilarity::new();
        assert_eq!(ratio.similarity("foo", "foo").unwrap(), 1.0);
        assert_eq!(ratio.similarity("abc", "xyz").unwrap(), 0.0);
        // lcs("kitten", "sitting") = 4 -> 8 / 13
        let sim = ratio.similarity("kitten", "sitting").unwrap();
        assert!((sim - 8.0 / 13.0).abs() < 1e-12);
        assert_eq!(ratio.similarity("", "").unwrap(), 1.0);
        assert_eq!(ratio.similarity("abc", "").unwrap(), 0.0);
    }

    #[test]
    fn test_ratio_counts_chars_not_bytes() {
        let ratio = RatioSimilarity::new();
        // lcs("Müller", "Muller") = 5 over twelve chars
        let sim = ratio.similarity("Müller", "Muller").unwrap();
        assert!((sim - 10.0 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_metrics_identity_and_range() {
        for metric in ALL_METRICS {
            let algorithm = SimilarityAlgorithmFactory::create(metric);
            assert_eq!(algorithm.similarity("SUBJ_003", "SUBJ_003").unwrap(), 1.0, "{:?}", metric);

            let sim = algorithm.similarity("SUBJ_003", "CONTROL_17").unwrap();
            assert!((0.0..=1.0).contains(&sim), "{:?} gave {}", metric, sim);
        }
    }

    #[test]
    fn test_edit_metrics_symmetric() {
        let pairs = [("T1_MPRAGE", "T2_FLAIR"), ("19800101", "19800110"), ("M", "F")];
        let metrics = [
            SimilarityMetric::Ratio,
            SimilarityMetric::Levenshtein,
            SimilarityMetric::SorensenDice,
            SimilarityMetric::Exact,
        ];
        for metric in metrics {
            let algorithm = SimilarityAlgorithmFactory::create(metric);
            for (a, b) in pairs {
                assert_eq!(
                    algorithm.similarity(a, b).unwrap(),
                    algorithm.similarity(b, a).unwrap(),
                    "{:?} not symmetric on {} / {}", metric, a, b
                );
            }
        }
    }

    #[test]
    fn test_closure_as_similarity() {
        let first_char = |a: &str, b: &str| -> Result<f64> {
            Ok(if a.chars().next() == b.chars().next() { 1.0 } else { 0.5 })
        };
        assert_eq!(first_char.similarity("abc", "axe").unwrap(), 1.0);
        assert_eq!(first_char.similarity("abc", "xyz").unwrap(), 0.5);
    }
}
