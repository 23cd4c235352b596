use std::sync::Arc;
use log::{debug, warn};

use crate::config::ClusterConfig;
use crate::config::subsystems::{FieldWeights, MatcherConfig, ZeroSimilarityPolicy};
use crate::error::{Error, Result};
use crate::types::{Distance, Equivalence, Record};
use super::algorithms::{FieldSimilarity, SimilarityAlgorithmFactory};
use super::metrics::ComparisonMetrics;

/// Weighted multi-field distance between two records.
///
/// Each weighted field whose value is non-empty in both records adds
/// `weight / similarity`; the sum is divided by the number of fields and by
/// the total weight. Lower means more alike. Identical records score the
/// mean weight share rather than zero.
pub struct RecordDistance {
    weights: FieldWeights,
    similarity: Box<dyn FieldSimilarity>,
    zero_similarity: ZeroSimilarityPolicy,
    zero_similarity_penalty: f64,
    inv_sum_weights: f64,
    metrics: Option<Arc<ComparisonMetrics>>,
}

impl RecordDistance {
    pub fn new(weights: FieldWeights, config: &MatcherConfig) -> Result<Self> {
        config.validate()?;
        let similarity = SimilarityAlgorithmFactory::create(config.similarity_metric);
        let mut distance = Self::with_similarity(weights, similarity)?;
        distance.zero_similarity = config.zero_similarity;
        distance.zero_similarity_penalty = config.zero_similarity_penalty;

        debug!(
            "Record distance over {} fields using {} similarity, zero similarity: {}",
            distance.weights.len(),
            config.similarity_metric.as_str(),
            config.zero_similarity.as_str()
        );
        Ok(distance)
    }

    pub fn from_config(config: &ClusterConfig) -> Result<Self> {
        Self::new(config.fields.clone(), &config.matcher)
    }

    /// Use a caller-supplied similarity function with the default zero-similarity policy.
    pub fn with_similarity(weights: FieldWeights, similarity: Box<dyn FieldSimilarity>) -> Result<Self> {
        weights.validate()?;
        let defaults = MatcherConfig::default();
        let inv_sum_weights = 1.0 / weights.total_weight();

        Ok(Self {
            weights,
            similarity,
            zero_similarity: defaults.zero_similarity,
            zero_similarity_penalty: defaults.zero_similarity_penalty,
            inv_sum_weights,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<ComparisonMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn weights(&self) -> &FieldWeights {
        &self.weights
    }

    /// Distance between two records, `Unknown` if either is absent or
    /// scoring fails. Never returns an error.
    pub fn distance<R: Record + ?Sized>(&self, left: Option<&R>, right: Option<&R>) -> Distance {
        let (left, right) = match (left, right) {
            (Some(l), Some(r)) => (l, r),
            _ => {
                if let Some(metrics) = &self.metrics {
                    metrics.increment_unknown();
                }
                return Distance::Unknown;
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.increment_comparisons();
        }

        match self.try_distance(left, right) {
            Ok(value) => Distance::Value(value),
            Err(e) => {
                warn!("Error calculating distance between {} and {}: {}", left.id(), right.id(), e);
                if let Some(metrics) = &self.metrics {
                    metrics.increment_failures();
                }
                Distance::Unknown
            }
        }
    }

    fn try_distance<R: Record + ?Sized>(&self, left: &R, right: &R) -> Result<f64> {
        let mut dist = 0.0;

        for (field_name, weight) in self.weights.iter() {
            let str1 = left.field_value(field_name)?;
            let str2 = right.field_value(field_name)?;

            // Missing data neither rewards nor penalizes
            if str1.is_empty() || str2.is_empty() {
                continue;
            }

            let simil = self.similarity.similarity(&str1, &str2)?;
            if !(0.0..=1.0).contains(&simil) {
                return Err(Error::similarity(
                    format!("Similarity for field {} out of range: {}", field_name, simil)
                ));
            }

            if simil > 0.0 {
                dist += weight / simil;
            } else if self.zero_similarity == ZeroSimilarityPolicy::Penalize {
                dist += weight * self.zero_similarity_penalty;
            }
        }

        Ok(dist / self.weights.len() as f64 * self.inv_sum_weights)
    }
}

/// All-or-nothing comparator: equivalent iff every weighted field matches
/// exactly as a string, with absent fields read as `""`.
pub struct ExactEquivalence {
    weights: FieldWeights,
    metrics: Option<Arc<ComparisonMetrics>>,
}

impl ExactEquivalence {
    pub fn new(weights: FieldWeights) -> Result<Self> {
        weights.validate()?;
        Ok(Self { weights, metrics: None })
    }

    pub fn from_config(config: &ClusterConfig) -> Result<Self> {
        Self::new(config.fields.clone())
    }

    pub fn with_metrics(mut self, metrics: Arc<ComparisonMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn weights(&self) -> &FieldWeights {
        &self.weights
    }

    pub fn equivalence<R: Record + ?Sized>(&self, left: Option<&R>, right: Option<&R>) -> Equivalence {
        let (left, right) = match (left, right) {
            (Some(l), Some(r)) => (l, r),
            _ => {
                if let Some(metrics) = &self.metrics {
                    metrics.increment_unknown();
                }
                return Equivalence::Unknown;
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.increment_comparisons();
        }

        match self.try_equivalent(left, right) {
            Ok(true) => Equivalence::Equivalent,
            Ok(false) => Equivalence::NotEquivalent,
            Err(e) => {
                warn!("Error comparing {} and {}: {}", left.id(), right.id(), e);
                if let Some(metrics) = &self.metrics {
                    metrics.increment_failures();
                }
                Equivalence::Unknown
            }
        }
    }

    fn try_equivalent<R: Record + ?Sized>(&self, left: &R, right: &R) -> Result<bool> {
        for field_name in self.weights.names() {
            if left.field_value(field_name)? != right.field_value(field_name)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// The current left/right records of a comparison. Loops fix the left slot
/// once per anchor and move the right slot across candidates.
pub struct PairSlots<'a, R: ?Sized> {
    left: Option<&'a R>,
    right: Option<&'a R>,
}

impl<'a, R: Record + ?Sized> PairSlots<'a, R> {
    pub fn new() -> Self {
        Self { left: None, right: None }
    }

    pub fn fit(&mut self, left: &'a R, right: &'a R) {
        self.left = Some(left);
        self.right = Some(right);
    }

    pub fn set_left(&mut self, record: &'a R) {
        self.left = Some(record);
    }

    pub fn set_right(&mut self, record: &'a R) {
        self.right = Some(record);
    }

    pub fn clear(&mut self) {
        self.left = None;
        self.right = None;
    }

    pub fn distance(&self, measure: &RecordDistance) -> Distance {
        measure.distance(self.left, self.right)
    }

    pub fn equivalence(&self, comparator: &ExactEquivalence) -> Equivalence {
        comparator.equivalence(self.left, self.right)
    }
}

impl<'a, R: Record + ?Sized> Default for PairSlots<'a, R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::subsystems::SimilarityMetric;
    use crate::types::DicomHeader;
    use serde_json::json;

    fn weights_ab() -> FieldWeights {
        FieldWeights::new(vec![("A", 1.0), ("B", 1.0)]).unwrap()
    }

    fn header(path: &str, a: &str, b: &str) -> DicomHeader {
        DicomHeader::new(path).with_field("A", a).with_field("B", b)
    }

    #[test]
    fn test_empty_field_is_skipped() {
        let distance = RecordDistance::new(weights_ab(), &MatcherConfig::default()).unwrap();
        let x = header("x.dcm", "foo", "");
        let y = header("y.dcm", "foo", "bar");

        // only A contributes: (1 / 1.0) / 2 fields * 1 / 2 total weight
        assert_eq!(distance.distance(Some(&x), Some(&y)), Distance::Value(0.25));
    }

    #[test]
    fn test_identical_records_score_mean_weight_share() {
        let distance = RecordDistance::new(weights_ab(), &MatcherConfig::default()).unwrap();
        let x = header("x.dcm", "foo", "bar");
        let y = header("y.dcm", "foo", "bar");

        assert_eq!(distance.distance(Some(&x), Some(&y)), Distance::Value(0.5));
    }

    #[test]
    fn test_absent_record_is_unknown() {
        let distance = RecordDistance::new(weights_ab(), &MatcherConfig::default()).unwrap();
        let equivalence = ExactEquivalence::new(weights_ab()).unwrap();
        let x = header("x.dcm", "foo", "bar");

        assert_eq!(distance.distance(Some(&x), None), Distance::Unknown);
        assert_eq!(distance.distance::<DicomHeader>(None, None), Distance::Unknown);
        assert_eq!(equivalence.equivalence(None, Some(&x)), Equivalence::Unknown);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let distance = RecordDistance::new(weights_ab(), &MatcherConfig::default()).unwrap();
        let x = header("x.dcm", "SUBJ_001", "T1_MPRAGE");
        let y = header("y.dcm", "SUBJ_010", "T1_MPRAGE_ND");

        assert_eq!(
            distance.distance(Some(&x), Some(&y)),
            distance.distance(Some(&y), Some(&x))
        );
    }

    #[test]
    fn test_mismatch_increases_distance() {
        let distance = RecordDistance::new(weights_ab(), &MatcherConfig::default()).unwrap();
        let x = header("x.dcm", "SUBJ_001", "T1_MPRAGE");
        let same = header("same.dcm", "SUBJ_001", "T1_MPRAGE");
        let close = header("close.dcm", "SUBJ_001", "T1_MPRAGE_ND");

        let identical = distance.distance(Some(&x), Some(&same)).as_f64();
        let differing = distance.distance(Some(&x), Some(&close)).as_f64();
        assert!(identical.is_finite());
        assert!(identical < differing);
    }

    #[test]
    fn test_zero_similarity_policies() {
        let x = header("x.dcm", "abc", "same");
        let y = header("y.dcm", "xyz", "same");

        let skip = RecordDistance::new(weights_ab(), &MatcherConfig::default()).unwrap();
        // A has ratio 0 and is skipped, B contributes 1
        assert_eq!(skip.distance(Some(&x), Some(&y)), Distance::Value(0.25));

        let penalize_config = MatcherConfig {
            zero_similarity: ZeroSimilarityPolicy::Penalize,
            zero_similarity_penalty: 10.0,
            ..MatcherConfig::default()
        };
        let penalize = RecordDistance::new(weights_ab(), &penalize_config).unwrap();
        // (10 + 1) / 2 / 2
        assert_eq!(penalize.distance(Some(&x), Some(&y)), Distance::Value(2.75));
    }

    #[test]
    fn test_field_access_failure_is_unknown() {
        let metrics = Arc::new(ComparisonMetrics::new());
        let distance = RecordDistance::new(weights_ab(), &MatcherConfig::default())
            .unwrap()
            .with_metrics(metrics.clone());
        let equivalence = ExactEquivalence::new(weights_ab()).unwrap().with_metrics(metrics.clone());

        let broken = DicomHeader::new("broken.dcm").with_field("A", json!({"nested": true}));
        let ok = header("ok.dcm", "foo", "bar");

        assert_eq!(distance.distance(Some(&broken), Some(&ok)), Distance::Unknown);
        assert_eq!(equivalence.equivalence(Some(&ok), Some(&broken)), Equivalence::Unknown);

        let stats = metrics.get_stats();
        assert_eq!(stats.comparisons, 2);
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.unknown_results, 2);
    }

    #[test]
    fn test_out_of_range_similarity_is_unknown() {
        let broken = |_: &str, _: &str| -> Result<f64> { Ok(1.5) };
        let distance = RecordDistance::with_similarity(weights_ab(), Box::new(broken)).unwrap();
        let x = header("x.dcm", "foo", "bar");

        assert_eq!(distance.distance(Some(&x), Some(&x)), Distance::Unknown);
    }

    #[test]
    fn test_exact_equivalence() {
        let equivalence = ExactEquivalence::new(weights_ab()).unwrap();
        let x = header("x.dcm", "foo", "bar");
        let y = header("y.dcm", "foo", "bar");
        let z = header("z.dcm", "foo", "baz");
        // absent field equals an empty one
        let only_a = DicomHeader::new("a.dcm").with_field("A", "foo");
        let empty_b = header("b.dcm", "foo", "");

        assert_eq!(equivalence.equivalence(Some(&x), Some(&y)), Equivalence::Equivalent);
        assert_eq!(equivalence.equivalence(Some(&x), Some(&z)), Equivalence::NotEquivalent);
        assert_eq!(equivalence.equivalence(Some(&only_a), Some(&empty_b)), Equivalence::Equivalent);
    }

    #[test]
    fn test_pair_slots() {
        let config = MatcherConfig {
            similarity_metric: SimilarityMetric::Exact,
            ..MatcherConfig::default()
        };
        let distance = RecordDistance::new(weights_ab(), &config).unwrap();
        let equivalence = ExactEquivalence::new(weights_ab()).unwrap();
        let x = header("x.dcm", "foo", "bar");
        let y = header("y.dcm", "foo", "bar");

        let mut slots = PairSlots::new();
        assert_eq!(slots.distance(&distance), Distance::Unknown);

        slots.set_left(&x);
        assert_eq!(slots.equivalence(&equivalence), Equivalence::Unknown);

        slots.set_right(&y);
        assert_eq!(slots.equivalence(&equivalence), Equivalence::Equivalent);
        assert_eq!(slots.distance(&distance), Distance::Value(0.5));

        slots.clear();
        slots.fit(&y, &x);
        assert_eq!(slots.distance(&distance), Distance::Value(0.5));
    }

    #[test]
    fn test_constructors_reject_zero_weight_sum() {
        let mut zero_sum = FieldWeights::default();
        for name in FieldWeights::default().names() {
            zero_sum.set(name, 0.0).unwrap();
        }
        assert!(!zero_sum.is_empty());
        assert!(matches!(
            RecordDistance::new(zero_sum.clone(), &MatcherConfig::default()),
            Err(Error::Config(_))
        ));
        assert!(matches!(ExactEquivalence::new(zero_sum), Err(Error::Config(_))));
    }

    #[test]
    fn test_constructors_reject_empty_weights() {
        assert!(matches!(
            FieldWeights::new(Vec::<(&str, f64)>::new()),
            Err(Error::Config(_))
        ));

        // deserialized weights skip construction-time validation
        let no_fields: FieldWeights = serde_json::from_value(json!({"entries": []})).unwrap();
        assert!(no_fields.is_empty());
        assert!(matches!(
            RecordDistance::new(no_fields.clone(), &MatcherConfig::default()),
            Err(Error::Config(_))
        ));
        assert!(matches!(ExactEquivalence::new(no_fields), Err(Error::Config(_))));
    }
}
