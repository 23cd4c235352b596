pub mod algorithms;
pub mod similarity;
pub mod metrics;
pub mod cluster;

// Re-export the main types
pub use self::algorithms::{FieldSimilarity, SimilarityAlgorithmFactory};
pub use self::similarity::{RecordDistance, ExactEquivalence, PairSlots};
pub use self::metrics::{ComparisonMetrics, ComparisonStats};
pub use self::cluster::{
    CancellationToken, DistanceMatrix, DistanceMatrixBuilder, Grouping, MatrixStorage, RecordGrouper,
};
