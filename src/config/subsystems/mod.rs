pub mod general;
pub mod fields;
pub mod matcher;
pub mod grouping;
pub mod matrix;

pub use general::{parse_level, GeneralConfig};
pub use fields::FieldWeights;
pub use matcher::{MatcherConfig, SimilarityMetric, ZeroSimilarityPolicy};
pub use grouping::{GroupingConfig, GroupingVariant, ScanMode};
pub use matrix::MatrixConfig;
