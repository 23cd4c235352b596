//! dcmgroup groups DICOM file headers that describe the same acquisition.
//! It provides a weighted field distance between header records, exact
//! equivalence grouping and a pairwise distance matrix with dense or
//! sparse storage.

// Module declarations
pub mod error;
pub mod types;
pub mod config;
pub mod matcher;
pub mod utils;

// Re-exports
pub use error::{Error, Result};
pub use types::{DicomHeader, Distance, Equivalence, Group, Record, RecordId};
pub use matcher::{
    CancellationToken, ComparisonMetrics, DistanceMatrix, DistanceMatrixBuilder, ExactEquivalence,
    Grouping, MatrixStorage, PairSlots, RecordDistance, RecordGrouper,
};

// Re-export the config from config module
pub use config::{ClusterConfig, FieldWeights};
