//! Grouping of exactly-equivalent records and the pairwise distance matrix.

pub mod grouping;
pub mod matrix;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

pub use self::grouping::{Grouping, RecordGrouper};
pub use self::matrix::{
    DenseMatrix, DistanceMatrix, DistanceMatrixBuilder, MatrixStorage, SparseMatrix, StorageKind,
};

/// Shared stop flag. Long runs poll it between rows or anchors.
pub type CancellationToken = Arc<AtomicBool>;

pub(crate) fn check_cancelled(token: Option<&CancellationToken>) -> Result<()> {
    match token {
        Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Cancelled),
        _ => Ok(()),
    }
}
