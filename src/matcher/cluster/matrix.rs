use indicatif::ProgressBar;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;

use crate::config::ClusterConfig;
use crate::config::subsystems::MatrixConfig;
use crate::error::{Error, Result};
use crate::matcher::similarity::{PairSlots, RecordDistance};
use crate::types::Record;
use crate::utils::MemoryManager;
use super::{check_cancelled, CancellationToken};

const CELL_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// Read/write view over an N×N pairwise distance matrix.
///
/// Only cells with `col > row` are ever computed. The diagonal and the lower
/// triangle read as `0.0`, which means "not computed", not "identical".
/// Unknown distances are stored as `f32::INFINITY`.
pub trait DistanceMatrix {
    fn shape(&self) -> (usize, usize);

    fn get(&self, row: usize, col: usize) -> f32;

    fn set(&mut self, row: usize, col: usize, value: f32);

    fn is_sparse(&self) -> bool;

    /// Number of stored non-zero cells
    fn nnz(&self) -> usize;
}

/// Row-major contiguous storage.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    n: usize,
    data: Vec<f32>,
}

impl DenseMatrix {
    /// Reserve `n * n` cells up front, failing instead of aborting when the
    /// allocator refuses.
    pub fn try_new(n: usize) -> Result<Self> {
        let len = n.checked_mul(n)
            .ok_or_else(|| Error::allocation(format!("{}x{} cells overflow usize", n, n)))?;

        let mut data: Vec<f32> = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| Error::allocation(format!("dense {}x{} matrix: {}", n, n, e)))?;
        data.resize(len, 0.0);

        Ok(Self { n, data })
    }

    fn check_bounds(&self, row: usize, col: usize) {
        assert!(row < self.n && col < self.n,
                "index ({}, {}) out of bounds for {}x{} matrix", row, col, self.n, self.n);
    }
}

impl DistanceMatrix for DenseMatrix {
    fn shape(&self) -> (usize, usize) {
        (self.n, self.n)
    }

    fn get(&self, row: usize, col: usize) -> f32 {
        self.check_bounds(row, col);
        self.data[row * self.n + col]
    }

    fn set(&mut self, row: usize, col: usize, value: f32) {
        self.check_bounds(row, col);
        self.data[row * self.n + col] = value;
    }

    fn is_sparse(&self) -> bool {
        false
    }

    fn nnz(&self) -> usize {
        self.data.iter().filter(|v| **v != 0.0).count()
    }
}

/// List-of-lists storage: one `(col, value)` list per row, sorted by column.
/// Zero cells are not stored and rows are only allocated once written.
///
/// A stored cell takes 8 bytes, twice a dense cell, so a fully populated
/// upper triangle costs about as much as the dense matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    n: usize,
    rows: Vec<Vec<(u32, f32)>>,
}

impl SparseMatrix {
    /// Columns are stored as `u32`, so `n` may not exceed `u32::MAX + 1`.
    pub fn new(n: usize) -> Self {
        assert!(n as u64 <= u32::MAX as u64 + 1,
                "sparse matrix of {} columns exceeds the u32 column index", n);
        Self { n, rows: Vec::new() }
    }

    fn check_bounds(&self, row: usize, col: usize) {
        assert!(row < self.n && col < self.n,
                "index ({}, {}) out of bounds for {}x{} matrix", row, col, self.n, self.n);
    }

    fn ensure_rows(&mut self, count: usize) {
        if self.rows.len() < count {
            self.rows.resize_with(count, Vec::new);
        }
    }
}

impl DistanceMatrix for SparseMatrix {
    fn shape(&self) -> (usize, usize) {
        (self.n, self.n)
    }

    fn get(&self, row: usize, col: usize) -> f32 {
        self.check_bounds(row, col);
        let cells = match self.rows.get(row) {
            Some(cells) => cells,
            None => return 0.0,
        };
        match cells.binary_search_by_key(&(col as u32), |&(c, _)| c) {
            Ok(pos) => cells[pos].1,
            Err(_) => 0.0,
        }
    }

    fn set(&mut self, row: usize, col: usize, value: f32) {
        self.check_bounds(row, col);
        if value == 0.0 && row >= self.rows.len() {
            return;
        }
        self.ensure_rows(row + 1);

        let cells = &mut self.rows[row];
        let col = col as u32;
        match cells.binary_search_by_key(&col, |&(c, _)| c) {
            Ok(pos) if value == 0.0 => {
                cells.remove(pos);
            }
            Ok(pos) => cells[pos].1 = value,
            Err(_) if value == 0.0 => {}
            Err(pos) => cells.insert(pos, (col, value)),
        }
    }

    fn is_sparse(&self) -> bool {
        true
    }

    fn nnz(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }
}

/// Storage chosen for a build.
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixStorage {
    Dense(DenseMatrix),
    Sparse(SparseMatrix),
}

impl DistanceMatrix for MatrixStorage {
    fn shape(&self) -> (usize, usize) {
        match self {
            MatrixStorage::Dense(m) => m.shape(),
            MatrixStorage::Sparse(m) => m.shape(),
        }
    }

    fn get(&self, row: usize, col: usize) -> f32 {
        match self {
            MatrixStorage::Dense(m) => m.get(row, col),
            MatrixStorage::Sparse(m) => m.get(row, col),
        }
    }

    fn set(&mut self, row: usize, col: usize, value: f32) {
        match self {
            MatrixStorage::Dense(m) => m.set(row, col, value),
            MatrixStorage::Sparse(m) => m.set(row, col, value),
        }
    }

    fn is_sparse(&self) -> bool {
        matches!(self, MatrixStorage::Sparse(_))
    }

    fn nnz(&self) -> usize {
        match self {
            MatrixStorage::Dense(m) => m.nnz(),
            MatrixStorage::Sparse(m) => m.nnz(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Dense,
    Sparse,
}

impl StorageKind {
    /// Pick storage for an `n`×`n` matrix without allocating it.
    ///
    /// Dense is chosen when `n * n` cells fit the configured byte cap, or
    /// when no cap is set, within `dense_memory_fraction` of available memory.
    /// With neither a cap nor memory information, dense is attempted.
    /// Sparse storage only saves memory when many cells are zero; see
    /// [`SparseMatrix`] for its per-cell cost.
    pub fn probe(n: usize, config: &MatrixConfig) -> StorageKind {
        if config.force_sparse {
            return StorageKind::Sparse;
        }

        let required = match (n as u64).checked_mul(n as u64).and_then(|cells| cells.checked_mul(CELL_BYTES)) {
            Some(bytes) => bytes,
            None => return StorageKind::Sparse,
        };

        let budget = if config.max_dense_bytes > 0 {
            Some(config.max_dense_bytes)
        } else {
            MemoryManager::allocation_budget(config.dense_memory_fraction)
        };

        match budget {
            Some(budget) if required > budget => {
                debug!("Dense matrix needs {} bytes, budget is {}", required, budget);
                StorageKind::Sparse
            }
            _ => StorageKind::Dense,
        }
    }
}

/// Builds the strict upper triangle of the pairwise distance matrix.
pub struct DistanceMatrixBuilder {
    distance: RecordDistance,
    config: MatrixConfig,
    thread_pool: Option<Arc<rayon::ThreadPool>>,
    cancellation: Option<CancellationToken>,
}

impl DistanceMatrixBuilder {
    pub fn new(distance: RecordDistance, config: MatrixConfig) -> Result<Self> {
        config.validate()?;

        // Initialize thread pool if thread count specified
        let thread_pool = if config.parallel && config.threads > 0 {
            Some(rayon::ThreadPoolBuilder::new()
                .num_threads(config.threads)
                .build()?)
        } else {
            None // Use rayon's default thread pool
        };

        Ok(Self {
            distance,
            config,
            thread_pool: thread_pool.map(Arc::new),
            cancellation: None,
        })
    }

    pub fn from_config(config: &ClusterConfig) -> Result<Self> {
        Self::new(RecordDistance::from_config(config)?, config.matrix.clone())
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn distance(&self) -> &RecordDistance {
        &self.distance
    }

    /// Allocate storage for `n` records, falling back to sparse when the
    /// probe rejects dense storage or the dense reservation fails.
    pub fn allocate(&self, n: usize) -> MatrixStorage {
        match StorageKind::probe(n, &self.config) {
            StorageKind::Dense => match DenseMatrix::try_new(n) {
                Ok(dense) => MatrixStorage::Dense(dense),
                Err(e) => {
                    warn!("Dense allocation failed ({}), using sparse storage", e);
                    MatrixStorage::Sparse(SparseMatrix::new(n))
                }
            },
            StorageKind::Sparse if self.config.force_sparse => MatrixStorage::Sparse(SparseMatrix::new(n)),
            StorageKind::Sparse => {
                warn!("Dense {}x{} matrix exceeds the memory budget, using sparse storage", n, n);
                MatrixStorage::Sparse(SparseMatrix::new(n))
            }
        }
    }

    pub fn build<R: Record + Sync>(
        &self,
        records: &[R],
        progress: Option<&ProgressBar>,
    ) -> Result<MatrixStorage> {
        let start_time = Instant::now();
        let n = records.len();
        info!("Calculating distance between {} records", n);

        let mut matrix = self.allocate(n);
        if n == 0 {
            return Ok(matrix);
        }
        info!("Using {} storage for {}x{} matrix",
              if matrix.is_sparse() { "sparse" } else { "dense" }, n, n);

        match &mut matrix {
            MatrixStorage::Dense(dense) => {
                let fill = |(i, row): (usize, &mut [f32])| -> Result<()> {
                    check_cancelled(self.cancellation.as_ref())?;
                    self.fill_row(records, i, &mut row[i + 1..]);
                    if let Some(pb) = progress {
                        pb.inc(1);
                    }
                    Ok(())
                };

                if self.config.parallel {
                    self.install(|| dense.data.par_chunks_mut(n).enumerate().try_for_each(fill))?;
                } else {
                    dense.data.chunks_mut(n).enumerate().try_for_each(fill)?;
                }
            }
            MatrixStorage::Sparse(sparse) => {
                sparse.ensure_rows(n);
                let fill = |(i, row): (usize, &mut Vec<(u32, f32)>)| -> Result<()> {
                    check_cancelled(self.cancellation.as_ref())?;
                    let mut values = vec![0.0f32; n - i - 1];
                    self.fill_row(records, i, &mut values);
                    *row = values
                        .into_iter()
                        .enumerate()
                        .filter(|(_, v)| *v != 0.0)
                        .map(|(offset, v)| ((i + 1 + offset) as u32, v))
                        .collect();
                    if let Some(pb) = progress {
                        pb.inc(1);
                    }
                    Ok(())
                };

                if self.config.parallel {
                    self.install(|| sparse.rows.par_iter_mut().enumerate().try_for_each(fill))?;
                } else {
                    sparse.rows.iter_mut().enumerate().try_for_each(fill)?;
                }
            }
        }

        info!("Distance matrix for {} records built in {:.2?} ({} stored cells)",
              n, start_time.elapsed(), matrix.nnz());
        Ok(matrix)
    }

    /// `cells[k]` receives the distance between `records[row]` and `records[row + 1 + k]`
    fn fill_row<R: Record>(&self, records: &[R], row: usize, cells: &mut [f32]) {
        let mut slots = PairSlots::new();
        slots.set_left(&records[row]);

        for (offset, cell) in cells.iter_mut().enumerate() {
            slots.set_right(&records[row + 1 + offset]);
            *cell = slots.distance(&self.distance).as_f64() as f32;
        }
    }

    fn install<T: Send>(&self, op: impl FnOnce() -> T + Send) -> T {
        match &self.thread_pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::subsystems::{FieldWeights, MatcherConfig};
    use crate::error::Error;
    use crate::types::DicomHeader;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    fn distance() -> RecordDistance {
        let weights = FieldWeights::new(vec![
            ("PatientID", 1.0),
            ("PatientName", 1.0),
            ("SeriesDescription", 0.5),
        ]).unwrap();
        RecordDistance::new(weights, &MatcherConfig::default()).unwrap()
    }

    fn builder(config: MatrixConfig) -> DistanceMatrixBuilder {
        DistanceMatrixBuilder::new(distance(), config).unwrap()
    }

    fn records(count: usize) -> Vec<DicomHeader> {
        (0..count)
            .map(|i| {
                DicomHeader::new(format!("{:04}.dcm", i))
                    .with_field("PatientID", format!("SUBJ{:02}", i % 5))
                    .with_field("PatientName", format!("Doe^{}", ["Jane", "John", "Ana"][i % 3]))
                    .with_field("SeriesDescription", if i % 2 == 0 { "T1_MPRAGE" } else { "" })
            })
            .collect()
    }

    fn sparse_config() -> MatrixConfig {
        MatrixConfig { force_sparse: true, ..MatrixConfig::default() }
    }

    fn small_dense_config() -> MatrixConfig {
        // fixed cap so the probe never depends on the host
        MatrixConfig { max_dense_bytes: 1 << 20, ..MatrixConfig::default() }
    }

    #[test]
    fn test_empty_and_single() {
        for config in [small_dense_config(), sparse_config()] {
            let empty = builder(config.clone()).build(&Vec::<DicomHeader>::new(), None).unwrap();
            assert_eq!(empty.shape(), (0, 0));
            assert_eq!(empty.nnz(), 0);

            let single = builder(config).build(&records(1), None).unwrap();
            assert_eq!(single.shape(), (1, 1));
            assert_eq!(single.get(0, 0), 0.0);
        }
    }

    #[test]
    fn test_only_strict_upper_triangle_populated() {
        let recs = records(7);
        let matrix = builder(small_dense_config()).build(&recs, None).unwrap();
        assert!(!matrix.is_sparse());

        for i in 0..7 {
            for j in 0..7 {
                let value = matrix.get(i, j);
                if j > i {
                    let expected = distance().distance(Some(&recs[i]), Some(&recs[j])).as_f64() as f32;
                    assert_eq!(value, expected);
                    assert!(value > 0.0);
                } else {
                    assert_eq!(value, 0.0, "cell ({}, {}) should be unset", i, j);
                }
            }
        }
        assert_eq!(matrix.nnz(), 7 * 6 / 2);
    }

    #[test]
    fn test_sparse_matches_dense() {
        let recs = records(25);
        let dense = builder(small_dense_config()).build(&recs, None).unwrap();
        let sparse = builder(sparse_config()).build(&recs, None).unwrap();

        assert!(!dense.is_sparse());
        assert!(sparse.is_sparse());
        assert_eq!(dense.shape(), sparse.shape());
        for i in 0..25 {
            for j in 0..25 {
                assert_eq!(dense.get(i, j), sparse.get(i, j));
            }
        }
        assert_eq!(dense.nnz(), sparse.nnz());
    }

    #[test]
    fn test_budget_exceeded_falls_back_to_sparse() {
        // 10 x 10 x 4 bytes = 400 > 256
        let config = MatrixConfig { max_dense_bytes: 256, ..MatrixConfig::default() };
        assert_eq!(StorageKind::probe(10, &config), StorageKind::Sparse);
        assert_eq!(StorageKind::probe(8, &config), StorageKind::Dense);

        let recs = records(10);
        let fallback = builder(config).build(&recs, None).unwrap();
        let dense = builder(small_dense_config()).build(&recs, None).unwrap();
        assert!(fallback.is_sparse());
        for i in 0..10 {
            for j in 0..10 {
                assert_eq!(fallback.get(i, j), dense.get(i, j));
            }
        }
    }

    #[test]
    fn test_probe_rejects_overflowing_size() {
        assert_eq!(StorageKind::probe(usize::MAX, &MatrixConfig::default()), StorageKind::Sparse);
    }

    #[test]
    fn test_unknown_distance_stored_as_infinity() {
        let mut recs = records(3);
        recs[1].insert("PatientID", json!({"nested": 1}));

        for config in [small_dense_config(), sparse_config()] {
            let matrix = builder(config).build(&recs, None).unwrap();
            assert_eq!(matrix.get(0, 1), f32::INFINITY);
            assert_eq!(matrix.get(1, 2), f32::INFINITY);
            assert!(matrix.get(0, 2).is_finite());
        }
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let recs = records(30);
        let sequential = builder(MatrixConfig { parallel: false, ..small_dense_config() })
            .build(&recs, None)
            .unwrap();
        let pooled = builder(MatrixConfig { threads: 2, ..small_dense_config() })
            .build(&recs, None)
            .unwrap();
        assert_eq!(sequential, pooled);

        let sparse_sequential = builder(MatrixConfig { parallel: false, ..sparse_config() })
            .build(&recs, None)
            .unwrap();
        let sparse_parallel = builder(sparse_config()).build(&recs, None).unwrap();
        assert_eq!(sparse_sequential, sparse_parallel);
    }

    #[test]
    fn test_sparse_set_and_get() {
        let mut matrix = SparseMatrix::new(4);
        matrix.set(0, 3, 1.5);
        matrix.set(0, 1, 0.5);
        matrix.set(0, 3, 2.5);
        assert_eq!(matrix.get(0, 1), 0.5);
        assert_eq!(matrix.get(0, 3), 2.5);
        assert_eq!(matrix.get(0, 2), 0.0);
        assert_eq!(matrix.nnz(), 2);

        matrix.set(0, 1, 0.0);
        assert_eq!(matrix.nnz(), 1);
    }

    #[test]
    fn test_sparse_rows_allocated_on_write() {
        let mut matrix = SparseMatrix::new(1000);
        assert_eq!(matrix.get(999, 999), 0.0);
        matrix.set(500, 999, 0.0);
        assert_eq!(matrix.nnz(), 0);

        matrix.set(3, 999, 4.0);
        assert_eq!(matrix.get(3, 999), 4.0);
        assert_eq!(matrix.get(700, 999), 0.0);
        assert_eq!(matrix.nnz(), 1);
    }

    // 2e9 x 2e9 f32 cells fit in u64 bytes but not in isize::MAX bytes,
    // so the reservation is refused without touching memory.
    #[cfg(target_pointer_width = "64")]
    const UNRESERVABLE_N: usize = 2_000_000_000;

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_dense_reservation_failure_is_an_error() {
        assert!(matches!(DenseMatrix::try_new(UNRESERVABLE_N), Err(Error::Allocation(_))));
        assert!(matches!(DenseMatrix::try_new(usize::MAX), Err(Error::Allocation(_))));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_failed_dense_reservation_falls_back_to_sparse() {
        let config = MatrixConfig { max_dense_bytes: u64::MAX, ..MatrixConfig::default() };
        assert_eq!(StorageKind::probe(UNRESERVABLE_N, &config), StorageKind::Dense);

        let matrix = builder(config).allocate(UNRESERVABLE_N);
        assert!(matrix.is_sparse());
        assert_eq!(matrix.shape(), (UNRESERVABLE_N, UNRESERVABLE_N));
        assert_eq!(matrix.nnz(), 0);
        assert_eq!(matrix.get(0, UNRESERVABLE_N - 1), 0.0);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_dense_get_out_of_bounds_panics() {
        let matrix = DenseMatrix::try_new(2).unwrap();
        matrix.get(2, 0);
    }

    #[test]
    fn test_progress_counts_rows() {
        let pb = ProgressBar::hidden();
        builder(small_dense_config()).build(&records(9), Some(&pb)).unwrap();
        assert_eq!(pb.position(), 9);
    }

    #[test]
    fn test_cancelled_build() {
        let token = Arc::new(AtomicBool::new(true));
        let result = builder(small_dense_config())
            .with_cancellation(token)
            .build(&records(5), None);
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
