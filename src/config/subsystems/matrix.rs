// src/config/subsystems/matrix.rs

use serde::{Serialize, Deserialize};
use crate::error::{Error, Result};
use crate::config::FromIni;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    // Hard cap on dense storage in bytes; 0 derives the cap from available memory
    pub max_dense_bytes: u64,
    // Share of available memory a dense matrix may take when max_dense_bytes is 0
    pub dense_memory_fraction: f64,
    pub force_sparse: bool,

    // Parallelization settings
    pub parallel: bool,
    // 0 uses the global rayon pool
    pub threads: usize,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            max_dense_bytes: 0,
            dense_memory_fraction: 0.5,
            force_sparse: false,
            parallel: true,
            threads: 0,
        }
    }
}

impl FromIni for MatrixConfig {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        if section_name != "matrix" {
            return None;
        }

        match key {
            "max_dense_bytes" => {
                match value.parse() {
                    Ok(bytes) => {
                        self.max_dense_bytes = bytes;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid max_dense_bytes: {}", value)
                    ))),
                }
            },
            "dense_memory_fraction" => {
                match value.parse::<f64>() {
                    Ok(fraction) if fraction > 0.0 && fraction <= 1.0 => {
                        self.dense_memory_fraction = fraction;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid dense_memory_fraction (must be in (0, 1]): {}", value)
                    ))),
                }
            },
            "force_sparse" => {
                match value.parse() {
                    Ok(flag) => {
                        self.force_sparse = flag;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid force_sparse value (must be true/false): {}", value)
                    ))),
                }
            },
            "parallel" => {
                match value.parse() {
                    Ok(flag) => {
                        self.parallel = flag;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid parallel value (must be true/false): {}", value)
                    ))),
                }
            },
            "threads" => {
                match value.parse() {
                    Ok(count) => {
                        self.threads = count;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid threads: {}", value)
                    ))),
                }
            },
            _ => None,
        }
    }
}

impl MatrixConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.dense_memory_fraction > 0.0 && self.dense_memory_fraction <= 1.0) {
            return Err(Error::Config(
                "dense_memory_fraction must be in (0, 1]".to_string()
            ));
        }
        Ok(())
    }
}
