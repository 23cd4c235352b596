// memory_manager.rs - system memory queries backing the dense matrix budget

use log::{info, debug, warn};
use sys_info;

// Constants for memory management
const HIGH_MEMORY_THRESHOLD: f64 = 80.0;    // Percentage of memory usage considered high
const LOW_MEMORY_THRESHOLD: f64 = 30.0;     // Percentage below which memory is plentiful

/// Reads system memory through `sys_info`, which reports kilobytes.
pub struct MemoryManager;

impl MemoryManager {
    /// Available system memory in bytes
    pub fn get_available_memory() -> Option<u64> {
        sys_info::mem_info().ok().map(|info| info.avail.saturating_mul(1024))
    }

    /// Total system memory in bytes
    pub fn get_total_memory() -> Option<u64> {
        sys_info::mem_info().ok().map(|info| info.total.saturating_mul(1024))
    }

    /// Calculate memory usage percentage
    pub fn get_memory_usage_percent() -> Option<f64> {
        match sys_info::mem_info() {
            Ok(mem_info) if mem_info.total > 0 => {
                Some(100.0 - (mem_info.avail as f64 / mem_info.total as f64 * 100.0))
            },
            _ => None,
        }
    }

    /// Bytes a single allocation may take: `fraction` of available memory.
    /// `None` when memory information is unavailable.
    pub fn allocation_budget(fraction: f64) -> Option<u64> {
        let available = Self::get_available_memory()?;
        let budget = (available as f64 * fraction.clamp(0.0, 1.0)) as u64;
        debug!("Allocation budget: {} MB ({:.0}% of {} MB available)",
              budget / (1024 * 1024), fraction * 100.0, available / (1024 * 1024));
        Some(budget)
    }

    pub fn memory_state() -> MemoryState {
        match Self::get_memory_usage_percent() {
            Some(usage) if usage > HIGH_MEMORY_THRESHOLD => MemoryState::High,
            Some(usage) if usage < LOW_MEMORY_THRESHOLD => MemoryState::Low,
            Some(_) => MemoryState::Normal,
            None => MemoryState::Unknown,
        }
    }

    /// Log current memory status
    pub fn log_memory_status() {
        if let Ok(mem_info) = sys_info::mem_info() {
            let total_mb = mem_info.total / 1024;
            let avail_mb = mem_info.avail / 1024;
            let used_mb = mem_info.total.saturating_sub(mem_info.avail) / 1024;
            let usage_percent = if mem_info.total > 0 {
                100.0 - (mem_info.avail as f64 / mem_info.total as f64 * 100.0)
            } else {
                0.0
            };

            info!("Memory status: {:.1}% used ({} MB used / {} MB total, {} MB available)",
                 usage_percent, used_mb, total_mb, avail_mb);
            info!("Memory state: {}", Self::memory_state());
        } else {
            warn!("Unable to get memory information");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryState {
    Low,           // Below LOW_MEMORY_THRESHOLD
    Normal,
    High,          // Above HIGH_MEMORY_THRESHOLD
    Unknown,       // Cannot determine state
}

impl std::fmt::Display for MemoryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryState::Low => write!(f, "LOW"),
            MemoryState::Normal => write!(f, "NORMAL"),
            MemoryState::High => write!(f, "HIGH"),
            MemoryState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_fraction_gives_zero_budget() {
        if let Some(budget) = MemoryManager::allocation_budget(0.0) {
            assert_eq!(budget, 0);
        }
    }

    #[test]
    fn test_available_not_above_total() {
        if let (Some(avail), Some(total)) =
            (MemoryManager::get_available_memory(), MemoryManager::get_total_memory())
        {
            assert!(avail <= total);
        }
    }
}
