// src/config/subsystems/grouping.rs

use serde::{Serialize, Deserialize};
use crate::error::{Error, Result};
use crate::config::FromIni;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupingVariant {
    /// Shrinking work-list, ordered list of groups
    Removal,
    /// Groups keyed by anchor identity
    Anchor,
}

impl GroupingVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupingVariant::Removal => "removal",
            GroupingVariant::Anchor => "anchor",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim_matches('"').to_lowercase().as_str() {
            "removal" | "list" => Some(Self::Removal),
            "anchor" | "map" => Some(Self::Anchor),
            _ => None,
        }
    }
}

impl Default for GroupingVariant {
    fn default() -> Self {
        Self::Removal
    }
}

/// Lower bound of the inner candidate scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanMode {
    /// Every remaining record is a candidate.
    Full,
    /// The record at index 0 of the work-list is never compared.
    SkipFirst,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Full => "full",
            ScanMode::SkipFirst => "skip_first",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim_matches('"').to_lowercase().as_str() {
            "full" => Some(Self::Full),
            "skip_first" | "legacy" => Some(Self::SkipFirst),
            _ => None,
        }
    }

    /// Smallest work-list index the scan visits.
    pub fn lower_bound(&self) -> usize {
        match self {
            ScanMode::Full => 0,
            ScanMode::SkipFirst => 1,
        }
    }
}

impl Default for ScanMode {
    fn default() -> Self {
        Self::Full
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupingConfig {
    pub variant: GroupingVariant,
    pub scan_mode: ScanMode,
}

impl FromIni for GroupingConfig {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        if section_name != "grouping" {
            return None;
        }

        match key {
            "variant" => {
                self.variant = match GroupingVariant::from_str(value) {
                    Some(variant) => variant,
                    None => return Some(Err(Error::Config(
                        format!("Invalid grouping variant (must be 'removal' or 'anchor'): {}", value)
                    ))),
                };
                Some(Ok(()))
            },
            "scan_mode" => {
                self.scan_mode = match ScanMode::from_str(value) {
                    Some(mode) => mode,
                    None => return Some(Err(Error::Config(
                        format!("Invalid scan_mode (must be 'full' or 'skip_first'): {}", value)
                    ))),
                };
                Some(Ok(()))
            },
            _ => None,
        }
    }
}
