pub mod file;
pub mod subsystems;

use serde::{Serialize, Deserialize};
use std::path::Path;
use std::fs;
use crate::error::Result;
use log::{warn, trace};

pub use subsystems::FieldWeights;

pub trait FromIni {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    // File paths
    pub files: file::FileConfig,

    // Subsystem configs
    pub general: subsystems::GeneralConfig,
    pub fields: subsystems::FieldWeights,
    pub matcher: subsystems::MatcherConfig,
    pub grouping: subsystems::GroupingConfig,
    pub matrix: subsystems::MatrixConfig,
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<()> {
        self.files.validate()?;
        self.general.validate()?;
        self.fields.validate()?;
        self.matcher.validate()?;
        self.matrix.validate()?;
        Ok(())
    }

    pub fn from_ini<P: AsRef<Path>>(path: P) -> Result<Self> {
        let absolute_path = std::fs::canonicalize(&path)
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        trace!("Loading configuration from: {:?}", absolute_path);

        let content = fs::read_to_string(&path)?;
        Self::from_ini_str(&content)
    }

    pub fn from_ini_str(content: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut current_section = String::new();

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                current_section = line[1..line.len()-1].trim().to_string();
                trace!("  Line {}: Found section: [{}]", line_num + 1, current_section);
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();

                // Delegate to appropriate subsystem config
                if let Some(result) = match current_section.as_str() {
                    "files" => config.files.from_ini_section(&current_section, key, value),
                    "general" => config.general.from_ini_section(&current_section, key, value),
                    "fields" => config.fields.from_ini_section(&current_section, key, value),
                    "matcher" => config.matcher.from_ini_section(&current_section, key, value),
                    "grouping" => config.grouping.from_ini_section(&current_section, key, value),
                    "matrix" => config.matrix.from_ini_section(&current_section, key, value),
                    _ => None,
                } {
                    if let Err(e) = result {
                        warn!("Error processing config key {}={}: {}", key, value, e);
                    }
                } else {
                    warn!("Unrecognized config key: {}={} in section [{}]", key, value, current_section);
                }
            } else {
                warn!("Line {}: ignoring malformed config line: {}", line_num + 1, line);
            }
        }

        config.validate()?;
        Ok(config)
    }
}
