// src/config/subsystems/general.rs

use serde::{Serialize, Deserialize};
use crate::error::{Error, Result};
use crate::config::FromIni;
use log::LevelFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub log_level: String,
    // Write logs under files.log_dir instead of stderr
    pub log_to_file: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
        }
    }
}

impl GeneralConfig {
    pub fn get_log_level(&self) -> LevelFilter {
        parse_level(&self.log_level).unwrap_or(LevelFilter::Info)
    }

    pub fn validate(&self) -> Result<()> {
        if parse_level(&self.log_level).is_none() {
            return Err(Error::Config(
                format!("Invalid log_level: {}", self.log_level)
            ));
        }
        Ok(())
    }
}

pub fn parse_level(value: &str) -> Option<LevelFilter> {
    match value.trim().trim_matches('"').to_lowercase().as_str() {
        "error" => Some(LevelFilter::Error),
        "warn" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        "none" | "off" => Some(LevelFilter::Off),
        _ => None,
    }
}

impl FromIni for GeneralConfig {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        if section_name != "general" {
            return None;
        }

        match key {
            "log_level" => {
                match parse_level(value) {
                    Some(_) => {
                        self.log_level = value.trim_matches('"').to_lowercase();
                        Some(Ok(()))
                    },
                    None => Some(Err(Error::Config(
                        format!("Invalid log_level (error/warn/info/debug/trace/none): {}", value)
                    ))),
                }
            },
            "log_to_file" => {
                match value.parse() {
                    Ok(flag) => {
                        self.log_to_file = flag;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid log_to_file value (must be true/false): {}", value)
                    ))),
                }
            },
            _ => None,
        }
    }
}
