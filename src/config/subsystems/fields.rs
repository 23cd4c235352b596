// src/config/subsystems/fields.rs

use serde::{Serialize, Deserialize};
use crate::error::{Error, Result};
use crate::config::FromIni;

/// Header fields compared when nothing else is configured.
const DEFAULT_FIELD_WEIGHTS: &[(&str, f64)] = &[
    ("PatientID", 1.0),
    ("PatientName", 1.0),
    ("PatientBirthDate", 1.0),
    ("PatientSex", 0.5),
    ("PatientAge", 0.5),
    ("StudyDate", 0.5),
    ("SeriesDescription", 1.0),
    ("ProtocolName", 1.0),
];

/// Ordered field name -> weight mapping.
///
/// Iteration order is insertion order; distances visit fields in this order.
/// Non-empty with a positive total weight once validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldWeights {
    entries: Vec<(String, f64)>,
    #[serde(skip)]
    loaded_from_ini: bool,
}

impl FieldWeights {
    pub fn new<I, S>(weights: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut fields = Self { entries: Vec::new(), loaded_from_ini: false };
        for (name, weight) in weights {
            fields.set(name, weight)?;
        }
        fields.validate()?;
        Ok(fields)
    }

    /// Insert or overwrite a weight. Overwriting keeps the original position.
    pub fn set<S: Into<String>>(&mut self, name: S, weight: f64) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Config("Field name must not be empty".to_string()));
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(Error::Config(
                format!("Invalid weight for field {} (must be finite and >= 0): {}", name, weight)
            ));
        }

        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = weight,
            None => self.entries.push((name, weight)),
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(name, weight)| (name.as_str(), *weight))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, w)| *w)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w).sum()
    }

    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(Error::Config("Field weights are not set".to_string()));
        }
        let total = self.total_weight();
        if !(total > 0.0) {
            return Err(Error::Config(
                format!("Sum of field weights must be > 0, got {}", total)
            ));
        }
        Ok(())
    }
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            entries: DEFAULT_FIELD_WEIGHTS
                .iter()
                .map(|(name, weight)| (name.to_string(), *weight))
                .collect(),
            loaded_from_ini: false,
        }
    }
}

impl FromIni for FieldWeights {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        if section_name != "fields" {
            return None;
        }

        // An explicit [fields] section replaces the defaults entirely
        if !self.loaded_from_ini {
            self.entries.clear();
            self.loaded_from_ini = true;
        }

        match value.trim_matches('"').parse::<f64>() {
            Ok(weight) => Some(self.set(key, weight)),
            Err(_) => Some(Err(Error::Config(
                format!("Invalid weight for field {}: {}", key, value)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_empty_and_zero_sum() {
        assert!(FieldWeights::new(Vec::<(String, f64)>::new()).is_err());
        assert!(FieldWeights::new(vec![("A", 0.0)]).is_err());
        assert!(FieldWeights::new(vec![("A", -1.0)]).is_err());
        assert!(FieldWeights::new(vec![("A", f64::NAN)]).is_err());
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut weights = FieldWeights::new(vec![("A", 1.0), ("B", 2.0)]).unwrap();
        weights.set("A", 3.0).unwrap();

        let entries: Vec<(&str, f64)> = weights.iter().collect();
        assert_eq!(entries, vec![("A", 3.0), ("B", 2.0)]);
        assert_eq!(weights.total_weight(), 5.0);
        assert_eq!(weights.get("B"), Some(2.0));
        assert_eq!(weights.get("C"), None);
    }

    #[test]
    fn test_zero_weight_allowed_alongside_positive() {
        let weights = FieldWeights::new(vec![("A", 1.0), ("B", 0.0)]).unwrap();
        assert_eq!(weights.len(), 2);
    }
}
