use ahash::AHashMap;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

/// DICOM multi-valued elements are joined with a backslash, as in the
/// on-disk encoding.
const MULTI_VALUE_SEPARATOR: &str = "\\";

/// Identity of a record: the path of the file its header was read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        RecordId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Path> for RecordId {
    fn from(path: &Path) -> Self {
        RecordId(path.to_string_lossy().to_string())
    }
}

/// A parsed record exposing named-field lookup.
///
/// `field` returns `Ok(None)` for a field the record does not carry and
/// `Err` when the value exists but cannot be turned into a string.
pub trait Record {
    fn id(&self) -> RecordId;

    fn field(&self, name: &str) -> Result<Option<String>>;

    /// String form of a field, with absent fields read as `""`.
    fn field_value(&self, name: &str) -> Result<String> {
        Ok(self.field(name)?.unwrap_or_default())
    }
}

impl<R: Record + ?Sized> Record for &R {
    fn id(&self) -> RecordId {
        (**self).id()
    }

    fn field(&self, name: &str) -> Result<Option<String>> {
        (**self).field(name)
    }
}

/// Header fields of one DICOM file, already parsed by an external reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DicomHeader {
    pub path: String,
    #[serde(default)]
    pub fields: AHashMap<String, Value>,
}

impl DicomHeader {
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self {
            path: path.into(),
            fields: AHashMap::new(),
        }
    }

    pub fn with_field<K: Into<String>, V: Into<Value>>(mut self, name: K, value: V) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn insert<K: Into<String>, V: Into<Value>>(&mut self, name: K, value: V) {
        self.fields.insert(name.into(), value.into());
    }
}

impl Record for DicomHeader {
    fn id(&self) -> RecordId {
        RecordId(self.path.clone())
    }

    fn field(&self, name: &str) -> Result<Option<String>> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(value) => stringify_value(name, value).map(Some),
        }
    }
}

fn stringify_value(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Array(items) => {
            let parts = items
                .iter()
                .map(|item| stringify_value(name, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(parts.join(MULTI_VALUE_SEPARATOR))
        }
        Value::Object(_) => Err(Error::field_access(
            name,
            "nested sequence values have no string form",
        )),
    }
}

/// Outcome of a weighted distance comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Distance {
    Value(f64),
    /// An operand was absent or scoring failed.
    Unknown,
}

impl Distance {
    pub fn value(self) -> Option<f64> {
        match self {
            Distance::Value(v) => Some(v),
            Distance::Unknown => None,
        }
    }

    /// Numeric form used by matrix storage: `Unknown` becomes `+inf`.
    pub fn as_f64(self) -> f64 {
        self.value().unwrap_or(f64::INFINITY)
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, Distance::Unknown)
    }
}

/// Outcome of an exact all-fields comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Equivalence {
    Equivalent,
    NotEquivalent,
    Unknown,
}

impl Equivalence {
    /// `Unknown` never counts as a match.
    pub fn is_equivalent(self) -> bool {
        matches!(self, Equivalence::Equivalent)
    }
}

/// Records found mutually equivalent. The first member is the anchor the
/// others were compared against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Group {
    members: Vec<RecordId>,
}

impl Group {
    pub fn new(anchor: RecordId) -> Self {
        Self { members: vec![anchor] }
    }

    pub fn push(&mut self, member: RecordId) {
        self.members.push(member);
    }

    pub fn anchor(&self) -> &RecordId {
        &self.members[0]
    }

    pub fn members(&self) -> &[RecordId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.members.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordId> {
        self.members.iter()
    }
}
