//! Typed row model shared by readers, transformers and the bulk writer

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A single scalar cell value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Infer a typed value from a raw text cell
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return FieldValue::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return FieldValue::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return FieldValue::from_f64(f);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => FieldValue::Bool(true),
            "false" => FieldValue::Bool(false),
            "nan" | "null" | "none" => FieldValue::Null,
            _ => FieldValue::Text(raw.to_string()),
        }
    }

    /// Non-finite floats have no JSON representation and are treated as missing
    pub fn from_f64(f: f64) -> Self {
        if f.is_finite() {
            FieldValue::Float(f)
        } else {
            FieldValue::Null
        }
    }

    /// Convert a decoded JSON value (columnar reader output)
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else {
                    n.as_f64().map(FieldValue::from_f64).unwrap_or(FieldValue::Null)
                }
            }
            Value::String(s) => FieldValue::Text(s),
            nested => FieldValue::Text(nested.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Numeric view of the value; numeric text is accepted
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            FieldValue::Null | FieldValue::Bool(_) => None,
        }
    }

    /// Integral view of the value; floats are truncated
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Text(s) => s
                .trim()
                .parse::<i64>()
                .ok()
                .or_else(|| self.as_f64().map(|f| f as i64)),
            _ => self.as_f64().map(|f| f as i64),
        }
    }

    fn into_json(self) -> Option<Value> {
        match self {
            FieldValue::Null => None,
            FieldValue::Bool(b) => Some(Value::Bool(b)),
            FieldValue::Int(i) => Some(Value::from(i)),
            FieldValue::Float(f) => serde_json::Number::from_f64(f).map(Value::Number),
            FieldValue::Text(s) => Some(Value::String(s)),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

/// Column names that make up a [`FlowKey`]
pub const FLOW_KEY_FIELDS: [&str; 5] = ["sip", "sport", "dip", "dport", "proto"];

/// Flow 5-tuple identifying a connection
#[derive(Debug, Clone, PartialEq)]
pub struct FlowKey {
    pub sip: String,
    pub sport: i64,
    pub dip: String,
    pub dport: i64,
    pub proto: i64,
}

impl FlowKey {
    /// Typed key from raw columns; addresses must be text and ports/protocol integers
    fn from_fields(fields: &BTreeMap<String, FieldValue>) -> Option<Self> {
        let text = |name: &str| match fields.get(name)? {
            FieldValue::Text(s) => Some(s.clone()),
            _ => None,
        };
        let int = |name: &str| match fields.get(name)? {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        };
        Some(Self {
            sip: text("sip")?,
            sport: int("sport")?,
            dip: text("dip")?,
            dport: int("dport")?,
            proto: int("proto")?,
        })
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "sip" => Some(FieldValue::from(self.sip.as_str())),
            "sport" => Some(FieldValue::Int(self.sport)),
            "dip" => Some(FieldValue::from(self.dip.as_str())),
            "dport" => Some(FieldValue::Int(self.dport)),
            "proto" => Some(FieldValue::Int(self.proto)),
            _ => None,
        }
    }

    fn into_fields(self) -> [(&'static str, FieldValue); 5] {
        [
            ("sip", FieldValue::Text(self.sip)),
            ("sport", FieldValue::Int(self.sport)),
            ("dip", FieldValue::Text(self.dip)),
            ("dport", FieldValue::Int(self.dport)),
            ("proto", FieldValue::Int(self.proto)),
        ]
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} ({})",
            self.sip, self.sport, self.dip, self.dport, self.proto
        )
    }
}

/// One row: the typed flow key when the row carries a complete one, plus
/// every other column in a stable order.
///
/// Key columns that are incomplete or not of the expected type stay in the
/// extension map untouched, so a document always round-trips its input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    flow: Option<FlowKey>,
    extra: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from decoded columns, lifting the flow key out of them
    pub fn from_columns<K, I>(columns: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, FieldValue)>,
    {
        let mut record = Self {
            flow: None,
            extra: columns.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        };
        record.lift_flow();
        record
    }

    pub fn flow(&self) -> Option<&FlowKey> {
        self.flow.as_ref()
    }

    pub fn get(&self, name: &str) -> Option<FieldValue> {
        self.flow
            .as_ref()
            .and_then(|key| key.field(name))
            .or_else(|| self.extra.get(name).cloned())
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let is_key_field = FLOW_KEY_FIELDS.contains(&name.as_str());
        if is_key_field {
            self.demote_flow();
        }
        self.extra.insert(name, value.into());
        if is_key_field {
            self.lift_flow();
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        (self.flow.is_some() && FLOW_KEY_FIELDS.contains(&name)) || self.extra.contains_key(name)
    }

    pub fn len(&self) -> usize {
        let key_fields = if self.flow.is_some() {
            FLOW_KEY_FIELDS.len()
        } else {
            0
        };
        key_fields + self.extra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sparse JSON object: null fields are left out entirely
    pub fn into_document(self) -> Map<String, Value> {
        let key_fields = self
            .flow
            .into_iter()
            .flat_map(FlowKey::into_fields)
            .map(|(k, v)| (k.to_string(), v));
        key_fields
            .chain(self.extra)
            .filter_map(|(k, v)| v.into_json().map(|json| (k, json)))
            .collect()
    }

    fn lift_flow(&mut self) {
        if self.flow.is_some() {
            return;
        }
        if let Some(key) = FlowKey::from_fields(&self.extra) {
            for name in FLOW_KEY_FIELDS {
                self.extra.remove(name);
            }
            self.flow = Some(key);
        }
    }

    fn demote_flow(&mut self) {
        if let Some(key) = self.flow.take() {
            self.extra
                .extend(key.into_fields().map(|(k, v)| (k.to_string(), v)));
        }
    }
}

impl<K: Into<String>> FromIterator<(K, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, FieldValue)>>(iter: I) -> Self {
        Self::from_columns(iter)
    }
}

/// A bounded, ordered run of rows from a single file
#[derive(Debug, Clone)]
pub struct RowBatch {
    /// File the rows came from
    pub source: PathBuf,
    /// Zero-based position of the first row within the file
    pub offset: usize,
    pub rows: Vec<Record>,
}

impl RowBatch {
    pub fn new(source: &Path, offset: usize, rows: Vec<Record>) -> Self {
        Self {
            source: source.to_path_buf(),
            offset,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Basename of the originating file
    pub fn source_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
