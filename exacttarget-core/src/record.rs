//! Protocol-neutral domain objects.
//!
//! A [`Record`] is what callers read and write: a set of values keyed by
//! external field names. Marshalling to and from the SOAP and REST wire
//! shapes lives in [`crate::marshal`].

use crate::mapping::{EntityType, FieldType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Naive date-time layouts accepted from the REST API, tried in order.
const NAIVE_DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%m/%d/%Y %I:%M:%S %p"];

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    String(String),
    Integer(i64),
    Boolean(bool),
    Date(DateTime<Utc>),
    /// Identifier of a record of another entity type.
    Reference { entity: EntityType, id: String },
}

/// A text value that does not parse as the declared field type.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot read '{text}' as {expected}")]
pub struct CoerceError {
    /// The offending text.
    pub text: String,
    /// The declared type.
    pub expected: FieldType,
}

impl Value {
    /// Parses wire text into the declared field type.
    ///
    /// # Errors
    ///
    /// Returns a [`CoerceError`] when `text` is not a valid integer, boolean
    /// or date for a field declared with that type. Collections have no text
    /// form and always fail.
    pub fn coerce(text: &str, field_type: FieldType) -> Result<Value, CoerceError> {
        let invalid = || CoerceError {
            text: text.to_string(),
            expected: field_type,
        };

        match field_type {
            FieldType::String => Ok(Value::String(text.to_string())),
            FieldType::Integer => text.trim().parse().map(Value::Integer).map_err(|_| invalid()),
            FieldType::Boolean => parse_bool(text.trim()).map(Value::Boolean).ok_or_else(invalid),
            FieldType::Date => parse_date(text.trim()).map(Value::Date).ok_or_else(invalid),
            FieldType::Reference(entity) => Ok(Value::Reference {
                entity,
                id: text.to_string(),
            }),
            FieldType::Collection(_) => Err(invalid()),
        }
    }

    /// Wire text of the value, `None` for [`Value::Null`].
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            Value::Integer(number) => Some(number.to_string()),
            Value::Boolean(flag) => Some(flag.to_string()),
            Value::Date(date) => Some(date.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Reference { id, .. } => Some(id.clone()),
        }
    }

    /// Borrows the text of a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") || text == "1" {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") || text == "0" {
        Some(false)
    } else {
        None
    }
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    for format in NAIVE_DATE_TIME_FORMATS {
        if let Ok(date) = NaiveDateTime::parse_from_str(text, format) {
            return Some(date.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("null"),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::String(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::String(text)
    }
}

impl From<i64> for Value {
    fn from(number: i64) -> Self {
        Value::Integer(number)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Boolean(flag)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(date: DateTime<Utc>) -> Self {
        Value::Date(date)
    }
}

/// One domain object of a registered entity type.
///
/// Rows of a data extension additionally remember which of their columns
/// identify the row, because those columns travel separately on both
/// wires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    entity_type: EntityType,
    fields: BTreeMap<String, Value>,
    key_columns: BTreeSet<String>,
}

impl Record {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            fields: BTreeMap::new(),
            key_columns: BTreeSet::new(),
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Returns the value stored under an external field name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Stores a value, returning the previous one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Stores a value that identifies the row.
    pub fn insert_key(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Option<Value> {
        let name = name.into();
        self.key_columns.insert(name.clone());
        self.fields.insert(name, value.into())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Builder-style [`insert_key`](Self::insert_key).
    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_key(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.key_columns.remove(name);
        self.fields.remove(name)
    }

    /// Whether `name` was stored as a row key.
    pub fn is_key_column(&self, name: &str) -> bool {
        self.key_columns.contains(name)
    }

    /// Fields ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
