use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref NUMBER_REGEX: Regex =
        Regex::new(r"^[+-]?(([0-9]+\.?[0-9]*)|(\.[0-9]+))([eE][+-]?[0-9]+)?$").unwrap();
    static ref INFINITY_REGEX: Regex = Regex::new(r"^[+-]?Infinity$").unwrap();
}

/// A single scalar stored in a record field.
///
/// Dataset values arrive as JSON numbers or strings and user edits arrive as
/// text, so both shapes are kept exactly as given. Any other JSON value
/// (booleans, arrays, objects) is carried through untouched in `Other`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Number(Number),
    Text(String),
    Other(Value),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn int(value: i64) -> Self {
        FieldValue::Number(Number::from(value))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::Other(v) => v.is_null(),
            FieldValue::Number(_) => false,
        }
    }

    /// Numeric view of the value, following the usual string-to-number
    /// coercion: surrounding whitespace is ignored and blank text is zero.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => n.as_f64(),
            FieldValue::Text(s) => parse_number(s),
            FieldValue::Other(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::Other(Value::Null) => Some(0.0),
            FieldValue::Other(_) => None,
        }
    }

    /// Falsy values are skipped by search: blank text, zero, `false` and null.
    pub fn is_falsy(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::Number(n) => n.as_f64() == Some(0.0),
            FieldValue::Other(v) => matches!(v, Value::Null | Value::Bool(false)),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Other(Value::Null) => Ok(()),
            FieldValue::Other(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// Parses text the way a loosely typed number field does.
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    if INFINITY_REGEX.is_match(trimmed) {
        return Some(if trimmed.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }
    if NUMBER_REGEX.is_match(trimmed) {
        return trimmed.parse::<f64>().ok();
    }
    None
}

/// The seven editable columns, in table order.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Id,
    Bio,
    Name,
    Language,
    Version,
    State,
    Created,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Id,
        Field::Bio,
        Field::Name,
        Field::Language,
        Field::Version,
        Field::State,
        Field::Created,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Bio => "bio",
            Field::Name => "name",
            Field::Language => "language",
            Field::Version => "version",
            Field::State => "state",
            Field::Created => "created",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Field::Id => "ID",
            Field::Bio => "Bio",
            Field::Name => "Name",
            Field::Language => "Language",
            Field::Version => "Version",
            Field::State => "State",
            Field::Created => "Created Date",
        }
    }

    /// Column width in character cells. The browser grid uses ten pixels per cell.
    pub fn width(self) -> u16 {
        match self {
            Field::Id => 15,
            Field::Bio => 20,
            Field::Name => 18,
            Field::Language | Field::Version | Field::State => 14,
            Field::Created => 17,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|field| field.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown field `{}`", s))
    }
}

/// One row of the table.
///
/// Unknown dataset keys are kept in `extra` so a sheet survives a round trip
/// through the store untouched.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<FieldValue>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Record {
    /// The initial contents of a new-row draft.
    pub fn draft(today: NaiveDate) -> Self {
        Record {
            id: Some(FieldValue::text("")),
            name: Some(FieldValue::text("")),
            bio: Some(FieldValue::text("")),
            language: Some(FieldValue::text("")),
            version: Some(FieldValue::int(0)),
            state: Some(FieldValue::text("")),
            created: Some(FieldValue::text(today.format("%Y-%m-%d").to_string())),
            extra: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        match field {
            Field::Id => self.id.as_ref(),
            Field::Bio => self.bio.as_ref(),
            Field::Name => self.name.as_ref(),
            Field::Language => self.language.as_ref(),
            Field::Version => self.version.as_ref(),
            Field::State => self.state.as_ref(),
            Field::Created => self.created.as_ref(),
        }
    }

    fn slot(&mut self, field: Field) -> &mut Option<FieldValue> {
        match field {
            Field::Id => &mut self.id,
            Field::Bio => &mut self.bio,
            Field::Name => &mut self.name,
            Field::Language => &mut self.language,
            Field::Version => &mut self.version,
            Field::State => &mut self.state,
            Field::Created => &mut self.created,
        }
    }

    pub fn set(&mut self, field: Field, value: Option<FieldValue>) {
        *self.slot(field) = value;
    }

    /// Stores text typed into a cell. Version text that reads as a number is
    /// kept as a number; everything else is stored verbatim.
    pub fn set_text(&mut self, field: Field, text: &str) {
        let value = match field {
            Field::Version if !text.trim().is_empty() => match parse_number(text)
                .filter(|n| n.is_finite())
                .and_then(number_from_f64)
            {
                Some(n) => FieldValue::Number(n),
                None => FieldValue::text(text),
            },
            _ => FieldValue::text(text),
        };
        self.set(field, Some(value));
    }

    /// Builder form of [`Record::set_text`].
    pub fn with_text(mut self, field: Field, text: &str) -> Self {
        self.set_text(field, text);
        self
    }

    pub fn text(&self, field: Field) -> String {
        self.get(field).map(|v| v.to_string()).unwrap_or_default()
    }

    /// Case-insensitive substring match against every truthy field,
    /// including keys the table does not show. `needle` must be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        let known = Field::ALL
            .iter()
            .filter_map(|field| self.get(*field))
            .filter(|value| !value.is_falsy())
            .any(|value| value.to_string().to_lowercase().contains(needle));

        known
            || self
                .extra
                .values()
                .filter_map(stringify_truthy)
                .any(|text| text.to_lowercase().contains(needle))
    }
}

fn number_from_f64(n: f64) -> Option<Number> {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Some(Number::from(n as i64))
    } else {
        Number::from_f64(n)
    }
}

fn stringify_truthy(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
