//! Per-field validation of table rows.
//!
//! Every rule looks at exactly one field; there are no cross-field rules.

use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::record::{FieldValue, Field, Record};

/// Field name to human-readable message for one row.
pub type FieldErrors = BTreeMap<Field, String>;

/// Validates a row, returning one message per failing field.
///
/// # Examples
/// ```
/// use gridbook::record::{Field, Record};
/// use gridbook::validation::validate;
///
/// let row = Record::default().with_text(Field::Id, "1").with_text(Field::Version, "abc");
/// let errors = validate(&row);
/// assert!(errors.contains_key(&Field::Name));
/// assert!(errors.contains_key(&Field::Version));
/// assert!(!errors.contains_key(&Field::Id));
/// ```
pub fn validate(row: &Record) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if is_blank(row.get(Field::Id)) {
        errors.insert(Field::Id, "ID is required".to_string());
    }
    if is_blank(row.get(Field::Name)) {
        errors.insert(Field::Name, "Name is required".to_string());
    }
    if is_blank(row.get(Field::Bio)) {
        errors.insert(Field::Bio, "Bio is required".to_string());
    }
    if let Some(version) = row.get(Field::Version) {
        if version.as_f64().is_none() {
            errors.insert(Field::Version, "Version must be a number".to_string());
        }
    }
    if let Some(created) = row.get(Field::Created) {
        if !created.is_empty() && !is_calendar_date(created) {
            errors.insert(Field::Created, "Invalid date".to_string());
        }
    }

    errors
}

fn is_blank(value: Option<&FieldValue>) -> bool {
    value.is_none_or(FieldValue::is_empty)
}

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and epoch milliseconds.
pub fn is_calendar_date(value: &FieldValue) -> bool {
    parse_date(value).is_some()
}

/// Normalizes a date-ish value to its calendar day.
pub fn parse_date(value: &FieldValue) -> Option<NaiveDate> {
    match value {
        FieldValue::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|dt| dt.date_naive()),
        FieldValue::Text(s) => {
            let s = s.trim();
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
        }
        FieldValue::Other(_) => None,
    }
}

/// Visual banding of the version column. Purely presentational.
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VersionBand {
    Low,
    Medium,
    High,
}

pub fn version_band(value: &FieldValue) -> Option<VersionBand> {
    let v = value.as_f64()?;
    if v < 2.0 {
        Some(VersionBand::Low)
    } else if v < 4.0 {
        Some(VersionBand::Medium)
    } else if v < 6.0 {
        Some(VersionBand::High)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn complete() -> Record {
        Record::default()
            .with_text(Field::Id, "1")
            .with_text(Field::Name, "A")
            .with_text(Field::Bio, "x")
    }

    #[test]
    fn complete_row_is_valid() {
        assert!(validate(&complete()).is_empty());
    }

    #[test]
    fn fresh_draft_flags_only_required_text() {
        let errors = validate(&Record::draft(Local::now().date_naive()));
        let keys: Vec<Field> = errors.keys().copied().collect();
        assert_eq!(keys, vec![Field::Id, Field::Bio, Field::Name]);
        assert_eq!(errors[&Field::Bio], "Bio is required");
    }

    #[test]
    fn created_accepts_dates_and_rejects_garbage() {
        let ok = complete().with_text(Field::Created, "2024-02-29");
        assert!(validate(&ok).is_empty());

        let stamp = complete().with_text(Field::Created, "2024-02-29T10:00:00Z");
        assert!(validate(&stamp).is_empty());

        let bad = complete().with_text(Field::Created, "2023-02-30");
        assert_eq!(validate(&bad)[&Field::Created], "Invalid date");

        let blank = complete().with_text(Field::Created, "");
        assert!(validate(&blank).is_empty());
    }

    #[test]
    fn epoch_millis_count_as_dates() {
        let mut row = complete();
        row.created = Some(FieldValue::int(1_700_000_000_000));
        assert!(validate(&row).is_empty());
        assert_eq!(
            parse_date(row.created.as_ref().unwrap()),
            NaiveDate::from_ymd_opt(2023, 11, 14)
        );
    }

    #[test]
    fn version_bands() {
        assert_eq!(version_band(&FieldValue::int(0)), Some(VersionBand::Low));
        assert_eq!(version_band(&FieldValue::text("3.9")), Some(VersionBand::Medium));
        assert_eq!(version_band(&FieldValue::int(5)), Some(VersionBand::High));
        assert_eq!(version_band(&FieldValue::int(6)), None);
        assert_eq!(version_band(&FieldValue::text("abc")), None);
    }
}
