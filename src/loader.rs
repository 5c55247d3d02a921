use log::{debug, info, warn};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::LoadError;
use crate::record::{Field, Record};

/// Demo dataset the editor seeds an empty sheet from.
pub const DEFAULT_DATASET_URL: &str = "https://microsoftedge.github.io/Demos/json-dummy-data/5MB.json";

/// Where the initial rows come from.
#[derive(Clone, Debug, PartialEq)]
pub enum DatasetSource {
    /// Unauthenticated GET returning a JSON array of records.
    Http(String),
    /// A local `.json` array or `.csv` file with a header row.
    File(PathBuf),
}

/// What callers of the loader get to see.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadState {
    Loading,
    Error,
    Success(Vec<Record>),
}

impl DatasetSource {
    /// Treats anything with an http(s) scheme as a URL and the rest as a path.
    ///
    /// # Examples
    /// ```
    /// use gridbook::loader::DatasetSource;
    ///
    /// assert!(matches!(DatasetSource::parse("https://example.com/a.json"), DatasetSource::Http(_)));
    /// assert!(matches!(DatasetSource::parse("people.csv"), DatasetSource::File(_)));
    /// ```
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            DatasetSource::Http(location.to_string())
        } else {
            DatasetSource::File(PathBuf::from(location))
        }
    }

    /// Fetches the dataset once. No retry, no pagination, no cancellation.
    pub async fn fetch_records(&self) -> Result<Vec<Record>, LoadError> {
        match self {
            DatasetSource::Http(url) => {
                info!("fetching dataset from {}", url);
                let response = reqwest::get(url.as_str()).await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(LoadError::Status(status.as_u16()));
                }
                let body = response.bytes().await?;
                let records: Vec<Record> = serde_json::from_slice(&body)?;
                debug!("decoded {} records ({} bytes)", records.len(), body.len());
                Ok(records)
            }
            DatasetSource::File(path) => {
                info!("reading dataset from {}", path.display());
                let raw = tokio::fs::read_to_string(path).await?;
                if is_csv(path) {
                    Ok(from_csv(&raw))
                } else {
                    Ok(serde_json::from_str(&raw)?)
                }
            }
        }
    }

    /// Collapses the outcome to the three states the page distinguishes.
    pub async fn load(&self) -> LoadState {
        match self.fetch_records().await {
            Ok(records) => LoadState::Success(records),
            Err(e) => {
                warn!("dataset load failed: {}", e);
                LoadState::Error
            }
        }
    }
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// Builds records from CSV text whose first line names the columns.
///
/// Columns named after a table field (`id`, `name`, ...) fill that field;
/// other columns are kept as extra text keys. Blank lines are skipped.
pub fn from_csv(contents: &str) -> Vec<Record> {
    let mut lines = contents.lines().filter(|line| !line.trim().is_empty());
    let header = match lines.next() {
        Some(line) => parse_csv_row(line),
        None => return Vec::new(),
    };

    lines
        .map(|line| {
            let mut record = Record::default();
            for (name, value) in header.iter().zip(parse_csv_row(line)) {
                match name.trim().parse::<Field>() {
                    Ok(field) => record.set_text(field, &value),
                    Err(_) => {
                        record.extra.insert(name.clone(), Value::String(value));
                    }
                }
            }
            record
        })
        .collect()
}

// Parse a CSV row into a vector of strings
fn parse_csv_row(line: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                // Doubled quote inside a quoted field
                current_field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => result.push(std::mem::take(&mut current_field)),
            _ => current_field.push(c),
        }
    }

    result.push(current_field);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;

    #[test]
    fn csv_rows_split_on_unquoted_commas() {
        assert_eq!(parse_csv_row("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(parse_csv_row(r#""x, y",z"#), vec!["x, y", "z"]);
        assert_eq!(parse_csv_row(r#""say ""hi""",,"#), vec![r#"say "hi""#, "", ""]);
    }

    #[test]
    fn csv_headers_map_to_fields() {
        let records = from_csv("id,Name,bio,version,team\n7,Ada,math,2,core\n\n8,Bob,\"x, y\",abc,\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text(Field::Name), "Ada");
        assert_eq!(records[0].version, Some(FieldValue::int(2)));
        assert_eq!(records[0].extra.get("team"), Some(&Value::from("core")));
        assert_eq!(records[1].text(Field::Bio), "x, y");
        assert_eq!(records[1].version, Some(FieldValue::text("abc")));
    }

    #[test]
    fn empty_csv_has_no_records() {
        assert!(from_csv("").is_empty());
        assert!(from_csv("id,name\n").is_empty());
    }
}
