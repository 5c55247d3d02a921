#[cfg(feature = "web")]
use crate::error::ExportError;
use crate::grid::display_text;
use crate::record::Field;
use crate::store::Row;

/// Convert rows to CSV format
///
/// Produces a header line of column titles followed by one line per row, in
/// table column order. Values containing commas, quotes, carriage returns or
/// newlines are quoted, with embedded quotes doubled.
///
/// # Arguments
/// * `rows` - The rows to export, usually the currently displayed ones
///
/// # Returns
/// * `String` - CSV content
///
/// # Examples
/// ```
/// use gridbook::downloader::to_csv;
///
/// let csv = to_csv(&[]);
/// assert_eq!(csv, "ID,Bio,Name,Language,Version,State,Created Date\n");
/// ```
pub fn to_csv(rows: &[Row]) -> String {
    let mut csv_content = String::new();

    let header: Vec<&str> = Field::ALL.iter().map(|field| field.title()).collect();
    csv_content.push_str(&header.join(","));
    csv_content.push('\n');

    for row in rows {
        let line: Vec<String> = Field::ALL
            .iter()
            .map(|field| escape(&display_text(&row.record, *field, None)))
            .collect();
        csv_content.push_str(&line.join(","));
        csv_content.push('\n');
    }

    csv_content
}

fn escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Convert rows to XLSX format
///
/// Writes a single worksheet named after the sheet title with a bold header
/// row. Numeric versions are written as numbers, everything else as text.
///
/// # Arguments
/// * `title` - Worksheet name
/// * `rows` - The rows to export
///
/// # Returns
/// * `Result<Vec<u8>, ExportError>` - XLSX file content as bytes or an error
#[cfg(feature = "web")]
pub fn to_xlsx(title: &str, rows: &[Row]) -> Result<Vec<u8>, ExportError> {
    use crate::record::FieldValue;
    use rust_xlsxwriter::{Format, Workbook, Worksheet};

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name(sheet_name(title))?;

    let bold = Format::new().set_bold();
    for (c, field) in Field::ALL.iter().enumerate() {
        worksheet.write_string_with_format(0, c as u16, field.title(), &bold)?;
    }

    for (r, row) in rows.iter().enumerate() {
        let r = (r + 1) as u32;
        for (c, field) in Field::ALL.iter().enumerate() {
            let c = c as u16;
            match (field, row.record.get(*field)) {
                (Field::Version, Some(FieldValue::Number(n))) => {
                    worksheet.write_number(r, c, n.as_f64().unwrap_or_default())?;
                }
                _ => {
                    worksheet.write_string(r, c, &display_text(&row.record, *field, None))?;
                }
            }
        }
    }

    workbook.push_worksheet(worksheet);
    Ok(workbook.save_to_buffer()?)
}

/// Worksheet names are limited to 31 characters and may not contain `[]:*?/\`.
#[cfg(feature = "web")]
fn sheet_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !"[]:*?/\\".contains(*c))
        .take(31)
        .collect();
    if cleaned.trim().is_empty() {
        "Sheet1".to_string()
    } else {
        cleaned
    }
}
