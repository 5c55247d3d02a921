//! Error types shared across the crate.

use thiserror::Error;

/// Failures writing to (or explicitly reading from) a storage slot.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed for key `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("row {0} does not exist")]
    UnknownRow(String),
}

/// Failures fetching the remote dataset.
///
/// Callers of the loader only distinguish loading/error/success; the variants
/// exist so the log line says what actually went wrong.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("dataset endpoint answered {0}")]
    Status(u16),

    #[error("dataset is not a JSON array of records: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("failed to read dataset file: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures producing or consuming an exported sheet.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "web")]
    #[error("xlsx export failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
