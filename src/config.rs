use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::loader::{DEFAULT_DATASET_URL, DatasetSource};
use crate::store::{DEFAULT_STORAGE_KEY, FileStorage, Store};
use crate::viewport::{DEFAULT_ROW_HEIGHT, Viewport};

/// Settings shared by the terminal editor and the web server.
///
/// Every flag can also be given through a `GRIDBOOK_*` environment variable.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding the storage slots
    #[arg(long, env = "GRIDBOOK_STORAGE_DIR", default_value = "database")]
    pub storage_dir: PathBuf,

    /// Storage slot the sheet is kept under
    #[arg(long, env = "GRIDBOOK_STORAGE_KEY", default_value = DEFAULT_STORAGE_KEY)]
    pub storage_key: String,

    /// URL or local .json/.csv file used to seed an empty sheet
    #[arg(long, env = "GRIDBOOK_DATASET", default_value = DEFAULT_DATASET_URL)]
    pub dataset: String,

    /// Never fetch the dataset, even when the sheet is empty
    #[arg(long, env = "GRIDBOOK_NO_SEED")]
    pub no_seed: bool,

    /// Address the web server listens on
    #[arg(long, env = "GRIDBOOK_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Height of the table viewport in layout units
    #[arg(long, env = "GRIDBOOK_VIEWPORT_HEIGHT", default_value_t = 480)]
    pub viewport_height: u32,

    /// Height of one table row in layout units
    #[arg(long, env = "GRIDBOOK_ROW_HEIGHT", default_value_t = DEFAULT_ROW_HEIGHT)]
    pub row_height: u32,

    /// Quiet period before a search takes effect, in milliseconds
    #[arg(long, env = "GRIDBOOK_DEBOUNCE_MS", default_value_t = 500)]
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_dir: PathBuf::from("database"),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            dataset: DEFAULT_DATASET_URL.to_string(),
            no_seed: false,
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            viewport_height: 480,
            row_height: DEFAULT_ROW_HEIGHT,
            debounce_ms: 500,
        }
    }
}

impl Config {
    pub fn open_store(&self) -> Store {
        Store::open(FileStorage::new(&self.storage_dir), self.storage_key.clone())
    }

    pub fn dataset_source(&self) -> DatasetSource {
        DatasetSource::parse(&self.dataset)
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.viewport_height).with_row_height(self.row_height)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
