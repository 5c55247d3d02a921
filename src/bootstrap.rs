//! One-shot seeding of an empty sheet from the remote dataset.

use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;

use crate::loader::DatasetSource;
use crate::store::Store;

/// Progress of the initialize-once fetch.
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum SeedPhase {
    Uninitialized,
    Loading,
    /// The fetched rows were installed into an empty sheet.
    Seeded { rows: usize },
    /// The sheet already had rows when the fetch resolved; the result was dropped.
    Abandoned,
    Failed,
}

impl SeedPhase {
    pub fn is_settled(self) -> bool {
        !matches!(self, SeedPhase::Uninitialized | SeedPhase::Loading)
    }
}

/// Fetches `source` and installs it if the store is still empty at the moment
/// the result arrives. `on_phase` observes every transition, starting with
/// `Loading`.
pub async fn seed_store(
    store: Arc<Store>,
    source: &DatasetSource,
    mut on_phase: impl FnMut(SeedPhase),
) -> SeedPhase {
    on_phase(SeedPhase::Loading);

    let outcome = match source.fetch_records().await {
        Ok(records) => {
            let rows = records.len();
            match store.seed_if_empty(records) {
                Ok(true) => {
                    info!("seeded empty sheet with {} rows", rows);
                    SeedPhase::Seeded { rows }
                }
                Ok(false) => {
                    info!("sheet already has rows; discarding {} fetched rows", rows);
                    SeedPhase::Abandoned
                }
                Err(e) => {
                    warn!("seeding failed to persist: {}", e);
                    SeedPhase::Failed
                }
            }
        }
        Err(e) => {
            warn!("dataset fetch failed: {}", e);
            SeedPhase::Failed
        }
    };

    on_phase(outcome);
    outcome
}
