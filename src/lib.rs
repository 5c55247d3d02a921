/*!
# Gridbook

A single-sheet tabular data editor: a fixed-schema table of records that is
seeded once from a remote JSON dataset, kept in a local storage slot, and
edited in place with per-cell validation.

## Architecture

### Data layer
- **record**: the row schema, dynamic cell values and the column set
- **validation**: per-field rules and version colour bands
- **store**: the storage slot, stable row keys and change notification
- **loader** / **bootstrap**: fetching the seed dataset and the one-shot seed

### Interaction layer
- **ui_state**: the search query and add-row trigger shared between components
- **debounce**: the search quiet period
- **viewport**: fixed-height row windowing
- **grid**: the editable table (filtering, selection, draft row, error map)
- **shell**: page chrome (title, toolbar, search box)
- **editor**: the page as a whole, wiring the pieces together

### Persistence and export
- **downloader**: CSV and XLSX export of the displayed rows
- **saving**: gzip-compressed JSON snapshots

### Front-ends
- `gridbook`: a terminal editor
- `gridbook-web` (feature `web`): an axum server with a browser client

## REST API Endpoints (feature `web`)

- `GET /api/window?offset&height` - the rows to draw at a scroll position
- `PATCH /api/rows/{key}` - edit one cell of a stored row
- `PATCH /api/draft`, `POST /api/draft/commit` - compose and commit a new row
- `PUT /api/search`, `PUT /api/title` - search box and sheet title
- `GET /api/export/{csv,xlsx}`, `GET /api/export`, `POST /api/import` - files
*/

pub mod bootstrap;
pub mod config;
pub mod debounce;
pub mod downloader;
pub mod editor;
pub mod error;
pub mod grid;
pub mod loader;
pub mod record;
pub mod saving;
pub mod shell;
pub mod store;
pub mod ui_state;
pub mod validation;
pub mod viewport;

#[cfg(feature = "web")]
pub mod app;

pub use bootstrap::{SeedPhase, seed_store};
pub use config::Config;
pub use editor::{Editor, Screen};
pub use error::{ExportError, LoadError, StoreError};
pub use grid::{CommitOutcome, DataGrid};
pub use record::{Field, FieldValue, Record};
pub use store::{RowKey, Snapshot, Store};
pub use viewport::Viewport;
