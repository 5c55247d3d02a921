//! The whole page: shell, global UI state and table, wired together.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::bootstrap::SeedPhase;
use crate::config::Config;
use crate::error::StoreError;
use crate::grid::DataGrid;
use crate::shell::{PageShell, ToolbarAction};
use crate::store::Store;
use crate::ui_state::UiState;
use crate::viewport::Viewport;

pub const LOADING_TEXT: &str = "Loading...";
pub const ERROR_TITLE: &str = "System under maintenance";
pub const ERROR_MESSAGE: &str = "Sorry for the inconvenience. Please try again later.";

/// Which top-level view the page shows.
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Screen {
    Loading,
    Error,
    Ready,
}

/// Everything the page chrome needs to draw itself.
#[derive(Clone, Debug, Serialize)]
pub struct PageView {
    pub screen: Screen,
    pub seed: SeedPhase,
    pub title: String,
    pub warning: Option<&'static str>,
    pub search_open: bool,
    pub search_input: String,
    pub toolbar: Vec<ToolbarButton>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ToolbarButton {
    pub action: ToolbarAction,
    pub label: &'static str,
    pub active: bool,
    pub wired: bool,
}

pub struct Editor {
    store: Arc<Store>,
    ui: UiState,
    shell: PageShell,
    grid: DataGrid,
    seed: SeedPhase,
    forwarded_query: String,
}

impl Editor {
    pub fn new(store: Arc<Store>, viewport: Viewport) -> Self {
        let grid = DataGrid::new(store.clone(), viewport);
        Self::assemble(store, grid)
    }

    pub fn from_config(store: Arc<Store>, config: &Config) -> Self {
        let grid = DataGrid::with_debounce(store.clone(), config.viewport(), config.debounce());
        Self::assemble(store, grid)
    }

    fn assemble(store: Arc<Store>, grid: DataGrid) -> Self {
        Editor {
            shell: PageShell::new(&store),
            store,
            ui: UiState::new(),
            grid,
            seed: SeedPhase::Uninitialized,
            forwarded_query: String::new(),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn grid(&self) -> &DataGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut DataGrid {
        &mut self.grid
    }

    pub fn shell(&self) -> &PageShell {
        &self.shell
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    pub fn seed_phase(&self) -> SeedPhase {
        self.seed
    }

    pub fn set_seed_phase(&mut self, phase: SeedPhase) {
        self.seed = phase;
    }

    /// The fetch only matters while it could still fill the sheet; a failed
    /// fetch shows the maintenance screen.
    pub fn screen(&self) -> Screen {
        match self.seed {
            SeedPhase::Uninitialized | SeedPhase::Loading => Screen::Loading,
            SeedPhase::Failed => Screen::Error,
            SeedPhase::Seeded { .. } | SeedPhase::Abandoned => Screen::Ready,
        }
    }

    pub fn edit_title(&mut self, text: &str) -> Result<(), StoreError> {
        self.shell.edit_title(&self.store, text)
    }

    pub fn toggle_search(&mut self) {
        self.shell.toggle_search();
    }

    pub fn edit_search(&mut self, text: &str) {
        self.shell.edit_search(text, &mut self.ui);
    }

    pub fn press_add_row(&mut self) {
        self.shell.press_add_row(&mut self.ui);
    }

    /// Re-reads the sheet from storage and rebuilds the page from it.
    pub fn reload(&mut self) {
        self.store.reload();
        self.shell.reload_title(&self.store);
        self.grid.refresh();
    }

    /// Pumps the global UI state into the table and lets the table apply
    /// settled searches and store changes. Returns whether anything changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;

        if self.ui.search_query() != self.forwarded_query {
            self.forwarded_query = self.ui.search_query().to_string();
            self.grid.set_search_query(&self.forwarded_query, now);
        }
        if self.ui.take_add_row_request() {
            self.grid.begin_draft();
            changed = true;
        }

        self.grid.tick(now) || changed
    }

    pub fn view(&self) -> PageView {
        PageView {
            screen: self.screen(),
            seed: self.seed,
            title: self.shell.title().to_string(),
            warning: self.shell.warning(),
            search_open: self.shell.search_open(),
            search_input: self.shell.search_input().to_string(),
            toolbar: ToolbarAction::ALL
                .iter()
                .map(|action| ToolbarButton {
                    action: *action,
                    label: action.label(),
                    active: match action {
                        ToolbarAction::Search => self.shell.search_open(),
                        ToolbarAction::AddRow | ToolbarAction::Action => true,
                        _ => false,
                    },
                    wired: action.is_wired(),
                })
                .collect(),
        }
    }
}
