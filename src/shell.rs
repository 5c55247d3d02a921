//! Page chrome around the table: the editable title, the toolbar and the
//! search box. The shell never calls the table directly; it only writes
//! [`UiState`].

use serde::Serialize;

use crate::error::StoreError;
use crate::store::Store;
use crate::ui_state::UiState;

pub const DEFAULT_TITLE: &str = "table name";
pub const TITLE_WARNING: &str = "Please enter the sheet name";

/// Toolbar buttons, in display order.
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolbarAction {
    AddRow,
    Filter,
    Sort,
    Search,
    Fields,
    Refresh,
    Download,
    Share,
    Settings,
    Action,
    AskAi,
}

impl ToolbarAction {
    pub const ALL: [ToolbarAction; 11] = [
        ToolbarAction::AddRow,
        ToolbarAction::Filter,
        ToolbarAction::Sort,
        ToolbarAction::Search,
        ToolbarAction::Fields,
        ToolbarAction::Refresh,
        ToolbarAction::Download,
        ToolbarAction::Share,
        ToolbarAction::Settings,
        ToolbarAction::Action,
        ToolbarAction::AskAi,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ToolbarAction::AddRow => "Add row",
            ToolbarAction::Filter => "Filter",
            ToolbarAction::Sort => "Sort",
            ToolbarAction::Search => "Search",
            ToolbarAction::Fields => "Fields",
            ToolbarAction::Refresh => "Refresh",
            ToolbarAction::Download => "Download",
            ToolbarAction::Share => "Share",
            ToolbarAction::Settings => "Settings",
            ToolbarAction::Action => "Action",
            ToolbarAction::AskAi => "Ask AI",
        }
    }

    /// Buttons that do something; the rest are decoration.
    pub fn is_wired(self) -> bool {
        matches!(
            self,
            ToolbarAction::AddRow | ToolbarAction::Search | ToolbarAction::Refresh | ToolbarAction::Download
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PageShell {
    title: String,
    show_warning: bool,
    search_open: bool,
    search_input: String,
}

impl PageShell {
    pub fn new(store: &Store) -> Self {
        PageShell {
            title: store.title().unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            show_warning: false,
            search_open: false,
            search_input: String::new(),
        }
    }

    /// Picks up the stored title again. The search box is left as it is.
    pub fn reload_title(&mut self, store: &Store) {
        self.title = store.title().unwrap_or_else(|| DEFAULT_TITLE.to_string());
        self.show_warning = false;
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn show_warning(&self) -> bool {
        self.show_warning
    }

    pub fn warning(&self) -> Option<&'static str> {
        self.show_warning.then_some(TITLE_WARNING)
    }

    /// Updates the title field. A blank title raises the warning and is not
    /// persisted; anything else clears the warning and is saved.
    pub fn edit_title(&mut self, store: &Store, text: &str) -> Result<(), StoreError> {
        self.title = text.to_string();
        if text.trim().is_empty() {
            self.show_warning = true;
            return Ok(());
        }
        self.show_warning = false;
        store.set_title(text)
    }

    pub fn search_open(&self) -> bool {
        self.search_open
    }

    pub fn search_input(&self) -> &str {
        &self.search_input
    }

    pub fn toggle_search(&mut self) {
        self.search_open = !self.search_open;
    }

    pub fn edit_search(&mut self, text: &str, ui: &mut UiState) {
        self.search_input = text.to_string();
        ui.set_search_query(text);
    }

    pub fn press_add_row(&self, ui: &mut UiState) {
        ui.request_add_row();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_defaults_until_one_is_stored() {
        let store = Store::in_memory();
        assert_eq!(PageShell::new(&store).title(), DEFAULT_TITLE);
        store.set_title("people").unwrap();
        assert_eq!(PageShell::new(&store).title(), "people");
    }

    #[test]
    fn blank_title_warns_and_is_not_saved() {
        let store = Store::in_memory();
        let mut shell = PageShell::new(&store);

        shell.edit_title(&store, "people").unwrap();
        shell.edit_title(&store, "   ").unwrap();
        assert!(shell.show_warning());
        assert_eq!(shell.warning(), Some(TITLE_WARNING));
        assert_eq!(shell.title(), "   ");
        assert_eq!(store.title().as_deref(), Some("people"));

        shell.edit_title(&store, "people v2").unwrap();
        assert!(!shell.show_warning());
        assert_eq!(store.title().as_deref(), Some("people v2"));
    }

    #[test]
    fn toolbar_talks_through_ui_state() {
        let store = Store::in_memory();
        let mut shell = PageShell::new(&store);
        let mut ui = UiState::new();

        shell.toggle_search();
        assert!(shell.search_open());
        shell.edit_search("ada", &mut ui);
        shell.press_add_row(&mut ui);

        assert_eq!(ui.search_query(), "ada");
        assert!(ui.take_add_row_request());
    }
}
