/// Cross-component ephemeral state: the search box text and the add-row
/// trigger. The page shell writes it, the table reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiState {
    search_query: String,
    add_row_requested: bool,
}

impl UiState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
    }

    pub fn request_add_row(&mut self) {
        self.add_row_requested = true;
    }

    pub fn add_row_requested(&self) -> bool {
        self.add_row_requested
    }

    /// Consumes the trigger; a second call returns `false` until it is set again.
    pub fn take_add_row_request(&mut self) -> bool {
        std::mem::take(&mut self.add_row_requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_row_trigger_fires_once() {
        let mut ui = UiState::new();
        assert!(!ui.take_add_row_request());
        ui.request_add_row();
        assert!(ui.add_row_requested());
        assert!(ui.take_add_row_request());
        assert!(!ui.take_add_row_request());
    }
}
