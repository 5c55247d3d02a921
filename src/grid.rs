//! The editable, windowed table.
//!
//! [`DataGrid`] keeps the displayed (possibly filtered) rows, the new-row
//! draft, the validation error map and the selection, and turns the current
//! viewport into a [`RenderedWindow`]. Existing rows are edited in place and
//! persisted on every change; the draft lives here until it is committed.

use chrono::{Local, NaiveDate};
use log::debug;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::debounce::{Debouncer, SEARCH_DEBOUNCE};
use crate::error::StoreError;
use crate::record::{Field, Record};
use crate::store::{Row, RowKey, Store};
use crate::validation::{FieldErrors, VersionBand, parse_date, validate, version_band};
use crate::viewport::Viewport;

/// What an error message is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorScope {
    /// A field of the new-row draft. Renders as the bare field name.
    Draft(Field),
    /// A field of a stored row. Renders as `<row key>.<field>`.
    Row(RowKey, Field),
}

impl fmt::Display for ErrorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorScope::Draft(field) => write!(f, "{}", field),
            ErrorScope::Row(key, field) => write!(f, "{}.{}", key, field),
        }
    }
}

impl Serialize for ErrorScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Validation messages for the draft and every stored row.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ErrorMap(BTreeMap<ErrorScope, String>);

impl ErrorMap {
    pub fn get(&self, scope: ErrorScope) -> Option<&str> {
        self.0.get(&scope).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ErrorScope, &String)> {
        self.0.iter()
    }

    pub fn row_errors(&self, key: RowKey) -> FieldErrors {
        self.0
            .iter()
            .filter_map(|(scope, message)| match scope {
                ErrorScope::Row(k, field) if *k == key => Some((*field, message.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn draft_errors(&self) -> FieldErrors {
        self.0
            .iter()
            .filter_map(|(scope, message)| match scope {
                ErrorScope::Draft(field) => Some((*field, message.clone())),
                ErrorScope::Row(..) => None,
            })
            .collect()
    }

    /// Swaps the row's messages for a fresh validation result.
    fn replace_row(&mut self, key: RowKey, errors: FieldErrors) {
        self.0.retain(|scope, _| !matches!(scope, ErrorScope::Row(k, _) if *k == key));
        for (field, message) in errors {
            self.0.insert(ErrorScope::Row(key, field), message);
        }
    }

    fn replace_draft(&mut self, errors: FieldErrors) {
        self.clear_draft();
        for (field, message) in errors {
            self.0.insert(ErrorScope::Draft(field), message);
        }
    }

    fn clear_draft(&mut self) {
        self.0.retain(|scope, _| !matches!(scope, ErrorScope::Draft(_)));
    }

    fn retain_rows(&mut self, live: &HashSet<RowKey>) {
        self.0.retain(|scope, _| match scope {
            ErrorScope::Row(key, _) => live.contains(key),
            ErrorScope::Draft(_) => true,
        });
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CommitOutcome {
    Committed(RowKey),
    /// The draft failed validation and was kept.
    Rejected(FieldErrors),
    NoDraft,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderedCell {
    pub field: Field,
    pub text: String,
    pub error: Option<String>,
    pub band: Option<VersionBand>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderedRow {
    Data {
        index: usize,
        start: u64,
        key: RowKey,
        /// One-based position shown in the gutter.
        number: usize,
        selected: bool,
        cells: Vec<RenderedCell>,
    },
    /// The trailing slot: an "Add row" prompt, or the draft being composed.
    AddRow {
        index: usize,
        start: u64,
        draft: Option<Vec<RenderedCell>>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderedWindow {
    pub total_size: u64,
    pub row_count: usize,
    pub scroll_offset: u64,
    pub height: u32,
    pub all_selected: bool,
    pub query: String,
    pub rows: Vec<RenderedRow>,
}

pub struct DataGrid {
    store: Arc<Store>,
    changes: watch::Receiver<u64>,
    seen_revision: u64,
    displayed: Vec<Row>,
    draft: Option<Record>,
    errors: ErrorMap,
    selected: BTreeSet<RowKey>,
    viewport: Viewport,
    search: Debouncer<String>,
    query: String,
}

impl DataGrid {
    pub fn new(store: Arc<Store>, viewport: Viewport) -> Self {
        Self::with_debounce(store, viewport, SEARCH_DEBOUNCE)
    }

    pub fn with_debounce(store: Arc<Store>, viewport: Viewport, delay: Duration) -> Self {
        let changes = store.subscribe();
        let seen_revision = *changes.borrow();
        let displayed = store.rows();
        DataGrid {
            store,
            changes,
            seen_revision,
            displayed,
            draft: None,
            errors: ErrorMap::default(),
            selected: BTreeSet::new(),
            viewport,
            search: Debouncer::new(delay),
            query: String::new(),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn displayed_rows(&self) -> &[Row] {
        &self.displayed
    }

    /// Data rows plus the trailing add-row slot.
    pub fn row_count(&self) -> usize {
        self.displayed.len() + 1
    }

    pub fn row_at(&self, index: usize) -> Option<&Row> {
        self.displayed.get(index)
    }

    pub fn index_of(&self, key: RowKey) -> Option<usize> {
        self.displayed.iter().position(|row| row.key == key)
    }

    pub fn draft(&self) -> Option<&Record> {
        self.draft.as_ref()
    }

    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    // Edits to stored rows

    /// Writes `text` into a stored row, persists the sheet and re-validates
    /// the row. The edit is never rejected; failures only show up as errors.
    pub fn edit_cell(
        &mut self,
        key: RowKey,
        field: Field,
        text: &str,
    ) -> Result<FieldErrors, StoreError> {
        let result = self.store.update_row(key, |record| record.set_text(field, text));
        let updated = match result {
            Ok(record) => record,
            Err(StoreError::UnknownRow(k)) => return Err(StoreError::UnknownRow(k)),
            Err(e) => {
                // memory was updated even though the write failed
                if let Some(record) = self.store.row(key) {
                    self.replace_displayed(key, record);
                }
                self.acknowledge_own_write();
                return Err(e);
            }
        };
        self.acknowledge_own_write();

        let errors = validate(&updated);
        self.errors.replace_row(key, errors.clone());
        self.replace_displayed(key, updated);
        Ok(errors)
    }

    fn replace_displayed(&mut self, key: RowKey, record: Record) {
        if let Some(row) = self.displayed.iter_mut().find(|row| row.key == key) {
            row.record = record;
        }
    }

    /// Marks a revision bump caused by this grid as seen, unless someone
    /// else also wrote in the meantime.
    fn acknowledge_own_write(&mut self) {
        let current = *self.changes.borrow();
        if current == self.seen_revision + 1 {
            self.seen_revision = current;
        }
    }

    // The new-row draft

    pub fn begin_draft(&mut self) {
        self.begin_draft_on(Local::now().date_naive());
    }

    /// Starts a draft dated `today`. Does nothing if one is already open.
    pub fn begin_draft_on(&mut self, today: NaiveDate) {
        if self.draft.is_none() {
            self.draft = Some(Record::draft(today));
        }
    }

    pub fn edit_draft(&mut self, field: Field, text: &str) -> bool {
        match self.draft.as_mut() {
            Some(draft) => {
                draft.set_text(field, text);
                true
            }
            None => false,
        }
    }

    /// Validates the draft and appends it to the sheet if it passes.
    pub fn commit_draft(&mut self) -> Result<CommitOutcome, StoreError> {
        let Some(draft) = self.draft.as_ref() else {
            return Ok(CommitOutcome::NoDraft);
        };

        let errors = validate(draft);
        if !errors.is_empty() {
            debug!("draft rejected: {:?}", errors.keys().collect::<Vec<_>>());
            self.errors.replace_draft(errors.clone());
            return Ok(CommitOutcome::Rejected(errors));
        }

        let record = draft.clone();
        let key = self.store.append(record.clone())?;
        self.acknowledge_own_write();
        self.errors.clear_draft();
        self.draft = None;
        if self.query.is_empty() || record.matches(&self.query.to_lowercase()) {
            self.displayed.push(Row { key, record });
        }
        Ok(CommitOutcome::Committed(key))
    }

    pub fn discard_draft(&mut self) {
        self.draft = None;
        self.errors.clear_draft();
    }

    // Selection

    pub fn is_selected(&self, key: RowKey) -> bool {
        self.selected.contains(&key)
    }

    pub fn selected(&self) -> &BTreeSet<RowKey> {
        &self.selected
    }

    pub fn toggle_select(&mut self, key: RowKey) {
        if !self.selected.remove(&key) {
            self.selected.insert(key);
        }
    }

    pub fn all_selected(&self) -> bool {
        !self.displayed.is_empty() && self.displayed.iter().all(|row| self.selected.contains(&row.key))
    }

    /// Selects every displayed row, or clears the selection if they already are.
    pub fn toggle_select_all(&mut self) {
        if self.displayed.is_empty() {
            return;
        }
        if self.all_selected() {
            self.selected.clear();
        } else {
            self.selected = self.displayed.iter().map(|row| row.key).collect();
        }
    }

    // Search

    /// Feeds the search box; the query takes effect once typing pauses.
    pub fn set_search_query(&mut self, query: &str, now: Instant) {
        self.search.push(query.to_string(), now);
    }

    /// Re-derives the displayed rows from the whole sheet. Each call starts
    /// from scratch, so filters never stack.
    pub fn apply_filter(&mut self, query: &str) {
        self.query = query.to_string();
        let needle = query.to_lowercase();
        self.displayed = self
            .store
            .rows()
            .into_iter()
            .filter(|row| needle.is_empty() || row.record.matches(&needle))
            .collect();
        self.seen_revision = *self.changes.borrow();
        debug!("filter {:?} shows {} rows", query, self.displayed.len());

        let count = self.row_count();
        let offset = self.viewport.scroll_offset;
        self.viewport.scroll_to(offset, count);
    }

    /// Applies a settled search and picks up store changes made elsewhere.
    /// Returns whether the displayed rows were re-derived.
    pub fn tick(&mut self, now: Instant) -> bool {
        if let Some(query) = self.search.poll(now) {
            self.apply_filter(&query);
            return true;
        }
        if *self.changes.borrow() != self.seen_revision {
            self.refresh();
            return true;
        }
        false
    }

    /// Rebuilds the view from the store, keeping the current query and
    /// dropping selection and errors for rows that are gone.
    pub fn refresh(&mut self) {
        let query = self.query.clone();
        self.apply_filter(&query);

        let live: HashSet<RowKey> = self.store.rows().iter().map(|row| row.key).collect();
        self.selected.retain(|key| live.contains(key));
        self.errors.retain_rows(&live);
    }

    // Windowing

    pub fn scroll_to(&mut self, offset: u64) {
        let count = self.row_count();
        self.viewport.scroll_to(offset, count);
    }

    pub fn scroll_by_rows(&mut self, delta: i64) {
        let count = self.row_count();
        self.viewport.scroll_by_rows(delta, count);
    }

    pub fn resize(&mut self, height: u32) {
        let count = self.row_count();
        self.viewport.resize(height, count);
    }

    pub fn render_window(&self) -> RenderedWindow {
        let today = Local::now().date_naive();
        let count = self.row_count();

        let rows = self
            .viewport
            .virtual_rows(count)
            .into_iter()
            .map(|item| match self.displayed.get(item.index) {
                Some(row) => RenderedRow::Data {
                    index: item.index,
                    start: item.start,
                    key: row.key,
                    number: item.index + 1,
                    selected: self.selected.contains(&row.key),
                    cells: Field::ALL
                        .iter()
                        .map(|field| RenderedCell {
                            field: *field,
                            text: display_text(&row.record, *field, Some(today)),
                            error: self
                                .errors
                                .get(ErrorScope::Row(row.key, *field))
                                .map(str::to_string),
                            band: band_of(&row.record, *field),
                        })
                        .collect(),
                },
                None => RenderedRow::AddRow {
                    index: item.index,
                    start: item.start,
                    draft: self.draft.as_ref().map(|draft| {
                        Field::ALL
                            .iter()
                            .map(|field| RenderedCell {
                                field: *field,
                                text: display_text(draft, *field, None),
                                error: self.errors.get(ErrorScope::Draft(*field)).map(str::to_string),
                                band: band_of(draft, *field),
                            })
                            .collect()
                    }),
                },
            })
            .collect();

        RenderedWindow {
            total_size: self.viewport.total_size(count),
            row_count: count,
            scroll_offset: self.viewport.scroll_offset,
            height: self.viewport.height,
            all_selected: self.all_selected(),
            query: self.query.clone(),
            rows,
        }
    }
}

fn band_of(record: &Record, field: Field) -> Option<VersionBand> {
    match field {
        Field::Version => record.version.as_ref().and_then(version_band),
        _ => None,
    }
}

/// Cell text as shown. Dates are normalized to `YYYY-MM-DD`; a stored row
/// with no date shows `fallback_today`. Unparseable dates show as typed.
pub fn display_text(record: &Record, field: Field, fallback_today: Option<NaiveDate>) -> String {
    match (field, record.get(field)) {
        (Field::Created, Some(value)) if !value.is_empty() => parse_date(value)
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| value.to_string()),
        (Field::Created, _) => fallback_today
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        (_, value) => value.map(|v| v.to_string()).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;

    fn person(id: &str, name: &str) -> Record {
        Record::default()
            .with_text(Field::Id, id)
            .with_text(Field::Name, name)
            .with_text(Field::Bio, "bio")
    }

    fn grid_with(records: Vec<Record>) -> DataGrid {
        let store = Arc::new(Store::in_memory());
        store.seed_if_empty(records).unwrap();
        DataGrid::new(store, Viewport::new(480))
    }

    #[test]
    fn error_scopes_render_like_their_keys() {
        let key = RowKey::new();
        assert_eq!(ErrorScope::Draft(Field::Bio).to_string(), "bio");
        assert_eq!(ErrorScope::Row(key, Field::Version).to_string(), format!("{}.version", key));
    }

    #[test]
    fn fixing_a_field_clears_its_error() {
        let mut grid = grid_with(vec![person("1", "Ada")]);
        let key = grid.displayed_rows()[0].key;

        let errors = grid.edit_cell(key, Field::Name, "").unwrap();
        assert_eq!(errors[&Field::Name], "Name is required");
        assert_eq!(grid.errors().get(ErrorScope::Row(key, Field::Name)), Some("Name is required"));

        let errors = grid.edit_cell(key, Field::Name, "Ada L").unwrap();
        assert!(errors.is_empty());
        assert!(grid.errors().is_empty());
    }

    #[test]
    fn errors_stay_with_their_row_after_filtering() {
        let mut grid = grid_with(vec![person("1", "Ada"), person("2", "Bob")]);
        let bob = grid.displayed_rows()[1].key;
        grid.edit_cell(bob, Field::Version, "abc").unwrap();

        grid.apply_filter("bob");
        let window = grid.render_window();
        let RenderedRow::Data { key, cells, .. } = &window.rows[0] else {
            panic!("expected a data row");
        };
        assert_eq!(*key, bob);
        let version = cells.iter().find(|c| c.field == Field::Version).unwrap();
        assert_eq!(version.error.as_deref(), Some("Version must be a number"));
        assert_eq!(version.text, "abc");
    }

    #[test]
    fn rejected_draft_is_kept_and_fixed_draft_commits() {
        let mut grid = grid_with(vec![]);
        grid.begin_draft();
        grid.edit_draft(Field::Id, "1");

        let CommitOutcome::Rejected(errors) = grid.commit_draft().unwrap() else {
            panic!("draft without name should be rejected");
        };
        assert_eq!(errors.keys().copied().collect::<Vec<_>>(), vec![Field::Bio, Field::Name]);
        assert!(grid.draft().is_some());
        assert_eq!(grid.errors().get(ErrorScope::Draft(Field::Name)), Some("Name is required"));

        grid.edit_draft(Field::Name, "A");
        grid.edit_draft(Field::Bio, "x");
        assert!(matches!(grid.commit_draft().unwrap(), CommitOutcome::Committed(_)));
        assert!(grid.draft().is_none());
        assert!(grid.errors().is_empty());
        assert_eq!(grid.displayed_rows().len(), 1);
        assert_eq!(grid.commit_draft().unwrap(), CommitOutcome::NoDraft);
    }

    #[test]
    fn begin_draft_keeps_an_open_draft() {
        let mut grid = grid_with(vec![]);
        grid.begin_draft();
        grid.edit_draft(Field::Name, "kept");
        grid.begin_draft();
        assert_eq!(grid.draft().unwrap().text(Field::Name), "kept");
        grid.discard_draft();
        assert!(!grid.edit_draft(Field::Name, "x"));
    }

    #[test]
    fn select_all_is_all_or_nothing() {
        let mut grid = grid_with(vec![person("1", "a"), person("2", "b"), person("3", "c")]);
        let first = grid.displayed_rows()[0].key;

        grid.toggle_select(first);
        assert!(grid.is_selected(first));
        grid.toggle_select_all();
        assert_eq!(grid.selected().len(), 3);
        assert!(grid.all_selected());
        grid.toggle_select_all();
        assert!(grid.selected().is_empty());

        grid.toggle_select(first);
        grid.toggle_select(first);
        assert!(!grid.is_selected(first));
    }

    #[test]
    fn select_all_with_no_rows_does_nothing() {
        let mut grid = grid_with(vec![]);
        grid.toggle_select_all();
        assert!(grid.selected().is_empty());
        assert!(!grid.all_selected());
    }

    #[test]
    fn search_waits_for_the_debounce() {
        let mut grid = grid_with(vec![person("1", "Ada"), person("2", "Bob")]);
        let t0 = Instant::now();

        grid.set_search_query("ADA", t0);
        assert!(!grid.tick(t0 + Duration::from_millis(100)));
        assert_eq!(grid.displayed_rows().len(), 2);

        assert!(grid.tick(t0 + Duration::from_millis(500)));
        assert_eq!(grid.displayed_rows().len(), 1);
        assert_eq!(grid.query(), "ADA");
    }

    #[test]
    fn filters_start_from_the_whole_sheet() {
        let mut grid = grid_with(vec![person("1", "Ada"), person("2", "Bob")]);
        grid.apply_filter("ada");
        grid.apply_filter("bob");
        assert_eq!(grid.displayed_rows().len(), 1);
        assert_eq!(grid.displayed_rows()[0].record.text(Field::Name), "Bob");
        grid.apply_filter("");
        assert_eq!(grid.displayed_rows().len(), 2);
    }

    #[test]
    fn own_edits_do_not_refilter() {
        let mut grid = grid_with(vec![person("1", "Ada"), person("2", "Bob")]);
        grid.apply_filter("ada");
        let key = grid.displayed_rows()[0].key;
        grid.edit_cell(key, Field::Name, "Zed").unwrap();

        assert!(!grid.tick(Instant::now()));
        assert_eq!(grid.displayed_rows().len(), 1);
        assert_eq!(grid.displayed_rows()[0].record.text(Field::Name), "Zed");
    }

    #[test]
    fn foreign_store_changes_are_picked_up_on_tick() {
        let store = Arc::new(Store::in_memory());
        let mut grid = DataGrid::new(store.clone(), Viewport::new(480));
        assert!(grid.displayed_rows().is_empty());

        store.seed_if_empty(vec![person("1", "Ada")]).unwrap();
        assert!(grid.tick(Instant::now()));
        assert_eq!(grid.displayed_rows().len(), 1);
    }

    #[test]
    fn replaced_rows_lose_their_selection() {
        let mut grid = grid_with(vec![person("1", "Ada")]);
        let key = grid.displayed_rows()[0].key;
        grid.toggle_select(key);
        grid.store().reload();
        grid.tick(Instant::now());
        assert!(grid.selected().is_empty());
    }

    #[test]
    fn window_ends_with_the_add_row_slot() {
        let mut grid = grid_with(vec![person("1", "Ada")]);
        let window = grid.render_window();
        assert_eq!(window.row_count, 2);
        assert_eq!(window.total_size, 96);
        assert!(matches!(window.rows[1], RenderedRow::AddRow { draft: None, index: 1, start: 48 }));

        grid.begin_draft();
        let window = grid.render_window();
        let RenderedRow::AddRow { draft: Some(cells), .. } = &window.rows[1] else {
            panic!("expected the draft in the trailing slot");
        };
        let version = cells.iter().find(|c| c.field == Field::Version).unwrap();
        assert_eq!(version.text, "0");
        assert_eq!(version.band, Some(VersionBand::Low));
    }

    #[test]
    fn missing_created_date_displays_today() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let row = person("1", "Ada");
        assert_eq!(display_text(&row, Field::Created, Some(today)), "2024-05-01");

        let mut dated = row.clone();
        dated.created = Some(FieldValue::text("2020-01-02T03:04:05Z"));
        assert_eq!(display_text(&dated, Field::Created, Some(today)), "2020-01-02");

        dated.created = Some(FieldValue::text("soon"));
        assert_eq!(display_text(&dated, Field::Created, Some(today)), "soon");
    }
}
