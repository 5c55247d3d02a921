//! Local persistence of the sheet.
//!
//! The whole sheet (title plus rows) lives as one JSON blob under a single
//! key of a [`KeyValueStorage`]. [`Store`] is the one service that reads and
//! writes that blob; every other component goes through it and watches its
//! revision channel instead of touching storage directly.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::StoreError;
use crate::record::Record;

/// Storage slot key used when none is configured.
pub const DEFAULT_STORAGE_KEY: &str = "bookmark";

/// A string-keyed slot store.
pub trait KeyValueStorage: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// One `<dir>/<key>.json` file per slot.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStorage { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io_err)?;
        fs::write(self.path_for(key), value).map_err(io_err)
    }
}

/// Process-local slots, used by tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slot(key: &str, value: &str) -> Self {
        let storage = Self::new();
        storage
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        storage
    }
}

impl KeyValueStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(slots.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// The durable state of a sheet, exactly as stored.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub data: Vec<Record>,
}

/// Reads the snapshot stored under `key`.
///
/// Absent, unreadable and malformed slots all come back as the empty
/// default; the only trace of a corrupt slot is a warning in the log.
pub fn load_snapshot(storage: &dyn KeyValueStorage, key: &str) -> Snapshot {
    let raw = match storage.read(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Snapshot::default(),
        Err(e) => {
            warn!("could not read storage slot `{}`: {}", key, e);
            return Snapshot::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("ignoring malformed snapshot in `{}`: {}", key, e);
            Snapshot::default()
        }
    }
}

/// Overwrites the slot with `snapshot`.
pub fn save_snapshot(
    storage: &dyn KeyValueStorage,
    key: &str,
    snapshot: &Snapshot,
) -> Result<(), StoreError> {
    let json = serde_json::to_string(snapshot)?;
    storage.write(key, &json)
}

/// Stable in-memory identity of a stored row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(Uuid);

impl RowKey {
    pub fn new() -> Self {
        RowKey(Uuid::new_v4())
    }
}

impl Default for RowKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RowKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(RowKey)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub key: RowKey,
    pub record: Record,
}

impl Row {
    fn fresh(record: Record) -> Self {
        Row {
            key: RowKey::new(),
            record,
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    name: Option<String>,
    rows: Vec<Row>,
}

impl StoreState {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        StoreState {
            name: snapshot.name,
            rows: snapshot.data.into_iter().map(Row::fresh).collect(),
        }
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            name: self.name.clone(),
            data: self.rows.iter().map(|row| row.record.clone()).collect(),
        }
    }
}

/// The persistence service.
///
/// Mutations update memory first, then rewrite the whole slot, then bump the
/// revision published to subscribers. A failed write leaves the in-memory
/// change in place and is reported to the caller, except for
/// [`Store::append`], which takes the new row back out.
pub struct Store {
    storage: Box<dyn KeyValueStorage>,
    key: String,
    state: Mutex<StoreState>,
    revision: watch::Sender<u64>,
}

impl Store {
    pub fn open(storage: impl KeyValueStorage + 'static, key: impl Into<String>) -> Self {
        let key = key.into();
        let snapshot = load_snapshot(&storage, &key);
        debug!("opened `{}` with {} rows", key, snapshot.data.len());
        let (revision, _) = watch::channel(0);

        Store {
            storage: Box::new(storage),
            key,
            state: Mutex::new(StoreState::from_snapshot(snapshot)),
            revision,
        }
    }

    pub fn in_memory() -> Self {
        Self::open(MemoryStorage::new(), DEFAULT_STORAGE_KEY)
    }

    pub fn storage_key(&self) -> &str {
        &self.key
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit(&self, state: &StoreState) -> Result<(), StoreError> {
        let result = save_snapshot(self.storage.as_ref(), &self.key, &state.to_snapshot());
        match &result {
            Ok(()) => debug!("persisted {} rows under `{}`", state.rows.len(), self.key),
            Err(e) => warn!("failed to persist `{}`: {}", self.key, e),
        }
        self.revision.send_modify(|rev| *rev += 1);
        result
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state().to_snapshot()
    }

    pub fn rows(&self) -> Vec<Row> {
        self.state().rows.clone()
    }

    pub fn row(&self, key: RowKey) -> Option<Record> {
        self.state()
            .rows
            .iter()
            .find(|row| row.key == key)
            .map(|row| row.record.clone())
    }

    pub fn len(&self) -> usize {
        self.state().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().rows.is_empty()
    }

    pub fn title(&self) -> Option<String> {
        self.state().name.clone()
    }

    pub fn set_title(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        state.name = Some(name.to_string());
        self.commit(&state)
    }

    /// Applies `edit` to the row and persists the whole sheet.
    pub fn update_row(
        &self,
        key: RowKey,
        edit: impl FnOnce(&mut Record),
    ) -> Result<Record, StoreError> {
        let mut state = self.state();
        let row = state
            .rows
            .iter_mut()
            .find(|row| row.key == key)
            .ok_or_else(|| StoreError::UnknownRow(key.to_string()))?;
        edit(&mut row.record);
        let updated = row.record.clone();
        self.commit(&state)?;
        Ok(updated)
    }

    pub fn append(&self, record: Record) -> Result<RowKey, StoreError> {
        let mut state = self.state();
        let row = Row::fresh(record);
        let key = row.key;
        state.rows.push(row);
        if let Err(e) = self.commit(&state) {
            // a failed append leaves no row behind
            state.rows.pop();
            return Err(e);
        }
        Ok(key)
    }

    /// Installs `records` only if the sheet currently has no rows.
    ///
    /// The emptiness check and the write happen under one lock, so rows
    /// added by an edit that raced the fetch are never overwritten.
    pub fn seed_if_empty(&self, records: Vec<Record>) -> Result<bool, StoreError> {
        let mut state = self.state();
        if !state.rows.is_empty() {
            return Ok(false);
        }
        state.rows = records.into_iter().map(Row::fresh).collect();
        self.commit(&state)?;
        Ok(true)
    }

    /// Replaces title and rows wholesale. Every row gets a new key.
    pub fn replace_all(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        let mut state = self.state();
        *state = StoreState::from_snapshot(snapshot);
        self.commit(&state)
    }

    /// Re-reads the slot, picking up whatever another writer left there.
    pub fn reload(&self) {
        let snapshot = load_snapshot(self.storage.as_ref(), &self.key);
        let mut state = self.state();
        *state = StoreState::from_snapshot(snapshot);
        self.revision.send_modify(|rev| *rev += 1);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("key", &self.key)
            .field("rows", &self.len())
            .field("revision", &self.revision())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Field;

    fn row(id: &str) -> Record {
        Record::default()
            .with_text(Field::Id, id)
            .with_text(Field::Name, "n")
            .with_text(Field::Bio, "b")
    }

    #[test]
    fn absent_and_malformed_slots_load_empty() {
        let empty = MemoryStorage::new();
        assert_eq!(load_snapshot(&empty, "bookmark"), Snapshot::default());

        let corrupt = MemoryStorage::with_slot("bookmark", "{not json");
        assert_eq!(load_snapshot(&corrupt, "bookmark"), Snapshot::default());

        let bare = MemoryStorage::with_slot("bookmark", "{}");
        let snapshot = load_snapshot(&bare, "bookmark");
        assert!(snapshot.data.is_empty());
        assert_eq!(snapshot.name, None);
    }

    #[test]
    fn data_is_always_written_as_an_array() {
        let storage = MemoryStorage::new();
        save_snapshot(&storage, "bookmark", &Snapshot::default()).unwrap();
        assert_eq!(storage.read("bookmark").unwrap().as_deref(), Some(r#"{"data":[]}"#));
    }

    #[test]
    fn seeding_only_happens_once() {
        let store = Store::in_memory();
        assert!(store.seed_if_empty(vec![row("1"), row("2")]).unwrap());
        assert!(!store.seed_if_empty(vec![row("3")]).unwrap());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn seeding_is_abandoned_after_an_edit() {
        let store = Store::in_memory();
        store.append(row("mine")).unwrap();
        assert!(!store.seed_if_empty(vec![row("1")]).unwrap());
        assert_eq!(store.snapshot().data, vec![row("mine")]);
    }

    #[test]
    fn mutations_bump_the_revision() {
        let store = Store::in_memory();
        let mut changes = store.subscribe();
        assert!(!changes.has_changed().unwrap());

        let key = store.append(row("1")).unwrap();
        assert!(changes.has_changed().unwrap());
        changes.borrow_and_update();

        store.update_row(key, |r| r.set_text(Field::Name, "x")).unwrap();
        assert!(changes.has_changed().unwrap());
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn unknown_rows_are_reported() {
        let store = Store::in_memory();
        let result = store.update_row(RowKey::new(), |_| {});
        assert!(matches!(result, Err(StoreError::UnknownRow(_))));
    }

    #[test]
    fn file_storage_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(FileStorage::new(dir.path()), "bookmark");
        store.set_title("people").unwrap();
        store.append(row("1")).unwrap();
        drop(store);

        let reopened = Store::open(FileStorage::new(dir.path()), "bookmark");
        assert_eq!(reopened.title().as_deref(), Some("people"));
        assert_eq!(reopened.snapshot().data, vec![row("1")]);
    }

    #[test]
    fn reload_picks_up_foreign_writes() {
        let dir = tempfile::tempdir().unwrap();
        let ours = Store::open(FileStorage::new(dir.path()), "bookmark");
        let theirs = Store::open(FileStorage::new(dir.path()), "bookmark");

        theirs.append(row("other tab")).unwrap();
        assert!(ours.is_empty());
        ours.reload();
        assert_eq!(ours.len(), 1);
    }

    /// Storage whose next write fails while `failing` is set.
    #[derive(Default)]
    struct FlakyStorage {
        inner: MemoryStorage,
        failing: std::sync::atomic::AtomicBool,
    }

    impl KeyValueStorage for FlakyStorage {
        fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.read(key)
        }

        fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
            if self.failing.swap(false, std::sync::atomic::Ordering::SeqCst) {
                return Err(StoreError::Io {
                    key: key.to_string(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.inner.write(key, value)
        }
    }

    #[test]
    fn failed_append_is_rolled_back() {
        let storage = FlakyStorage::default();
        storage.failing.store(true, std::sync::atomic::Ordering::SeqCst);
        let store = Store::open(storage, "bookmark");

        assert!(store.append(row("1")).is_err());
        assert!(store.is_empty());

        store.append(row("1")).unwrap();
        assert_eq!(store.snapshot().data, vec![row("1")]);
    }

    #[test]
    fn unexpected_field_types_do_not_empty_the_sheet() {
        let storage = MemoryStorage::with_slot(
            "bookmark",
            r#"{"name":"t","data":[{"id":"1","state":false,"version":null}]}"#,
        );
        let snapshot = load_snapshot(&storage, "bookmark");
        assert_eq!(snapshot.name.as_deref(), Some("t"));
        assert_eq!(snapshot.data.len(), 1);
        assert_eq!(snapshot.data[0].text(Field::State), "false");
    }

    #[test]
    fn row_keys_round_trip_through_text() {
        let key = RowKey::new();
        assert_eq!(key.to_string().parse::<RowKey>().unwrap(), key);
    }
}
