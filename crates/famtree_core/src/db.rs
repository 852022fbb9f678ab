//! Family Tree storage on redb.
//!
//! Each primary kind has a data table keyed by handle and an index table
//! mapping Gramps IDs back to handles. Records are postcard-encoded.
//! All changes go through a [`Transaction`] which is applied inside a single
//! redb write transaction: either every staged write lands or none does.
//!
//! Committed transactions are kept in an in-memory undo log, and every
//! commit, undo and redo emits `<kind>-add`, `<kind>-update` and
//! `<kind>-delete` on the tree's [`SignalHub`] before returning.

use crate::error::{FamError, Result, StorageOpenReason};
use crate::lock::TreeLock;
use crate::objects::{ObjectKind, PrimaryObject, SignalAction};
use crate::signals::SignalHub;
use crate::{Config, Handle};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Backend identifier written to `database.txt`.
pub const BACKEND_ID: &str = "redb";
/// Data file inside a tree directory.
pub const DATA_FILE: &str = "tree.redb";
/// Tree title file.
pub const NAME_FILE: &str = "name.txt";
/// Backend id file.
pub const BACKEND_FILE: &str = "database.txt";
/// Summary written on close and read by listings.
pub const META_FILE: &str = "meta.json";
/// Marker left by an interrupted session.
pub const RECOVER_FILE: &str = "need_recover";

/// Progress callback, called with a percentage.
pub type ProgressCallback<'a> = &'a dyn Fn(u8);

/// Access mode of an open tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbMode {
    /// No writes, no lock.
    ReadOnly,
    /// Writes allowed; the tree lock is held while open.
    ReadWrite,
}

fn data_table(kind: ObjectKind) -> TableDefinition<'static, &'static str, &'static [u8]> {
    TableDefinition::new(kind.name())
}

fn id_table(kind: ObjectKind) -> TableDefinition<'static, &'static str, &'static str> {
    TableDefinition::new(match kind {
        ObjectKind::Person => "person_ids",
        ObjectKind::Family => "family_ids",
        ObjectKind::Event => "event_ids",
        ObjectKind::Place => "place_ids",
        ObjectKind::Source => "source_ids",
        ObjectKind::Citation => "citation_ids",
        ObjectKind::Repository => "repository_ids",
        ObjectKind::Media => "media_ids",
        ObjectKind::Note => "note_ids",
    })
}

/// Stored form of a primary object: its Gramps ID next to the encoded body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredRecord {
    gramps_id: String,
    data: Vec<u8>,
}

impl StoredRecord {
    fn from_object<T: PrimaryObject>(obj: &T) -> Result<Self> {
        let data = postcard::to_allocvec(obj)
            .map_err(|e| FamError::Encoding(format!("failed to encode {}: {}", T::KIND, e)))?;
        Ok(Self {
            gramps_id: obj.gramps_id().to_string(),
            data,
        })
    }

    fn decode_object<T: PrimaryObject>(&self) -> Result<T> {
        postcard::from_bytes(&self.data)
            .map_err(|e| FamError::Encoding(format!("failed to decode {}: {}", T::KIND, e)))
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| FamError::Encoding(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        postcard::from_bytes(bytes).map_err(|e| FamError::Encoding(e.to_string()))
    }
}

#[derive(Debug, Clone)]
struct StagedWrite {
    kind: ObjectKind,
    handle: Handle,
    record: Option<StoredRecord>,
}

/// A set of staged writes committed atomically under one label.
///
/// The label is what the undo history shows, e.g. "Add Family".
#[derive(Debug)]
pub struct Transaction {
    label: String,
    writes: Vec<StagedWrite>,
}

impl Transaction {
    /// Starts an empty transaction.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            writes: Vec::new(),
        }
    }

    /// Undo-history description.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Replaces the description.
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// True if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Number of staged writes.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Stages `obj` for writing. The object must already have a handle.
    pub fn put<T: PrimaryObject>(&mut self, obj: &T) -> Result<()> {
        let handle = obj.handle().cloned().ok_or_else(|| {
            FamError::Storage(format!("cannot store a {} without a handle", T::KIND))
        })?;
        self.writes.push(StagedWrite {
            kind: T::KIND,
            handle,
            record: Some(StoredRecord::from_object(obj)?),
        });
        Ok(())
    }

    /// Stages removal of an object.
    pub fn remove(&mut self, kind: ObjectKind, handle: &Handle) {
        self.writes.push(StagedWrite {
            kind,
            handle: handle.clone(),
            record: None,
        });
    }

    /// True if this transaction writes the given object.
    pub fn touches(&self, kind: ObjectKind, handle: &Handle) -> bool {
        self.writes
            .iter()
            .any(|w| w.kind == kind && &w.handle == handle)
    }

    fn stages_id(&self, kind: ObjectKind, gramps_id: &str) -> bool {
        self.writes.iter().any(|w| {
            w.kind == kind
                && w.record
                    .as_ref()
                    .is_some_and(|r| r.gramps_id == gramps_id)
        })
    }
}

#[derive(Debug, Clone)]
struct Change {
    kind: ObjectKind,
    handle: Handle,
    before: Option<StoredRecord>,
    after: Option<StoredRecord>,
}

#[derive(Debug, Clone)]
struct UndoEntry {
    label: String,
    changes: Vec<Change>,
}

/// Per-tree summary persisted in `meta.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeMeta {
    /// Object count per kind name.
    pub counts: BTreeMap<String, u64>,
    /// Unix seconds of the last change, if any.
    pub last_modified: Option<i64>,
    /// Backend that wrote the tree.
    pub backend: String,
}

impl TreeMeta {
    /// Reads `meta.json` from a tree directory.
    pub fn read(tree_dir: &Path) -> Option<Self> {
        let text = fs::read_to_string(tree_dir.join(META_FILE)).ok()?;
        match serde_json::from_str(&text) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(path = %tree_dir.display(), error = %e, "unreadable tree summary");
                None
            }
        }
    }

    /// Writes `meta.json` into a tree directory.
    pub fn write(&self, tree_dir: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| FamError::Encoding(format!("failed to encode tree summary: {}", e)))?;
        fs::write(tree_dir.join(META_FILE), text)?;
        Ok(())
    }

    /// Count for one kind.
    pub fn count(&self, kind: ObjectKind) -> u64 {
        self.counts.get(kind.name()).copied().unwrap_or(0)
    }
}

/// Expands a Gramps ID template such as `I%04d`.
///
/// # Examples
///
/// ```
/// use famtree_core::db::format_gramps_id;
///
/// assert_eq!(format_gramps_id("I%04d", 7), "I0007");
/// assert_eq!(format_gramps_id("F%d-x", 12), "F12-x");
/// assert_eq!(format_gramps_id("N", 3), "N3");
/// ```
pub fn format_gramps_id(template: &str, number: u32) -> String {
    if let Some(start) = template.find('%') {
        let rest = &template[start + 1..];
        if let Some(end) = rest.find('d') {
            let spec = &rest[..end];
            if spec.chars().all(|c| c.is_ascii_digit()) {
                let width: usize = spec.parse().unwrap_or(0);
                let number = if spec.starts_with('0') {
                    format!("{:0width$}", number, width = width)
                } else {
                    format!("{:width$}", number, width = width)
                };
                return format!("{}{}{}", &template[..start], number, &rest[end + 1..]);
            }
        }
    }
    format!("{}{}", template, number)
}

/// An open Family Tree.
///
/// Shared through `Rc` between the dispatcher and edit sessions; all
/// operations take `&self`.
pub struct FamilyTreeDb {
    dir: PathBuf,
    db: Database,
    mode: DbMode,
    lock: RefCell<Option<TreeLock>>,
    signals: SignalHub,
    id_templates: RefCell<BTreeMap<ObjectKind, String>>,
    id_counters: RefCell<BTreeMap<ObjectKind, u32>>,
    undo_log: RefCell<Vec<UndoEntry>>,
    redo_log: RefCell<Vec<UndoEntry>>,
    modified: Cell<bool>,
    closed: Cell<bool>,
}

impl std::fmt::Debug for FamilyTreeDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FamilyTreeDb")
            .field("dir", &self.dir)
            .field("mode", &self.mode)
            .field("closed", &self.closed.get())
            .finish()
    }
}

impl FamilyTreeDb {
    /// Opens the tree stored in `tree_dir`.
    ///
    /// A read-write open takes the tree lock and creates the data file if the
    /// directory does not have one yet.
    ///
    /// # Errors
    ///
    /// [`FamError::StorageOpen`] if the tree is locked, needs recovery, was
    /// written by another backend, or does not exist.
    pub fn open(tree_dir: &Path, mode: DbMode, progress: Option<ProgressCallback<'_>>) -> Result<Self> {
        let open_err = |reason| FamError::StorageOpen {
            path: tree_dir.to_path_buf(),
            reason,
        };
        if !tree_dir.is_dir() {
            return Err(open_err(StorageOpenReason::NotFound));
        }
        if tree_dir.join(RECOVER_FILE).exists() {
            return Err(open_err(StorageOpenReason::NeedsRecovery));
        }
        if let Ok(backend) = fs::read_to_string(tree_dir.join(BACKEND_FILE)) {
            let backend = backend.trim();
            if !backend.is_empty() && backend != BACKEND_ID {
                return Err(open_err(StorageOpenReason::BackendUnavailable {
                    backend: backend.to_string(),
                }));
            }
        }

        let data_path = tree_dir.join(DATA_FILE);
        let (db, lock) = match mode {
            DbMode::ReadOnly => {
                if !data_path.exists() {
                    return Err(open_err(StorageOpenReason::NotFound));
                }
                let db = Database::open(&data_path)
                    .map_err(|e| open_err(StorageOpenReason::Backend(e.to_string())))?;
                (db, None)
            }
            DbMode::ReadWrite => {
                let lock = TreeLock::acquire(tree_dir)?;
                let db = Database::create(&data_path)
                    .map_err(|e| open_err(StorageOpenReason::Backend(e.to_string())))?;
                (db, Some(lock))
            }
        };

        let tree = Self {
            dir: tree_dir.to_path_buf(),
            db,
            mode,
            lock: RefCell::new(lock),
            signals: SignalHub::new(),
            id_templates: RefCell::new(default_id_templates(&Config::default())),
            id_counters: RefCell::new(BTreeMap::new()),
            undo_log: RefCell::new(Vec::new()),
            redo_log: RefCell::new(Vec::new()),
            modified: Cell::new(false),
            closed: Cell::new(false),
        };

        if mode == DbMode::ReadWrite {
            tree.create_tables()?;
        }
        let total = ObjectKind::ALL.len();
        for (i, kind) in ObjectKind::ALL.iter().enumerate() {
            let count = tree.count(*kind)?;
            debug!(kind = %kind, count, "loaded table");
            if let Some(progress) = progress {
                progress(((i + 1) * 100 / total) as u8);
            }
        }
        info!(path = %tree_dir.display(), ?mode, "opened family tree");
        Ok(tree)
    }

    fn create_tables(&self) -> Result<()> {
        let write_txn = self.begin_write()?;
        for kind in ObjectKind::ALL {
            write_txn
                .open_table(data_table(kind))
                .map_err(|e| FamError::storage("failed to create table", e))?;
            write_txn
                .open_table(id_table(kind))
                .map_err(|e| FamError::storage("failed to create table", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| FamError::storage("failed to commit", e))
    }

    /// Takes the Gramps-ID templates from `config`.
    pub fn apply_config(&self, config: &Config) {
        *self.id_templates.borrow_mut() = default_id_templates(config);
    }

    /// Gramps-ID template in use for `kind`, e.g. `I%04d`.
    pub fn id_template(&self, kind: ObjectKind) -> String {
        self.id_templates
            .borrow()
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| "X%04d".to_string())
    }

    /// Tree directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Title from `name.txt`, falling back to the directory name.
    pub fn name(&self) -> String {
        fs::read_to_string(self.dir.join(NAME_FILE))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| {
                self.dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
    }

    /// Access mode.
    pub fn mode(&self) -> DbMode {
        self.mode
    }

    /// True if writes are refused.
    pub fn is_read_only(&self) -> bool {
        self.mode == DbMode::ReadOnly
    }

    /// True once [`close`](Self::close) ran.
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Change-notification hub of this tree.
    pub fn signals(&self) -> &SignalHub {
        &self.signals
    }

    /// Starts a new transaction with `label`.
    pub fn transaction(&self, label: impl Into<String>) -> Transaction {
        Transaction::new(label)
    }

    /// Assigns a handle and a Gramps ID where missing, then stages `obj`.
    ///
    /// Returns the object's handle.
    pub fn stage<T: PrimaryObject>(&self, txn: &mut Transaction, obj: &mut T) -> Result<Handle> {
        let handle = match obj.handle() {
            Some(h) => h.clone(),
            None => {
                let h = Handle::generate();
                obj.set_handle(h.clone());
                h
            }
        };
        if obj.gramps_id().trim().is_empty() {
            obj.set_gramps_id(self.next_id(T::KIND, Some(txn))?);
        }
        txn.put(obj)?;
        Ok(handle)
    }

    /// Next unused Gramps ID for `kind`.
    pub fn find_next_id(&self, kind: ObjectKind) -> Result<String> {
        self.next_id(kind, None)
    }

    fn next_id(&self, kind: ObjectKind, txn: Option<&Transaction>) -> Result<String> {
        let template = self.id_template(kind);
        let mut counters = self.id_counters.borrow_mut();
        let counter = counters.entry(kind).or_insert(0);
        loop {
            let candidate = format_gramps_id(&template, *counter);
            *counter += 1;
            let staged = txn.is_some_and(|t| t.stages_id(kind, &candidate));
            if !staged && self.handle_for_id(kind, &candidate)?.is_none() {
                return Ok(candidate);
            }
        }
    }

    /// Applies `txn` atomically, records it for undo and emits signals.
    ///
    /// # Errors
    ///
    /// [`FamError::DuplicateId`] if a staged Gramps ID belongs to another
    /// object; storage errors otherwise. On error nothing is written.
    pub fn commit(&self, txn: Transaction) -> Result<()> {
        self.ensure_writable()?;
        if txn.is_empty() {
            return Ok(());
        }
        let changes = self.apply(&txn.writes, true)?;
        info!(label = %txn.label, writes = changes.len(), "committed transaction");
        self.push_undo(UndoEntry {
            label: txn.label,
            changes: changes.clone(),
        });
        self.redo_log.borrow_mut().clear();
        self.emit_changes(&changes);
        Ok(())
    }

    fn push_undo(&self, entry: UndoEntry) {
        let mut log = self.undo_log.borrow_mut();
        log.push(entry);
        if log.len() > UNDO_DEPTH {
            log.remove(0);
        }
    }

    /// Reverts the most recent transaction. Returns its label.
    pub fn undo(&self) -> Result<Option<String>> {
        self.ensure_writable()?;
        let Some(entry) = self.undo_log.borrow_mut().pop() else {
            return Ok(None);
        };
        let writes: Vec<StagedWrite> = entry
            .changes
            .iter()
            .rev()
            .map(|c| StagedWrite {
                kind: c.kind,
                handle: c.handle.clone(),
                record: c.before.clone(),
            })
            .collect();
        let changes = match self.apply(&writes, false) {
            Ok(changes) => changes,
            Err(e) => {
                self.undo_log.borrow_mut().push(entry);
                return Err(e);
            }
        };
        info!(label = %entry.label, "undo");
        let label = entry.label.clone();
        self.redo_log.borrow_mut().push(entry);
        self.emit_changes(&changes);
        Ok(Some(label))
    }

    /// Re-applies the most recently undone transaction. Returns its label.
    pub fn redo(&self) -> Result<Option<String>> {
        self.ensure_writable()?;
        let Some(entry) = self.redo_log.borrow_mut().pop() else {
            return Ok(None);
        };
        let writes: Vec<StagedWrite> = entry
            .changes
            .iter()
            .map(|c| StagedWrite {
                kind: c.kind,
                handle: c.handle.clone(),
                record: c.after.clone(),
            })
            .collect();
        let changes = match self.apply(&writes, false) {
            Ok(changes) => changes,
            Err(e) => {
                self.redo_log.borrow_mut().push(entry);
                return Err(e);
            }
        };
        info!(label = %entry.label, "redo");
        let label = entry.label.clone();
        self.push_undo(entry);
        self.emit_changes(&changes);
        Ok(Some(label))
    }

    /// Labels of undoable transactions, oldest first.
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_log
            .borrow()
            .iter()
            .map(|e| e.label.clone())
            .collect()
    }

    /// True if [`undo`](Self::undo) has something to revert.
    pub fn can_undo(&self) -> bool {
        !self.undo_log.borrow().is_empty()
    }

    /// True if [`redo`](Self::redo) has something to re-apply.
    pub fn can_redo(&self) -> bool {
        !self.redo_log.borrow().is_empty()
    }

    fn apply(&self, writes: &[StagedWrite], check_ids: bool) -> Result<Vec<Change>> {
        let write_txn = self.begin_write()?;
        match stage_writes(&write_txn, writes, check_ids) {
            Ok(changes) => {
                write_txn
                    .commit()
                    .map_err(|e| FamError::storage("failed to commit", e))?;
                self.modified.set(true);
                Ok(changes)
            }
            Err(e) => {
                if let Err(abort) = write_txn.abort() {
                    warn!(error = %abort, "failed to abort write transaction");
                }
                Err(e)
            }
        }
    }

    fn emit_changes(&self, changes: &[Change]) {
        for kind in ObjectKind::ALL {
            let mut added = Vec::new();
            let mut updated = Vec::new();
            let mut deleted = Vec::new();
            for change in changes.iter().filter(|c| c.kind == kind) {
                let bucket = match (&change.before, &change.after) {
                    (None, Some(_)) => &mut added,
                    (Some(_), Some(_)) => &mut updated,
                    (Some(_), None) => &mut deleted,
                    (None, None) => continue,
                };
                if !bucket.contains(&change.handle) {
                    bucket.push(change.handle.clone());
                }
            }
            self.signals.emit_handles(kind, SignalAction::Add, added);
            self.signals.emit_handles(kind, SignalAction::Update, updated);
            self.signals.emit_handles(kind, SignalAction::Delete, deleted);
        }
    }

    /// Loads an object by handle.
    pub fn get<T: PrimaryObject>(&self, handle: &Handle) -> Result<Option<T>> {
        match self.read_record(T::KIND, handle.as_str())? {
            Some(record) => record.decode_object().map(Some),
            None => Ok(None),
        }
    }

    /// Loads an object by handle, failing if it does not exist.
    pub fn get_required<T: PrimaryObject>(&self, handle: &Handle) -> Result<T> {
        self.get(handle)?.ok_or_else(|| FamError::ObjectNotFound {
            kind: T::KIND.name(),
            handle: handle.to_string(),
        })
    }

    /// True if an object of `kind` with `handle` is stored.
    pub fn find_by_handle(&self, kind: ObjectKind, handle: &Handle) -> Result<bool> {
        Ok(self.read_record(kind, handle.as_str())?.is_some())
    }

    /// Loads an object by Gramps ID.
    pub fn find_by_id<T: PrimaryObject>(&self, gramps_id: &str) -> Result<Option<T>> {
        match self.handle_for_id(T::KIND, gramps_id)? {
            Some(handle) => self.get(&handle),
            None => Ok(None),
        }
    }

    /// Handle of the object of `kind` using `gramps_id`.
    pub fn handle_for_id(&self, kind: ObjectKind, gramps_id: &str) -> Result<Option<Handle>> {
        let read_txn = self.begin_read()?;
        let table = match read_txn.open_table(id_table(kind)) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(FamError::storage("failed to open id table", e)),
        };
        let handle = table
            .get(gramps_id)
            .map_err(|e| FamError::storage("failed to read id index", e))?
            .map(|v| Handle::new(v.value()));
        Ok(handle)
    }

    /// All handles of `kind`, in handle order.
    pub fn handles(&self, kind: ObjectKind) -> Result<Vec<Handle>> {
        let read_txn = self.begin_read()?;
        let table = match read_txn.open_table(data_table(kind)) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(FamError::storage("failed to open table", e)),
        };
        let mut handles = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| FamError::storage("failed to iterate", e))?
        {
            let (key, _) = entry.map_err(|e| FamError::storage("failed to read entry", e))?;
            handles.push(Handle::new(key.value()));
        }
        Ok(handles)
    }

    /// All objects of type `T`, ordered by Gramps ID.
    pub fn iter<T: PrimaryObject>(&self) -> Result<Vec<T>> {
        let read_txn = self.begin_read()?;
        let table = match read_txn.open_table(data_table(T::KIND)) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(FamError::storage("failed to open table", e)),
        };
        let mut objects = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| FamError::storage("failed to iterate", e))?
        {
            let (_, value) = entry.map_err(|e| FamError::storage("failed to read entry", e))?;
            let record = StoredRecord::from_bytes(value.value())?;
            objects.push(record.decode_object::<T>()?);
        }
        objects.sort_by(|a, b| a.gramps_id().cmp(b.gramps_id()));
        Ok(objects)
    }

    /// Number of stored objects of `kind`.
    pub fn count(&self, kind: ObjectKind) -> Result<u64> {
        let read_txn = self.begin_read()?;
        match read_txn.open_table(data_table(kind)) {
            Ok(table) => table
                .len()
                .map_err(|e| FamError::storage("failed to count", e)),
            Err(redb::TableError::TableDoesNotExist(_)) => Ok(0),
            Err(e) => Err(FamError::storage("failed to open table", e)),
        }
    }

    /// Object counts for the summary file.
    pub fn summary(&self) -> Result<TreeMeta> {
        let mut counts = BTreeMap::new();
        for kind in ObjectKind::ALL {
            counts.insert(kind.name().to_string(), self.count(kind)?);
        }
        let previous = TreeMeta::read(&self.dir);
        let last_modified = if self.modified.get() {
            Some(chrono::Utc::now().timestamp())
        } else {
            previous.and_then(|m| m.last_modified)
        };
        Ok(TreeMeta {
            counts,
            last_modified,
            backend: BACKEND_ID.to_string(),
        })
    }

    /// Writes the summary and releases the lock. Safe to call twice.
    pub fn close(&self) -> Result<()> {
        if self.closed.replace(true) {
            return Ok(());
        }
        let result = if self.mode == DbMode::ReadWrite {
            self.summary().and_then(|meta| meta.write(&self.dir))
        } else {
            Ok(())
        };
        self.lock.borrow_mut().take();
        info!(path = %self.dir.display(), "closed family tree");
        result
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.get() {
            return Err(FamError::NoOpenTree);
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if self.mode == DbMode::ReadOnly {
            return Err(FamError::Storage(format!(
                "{} is open read-only",
                self.dir.display()
            )));
        }
        Ok(())
    }

    fn read_record(&self, kind: ObjectKind, handle: &str) -> Result<Option<StoredRecord>> {
        let read_txn = self.begin_read()?;
        let table = match read_txn.open_table(data_table(kind)) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(FamError::storage("failed to open table", e)),
        };
        let value = table
            .get(handle)
            .map_err(|e| FamError::storage("failed to read record", e))?;
        match value {
            Some(bytes) => StoredRecord::from_bytes(bytes.value()).map(Some),
            None => Ok(None),
        }
    }

    fn begin_read(&self) -> Result<redb::ReadTransaction> {
        self.ensure_open()?;
        self.db
            .begin_read()
            .map_err(|e| FamError::storage("failed to begin read transaction", e))
    }

    fn begin_write(&self) -> Result<redb::WriteTransaction> {
        self.ensure_open()?;
        self.db
            .begin_write()
            .map_err(|e| FamError::storage("failed to begin write transaction", e))
    }
}

impl Drop for FamilyTreeDb {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.dir.display(), error = %e, "failed to close family tree");
        }
    }
}

const UNDO_DEPTH: usize = 100;

fn default_id_templates(config: &Config) -> BTreeMap<ObjectKind, String> {
    ObjectKind::ALL
        .iter()
        .map(|kind| (*kind, config.get_str(kind.id_prefix_key()).to_string()))
        .collect()
}

fn stage_writes(
    write_txn: &redb::WriteTransaction,
    writes: &[StagedWrite],
    check_ids: bool,
) -> Result<Vec<Change>> {
    let mut changes = Vec::with_capacity(writes.len());
    for write in writes {
        let mut data = write_txn
            .open_table(data_table(write.kind))
            .map_err(|e| FamError::storage("failed to open table", e))?;
        let mut ids = write_txn
            .open_table(id_table(write.kind))
            .map_err(|e| FamError::storage("failed to open id table", e))?;
        let key = write.handle.as_str();

        let before = match data
            .get(key)
            .map_err(|e| FamError::storage("failed to read record", e))?
        {
            Some(bytes) => Some(StoredRecord::from_bytes(bytes.value())?),
            None => None,
        };

        if let Some(old) = &before {
            let id_changed = write
                .record
                .as_ref()
                .map_or(true, |new| new.gramps_id != old.gramps_id);
            if id_changed && !old.gramps_id.is_empty() {
                let owner = ids
                    .get(old.gramps_id.as_str())
                    .map_err(|e| FamError::storage("failed to read id index", e))?
                    .map(|v| v.value().to_string());
                if owner.as_deref() == Some(key) {
                    ids.remove(old.gramps_id.as_str())
                        .map_err(|e| FamError::storage("failed to update id index", e))?;
                }
            }
        }

        match &write.record {
            Some(record) => {
                if !record.gramps_id.is_empty() {
                    let owner = ids
                        .get(record.gramps_id.as_str())
                        .map_err(|e| FamError::storage("failed to read id index", e))?
                        .map(|v| v.value().to_string());
                    if check_ids && owner.as_deref().is_some_and(|o| o != key) {
                        return Err(FamError::DuplicateId {
                            kind: write.kind.name(),
                            gramps_id: record.gramps_id.clone(),
                        });
                    }
                    ids.insert(record.gramps_id.as_str(), key)
                        .map_err(|e| FamError::storage("failed to update id index", e))?;
                }
                let bytes = record.to_bytes()?;
                data.insert(key, bytes.as_slice())
                    .map_err(|e| FamError::storage("failed to write record", e))?;
            }
            None => {
                data.remove(key)
                    .map_err(|e| FamError::storage("failed to remove record", e))?;
            }
        }

        changes.push(Change {
            kind: write.kind,
            handle: write.handle.clone(),
            before,
            after: write.record.clone(),
        });
    }
    Ok(changes)
}
