use super::{EditNotice, EditState, EditTarget, EditorRegistry, SessionKey};
use crate::db::{FamilyTreeDb, Transaction};
use crate::error::{FamError, Result};
use crate::objects::{ObjectKind, SignalAction};
use crate::signals::{Signal, SignalHub, SubscriptionId};
use crate::user::User;
use crate::Handle;
use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;
use tracing::{debug, error, info, warn};

/// How [`EditSession::close`] ended the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Nothing had changed.
    Unchanged,
    /// The changes were committed.
    Saved(Handle),
    /// The changes were discarded.
    Discarded,
}

/// Session state reachable from change-notification callbacks.
struct Shared {
    kind: ObjectKind,
    state: Cell<EditState>,
    key: RefCell<SessionKey>,
    notices: RefCell<Vec<EditNotice>>,
    dependencies: RefCell<BTreeSet<(ObjectKind, Handle)>>,
    subscriptions: RefCell<Vec<SubscriptionId>>,
    committing: Cell<bool>,
    hub: SignalHub,
    registry: EditorRegistry,
}

impl Shared {
    fn set_state(&self, next: EditState) -> Result<()> {
        let current = self.state.get();
        if !current.can_become(next) {
            return Err(FamError::InvalidStateTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        debug!(key = %self.key.borrow(), from = %current, to = %next, "edit session state");
        self.state.set(next);
        Ok(())
    }

    fn own_handle(&self) -> Option<Handle> {
        match &*self.key.borrow() {
            SessionKey::Handle(_, handle) => Some(handle.clone()),
            SessionKey::Provisional(_) => None,
        }
    }

    fn on_signal(&self, signal: &Signal) {
        if self.committing.get() || !self.state.get().is_active() {
            return;
        }
        let own = self.own_handle();
        for handle in &signal.handles {
            if signal.kind == self.kind && own.as_ref() == Some(handle) {
                match signal.action {
                    SignalAction::Delete => {
                        info!(key = %self.key.borrow(), "object deleted elsewhere, closing editor");
                        self.notices.borrow_mut().push(EditNotice::DeletedElsewhere);
                        if self.set_state(EditState::Closed).is_ok() {
                            self.teardown();
                        }
                        return;
                    }
                    _ => self.notices.borrow_mut().push(EditNotice::ChangedElsewhere),
                }
            } else if self
                .dependencies
                .borrow()
                .contains(&(signal.kind, handle.clone()))
            {
                self.notices
                    .borrow_mut()
                    .push(EditNotice::DependentChanged(signal.kind, handle.clone()));
            }
        }
    }

    fn teardown(&self) {
        for id in self.subscriptions.borrow_mut().drain(..) {
            self.hub.disconnect(id);
        }
        self.registry.unregister(&self.key.borrow());
    }
}

/// Edit session for one primary object.
///
/// Changes go straight onto the shared live object. Saving commits a copy of
/// it together with any back-reference updates in one transaction; cancelling
/// writes the snapshot taken at open time back onto the live object.
pub struct EditSession<T: EditTarget> {
    db: Rc<FamilyTreeDb>,
    target: Rc<RefCell<T>>,
    snapshot: Vec<u8>,
    shared: Rc<Shared>,
    last_error: Option<String>,
}

impl<T: EditTarget> std::fmt::Debug for EditSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("key", &*self.shared.key.borrow())
            .field("state", &self.shared.state.get())
            .finish()
    }
}

impl<T: EditTarget> EditSession<T> {
    /// Opens an editor on `target`.
    ///
    /// # Errors
    ///
    /// [`FamError::EditorActive`] if the object already has an editor; the
    /// registry focuses that one.
    pub fn open(db: Rc<FamilyTreeDb>, registry: &EditorRegistry, target: Rc<RefCell<T>>) -> Result<Self> {
        let key = match target.borrow().handle() {
            Some(handle) => SessionKey::Handle(T::KIND, handle.clone()),
            None => SessionKey::provisional(),
        };
        registry.register(key.clone())?;

        let shared = Rc::new(Shared {
            kind: T::KIND,
            state: Cell::new(EditState::Created),
            key: RefCell::new(key),
            notices: RefCell::new(Vec::new()),
            dependencies: RefCell::new(BTreeSet::new()),
            subscriptions: RefCell::new(Vec::new()),
            committing: Cell::new(false),
            hub: db.signals().clone(),
            registry: registry.clone(),
        });
        let snapshot = match encode(&*target.borrow()) {
            Ok(bytes) => bytes,
            Err(e) => {
                shared.teardown();
                return Err(e);
            }
        };
        let session = Self {
            db,
            target,
            snapshot,
            shared,
            last_error: None,
        };
        session.subscribe();
        session.refresh_dependencies();
        session.shared.set_state(EditState::FieldsLoaded)?;
        Ok(session)
    }

    /// Loads the stored object with `handle` and opens an editor on it.
    pub fn load(db: Rc<FamilyTreeDb>, registry: &EditorRegistry, handle: &Handle) -> Result<Self> {
        let object: T = db.get_required(handle)?;
        Self::open(db, registry, Rc::new(RefCell::new(object)))
    }

    fn subscribe(&self) {
        let mut ids = Vec::new();
        for kind in ObjectKind::ALL {
            for action in [SignalAction::Update, SignalAction::Delete] {
                let weak = Rc::downgrade(&self.shared);
                let id = self.shared.hub.connect(&kind.signal(action), move |signal| {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_signal(signal);
                    }
                });
                ids.push(id);
            }
        }
        self.shared.subscriptions.borrow_mut().extend(ids);
    }

    fn refresh_dependencies(&self) {
        let refs: BTreeSet<_> = self.target.borrow().references().into_iter().collect();
        *self.shared.dependencies.borrow_mut() = refs;
    }

    /// Current state.
    pub fn state(&self) -> EditState {
        self.shared.state.get()
    }

    /// Registry key; provisional until the first save.
    pub fn key(&self) -> SessionKey {
        self.shared.key.borrow().clone()
    }

    /// The live object.
    pub fn target(&self) -> &Rc<RefCell<T>> {
        &self.target
    }

    /// Borrows the live object.
    pub fn object(&self) -> Ref<'_, T> {
        self.target.borrow()
    }

    /// Message of the last failed save, shown until the next attempt.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Notices received so far.
    pub fn notices(&self) -> Vec<EditNotice> {
        self.shared.notices.borrow().clone()
    }

    /// Returns and clears the received notices.
    pub fn take_notices(&self) -> Vec<EditNotice> {
        std::mem::take(&mut *self.shared.notices.borrow_mut())
    }

    /// True if the live object differs from the snapshot.
    pub fn is_dirty(&self) -> bool {
        encode(&*self.target.borrow()).map_or(true, |bytes| bytes != self.snapshot)
    }

    /// Applies a change to the live object.
    pub fn edit(&mut self, change: impl FnOnce(&mut T)) -> Result<()> {
        self.shared.set_state(EditState::Editing)?;
        change(&mut self.target.borrow_mut());
        self.refresh_dependencies();
        Ok(())
    }

    /// Saves the object. Returns its handle.
    ///
    /// Empty objects, duplicate Gramps IDs and failed field checks are
    /// rejected before anything is written and leave the session open.
    pub fn save(&mut self) -> Result<Handle> {
        self.save_with(|_, _, _| Ok(()))
    }

    /// Saves the object, letting `extra` stage more writes in the same
    /// transaction first. `extra` sees the copy being committed, which
    /// already carries its handle.
    pub fn save_with<F>(&mut self, extra: F) -> Result<Handle>
    where
        F: FnOnce(&FamilyTreeDb, &mut Transaction, &mut T) -> Result<()>,
    {
        if self.state() == EditState::FieldsLoaded {
            self.shared.set_state(EditState::Editing)?;
        }
        if self.state() != EditState::Editing {
            return Err(FamError::InvalidStateTransition {
                from: self.state().to_string(),
                to: EditState::Committing.to_string(),
            });
        }
        self.last_error = None;
        if let Err(e) = self.precheck() {
            debug!(key = %self.key(), error = %e, "save rejected");
            self.last_error = Some(e.to_string());
            return Err(e);
        }

        self.shared.set_state(EditState::Committing)?;
        match self.commit(extra) {
            Ok(handle) => {
                let final_key = SessionKey::Handle(T::KIND, handle.clone());
                let old_key = self.key();
                self.shared.registry.rekey(&old_key, final_key.clone())?;
                *self.shared.key.borrow_mut() = final_key;
                self.shared.set_state(EditState::Closed)?;
                self.shared.teardown();
                Ok(handle)
            }
            Err(e) => {
                error!(key = %self.key(), error = %e, "could not save object");
                self.shared.set_state(EditState::Editing)?;
                self.last_error = Some(e.to_string());
                if e.is_recoverable_edit_error() {
                    return Err(e);
                }
                Err(FamError::SaveFailed {
                    kind: T::KIND.name(),
                    source: Box::new(e),
                })
            }
        }
    }

    fn precheck(&self) -> Result<()> {
        let object = self.target.borrow();
        if object.is_empty() {
            return Err(FamError::EmptyObject { kind: T::KIND.name() });
        }
        let gramps_id = object.gramps_id().trim();
        if !gramps_id.is_empty() {
            if let Some(owner) = self.db.handle_for_id(T::KIND, gramps_id)? {
                if object.handle() != Some(&owner) {
                    return Err(FamError::DuplicateId {
                        kind: T::KIND.name(),
                        gramps_id: gramps_id.to_string(),
                    });
                }
            }
        }
        object.validate()
    }

    fn commit<F>(&self, extra: F) -> Result<Handle>
    where
        F: FnOnce(&FamilyTreeDb, &mut Transaction, &mut T) -> Result<()>,
    {
        let mut object = self.target.borrow().clone();
        let stored: Option<T> = match object.handle() {
            Some(handle) => self.db.get(handle)?,
            None => None,
        };
        let label = match stored {
            Some(_) => object.edit_label(),
            None => object.add_label(),
        };
        let mut txn = self.db.transaction(label);
        if object.handle().is_none() {
            object.set_handle(Handle::generate());
        }
        extra(self.db.as_ref(), &mut txn, &mut object)?;
        let handle = self.db.stage(&mut txn, &mut object)?;
        object.stage_back_references(&self.db, &mut txn, stored.as_ref())?;

        self.shared.committing.set(true);
        let result = self.db.commit(txn);
        self.shared.committing.set(false);
        result?;

        *self.target.borrow_mut() = object;
        Ok(handle)
    }

    /// Discards all changes and closes the session.
    pub fn cancel(&mut self) -> Result<()> {
        self.shared.set_state(EditState::Cancelling)?;
        self.restore()?;
        self.shared.set_state(EditState::Closed)?;
        self.shared.teardown();
        Ok(())
    }

    fn restore(&self) -> Result<()> {
        let original: T = postcard::from_bytes(&self.snapshot).map_err(|e| FamError::Encoding(e.to_string()))?;
        *self.target.borrow_mut() = original;
        self.refresh_dependencies();
        Ok(())
    }

    /// Closes the session, asking whether to keep unsaved changes.
    pub fn close(&mut self, user: &dyn User) -> Result<CloseOutcome> {
        if !self.state().is_active() {
            return Err(FamError::InvalidStateTransition {
                from: self.state().to_string(),
                to: EditState::Closed.to_string(),
            });
        }
        if !self.is_dirty() {
            self.shared.set_state(EditState::Closed)?;
            self.shared.teardown();
            return Ok(CloseOutcome::Unchanged);
        }
        let save = user.prompt(
            "Save Changes?",
            "If you close without saving, the changes you have made will be lost",
            "Save",
            "Close without saving",
        );
        if save {
            self.save().map(CloseOutcome::Saved)
        } else {
            self.cancel().map(|()| CloseOutcome::Discarded)
        }
    }
}

impl<T: EditTarget> Drop for EditSession<T> {
    fn drop(&mut self) {
        if self.state() == EditState::Closed {
            return;
        }
        if let Err(e) = self.restore() {
            warn!(key = %self.key(), error = %e, "could not restore object on drop");
        }
        self.shared.state.set(EditState::Closed);
        self.shared.teardown();
    }
}

fn encode<T: EditTarget>(object: &T) -> Result<Vec<u8>> {
    postcard::to_allocvec(object).map_err(|e| FamError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbMode;
    use crate::dbman::TreeManager;
    use crate::objects::{Event, EventType, Family, Gender, Name, Person};
    use crate::user::RecordingUser;
    use tempfile::TempDir;

    fn open_db(tmp: &TempDir) -> Rc<FamilyTreeDb> {
        let manager = TreeManager::new(tmp.path().join("db"));
        let (dir, _) = manager.create_new_db(Some("Edit"), "redb").unwrap();
        Rc::new(FamilyTreeDb::open(&dir, DbMode::ReadWrite, None).unwrap())
    }

    fn store_person(db: &FamilyTreeDb, first: &str, surname: &str) -> Handle {
        let mut person = Person {
            primary_name: Name::new(first, surname),
            gender: Gender::Female,
            ..Default::default()
        };
        let mut txn = db.transaction("setup");
        let handle = db.stage(&mut txn, &mut person).unwrap();
        db.commit(txn).unwrap();
        handle
    }

    #[test]
    fn test_second_session_on_same_handle_is_refused() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp);
        let registry = EditorRegistry::new();
        let handle = store_person(&db, "Ann", "Lee");

        let first = EditSession::<Person>::load(db.clone(), &registry, &handle).unwrap();
        let err = EditSession::<Person>::load(db.clone(), &registry, &handle).unwrap_err();
        assert!(matches!(err, FamError::EditorActive(_)));
        assert_eq!(registry.focused(), Some(first.key()));
        assert_eq!(first.state(), EditState::FieldsLoaded);

        drop(first);
        assert!(EditSession::<Person>::load(db, &registry, &handle).is_ok());
    }

    #[test]
    fn test_cancel_restores_snapshot_bytes() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp);
        let registry = EditorRegistry::new();
        let handle = store_person(&db, "Ann", "Lee");
        let live = Rc::new(RefCell::new(db.get_required::<Person>(&handle).unwrap()));
        let before = postcard::to_allocvec(&*live.borrow()).unwrap();

        let mut session = EditSession::open(db.clone(), &registry, live.clone()).unwrap();
        session
            .edit(|p| {
                p.primary_name.first_name = "Anne".into();
                p.gender = Gender::Unknown;
            })
            .unwrap();
        assert_eq!(live.borrow().primary_name.first_name, "Anne");
        assert!(session.is_dirty());

        session.cancel().unwrap();
        assert_eq!(postcard::to_allocvec(&*live.borrow()).unwrap(), before);
        assert_eq!(session.state(), EditState::Closed);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_new_object_gets_handle_on_save() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp);
        let registry = EditorRegistry::new();
        let live = Rc::new(RefCell::new(Event::default()));

        let mut session = EditSession::open(db.clone(), &registry, live.clone()).unwrap();
        assert!(matches!(session.key(), SessionKey::Provisional(_)));
        session.edit(|e| e.event_type = EventType::Birth).unwrap();
        let handle = session.save().unwrap();

        assert_eq!(live.borrow().handle.as_ref(), Some(&handle));
        assert!(!live.borrow().gramps_id.is_empty());
        assert!(db.find_by_handle(ObjectKind::Event, &handle).unwrap());
        assert_eq!(session.key(), SessionKey::Handle(ObjectKind::Event, handle));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_empty_family_rejected_and_session_stays_open() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp);
        let registry = EditorRegistry::new();
        let mut session = EditSession::open(db.clone(), &registry, Rc::new(RefCell::new(Family::default()))).unwrap();

        let err = session.save().unwrap_err();
        assert!(matches!(err, FamError::EmptyObject { kind: "family" }));
        assert_eq!(session.state(), EditState::Editing);
        assert!(session.last_error().is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(db.count(ObjectKind::Family).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp);
        let registry = EditorRegistry::new();
        let existing = store_person(&db, "Ann", "Lee");
        let taken = db.get_required::<Person>(&existing).unwrap().gramps_id;

        let mut session = EditSession::open(db.clone(), &registry, Rc::new(RefCell::new(Person::default()))).unwrap();
        session
            .edit(|p| {
                p.primary_name = Name::new("Bob", "Lee");
                p.gramps_id = taken.clone();
            })
            .unwrap();
        let err = session.save().unwrap_err();
        assert!(matches!(err, FamError::DuplicateId { .. }));
        assert_eq!(session.state(), EditState::Editing);

        session.edit(|p| p.gramps_id.clear()).unwrap();
        session.save().unwrap();
        assert_eq!(db.count(ObjectKind::Person).unwrap(), 2);
    }

    #[test]
    fn test_family_save_updates_back_references() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp);
        let registry = EditorRegistry::new();
        let father = store_person(&db, "Tom", "Lee");
        let child = store_person(&db, "Amy", "Lee");

        let mut session = EditSession::open(db.clone(), &registry, Rc::new(RefCell::new(Family::default()))).unwrap();
        session
            .edit(|f| {
                f.father_handle = Some(father.clone());
                f.add_child(child.clone());
            })
            .unwrap();
        let family = session.save().unwrap();

        let tom: Person = db.get_required(&father).unwrap();
        let amy: Person = db.get_required(&child).unwrap();
        assert_eq!(tom.family_list, vec![family.clone()]);
        assert_eq!(amy.parent_family_list, vec![family.clone()]);
        assert_eq!(db.undo_history().last().map(String::as_str), Some("Add Family"));

        let mut session = EditSession::<Family>::load(db.clone(), &registry, &family).unwrap();
        session.edit(|f| f.child_ref_list.clear()).unwrap();
        session.save().unwrap();
        let amy: Person = db.get_required(&child).unwrap();
        assert!(amy.parent_family_list.is_empty());
        assert_eq!(db.undo_history().last().map(String::as_str), Some("Edit Family"));
    }

    #[test]
    fn test_notices_from_other_commits() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp);
        let registry = EditorRegistry::new();
        let father = store_person(&db, "Tom", "Lee");

        let mut family = EditSession::open(db.clone(), &registry, Rc::new(RefCell::new(Family::default()))).unwrap();
        family.edit(|f| f.father_handle = Some(father.clone())).unwrap();

        let mut person = EditSession::<Person>::load(db.clone(), &registry, &father).unwrap();
        person.edit(|p| p.primary_name.first_name = "Thomas".into()).unwrap();
        person.save().unwrap();

        assert_eq!(
            family.take_notices(),
            vec![EditNotice::DependentChanged(ObjectKind::Person, father.clone())]
        );
        assert!(person.notices().is_empty());
    }

    #[test]
    fn test_delete_elsewhere_closes_session() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp);
        let registry = EditorRegistry::new();
        let handle = store_person(&db, "Ann", "Lee");

        let session = EditSession::<Person>::load(db.clone(), &registry, &handle).unwrap();
        let mut txn = db.transaction("Delete Person");
        txn.remove(ObjectKind::Person, &handle);
        db.commit(txn).unwrap();

        assert_eq!(session.state(), EditState::Closed);
        assert_eq!(session.notices(), vec![EditNotice::DeletedElsewhere]);
        assert!(!registry.is_editing(ObjectKind::Person, &handle));
        assert_eq!(db.signals().subscriber_count("person-update"), 0);
    }

    #[test]
    fn test_close_dirty_session_prompts() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp);
        let registry = EditorRegistry::new();
        let handle = store_person(&db, "Ann", "Lee");

        let mut session = EditSession::<Person>::load(db.clone(), &registry, &handle).unwrap();
        session.edit(|p| p.primary_name.surname = "Smith".into()).unwrap();
        let refuse = RecordingUser::new(false);
        assert_eq!(session.close(&refuse).unwrap(), CloseOutcome::Discarded);
        assert_eq!(refuse.prompts(), vec!["Save Changes?".to_string()]);
        assert_eq!(db.get_required::<Person>(&handle).unwrap().primary_name.surname, "Lee");

        let mut session = EditSession::<Person>::load(db.clone(), &registry, &handle).unwrap();
        session.edit(|p| p.primary_name.surname = "Smith".into()).unwrap();
        let accept = RecordingUser::new(true);
        assert!(matches!(session.close(&accept).unwrap(), CloseOutcome::Saved(_)));
        assert_eq!(db.get_required::<Person>(&handle).unwrap().primary_name.surname, "Smith");
        assert_eq!(
            db.undo_history().last().map(String::as_str),
            Some("Edit Person (Smith, Ann)")
        );
    }

    #[test]
    fn test_drop_restores_unsaved_edits() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp);
        let registry = EditorRegistry::new();
        let live = Rc::new(RefCell::new(Person {
            primary_name: Name::new("Ann", "Lee"),
            ..Default::default()
        }));
        {
            let mut session = EditSession::open(db.clone(), &registry, live.clone()).unwrap();
            session.edit(|p| p.primary_name.first_name = "X".into()).unwrap();
        }
        assert_eq!(live.borrow().primary_name.first_name, "Ann");
        assert!(registry.is_empty());
    }
}
