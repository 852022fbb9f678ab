use super::{EditSession, EditState, EditorRegistry, SessionKey};
use crate::db::FamilyTreeDb;
use crate::error::{FamError, Result};
use crate::objects::{Address, Attribute, ChildRef, Event, EventRef, EventRole, Name};
use crate::Handle;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

/// An object embedded in a primary object, edited on its own.
pub trait SecondaryObject: Serialize + DeserializeOwned + Clone + 'static {
    /// Label used in log lines.
    const LABEL: &'static str;

    /// Field checks run before the owner receives the object.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

impl SecondaryObject for Name {
    const LABEL: &'static str = "name";

    fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(FamError::EmptyObject { kind: Self::LABEL });
        }
        Ok(())
    }
}

impl SecondaryObject for Address {
    const LABEL: &'static str = "address";
}

impl SecondaryObject for Attribute {
    const LABEL: &'static str = "attribute";

    fn validate(&self) -> Result<()> {
        if self.attr_type.trim().is_empty() {
            return Err(FamError::Validation {
                field: "attribute type",
                reason: "the attribute type cannot be empty".into(),
            });
        }
        Ok(())
    }
}

impl SecondaryObject for ChildRef {
    const LABEL: &'static str = "child reference";
}

impl SecondaryObject for EventRef {
    const LABEL: &'static str = "event reference";
}

type OnSave<S> = Box<dyn FnOnce(S)>;

/// Editor for a secondary object.
///
/// Saving hands the object to `on_save` (usually pushing it into the
/// owner's list); nothing is written to the database until the owner is
/// saved.
pub struct SecondaryEdit<S: SecondaryObject> {
    registry: EditorRegistry,
    key: SessionKey,
    target: Rc<RefCell<S>>,
    snapshot: Vec<u8>,
    state: EditState,
    on_save: Option<OnSave<S>>,
}

impl<S: SecondaryObject> SecondaryEdit<S> {
    /// Opens an editor on `target`.
    pub fn open(registry: &EditorRegistry, target: Rc<RefCell<S>>, on_save: impl FnOnce(S) + 'static) -> Result<Self> {
        let key = SessionKey::provisional();
        registry.register(key.clone())?;
        let snapshot = match postcard::to_allocvec(&*target.borrow()) {
            Ok(bytes) => bytes,
            Err(e) => {
                registry.unregister(&key);
                return Err(FamError::Encoding(e.to_string()));
            }
        };
        debug!(key = %key, object = S::LABEL, "opened secondary editor");
        Ok(Self {
            registry: registry.clone(),
            key,
            target,
            snapshot,
            state: EditState::FieldsLoaded,
            on_save: Some(Box::new(on_save)),
        })
    }

    fn set_state(&mut self, next: EditState) -> Result<()> {
        if !self.state.can_become(next) {
            return Err(FamError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// Current state.
    pub fn state(&self) -> EditState {
        self.state
    }

    /// Applies a change to the live object.
    pub fn edit(&mut self, change: impl FnOnce(&mut S)) -> Result<()> {
        self.set_state(EditState::Editing)?;
        change(&mut self.target.borrow_mut());
        Ok(())
    }

    /// Validates the object and passes a copy of it to the owner.
    pub fn save(&mut self) -> Result<()> {
        if self.state == EditState::FieldsLoaded {
            self.set_state(EditState::Editing)?;
        }
        self.target.borrow().validate()?;
        self.set_state(EditState::Committing)?;
        if let Some(on_save) = self.on_save.take() {
            on_save(self.target.borrow().clone());
        }
        self.finish()
    }

    /// Restores the object as it was when the editor opened.
    pub fn cancel(&mut self) -> Result<()> {
        self.set_state(EditState::Cancelling)?;
        self.restore()?;
        self.finish()
    }

    fn restore(&self) -> Result<()> {
        let original: S = postcard::from_bytes(&self.snapshot).map_err(|e| FamError::Encoding(e.to_string()))?;
        *self.target.borrow_mut() = original;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.set_state(EditState::Closed)?;
        self.registry.unregister(&self.key);
        Ok(())
    }
}

impl<S: SecondaryObject> Drop for SecondaryEdit<S> {
    fn drop(&mut self) {
        if self.state == EditState::Closed {
            return;
        }
        if let Err(e) = self.restore() {
            warn!(object = S::LABEL, error = %e, "could not restore object on drop");
        }
        self.state = EditState::Closed;
        self.registry.unregister(&self.key);
    }
}

/// Editor for an event reference together with the event it points to.
///
/// Saving commits the event and hands the owner a reference carrying the
/// event's handle and the chosen role.
pub struct ReferenceEdit {
    event: EditSession<Event>,
    role: EventRole,
    on_save: Option<OnSave<EventRef>>,
}

impl ReferenceEdit {
    /// Opens an editor on `event`. `reference` is the existing reference,
    /// `None` when a new one is being added.
    pub fn open(
        db: Rc<FamilyTreeDb>,
        registry: &EditorRegistry,
        event: Rc<RefCell<Event>>,
        reference: Option<&EventRef>,
        on_save: impl FnOnce(EventRef) + 'static,
    ) -> Result<Self> {
        let event = EditSession::open(db, registry, event)?;
        Ok(Self {
            event,
            role: reference.map(|r| r.role.clone()).unwrap_or_default(),
            on_save: Some(Box::new(on_save)),
        })
    }

    /// The event session.
    pub fn event(&self) -> &EditSession<Event> {
        &self.event
    }

    /// Changes the event itself.
    pub fn edit_event(&mut self, change: impl FnOnce(&mut Event)) -> Result<()> {
        self.event.edit(change)
    }

    /// Changes the role of the reference.
    pub fn set_role(&mut self, role: EventRole) -> Result<()> {
        self.event.edit(|_| {})?;
        self.role = role;
        Ok(())
    }

    /// Commits the event, then passes the updated reference to the owner.
    pub fn save(&mut self) -> Result<Handle> {
        let handle = self.event.save()?;
        if let Some(on_save) = self.on_save.take() {
            on_save(EventRef {
                event: handle.clone(),
                role: self.role.clone(),
            });
        }
        Ok(handle)
    }

    /// Discards changes to the event.
    pub fn cancel(&mut self) -> Result<()> {
        self.event.cancel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbMode;
    use crate::dbman::TreeManager;
    use crate::objects::{EventType, ObjectKind, Person};
    use tempfile::TempDir;

    #[test]
    fn test_secondary_save_hands_copy_to_owner() {
        let registry = EditorRegistry::new();
        let owner = Rc::new(RefCell::new(Person::default()));
        let sink = owner.clone();
        let name = Rc::new(RefCell::new(Name::default()));
        let mut edit = SecondaryEdit::open(&registry, name, move |n| sink.borrow_mut().alternate_names.push(n)).unwrap();

        assert!(matches!(edit.save(), Err(FamError::EmptyObject { kind: "name" })));
        assert_eq!(edit.state(), EditState::Editing);

        edit.edit(|n| n.surname = "Lee".into()).unwrap();
        edit.save().unwrap();
        assert_eq!(owner.borrow().alternate_names, vec![Name::new("", "Lee")]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_secondary_cancel_restores() {
        let registry = EditorRegistry::new();
        let attr = Rc::new(RefCell::new(Attribute {
            attr_type: "Occupation".into(),
            value: "Smith".into(),
        }));
        let mut edit = SecondaryEdit::open(&registry, attr.clone(), |_| panic!("not saved")).unwrap();
        edit.edit(|a| a.value = "Baker".into()).unwrap();
        edit.cancel().unwrap();
        assert_eq!(attr.borrow().value, "Smith");
    }

    #[test]
    fn test_reference_edit_commits_event_and_reference() {
        let tmp = TempDir::new().unwrap();
        let manager = TreeManager::new(tmp.path().join("db"));
        let (dir, _) = manager.create_new_db(Some("Refs"), "redb").unwrap();
        let db = Rc::new(FamilyTreeDb::open(&dir, DbMode::ReadWrite, None).unwrap());
        let registry = EditorRegistry::new();

        let refs: Rc<RefCell<Vec<EventRef>>> = Rc::default();
        let sink = refs.clone();
        let mut edit = ReferenceEdit::open(
            db.clone(),
            &registry,
            Rc::new(RefCell::new(Event::default())),
            None,
            move |r| sink.borrow_mut().push(r),
        )
        .unwrap();
        edit.edit_event(|e| e.event_type = EventType::Custom(" ".into())).unwrap();
        assert!(matches!(edit.save(), Err(FamError::Validation { .. })));

        edit.edit_event(|e| e.event_type = EventType::Death).unwrap();
        edit.set_role(EventRole::Witness).unwrap();
        let handle = edit.save().unwrap();

        assert!(db.find_by_handle(ObjectKind::Event, &handle).unwrap());
        assert_eq!(refs.borrow().len(), 1);
        assert_eq!(refs.borrow()[0].event, handle);
        assert_eq!(refs.borrow()[0].role, EventRole::Witness);
    }
}
