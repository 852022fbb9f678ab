use crate::error::{FamError, Result};
use crate::objects::ObjectKind;
use crate::Handle;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use tracing::debug;
use uuid::Uuid;

/// Registry key of an open editor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionKey {
    /// A stored object.
    Handle(ObjectKind, Handle),
    /// An object that has never been saved, keyed by a token issued when
    /// its editor opened.
    Provisional(Uuid),
}

impl SessionKey {
    /// A fresh provisional key.
    pub fn provisional() -> Self {
        Self::Provisional(Uuid::new_v4())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handle(kind, handle) => write!(f, "{} {}", kind, handle),
            Self::Provisional(id) => write!(f, "new object {}", id.simple()),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    open: BTreeSet<SessionKey>,
    focused: Option<SessionKey>,
}

/// Tracks which objects have an editor open.
///
/// Cloning yields another handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct EditorRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

impl EditorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key` for a new editor and focuses it.
    ///
    /// # Errors
    ///
    /// [`FamError::EditorActive`] if `key` already has an editor; that
    /// editor is focused instead.
    pub fn register(&self, key: SessionKey) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.open.contains(&key) {
            debug!(key = %key, "editor already open, focusing it");
            let text = key.to_string();
            inner.focused = Some(key);
            return Err(FamError::EditorActive(text));
        }
        inner.open.insert(key.clone());
        inner.focused = Some(key);
        Ok(())
    }

    /// Moves an editor from `old` to `new` in one step.
    ///
    /// Used when a new object receives its handle on first save.
    pub fn rekey(&self, old: &SessionKey, new: SessionKey) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if old == &new {
            return Ok(());
        }
        if inner.open.contains(&new) {
            return Err(FamError::EditorActive(new.to_string()));
        }
        inner.open.remove(old);
        inner.open.insert(new.clone());
        if inner.focused.as_ref() == Some(old) {
            inner.focused = Some(new);
        }
        Ok(())
    }

    /// Releases `key`. Returns false if it was not registered.
    pub fn unregister(&self, key: &SessionKey) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.focused.as_ref() == Some(key) {
            inner.focused = None;
        }
        inner.open.remove(key)
    }

    /// True if `key` has an editor.
    pub fn is_open(&self, key: &SessionKey) -> bool {
        self.inner.borrow().open.contains(key)
    }

    /// True if the stored object has an editor.
    pub fn is_editing(&self, kind: ObjectKind, handle: &Handle) -> bool {
        self.is_open(&SessionKey::Handle(kind, handle.clone()))
    }

    /// The editor that was opened or re-focused last.
    pub fn focused(&self) -> Option<SessionKey> {
        self.inner.borrow().focused.clone()
    }

    /// Number of open editors.
    pub fn len(&self) -> usize {
        self.inner.borrow().open.len()
    }

    /// True if no editor is open.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().open.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_register_focuses_existing() {
        let registry = EditorRegistry::new();
        let a = SessionKey::Handle(ObjectKind::Person, Handle::from("a"));
        let b = SessionKey::Handle(ObjectKind::Person, Handle::from("b"));
        registry.register(a.clone()).unwrap();
        registry.register(b.clone()).unwrap();
        assert_eq!(registry.focused(), Some(b));

        let err = registry.register(a.clone()).unwrap_err();
        assert!(matches!(err, FamError::EditorActive(_)));
        assert_eq!(registry.focused(), Some(a));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_rekey_swaps_provisional_key() {
        let registry = EditorRegistry::new();
        let temp = SessionKey::provisional();
        registry.register(temp.clone()).unwrap();
        let real = SessionKey::Handle(ObjectKind::Family, Handle::from("f1"));
        registry.rekey(&temp, real.clone()).unwrap();
        assert!(!registry.is_open(&temp));
        assert!(registry.is_editing(ObjectKind::Family, &Handle::from("f1")));
        assert_eq!(registry.focused(), Some(real.clone()));
        assert!(registry.unregister(&real));
        assert!(registry.is_empty());
    }
}
