//! Opaque object handles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable storage identifier of a primary object.
///
/// Distinct from the user-visible Gramps ID: a handle never changes once
/// assigned and is never shown to the user.
///
/// # Examples
///
/// ```
/// use famtree_core::Handle;
///
/// let a = Handle::generate();
/// let b = Handle::generate();
/// assert_ne!(a, b);
/// assert_eq!(a.as_str().len(), 32);
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle(String);

impl Handle {
    /// Creates a fresh random handle.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Wraps an existing handle string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the handle text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Handle {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}
