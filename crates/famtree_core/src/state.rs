//! The currently open Family Tree.

use crate::db::FamilyTreeDb;
use crate::error::{FamError, Result};
use std::rc::Rc;
use tracing::{debug, warn};

/// Holds at most one open tree for the lifetime of a run.
///
/// Switching trees closes the previous one first; dropping the state closes
/// whatever is still open.
#[derive(Debug, Default)]
pub struct SessionState {
    db: Option<Rc<FamilyTreeDb>>,
}

impl SessionState {
    /// No tree open.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if a tree is open.
    pub fn is_open(&self) -> bool {
        self.db.as_ref().is_some_and(|db| !db.is_closed())
    }

    /// The open tree.
    ///
    /// # Errors
    ///
    /// [`FamError::NoOpenTree`] if nothing is open.
    pub fn db(&self) -> Result<Rc<FamilyTreeDb>> {
        self.db
            .as_ref()
            .filter(|db| !db.is_closed())
            .cloned()
            .ok_or(FamError::NoOpenTree)
    }

    /// Makes `db` the open tree, closing the previous one.
    pub fn change_database(&mut self, db: FamilyTreeDb) -> Result<Rc<FamilyTreeDb>> {
        self.close()?;
        debug!(path = %db.path().display(), "switching family tree");
        let db = Rc::new(db);
        self.db = Some(Rc::clone(&db));
        Ok(db)
    }

    /// Closes the open tree, if any.
    pub fn close(&mut self) -> Result<()> {
        match self.db.take() {
            Some(db) => db.close(),
            None => Ok(()),
        }
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close family tree");
        }
    }
}
