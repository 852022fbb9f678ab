//! Object edit sessions.
//!
//! An edit session binds one live object, records a snapshot of it when
//! loaded, and ends either by committing the object in one transaction or
//! by restoring the snapshot. [`EditorRegistry`] makes sure each object is
//! edited by at most one session at a time.

mod pair;
mod primary;
mod registry;
mod secondary;

pub use pair::CitationEdit;
pub use primary::{CloseOutcome, EditSession};
pub use registry::{EditorRegistry, SessionKey};
pub use secondary::{ReferenceEdit, SecondaryEdit, SecondaryObject};

use crate::db::{FamilyTreeDb, Transaction};
use crate::error::Result;
use crate::objects::{Citation, Event, Family, Media, Note, ObjectKind, Person, Place, PrimaryObject, Repository, Source};
use crate::Handle;
use std::collections::BTreeSet;
use std::fmt;

/// Lifecycle of an edit session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditState {
    /// Registered, fields not populated yet.
    Created,
    /// Fields populated and the snapshot taken.
    FieldsLoaded,
    /// At least one change was made to the live object.
    Editing,
    /// Inside the save transaction.
    Committing,
    /// Restoring the snapshot.
    Cancelling,
    /// Done. Nothing can happen any more.
    Closed,
}

impl EditState {
    fn can_become(self, next: EditState) -> bool {
        use EditState::*;
        matches!(
            (self, next),
            (Created, FieldsLoaded)
                | (FieldsLoaded, Editing)
                | (Editing, Editing)
                | (Editing, Committing)
                | (FieldsLoaded, Cancelling)
                | (Editing, Cancelling)
                // a failed commit leaves the session editable
                | (Committing, Editing)
                | (Committing, Closed)
                | (Cancelling, Closed)
                | (Created, Closed)
                | (FieldsLoaded, Closed)
                | (Editing, Closed)
        )
    }

    /// True while the session can still be edited or saved.
    pub fn is_active(self) -> bool {
        matches!(self, Self::FieldsLoaded | Self::Editing)
    }
}

impl fmt::Display for EditState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "CREATED",
            Self::FieldsLoaded => "FIELDS_LOADED",
            Self::Editing => "EDITING",
            Self::Committing => "COMMITTING",
            Self::Cancelling => "CANCELLING",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Something that happened elsewhere while a session was open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditNotice {
    /// The edited object was committed by someone else.
    ChangedElsewhere,
    /// An object the session displays was changed or removed.
    DependentChanged(ObjectKind, Handle),
    /// The edited object was deleted. The session is closed.
    DeletedElsewhere,
}

/// A primary object that can be edited in an [`EditSession`].
pub trait EditTarget: PrimaryObject {
    /// Undo-history label for saving a new object.
    fn add_label(&self) -> String {
        format!("Add {} ({})", kind_title(Self::KIND), self.describe())
    }

    /// Undo-history label for saving an existing object.
    fn edit_label(&self) -> String {
        format!("Edit {} ({})", kind_title(Self::KIND), self.describe())
    }

    /// Stages the updates other objects need when this one is saved.
    ///
    /// `stored` is the version currently in the database, `None` for a new
    /// object. `self` already carries its final handle.
    fn stage_back_references(
        &self,
        _db: &FamilyTreeDb,
        _txn: &mut Transaction,
        _stored: Option<&Self>,
    ) -> Result<()> {
        Ok(())
    }
}

fn kind_title(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Person => "Person",
        ObjectKind::Family => "Family",
        ObjectKind::Event => "Event",
        ObjectKind::Place => "Place",
        ObjectKind::Source => "Source",
        ObjectKind::Citation => "Citation",
        ObjectKind::Repository => "Repository",
        ObjectKind::Media => "Media Object",
        ObjectKind::Note => "Note",
    }
}

impl EditTarget for Person {}
impl EditTarget for Event {}
impl EditTarget for Place {}
impl EditTarget for Source {}
impl EditTarget for Citation {}
impl EditTarget for Repository {}
impl EditTarget for Media {}

impl EditTarget for Note {
    fn add_label(&self) -> String {
        "Add Note".to_string()
    }

    fn edit_label(&self) -> String {
        "Edit Note".to_string()
    }
}

impl EditTarget for Family {
    fn add_label(&self) -> String {
        "Add Family".to_string()
    }

    fn edit_label(&self) -> String {
        "Edit Family".to_string()
    }

    /// Parents list the family in their families, children in their parent
    /// families. People dropped from the family lose the back-reference.
    fn stage_back_references(
        &self,
        db: &FamilyTreeDb,
        txn: &mut Transaction,
        stored: Option<&Self>,
    ) -> Result<()> {
        let Some(handle) = self.handle.as_ref() else {
            return Ok(());
        };
        let old_parents: BTreeSet<&Handle> = stored.map(|f| f.parents().collect()).unwrap_or_default();
        let new_parents: BTreeSet<&Handle> = self.parents().collect();
        let old_children: BTreeSet<&Handle> = stored.map(|f| f.children().collect()).unwrap_or_default();
        let new_children: BTreeSet<&Handle> = self.children().collect();

        let mut touched: Vec<Person> = Vec::new();
        let mut person = |h: &Handle, touched: &mut Vec<Person>| -> Result<usize> {
            if let Some(i) = touched.iter().position(|p| p.handle.as_ref() == Some(h)) {
                return Ok(i);
            }
            touched.push(db.get_required::<Person>(h)?);
            Ok(touched.len() - 1)
        };
        let mut changed = BTreeSet::new();
        for h in old_parents.difference(&new_parents) {
            let i = person(h, &mut touched)?;
            if touched[i].remove_family_handle(handle) {
                changed.insert(i);
            }
        }
        for h in &new_parents {
            let i = person(h, &mut touched)?;
            if touched[i].add_family_handle(handle) {
                changed.insert(i);
            }
        }
        for h in old_children.difference(&new_children) {
            let i = person(h, &mut touched)?;
            if touched[i].remove_parent_family_handle(handle) {
                changed.insert(i);
            }
        }
        for h in &new_children {
            let i = person(h, &mut touched)?;
            if touched[i].add_parent_family_handle(handle) {
                changed.insert(i);
            }
        }
        for i in changed {
            txn.put(&touched[i])?;
        }
        Ok(())
    }
}
