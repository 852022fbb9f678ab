use super::{EditSession, EditorRegistry, SessionKey};
use crate::db::FamilyTreeDb;
use crate::error::{FamError, Result};
use crate::objects::{Citation, ObjectKind, PrimaryObject, Source};
use crate::Handle;
use std::cell::RefCell;
use std::rc::Rc;

/// Editor for a citation together with its source.
///
/// Both objects are committed in the same transaction; the source needs a
/// title.
pub struct CitationEdit {
    citation: EditSession<Citation>,
    source: Rc<RefCell<Source>>,
    source_snapshot: Vec<u8>,
    source_key: Option<SessionKey>,
    registry: EditorRegistry,
    done: bool,
}

impl CitationEdit {
    /// Opens an editor on `citation` and `source`.
    pub fn open(
        db: Rc<FamilyTreeDb>,
        registry: &EditorRegistry,
        citation: Rc<RefCell<Citation>>,
        source: Rc<RefCell<Source>>,
    ) -> Result<Self> {
        let source_key = source
            .borrow()
            .handle()
            .map(|h| SessionKey::Handle(ObjectKind::Source, h.clone()));
        if let Some(key) = &source_key {
            registry.register(key.clone())?;
        }
        let opened = postcard::to_allocvec(&*source.borrow())
            .map_err(|e| FamError::Encoding(e.to_string()))
            .and_then(|snapshot| Ok((snapshot, EditSession::open(db, registry, citation)?)));
        match opened {
            Ok((source_snapshot, citation)) => Ok(Self {
                citation,
                source,
                source_snapshot,
                source_key,
                registry: registry.clone(),
                done: false,
            }),
            Err(e) => {
                if let Some(key) = &source_key {
                    registry.unregister(key);
                }
                Err(e)
            }
        }
    }

    /// The citation session.
    pub fn citation(&self) -> &EditSession<Citation> {
        &self.citation
    }

    /// The live source.
    pub fn source(&self) -> &Rc<RefCell<Source>> {
        &self.source
    }

    /// Changes the citation.
    pub fn edit_citation(&mut self, change: impl FnOnce(&mut Citation)) -> Result<()> {
        self.citation.edit(change)
    }

    /// Changes the source.
    pub fn edit_source(&mut self, change: impl FnOnce(&mut Source)) -> Result<()> {
        self.citation.edit(|_| {})?;
        change(&mut self.source.borrow_mut());
        Ok(())
    }

    /// Commits the source and the citation pointing at it.
    pub fn save(&mut self) -> Result<Handle> {
        self.source.borrow().validate()?;
        let mut staged: Option<Source> = None;
        let source = self.source.clone();
        let handle = self.citation.save_with(|db, txn, citation| {
            let mut source = source.borrow().clone();
            let source_handle = db.stage(txn, &mut source)?;
            citation.source_handle = Some(source_handle);
            staged = Some(source);
            Ok(())
        })?;
        if let Some(source) = staged {
            *self.source.borrow_mut() = source;
        }
        self.release_source();
        Ok(handle)
    }

    /// Discards changes to both objects.
    pub fn cancel(&mut self) -> Result<()> {
        self.citation.cancel()?;
        self.restore_source()?;
        self.release_source();
        Ok(())
    }

    fn restore_source(&self) -> Result<()> {
        let original: Source =
            postcard::from_bytes(&self.source_snapshot).map_err(|e| FamError::Encoding(e.to_string()))?;
        *self.source.borrow_mut() = original;
        Ok(())
    }

    fn release_source(&mut self) {
        self.done = true;
        if let Some(key) = self.source_key.take() {
            self.registry.unregister(&key);
        }
    }
}

impl Drop for CitationEdit {
    fn drop(&mut self) {
        if !self.done {
            if let Err(e) = self.restore_source() {
                tracing::warn!(error = %e, "could not restore source on drop");
            }
            self.release_source();
        }
    }
}
