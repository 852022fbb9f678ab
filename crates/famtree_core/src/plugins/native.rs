//! Native formats: `.gramps` JSON and `.gpkg` (the same JSON, zstd-compressed).

use super::{stage_imported, ExportPlugin, ImportPlugin, ImportStats, PluginDescriptor};
use crate::db::FamilyTreeDb;
use crate::error::{FamError, Result};
use crate::objects::{Citation, Event, Family, Media, Note, Person, Place, Repository, Source};
use crate::user::User;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::debug;

const DOCUMENT_VERSION: u32 = 1;
const ZSTD_LEVEL: i32 = 3;

/// Every primary object of a tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeDocument {
    /// Document format version.
    pub version: u32,
    /// People.
    #[serde(default)]
    pub people: Vec<Person>,
    /// Families.
    #[serde(default)]
    pub families: Vec<Family>,
    /// Events.
    #[serde(default)]
    pub events: Vec<Event>,
    /// Places.
    #[serde(default)]
    pub places: Vec<Place>,
    /// Sources.
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Citations.
    #[serde(default)]
    pub citations: Vec<Citation>,
    /// Repositories.
    #[serde(default)]
    pub repositories: Vec<Repository>,
    /// Media objects.
    #[serde(default)]
    pub media: Vec<Media>,
    /// Notes.
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl NativeDocument {
    /// Reads every object of `db`.
    pub fn from_db(db: &FamilyTreeDb) -> Result<Self> {
        Ok(Self {
            version: DOCUMENT_VERSION,
            people: db.iter()?,
            families: db.iter()?,
            events: db.iter()?,
            places: db.iter()?,
            sources: db.iter()?,
            citations: db.iter()?,
            repositories: db.iter()?,
            media: db.iter()?,
            notes: db.iter()?,
        })
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.people.len()
            + self.families.len()
            + self.events.len()
            + self.places.len()
            + self.sources.len()
            + self.citations.len()
            + self.repositories.len()
            + self.media.len()
            + self.notes.len()
    }

    /// True if the document holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Commits every object to `db` in one transaction labelled `label`.
    pub fn commit_into(self, db: &FamilyTreeDb, label: &str) -> Result<ImportStats> {
        let mut stats = ImportStats::default();
        let mut txn = db.transaction(label);
        stage_imported(db, &mut txn, self.people, &mut stats)?;
        stage_imported(db, &mut txn, self.families, &mut stats)?;
        stage_imported(db, &mut txn, self.events, &mut stats)?;
        stage_imported(db, &mut txn, self.places, &mut stats)?;
        stage_imported(db, &mut txn, self.sources, &mut stats)?;
        stage_imported(db, &mut txn, self.citations, &mut stats)?;
        stage_imported(db, &mut txn, self.repositories, &mut stats)?;
        stage_imported(db, &mut txn, self.media, &mut stats)?;
        stage_imported(db, &mut txn, self.notes, &mut stats)?;
        db.commit(txn)?;
        Ok(stats)
    }
}

/// The native JSON format, optionally compressed.
#[derive(Debug, Clone)]
pub struct NativeFormat {
    descriptor: PluginDescriptor,
    compressed: bool,
}

impl NativeFormat {
    /// Plain JSON, `.gramps`.
    pub fn json() -> Self {
        Self {
            descriptor: PluginDescriptor {
                id: "gramps",
                name: "Gramps JSON",
                description: "The native Gramps document format",
                extension: "gramps",
            },
            compressed: false,
        }
    }

    /// Compressed package, `.gpkg`.
    pub fn package() -> Self {
        Self {
            descriptor: PluginDescriptor {
                id: "gpkg",
                name: "Gramps package",
                description: "The native Gramps document, compressed",
                extension: "gpkg",
            },
            compressed: true,
        }
    }

    fn import_err(&self, reason: impl std::fmt::Display) -> FamError {
        FamError::Import {
            path: self.descriptor.extension.into(),
            reason: reason.to_string(),
        }
    }
}

impl ImportPlugin for NativeFormat {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn import(&self, db: &FamilyTreeDb, input: &mut dyn Read, user: &dyn User) -> Result<ImportStats> {
        let doc: NativeDocument = if self.compressed {
            let decoder = zstd::Decoder::new(input).map_err(|e| self.import_err(e))?;
            serde_json::from_reader(decoder).map_err(|e| self.import_err(e))?
        } else {
            serde_json::from_reader(input).map_err(|e| self.import_err(e))?
        };
        if doc.version > DOCUMENT_VERSION {
            return Err(self.import_err(format!(
                "document version {} is newer than supported version {}",
                doc.version, DOCUMENT_VERSION
            )));
        }
        debug!(objects = doc.len(), "read native document");
        user.begin_progress("Import", "Importing data...", 1);
        let result = doc.commit_into(db, &format!("Import {}", self.descriptor.name));
        user.end_progress();
        result
    }
}

impl ExportPlugin for NativeFormat {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn export(&self, db: &FamilyTreeDb, output: &mut dyn Write, _user: &dyn User) -> Result<()> {
        let doc = NativeDocument::from_db(db)?;
        let export_err = |e: &dyn std::fmt::Display| FamError::Export {
            path: self.descriptor.extension.into(),
            reason: e.to_string(),
        };
        if self.compressed {
            let mut encoder = zstd::Encoder::new(output, ZSTD_LEVEL).map_err(|e| export_err(&e))?;
            serde_json::to_writer(&mut encoder, &doc).map_err(|e| export_err(&e))?;
            encoder.finish().map_err(|e| export_err(&e))?;
        } else {
            serde_json::to_writer_pretty(&mut *output, &doc).map_err(|e| export_err(&e))?;
            output.write_all(b"\n").map_err(|e| export_err(&e))?;
        }
        Ok(())
    }
}
