//! Error types for famtree_core operations.

use std::path::PathBuf;
use thiserror::Error;

/// Why a Family Tree could not be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOpenReason {
    /// Another process holds the tree lock.
    Locked {
        /// Description of the lock holder, as recorded in the lock file.
        holder: String,
    },
    /// A previous session crashed and left the tree inconsistent.
    NeedsRecovery,
    /// The tree was written by a backend this build does not provide.
    BackendUnavailable {
        /// Backend id recorded in the tree directory.
        backend: String,
    },
    /// No tree with that name or path exists.
    NotFound,
    /// The tree exists but the backend failed to open it.
    Backend(String),
}

impl std::fmt::Display for StorageOpenReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Locked { holder } => {
                write!(f, "Database is locked, cannot open it!\n  Info: {}", holder)
            }
            Self::NeedsRecovery => write!(f, "Database needs recovery, cannot open it!"),
            Self::BackendUnavailable { backend } => write!(
                f,
                "Database backend unavailable, cannot open it! (backend: {})",
                backend
            ),
            Self::NotFound => write!(f, "Family Tree does not exist"),
            Self::Backend(msg) => write!(f, "backend error: {}", msg),
        }
    }
}

/// Core error type for famtree_core operations.
#[derive(Error, Debug)]
pub enum FamError {
    /// Malformed flag or value at the option-syntax level.
    #[error("{summary}: {detail}")]
    OptionSyntax {
        /// Short summary line.
        summary: String,
        /// Full message including the offending arguments.
        detail: String,
    },

    /// Valid flags used in an invalid combination, or naming a missing file.
    #[error("{message}")]
    SemanticArg {
        /// Human readable message.
        message: String,
        /// Optional hint shown after the message.
        suggestion: Option<String>,
    },

    /// A Family Tree could not be opened.
    #[error("cannot open {}: {reason}", path.display())]
    StorageOpen {
        /// Tree directory or name that was requested.
        path: PathBuf,
        /// Why the open failed.
        reason: StorageOpenReason,
    },

    /// No registered plugin handles the requested format or name.
    #[error("no {category} handler for '{name}'")]
    HandlerNotFound {
        /// Plugin category (import, export, report, tool, book).
        category: &'static str,
        /// Format extension or plugin id that was requested.
        name: String,
    },

    /// A Gramps ID is already used by a different object.
    #[error("ID {gramps_id} is already used by another {kind}")]
    DuplicateId {
        /// Object kind name.
        kind: &'static str,
        /// The colliding Gramps ID.
        gramps_id: String,
    },

    /// The object holds no data and cannot be saved.
    #[error("cannot save {kind}: no data exists for this {kind}")]
    EmptyObject {
        /// Object kind name.
        kind: &'static str,
    },

    /// A field failed type-specific validation.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// Field that failed.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// An editor for this object is already open.
    #[error("an editor is already open for {0}")]
    EditorActive(String),

    /// Invalid edit-session state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Source state
        from: String,
        /// Target state
        to: String,
    },

    /// Committing an edit failed inside the storage layer.
    #[error("could not save {kind}: {source}")]
    SaveFailed {
        /// Object kind name.
        kind: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<FamError>,
    },

    /// Object with the given handle was not found.
    #[error("{kind} not found: {handle}")]
    ObjectNotFound {
        /// Object kind name.
        kind: &'static str,
        /// Requested handle.
        handle: String,
    },

    /// No Family Tree is currently open.
    #[error("no Family Tree is open")]
    NoOpenTree,

    /// Storage backend failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Record encoding or decoding failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// An import plugin rejected its input.
    #[error("import of {} failed: {reason}", path.display())]
    Import {
        /// File being imported.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// An export plugin failed to write its output.
    #[error("export to {} failed: {reason}", path.display())]
    Export {
        /// Target file.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// A report, tool or book failed while running.
    #[error("{action} '{name}' failed: {reason}")]
    Action {
        /// Action kind (report, tool, book).
        action: &'static str,
        /// Plugin id or book name.
        name: String,
        /// Description of the failure.
        reason: String,
    },

    /// The user declined a confirmation prompt.
    #[error("cancelled by user: {0}")]
    Declined(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FamError {
    /// Returns a user-friendly recovery suggestion for the error, if available.
    pub fn recovery_suggestion(&self) -> Option<&str> {
        match self {
            Self::OptionSyntax { .. } => Some(
                "Type gramps --help for an overview of commands, or read the manual pages.",
            ),
            Self::SemanticArg { suggestion, .. } => suggestion.as_deref(),
            Self::StorageOpen { reason, .. } => match reason {
                StorageOpenReason::Locked { .. } => {
                    Some("Use -u/--force-unlock if the other process is no longer running.")
                }
                StorageOpenReason::NotFound => Some(
                    "If GEDCOM, Gramps-xml or grdb, use the -i option to import into a Family Tree instead.",
                ),
                StorageOpenReason::NeedsRecovery => {
                    Some("Open the Family Tree in the interactive session to repair it.")
                }
                _ => None,
            },
            Self::DuplicateId { .. } => Some(
                "Please enter a different ID or leave blank to get the next available ID value.",
            ),
            Self::EmptyObject { .. } => Some("Please enter data or cancel the edit."),
            Self::EditorActive(_) => Some("The existing editor has been brought to the front."),
            _ => None,
        }
    }

    /// True for errors an edit session recovers from locally (save stays possible).
    pub fn is_recoverable_edit_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateId { .. } | Self::EmptyObject { .. } | Self::Validation { .. }
        )
    }

    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{}: {}", context, err))
    }
}

/// Convenience Result type for famtree_core operations.
pub type Result<T> = std::result::Result<T, FamError>;
