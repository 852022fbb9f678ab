//! Famtree Core Library
//!
//! Genealogy database engine behind the `gramps` command line:
//! - Family Tree storage with atomic, undoable transactions
//! - Command-line option parsing and the interactive/batch decision
//! - A dispatcher running imports, exports, reports, tools and books
//! - Edit sessions with snapshot-based cancel
//!
//! # Quick Start
//!
//! ```
//! use famtree_core::{DbMode, FamilyTreeDb, Name, Person, TreeManager};
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! let manager = TreeManager::new(tmp.path().join("grampsdb"));
//! let (dir, title) = manager.create_new_db(Some("Example"), "redb").unwrap();
//! assert_eq!(title, "Example");
//!
//! let db = FamilyTreeDb::open(&dir, DbMode::ReadWrite, None).unwrap();
//! let mut person = Person {
//!     primary_name: Name::new("Ada", "Lovelace"),
//!     ..Default::default()
//! };
//! let mut txn = db.transaction("Add Person (Lovelace, Ada)");
//! let handle = db.stage(&mut txn, &mut person).unwrap();
//! db.commit(txn).unwrap();
//!
//! let stored: Person = db.get_required(&handle).unwrap();
//! assert_eq!(stored.gramps_id, "I0000");
//! ```
//!
//! # Options strings
//!
//! Reports and tools take their settings as one `-p` string:
//!
//! ```
//! use famtree_core::options::parse_options;
//!
//! let opts = parse_options(r#"name=foo,title=["a, b","c"]"#).unwrap();
//! assert_eq!(opts["name"], "foo");
//! assert_eq!(opts["title"], r#"["a, b","c"]"#);
//! ```

pub mod arbiter;
pub mod argparser;
mod books;
mod config;
pub mod db;
mod dbman;
mod dispatcher;
mod editor;
mod error;
mod handle;
mod lock;
mod objects;
pub mod options;
pub mod plugins;
mod signals;
mod state;
mod user;

pub use arbiter::{need_gui, resolve, Arbitration};
pub use argparser::{
    parse_args, render_config, ActionKind, ActionRequest, EarlyExit, FileSpec, ListMode, ParseError,
    ParsedRequest,
};
pub use books::{run_book, Book, BookItem, BookList};
pub use config::{Config, ConfigValue, UserDirs, CONFIG_FILE};
pub use db::{format_gramps_id, DbMode, FamilyTreeDb, Transaction, TreeMeta};
pub use dbman::{matches_patterns, TreeManager, TreeSummary, FAMILY_TREE_LABEL};
pub use dispatcher::{ArgHandler, CliContext, RunSummary};
pub use editor::{
    CitationEdit, CloseOutcome, EditNotice, EditSession, EditState, EditTarget, EditorRegistry,
    ReferenceEdit, SecondaryEdit, SecondaryObject, SessionKey,
};
pub use error::{FamError, Result, StorageOpenReason};
pub use handle::Handle;
pub use lock::{is_locked, TreeLock};
pub use objects::*;
pub use options::{parse_options, render_options, OptionMap};
pub use plugins::{PluginDescriptor, PluginRegistry};
pub use signals::{Signal, SignalHub, SubscriptionId};
pub use state::SessionState;
pub use user::{RecordingUser, User};
