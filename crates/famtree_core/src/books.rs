//! Books: named, ordered lists of reports kept in `books.toml`.
//!
//! ```toml
//! [[book]]
//! name = "Overview"
//!
//! [[book.item]]
//! report = "summary"
//! options = "off=txt"
//! ```

use crate::config::UserDirs;
use crate::db::FamilyTreeDb;
use crate::error::{FamError, Result};
use crate::options::{render_options, split_options};
use crate::plugins::{reports::run_report, PluginRegistry};
use crate::user::User;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One report of a book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookItem {
    /// Report id.
    pub report: String,
    /// Options string, in the `-p` syntax.
    #[serde(default)]
    pub options: String,
}

/// A named list of reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Book name, used with `-a book -p name=...`.
    pub name: String,
    /// Reports in run order.
    #[serde(default, rename = "item")]
    pub items: Vec<BookItem>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BookFile {
    #[serde(default, rename = "book")]
    books: Vec<Book>,
}

/// All saved books.
#[derive(Debug, Clone, Default)]
pub struct BookList {
    books: Vec<Book>,
    path: Option<PathBuf>,
}

impl BookList {
    /// Reads the user's books file. A missing file is an empty list.
    pub fn load(dirs: &UserDirs) -> Result<Self> {
        Self::load_from(&dirs.books_file())
    }

    /// Reads books from `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut list = Self {
            books: Vec::new(),
            path: Some(path.to_path_buf()),
        };
        if !path.exists() {
            return Ok(list);
        }
        let content = fs::read_to_string(path)?;
        let file: BookFile = toml::from_str(&content)
            .map_err(|e| FamError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        list.books = file.books;
        debug!(path = %path.display(), books = list.books.len(), "loaded books");
        Ok(list)
    }

    /// Writes the list back to the file it came from.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = BookFile {
            books: self.books.clone(),
        };
        let content = toml::to_string_pretty(&file)
            .map_err(|e| FamError::Config(format!("failed to serialize books: {}", e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Adds `book`, replacing one of the same name.
    pub fn set_book(&mut self, book: Book) {
        match self.books.iter_mut().find(|b| b.name == book.name) {
            Some(existing) => *existing = book,
            None => self.books.push(book),
        }
    }

    /// Book called `name`.
    pub fn get_book(&self, name: &str) -> Option<&Book> {
        self.books.iter().find(|b| b.name == name)
    }

    /// Book names in file order.
    pub fn names(&self) -> Vec<&str> {
        self.books.iter().map(|b| b.name.as_str()).collect()
    }

    /// True if no books are saved.
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

/// Runs every report of `book` in order.
///
/// `extra` options (from `-p`, without `name`) are appended to each item's
/// own options, so `-p name=Overview,off=csv` switches every item to csv.
/// Items naming an unknown report are skipped with a warning.
pub fn run_book(
    book: &Book,
    registry: &PluginRegistry,
    db: &FamilyTreeDb,
    extra: &str,
    user: &dyn User,
) -> Result<()> {
    let mut overrides = split_options(extra);
    overrides.remove("name");
    info!(book = %book.name, items = book.items.len(), "running book");
    for item in &book.items {
        let Some(report) = registry.find_report(&item.report) else {
            warn!(book = %book.name, report = %item.report, "skipping unknown report");
            user.warn(
                "Unknown report",
                &format!("Book '{}' names unknown report '{}'; skipping it.", book.name, item.report),
            );
            continue;
        };
        let mut options = split_options(&item.options);
        options.extend(overrides.clone());
        run_report(report, db, &render_options(&options), user)?;
    }
    Ok(())
}
