//! Family Tree directory management.
//!
//! [`TreeManager`] works on the directory holding all Family Trees. It
//! never opens a tree to list it: listings come from `name.txt`, the lock
//! file and the `meta.json` summary written when a tree is closed.

use crate::db::{DbMode, FamilyTreeDb, TreeMeta, BACKEND_FILE, BACKEND_ID, NAME_FILE, RECOVER_FILE};
use crate::error::{FamError, Result, StorageOpenReason};
use crate::lock;
use crate::objects::ObjectKind;
use crate::plugins::PluginRegistry;
use crate::user::User;
use crate::Config;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Summary label of the tree title column.
pub const FAMILY_TREE_LABEL: &str = "Family Tree";

/// Directory-level facts about one tree, read without opening it.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeSummary {
    /// Tree title.
    pub name: String,
    /// Tree directory.
    pub path: PathBuf,
    /// Backend id from `database.txt`.
    pub backend: String,
    /// Lock holder, when locked.
    pub locked_by: Option<String>,
    /// Contents of `meta.json`, when present.
    pub meta: Option<TreeMeta>,
}

impl TreeSummary {
    /// Label/value pairs in label order, the tree title included.
    pub fn fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert(FAMILY_TREE_LABEL.to_string(), self.name.clone());
        fields.insert("Path".to_string(), self.path.display().to_string());
        fields.insert("Database".to_string(), self.backend.clone());
        fields.insert(
            "Locked?".to_string(),
            match &self.locked_by {
                Some(holder) => format!("locked by {}", holder),
                None => "no".to_string(),
            },
        );
        let last = self
            .meta
            .as_ref()
            .and_then(|m| m.last_modified)
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        fields.insert("Last accessed".to_string(), last);
        if let Some(meta) = &self.meta {
            for kind in ObjectKind::ALL {
                fields.insert(count_label(kind).to_string(), meta.count(kind).to_string());
            }
        }
        fields
    }
}

fn count_label(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Person => "Number of people",
        ObjectKind::Family => "Number of families",
        ObjectKind::Event => "Number of events",
        ObjectKind::Place => "Number of places",
        ObjectKind::Source => "Number of sources",
        ObjectKind::Citation => "Number of citations",
        ObjectKind::Repository => "Number of repositories",
        ObjectKind::Media => "Number of media",
        ObjectKind::Note => "Number of notes",
    }
}

/// True if `name` matches any pattern (`^pattern$` regex, or exact text).
/// `None` matches everything.
pub fn matches_patterns(name: &str, patterns: Option<&[String]>) -> bool {
    let Some(patterns) = patterns else {
        return true;
    };
    patterns.iter().any(|pattern| {
        pattern == name
            || Regex::new(&format!("^{}$", pattern))
                .map(|re| re.is_match(name))
                .unwrap_or(false)
    })
}

/// Manager of the Family Tree directory.
#[derive(Debug, Clone)]
pub struct TreeManager {
    dbdir: PathBuf,
}

impl TreeManager {
    /// Manages trees under `dbdir`.
    pub fn new(dbdir: impl Into<PathBuf>) -> Self {
        Self {
            dbdir: dbdir.into(),
        }
    }

    /// Directory holding the trees.
    pub fn dbdir(&self) -> &Path {
        &self.dbdir
    }

    /// (title, directory) of every tree, sorted by title (case-insensitive).
    pub fn family_tree_list(&self) -> Vec<(String, PathBuf)> {
        let Ok(entries) = fs::read_dir(&self.dbdir) else {
            return Vec::new();
        };
        let mut trees: Vec<(String, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter_map(|path| read_name(&path).map(|name| (name, path)))
            .collect();
        trees.sort_by_key(|(name, _)| name.to_lowercase());
        trees
    }

    /// Directory of the tree titled `name`.
    pub fn family_tree_path(&self, name: &str) -> Option<PathBuf> {
        self.family_tree_list()
            .into_iter()
            .find(|(title, _)| title == name)
            .map(|(_, path)| path)
    }

    /// Resolves a tree title, or a directory that holds a tree.
    pub fn deduce_db_path(&self, name_or_path: &str) -> Option<PathBuf> {
        if let Some(path) = self.family_tree_path(name_or_path) {
            return Some(path);
        }
        let candidate = PathBuf::from(name_or_path);
        let candidate = if candidate.is_absolute() {
            candidate
        } else {
            std::env::current_dir().ok()?.join(candidate)
        };
        (candidate.is_dir() && candidate.join(NAME_FILE).is_file()).then_some(candidate)
    }

    /// True if a tree titled `name` exists.
    pub fn tree_exists(&self, name: &str) -> bool {
        self.family_tree_path(name).is_some()
    }

    /// "Family Tree N" for the smallest unused N.
    pub fn default_title(&self) -> String {
        self.unique_title("Family Tree", true)
    }

    fn unique_title(&self, base: &str, always_number: bool) -> String {
        let titles: Vec<String> = self
            .family_tree_list()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        if !always_number && !titles.iter().any(|t| t == base) {
            return base.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = if always_number {
                format!("{} {}", base, n)
            } else {
                format!("{} ({})", base, n)
            };
            if !titles.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Creates an empty tree. Returns its directory and title.
    pub fn create_new_db(&self, title: Option<&str>, backend: &str) -> Result<(PathBuf, String)> {
        let title = match title {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => self.default_title(),
        };
        fs::create_dir_all(&self.dbdir)?;
        let dir = self.new_tree_dir();
        fs::create_dir(&dir)?;
        write_tree_files(&dir, &title, backend)?;
        info!(title = %title, path = %dir.display(), "created family tree");
        Ok((dir, title))
    }

    fn new_tree_dir(&self) -> PathBuf {
        loop {
            let id = uuid::Uuid::new_v4().simple().to_string();
            let dir = self.dbdir.join(&id[..12]);
            if !dir.exists() {
                return dir;
            }
        }
    }

    /// Creates a tree titled after `file` and imports `file` into it.
    ///
    /// The new tree is removed again if the import fails.
    pub fn import_new_db(
        &self,
        file: &Path,
        user: &dyn User,
        registry: &PluginRegistry,
        config: &Config,
    ) -> Result<(PathBuf, String)> {
        let format = crate::plugins::format_from_path(file);
        let importer = registry.find_importer(&format).ok_or_else(|| {
            FamError::HandlerNotFound {
                category: "import",
                name: format.clone(),
            }
        })?;
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.default_title());
        let title = self.unique_title(&stem, false);
        let (dir, title) = self.create_new_db(Some(&title), BACKEND_ID)?;

        let result = (|| {
            let db = FamilyTreeDb::open(&dir, DbMode::ReadWrite, None)?;
            db.apply_config(config);
            crate::plugins::import_path(importer, &db, &file.to_string_lossy(), user)?;
            db.close()
        })();
        if let Err(e) = result {
            warn!(path = %dir.display(), error = %e, "import into new tree failed, removing it");
            let _ = fs::remove_dir_all(&dir);
            return Err(e);
        }
        Ok((dir, title))
    }

    /// True if the tree is locked.
    pub fn is_locked(&self, dir: &Path) -> bool {
        lock::is_locked(dir)
    }

    /// Who holds the lock.
    pub fn locker_name(&self, dir: &Path) -> String {
        lock::locker_name(dir)
    }

    /// Removes a stale lock.
    pub fn break_lock(&self, dir: &Path) -> Result<()> {
        lock::break_lock(dir)
    }

    /// True if an interrupted session left the tree inconsistent.
    pub fn needs_recovery(&self, dir: &Path) -> bool {
        dir.join(RECOVER_FILE).exists()
    }

    /// True if the tree was written by a backend this build lacks.
    pub fn backend_unavailable(&self, dir: &Path) -> bool {
        read_backend(dir) != BACKEND_ID
    }

    /// Checks, in order: lock (after breaking it if asked), recovery, backend.
    pub fn check_db(&self, dir: &Path, force_unlock: bool) -> Result<()> {
        let fail = |reason| {
            Err(FamError::StorageOpen {
                path: dir.to_path_buf(),
                reason,
            })
        };
        if force_unlock {
            self.break_lock(dir)?;
        }
        if self.is_locked(dir) {
            return fail(StorageOpenReason::Locked {
                holder: self.locker_name(dir),
            });
        }
        if self.needs_recovery(dir) {
            return fail(StorageOpenReason::NeedsRecovery);
        }
        if self.backend_unavailable(dir) {
            return fail(StorageOpenReason::BackendUnavailable {
                backend: read_backend(dir),
            });
        }
        Ok(())
    }

    /// Removes every tree whose title matches `pattern`, after confirmation.
    ///
    /// Returns how many trees were removed.
    pub fn remove_database(&self, pattern: &str, user: &dyn User) -> Result<usize> {
        let patterns = [pattern.to_string()];
        let matches: Vec<(String, PathBuf)> = self
            .family_tree_list()
            .into_iter()
            .filter(|(name, _)| matches_patterns(name, Some(&patterns)))
            .collect();
        if matches.is_empty() {
            user.notify_error(
                "Family Tree not found",
                &format!("No Family Tree matches \"{}\".", pattern),
            );
            return Ok(0);
        }

        let mut removed = 0;
        for (name, dir) in matches {
            let question = format!(
                "Are you sure you want to remove the Family Tree named\n\"{}\"?",
                name
            );
            if !user.prompt("Remove Family Tree warning", &question, "yes", "no") {
                debug!(name = %name, "removal declined");
                continue;
            }
            match fs::remove_dir_all(&dir) {
                Ok(()) => {
                    info!(name = %name, path = %dir.display(), "removed family tree");
                    removed += 1;
                }
                Err(e) => user.notify_error("Could not delete Family Tree", &e.to_string()),
            }
        }
        Ok(removed)
    }

    /// Renames a tree.
    pub fn rename_database(&self, dir: &Path, new_title: &str) -> Result<()> {
        if self.tree_exists(new_title) {
            return Err(FamError::SemanticArg {
                message: format!("Family Tree '{}' already exists.", new_title),
                suggestion: None,
            });
        }
        fs::write(dir.join(NAME_FILE), new_title)?;
        Ok(())
    }

    /// Summaries of trees matching `patterns`.
    pub fn family_tree_summary(&self, patterns: Option<&[String]>) -> Vec<TreeSummary> {
        self.family_tree_list()
            .into_iter()
            .filter(|(name, _)| matches_patterns(name, patterns))
            .map(|(name, path)| TreeSummary {
                backend: read_backend(&path),
                locked_by: lock::is_locked(&path).then(|| lock::locker_name(&path)),
                meta: TreeMeta::read(&path),
                name,
                path,
            })
            .collect()
    }

    /// `-l` output.
    pub fn render_list(&self, patterns: Option<&[String]>) -> String {
        let mut out = String::from("List of known Family Trees in your database path\n\n");
        for (name, dir) in self.family_tree_list() {
            if matches_patterns(&name, patterns) {
                let _ = writeln!(out, "{} with name \"{}\"", dir.display(), name);
            }
        }
        out
    }

    /// `-L` output.
    pub fn render_summaries(&self, patterns: Option<&[String]>) -> String {
        let mut out = String::from("Gramps Family Trees:\n");
        for summary in self.family_tree_summary(patterns) {
            let _ = writeln!(out, "Family Tree \"{}\":", summary.name);
            for (label, value) in summary.fields() {
                if label != FAMILY_TREE_LABEL {
                    let _ = writeln!(out, "   {}: {}", label, value);
                }
            }
        }
        out
    }

    /// `-t` output: a header row, then one quoted row per tree.
    pub fn render_table(&self, patterns: Option<&[String]>) -> String {
        let mut out = String::from("Gramps Family Trees:\n");
        let summaries = self.family_tree_summary(patterns);
        let Some(first) = summaries.first() else {
            return out;
        };
        let mut header = vec![FAMILY_TREE_LABEL.to_string()];
        header.extend(
            first
                .fields()
                .into_keys()
                .filter(|label| label != FAMILY_TREE_LABEL),
        );
        let _ = writeln!(out, "{}", header.join("\t"));
        for summary in &summaries {
            let fields = summary.fields();
            let row: Vec<String> = header
                .iter()
                .map(|label| format!("\"{}\"", fields.get(label).map(String::as_str).unwrap_or("")))
                .collect();
            let _ = writeln!(out, "{}", row.join("\t"));
        }
        out
    }
}

fn read_name(dir: &Path) -> Option<String> {
    fs::read_to_string(dir.join(NAME_FILE))
        .ok()
        .map(|s| s.trim().to_string())
}

fn read_backend(dir: &Path) -> String {
    fs::read_to_string(dir.join(BACKEND_FILE))
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| BACKEND_ID.to_string())
}

/// Writes the title, backend id and an empty summary into `dir`.
pub fn write_tree_files(dir: &Path, title: &str, backend: &str) -> Result<()> {
    fs::write(dir.join(NAME_FILE), title)?;
    fs::write(dir.join(BACKEND_FILE), backend)?;
    TreeMeta {
        backend: backend.to_string(),
        ..Default::default()
    }
    .write(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::RecordingUser;
    use tempfile::TempDir;

    #[test]
    fn test_create_uses_unique_default_titles() {
        let tmp = TempDir::new().unwrap();
        let man = TreeManager::new(tmp.path());
        let (_, first) = man.create_new_db(None, BACKEND_ID).unwrap();
        let (_, second) = man.create_new_db(None, BACKEND_ID).unwrap();
        assert_eq!(first, "Family Tree 1");
        assert_eq!(second, "Family Tree 2");
        assert_eq!(man.family_tree_list().len(), 2);
    }

    #[test]
    fn test_deduce_by_name_and_by_directory() {
        let tmp = TempDir::new().unwrap();
        let man = TreeManager::new(tmp.path());
        let (dir, _) = man.create_new_db(Some("Smiths"), BACKEND_ID).unwrap();
        assert_eq!(man.deduce_db_path("Smiths"), Some(dir.clone()));
        assert_eq!(man.deduce_db_path(dir.to_str().unwrap()), Some(dir));
        assert_eq!(man.deduce_db_path("Joneses"), None);
    }

    #[test]
    fn test_check_db_order() {
        let tmp = TempDir::new().unwrap();
        let man = TreeManager::new(tmp.path());
        let (dir, _) = man.create_new_db(Some("T"), BACKEND_ID).unwrap();
        assert!(man.check_db(&dir, false).is_ok());

        fs::write(dir.join(lock::LOCK_FILE), "carol@far").unwrap();
        fs::write(dir.join(RECOVER_FILE), "").unwrap();
        let err = man.check_db(&dir, false).unwrap_err();
        assert!(err.to_string().contains("carol@far"));

        let err = man.check_db(&dir, true).unwrap_err();
        assert!(matches!(
            err,
            FamError::StorageOpen {
                reason: StorageOpenReason::NeedsRecovery,
                ..
            }
        ));
    }

    #[test]
    fn test_remove_honours_prompt_and_regex() {
        let tmp = TempDir::new().unwrap();
        let man = TreeManager::new(tmp.path());
        man.create_new_db(Some("Test A"), BACKEND_ID).unwrap();
        man.create_new_db(Some("Test B"), BACKEND_ID).unwrap();
        man.create_new_db(Some("Keep"), BACKEND_ID).unwrap();

        let refuse = RecordingUser::new(false);
        assert_eq!(man.remove_database("Test.*", &refuse).unwrap(), 0);
        assert_eq!(refuse.prompts().len(), 2);

        let accept = RecordingUser::new(true);
        assert_eq!(man.remove_database("Test.*", &accept).unwrap(), 2);
        let names: Vec<_> = man.family_tree_list().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Keep"]);
    }

    #[test]
    fn test_listing_reads_locked_tree_without_opening() {
        let tmp = TempDir::new().unwrap();
        let man = TreeManager::new(tmp.path());
        let (dir, _) = man.create_new_db(Some("Busy"), BACKEND_ID).unwrap();
        fs::write(dir.join(lock::LOCK_FILE), "dave@box").unwrap();

        let listing = man.render_list(Some(&["Busy".to_string()]));
        assert!(listing.contains("with name \"Busy\""));
        let table = man.render_table(None);
        assert!(table.lines().nth(1).unwrap().starts_with("Family Tree\t"));
        assert!(table.contains("\"locked by dave@box\""));
        let detail = man.render_summaries(None);
        assert!(detail.contains("Family Tree \"Busy\":"));
        assert!(detail.contains("   Number of people: 0"));
    }
}
