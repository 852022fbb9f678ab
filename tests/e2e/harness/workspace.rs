use anyhow::{Context, Result};
use famtree_core::{Config, DbMode, FamilyTreeDb, Name, Person, TreeManager, UserDirs};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

/// Prefix in scenario arguments that stands for the workspace directory.
pub const WORKSPACE_PREFIX: &str = "@/";

/// Isolated user directory plus scratch space for input and output files.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    /// Create an empty workspace
    pub fn empty() -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp directory")?;
        fs::create_dir_all(dir.path().join("user"))?;
        Ok(Self { dir })
    }

    /// Get workspace path
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// User directory of this workspace.
    pub fn dirs(&self) -> UserDirs {
        UserDirs::new(self.path().join("user"))
    }

    /// Settings as the binary would load them.
    pub fn config(&self) -> Result<Config> {
        Ok(Config::load(&self.dirs())?)
    }

    /// Tree manager over the workspace database directory.
    pub fn manager(&self) -> Result<TreeManager> {
        let dirs = self.dirs();
        Ok(TreeManager::new(self.config()?.database_path(&dirs)))
    }

    /// Replaces every `@/` in `arg` with the workspace path.
    pub fn expand(&self, arg: &str) -> String {
        let root = format!("{}/", self.path().display());
        arg.replace(WORKSPACE_PREFIX, &root)
    }

    /// Full path of a workspace file.
    pub fn file(&self, path: &str) -> PathBuf {
        self.path().join(path)
    }

    /// Write file to workspace
    pub fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.file(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directories for {}", path))?;
        }
        fs::write(&full_path, content).with_context(|| format!("Failed to write file: {}", path))?;
        Ok(())
    }

    /// Read file from workspace
    pub fn read_to_string(&self, path: &str) -> Result<String> {
        fs::read_to_string(self.file(path)).with_context(|| format!("Failed to read file: {}", path))
    }

    /// Check if file exists
    pub fn file_exists(&self, path: &str) -> bool {
        self.file(path).exists()
    }

    /// Creates a tree called `title` holding one Smith per given name.
    pub fn create_tree(&self, title: &str, people: &[&str]) -> Result<PathBuf> {
        let config = self.config()?;
        let manager = self.manager()?;
        let (dir, _) = manager.create_new_db(Some(title), config.get_str("database.backend"))?;
        let db = FamilyTreeDb::open(&dir, DbMode::ReadWrite, None)?;
        db.apply_config(&config);
        let mut txn = db.transaction("Add people");
        for first in people {
            let mut person = Person {
                primary_name: Name::new(first, "Smith"),
                ..Default::default()
            };
            db.stage(&mut txn, &mut person)?;
        }
        db.commit(txn)?;
        db.close()?;
        Ok(dir)
    }

    /// Directory of the tree called `title`.
    pub fn tree_path(&self, title: &str) -> Result<PathBuf> {
        self.manager()?
            .family_tree_path(title)
            .with_context(|| format!("No Family Tree called '{}'", title))
    }

    /// Opens the tree called `title` for editing.
    pub fn edit_tree(&self, title: &str) -> Result<Rc<FamilyTreeDb>> {
        let dir = self.tree_path(title)?;
        let db = FamilyTreeDb::open(&dir, DbMode::ReadWrite, None)?;
        db.apply_config(&self.config()?);
        Ok(Rc::new(db))
    }

    /// Opens the tree called `title` read-only.
    pub fn open_tree(&self, title: &str) -> Result<FamilyTreeDb> {
        let dir = self.tree_path(title)?;
        Ok(FamilyTreeDb::open(&dir, DbMode::ReadOnly, None)?)
    }
}
