//! Plugin registry: importers, exporters, reports and tools.
//!
//! Plugins are trait objects registered under a string key (a file
//! extension for importers and exporters, an id for reports and tools).
//! Lookups go through those tables only; nothing is resolved by name at
//! run time beyond a map lookup.

mod gedcom;
mod native;
pub mod reports;
pub mod tools;

pub use gedcom::GedcomFormat;
pub use native::{NativeDocument, NativeFormat};

use crate::db::{FamilyTreeDb, Transaction};
use crate::error::{FamError, Result};
use crate::objects::PrimaryObject;
use crate::user::User;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// What every plugin tells about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    /// Lookup key.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// File extension for formats, empty otherwise.
    pub extension: &'static str,
}

impl PluginDescriptor {
    /// File extension handled, for importers and exporters.
    pub fn extension(&self) -> &str {
        self.extension
    }
}

/// An option a report or tool accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSpec {
    /// Option name as used in `-p`.
    pub name: &'static str,
    /// Value used when the option is not given.
    pub default: String,
    /// Help text; the second element lists accepted values, if any.
    pub help: (&'static str, Option<&'static str>),
}

impl OptionSpec {
    /// An option with a free-form value.
    pub fn new(name: &'static str, default: impl Into<String>, help: &'static str) -> Self {
        Self {
            name,
            default: default.into(),
            help: (help, None),
        }
    }

    /// Adds the list of accepted values to the help.
    pub fn with_choices(mut self, choices: &'static str) -> Self {
        self.help.1 = Some(choices);
        self
    }
}

/// Objects written by an import, by kind name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    /// Count per kind name.
    pub counts: BTreeMap<&'static str, usize>,
    /// Gramps IDs that were taken and had to be replaced.
    pub renumbered: usize,
}

impl ImportStats {
    /// Total number of objects written.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Reads a file format into a tree.
pub trait ImportPlugin {
    /// Descriptor; `extension` is the registry key.
    fn descriptor(&self) -> &PluginDescriptor;

    /// Reads `input` and commits its objects to `db` in one transaction.
    fn import(&self, db: &FamilyTreeDb, input: &mut dyn Read, user: &dyn User) -> Result<ImportStats>;
}

/// Writes a tree in a file format.
pub trait ExportPlugin {
    /// Descriptor; `extension` is the registry key.
    fn descriptor(&self) -> &PluginDescriptor;

    /// Writes every object of `db` to `output`.
    fn export(&self, db: &FamilyTreeDb, output: &mut dyn Write, user: &dyn User) -> Result<()>;
}

/// A report run from the command line.
pub trait ReportPlugin {
    /// Descriptor; `id` is the registry key.
    fn descriptor(&self) -> &PluginDescriptor;

    /// Report-specific options; `of`, `off` and `title` are added by the runner.
    fn options(&self) -> Vec<OptionSpec>;

    /// Builds the report document.
    fn build(&self, db: &FamilyTreeDb, options: &reports::ReportOptions) -> Result<reports::ReportDoc>;
}

/// A tool run from the command line.
pub trait ToolPlugin {
    /// Descriptor; `id` is the registry key.
    fn descriptor(&self) -> &PluginDescriptor;

    /// Tool options.
    fn options(&self) -> Vec<OptionSpec> {
        Vec::new()
    }

    /// Runs the tool. Returns a short result line for the user.
    fn run(&self, db: &FamilyTreeDb, options: &BTreeMap<String, String>, user: &dyn User) -> Result<String>;
}

/// All registered plugins.
#[derive(Default)]
pub struct PluginRegistry {
    importers: BTreeMap<String, Box<dyn ImportPlugin>>,
    exporters: BTreeMap<String, Box<dyn ExportPlugin>>,
    reports: BTreeMap<String, Box<dyn ReportPlugin>>,
    tools: BTreeMap<String, Box<dyn ToolPlugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("importers", &self.importers.keys().collect::<Vec<_>>())
            .field("exporters", &self.exporters.keys().collect::<Vec<_>>())
            .field("reports", &self.reports.keys().collect::<Vec<_>>())
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in formats, reports and tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_importer(NativeFormat::json());
        registry.register_importer(NativeFormat::package());
        registry.register_importer(GedcomFormat::new());
        registry.register_exporter(NativeFormat::json());
        registry.register_exporter(NativeFormat::package());
        registry.register_exporter(GedcomFormat::new());
        registry.register_report(reports::SummaryReport::new());
        registry.register_report(reports::IndividualsReport::new());
        registry.register_report(reports::FamilyGroupReport::new());
        registry.register_tool(tools::CheckTool::new());
        registry.register_tool(tools::RenumberTool::new());
        registry
    }

    /// Registers an importer under its extension.
    pub fn register_importer(&mut self, plugin: impl ImportPlugin + 'static) {
        let key = plugin.descriptor().extension.to_string();
        debug!(key = %key, "registered importer");
        self.importers.insert(key, Box::new(plugin));
    }

    /// Registers an exporter under its extension.
    pub fn register_exporter(&mut self, plugin: impl ExportPlugin + 'static) {
        let key = plugin.descriptor().extension.to_string();
        debug!(key = %key, "registered exporter");
        self.exporters.insert(key, Box::new(plugin));
    }

    /// Registers a report under its id.
    pub fn register_report(&mut self, plugin: impl ReportPlugin + 'static) {
        let key = plugin.descriptor().id.to_string();
        debug!(key = %key, "registered report");
        self.reports.insert(key, Box::new(plugin));
    }

    /// Registers a tool under its id.
    pub fn register_tool(&mut self, plugin: impl ToolPlugin + 'static) {
        let key = plugin.descriptor().id.to_string();
        debug!(key = %key, "registered tool");
        self.tools.insert(key, Box::new(plugin));
    }

    /// Importers, by extension.
    pub fn get_import_plugins(&self) -> Vec<&dyn ImportPlugin> {
        self.importers.values().map(|p| p.as_ref()).collect()
    }

    /// Exporters, by extension.
    pub fn get_export_plugins(&self) -> Vec<&dyn ExportPlugin> {
        self.exporters.values().map(|p| p.as_ref()).collect()
    }

    /// Reports, by id.
    pub fn get_reg_reports(&self) -> Vec<&dyn ReportPlugin> {
        self.reports.values().map(|p| p.as_ref()).collect()
    }

    /// Tools, by id.
    pub fn get_reg_tools(&self) -> Vec<&dyn ToolPlugin> {
        self.tools.values().map(|p| p.as_ref()).collect()
    }

    /// Importer for a file extension.
    pub fn find_importer(&self, extension: &str) -> Option<&dyn ImportPlugin> {
        self.importers.get(extension).map(|p| p.as_ref())
    }

    /// Exporter for a file extension.
    pub fn find_exporter(&self, extension: &str) -> Option<&dyn ExportPlugin> {
        self.exporters.get(extension).map(|p| p.as_ref())
    }

    /// Report by id.
    pub fn find_report(&self, id: &str) -> Option<&dyn ReportPlugin> {
        self.reports.get(id).map(|p| p.as_ref())
    }

    /// Tool by id.
    pub fn find_tool(&self, id: &str) -> Option<&dyn ToolPlugin> {
        self.tools.get(id).map(|p| p.as_ref())
    }
}

/// Format guessed from a file name: its lower-cased extension.
///
/// ```
/// use famtree_core::plugins::format_from_path;
/// use std::path::Path;
///
/// assert_eq!(format_from_path(Path::new("/tmp/Smith.GED")), "ged");
/// assert_eq!(format_from_path(Path::new("-")), "");
/// ```
pub fn format_from_path(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Imports `path` (`-` for stdin) with `importer`.
pub fn import_path(
    importer: &dyn ImportPlugin,
    db: &FamilyTreeDb,
    path: &str,
    user: &dyn User,
) -> Result<ImportStats> {
    let stats = if path == "-" {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        importer.import(db, &mut input, user)
    } else {
        let file = File::open(path).map_err(|e| FamError::Import {
            path: path.into(),
            reason: e.to_string(),
        })?;
        importer.import(db, &mut BufReader::new(file), user)
    }
    .map_err(|e| with_path(e, path))?;
    info!(path, format = importer.descriptor().id, total = stats.total(), "import finished");
    Ok(stats)
}

/// Exports to `path` (`-` for stdout) with `exporter`.
///
/// A file target is written next to its final location and renamed into
/// place, so a failed export never leaves a truncated file behind.
pub fn export_path(
    exporter: &dyn ExportPlugin,
    db: &FamilyTreeDb,
    path: &str,
    user: &dyn User,
) -> Result<()> {
    let export_err = |e: &dyn std::fmt::Display| FamError::Export {
        path: path.into(),
        reason: e.to_string(),
    };
    if path == "-" {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        exporter.export(db, &mut out, user)
            .map_err(|e| with_path(e, path))?;
        return out.flush().map_err(|e| export_err(&e));
    }

    let target = Path::new(path);
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| export_err(&e))?;
    {
        let mut out = BufWriter::new(tmp.as_file());
        exporter
            .export(db, &mut out, user)
            .map_err(|e| with_path(e, path))?;
        out.flush().map_err(|e| export_err(&e))?;
    }
    tmp.persist(target).map_err(|e| export_err(&e.error))?;
    info!(path, format = exporter.descriptor().id, "export finished");
    Ok(())
}

/// Plugins report failures against their format; name the file instead.
fn with_path(err: FamError, path: &str) -> FamError {
    match err {
        FamError::Import { reason, .. } => FamError::Import {
            path: path.into(),
            reason,
        },
        FamError::Export { reason, .. } => FamError::Export {
            path: path.into(),
            reason,
        },
        other => other,
    }
}

/// Stages imported objects, keeping their handles and Gramps IDs where free.
///
/// An object whose handle already exists replaces the stored one. A Gramps
/// ID already used by a different object (in the tree or earlier in the same
/// import) is cleared so that a fresh one is assigned.
pub(crate) fn stage_imported<T: PrimaryObject>(
    db: &FamilyTreeDb,
    txn: &mut Transaction,
    objects: Vec<T>,
    stats: &mut ImportStats,
) -> Result<()> {
    let mut used = HashSet::new();
    for mut obj in objects {
        let id = obj.gramps_id().to_string();
        if !id.is_empty() {
            let owner = db.handle_for_id(T::KIND, &id)?;
            let taken_in_tree = owner.is_some_and(|h| Some(&h) != obj.handle());
            if taken_in_tree || used.contains(&id) {
                debug!(kind = %T::KIND, id = %id, "gramps id taken, assigning a new one");
                obj.set_gramps_id(String::new());
                stats.renumbered += 1;
            }
        }
        db.stage(txn, &mut obj)?;
        used.insert(obj.gramps_id().to_string());
        *stats.counts.entry(T::KIND.name()).or_default() += 1;
    }
    Ok(())
}
