//! Command dispatcher.
//!
//! [`ArgHandler`] takes a [`ParsedRequest`], validates the files and trees
//! it names, and runs it against the [`SessionState`]: listings and
//! removals first, then open, import, actions, export and cleanup.
//!
//! Fatal problems come back as `Err`; the binary turns them into exit code
//! 1. A failing action is reported and recorded, and the run goes on.

use crate::argparser::{absolute, ActionKind, ActionRequest, ListMode, ParsedRequest, HELP_TEXT, USAGE_TEXT};
use crate::books::{run_book, BookList};
use crate::config::{Config, UserDirs};
use crate::db::{DbMode, FamilyTreeDb, BACKEND_ID};
use crate::dbman::{write_tree_files, TreeManager};
use crate::error::{FamError, Result, StorageOpenReason};
use crate::options::split_options;
use crate::plugins::{self, reports::run_report, tools::run_tool, PluginDescriptor, PluginRegistry};
use crate::state::SessionState;
use crate::user::User;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

/// Collaborators shared by every step of a run.
#[derive(Clone, Copy)]
pub struct CliContext<'a> {
    /// Settings for this run.
    pub config: &'a Config,
    /// User directory.
    pub dirs: &'a UserDirs,
    /// Registered formats, reports and tools.
    pub registry: &'a PluginRegistry,
    /// Prompts and status lines.
    pub user: &'a dyn User,
}

/// What a headless run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Tree that was worked on.
    pub opened: Option<PathBuf>,
    /// Files imported.
    pub imported: usize,
    /// Actions that ran to completion.
    pub actions_done: usize,
    /// Actions that failed, as `kind name`.
    pub actions_failed: Vec<String>,
    /// Files exported.
    pub exported: usize,
}

/// Validated import or export: path and format.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileTask {
    path: String,
    format: String,
}

/// Runs a parsed command line.
pub struct ArgHandler<'a> {
    ctx: CliContext<'a>,
    state: &'a mut SessionState,
    manager: TreeManager,
    gui: bool,
    open_gui: Option<String>,
    open: Option<PathBuf>,
    imports: Vec<FileTask>,
    exports: Vec<FileTask>,
    actions: Vec<ActionRequest>,
    removes: Vec<String>,
    list_mode: ListMode,
    database_names: Option<Vec<String>>,
    force_unlock: bool,
    help: bool,
    usage: bool,
    username: Option<String>,
    transient: Option<TempDir>,
}

impl std::fmt::Debug for ArgHandler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgHandler")
            .field("gui", &self.gui)
            .field("open", &self.open)
            .field("imports", &self.imports)
            .field("exports", &self.exports)
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

impl<'a> ArgHandler<'a> {
    /// Validates `request` before anything runs.
    ///
    /// Resolves `-O`/`-C`, checks that import files exist, confirms export
    /// overwrites and makes sure every named format has a plugin.
    ///
    /// # Errors
    ///
    /// The first parse error, an unusable tree, a missing import file, a
    /// declined overwrite, or a format no plugin handles.
    pub fn new(
        ctx: CliContext<'a>,
        state: &'a mut SessionState,
        request: ParsedRequest,
        gui: bool,
    ) -> Result<Self> {
        if let Some(err) = request.errors.first() {
            return Err(FamError::OptionSyntax {
                summary: err.summary.clone(),
                detail: err.detail.clone(),
            });
        }
        let manager = TreeManager::new(ctx.config.database_path(ctx.dirs));
        let mut handler = Self {
            ctx,
            state,
            manager,
            gui,
            open_gui: request.open_gui,
            open: None,
            imports: Vec::new(),
            exports: Vec::new(),
            actions: if gui { Vec::new() } else { request.actions },
            removes: request.removes,
            list_mode: if gui { ListMode::None } else { request.list_mode },
            database_names: request.database_names,
            force_unlock: request.force_unlock,
            help: request.help,
            usage: request.usage,
            username: request.username,
            transient: None,
        };
        let target = request.open.as_deref().or(request.create.as_deref());
        handler.open = handler.handle_open_option(target, request.create.as_deref())?;
        for spec in &request.imports {
            handler.handle_import_option(&spec.path, spec.format.as_deref())?;
        }
        if !gui {
            for spec in &request.exports {
                handler.handle_export_option(&spec.path, spec.format.as_deref())?;
            }
        }
        debug!(?handler, "arguments sanitized");
        Ok(handler)
    }

    /// The tree manager for the configured database directory.
    pub fn manager(&self) -> &TreeManager {
        &self.manager
    }

    fn handle_open_option(&self, value: Option<&str>, create: Option<&str>) -> Result<Option<PathBuf>> {
        let Some(value) = value else {
            return Ok(None);
        };
        if let Some(db_path) = self.manager.deduce_db_path(value) {
            self.manager.check_db(&db_path, self.force_unlock)?;
            if create.is_some() {
                return Err(FamError::SemanticArg {
                    message: format!(
                        "Error: Family Tree '{}' already exists.\nThe '-C' option cannot be used.",
                        value
                    ),
                    suggestion: None,
                });
            }
            return Ok(Some(db_path));
        }
        if create.is_some() {
            let backend = self.ctx.config.get_str("database.backend");
            let (db_path, _) = self.manager.create_new_db(Some(value), backend)?;
            return Ok(Some(db_path));
        }
        Err(FamError::StorageOpen {
            path: PathBuf::from(value),
            reason: StorageOpenReason::NotFound,
        })
    }

    fn handle_import_option(&mut self, value: &str, format: Option<&str>) -> Result<()> {
        if value != "-" && !absolute(value).exists() {
            return Err(FamError::SemanticArg {
                message: format!("Error: Import file {} not found.", value),
                suggestion: None,
            });
        }
        let format = match format {
            Some(f) => f.to_lowercase(),
            None => plugins::format_from_path(Path::new(value)),
        };
        if self.ctx.registry.find_importer(&format).is_none() {
            self.ctx.user.notify_error(
                "Unrecognized type",
                &format!(
                    "Error: Unrecognized type: \"{}\" for import file: {}",
                    format, value
                ),
            );
            return Err(FamError::HandlerNotFound {
                category: "import",
                name: format,
            });
        }
        let path = if value == "-" {
            value.to_string()
        } else {
            absolute(value).display().to_string()
        };
        self.imports.push(FileTask { path, format });
        Ok(())
    }

    fn handle_export_option(&mut self, value: &str, format: Option<&str>) -> Result<()> {
        let path = if value == "-" {
            value.to_string()
        } else {
            let full = absolute(value);
            if full.exists() {
                let message = format!(
                    "WARNING: Output file already exists!\nWARNING: It will be overwritten:\n   {}",
                    full.display()
                );
                if !self.ctx.user.prompt("OK to overwrite?", &message, "yes", "no") {
                    return Err(FamError::Declined(format!(
                        "not overwriting {}",
                        full.display()
                    )));
                }
                self.ctx
                    .user
                    .info(&format!("Will overwrite the existing file: {}", full.display()));
            }
            full.display().to_string()
        };
        let format = match format {
            Some(f) => f.to_lowercase(),
            None => plugins::format_from_path(Path::new(value)),
        };
        if self.ctx.registry.find_exporter(&format).is_none() {
            self.ctx.user.notify_error(
                "Unrecognized format",
                &format!("ERROR: Unrecognized format for export file {}", value),
            );
            return Err(FamError::HandlerNotFound {
                category: "export",
                name: format,
            });
        }
        self.exports.push(FileTask { path, format });
        Ok(())
    }

    /// Prepares an interactive session.
    ///
    /// A bare argument is opened as a tree, or imported into a new tree when
    /// it is a file; its directory is returned. Otherwise `-O` and `-i` are
    /// carried out, importing into a new persistent tree when nothing is
    /// open, and `None` is returned.
    pub fn handle_args_gui(&mut self) -> Result<Option<PathBuf>> {
        if let Some(target) = self.open_gui.clone() {
            let db_path = match self.manager.deduce_db_path(&target) {
                Some(path) => path,
                None => {
                    let file = absolute(&target);
                    if !file.is_file() {
                        return Err(FamError::SemanticArg {
                            message: format!("Error: cannot open '{}'", target),
                            suggestion: None,
                        });
                    }
                    let (path, title) = self.manager.import_new_db(
                        &file,
                        self.ctx.user,
                        self.ctx.registry,
                        self.ctx.config,
                    )?;
                    info!(title = %title, "imported into new family tree");
                    path
                }
            };
            self.manager.check_db(&db_path, self.force_unlock)?;
            self.open = Some(db_path.clone());
            self.open_action()?;
            return Ok(Some(db_path));
        }
        self.open_action()?;
        self.import_action()?;
        Ok(None)
    }

    /// Runs a headless request. Listings, help and usage go to `out`.
    ///
    /// Cleanup always runs, whatever the outcome of the earlier steps.
    pub fn handle_args_cli(&mut self, out: &mut dyn Write) -> Result<RunSummary> {
        if self.help || self.usage {
            if self.help {
                out.write_all(HELP_TEXT.as_bytes())?;
            }
            if self.usage {
                out.write_all(USAGE_TEXT.as_bytes())?;
            }
            return Ok(RunSummary::default());
        }
        let patterns = self.database_names.as_deref();
        match self.list_mode {
            ListMode::Summary => {
                out.write_all(self.manager.render_list(patterns).as_bytes())?;
                return Ok(RunSummary::default());
            }
            ListMode::Detail => {
                out.write_all(self.manager.render_summaries(patterns).as_bytes())?;
                return Ok(RunSummary::default());
            }
            ListMode::Tabular => {
                out.write_all(self.manager.render_table(patterns).as_bytes())?;
                return Ok(RunSummary::default());
            }
            ListMode::None => {}
        }
        if !self.removes.is_empty() {
            for pattern in &self.removes {
                self.manager.remove_database(pattern, self.ctx.user)?;
            }
            return Ok(RunSummary::default());
        }

        let mut summary = RunSummary::default();
        let result = self.run_steps(&mut summary);
        let cleaned = self.cleanup();
        result?;
        cleaned?;
        Ok(summary)
    }

    fn run_steps(&mut self, summary: &mut RunSummary) -> Result<()> {
        self.open_action()?;
        summary.imported = self.import_action()?;
        summary.opened = self.state.db().ok().map(|db| db.path().to_path_buf());

        for action in self.actions.clone() {
            self.ctx
                .user
                .info(&format!("Performing action: {}.", action.kind.as_str()));
            if !action.options.is_empty() {
                self.ctx
                    .user
                    .info(&format!("Using options string: {}", action.options));
            }
            match self.cl_action(action.kind, &action.options) {
                Ok(()) => summary.actions_done += 1,
                Err(e) => {
                    let name = split_options(&action.options)
                        .remove("name")
                        .unwrap_or_default();
                    error!(action = action.kind.as_str(), name = %name, error = %e, "action failed");
                    if !matches!(e, FamError::HandlerNotFound { .. }) {
                        self.ctx
                            .user
                            .notify_error(&format!("{} failed", action.kind.as_str()), &e.to_string());
                    }
                    summary
                        .actions_failed
                        .push(format!("{} {}", action.kind.as_str(), name).trim_end().to_string());
                }
            }
        }

        for task in self.exports.clone() {
            self.ctx.user.info(&format!(
                "Exporting: file {}, format {}.",
                task.path, task.format
            ));
            self.cl_export(&task)?;
            summary.exported += 1;
        }
        Ok(())
    }

    /// Closes the open tree and removes the transient import tree.
    pub fn cleanup(&mut self) -> Result<()> {
        self.ctx.user.info("Cleaning up.");
        let closed = self.state.close();
        if let Some(dir) = self.transient.take() {
            debug!(path = %dir.path().display(), "removing transient import tree");
            if let Err(e) = dir.close() {
                warn!(error = %e, "could not remove transient import tree");
            }
        }
        closed
    }

    fn open_tree(&mut self, path: &Path) -> Result<Rc<FamilyTreeDb>> {
        let db = FamilyTreeDb::open(path, DbMode::ReadWrite, None)?;
        db.apply_config(self.ctx.config);
        if let Some(username) = &self.username {
            debug!(username = %username, "credentials are not used by the redb backend");
        }
        self.state.change_database(db)
    }

    fn open_action(&mut self) -> Result<()> {
        let Some(path) = self.open.clone() else {
            return Ok(());
        };
        if let Err(e) = self.open_tree(&path) {
            self.ctx.user.notify_error("Error opening the file.", "Exiting...");
            return Err(e);
        }
        self.ctx.user.info("Opened successfully!");
        Ok(())
    }

    /// Imports every file, into a new tree when none is open.
    ///
    /// The new tree is a temporary directory for a headless run and a
    /// regular tree for an interactive one.
    fn import_action(&mut self) -> Result<usize> {
        if self.imports.is_empty() {
            return Ok(0);
        }
        if !self.state.is_open() {
            let path = if self.gui {
                let backend = self.ctx.config.get_str("database.backend");
                let (path, _) = self.manager.create_new_db(None, backend)?;
                path
            } else {
                let dir = tempfile::Builder::new().prefix("import_dbdir").tempdir()?;
                write_tree_files(dir.path(), "import", BACKEND_ID)?;
                let path = dir.path().to_path_buf();
                self.transient = Some(dir);
                path
            };
            if let Err(e) = self.open_tree(&path) {
                self.ctx.user.notify_error("Error opening the file.", "Exiting...");
                return Err(e);
            }
            self.ctx.user.info("Created empty Family Tree successfully");
        }
        let db = self.state.db()?;
        for task in &self.imports {
            self.ctx.user.info(&format!(
                "Importing: file {}, format {}.",
                task.path, task.format
            ));
            let importer = self.ctx.registry.find_importer(&task.format).ok_or_else(|| {
                FamError::HandlerNotFound {
                    category: "import",
                    name: task.format.clone(),
                }
            })?;
            plugins::import_path(importer, &db, &task.path, self.ctx.user)?;
        }
        Ok(self.imports.len())
    }

    fn cl_export(&self, task: &FileTask) -> Result<()> {
        let exporter = self.ctx.registry.find_exporter(&task.format).ok_or_else(|| {
            FamError::HandlerNotFound {
                category: "export",
                name: task.format.clone(),
            }
        })?;
        let db = self.state.db()?;
        plugins::export_path(exporter, &db, &task.path, self.ctx.user)
    }

    /// Runs one report, tool or book.
    ///
    /// An unknown or missing name lists the available names and fails with
    /// [`FamError::HandlerNotFound`].
    pub fn cl_action(&self, kind: ActionKind, options_str: &str) -> Result<()> {
        let name = split_options(options_str).remove("name");
        let registry = self.ctx.registry;
        match kind {
            ActionKind::Report => {
                let found = name.as_deref().and_then(|n| registry.find_report(n));
                match found {
                    Some(report) => run_report(report, &*self.state.db()?, options_str, self.ctx.user),
                    None => Err(self.unknown_name(
                        kind,
                        name,
                        registry.get_reg_reports().into_iter().map(|r| r.descriptor()).collect(),
                    )),
                }
            }
            ActionKind::Tool => {
                let found = name.as_deref().and_then(|n| registry.find_tool(n));
                match found {
                    Some(tool) => run_tool(tool, &*self.state.db()?, options_str, self.ctx.user),
                    None => Err(self.unknown_name(
                        kind,
                        name,
                        registry.get_reg_tools().into_iter().map(|t| t.descriptor()).collect(),
                    )),
                }
            }
            ActionKind::Book => {
                let books = BookList::load(self.ctx.dirs)?;
                match name.as_deref().and_then(|n| books.get_book(n)) {
                    Some(book) => run_book(book, registry, &*self.state.db()?, options_str, self.ctx.user),
                    None => {
                        let mut names = books.names();
                        names.sort_unstable();
                        let listing: Vec<String> = names.iter().map(|n| format!("   {}", n)).collect();
                        Err(self.report_unknown(kind, name, listing))
                    }
                }
            }
        }
    }

    fn unknown_name(&self, kind: ActionKind, name: Option<String>, mut entries: Vec<&PluginDescriptor>) -> FamError {
        entries.sort_by_key(|d| d.id.to_lowercase());
        let listing = entries
            .iter()
            .map(|d| {
                if d.id.len() <= 25 {
                    format!("   {:<26}- {}", d.id, d.name)
                } else {
                    format!("   {}\t- {}", d.id, d.name)
                }
            })
            .collect();
        self.report_unknown(kind, name, listing)
    }

    fn report_unknown(&self, kind: ActionKind, name: Option<String>, listing: Vec<String>) -> FamError {
        let what = kind.as_str();
        let message = match &name {
            Some(_) => format!("Unknown {} name.", what),
            None => format!(
                "{}{} name not given. Please use one of [-p|--options] name={}name",
                what[..1].to_uppercase(),
                &what[1..],
                what
            ),
        };
        let mut text = format!("{}\n Available names are:", message);
        for line in listing {
            text.push('\n');
            text.push_str(&line);
        }
        self.ctx.user.notify_error(&message, &text);
        FamError::HandlerNotFound {
            category: what,
            name: name.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argparser::{parse_args, FileSpec};
    use crate::objects::{Name, Person};
    use crate::user::RecordingUser;
    use std::fs;

    struct Fixture {
        tmp: TempDir,
        dirs: UserDirs,
        config: Config,
        registry: PluginRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let dirs = UserDirs::new(tmp.path().join("user"));
            let config = Config::load(&dirs).unwrap();
            Self {
                tmp,
                dirs,
                config,
                registry: PluginRegistry::with_builtins(),
            }
        }

        fn ctx<'a>(&'a self, user: &'a RecordingUser) -> CliContext<'a> {
            CliContext {
                config: &self.config,
                dirs: &self.dirs,
                registry: &self.registry,
                user,
            }
        }

        fn manager(&self) -> TreeManager {
            TreeManager::new(self.config.database_path(&self.dirs))
        }

        fn tree_with_people(&self, title: &str, names: &[&str]) -> PathBuf {
            let (dir, _) = self.manager().create_new_db(Some(title), BACKEND_ID).unwrap();
            let db = FamilyTreeDb::open(&dir, DbMode::ReadWrite, None).unwrap();
            let mut txn = db.transaction("setup");
            for name in names {
                let mut p = Person {
                    primary_name: Name::new(name, "Smith"),
                    ..Default::default()
                };
                db.stage(&mut txn, &mut p).unwrap();
            }
            db.commit(txn).unwrap();
            db.close().unwrap();
            dir
        }

        fn request(&mut self, args: &[&str]) -> ParsedRequest {
            parse_args(args.iter().copied(), &mut self.config, &self.dirs)
        }
    }

    #[test]
    fn test_missing_tree_is_fatal_with_hint() {
        let fx = Fixture::new();
        let user = RecordingUser::new(true);
        let mut state = SessionState::new();
        let req = ParsedRequest {
            open: Some("Nowhere".into()),
            ..Default::default()
        };
        let err = ArgHandler::new(fx.ctx(&user), &mut state, req, false).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert!(err.recovery_suggestion().unwrap().contains("-i option"));
    }

    #[test]
    fn test_create_on_existing_tree_is_fatal() {
        let fx = Fixture::new();
        fx.tree_with_people("Existing", &[]);
        let user = RecordingUser::new(true);
        let mut state = SessionState::new();
        let req = ParsedRequest {
            open: Some("Existing".into()),
            create: Some("Existing".into()),
            ..Default::default()
        };
        let err = ArgHandler::new(fx.ctx(&user), &mut state, req, false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_unknown_import_format_fails_before_any_import() {
        let fx = Fixture::new();
        let file = fx.tmp.path().join("data.xyz");
        fs::write(&file, "x").unwrap();
        let user = RecordingUser::new(true);
        let mut state = SessionState::new();
        let req = ParsedRequest {
            imports: vec![FileSpec {
                path: file.display().to_string(),
                format: None,
            }],
            ..Default::default()
        };
        let err = ArgHandler::new(fx.ctx(&user), &mut state, req, false).unwrap_err();
        assert!(matches!(err, FamError::HandlerNotFound { category: "import", .. }));
        assert!(user.text().contains("Unrecognized type: \"xyz\""));
        assert!(!state.is_open());
    }

    #[test]
    fn test_declined_overwrite_is_fatal() {
        let fx = Fixture::new();
        let target = fx.tmp.path().join("out.gramps");
        fs::write(&target, "old").unwrap();
        fx.tree_with_people("Tree", &["Ann"]);
        let user = RecordingUser::new(false);
        let mut state = SessionState::new();
        let req = ParsedRequest {
            open: Some("Tree".into()),
            exports: vec![FileSpec {
                path: target.display().to_string(),
                format: None,
            }],
            ..Default::default()
        };
        let err = ArgHandler::new(fx.ctx(&user), &mut state, req, false).unwrap_err();
        assert!(matches!(err, FamError::Declined(_)));
        assert_eq!(user.prompts(), vec!["OK to overwrite?"]);
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
    }

    #[test]
    fn test_failed_action_does_not_stop_the_run() {
        let mut fx = Fixture::new();
        let dir = fx.tree_with_people("MyTree", &["Ann", "Bob"]);
        let report = fx.tmp.path().join("summary.txt");
        let export = fx.tmp.path().join("out.gramps");
        let of = format!("name=summary,of={}", report.display());
        let req = fx.request(&[
            "-O",
            "MyTree",
            "-a",
            "report",
            "-p",
            of.as_str(),
            "-a",
            "report",
            "-p",
            "name=bogus_report_name",
            "-e",
            export.to_str().unwrap(),
        ]);
        let user = RecordingUser::new(true);
        let mut state = SessionState::new();
        let mut out = Vec::new();
        let summary = ArgHandler::new(fx.ctx(&user), &mut state, req, false)
            .unwrap()
            .handle_args_cli(&mut out)
            .unwrap();

        assert_eq!(summary.opened, Some(dir.clone()));
        assert_eq!(summary.actions_done, 1);
        assert_eq!(summary.actions_failed, vec!["report bogus_report_name"]);
        assert_eq!(summary.exported, 1);
        assert!(report.exists());
        assert!(export.exists());
        let text = user.text();
        assert!(text.contains("Unknown report name."));
        assert!(text.contains(" Available names are:"));
        assert!(text.contains(&format!("   {:<26}- ", "summary")));
        assert!(text.contains("Cleaning up."));
        assert!(!state.is_open());
        assert!(!crate::lock::is_locked(&dir));
    }

    #[test]
    fn test_missing_report_name_lists_reports() {
        let fx = Fixture::new();
        fx.tree_with_people("T", &[]);
        let user = RecordingUser::new(true);
        let mut state = SessionState::new();
        let req = ParsedRequest {
            open: Some("T".into()),
            ..Default::default()
        };
        let mut handler = ArgHandler::new(fx.ctx(&user), &mut state, req, false).unwrap();
        handler.open_action().unwrap();
        let err = handler.cl_action(ActionKind::Tool, "").unwrap_err();
        assert!(matches!(err, FamError::HandlerNotFound { category: "tool", .. }));
        let text = user.text();
        assert!(text.contains("Tool name not given. Please use one of [-p|--options] name=toolname"));
        assert!(text.contains("   check"));
        handler.cleanup().unwrap();
    }

    #[test]
    fn test_imports_into_transient_tree_then_removes_it() {
        let mut fx = Fixture::new();
        let dir = fx.tree_with_people("Source", &["Ann"]);
        let first = fx.tmp.path().join("a.gramps");
        {
            let db = FamilyTreeDb::open(&dir, DbMode::ReadOnly, None).unwrap();
            let user = RecordingUser::new(true);
            let registry = PluginRegistry::with_builtins();
            plugins::export_path(
                registry.find_exporter("gramps").unwrap(),
                &db,
                first.to_str().unwrap(),
                &user,
            )
            .unwrap();
        }
        let ged = fx.tmp.path().join("c.ged");
        fs::write(&ged, "0 HEAD\n0 @I9@ INDI\n1 NAME Bob /Jones/\n0 TRLR\n").unwrap();
        let out_path = fx.tmp.path().join("merged.gramps");
        let req = fx.request(&[
            "-i",
            first.to_str().unwrap(),
            "-i",
            ged.to_str().unwrap(),
            "-e",
            out_path.to_str().unwrap(),
            "-f",
            "gramps",
        ]);
        let user = RecordingUser::new(true);
        let mut state = SessionState::new();
        let mut handler = ArgHandler::new(fx.ctx(&user), &mut state, req, false).unwrap();
        let summary = handler.handle_args_cli(&mut Vec::new()).unwrap();
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.exported, 1);
        let transient = summary.opened.unwrap();
        assert!(!transient.exists());

        let json = fs::read_to_string(&out_path).unwrap();
        assert!(json.contains("\"Ann\""));
        assert!(json.contains("\"Bob\""));
        let text = user.text();
        assert!(text.contains("Created empty Family Tree successfully"));
        assert!(text.contains("Importing: file"));
    }

    #[test]
    fn test_list_mode_reads_locked_tree() {
        let mut fx = Fixture::new();
        let dir = fx.tree_with_people("MyTree", &[]);
        fs::write(dir.join(crate::lock::LOCK_FILE), "someone@elsewhere").unwrap();
        let req = fx.request(&["-l", "MyTree"]);
        let user = RecordingUser::new(true);
        let mut state = SessionState::new();
        let mut out = Vec::new();
        ArgHandler::new(fx.ctx(&user), &mut state, req, false)
            .unwrap()
            .handle_args_cli(&mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("with name \"MyTree\""));
        assert!(!state.is_open());
    }

    #[test]
    fn test_gui_fast_path_imports_file_into_new_tree() {
        let mut fx = Fixture::new();
        let ged = fx.tmp.path().join("Smiths.ged");
        fs::write(&ged, "0 HEAD\n0 @I1@ INDI\n1 NAME Ann /Smith/\n0 TRLR\n").unwrap();
        let req = fx.request(&[ged.to_str().unwrap()]);
        assert!(crate::arbiter::need_gui(&req));
        let user = RecordingUser::new(true);
        let mut state = SessionState::new();
        let mut handler = ArgHandler::new(fx.ctx(&user), &mut state, req, true).unwrap();
        let dir = handler.handle_args_gui().unwrap().unwrap();
        assert!(dir.starts_with(fx.config.database_path(&fx.dirs)));
        drop(handler);
        assert_eq!(state.db().unwrap().count(crate::objects::ObjectKind::Person).unwrap(), 1);
        assert_eq!(fx.manager().family_tree_list()[0].0, "Smiths");
    }
}
