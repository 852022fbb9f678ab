//! Command-line argument parsing.
//!
//! The argument grammar is getopt's: options first, and the first bare
//! argument ends option processing. Several options pair with the option
//! that immediately follows them (`-i FILE -f FORMAT`, `-a report -p OPTS`),
//! so the parser rebuilds the original option order from clap's argument
//! indices before interpreting anything.
//!
//! Parsing never panics and never exits: problems are collected in
//! [`ParsedRequest::errors`], and options that end the run early (`-s`,
//! `-v`, `-D`, read-only `-c`) are reported as an [`EarlyExit`].

use crate::config::{Config, UserDirs, CONFIG_FILE};
use crate::error::FamError;
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Full `--help` text.
pub const HELP_TEXT: &str = "
Usage: gramps [OPTION...]
  --load-modules=MODULE1,MODULE2,...     Dynamic modules to load

Help options
  -?, --help                             Show this help message
  --usage                                Display brief usage message

Application options
  -O, --open=FAMILY_TREE                 Open Family Tree
  -U, --username=USERNAME                Database username
  -P, --password=PASSWORD                Database password
  -C, --create=FAMILY_TREE               Create on open if new Family Tree
  -i, --import=FILENAME                  Import file
  -e, --export=FILENAME                  Export file
  -r, --remove=FAMILY_TREE_PATTERN       Remove matching Family Tree(s) (use regular expressions)
  -f, --format=FORMAT                    Specify Family Tree format
  -a, --action=ACTION                    Specify action
  -p, --options=OPTIONS_STRING           Specify options
  -d, --debug=LOGGER_NAME                Enable debug logs
  -l [FAMILY_TREE_PATTERN...]            List Family Trees
  -L [FAMILY_TREE_PATTERN...]            List Family Trees in Detail
  -t [FAMILY_TREE_PATTERN...]            List Family Trees, tab delimited
  -u, --force-unlock                     Force unlock of Family Tree
  -s, --show                             Show config settings
  -c, --config=[config.setting[:value]]  Set config setting(s) and start Gramps
  -y, --yes                              Don't ask to confirm dangerous actions (non-GUI mode only)
  -q, --quiet                            Suppress progress indication output (non-GUI mode only)
  -v, --version                          Show versions
  -S, --safe                             Start Gramps in 'Safe mode'
                                          (temporarily use default settings)
  -D, --default=[APXFEZ]                 Reset settings to default;
                 A - addons are cleared
                 P - Preferences to default
                 X - Books are cleared, reports and tool settings to default
                 F - filters are cleared
                 Z - Old upgrade files are cleared
                 E - Everything is set to default or cleared
";

/// `--usage` examples.
pub const USAGE_TEXT: &str = "
Example of usage of Gramps command line interface

1. To import three databases (whose formats can be determined from their names)
and then check the resulting database for errors, one may type:
gramps -i file1.ged -i file2.gpkg -i ~/db3.gramps -a tool -p name=check

2. To explicitly specify the formats in the above example, append filenames with appropriate -f options:
gramps -i file1.ged -f ged -i file2.gpkg -f gpkg -i ~/db3.gramps -f gramps -a tool -p name=check

3. To record the database resulting from all imports, supply -e flag
(use -f if the filename does not allow Gramps to guess the format):
gramps -i file1.ged -i file2.gpkg -e ~/new-package -f gpkg

4. To save any error messages of the above example into files outfile and errfile, run:
gramps -i file1.ged -i file2.gpkg -e ~/new-package -f gpkg >outfile 2>errfile

5. To import three databases and prepare a session with the result:
gramps -i file1.ged -i file2.gpkg -i ~/db3.gramps

6. To open a database and, based on that data, list every individual as CSV
putting the output into the people.csv file:
gramps -O 'Family Tree 1' -a report -p name=individuals,off=csv,of=people.csv

7. To generate a summary of a database:
gramps -O 'Family Tree 1' -a report -p name=summary

8. Listing report options
Use name=individuals,show=all to find out about all available options for the individuals report.
To find out details of a particular option, use show=option_name, e.g. name=individuals,show=off.
To learn about available report names, use name=show.

9. To convert a Family Tree on the fly to a .gramps file:
gramps -O 'Family Tree 1' -e output.gramps -f gramps

10. Finally, to start a normal session type:
gramps

Note: These examples are for bash shell.
Syntax may be different for other shells and for Windows.
";

const SYNTAX_HINT: &str = "Type gramps --help for an overview of commands, or read the manual pages.";
const NEED_INPUT: &str = "To use in the command-line mode, supply at least one input file to process.";

/// Which listing was requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListMode {
    /// No listing.
    #[default]
    None,
    /// `-l`: path and title.
    Summary,
    /// `-L`: detailed blocks.
    Detail,
    /// `-t`: tab delimited.
    Tabular,
}

/// Kind of a `-a/--action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Run a report.
    Report,
    /// Run a tool.
    Tool,
    /// Run a saved book of reports.
    Book,
}

impl ActionKind {
    /// Parses `report`, `tool` or `book`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "report" => Some(Self::Report),
            "tool" => Some(Self::Tool),
            "book" => Some(Self::Book),
            _ => None,
        }
    }

    /// Command-line name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Report => "report",
            Self::Tool => "tool",
            Self::Book => "book",
        }
    }
}

/// An import or export file with its optional explicit format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    /// Path as given, `-` for stdin/stdout.
    pub path: String,
    /// Format given with `-f`, if any.
    pub format: Option<String>,
}

/// An action with its raw options string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    /// Action kind.
    pub kind: ActionKind,
    /// Options string given with `-p`, empty when absent.
    pub options: String,
}

/// Why the run ends right after parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyExit {
    /// `-s`: print all settings.
    ShowConfig,
    /// `-v`: print versions.
    Version,
    /// `-c name` without a value: the setting was shown.
    ConfigShown,
    /// `-D`: user state was reset.
    DefaultsReset,
}

/// A parse problem: short summary plus the full message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Summary line.
    pub summary: String,
    /// Full message.
    pub detail: String,
}

impl From<FamError> for ParseError {
    fn from(err: FamError) -> Self {
        match err {
            FamError::OptionSyntax { summary, detail } => Self { summary, detail },
            other => Self {
                summary: "Error parsing the arguments".to_string(),
                detail: match other.recovery_suggestion() {
                    Some(hint) => format!("{}\n{}", other, hint),
                    None => other.to_string(),
                },
            },
        }
    }
}

/// Structured result of parsing the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRequest {
    /// `-O`: tree to open.
    pub open: Option<String>,
    /// `-C`: tree to create if missing.
    pub create: Option<String>,
    /// Bare argument: open this and ignore everything else.
    pub open_gui: Option<String>,
    /// `-U`.
    pub username: Option<String>,
    /// `-P`.
    pub password: Option<String>,
    /// `-i`, in order.
    pub imports: Vec<FileSpec>,
    /// `-e`, in order.
    pub exports: Vec<FileSpec>,
    /// `-a`, in order.
    pub actions: Vec<ActionRequest>,
    /// `-r` patterns.
    pub removes: Vec<String>,
    /// `-l`/`-L`/`-t`.
    pub list_mode: ListMode,
    /// Bare arguments given with a list flag.
    pub database_names: Option<Vec<String>>,
    /// `-u`.
    pub force_unlock: bool,
    /// `-y`.
    pub auto_accept: bool,
    /// `-q`.
    pub quiet: bool,
    /// `-h`/`-?`/`--help`.
    pub help: bool,
    /// `--usage`.
    pub usage: bool,
    /// `-S`.
    pub safe_mode: bool,
    /// `-d` logger names.
    pub debug: Vec<String>,
    /// `--load-modules` names.
    pub load_modules: Vec<String>,
    /// True if `-c name:value` changed a setting.
    pub config_changed: bool,
    /// Set when the run ends after parsing.
    pub early_exit: Option<EarlyExit>,
    /// Collected problems; any entry makes the run fail.
    pub errors: Vec<ParseError>,
    /// Status lines produced while parsing, for stderr.
    pub notices: Vec<String>,
}

impl ParsedRequest {
    /// True if any listing was requested.
    pub fn wants_list(&self) -> bool {
        self.list_mode != ListMode::None
    }
}

fn command() -> Command {
    let value = |id: &'static str, short: char, long: &'static str| {
        Arg::new(id)
            .short(short)
            .long(long)
            .action(ArgAction::Append)
            .num_args(1)
    };
    let flag = |id: &'static str, short: char, long: &'static str| {
        Arg::new(id).short(short).long(long).action(ArgAction::Count)
    };
    Command::new("gramps")
        .no_binary_name(true)
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(value("open", 'O', "open"))
        .arg(value("username", 'U', "username"))
        .arg(value("password", 'P', "password"))
        .arg(value("create", 'C', "create"))
        .arg(value("import", 'i', "import"))
        .arg(value("export", 'e', "export"))
        .arg(value("remove", 'r', "remove"))
        .arg(value("format", 'f', "format"))
        .arg(value("action", 'a', "action"))
        .arg(value("options", 'p', "options"))
        .arg(value("debug", 'd', "debug"))
        .arg(value("config", 'c', "config"))
        .arg(value("default", 'D', "default"))
        .arg(
            Arg::new("load-modules")
                .long("load-modules")
                .action(ArgAction::Append)
                .num_args(1),
        )
        .arg(Arg::new("list").short('l').action(ArgAction::Count))
        .arg(Arg::new("list-more").short('L').action(ArgAction::Count))
        .arg(Arg::new("list-table").short('t').action(ArgAction::Count))
        .arg(flag("force-unlock", 'u', "force-unlock"))
        .arg(flag("show", 's', "show"))
        .arg(flag("yes", 'y', "yes"))
        .arg(flag("quiet", 'q', "quiet"))
        .arg(flag("version", 'v', "version"))
        .arg(flag("safe", 'S', "safe"))
        .arg(flag("help", 'h', "help").short_alias('?'))
        .arg(Arg::new("usage").long("usage").action(ArgAction::Count))
        .arg(
            Arg::new("leftargs")
                .num_args(0..)
                .action(ArgAction::Append)
                .trailing_var_arg(true),
        )
}

const VALUE_OPTIONS: [&str; 14] = [
    "open",
    "username",
    "password",
    "create",
    "import",
    "export",
    "remove",
    "format",
    "action",
    "options",
    "debug",
    "config",
    "default",
    "load-modules",
];

const FLAG_OPTIONS: [&str; 11] = [
    "list",
    "list-more",
    "list-table",
    "force-unlock",
    "show",
    "yes",
    "quiet",
    "version",
    "safe",
    "help",
    "usage",
];

/// One option occurrence in command-line order.
#[derive(Debug, Clone)]
struct OptionEvent {
    index: usize,
    id: &'static str,
    value: String,
}

fn collect_events(matches: &ArgMatches) -> Vec<OptionEvent> {
    let from_command_line =
        |id: &str| matches.value_source(id) == Some(ValueSource::CommandLine);
    let mut events = Vec::new();
    for id in VALUE_OPTIONS {
        if !from_command_line(id) {
            continue;
        }
        let (Some(indices), Some(values)) = (matches.indices_of(id), matches.get_many::<String>(id))
        else {
            continue;
        };
        for (index, value) in indices.zip(values) {
            events.push(OptionEvent {
                // value index; the flag sits just before it
                index: index.saturating_sub(1),
                id,
                value: value.clone(),
            });
        }
    }
    for id in FLAG_OPTIONS {
        if !from_command_line(id) {
            continue;
        }
        if let Some(indices) = matches.indices_of(id) {
            for index in indices {
                events.push(OptionEvent {
                    index,
                    id,
                    value: String::new(),
                });
            }
        }
    }
    events.sort_by_key(|e| e.index);
    events
}

fn construct_error(args: &[String], suggestion: &str, error: Option<&str>) -> ParseError {
    let mut detail = String::new();
    if let Some(error) = error {
        let _ = writeln!(detail, "{}", error);
    }
    let _ = write!(
        detail,
        "Error parsing the arguments: [ {} ] \n{}",
        args.join(" "),
        suggestion
    );
    ParseError {
        summary: "Error parsing the arguments".to_string(),
        detail,
    }
}

/// Parses `args` (without the program name).
///
/// `-c` reads and changes `config`; `-D` deletes files under `dirs`;
/// `-e` probes that each export target can be created.
pub fn parse_args<I, S>(args: I, config: &mut Config, dirs: &UserDirs) -> ParsedRequest
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    let mut req = ParsedRequest::default();

    let matches = match command().try_get_matches_from(&args) {
        Ok(m) => m,
        Err(e) => {
            let rendered = e.to_string();
            let first = rendered
                .lines()
                .next()
                .unwrap_or_default()
                .trim_start_matches("error: ")
                .to_string();
            req.errors
                .push(construct_error(&args, SYNTAX_HINT, Some(&first)));
            return req;
        }
    };

    let events = collect_events(&matches);
    let mut leftargs: Vec<String> = matches
        .get_many::<String>("leftargs")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    debug!(?events, ?leftargs, "parsed command line");

    if !leftargs.is_empty()
        && events
            .iter()
            .any(|e| matches!(e.id, "list" | "list-more" | "list-table"))
    {
        req.database_names = Some(std::mem::take(&mut leftargs));
    }

    if let Some(first) = leftargs.first() {
        req.notices.push(format!("Trying to open: {} ...", first));
        req.open_gui = Some(first.clone());
        req.force_unlock = events.iter().any(|e| e.id == "force-unlock");
        return req;
    }

    let mut consumed = vec![false; events.len()];
    let mut need_to_quit = false;
    let next_is = |i: usize, id: &str| events.get(i + 1).filter(|e| e.id == id).map(|e| e.value.clone());

    for (i, event) in events.iter().enumerate() {
        match event.id {
            "open" => req.open = Some(event.value.clone()),
            "create" => req.create = Some(event.value.clone()),
            "username" => req.username = Some(event.value.clone()),
            "password" => req.password = Some(event.value.clone()),
            "import" => {
                let format = next_is(i, "format");
                if format.is_some() {
                    consumed[i + 1] = true;
                }
                req.imports.push(FileSpec {
                    path: event.value.clone(),
                    format,
                });
            }
            "export" => {
                let format = next_is(i, "format");
                if format.is_some() {
                    consumed[i + 1] = true;
                }
                if let Err(err) = probe_writable(&event.value) {
                    req.errors.push(err);
                    return req;
                }
                req.exports.push(FileSpec {
                    path: event.value.clone(),
                    format,
                });
            }
            "remove" => req.removes.push(event.value.clone()),
            "action" => {
                let options = next_is(i, "options");
                if options.is_some() {
                    consumed[i + 1] = true;
                }
                match ActionKind::parse(&event.value) {
                    Some(kind) => req.actions.push(ActionRequest {
                        kind,
                        options: options.unwrap_or_default(),
                    }),
                    None => req
                        .notices
                        .push(format!("Unknown action: {}. Ignoring.", event.value)),
                }
            }
            "debug" => {
                req.notices.push(format!("setup debugging {}", event.value));
                req.debug.push(event.value.clone());
                consumed[i] = true;
            }
            "load-modules" => {
                req.load_modules
                    .extend(event.value.split(',').map(|s| s.trim().to_string()));
                consumed[i] = true;
            }
            // -l wins over -L, which wins over -t
            "list" => req.list_mode = ListMode::Summary,
            "list-more" if req.list_mode != ListMode::Summary => req.list_mode = ListMode::Detail,
            "list-table" if req.list_mode == ListMode::None => req.list_mode = ListMode::Tabular,
            "show" => {
                req.early_exit = Some(EarlyExit::ShowConfig);
                return req;
            }
            "config" => {
                consumed[i] = true;
                match apply_config_option(&event.value, config, &mut req) {
                    Ok(ConfigOutcome::Shown) => need_to_quit = true,
                    Ok(ConfigOutcome::Changed) => req.config_changed = true,
                    Ok(ConfigOutcome::Nothing) => {}
                    Err(err) => {
                        req.errors.push(err);
                        return req;
                    }
                }
            }
            "help" => req.help = true,
            "usage" => req.usage = true,
            "force-unlock" => req.force_unlock = true,
            "yes" => req.auto_accept = true,
            "quiet" => req.quiet = true,
            "safe" => {
                req.safe_mode = true;
                consumed[i] = true;
            }
            "version" => {
                req.early_exit = Some(EarlyExit::Version);
                return req;
            }
            "default" => {
                if let Err(e) = reset_user_state(dirs, &event.value) {
                    req.errors.push(ParseError::from(e));
                    return req;
                }
                req.early_exit = Some(EarlyExit::DefaultsReset);
                return req;
            }
            // -f and -p only mean something right after -i/-e and -a
            _ => {}
        }
    }

    let unconsumed = consumed.iter().filter(|c| !**c).count();
    if unconsumed > 0
        && req.open.is_none()
        && req.imports.is_empty()
        && req.removes.is_empty()
        && !req.wants_list()
        && !req.help
        && !req.usage
    {
        req.errors.push(construct_error(&args, NEED_INPUT, None));
    }

    if need_to_quit && req.errors.is_empty() {
        req.early_exit = Some(EarlyExit::ConfigShown);
    }
    req
}

fn probe_writable(value: &str) -> Result<(), ParseError> {
    if value == "-" {
        return Ok(());
    }
    let path = absolute(value);
    if path.exists() {
        return Ok(());
    }
    let probe = fs::File::create(&path).and_then(|file| {
        drop(file);
        fs::remove_file(&path)
    });
    probe.map_err(|e| ParseError {
        summary: "Cannot write export file".to_string(),
        detail: format!("WARNING: {}:\nWARNING: {}", e, path.display()),
    })
}

/// Makes `value` absolute against the current directory, expanding `~`.
pub fn absolute(value: &str) -> PathBuf {
    let expanded = match value.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(value)),
        None => PathBuf::from(value),
    };
    if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    }
}

enum ConfigOutcome {
    Nothing,
    Shown,
    Changed,
}

fn apply_config_option(
    value: &str,
    config: &mut Config,
    req: &mut ParsedRequest,
) -> Result<ConfigOutcome, ParseError> {
    if value.is_empty() {
        return Ok(ConfigOutcome::Nothing);
    }
    let (name, new_value) = match value.split_once(':') {
        Some((name, new_value)) => (name, Some(new_value)),
        None => (value, None),
    };
    let Some(current) = config.get(name).cloned() else {
        return Err(ParseError {
            summary: "Error parsing the arguments".to_string(),
            detail: format!("Gramps: no such config setting: '{}'", name),
        });
    };
    req.notices.push(format!(
        "Current Gramps config setting: {}:{}",
        name, current
    ));
    let Some(new_value) = new_value else {
        return Ok(ConfigOutcome::Shown);
    };
    let updated = config
        .set_from_str(name, new_value)
        .map_err(ParseError::from)?;
    req.notices.push(format!(
        "    New Gramps config setting: {}:{}",
        name, updated
    ));
    Ok(ConfigOutcome::Changed)
}

/// `-s` output: every setting, grouped by section.
pub fn render_config(config: &Config) -> String {
    let source = config
        .filename()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    let mut out = format!("Gramps config settings from {}:\n", source);
    let mut section = None;
    for (key, value) in config.iter() {
        let this_section = key.split_once('.').map(|(s, _)| s).unwrap_or("");
        if section.is_some_and(|s| s != this_section) {
            out.push('\n');
        }
        section = Some(this_section);
        let _ = writeln!(out, "{}={}", key, value);
    }
    out.push('\n');
    out
}

fn remove_dir_if_present(path: &Path) {
    if path.is_dir() {
        if let Err(e) = fs::remove_dir_all(path) {
            tracing::warn!(path = %path.display(), error = %e, "could not remove directory");
        }
    }
}

fn remove_files(dir: &Path, keep: impl Fn(&Path) -> bool) -> std::io::Result<()> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(());
    };
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && !keep(&path) {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// `-D`: clears user state according to the letters in `what`.
pub fn reset_user_state(dirs: &UserDirs, what: &str) -> crate::error::Result<()> {
    let all = what.contains('E');
    let has = |c: char| all || what.contains(c);
    let filters = dirs.filters_file();

    if has('A') {
        remove_dir_if_present(&dirs.plugins());
    }
    if has('P') {
        remove_files(dirs.root(), |p| {
            p == filters || p.extension().is_none() || p.extension().is_some_and(|e| e == "zip")
        })?;
        fs::create_dir_all(dirs.root())?;
        fs::write(dirs.root().join(CONFIG_FILE), "")?;
    }
    if has('F') && filters.is_file() {
        fs::remove_file(&filters)?;
    }
    if has('X') {
        let books = dirs.books_file();
        if books.is_file() {
            fs::remove_file(&books)?;
        }
        remove_files(&dirs.report_options_dir(), |_| false)?;
    }
    if has('Z') {
        remove_files(dirs.root(), |p| !p.extension().is_some_and(|e| e == "zip"))?;
    }
    if all {
        remove_dir_if_present(&dirs.thumbnails());
        remove_dir_if_present(&dirs.css());
        remove_dir_if_present(&dirs.cache());
    }
    Ok(())
}
