//! Gramps command line: manage, import, export and report on Family Trees.

use anyhow::{Context, Result};
use console::style;
use famtree_core::{
    parse_args, render_config, resolve, ArgHandler, CliContext, Config, EarlyExit, FamError, PluginRegistry,
    SessionState, UserDirs,
};
use std::io;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod terminal;

use terminal::TerminalUser;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", style("error:").red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

/// `-d gramps.gen.db` becomes the directive `gramps::gen::db=debug`.
fn debug_directive(name: &str) -> String {
    format!("{}=debug", name.replace('.', "::"))
}

fn init_logging(debug: &[String]) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    for name in debug {
        match debug_directive(name).parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring debug logger '{}': {}", name, e),
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn version_text(config: &Config) -> String {
    format!(
        "Gramps Settings:\n----------------\n gramps    : {}\n backend   : {}\n os        : {}\n",
        env!("CARGO_PKG_VERSION"),
        config.get_str("database.backend"),
        std::env::consts::OS,
    )
}

fn report_error(user: &TerminalUser, err: &FamError) {
    use famtree_core::User;

    let detail = match err.recovery_suggestion() {
        Some(hint) => format!("{}\n{}", err, hint),
        None => err.to_string(),
    };
    match err {
        FamError::OptionSyntax { summary, detail } => user.notify_error(summary, detail),
        // already shown to the user by the dispatcher
        FamError::HandlerNotFound { .. } | FamError::Declined(_) => {}
        _ => user.notify_error("Error", &detail),
    }
}

fn run() -> Result<ExitCode> {
    let dirs = UserDirs::from_env();
    let mut config = Config::load(&dirs).context("Failed to load settings")?;
    let request = parse_args(std::env::args().skip(1), &mut config, &dirs);
    init_logging(&request.debug);

    for notice in &request.notices {
        eprintln!("{}", notice);
    }
    if !request.load_modules.is_empty() {
        tracing::warn!(modules = ?request.load_modules, "external plugin modules are not supported; ignoring");
    }

    match request.early_exit {
        Some(EarlyExit::ShowConfig) => {
            print!("{}", render_config(&config));
            return Ok(ExitCode::SUCCESS);
        }
        Some(EarlyExit::Version) => {
            print!("{}", version_text(&config));
            return Ok(ExitCode::SUCCESS);
        }
        Some(EarlyExit::ConfigShown) | Some(EarlyExit::DefaultsReset) => {
            if request.config_changed {
                config.save().context("Failed to save settings")?;
            }
            return Ok(ExitCode::SUCCESS);
        }
        None => {}
    }

    let user = TerminalUser::new(request.auto_accept, request.quiet);
    if request.safe_mode {
        eprintln!("Running in safe mode: using default settings.");
        config = Config::with_defaults(Some(&dirs.grampsdb()));
    } else if request.config_changed {
        config.save().context("Failed to save settings")?;
    }

    let registry = PluginRegistry::with_builtins();
    let ctx = CliContext {
        config: &config,
        dirs: &dirs,
        registry: &registry,
        user: &user,
    };
    let arbitration = resolve(request);
    let mut state = SessionState::new();

    let mut handler = match ArgHandler::new(ctx, &mut state, arbitration.request, arbitration.gui) {
        Ok(handler) => handler,
        Err(err) => {
            report_error(&user, &err);
            return Ok(ExitCode::FAILURE);
        }
    };

    if arbitration.gui {
        let prepared = handler.handle_args_gui();
        let cleanup = handler.cleanup();
        return match cleanup.and(prepared) {
            Ok(Some(tree)) => {
                eprintln!(
                    "Family Tree ready at {}. No interactive interface is available in this build.",
                    tree.display()
                );
                Ok(ExitCode::SUCCESS)
            }
            Ok(None) => {
                eprintln!("No interactive interface is available in this build.");
                eprintln!("Type gramps --help for an overview of commands.");
                Ok(ExitCode::SUCCESS)
            }
            Err(err) => {
                report_error(&user, &err);
                Ok(ExitCode::FAILURE)
            }
        };
    }

    let mut stdout = io::stdout().lock();
    match handler.handle_args_cli(&mut stdout) {
        Ok(summary) => {
            tracing::info!(
                imported = summary.imported,
                actions = summary.actions_done,
                failed = summary.actions_failed.len(),
                exported = summary.exported,
                "run finished"
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            report_error(&user, &err);
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_logger_names_map_to_targets() {
        assert_eq!(debug_directive("famtree_core"), "famtree_core=debug");
        assert_eq!(debug_directive("famtree_core.dispatcher"), "famtree_core::dispatcher=debug");
    }
}
