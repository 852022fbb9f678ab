//! Terminal implementation of the user-interaction collaborator.

use console::style;
use famtree_core::User;
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::RefCell;
use std::io::{self, BufRead, Write};

/// Talks to the user on stderr and reads answers from stdin.
///
/// With `-y` every prompt is accepted without asking; with `-q` status
/// lines and progress bars are suppressed. Errors are always shown.
pub struct TerminalUser {
    auto_accept: bool,
    quiet: bool,
    progress: RefCell<Option<ProgressBar>>,
}

impl TerminalUser {
    pub fn new(auto_accept: bool, quiet: bool) -> Self {
        Self {
            auto_accept,
            quiet,
            progress: RefCell::new(None),
        }
    }

    fn read_answer(&self) -> Option<String> {
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_lowercase()),
        }
    }
}

impl User for TerminalUser {
    fn prompt(&self, title: &str, message: &str, accept_label: &str, reject_label: &str) -> bool {
        if self.auto_accept {
            if !self.quiet {
                eprintln!("{} {}", style(title).bold(), message);
            }
            return true;
        }
        eprint!(
            "{}\n{} ({}/{}) ",
            style(title).bold(),
            message,
            accept_label,
            reject_label
        );
        let _ = io::stderr().flush();
        match self.read_answer() {
            Some(answer) => {
                answer == "y" || answer == "yes" || answer == accept_label.to_lowercase()
            }
            None => false,
        }
    }

    fn info(&self, message: &str) {
        if !self.quiet {
            eprintln!("{}", message);
        }
    }

    fn warn(&self, title: &str, detail: &str) {
        if !self.quiet {
            eprintln!("{} {}", style(title).yellow().bold(), detail);
        }
    }

    fn notify_error(&self, title: &str, detail: &str) {
        eprintln!("{}", style(title).red().bold());
        if !detail.is_empty() {
            eprintln!("{}", detail);
        }
    }

    fn begin_progress(&self, title: &str, message: &str, steps: u64) {
        if self.quiet {
            return;
        }
        let bar = ProgressBar::new(steps);
        if let Ok(bar_style) = ProgressStyle::default_bar().template("{msg} [{bar:30.green}] {pos}/{len}") {
            bar.set_style(bar_style);
        }
        bar.set_message(format!("{}: {}", title, message));
        *self.progress.borrow_mut() = Some(bar);
    }

    fn step_progress(&self) {
        if let Some(bar) = self.progress.borrow().as_ref() {
            bar.inc(1);
        }
    }

    fn end_progress(&self) {
        if let Some(bar) = self.progress.borrow_mut().take() {
            bar.finish_and_clear();
        }
    }
}
