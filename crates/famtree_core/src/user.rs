//! User-interaction collaborator.
//!
//! Everything that needs a decision or shows a status line goes through
//! [`User`], so that the same dispatcher runs in a terminal and in tests.

use std::cell::RefCell;

/// Confirmation prompts, status lines and progress.
pub trait User {
    /// Asks a yes/no question. Returns true to proceed.
    fn prompt(&self, title: &str, message: &str, accept_label: &str, reject_label: &str) -> bool;

    /// A status line ("Opened successfully!").
    fn info(&self, message: &str);

    /// A non-fatal problem.
    fn warn(&self, title: &str, detail: &str);

    /// A failure the user must see.
    fn notify_error(&self, title: &str, detail: &str);

    /// Starts a progress display of `steps` units.
    fn begin_progress(&self, _title: &str, _message: &str, _steps: u64) {}

    /// Advances the progress display by one unit.
    fn step_progress(&self) {}

    /// Removes the progress display.
    fn end_progress(&self) {}
}

/// A [`User`] that answers every prompt the same way and keeps all output.
///
/// Used for batch runs driven by other code and in tests.
#[derive(Debug, Default)]
pub struct RecordingUser {
    accept: bool,
    lines: RefCell<Vec<String>>,
    prompts: RefCell<Vec<String>>,
}

impl RecordingUser {
    /// Answers `accept` to every prompt.
    pub fn new(accept: bool) -> Self {
        Self {
            accept,
            ..Default::default()
        }
    }

    /// Every status, warning and error line, in order.
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    /// All output joined with newlines.
    pub fn text(&self) -> String {
        self.lines.borrow().join("\n")
    }

    /// Titles of the prompts that were asked.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    fn record(&self, text: &str) {
        self.lines
            .borrow_mut()
            .extend(text.lines().map(str::to_string));
    }
}

impl User for RecordingUser {
    fn prompt(&self, title: &str, message: &str, _accept_label: &str, _reject_label: &str) -> bool {
        self.prompts.borrow_mut().push(title.to_string());
        self.record(message);
        self.accept
    }

    fn info(&self, message: &str) {
        self.record(message);
    }

    fn warn(&self, title: &str, detail: &str) {
        self.record(title);
        self.record(detail);
    }

    fn notify_error(&self, title: &str, detail: &str) {
        self.record(title);
        self.record(detail);
    }
}
