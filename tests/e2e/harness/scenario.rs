use super::assertions::Assertion;
use super::runner::ScenarioRunner;
use super::steps::{ScenarioStep, WorkspaceFn};
use super::workspace::TestWorkspace;
use anyhow::{Context, Result};

/// Fluent DSL for building test scenarios
pub struct Scenario {
    name: String,
    steps: Vec<ScenarioStep>,
}

impl Scenario {
    /// Create a new scenario with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: Vec::new(),
        }
    }

    // ===== Initial setup =====

    /// Add a file to the workspace
    pub fn with_file(mut self, path: &str, content: &[u8]) -> Self {
        self.steps.push(ScenarioStep::WriteFile {
            path: path.to_string(),
            content: content.to_vec(),
        });
        self
    }

    /// Create a Family Tree holding one Smith per given name
    pub fn with_tree(mut self, title: &str, people: &[&str]) -> Self {
        self.steps.push(ScenarioStep::CreateTree {
            title: title.to_string(),
            people: people.iter().map(|p| p.to_string()).collect(),
        });
        self
    }

    /// Lock a tree as if another process had it open
    pub fn tree_locked_elsewhere(mut self, title: &str) -> Self {
        self.steps.push(ScenarioStep::LockTree {
            title: title.to_string(),
        });
        self
    }

    /// Release locks taken with [`Scenario::tree_locked_elsewhere`]
    pub fn other_process_exits(mut self) -> Self {
        self.steps.push(ScenarioStep::UnlockTrees);
        self
    }

    /// Run library code against the workspace, e.g. an edit session
    pub fn apply(mut self, label: &str, apply: impl Fn(&TestWorkspace) -> Result<()> + 'static) -> Self {
        self.steps.push(ScenarioStep::Apply {
            label: label.to_string(),
            apply: WorkspaceFn(Box::new(apply)),
        });
        self
    }

    // ===== Command line =====

    /// Run `gramps` with `args`, refusing every prompt
    pub fn gramps(mut self, args: &[&str]) -> Self {
        self.steps.push(ScenarioStep::RunGramps {
            args: args.iter().map(|a| a.to_string()).collect(),
            answer_prompts: false,
        });
        self
    }

    /// Run `gramps` with `args`, accepting every prompt
    pub fn gramps_answering_yes(mut self, args: &[&str]) -> Self {
        self.steps.push(ScenarioStep::RunGramps {
            args: args.iter().map(|a| a.to_string()).collect(),
            answer_prompts: true,
        });
        self
    }

    // ===== Assertions =====

    /// Add an assertion
    pub fn assert(mut self, assertion: Assertion) -> Self {
        self.steps.push(ScenarioStep::Assert { assertion });
        self
    }

    /// Assert the exit code of the last run
    pub fn assert_exit_code(self, code: i32) -> Self {
        self.assert(Assertion::ExitCode(code))
    }

    /// Assert the last run succeeded
    pub fn assert_success(self) -> Self {
        self.assert_exit_code(0)
    }

    /// Assert the last run failed
    pub fn assert_failure(self) -> Self {
        self.assert_exit_code(1)
    }

    /// Assert text on standard output
    pub fn assert_stdout_contains(self, text: &str) -> Self {
        self.assert(Assertion::StdoutContains(text.to_string()))
    }

    /// Assert a status, warning or error line
    pub fn assert_message(self, text: &str) -> Self {
        self.assert(Assertion::MessagesContain(text.to_string()))
    }

    /// Assert a workspace file exists
    pub fn assert_file_exists(self, path: &str) -> Self {
        self.assert(Assertion::FileExists(path.to_string()))
    }

    /// Assert a workspace file does not exist
    pub fn assert_file_missing(self, path: &str) -> Self {
        self.assert(Assertion::FileMissing(path.to_string()))
    }

    /// Assert a workspace file contains text
    pub fn assert_file_contains(self, path: &str, content: &str) -> Self {
        self.assert(Assertion::FileContains {
            path: path.to_string(),
            content: content.to_string(),
        })
    }

    /// Assert the number of people in a tree
    pub fn assert_person_count(self, tree: &str, count: u64) -> Self {
        self.assert(Assertion::PersonCount {
            tree: tree.to_string(),
            count,
        })
    }

    // ===== Execution =====

    /// Run the scenario in a fresh workspace
    pub fn run(self) -> Result<()> {
        let workspace = TestWorkspace::empty()?;
        let mut runner = ScenarioRunner::new(workspace);
        runner
            .execute(&self.steps)
            .with_context(|| format!("Scenario '{}' failed at step {}", self.name, runner.current_step()))
    }
}
