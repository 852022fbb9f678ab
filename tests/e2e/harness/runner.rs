use super::assertions::Assertion;
use super::steps::ScenarioStep;
use super::workspace::TestWorkspace;
use anyhow::{anyhow, bail, Context, Result};
use famtree_core::{
    parse_args, render_config, resolve, ArgHandler, CliContext, EarlyExit, ObjectKind, PluginRegistry,
    RecordingUser, RunSummary, SessionState, TreeLock, User,
};

/// What one command-line invocation produced.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub messages: String,
    pub prompts: Vec<String>,
    pub summary: Option<RunSummary>,
}

/// Executes scenarios against the real dispatcher
pub struct ScenarioRunner {
    workspace: TestWorkspace,
    locks: Vec<TreeLock>,
    last: Option<RunOutcome>,
    current_step: usize,
}

impl ScenarioRunner {
    pub fn new(workspace: TestWorkspace) -> Self {
        Self {
            workspace,
            locks: Vec::new(),
            last: None,
            current_step: 0,
        }
    }

    /// Get current step number
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Execute all steps in sequence
    pub fn execute(&mut self, steps: &[ScenarioStep]) -> Result<()> {
        for (i, step) in steps.iter().enumerate() {
            self.current_step = i;
            self.execute_step(step)
                .with_context(|| format!("Step {}: {:?}", i, step))?;
        }
        Ok(())
    }

    fn execute_step(&mut self, step: &ScenarioStep) -> Result<()> {
        match step {
            ScenarioStep::WriteFile { path, content } => self.workspace.write_file(path, content),
            ScenarioStep::CreateTree { title, people } => {
                let people: Vec<&str> = people.iter().map(String::as_str).collect();
                self.workspace.create_tree(title, &people).map(|_| ())
            }
            ScenarioStep::LockTree { title } => {
                let dir = self.workspace.tree_path(title)?;
                self.locks.push(TreeLock::acquire(&dir)?);
                Ok(())
            }
            ScenarioStep::UnlockTrees => {
                self.locks.clear();
                Ok(())
            }
            ScenarioStep::Apply { apply, .. } => (apply.0)(&self.workspace),
            ScenarioStep::RunGramps { args, answer_prompts } => {
                let outcome = self.run_gramps(args, *answer_prompts)?;
                self.last = Some(outcome);
                Ok(())
            }
            ScenarioStep::Assert { assertion } => self.check(assertion),
        }
    }

    /// Runs one invocation the way the binary does, capturing its output.
    fn run_gramps(&self, args: &[String], answer_prompts: bool) -> Result<RunOutcome> {
        let dirs = self.workspace.dirs();
        let mut config = self.workspace.config()?;
        let args: Vec<String> = args.iter().map(|a| self.workspace.expand(a)).collect();
        let request = parse_args(args, &mut config, &dirs);

        let mut outcome = RunOutcome::default();
        match request.early_exit {
            Some(EarlyExit::ShowConfig) => {
                outcome.stdout = render_config(&config);
                return Ok(outcome);
            }
            Some(_) => {
                if request.config_changed {
                    config.save()?;
                }
                return Ok(outcome);
            }
            None => {}
        }
        if request.config_changed && !request.safe_mode {
            config.save()?;
        }

        let user = RecordingUser::new(answer_prompts || request.auto_accept);
        let registry = PluginRegistry::with_builtins();
        let ctx = CliContext {
            config: &config,
            dirs: &dirs,
            registry: &registry,
            user: &user,
        };
        let arbitration = resolve(request);
        let mut state = SessionState::new();
        let mut stdout = Vec::new();

        let result = match ArgHandler::new(ctx, &mut state, arbitration.request, arbitration.gui) {
            Err(e) => Err(e),
            Ok(mut handler) if arbitration.gui => {
                let prepared = handler.handle_args_gui();
                handler.cleanup().and(prepared).map(|_| None)
            }
            Ok(mut handler) => handler.handle_args_cli(&mut stdout).map(Some),
        };
        match result {
            Ok(summary) => outcome.summary = summary,
            Err(e) => {
                user.notify_error("Error", &e.to_string());
                outcome.exit_code = 1;
            }
        }
        outcome.stdout = String::from_utf8_lossy(&stdout).into_owned();
        outcome.messages = user.text();
        outcome.prompts = user.prompts();
        Ok(outcome)
    }

    fn last(&self) -> Result<&RunOutcome> {
        self.last.as_ref().ok_or_else(|| anyhow!("gramps has not been run yet"))
    }

    fn summary(&self) -> Result<&RunSummary> {
        self.last()?
            .summary
            .as_ref()
            .ok_or_else(|| anyhow!("last run produced no summary"))
    }

    fn check(&self, assertion: &Assertion) -> Result<()> {
        match assertion {
            Assertion::ExitCode(expected) => {
                let last = self.last()?;
                if last.exit_code != *expected {
                    bail!(
                        "Expected exit code {}, got {}\nmessages:\n{}",
                        expected,
                        last.exit_code,
                        last.messages
                    );
                }
            }
            Assertion::StdoutContains(text) => {
                let stdout = &self.last()?.stdout;
                if !stdout.contains(text.as_str()) {
                    bail!("Expected stdout to contain {:?}, got:\n{}", text, stdout);
                }
            }
            Assertion::MessagesContain(text) => {
                let messages = &self.last()?.messages;
                if !messages.contains(text.as_str()) {
                    bail!("Expected messages to contain {:?}, got:\n{}", text, messages);
                }
            }
            Assertion::PromptAsked(title) => {
                if !self.last()?.prompts.contains(title) {
                    bail!("Expected prompt {:?} to be asked", title);
                }
            }
            Assertion::FileExists(path) => {
                if !self.workspace.file_exists(path) {
                    bail!("Expected file {} to exist", path);
                }
            }
            Assertion::FileMissing(path) => {
                if self.workspace.file_exists(path) {
                    bail!("Expected file {} to be absent", path);
                }
            }
            Assertion::FileContains { path, content } => {
                let text = self.workspace.read_to_string(path)?;
                if !text.contains(content.as_str()) {
                    bail!("Expected {} to contain {:?}, got:\n{}", path, content, text);
                }
            }
            Assertion::TreeExists(title) => {
                self.workspace.tree_path(title)?;
            }
            Assertion::TreeMissing(title) => {
                if self.workspace.tree_path(title).is_ok() {
                    bail!("Expected tree '{}' to be gone", title);
                }
            }
            Assertion::PersonCount { tree, count } => {
                let db = self.workspace.open_tree(tree)?;
                let actual = db.count(ObjectKind::Person)?;
                if actual != *count {
                    bail!("Expected {} people in '{}', found {}", count, tree, actual);
                }
            }
            Assertion::ActionsDone(n) => {
                let done = self.summary()?.actions_done;
                if done != *n {
                    bail!("Expected {} actions done, got {}", n, done);
                }
            }
            Assertion::ActionsFailed(n) => {
                let failed = &self.summary()?.actions_failed;
                if failed.len() != *n {
                    bail!("Expected {} failed actions, got {:?}", n, failed);
                }
            }
            Assertion::Imported(n) => {
                let imported = self.summary()?.imported;
                if imported != *n {
                    bail!("Expected {} imports, got {}", n, imported);
                }
            }
            Assertion::Exported(n) => {
                let exported = self.summary()?.exported;
                if exported != *n {
                    bail!("Expected {} exports, got {}", n, exported);
                }
            }
            Assertion::TransientTreeRemoved => {
                let opened = self
                    .summary()?
                    .opened
                    .as_ref()
                    .ok_or_else(|| anyhow!("no tree was opened"))?;
                if opened.exists() {
                    bail!("Temporary tree {} was not removed", opened.display());
                }
            }
            Assertion::Custom(f) => f(&self.workspace)?,
        }
        Ok(())
    }
}
