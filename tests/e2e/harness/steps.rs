use super::assertions::Assertion;
use super::workspace::TestWorkspace;
use anyhow::Result;

/// Library work run against the workspace between invocations.
pub struct WorkspaceFn(pub Box<dyn Fn(&TestWorkspace) -> Result<()>>);

impl std::fmt::Debug for WorkspaceFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<fn>")
    }
}

/// All possible actions in a test scenario
#[derive(Debug)]
pub enum ScenarioStep {
    // Setup
    WriteFile {
        path: String,
        content: Vec<u8>,
    },
    CreateTree {
        title: String,
        people: Vec<String>,
    },
    /// Another process holds the lock of the tree.
    LockTree {
        title: String,
    },
    UnlockTrees,

    /// Edits made through the library, as an interactive front-end would.
    Apply {
        label: String,
        apply: WorkspaceFn,
    },

    /// One invocation of the command line. `@/` in an argument stands for
    /// the workspace directory.
    RunGramps {
        args: Vec<String>,
        answer_prompts: bool,
    },

    // Assertions (can be interspersed)
    Assert {
        assertion: Assertion,
    },
}
