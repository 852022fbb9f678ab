use super::workspace::TestWorkspace;
use anyhow::Result;

/// Declarative assertions on the outcome of the last run
pub enum Assertion {
    // Process
    ExitCode(i32),
    StdoutContains(String),
    MessagesContain(String),
    PromptAsked(String),

    // Files
    FileExists(String),
    FileMissing(String),
    FileContains { path: String, content: String },

    // Trees
    TreeExists(String),
    TreeMissing(String),
    PersonCount { tree: String, count: u64 },

    // Dispatcher summary
    ActionsDone(usize),
    ActionsFailed(usize),
    Imported(usize),
    Exported(usize),
    TransientTreeRemoved,

    // Custom
    Custom(Box<dyn Fn(&TestWorkspace) -> Result<()>>),
}

impl std::fmt::Debug for Assertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExitCode(n) => write!(f, "ExitCode({})", n),
            Self::StdoutContains(s) => write!(f, "StdoutContains({:?})", s),
            Self::MessagesContain(s) => write!(f, "MessagesContain({:?})", s),
            Self::PromptAsked(s) => write!(f, "PromptAsked({:?})", s),
            Self::FileExists(p) => write!(f, "FileExists({:?})", p),
            Self::FileMissing(p) => write!(f, "FileMissing({:?})", p),
            Self::FileContains { path, content } => {
                write!(f, "FileContains {{ path: {:?}, content: {:?} }}", path, content)
            }
            Self::TreeExists(t) => write!(f, "TreeExists({:?})", t),
            Self::TreeMissing(t) => write!(f, "TreeMissing({:?})", t),
            Self::PersonCount { tree, count } => {
                write!(f, "PersonCount {{ tree: {:?}, count: {} }}", tree, count)
            }
            Self::ActionsDone(n) => write!(f, "ActionsDone({})", n),
            Self::ActionsFailed(n) => write!(f, "ActionsFailed({})", n),
            Self::Imported(n) => write!(f, "Imported({})", n),
            Self::Exported(n) => write!(f, "Exported({})", n),
            Self::TransientTreeRemoved => write!(f, "TransientTreeRemoved"),
            Self::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}
