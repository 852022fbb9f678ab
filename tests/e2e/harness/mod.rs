//! E2E test harness for famtree.
//!
//! Builders and assertions are shared by all scenario files; not every
//! variant is used by every file.

#![allow(dead_code)]

pub mod assertions;
pub mod runner;
pub mod scenario;
pub mod steps;
pub mod workspace;

pub use assertions::Assertion;
pub use scenario::Scenario;
pub use workspace::TestWorkspace;
