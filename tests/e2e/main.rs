//! End-to-end scenarios for the `gramps` command line and edit sessions.

mod harness;
mod scenarios;
