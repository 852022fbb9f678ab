use crate::harness::{Assertion, Scenario};
use anyhow::Result;

#[test]
fn test_list_shows_locked_tree() -> Result<()> {
    Scenario::new("Listing does not need the lock")
        .with_tree("MyTree", &["Ann"])
        .tree_locked_elsewhere("MyTree")
        .gramps(&["-l"])
        .assert_success()
        .assert_stdout_contains("List of known Family Trees in your database path")
        .assert_stdout_contains("with name \"MyTree\"")
        .gramps(&["-L"])
        .assert_success()
        .assert_stdout_contains("Family Tree \"MyTree\":")
        .assert_stdout_contains("locked by")
        .assert_stdout_contains("Number of people: 1")
        .run()
}

#[test]
fn test_open_locked_tree_fails_until_released() -> Result<()> {
    Scenario::new("Open a tree another process holds")
        .with_tree("MyTree", &["Ann"])
        .tree_locked_elsewhere("MyTree")
        .gramps(&["-O", "MyTree", "-a", "tool", "-p", "name=check"])
        .assert_failure()
        .other_process_exits()
        .gramps(&["-O", "MyTree", "-a", "tool", "-p", "name=check"])
        .assert_success()
        .assert(Assertion::ActionsDone(1))
        .run()
}

#[test]
fn test_list_patterns_filter_trees() -> Result<()> {
    Scenario::new("Listing with name patterns")
        .with_tree("Smiths", &["Ann"])
        .with_tree("Jones", &["Bob"])
        .gramps(&["-l", "Smi.*"])
        .assert_success()
        .assert_stdout_contains("\"Smiths\"")
        .gramps(&["-t"])
        .assert_success()
        .assert_stdout_contains("\"Jones\"")
        .assert_stdout_contains("\"Smiths\"")
        .run()
}

#[test]
fn test_create_refuses_existing_tree() -> Result<()> {
    Scenario::new("-C on a tree that exists")
        .with_tree("MyTree", &["Ann"])
        .gramps(&["-C", "MyTree", "-e", "@/out.gramps"])
        .assert_failure()
        .assert_message("already exists")
        .assert_file_missing("out.gramps")
        .assert_person_count("MyTree", 1)
        .run()
}

#[test]
fn test_create_makes_new_tree() -> Result<()> {
    Scenario::new("-C with a fresh name")
        .gramps(&["-O", "Fresh", "-C", "Fresh", "-a", "tool", "-p", "name=check"])
        .assert_success()
        .assert(Assertion::ActionsDone(1))
        .assert(Assertion::TreeExists("Fresh".into()))
        .assert_person_count("Fresh", 0)
        .run()
}

#[test]
fn test_open_unknown_tree_fails() -> Result<()> {
    Scenario::new("-O on a name nobody created")
        .gramps(&["-O", "Nowhere", "-a", "tool", "-p", "name=check"])
        .assert_failure()
        .run()
}

#[test]
fn test_remove_asks_first() -> Result<()> {
    Scenario::new("Remove a tree")
        .with_tree("MyTree", &["Ann"])
        .gramps(&["-r", "MyTree"])
        .assert_success()
        .assert(Assertion::PromptAsked("Remove Family Tree warning".into()))
        .assert(Assertion::TreeExists("MyTree".into()))
        .gramps_answering_yes(&["-r", "MyTree"])
        .assert_success()
        .assert(Assertion::TreeMissing("MyTree".into()))
        .run()
}

#[test]
fn test_bad_arguments_fail() -> Result<()> {
    Scenario::new("Unknown flag")
        .gramps(&["--definitely-not-a-flag"])
        .assert_failure()
        .run()
}

#[test]
fn test_help_goes_to_stdout() -> Result<()> {
    Scenario::new("Help")
        .gramps(&["-h"])
        .assert_success()
        .assert_stdout_contains("--yes")
        .run()
}
