use crate::harness::{Assertion, Scenario};
use anyhow::Result;

#[test]
fn test_failed_action_does_not_stop_the_run() -> Result<()> {
    Scenario::new("One good report, one unknown report")
        .with_tree("MyTree", &["Ann", "Bob"])
        .gramps(&[
            "-O",
            "MyTree",
            "-a",
            "report",
            "-p",
            "name=summary,of=@/summary.txt",
            "-a",
            "report",
            "-p",
            "name=bogus_report_name",
        ])
        .assert_success()
        .assert(Assertion::ActionsDone(1))
        .assert(Assertion::ActionsFailed(1))
        .assert_message("Performing action: report.")
        .assert_message("Unknown report name.")
        .assert_message("Available names are:")
        .assert_file_exists("summary.txt")
        .assert_file_contains("summary.txt", "Number of individuals")
        .run()
}

#[test]
fn test_report_without_name_lists_choices() -> Result<()> {
    Scenario::new("Report action without a name")
        .with_tree("MyTree", &["Ann"])
        .gramps(&["-O", "MyTree", "-a", "report"])
        .assert_success()
        .assert(Assertion::ActionsFailed(1))
        .assert_message("Report name not given")
        .assert_message("summary")
        .run()
}

#[test]
fn test_csv_report_output() -> Result<()> {
    Scenario::new("Individuals report in csv")
        .with_tree("MyTree", &["Ann", "Bob"])
        .gramps(&[
            "-O",
            "MyTree",
            "-a",
            "report",
            "-p",
            "name=individuals,off=csv,of=@/people.csv",
        ])
        .assert_success()
        .assert(Assertion::ActionsDone(1))
        .assert_file_contains("people.csv", "Smith")
        .run()
}

#[test]
fn test_check_tool_runs() -> Result<()> {
    Scenario::new("Check and repair")
        .with_tree("MyTree", &["Ann"])
        .gramps(&["-O", "MyTree", "-a", "tool", "-p", "name=check"])
        .assert_success()
        .assert(Assertion::ActionsDone(1))
        .assert_message("Check and Repair: 0 problems were fixed.")
        .run()
}

#[test]
fn test_unknown_tool_option_is_ignored() -> Result<()> {
    Scenario::new("Tool with an unknown option")
        .with_tree("MyTree", &["Ann"])
        .gramps(&["-O", "MyTree", "-a", "tool", "-p", "name=renumber,bogus=1"])
        .assert_success()
        .assert(Assertion::ActionsDone(1))
        .assert_message("Ignoring unknown option: bogus")
        .run()
}

#[test]
fn test_action_without_tree_is_not_run_headless() -> Result<()> {
    Scenario::new("Action with nothing opened")
        .gramps(&["-a", "report", "-p", "name=summary,of=@/summary.txt"])
        .assert_success()
        .assert_file_missing("summary.txt")
        .run()
}
