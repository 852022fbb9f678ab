use crate::harness::{Assertion, Scenario};
use anyhow::Result;

const SMALL_GEDCOM: &[u8] = b"0 HEAD
1 CHAR UTF-8
0 @I1@ INDI
1 NAME John /Smith/
1 SEX M
0 @I2@ INDI
1 NAME Mary /Jones/
1 SEX F
0 @F1@ FAM
1 HUSB @I1@
1 WIFE @I2@
0 TRLR
";

#[test]
fn test_import_into_transient_tree_and_export() -> Result<()> {
    Scenario::new("Import two files, export one, leave no tree behind")
        .with_file("a.ged", SMALL_GEDCOM)
        .with_tree("Source", &["Ann", "Bob"])
        .gramps(&["-O", "Source", "-e", "@/b.gpkg"])
        .assert_success()
        .assert(Assertion::Exported(1))
        .assert_file_exists("b.gpkg")
        .gramps(&["-i", "@/a.ged", "-i", "@/b.gpkg", "-e", "@/out.gramps", "-f", "gramps"])
        .assert_success()
        .assert(Assertion::Imported(2))
        .assert(Assertion::Exported(1))
        .assert(Assertion::TransientTreeRemoved)
        .assert_message("Created empty Family Tree successfully")
        .assert_message("Cleaning up.")
        .assert_file_contains("out.gramps", "John")
        .assert_file_contains("out.gramps", "Mary")
        .assert_file_contains("out.gramps", "Ann")
        .run()
}

#[test]
fn test_missing_import_file_is_fatal() -> Result<()> {
    Scenario::new("Import file that does not exist")
        .gramps(&["-i", "@/nowhere.ged", "-e", "@/out.gramps"])
        .assert_failure()
        .assert_message("Import file")
        .assert_file_missing("out.gramps")
        .run()
}

#[test]
fn test_unknown_import_format_is_fatal() -> Result<()> {
    Scenario::new("Import file with an unknown extension")
        .with_file("data.xyz", b"whatever")
        .gramps(&["-i", "@/data.xyz"])
        .assert_failure()
        .assert_message("Unrecognized type")
        .run()
}

#[test]
fn test_export_overwrite_declined_then_accepted() -> Result<()> {
    Scenario::new("Export over an existing file")
        .with_tree("MyTree", &["Ann"])
        .with_file("out.ged", b"old content")
        .gramps(&["-O", "MyTree", "-e", "@/out.ged"])
        .assert_failure()
        .assert(Assertion::PromptAsked("OK to overwrite?".into()))
        .assert_file_contains("out.ged", "old content")
        .gramps_answering_yes(&["-O", "MyTree", "-e", "@/out.ged"])
        .assert_success()
        .assert_message("Will overwrite the existing file")
        .assert_file_contains("out.ged", "0 HEAD")
        .assert_file_contains("out.ged", "Ann")
        .run()
}

#[test]
fn test_yes_flag_accepts_overwrite() -> Result<()> {
    Scenario::new("Export with --yes over an existing file")
        .with_tree("MyTree", &["Ann"])
        .with_file("out.gramps", b"{}")
        .gramps(&["-y", "-O", "MyTree", "-e", "@/out.gramps"])
        .assert_success()
        .assert(Assertion::Exported(1))
        .assert_file_contains("out.gramps", "Ann")
        .run()
}

#[test]
fn test_import_into_opened_tree_keeps_it() -> Result<()> {
    // Nothing headless to do, so this takes the interactive path.
    Scenario::new("Import into an existing tree")
        .with_file("a.ged", SMALL_GEDCOM)
        .with_tree("MyTree", &["Ann"])
        .gramps(&["-O", "MyTree", "-i", "@/a.ged"])
        .assert_success()
        .assert_message("Opened successfully!")
        .assert_person_count("MyTree", 3)
        .run()
}
