use crate::harness::{Scenario, TestWorkspace};
use anyhow::{anyhow, ensure, Result};
use famtree_core::{
    ChildRef, EditSession, EditState, EditorRegistry, FamError, Family, Handle, ObjectKind, Person,
};
use std::cell::RefCell;
use std::rc::Rc;

fn person_handle(db: &famtree_core::FamilyTreeDb, gramps_id: &str) -> Result<Handle> {
    db.handle_for_id(ObjectKind::Person, gramps_id)?
        .ok_or_else(|| anyhow!("no person {}", gramps_id))
}

fn rename_first_person(ws: &TestWorkspace) -> Result<()> {
    let db = ws.edit_tree("MyTree")?;
    let registry = EditorRegistry::new();
    let ann = person_handle(&db, "I0000")?;

    let mut session = EditSession::<Person>::load(db.clone(), &registry, &ann)?;
    let second = EditSession::<Person>::load(db.clone(), &registry, &ann);
    ensure!(
        matches!(second, Err(FamError::EditorActive(_))),
        "a second editor opened on the same person"
    );
    ensure!(registry.focused() == Some(session.key()));

    session.edit(|p| p.primary_name.first_name = "Anna".into())?;
    session.save()?;
    ensure!(session.state() == EditState::Closed);
    ensure!(registry.is_empty());
    db.close()?;
    Ok(())
}

fn add_family(ws: &TestWorkspace) -> Result<()> {
    let db = ws.edit_tree("MyTree")?;
    let registry = EditorRegistry::new();
    let ann = person_handle(&db, "I0000")?;
    let bob = person_handle(&db, "I0001")?;

    let family = Rc::new(RefCell::new(Family {
        mother_handle: Some(ann.clone()),
        child_ref_list: vec![ChildRef::new(bob.clone())],
        ..Default::default()
    }));
    let mut session = EditSession::open(db.clone(), &registry, family.clone())?;
    let handle = session.save()?;
    ensure!(family.borrow().handle.as_ref() == Some(&handle));
    ensure!(db.find_by_handle(ObjectKind::Family, &handle)?);

    let ann = db.get_required::<Person>(&ann)?;
    let bob = db.get_required::<Person>(&bob)?;
    ensure!(ann.family_list.contains(&handle), "mother does not list the family");
    ensure!(
        bob.parent_family_list.contains(&handle),
        "child does not list the family"
    );
    db.close()?;
    Ok(())
}

fn abandon_edits(ws: &TestWorkspace) -> Result<()> {
    let db = ws.edit_tree("MyTree")?;
    let registry = EditorRegistry::new();

    let mut empty = EditSession::open(db.clone(), &registry, Rc::new(RefCell::new(Family::default())))?;
    let err = empty.save().err().ok_or_else(|| anyhow!("empty family was saved"))?;
    ensure!(matches!(err, FamError::EmptyObject { .. }), "unexpected error {}", err);
    ensure!(empty.state() == EditState::Editing);
    empty.cancel()?;

    let ann = person_handle(&db, "I0000")?;
    let live = Rc::new(RefCell::new(db.get_required::<Person>(&ann)?));
    {
        let mut session = EditSession::open(db.clone(), &registry, live.clone())?;
        session.edit(|p| p.primary_name.surname = "Jones".into())?;
        // dropped without saving
    }
    ensure!(live.borrow().primary_name.surname == "Smith");
    ensure!(db.get_required::<Person>(&ann)?.primary_name.surname == "Smith");
    ensure!(db.count(ObjectKind::Family)? == 0);
    ensure!(registry.is_empty());
    db.close()?;
    Ok(())
}

fn add_person_with_taken_id(ws: &TestWorkspace) -> Result<()> {
    let db = ws.edit_tree("MyTree")?;
    let registry = EditorRegistry::new();
    let person = Rc::new(RefCell::new(Person {
        gramps_id: "I0001".into(),
        primary_name: famtree_core::Name::new("Cid", "Smith"),
        ..Default::default()
    }));
    let mut session = EditSession::open(db.clone(), &registry, person.clone())?;
    let err = session.save().err().ok_or_else(|| anyhow!("duplicate ID was saved"))?;
    ensure!(matches!(err, FamError::DuplicateId { .. }), "unexpected error {}", err);
    ensure!(session.last_error().is_some());

    session.edit(|p| p.gramps_id.clear())?;
    session.save()?;
    ensure!(person.borrow().gramps_id == "I0002");
    db.close()?;
    Ok(())
}

#[test]
fn test_saved_edit_is_seen_by_next_run() -> Result<()> {
    Scenario::new("Rename a person, then report")
        .with_tree("MyTree", &["Ann", "Bob"])
        .apply("rename", rename_first_person)
        .gramps(&[
            "-O",
            "MyTree",
            "-a",
            "report",
            "-p",
            "name=individuals,of=@/people.txt",
        ])
        .assert_success()
        .assert_file_contains("people.txt", "Anna")
        .run()
}

#[test]
fn test_family_editor_keeps_back_references_consistent() -> Result<()> {
    Scenario::new("Add a family, then check the tree")
        .with_tree("MyTree", &["Ann", "Bob"])
        .apply("add family", add_family)
        .gramps(&["-O", "MyTree", "-a", "tool", "-p", "name=check"])
        .assert_success()
        .assert_message("Check and Repair: 0 problems were fixed.")
        .run()
}

#[test]
fn test_abandoned_edits_leave_tree_untouched() -> Result<()> {
    Scenario::new("Cancel and drop editors")
        .with_tree("MyTree", &["Ann"])
        .apply("abandon", abandon_edits)
        .gramps(&["-L"])
        .assert_success()
        .assert_stdout_contains("Number of families: 0")
        .assert_stdout_contains("Number of people: 1")
        .run()
}

#[test]
fn test_taken_id_is_rejected_until_changed() -> Result<()> {
    Scenario::new("New person reusing an ID")
        .with_tree("MyTree", &["Ann", "Bob"])
        .apply("add person", add_person_with_taken_id)
        .assert_person_count("MyTree", 3)
        .run()
}
