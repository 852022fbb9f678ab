//! Built-in tools: integrity check and Gramps-ID renumbering.

use super::{OptionSpec, PluginDescriptor, ToolPlugin};
use crate::db::{format_gramps_id, FamilyTreeDb, Transaction};
use crate::error::Result;
use crate::objects::{
    Citation, Event, Family, Media, Note, ObjectKind, Person, Place, PrimaryObject, Repository,
    Source,
};
use crate::options::split_options;
use crate::user::User;
use crate::Handle;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// Runs `tool` with a raw `-p` options string.
///
/// Unknown options are warned about and dropped; `show=all` lists the
/// tool's options instead of running it.
pub fn run_tool(tool: &dyn ToolPlugin, db: &FamilyTreeDb, options_str: &str, user: &dyn User) -> Result<()> {
    let specs = tool.options();
    let mut given = split_options(options_str);
    given.remove("name");
    if given.remove("show").is_some() {
        let mut text = String::from("   Available options:");
        for spec in &specs {
            text.push_str(&format!("\n   {:<20}{}", spec.name, spec.help.0));
        }
        if specs.is_empty() {
            text.push_str("\n   (none)");
        }
        user.info(&text);
        return Ok(());
    }
    let known: BTreeSet<&str> = specs.iter().map(|s| s.name).collect();
    let mut options: BTreeMap<String, String> = specs
        .iter()
        .map(|s| (s.name.to_string(), s.default.clone()))
        .collect();
    for (name, value) in given {
        if known.contains(name.as_str()) {
            options.insert(name, value);
        } else {
            user.warn("Ignoring unknown option", &format!("Ignoring unknown option: {}", name));
        }
    }
    let message = tool.run(db, &options, user)?;
    info!(tool = tool.descriptor().id, result = %message, "tool finished");
    user.info(&message);
    Ok(())
}

/// Repairs back-references between families and people.
///
/// A family's parents must list it in their families, its children in
/// their parent families, and the reverse. References to objects that do
/// not exist are dropped, and families left with nobody in them are removed.
#[derive(Debug, Clone)]
pub struct CheckTool {
    descriptor: PluginDescriptor,
}

impl CheckTool {
    /// `check`.
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor {
                id: "check",
                name: "Check and Repair Database",
                description: "Checks the database for integrity problems, fixing the problems that it can",
                extension: "",
            },
        }
    }
}

impl Default for CheckTool {
    fn default() -> Self {
        Self::new()
    }
}

fn keyed<T: PrimaryObject>(objects: Vec<T>) -> BTreeMap<Handle, T> {
    objects
        .into_iter()
        .filter_map(|o| o.handle().cloned().map(|h| (h, o)))
        .collect()
}

/// Drops event references whose event is gone, keeping birth and death indexes valid.
fn prune_event_refs(person: &mut Person, events: &BTreeSet<Handle>) -> usize {
    let mut removed = 0;
    let mut index = 0;
    while index < person.event_ref_list.len() {
        if events.contains(&person.event_ref_list[index].event) {
            index += 1;
            continue;
        }
        person.event_ref_list.remove(index);
        removed += 1;
        for slot in [&mut person.birth_ref_index, &mut person.death_ref_index] {
            *slot = match *slot {
                Some(i) if i == index => None,
                Some(i) if i > index => Some(i - 1),
                other => other,
            };
        }
    }
    removed
}

impl ToolPlugin for CheckTool {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn run(&self, db: &FamilyTreeDb, _options: &BTreeMap<String, String>, user: &dyn User) -> Result<String> {
        let mut people = keyed(db.iter::<Person>()?);
        let mut families = keyed(db.iter::<Family>()?);
        let events: BTreeSet<Handle> = db.handles(ObjectKind::Event)?.into_iter().collect();
        let mut dirty_people = BTreeSet::new();
        let mut dirty_families = BTreeSet::new();
        let mut fixes = 0usize;

        user.begin_progress("Check", "Checking families", families.len() as u64);
        for (fh, family) in families.iter_mut() {
            for slot in [&mut family.father_handle, &mut family.mother_handle] {
                let Some(parent) = slot.clone() else { continue };
                match people.get_mut(&parent) {
                    Some(person) => {
                        if person.add_family_handle(fh) {
                            dirty_people.insert(parent);
                            fixes += 1;
                        }
                    }
                    None => {
                        debug!(family = %fh, parent = %parent, "dropping missing parent");
                        *slot = None;
                        dirty_families.insert(fh.clone());
                        fixes += 1;
                    }
                }
            }
            let before = family.child_ref_list.len();
            family.child_ref_list.retain(|r| people.contains_key(&r.child));
            if family.child_ref_list.len() != before {
                fixes += before - family.child_ref_list.len();
                dirty_families.insert(fh.clone());
            }
            for child in family.children() {
                if let Some(person) = people.get_mut(child) {
                    if person.add_parent_family_handle(fh) {
                        dirty_people.insert(child.clone());
                        fixes += 1;
                    }
                }
            }
            user.step_progress();
        }
        user.end_progress();

        let empty: Vec<Handle> = families
            .iter()
            .filter(|(_, f)| f.is_empty())
            .map(|(h, _)| h.clone())
            .collect();
        for handle in &empty {
            families.remove(handle);
            dirty_families.remove(handle);
            fixes += 1;
        }

        for (ph, person) in people.iter_mut() {
            let before = person.family_list.len() + person.parent_family_list.len();
            person.family_list.retain(|f| {
                families
                    .get(f)
                    .is_some_and(|fam| fam.parents().any(|p| p == ph))
            });
            person.parent_family_list.retain(|f| {
                families
                    .get(f)
                    .is_some_and(|fam| fam.children().any(|c| c == ph))
            });
            let mut removed = before - person.family_list.len() - person.parent_family_list.len();
            removed += prune_event_refs(person, &events);
            if removed > 0 {
                fixes += removed;
                dirty_people.insert(ph.clone());
            }
        }

        if fixes == 0 {
            return Ok("No errors were found: the database has passed internal checks.".into());
        }
        let mut txn = Transaction::new("Check Integrity");
        for handle in &dirty_people {
            if let Some(person) = people.get(handle) {
                txn.put(person)?;
            }
        }
        for handle in &dirty_families {
            if let Some(family) = families.get(handle) {
                txn.put(family)?;
            }
        }
        for handle in &empty {
            txn.remove(ObjectKind::Family, handle);
        }
        db.commit(txn)?;
        Ok(format!("Check and Repair: {} problems were fixed.", fixes))
    }
}

/// Rewrites every Gramps ID from the configured templates, in current ID order.
#[derive(Debug, Clone)]
pub struct RenumberTool {
    descriptor: PluginDescriptor,
}

impl RenumberTool {
    /// `renumber`.
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor {
                id: "renumber",
                name: "Reorder Gramps IDs",
                description: "Reorders the Gramps IDs according to the configured templates",
                extension: "",
            },
        }
    }
}

impl Default for RenumberTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Stages new IDs for one kind. IDs first move to unique temporaries so
/// that swaps never collide inside the transaction.
fn renumber<T: PrimaryObject>(db: &FamilyTreeDb, txn: &mut Transaction) -> Result<usize> {
    let template = db.id_template(T::KIND);
    let mut changed: Vec<(T, String)> = Vec::new();
    for (n, obj) in db.iter::<T>()?.into_iter().enumerate() {
        let new_id = format_gramps_id(&template, n as u32);
        if obj.gramps_id() != new_id {
            changed.push((obj, new_id));
        }
    }
    for (obj, _) in &mut changed {
        let handle = obj.handle().map(Handle::to_string).unwrap_or_default();
        obj.set_gramps_id(format!("renumber-{}", handle));
        txn.put(obj)?;
    }
    for (obj, new_id) in &mut changed {
        obj.set_gramps_id(std::mem::take(new_id));
        txn.put(obj)?;
    }
    Ok(changed.len())
}

impl ToolPlugin for RenumberTool {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn run(&self, db: &FamilyTreeDb, _options: &BTreeMap<String, String>, _user: &dyn User) -> Result<String> {
        let mut txn = Transaction::new("Reorder Gramps IDs");
        let mut counts: HashMap<ObjectKind, usize> = HashMap::new();
        counts.insert(ObjectKind::Person, renumber::<Person>(db, &mut txn)?);
        counts.insert(ObjectKind::Family, renumber::<Family>(db, &mut txn)?);
        counts.insert(ObjectKind::Event, renumber::<Event>(db, &mut txn)?);
        counts.insert(ObjectKind::Place, renumber::<Place>(db, &mut txn)?);
        counts.insert(ObjectKind::Source, renumber::<Source>(db, &mut txn)?);
        counts.insert(ObjectKind::Citation, renumber::<Citation>(db, &mut txn)?);
        counts.insert(ObjectKind::Repository, renumber::<Repository>(db, &mut txn)?);
        counts.insert(ObjectKind::Media, renumber::<Media>(db, &mut txn)?);
        counts.insert(ObjectKind::Note, renumber::<Note>(db, &mut txn)?);
        let total: usize = counts.values().sum();
        db.commit(txn)?;
        Ok(format!("Reorder Gramps IDs: {} IDs were changed.", total))
    }
}
