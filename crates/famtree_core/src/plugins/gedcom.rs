//! GEDCOM 5.5 import and export (lineage-linked subset).
//!
//! Handled records: `INDI` (NAME, SEX, events with DATE/PLAC, FAMS, FAMC,
//! NOTE, SOUR/PAGE), `FAM` (HUSB, WIFE, CHIL, events), `NOTE` (CONT/CONC)
//! and `SOUR` (TITL, AUTH, PUBL, ABBR). Everything else is skipped.

use super::{stage_imported, ExportPlugin, ImportPlugin, ImportStats, PluginDescriptor};
use crate::db::FamilyTreeDb;
use crate::error::{FamError, Result};
use crate::objects::{
    Citation, Event, EventRef, EventRole, EventType, Family, Gender, Name, Note, Person, Place,
    Source,
};
use crate::user::User;
use crate::Handle;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::io::{BufRead, BufReader, Read, Write};
use tracing::{debug, warn};

/// One parsed line with its sub-records.
#[derive(Debug, Clone, Default, PartialEq)]
struct Node {
    xref: Option<String>,
    tag: String,
    value: String,
    children: Vec<Node>,
}

impl Node {
    fn child(&self, tag: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.tag == tag)
    }

    fn child_value(&self, tag: &str) -> Option<&str> {
        self.child(tag).map(|c| c.value.as_str())
    }

    /// Value with CONT/CONC continuation lines folded in.
    fn text(&self) -> String {
        let mut text = self.value.clone();
        for child in &self.children {
            match child.tag.as_str() {
                "CONT" => {
                    text.push('\n');
                    text.push_str(&child.value);
                }
                "CONC" => text.push_str(&child.value),
                _ => {}
            }
        }
        text
    }
}

fn parse_line(line: &str) -> Option<(usize, Node)> {
    let line = line.trim_start_matches('\u{feff}').trim_end_matches(['\r', '\n']);
    let mut parts = line.trim_start().splitn(2, ' ');
    let level: usize = parts.next()?.parse().ok()?;
    let rest = parts.next()?.trim_start();
    let (xref, rest) = if rest.starts_with('@') {
        let mut split = rest.splitn(2, ' ');
        let xref = split.next()?.to_string();
        (Some(xref), split.next().unwrap_or(""))
    } else {
        (None, rest)
    };
    let mut split = rest.splitn(2, ' ');
    let tag = split.next()?.to_ascii_uppercase();
    if tag.is_empty() {
        return None;
    }
    let value = split.next().unwrap_or("").to_string();
    Some((
        level,
        Node {
            xref,
            tag,
            value,
            children: Vec::new(),
        },
    ))
}

/// Builds the record tree from level-numbered lines.
fn parse_records(input: &mut dyn Read) -> Result<Vec<Node>> {
    let mut records: Vec<Node> = Vec::new();
    let mut stack: Vec<Node> = Vec::new();
    let reader = BufReader::new(input);
    for (number, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| import_err(format!("line {}: {}", number + 1, e)))?;
        if line.trim().is_empty() {
            continue;
        }
        let Some((level, node)) = parse_line(&line) else {
            warn!(line = number + 1, "skipping malformed GEDCOM line");
            continue;
        };
        if level > stack.len() {
            return Err(import_err(format!(
                "line {}: level {} follows level {}",
                number + 1,
                level,
                stack.len().saturating_sub(1)
            )));
        }
        while stack.len() > level {
            fold(&mut stack, &mut records);
        }
        stack.push(node);
    }
    while !stack.is_empty() {
        fold(&mut stack, &mut records);
    }
    Ok(records)
}

fn fold(stack: &mut Vec<Node>, records: &mut Vec<Node>) {
    if let Some(done) = stack.pop() {
        match stack.last_mut() {
            Some(parent) => parent.children.push(done),
            None => records.push(done),
        }
    }
}

fn import_err(reason: impl Into<String>) -> FamError {
    FamError::Import {
        path: "ged".into(),
        reason: reason.into(),
    }
}

fn strip_xref(xref: &str) -> String {
    xref.trim_matches('@').to_string()
}

/// Splits `John /Smith/ Jr` into given name, surname and suffix.
fn parse_name(value: &str) -> Name {
    let mut name = Name::default();
    match value.split_once('/') {
        Some((given, rest)) => {
            name.first_name = given.trim().to_string();
            let (surname, suffix) = rest.split_once('/').unwrap_or((rest, ""));
            name.surname = surname.trim().to_string();
            name.suffix = suffix.trim().to_string();
        }
        None => name.first_name = value.trim().to_string(),
    }
    name
}

const EVENT_TAGS: [&str; 9] = [
    "BIRT", "DEAT", "MARR", "BAPM", "CHR", "BURI", "RESI", "OCCU", "EVEN",
];

/// Collects objects while walking the records.
#[derive(Default)]
struct Importer {
    handles: HashMap<String, Handle>,
    places: BTreeMap<String, Place>,
    people: Vec<Person>,
    families: Vec<Family>,
    events: Vec<Event>,
    notes: Vec<Note>,
    sources: Vec<Source>,
    citations: Vec<Citation>,
    skipped: usize,
}

impl Importer {
    fn handle_for(&mut self, xref: &str) -> Handle {
        if xref.is_empty() {
            return Handle::generate();
        }
        self.handles
            .entry(xref.to_string())
            .or_insert_with(Handle::generate)
            .clone()
    }

    fn known(&self, xref: &str) -> Option<Handle> {
        let found = self.handles.get(xref).cloned();
        if found.is_none() {
            warn!(xref, "reference to unknown GEDCOM record");
        }
        found
    }

    fn place(&mut self, title: &str) -> Handle {
        let place = self.places.entry(title.to_string()).or_insert_with(|| Place {
            handle: Some(Handle::generate()),
            title: title.to_string(),
            name: title.split(',').next().unwrap_or(title).trim().to_string(),
            ..Default::default()
        });
        place.handle.clone().unwrap_or_else(Handle::generate)
    }

    fn event(&mut self, node: &Node) -> Handle {
        let event_type = match node.tag.as_str() {
            "EVEN" => EventType::Custom(node.child_value("TYPE").unwrap_or("Event").to_string()),
            tag => EventType::parse(tag),
        };
        let description = match node.value.as_str() {
            "" | "Y" => String::new(),
            v => v.to_string(),
        };
        let place = node
            .child_value("PLAC")
            .filter(|p| !p.trim().is_empty())
            .map(|p| self.place(p.trim()));
        let handle = Handle::generate();
        let mut event = Event {
            handle: Some(handle.clone()),
            event_type,
            date: node.child_value("DATE").unwrap_or("").to_string(),
            place,
            description,
            ..Default::default()
        };
        event.note_list = self.notes_of(node);
        self.events.push(event);
        handle
    }

    fn notes_of(&mut self, node: &Node) -> Vec<Handle> {
        let mut list = Vec::new();
        for note in node.children.iter().filter(|c| c.tag == "NOTE") {
            if note.value.starts_with('@') {
                if let Some(h) = self.known(&note.value) {
                    list.push(h);
                }
            } else {
                let handle = Handle::generate();
                self.notes.push(Note {
                    handle: Some(handle.clone()),
                    text: note.text(),
                    ..Default::default()
                });
                list.push(handle);
            }
        }
        list
    }

    fn citations_of(&mut self, node: &Node) -> Vec<Handle> {
        let mut list = Vec::new();
        for sour in node.children.iter().filter(|c| c.tag == "SOUR") {
            if let Some(source) = self.known(&sour.value) {
                let handle = Handle::generate();
                self.citations.push(Citation {
                    handle: Some(handle.clone()),
                    source_handle: Some(source),
                    page: sour.child_value("PAGE").unwrap_or("").to_string(),
                    ..Default::default()
                });
                list.push(handle);
            }
        }
        list
    }

    fn person(&mut self, record: &Node, xref: &str) {
        let mut person = Person {
            handle: Some(self.handle_for(xref)),
            gramps_id: strip_xref(xref),
            ..Default::default()
        };
        let mut names = record.children.iter().filter(|c| c.tag == "NAME");
        if let Some(primary) = names.next() {
            person.primary_name = parse_name(&primary.value);
        }
        person.alternate_names = names.map(|n| parse_name(&n.value)).collect();
        person.gender = match record.child_value("SEX").map(str::trim) {
            Some("M") => Gender::Male,
            Some("F") => Gender::Female,
            _ => Gender::Unknown,
        };
        for child in &record.children {
            match child.tag.as_str() {
                tag if EVENT_TAGS.contains(&tag) => {
                    let event = self.event(child);
                    match tag {
                        "BIRT" if person.birth_ref_index.is_none() => {
                            person.birth_ref_index = Some(person.event_ref_list.len())
                        }
                        "DEAT" if person.death_ref_index.is_none() => {
                            person.death_ref_index = Some(person.event_ref_list.len())
                        }
                        _ => {}
                    }
                    person.event_ref_list.push(EventRef::new(event));
                }
                "FAMS" => {
                    if let Some(h) = self.known(&child.value) {
                        person.add_family_handle(&h);
                    }
                }
                "FAMC" => {
                    if let Some(h) = self.known(&child.value) {
                        person.add_parent_family_handle(&h);
                    }
                }
                _ => {}
            }
        }
        person.note_list = self.notes_of(record);
        person.citation_list = self.citations_of(record);
        self.people.push(person);
    }

    fn family(&mut self, record: &Node, xref: &str) {
        let mut family = Family {
            handle: Some(self.handle_for(xref)),
            gramps_id: strip_xref(xref),
            ..Default::default()
        };
        for child in &record.children {
            match child.tag.as_str() {
                "HUSB" => family.father_handle = self.known(&child.value),
                "WIFE" => family.mother_handle = self.known(&child.value),
                "CHIL" => {
                    if let Some(h) = self.known(&child.value) {
                        family.add_child(h);
                    }
                }
                tag if EVENT_TAGS.contains(&tag) => {
                    let event = self.event(child);
                    let mut event_ref = EventRef::new(event);
                    event_ref.role = EventRole::Family;
                    family.event_ref_list.push(event_ref);
                }
                _ => {}
            }
        }
        family.note_list = self.notes_of(record);
        family.citation_list = self.citations_of(record);
        self.families.push(family);
    }

    fn read(&mut self, records: &[Node]) {
        // handles first, so that forward references resolve
        for record in records {
            if let Some(xref) = &record.xref {
                if matches!(record.tag.as_str(), "INDI" | "FAM" | "NOTE" | "SOUR") {
                    self.handle_for(xref);
                }
            }
        }
        for record in records {
            let xref = record.xref.as_deref().unwrap_or("");
            match record.tag.as_str() {
                "INDI" => self.person(record, xref),
                "FAM" => self.family(record, xref),
                "NOTE" if !xref.is_empty() => {
                    let handle = self.handle_for(xref);
                    self.notes.push(Note {
                        handle: Some(handle),
                        gramps_id: strip_xref(xref),
                        text: record.text(),
                        ..Default::default()
                    });
                }
                "SOUR" if !xref.is_empty() => {
                    let handle = self.handle_for(xref);
                    self.sources.push(Source {
                        handle: Some(handle),
                        gramps_id: strip_xref(xref),
                        title: record.child("TITL").map(Node::text).unwrap_or_default(),
                        author: record.child_value("AUTH").unwrap_or("").to_string(),
                        pubinfo: record.child_value("PUBL").unwrap_or("").to_string(),
                        abbrev: record.child_value("ABBR").unwrap_or("").to_string(),
                        ..Default::default()
                    });
                }
                "HEAD" | "TRLR" | "SUBM" => {}
                other => {
                    debug!(tag = other, "skipping GEDCOM record");
                    self.skipped += 1;
                }
            }
        }
    }
}

/// GEDCOM 5.5 reader and writer.
#[derive(Debug, Clone)]
pub struct GedcomFormat {
    descriptor: PluginDescriptor,
}

impl GedcomFormat {
    /// The `.ged` format.
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor {
                id: "ged",
                name: "GEDCOM",
                description: "GEDCOM 5.5 lineage-linked data",
                extension: "ged",
            },
        }
    }
}

impl Default for GedcomFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportPlugin for GedcomFormat {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn import(&self, db: &FamilyTreeDb, input: &mut dyn Read, user: &dyn User) -> Result<ImportStats> {
        let records = parse_records(input)?;
        if !records.iter().any(|r| r.tag == "HEAD") {
            return Err(import_err("not a GEDCOM file: no HEAD record"));
        }
        let mut importer = Importer::default();
        importer.read(&records);
        if importer.skipped > 0 {
            user.warn(
                "GEDCOM import",
                &format!("{} unsupported records were skipped.", importer.skipped),
            );
        }

        let mut stats = ImportStats::default();
        let mut txn = db.transaction("Import GEDCOM");
        let places: Vec<Place> = importer.places.into_values().collect();
        stage_imported(db, &mut txn, importer.people, &mut stats)?;
        stage_imported(db, &mut txn, importer.families, &mut stats)?;
        stage_imported(db, &mut txn, importer.events, &mut stats)?;
        stage_imported(db, &mut txn, places, &mut stats)?;
        stage_imported(db, &mut txn, importer.sources, &mut stats)?;
        stage_imported(db, &mut txn, importer.citations, &mut stats)?;
        stage_imported(db, &mut txn, importer.notes, &mut stats)?;
        db.commit(txn)?;
        Ok(stats)
    }
}

/// Looks up the Gramps IDs used as cross-reference tags.
struct XrefMap {
    people: HashMap<Handle, String>,
    families: HashMap<Handle, String>,
    notes: HashMap<Handle, String>,
    sources: HashMap<Handle, String>,
}

fn id_map<T: crate::objects::PrimaryObject>(objects: &[T]) -> HashMap<Handle, String> {
    objects
        .iter()
        .filter_map(|o| o.handle().map(|h| (h.clone(), o.gramps_id().to_string())))
        .collect()
}

fn lines(out: &mut String, level: usize, tag: &str, text: &str) {
    let mut parts = text.split('\n');
    let first = parts.next().unwrap_or("");
    if first.is_empty() {
        let _ = writeln!(out, "{} {}", level, tag);
    } else {
        let _ = writeln!(out, "{} {} {}", level, tag, first);
    }
    for part in parts {
        let _ = writeln!(out, "{} CONT {}", level + 1, part);
    }
}

struct Writer<'a> {
    db: &'a FamilyTreeDb,
    xrefs: XrefMap,
    places: HashMap<Handle, String>,
    citations: HashMap<Handle, Citation>,
}

impl Writer<'_> {
    fn event(&self, out: &mut String, level: usize, handle: &Handle) -> Result<()> {
        let Some(event) = self.db.get::<Event>(handle)? else {
            warn!(handle = %handle, "skipping missing event");
            return Ok(());
        };
        let place = event.place.as_ref().and_then(|p| self.places.get(p));
        let detail = !event.date.is_empty() || place.is_some();
        match event.event_type.gedcom_tag() {
            Some(tag) => {
                let value = if !event.description.is_empty() {
                    event.description.clone()
                } else if detail {
                    String::new()
                } else {
                    "Y".to_string()
                };
                lines(out, level, tag, &value);
            }
            None => {
                let _ = writeln!(out, "{} EVEN", level);
                let _ = writeln!(out, "{} TYPE {}", level + 1, event.event_type);
            }
        }
        if !event.date.is_empty() {
            let _ = writeln!(out, "{} DATE {}", level + 1, event.date);
        }
        if let Some(place) = place {
            let _ = writeln!(out, "{} PLAC {}", level + 1, place);
        }
        self.refs(out, level + 1, "NOTE", &self.xrefs.notes, &event.note_list);
        Ok(())
    }

    fn refs(&self, out: &mut String, level: usize, tag: &str, map: &HashMap<Handle, String>, list: &[Handle]) {
        for handle in list {
            if let Some(id) = map.get(handle) {
                let _ = writeln!(out, "{} {} @{}@", level, tag, id);
            }
        }
    }

    fn citations(&self, out: &mut String, list: &[Handle]) {
        for handle in list {
            let Some(citation) = self.citations.get(handle) else {
                continue;
            };
            let Some(source) = citation
                .source_handle
                .as_ref()
                .and_then(|s| self.xrefs.sources.get(s))
            else {
                continue;
            };
            let _ = writeln!(out, "1 SOUR @{}@", source);
            if !citation.page.is_empty() {
                let _ = writeln!(out, "2 PAGE {}", citation.page);
            }
        }
    }

    fn person(&self, out: &mut String, person: &Person) -> Result<()> {
        let _ = writeln!(out, "0 @{}@ INDI", person.gramps_id);
        for name in std::iter::once(&person.primary_name).chain(&person.alternate_names) {
            let mut value = format!("{} /{}/", name.first_name, name.surname);
            if !name.suffix.is_empty() {
                value.push(' ');
                value.push_str(&name.suffix);
            }
            let _ = writeln!(out, "1 NAME {}", value.trim());
        }
        match person.gender {
            Gender::Male => out.push_str("1 SEX M\n"),
            Gender::Female => out.push_str("1 SEX F\n"),
            Gender::Unknown => {}
        }
        for event_ref in &person.event_ref_list {
            self.event(out, 1, &event_ref.event)?;
        }
        self.refs(out, 1, "FAMC", &self.xrefs.families, &person.parent_family_list);
        self.refs(out, 1, "FAMS", &self.xrefs.families, &person.family_list);
        self.refs(out, 1, "NOTE", &self.xrefs.notes, &person.note_list);
        self.citations(out, &person.citation_list);
        Ok(())
    }

    fn family(&self, out: &mut String, family: &Family) -> Result<()> {
        let _ = writeln!(out, "0 @{}@ FAM", family.gramps_id);
        if let Some(father) = &family.father_handle {
            self.refs(out, 1, "HUSB", &self.xrefs.people, std::slice::from_ref(father));
        }
        if let Some(mother) = &family.mother_handle {
            self.refs(out, 1, "WIFE", &self.xrefs.people, std::slice::from_ref(mother));
        }
        for event_ref in &family.event_ref_list {
            self.event(out, 1, &event_ref.event)?;
        }
        let children: Vec<Handle> = family.children().cloned().collect();
        self.refs(out, 1, "CHIL", &self.xrefs.people, &children);
        self.refs(out, 1, "NOTE", &self.xrefs.notes, &family.note_list);
        self.citations(out, &family.citation_list);
        Ok(())
    }
}

impl ExportPlugin for GedcomFormat {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn export(&self, db: &FamilyTreeDb, output: &mut dyn Write, user: &dyn User) -> Result<()> {
        let people: Vec<Person> = db.iter()?;
        let families: Vec<Family> = db.iter()?;
        let notes: Vec<Note> = db.iter()?;
        let sources: Vec<Source> = db.iter()?;
        let places: Vec<Place> = db.iter()?;
        let citations: Vec<Citation> = db.iter()?;
        let writer = Writer {
            db,
            xrefs: XrefMap {
                people: id_map(&people),
                families: id_map(&families),
                notes: id_map(&notes),
                sources: id_map(&sources),
            },
            places: places
                .into_iter()
                .filter_map(|p| p.handle.clone().map(|h| (h, p.title)))
                .collect(),
            citations: citations
                .into_iter()
                .filter_map(|c| c.handle.clone().map(|h| (h, c)))
                .collect(),
        };

        let mut out = String::new();
        out.push_str("0 HEAD\n1 SOUR GRAMPS\n2 NAME Gramps\n");
        let _ = writeln!(out, "2 VERS {}", env!("CARGO_PKG_VERSION"));
        let _ = writeln!(out, "1 DATE {}", chrono::Local::now().format("%-d %b %Y").to_string().to_uppercase());
        out.push_str("1 SUBM @SUBM@\n1 GEDC\n2 VERS 5.5\n2 FORM LINEAGE-LINKED\n1 CHAR UTF-8\n");
        out.push_str("0 @SUBM@ SUBM\n1 NAME Not Provided\n");

        user.begin_progress("Export", "Writing individuals", (people.len() + families.len()) as u64);
        for person in &people {
            writer.person(&mut out, person)?;
            user.step_progress();
        }
        for family in &families {
            writer.family(&mut out, family)?;
            user.step_progress();
        }
        user.end_progress();
        for source in &sources {
            let _ = writeln!(out, "0 @{}@ SOUR", source.gramps_id);
            if !source.title.is_empty() {
                lines(&mut out, 1, "TITL", &source.title);
            }
            for (tag, value) in [("AUTH", &source.author), ("PUBL", &source.pubinfo), ("ABBR", &source.abbrev)] {
                if !value.is_empty() {
                    let _ = writeln!(out, "1 {} {}", tag, value);
                }
            }
        }
        for note in &notes {
            lines(&mut out, 0, &format!("@{}@ NOTE", note.gramps_id), &note.text);
        }
        out.push_str("0 TRLR\n");

        output.write_all(out.as_bytes()).map_err(|e| FamError::Export {
            path: "ged".into(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbMode;
    use crate::dbman::TreeManager;
    use crate::objects::ObjectKind;
    use crate::user::RecordingUser;
    use tempfile::TempDir;

    const SAMPLE: &str = "0 HEAD
1 SOUR TEST
1 CHAR UTF-8
0 @I1@ INDI
1 NAME John /Smith/
1 SEX M
1 BIRT
2 DATE 1 JAN 1900
2 PLAC Springfield, Illinois
1 FAMS @F1@
1 NOTE @N1@
1 SOUR @S1@
2 PAGE p. 12
0 @I2@ INDI
1 NAME Mary /Jones/
1 SEX F
1 FAMS @F1@
0 @I3@ INDI
1 NAME Ann /Smith/
1 FAMC @F1@
1 DEAT Y
0 @F1@ FAM
1 HUSB @I1@
1 WIFE @I2@
1 CHIL @I3@
1 MARR
2 DATE 1925
0 @N1@ NOTE First line
1 CONT second line
1 CONC  continued
0 @S1@ SOUR
1 TITL Parish register
1 AUTH Clerk
0 @R1@ REPO
1 NAME Archive
0 TRLR
";

    fn open_tree(tmp: &TempDir, title: &str) -> FamilyTreeDb {
        let manager = TreeManager::new(tmp.path());
        let (dir, _) = manager.create_new_db(Some(title), "redb").unwrap();
        FamilyTreeDb::open(&dir, DbMode::ReadWrite, None).unwrap()
    }

    #[test]
    fn test_parse_name_parts() {
        let name = parse_name("John Paul /Smith/ Jr");
        assert_eq!(name.first_name, "John Paul");
        assert_eq!(name.surname, "Smith");
        assert_eq!(name.suffix, "Jr");
        assert_eq!(parse_name("Plain").first_name, "Plain");
    }

    #[test]
    fn test_import_links_families_and_keeps_xref_ids() {
        let tmp = TempDir::new().unwrap();
        let db = open_tree(&tmp, "Tree");
        let user = RecordingUser::new(true);
        let stats = GedcomFormat::new()
            .import(&db, &mut SAMPLE.as_bytes(), &user)
            .unwrap();
        assert_eq!(stats.counts["person"], 3);
        assert!(user.text().contains("1 unsupported records"));

        let john: Person = db.find_by_id("I1").unwrap().unwrap();
        assert_eq!(john.primary_name.surname, "Smith");
        assert_eq!(john.gender, Gender::Male);
        let birth: Event = db.get_required(&john.birth_ref().unwrap().event).unwrap();
        assert_eq!(birth.date, "1 JAN 1900");
        let place: Place = db.get_required(birth.place.as_ref().unwrap()).unwrap();
        assert_eq!(place.name, "Springfield");

        let family: Family = db.find_by_id("F1").unwrap().unwrap();
        assert_eq!(family.father_handle, john.handle);
        assert_eq!(family.children().count(), 1);

        let note: Note = db.find_by_id("N1").unwrap().unwrap();
        assert_eq!(note.text, "First line\nsecond line continued");
        assert_eq!(db.count(ObjectKind::Citation).unwrap(), 1);
    }

    #[test]
    fn test_export_then_import_keeps_structure() {
        let tmp = TempDir::new().unwrap();
        let user = RecordingUser::new(true);
        let first = open_tree(&tmp, "First");
        GedcomFormat::new()
            .import(&first, &mut SAMPLE.as_bytes(), &user)
            .unwrap();

        let mut buffer = Vec::new();
        GedcomFormat::new().export(&first, &mut buffer, &user).unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.starts_with("0 HEAD\n"));
        assert!(text.contains("0 @F1@ FAM\n1 HUSB @I1@\n1 WIFE @I2@\n"));
        assert!(text.trim_end().ends_with("0 TRLR"));

        let second = open_tree(&tmp, "Second");
        GedcomFormat::new()
            .import(&second, &mut buffer.as_slice(), &user)
            .unwrap();
        for kind in [ObjectKind::Person, ObjectKind::Family, ObjectKind::Note, ObjectKind::Source] {
            assert_eq!(first.count(kind).unwrap(), second.count(kind).unwrap(), "{kind}");
        }
    }

    #[test]
    fn test_rejects_input_without_header() {
        let tmp = TempDir::new().unwrap();
        let db = open_tree(&tmp, "Tree");
        let err = GedcomFormat::new()
            .import(&db, &mut "0 @I1@ INDI\n".as_bytes(), &RecordingUser::new(true))
            .unwrap_err();
        assert!(matches!(err, FamError::Import { .. }));
    }
}
