//! Built-in reports and the command-line report runner.

use super::{OptionSpec, PluginDescriptor, ReportPlugin};
use crate::db::FamilyTreeDb;
use crate::error::{FamError, Result};
use crate::objects::{Event, EventRef, EventType, Family, Gender, ObjectKind, Person, Place};
use crate::options::{split_options, unquote, OptionMap};
use crate::user::User;
use crate::Handle;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use tracing::{debug, info};

/// Output formats for the `off` option.
pub const OUTPUT_FORMATS: [(&str, &str); 2] = [
    ("txt", "Plain text, aligned columns"),
    ("csv", "Comma separated values"),
];

const DEFAULT_FORMAT: &str = "txt";

/// A titled table inside a report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    /// Heading above the table, if any.
    pub heading: Option<String>,
    /// Column titles.
    pub columns: Vec<String>,
    /// Rows, one cell per column.
    pub rows: Vec<Vec<String>>,
}

impl Section {
    fn new(columns: &[&str]) -> Self {
        Self {
            heading: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }
}

/// A finished report, independent of the output format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportDoc {
    /// Report title.
    pub title: String,
    /// Tables, in order.
    pub sections: Vec<Section>,
}

impl ReportDoc {
    /// Plain text with columns padded to their widest cell.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.title);
        let _ = writeln!(out, "{}", "=".repeat(self.title.chars().count()));
        for section in &self.sections {
            out.push('\n');
            if let Some(heading) = &section.heading {
                let _ = writeln!(out, "{}", heading);
            }
            let mut widths: Vec<usize> = section.columns.iter().map(|c| c.chars().count()).collect();
            for row in &section.rows {
                for (i, cell) in row.iter().enumerate() {
                    if let Some(w) = widths.get_mut(i) {
                        *w = (*w).max(cell.chars().count());
                    }
                }
            }
            let render = |cells: &[String]| {
                let line: Vec<String> = cells
                    .iter()
                    .enumerate()
                    .map(|(i, c)| format!("{:<width$}", c, width = widths.get(i).copied().unwrap_or(0)))
                    .collect();
                line.join("  ").trim_end().to_string()
            };
            let _ = writeln!(out, "{}", render(&section.columns));
            let _ = writeln!(
                out,
                "{}",
                widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("  ")
            );
            for row in &section.rows {
                let _ = writeln!(out, "{}", render(row));
            }
        }
        out
    }

    /// CSV: each section is its optional heading row, a header row and data rows.
    pub fn write_csv(&self, out: impl Write) -> Result<()> {
        let csv_err = |e: csv::Error| FamError::Action {
            action: "report",
            name: self.title.clone(),
            reason: e.to_string(),
        };
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(out);
        for section in &self.sections {
            if let Some(heading) = &section.heading {
                writer.write_record([heading]).map_err(csv_err)?;
            }
            writer.write_record(&section.columns).map_err(csv_err)?;
            for row in &section.rows {
                writer.write_record(row).map_err(csv_err)?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

/// Option values for one report run: defaults overlaid with what was given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportOptions {
    values: BTreeMap<String, String>,
}

impl ReportOptions {
    /// Builds from specs and given values (already filtered to known names).
    pub fn new(specs: &[OptionSpec], given: &OptionMap) -> Self {
        let mut values: BTreeMap<String, String> = specs
            .iter()
            .map(|s| (s.name.to_string(), s.default.clone()))
            .collect();
        for (name, value) in given {
            values.insert(name.clone(), unquote(value).to_string());
        }
        Self { values }
    }

    /// Value of `name`, empty if unknown.
    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }
}

fn common_options(title: &str) -> Vec<OptionSpec> {
    vec![
        OptionSpec::new("of", "", "Output file name, standard output when empty"),
        OptionSpec::new("off", DEFAULT_FORMAT, "Output file format")
            .with_choices("txt, csv"),
        OptionSpec::new("title", title, "Report title"),
    ]
}

fn describe_option(spec: &OptionSpec) -> String {
    let mut text = format!("   {:<20}{}", spec.name, spec.help.0);
    if !spec.default.is_empty() {
        let _ = write!(text, " (default: {})", spec.default);
    }
    if let Some(choices) = spec.help.1 {
        let _ = write!(text, "\n   {:<20}Available values are: {}", "", choices);
    }
    text
}

/// Runs `report` with a raw `-p` options string.
///
/// `name` and `show` are read here: `show=all` lists every option and
/// `show=<option>` describes one, without running the report. Unknown
/// options and an unknown `off` are warned about and ignored.
pub fn run_report(
    report: &dyn ReportPlugin,
    db: &FamilyTreeDb,
    options_str: &str,
    user: &dyn User,
) -> Result<()> {
    let descriptor = report.descriptor();
    let mut specs = common_options(descriptor.name);
    specs.extend(report.options());

    let mut given = split_options(options_str);
    given.remove("name");
    if let Some(show) = given.remove("show") {
        show_options(&specs, &show, user);
        return Ok(());
    }

    let known: BTreeSet<&str> = specs.iter().map(|s| s.name).collect();
    given.retain(|name, _| {
        let ok = known.contains(name.as_str());
        if !ok {
            user.warn(
                "Ignoring unknown option",
                &format!(
                    "Ignoring unknown option: {}\n   Valid options are: {}",
                    name,
                    known.iter().copied().collect::<Vec<_>>().join(", ")
                ),
            );
        }
        ok
    });
    if let Some(off) = given.get("off").map(|v| unquote(v).to_string()) {
        if !OUTPUT_FORMATS.iter().any(|(f, _)| *f == off) {
            let formats: Vec<_> = OUTPUT_FORMATS
                .iter()
                .map(|(f, d)| format!("   {:<10}{}", f, d))
                .collect();
            user.warn(
                "Ignoring output format",
                &format!(
                    "Ignoring 'off={}' and using default '{}'.\n   Available values are:\n{}",
                    off,
                    DEFAULT_FORMAT,
                    formats.join("\n")
                ),
            );
            given.remove("off");
        }
    }

    let options = ReportOptions::new(&specs, &given);
    debug!(report = descriptor.id, ?options, "running report");
    let mut doc = report.build(db, &options)?;
    doc.title = options.get("title").to_string();

    let write_err = |e: io::Error| FamError::Action {
        action: "report",
        name: descriptor.id.to_string(),
        reason: e.to_string(),
    };
    let target = options.get("of");
    let format = options.get("off");
    if target.is_empty() || target == "-" {
        let stdout = io::stdout();
        write_doc(&doc, format, stdout.lock())?;
    } else {
        let file = File::create(target).map_err(write_err)?;
        write_doc(&doc, format, BufWriter::new(file))?;
        info!(report = descriptor.id, path = target, "report written");
    }
    Ok(())
}

fn write_doc(doc: &ReportDoc, format: &str, mut out: impl Write) -> Result<()> {
    match format {
        "csv" => doc.write_csv(out),
        _ => {
            out.write_all(doc.to_text().as_bytes())?;
            out.flush()?;
            Ok(())
        }
    }
}

fn show_options(specs: &[OptionSpec], show: &str, user: &dyn User) {
    if show == "all" {
        let mut text = String::from("   Available options:");
        for spec in specs {
            text.push('\n');
            text.push_str(&describe_option(spec));
        }
        text.push_str("\n   Use 'name=report,show=option' to see description and acceptable values");
        user.info(&text);
        return;
    }
    match specs.iter().find(|s| s.name == show) {
        Some(spec) => user.info(&describe_option(spec)),
        None => user.warn(
            "Unknown option",
            &format!("   Unknown option: {}\n   Use 'show=all' to list options", show),
        ),
    }
}

/// Date and place of an event, for table cells.
fn event_cell(db: &FamilyTreeDb, event_ref: Option<&EventRef>) -> Result<String> {
    let Some(event_ref) = event_ref else {
        return Ok(String::new());
    };
    let Some(event) = db.get::<Event>(&event_ref.event)? else {
        return Ok(String::new());
    };
    let place = match &event.place {
        Some(handle) => db.get::<Place>(handle)?.map(|p| p.title).unwrap_or_default(),
        None => String::new(),
    };
    Ok(match (event.date.is_empty(), place.is_empty()) {
        (false, false) => format!("{} in {}", event.date, place),
        (false, true) => event.date,
        (true, false) => place,
        (true, true) => String::new(),
    })
}

fn gender_label(gender: Gender) -> &'static str {
    match gender {
        Gender::Male => "male",
        Gender::Female => "female",
        Gender::Unknown => "unknown",
    }
}

/// Counts per object kind and gender.
#[derive(Debug, Clone)]
pub struct SummaryReport {
    descriptor: PluginDescriptor,
}

impl SummaryReport {
    /// `summary`.
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor {
                id: "summary",
                name: "Database Summary Report",
                description: "Provides a summary of the current database",
                extension: "",
            },
        }
    }
}

impl Default for SummaryReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportPlugin for SummaryReport {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn options(&self) -> Vec<OptionSpec> {
        Vec::new()
    }

    fn build(&self, db: &FamilyTreeDb, _options: &ReportOptions) -> Result<ReportDoc> {
        let people: Vec<Person> = db.iter()?;
        let count_gender = |g: Gender| people.iter().filter(|p| p.gender == g).count();
        let surnames: BTreeSet<&str> = people
            .iter()
            .map(|p| p.primary_name.surname.as_str())
            .filter(|s| !s.is_empty())
            .collect();
        let incomplete = people
            .iter()
            .filter(|p| p.primary_name.first_name.is_empty() || p.primary_name.surname.is_empty())
            .count();

        let mut individuals = Section::new(&["Item", "Value"]);
        individuals.heading = Some("Individuals".into());
        individuals.row(["Number of individuals".to_string(), people.len().to_string()]);
        individuals.row(["Males".to_string(), count_gender(Gender::Male).to_string()]);
        individuals.row(["Females".to_string(), count_gender(Gender::Female).to_string()]);
        individuals.row([
            "Individuals with unknown gender".to_string(),
            count_gender(Gender::Unknown).to_string(),
        ]);
        individuals.row(["Incomplete names".to_string(), incomplete.to_string()]);
        individuals.row(["Unique surnames".to_string(), surnames.len().to_string()]);

        let mut objects = Section::new(&["Kind", "Count"]);
        objects.heading = Some("Records".into());
        for kind in ObjectKind::ALL {
            objects.row([kind.name().to_string(), db.count(kind)?.to_string()]);
        }

        Ok(ReportDoc {
            title: self.descriptor.name.into(),
            sections: vec![individuals, objects],
        })
    }
}

/// One row per person.
#[derive(Debug, Clone)]
pub struct IndividualsReport {
    descriptor: PluginDescriptor,
}

impl IndividualsReport {
    /// `individuals`.
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor {
                id: "individuals",
                name: "Individuals",
                description: "Lists every person with birth and death",
                extension: "",
            },
        }
    }
}

impl Default for IndividualsReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportPlugin for IndividualsReport {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn options(&self) -> Vec<OptionSpec> {
        vec![OptionSpec::new(
            "surname",
            "",
            "Only people with this surname (case insensitive)",
        )]
    }

    fn build(&self, db: &FamilyTreeDb, options: &ReportOptions) -> Result<ReportDoc> {
        let surname = options.get("surname").to_lowercase();
        let mut section = Section::new(&["ID", "Name", "Gender", "Birth", "Death"]);
        for person in db.iter::<Person>()? {
            if !surname.is_empty() && person.primary_name.surname.to_lowercase() != surname {
                continue;
            }
            section.row([
                person.gramps_id.clone(),
                person.primary_name.display(),
                gender_label(person.gender).to_string(),
                event_cell(db, person.birth_ref())?,
                event_cell(db, person.death_ref())?,
            ]);
        }
        Ok(ReportDoc {
            title: self.descriptor.name.into(),
            sections: vec![section],
        })
    }
}

/// Parents and children of one family, or of every family.
#[derive(Debug, Clone)]
pub struct FamilyGroupReport {
    descriptor: PluginDescriptor,
}

impl FamilyGroupReport {
    /// `family_group`.
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor {
                id: "family_group",
                name: "Family Group Report",
                description: "Parents, children and marriage of a family",
                extension: "",
            },
        }
    }

    fn member_row(&self, db: &FamilyTreeDb, role: &str, handle: &Handle) -> Result<Vec<String>> {
        let Some(person) = db.get::<Person>(handle)? else {
            return Ok(vec![role.to_string(), String::new(), "(missing)".into()]);
        };
        Ok(vec![
            role.to_string(),
            person.gramps_id.clone(),
            person.primary_name.display(),
            event_cell(db, person.birth_ref())?,
            event_cell(db, person.death_ref())?,
        ])
    }

    fn section(&self, db: &FamilyTreeDb, family: &Family) -> Result<Section> {
        let mut section = Section::new(&["Role", "ID", "Name", "Birth", "Death"]);
        let marriage = family
            .event_ref_list
            .iter()
            .find_map(|r| match db.get::<Event>(&r.event) {
                Ok(Some(e)) if e.event_type == EventType::Marriage => Some(Ok(r)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
            .transpose()?;
        let married = event_cell(db, marriage)?;
        section.heading = Some(if married.is_empty() {
            format!("Family {}", family.gramps_id)
        } else {
            format!("Family {} (married {})", family.gramps_id, married)
        });
        if let Some(father) = &family.father_handle {
            section.rows.push(self.member_row(db, "Husband", father)?);
        }
        if let Some(mother) = &family.mother_handle {
            section.rows.push(self.member_row(db, "Wife", mother)?);
        }
        for child in family.children() {
            section.rows.push(self.member_row(db, "Child", child)?);
        }
        Ok(section)
    }
}

impl Default for FamilyGroupReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportPlugin for FamilyGroupReport {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn options(&self) -> Vec<OptionSpec> {
        vec![OptionSpec::new(
            "family_id",
            "",
            "Gramps ID of the family, every family when empty",
        )]
    }

    fn build(&self, db: &FamilyTreeDb, options: &ReportOptions) -> Result<ReportDoc> {
        let family_id = options.get("family_id");
        let families = if family_id.is_empty() {
            db.iter::<Family>()?
        } else {
            let family = db.find_by_id::<Family>(family_id)?.ok_or_else(|| FamError::Action {
                action: "report",
                name: self.descriptor.id.into(),
                reason: format!("no family with ID {}", family_id),
            })?;
            vec![family]
        };
        let sections = families
            .iter()
            .map(|f| self.section(db, f))
            .collect::<Result<Vec<_>>>()?;
        Ok(ReportDoc {
            title: self.descriptor.name.into(),
            sections,
        })
    }
}
