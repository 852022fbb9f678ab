//! Genealogical data model: primary and secondary objects.
//!
//! Primary objects are independently addressable by [`Handle`] and are
//! committed to storage one transaction at a time. Secondary objects
//! (names, addresses, attributes, references) live embedded in a primary
//! object and have no identity of their own.

use crate::error::{FamError, Result};
use crate::Handle;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The nine kinds of primary object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// An individual.
    Person,
    /// A couple and their children.
    Family,
    /// Something that happened at a date and place.
    Event,
    /// A location.
    Place,
    /// A source of information.
    Source,
    /// A reference into a source.
    Citation,
    /// A holder of sources (archive, library).
    Repository,
    /// A media file.
    Media,
    /// Free text.
    Note,
}

impl ObjectKind {
    /// All kinds, in storage order.
    pub const ALL: [ObjectKind; 9] = [
        ObjectKind::Person,
        ObjectKind::Family,
        ObjectKind::Event,
        ObjectKind::Place,
        ObjectKind::Source,
        ObjectKind::Citation,
        ObjectKind::Repository,
        ObjectKind::Media,
        ObjectKind::Note,
    ];

    /// Lower-case name, used for tables and signal prefixes.
    pub fn name(self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Family => "family",
            Self::Event => "event",
            Self::Place => "place",
            Self::Source => "source",
            Self::Citation => "citation",
            Self::Repository => "repository",
            Self::Media => "media",
            Self::Note => "note",
        }
    }

    /// Config key of the Gramps ID template for this kind.
    pub fn id_prefix_key(self) -> &'static str {
        match self {
            Self::Person => "preferences.iprefix",
            Self::Family => "preferences.fprefix",
            Self::Event => "preferences.eprefix",
            Self::Place => "preferences.pprefix",
            Self::Source => "preferences.sprefix",
            Self::Citation => "preferences.cprefix",
            Self::Repository => "preferences.rprefix",
            Self::Media => "preferences.oprefix",
            Self::Note => "preferences.nprefix",
        }
    }

    /// Name of the signal emitted for `action` on this kind, e.g. `person-update`.
    pub fn signal(self, action: SignalAction) -> String {
        format!("{}-{}", self.name(), action.as_str())
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Change-notification actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// New objects were committed.
    Add,
    /// Existing objects were changed.
    Update,
    /// Objects were removed.
    Delete,
    /// Everything of this kind must be reloaded (undo, import).
    Rebuild,
}

impl SignalAction {
    /// Signal suffix.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Rebuild => "rebuild",
        }
    }
}

/// Common behaviour of all primary objects.
pub trait PrimaryObject: Serialize + DeserializeOwned + Clone + fmt::Debug + 'static {
    /// Kind tag of this type.
    const KIND: ObjectKind;

    /// Storage handle, `None` until first commit.
    fn handle(&self) -> Option<&Handle>;

    /// Assigns the storage handle.
    fn set_handle(&mut self, handle: Handle);

    /// User-visible Gramps ID (may be blank before commit).
    fn gramps_id(&self) -> &str;

    /// Sets the Gramps ID.
    fn set_gramps_id(&mut self, id: String);

    /// Short human-readable label used in transaction descriptions.
    fn describe(&self) -> String {
        self.gramps_id().to_string()
    }

    /// True when the object holds no data worth saving.
    fn is_empty(&self) -> bool {
        false
    }

    /// Type-specific required-field checks.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Other primary objects this one displays, for change tracking.
    fn references(&self) -> Vec<(ObjectKind, Handle)> {
        Vec::new()
    }
}

fn push_unique(list: &mut Vec<Handle>, handle: &Handle) -> bool {
    if list.contains(handle) {
        false
    } else {
        list.push(handle.clone());
        true
    }
}

fn remove_handle(list: &mut Vec<Handle>, handle: &Handle) -> bool {
    let before = list.len();
    list.retain(|h| h != handle);
    list.len() != before
}

// ---------------------------------------------------------------------------
// Secondary objects
// ---------------------------------------------------------------------------

/// A personal name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    /// Given names.
    pub first_name: String,
    /// Family name.
    pub surname: String,
    /// Suffix such as "Jr.".
    pub suffix: String,
    /// Title such as "Dr.".
    pub title: String,
    /// Nickname.
    pub nick: String,
}

impl Name {
    /// Creates a name from given name and surname.
    pub fn new(first_name: &str, surname: &str) -> Self {
        Self {
            first_name: first_name.to_string(),
            surname: surname.to_string(),
            ..Default::default()
        }
    }

    /// True when no part of the name is filled in.
    pub fn is_empty(&self) -> bool {
        self.first_name.is_empty()
            && self.surname.is_empty()
            && self.suffix.is_empty()
            && self.title.is_empty()
            && self.nick.is_empty()
    }

    /// "Surname, Given" display form.
    pub fn display(&self) -> String {
        match (self.surname.is_empty(), self.first_name.is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.surname.clone(),
            (true, false) => self.first_name.clone(),
            (false, false) => format!("{}, {}", self.surname, self.first_name),
        }
    }
}

/// A postal address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Street line.
    pub street: String,
    /// City or locality.
    pub city: String,
    /// State or county.
    pub state: String,
    /// Country.
    pub country: String,
    /// Postal code.
    pub postal: String,
}

/// A key/value attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute type, e.g. "Occupation".
    pub attr_type: String,
    /// Attribute value.
    pub value: String,
}

/// Role a person or family plays in an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventRole {
    /// The main participant.
    #[default]
    Primary,
    /// The family as a whole.
    Family,
    /// A witness.
    Witness,
    /// User-defined role.
    Custom(String),
}

/// Reference from a person or family to an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventRef {
    /// Referenced event.
    pub event: Handle,
    /// Role in the event.
    pub role: EventRole,
}

impl EventRef {
    /// Creates a primary-role reference.
    pub fn new(event: Handle) -> Self {
        Self {
            event,
            role: EventRole::Primary,
        }
    }
}

/// Relationship of a child to a parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChildRelation {
    /// Biological child.
    #[default]
    Birth,
    /// Adopted child.
    Adopted,
    /// Stepchild.
    Stepchild,
    /// Foster child.
    Foster,
    /// Not known.
    Unknown,
}

/// Reference from a family to one of its children.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChildRef {
    /// The child.
    pub child: Handle,
    /// Relationship to the father.
    pub father_rel: ChildRelation,
    /// Relationship to the mother.
    pub mother_rel: ChildRelation,
}

impl ChildRef {
    /// Creates a birth-relationship reference.
    pub fn new(child: Handle) -> Self {
        Self {
            child,
            father_rel: ChildRelation::Birth,
            mother_rel: ChildRelation::Birth,
        }
    }
}

/// Reference from a source to a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    /// Referenced repository.
    pub repository: Handle,
    /// Call number within the repository.
    pub call_number: String,
}

// ---------------------------------------------------------------------------
// Primary objects
// ---------------------------------------------------------------------------

/// Gender of a person.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    /// Female.
    Female,
    /// Male.
    Male,
    /// Not known.
    #[default]
    Unknown,
}

/// An individual.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    /// Storage handle.
    pub handle: Option<Handle>,
    /// Gramps ID.
    pub gramps_id: String,
    /// Gender.
    pub gender: Gender,
    /// Preferred name.
    pub primary_name: Name,
    /// Other names.
    pub alternate_names: Vec<Name>,
    /// Addresses.
    pub addresses: Vec<Address>,
    /// Attributes.
    pub attributes: Vec<Attribute>,
    /// Events the person takes part in.
    pub event_ref_list: Vec<EventRef>,
    /// Index into `event_ref_list` of the birth event.
    pub birth_ref_index: Option<usize>,
    /// Index into `event_ref_list` of the death event.
    pub death_ref_index: Option<usize>,
    /// Families in which this person is a parent (back-references).
    pub family_list: Vec<Handle>,
    /// Families in which this person is a child (back-references).
    pub parent_family_list: Vec<Handle>,
    /// Citations.
    pub citation_list: Vec<Handle>,
    /// Notes.
    pub note_list: Vec<Handle>,
    /// Private record flag.
    pub private: bool,
}

impl Person {
    /// Adds a family where this person is a parent. Returns false if already present.
    pub fn add_family_handle(&mut self, handle: &Handle) -> bool {
        push_unique(&mut self.family_list, handle)
    }

    /// Removes a parent-family back-reference.
    pub fn remove_family_handle(&mut self, handle: &Handle) -> bool {
        remove_handle(&mut self.family_list, handle)
    }

    /// Adds a family where this person is a child. Returns false if already present.
    pub fn add_parent_family_handle(&mut self, handle: &Handle) -> bool {
        push_unique(&mut self.parent_family_list, handle)
    }

    /// Removes a child-family back-reference.
    pub fn remove_parent_family_handle(&mut self, handle: &Handle) -> bool {
        remove_handle(&mut self.parent_family_list, handle)
    }

    /// Handle of the birth event, if set.
    pub fn birth_ref(&self) -> Option<&EventRef> {
        self.birth_ref_index.and_then(|i| self.event_ref_list.get(i))
    }

    /// Handle of the death event, if set.
    pub fn death_ref(&self) -> Option<&EventRef> {
        self.death_ref_index.and_then(|i| self.event_ref_list.get(i))
    }
}

impl PrimaryObject for Person {
    const KIND: ObjectKind = ObjectKind::Person;

    fn handle(&self) -> Option<&Handle> {
        self.handle.as_ref()
    }
    fn set_handle(&mut self, handle: Handle) {
        self.handle = Some(handle);
    }
    fn gramps_id(&self) -> &str {
        &self.gramps_id
    }
    fn set_gramps_id(&mut self, id: String) {
        self.gramps_id = id;
    }

    fn describe(&self) -> String {
        self.primary_name.display()
    }

    fn is_empty(&self) -> bool {
        self.primary_name.is_empty()
            && self.gender == Gender::Unknown
            && self.event_ref_list.is_empty()
            && self.attributes.is_empty()
            && self.addresses.is_empty()
    }

    fn references(&self) -> Vec<(ObjectKind, Handle)> {
        let mut refs: Vec<_> = self
            .event_ref_list
            .iter()
            .map(|r| (ObjectKind::Event, r.event.clone()))
            .collect();
        refs.extend(self.family_list.iter().map(|h| (ObjectKind::Family, h.clone())));
        refs.extend(
            self.parent_family_list
                .iter()
                .map(|h| (ObjectKind::Family, h.clone())),
        );
        refs
    }
}

/// Relationship type of a couple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FamilyRelType {
    /// Married couple.
    #[default]
    Married,
    /// Unmarried couple.
    Unmarried,
    /// Civil union.
    CivilUnion,
    /// Not known.
    Unknown,
}

/// A couple and their children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Family {
    /// Storage handle.
    pub handle: Option<Handle>,
    /// Gramps ID.
    pub gramps_id: String,
    /// Father (or first partner).
    pub father_handle: Option<Handle>,
    /// Mother (or second partner).
    pub mother_handle: Option<Handle>,
    /// Children.
    pub child_ref_list: Vec<ChildRef>,
    /// Relationship type.
    pub family_type: FamilyRelType,
    /// Family events.
    pub event_ref_list: Vec<EventRef>,
    /// Attributes.
    pub attributes: Vec<Attribute>,
    /// Citations.
    pub citation_list: Vec<Handle>,
    /// Notes.
    pub note_list: Vec<Handle>,
    /// Private record flag.
    pub private: bool,
}

impl Family {
    /// Adds a child if not already present.
    pub fn add_child(&mut self, child: Handle) {
        if !self.child_ref_list.iter().any(|r| r.child == child) {
            self.child_ref_list.push(ChildRef::new(child));
        }
    }

    /// Handles of all children.
    pub fn children(&self) -> impl Iterator<Item = &Handle> {
        self.child_ref_list.iter().map(|r| &r.child)
    }

    /// Father and mother handles that are set.
    pub fn parents(&self) -> impl Iterator<Item = &Handle> {
        self.father_handle.iter().chain(self.mother_handle.iter())
    }
}

impl PrimaryObject for Family {
    const KIND: ObjectKind = ObjectKind::Family;

    fn handle(&self) -> Option<&Handle> {
        self.handle.as_ref()
    }
    fn set_handle(&mut self, handle: Handle) {
        self.handle = Some(handle);
    }
    fn gramps_id(&self) -> &str {
        &self.gramps_id
    }
    fn set_gramps_id(&mut self, id: String) {
        self.gramps_id = id;
    }

    fn is_empty(&self) -> bool {
        self.father_handle.is_none()
            && self.mother_handle.is_none()
            && self.child_ref_list.is_empty()
    }

    fn validate(&self) -> Result<()> {
        if let Some(father) = &self.father_handle {
            if self.children().any(|c| c == father) {
                return Err(FamError::Validation {
                    field: "father",
                    reason: "a father cannot be his own child".into(),
                });
            }
        }
        if let Some(mother) = &self.mother_handle {
            if self.children().any(|c| c == mother) {
                return Err(FamError::Validation {
                    field: "mother",
                    reason: "a mother cannot be her own child".into(),
                });
            }
        }
        Ok(())
    }

    fn references(&self) -> Vec<(ObjectKind, Handle)> {
        let mut refs: Vec<_> = self
            .parents()
            .chain(self.children())
            .map(|h| (ObjectKind::Person, h.clone()))
            .collect();
        refs.extend(
            self.event_ref_list
                .iter()
                .map(|r| (ObjectKind::Event, r.event.clone())),
        );
        refs
    }
}

/// Type of an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// Birth.
    #[default]
    Birth,
    /// Death.
    Death,
    /// Marriage.
    Marriage,
    /// Baptism.
    Baptism,
    /// Burial.
    Burial,
    /// Residence.
    Residence,
    /// Occupation.
    Occupation,
    /// User-defined type.
    Custom(String),
}

impl EventType {
    /// Parses a display name or GEDCOM tag.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "birth" | "birt" => Self::Birth,
            "death" | "deat" => Self::Death,
            "marriage" | "marr" => Self::Marriage,
            "baptism" | "bapm" | "chr" => Self::Baptism,
            "burial" | "buri" => Self::Burial,
            "residence" | "resi" => Self::Residence,
            "occupation" | "occu" => Self::Occupation,
            _ => Self::Custom(raw.trim().to_string()),
        }
    }

    /// GEDCOM tag, when one exists.
    pub fn gedcom_tag(&self) -> Option<&'static str> {
        match self {
            Self::Birth => Some("BIRT"),
            Self::Death => Some("DEAT"),
            Self::Marriage => Some("MARR"),
            Self::Baptism => Some("BAPM"),
            Self::Burial => Some("BURI"),
            Self::Residence => Some("RESI"),
            Self::Occupation => Some("OCCU"),
            Self::Custom(_) => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Birth => f.write_str("Birth"),
            Self::Death => f.write_str("Death"),
            Self::Marriage => f.write_str("Marriage"),
            Self::Baptism => f.write_str("Baptism"),
            Self::Burial => f.write_str("Burial"),
            Self::Residence => f.write_str("Residence"),
            Self::Occupation => f.write_str("Occupation"),
            Self::Custom(s) => f.write_str(s),
        }
    }
}

/// Something that happened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Storage handle.
    pub handle: Option<Handle>,
    /// Gramps ID.
    pub gramps_id: String,
    /// Event type.
    pub event_type: EventType,
    /// Free-text date.
    pub date: String,
    /// Where it happened.
    pub place: Option<Handle>,
    /// Description.
    pub description: String,
    /// Citations.
    pub citation_list: Vec<Handle>,
    /// Notes.
    pub note_list: Vec<Handle>,
    /// Private record flag.
    pub private: bool,
}

impl PrimaryObject for Event {
    const KIND: ObjectKind = ObjectKind::Event;

    fn handle(&self) -> Option<&Handle> {
        self.handle.as_ref()
    }
    fn set_handle(&mut self, handle: Handle) {
        self.handle = Some(handle);
    }
    fn gramps_id(&self) -> &str {
        &self.gramps_id
    }
    fn set_gramps_id(&mut self, id: String) {
        self.gramps_id = id;
    }

    fn describe(&self) -> String {
        self.event_type.to_string()
    }

    fn validate(&self) -> Result<()> {
        if let EventType::Custom(name) = &self.event_type {
            if name.trim().is_empty() {
                return Err(FamError::Validation {
                    field: "event type",
                    reason: "the event type cannot be empty".into(),
                });
            }
        }
        Ok(())
    }

    fn references(&self) -> Vec<(ObjectKind, Handle)> {
        self.place
            .iter()
            .map(|h| (ObjectKind::Place, h.clone()))
            .collect()
    }
}

/// A location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Storage handle.
    pub handle: Option<Handle>,
    /// Gramps ID.
    pub gramps_id: String,
    /// Full display title.
    pub title: String,
    /// Short name.
    pub name: String,
    /// Latitude as entered.
    pub latitude: String,
    /// Longitude as entered.
    pub longitude: String,
    /// Enclosing place.
    pub enclosed_by: Option<Handle>,
}

/// Parses a coordinate in decimal degrees, with an optional hemisphere letter.
///
/// Returns `None` for malformed input or values outside `±limit`.
pub fn parse_coordinate(raw: &str, limit: f64, positive: char, negative: char) -> Option<f64> {
    let trimmed = raw.trim();
    let (number, sign) = match trimmed.chars().last() {
        Some(c) if c.eq_ignore_ascii_case(&positive) => (&trimmed[..trimmed.len() - 1], 1.0),
        Some(c) if c.eq_ignore_ascii_case(&negative) => (&trimmed[..trimmed.len() - 1], -1.0),
        _ => (trimmed, 1.0),
    };
    let value: f64 = number.trim().replace(',', ".").parse().ok()?;
    let value = value * sign;
    (value.is_finite() && value.abs() <= limit).then_some(value)
}

impl PrimaryObject for Place {
    const KIND: ObjectKind = ObjectKind::Place;

    fn handle(&self) -> Option<&Handle> {
        self.handle.as_ref()
    }
    fn set_handle(&mut self, handle: Handle) {
        self.handle = Some(handle);
    }
    fn gramps_id(&self) -> &str {
        &self.gramps_id
    }
    fn set_gramps_id(&mut self, id: String) {
        self.gramps_id = id;
    }

    fn describe(&self) -> String {
        self.title.clone()
    }

    fn is_empty(&self) -> bool {
        self.title.is_empty() && self.name.is_empty()
    }

    fn validate(&self) -> Result<()> {
        if !self.latitude.trim().is_empty()
            && parse_coordinate(&self.latitude, 90.0, 'N', 'S').is_none()
        {
            return Err(FamError::Validation {
                field: "latitude",
                reason: format!("'{}' is not a valid coordinate", self.latitude),
            });
        }
        if !self.longitude.trim().is_empty()
            && parse_coordinate(&self.longitude, 180.0, 'E', 'W').is_none()
        {
            return Err(FamError::Validation {
                field: "longitude",
                reason: format!("'{}' is not a valid coordinate", self.longitude),
            });
        }
        Ok(())
    }
}

/// A source of information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Storage handle.
    pub handle: Option<Handle>,
    /// Gramps ID.
    pub gramps_id: String,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Publication information.
    pub pubinfo: String,
    /// Abbreviation.
    pub abbrev: String,
    /// Repositories holding this source.
    pub repo_refs: Vec<RepoRef>,
    /// Notes.
    pub note_list: Vec<Handle>,
}

impl PrimaryObject for Source {
    const KIND: ObjectKind = ObjectKind::Source;

    fn handle(&self) -> Option<&Handle> {
        self.handle.as_ref()
    }
    fn set_handle(&mut self, handle: Handle) {
        self.handle = Some(handle);
    }
    fn gramps_id(&self) -> &str {
        &self.gramps_id
    }
    fn set_gramps_id(&mut self, id: String) {
        self.gramps_id = id;
    }

    fn describe(&self) -> String {
        self.title.clone()
    }

    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(FamError::Validation {
                field: "source title",
                reason: "a source needs a title".into(),
            });
        }
        Ok(())
    }

    fn references(&self) -> Vec<(ObjectKind, Handle)> {
        self.repo_refs
            .iter()
            .map(|r| (ObjectKind::Repository, r.repository.clone()))
            .collect()
    }
}

/// Confidence in a citation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    /// Very low.
    VeryLow,
    /// Low.
    Low,
    /// Normal.
    #[default]
    Normal,
    /// High.
    High,
    /// Very high.
    VeryHigh,
}

/// A reference into a source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Storage handle.
    pub handle: Option<Handle>,
    /// Gramps ID.
    pub gramps_id: String,
    /// Cited source.
    pub source_handle: Option<Handle>,
    /// Volume/page.
    pub page: String,
    /// Free-text date.
    pub date: String,
    /// Confidence level.
    pub confidence: Confidence,
    /// Notes.
    pub note_list: Vec<Handle>,
}

impl PrimaryObject for Citation {
    const KIND: ObjectKind = ObjectKind::Citation;

    fn handle(&self) -> Option<&Handle> {
        self.handle.as_ref()
    }
    fn set_handle(&mut self, handle: Handle) {
        self.handle = Some(handle);
    }
    fn gramps_id(&self) -> &str {
        &self.gramps_id
    }
    fn set_gramps_id(&mut self, id: String) {
        self.gramps_id = id;
    }

    fn describe(&self) -> String {
        self.page.clone()
    }

    fn references(&self) -> Vec<(ObjectKind, Handle)> {
        self.source_handle
            .iter()
            .map(|h| (ObjectKind::Source, h.clone()))
            .collect()
    }
}

/// An archive or library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// Storage handle.
    pub handle: Option<Handle>,
    /// Gramps ID.
    pub gramps_id: String,
    /// Name.
    pub name: String,
    /// Repository type, e.g. "Library".
    pub repo_type: String,
    /// Addresses.
    pub addresses: Vec<Address>,
    /// Web addresses.
    pub urls: Vec<String>,
}

impl PrimaryObject for Repository {
    const KIND: ObjectKind = ObjectKind::Repository;

    fn handle(&self) -> Option<&Handle> {
        self.handle.as_ref()
    }
    fn set_handle(&mut self, handle: Handle) {
        self.handle = Some(handle);
    }
    fn gramps_id(&self) -> &str {
        &self.gramps_id
    }
    fn set_gramps_id(&mut self, id: String) {
        self.gramps_id = id;
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    fn is_empty(&self) -> bool {
        self.name.trim().is_empty()
    }
}

/// A media file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Media {
    /// Storage handle.
    pub handle: Option<Handle>,
    /// Gramps ID.
    pub gramps_id: String,
    /// Path to the file.
    pub path: String,
    /// MIME type.
    pub mime: String,
    /// Description.
    pub desc: String,
    /// Free-text date.
    pub date: String,
}

impl PrimaryObject for Media {
    const KIND: ObjectKind = ObjectKind::Media;

    fn handle(&self) -> Option<&Handle> {
        self.handle.as_ref()
    }
    fn set_handle(&mut self, handle: Handle) {
        self.handle = Some(handle);
    }
    fn gramps_id(&self) -> &str {
        &self.gramps_id
    }
    fn set_gramps_id(&mut self, id: String) {
        self.gramps_id = id;
    }

    fn describe(&self) -> String {
        self.desc.clone()
    }

    fn is_empty(&self) -> bool {
        self.path.trim().is_empty()
    }
}

/// Text layout of a note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteFormat {
    /// Reflowed text.
    #[default]
    Flowed,
    /// Whitespace preserved.
    Preformatted,
}

/// Free text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Storage handle.
    pub handle: Option<Handle>,
    /// Gramps ID.
    pub gramps_id: String,
    /// The text.
    pub text: String,
    /// Note type, e.g. "General", "Research".
    pub note_type: String,
    /// Layout.
    pub format: NoteFormat,
}

impl PrimaryObject for Note {
    const KIND: ObjectKind = ObjectKind::Note;

    fn handle(&self) -> Option<&Handle> {
        self.handle.as_ref()
    }
    fn set_handle(&mut self, handle: Handle) {
        self.handle = Some(handle);
    }
    fn gramps_id(&self) -> &str {
        &self.gramps_id
    }
    fn set_gramps_id(&mut self, id: String) {
        self.gramps_id = id;
    }

    fn describe(&self) -> String {
        self.text.chars().take(40).collect()
    }

    fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_empty_without_parents_or_children() {
        let mut family = Family::default();
        assert!(family.is_empty());
        family.add_child(Handle::from("c1"));
        assert!(!family.is_empty());
    }

    #[test]
    fn test_family_parent_cannot_be_child() {
        let mut family = Family {
            father_handle: Some(Handle::from("p1")),
            ..Default::default()
        };
        family.add_child(Handle::from("p1"));
        assert!(matches!(
            family.validate(),
            Err(FamError::Validation { field: "father", .. })
        ));
    }

    #[test]
    fn test_blank_custom_event_type_rejected() {
        let event = Event {
            event_type: EventType::Custom("  ".into()),
            ..Default::default()
        };
        assert!(event.validate().is_err());
        let event = Event {
            event_type: EventType::parse("Graduation"),
            ..Default::default()
        };
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_coordinates() {
        assert_eq!(parse_coordinate("51.5", 90.0, 'N', 'S'), Some(51.5));
        assert_eq!(parse_coordinate("12,25S", 90.0, 'N', 'S'), Some(-12.25));
        assert_eq!(parse_coordinate("4.9 W", 180.0, 'E', 'W'), Some(-4.9));
        assert_eq!(parse_coordinate("91", 90.0, 'N', 'S'), None);
        assert_eq!(parse_coordinate("north", 90.0, 'N', 'S'), None);

        let place = Place {
            title: "Somewhere".into(),
            latitude: "abc".into(),
            ..Default::default()
        };
        assert!(matches!(
            place.validate(),
            Err(FamError::Validation { field: "latitude", .. })
        ));
    }

    #[test]
    fn test_back_reference_helpers_are_idempotent() {
        let mut person = Person::default();
        let fam = Handle::from("f1");
        assert!(person.add_family_handle(&fam));
        assert!(!person.add_family_handle(&fam));
        assert!(person.remove_family_handle(&fam));
        assert!(person.family_list.is_empty());
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(ObjectKind::Person.signal(SignalAction::Update), "person-update");
        assert_eq!(ObjectKind::Family.signal(SignalAction::Delete), "family-delete");
    }
}
