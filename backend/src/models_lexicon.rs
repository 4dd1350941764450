use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::multitext::MultiText;
use crate::properties::{ObjectKind, PropertyBag};

/// Field names with a fixed meaning across the lexicon.
pub mod well_known {
    pub const CITATION: &str = "citation";
    pub const DEFINITION: &str = "definition";
    pub const NOTE: &str = "note";
    pub const PART_OF_SPEECH: &str = "POS";
    pub const SOURCE: &str = "source";
    // The name and case must match the field name used by the editor.
    pub const PICTURE: &str = "Picture";
}

/// Common surface of entries, senses and example sentences.
pub trait LexObject {
    fn kind(&self) -> ObjectKind;
    fn properties(&self) -> &PropertyBag;
    fn properties_mut(&mut self) -> &mut PropertyBag;

    fn as_sense_mut(&mut self) -> Option<&mut LexSense> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexEntry {
    /// The id of the entry in the interchange file, if it had one.
    pub id: String,
    guid: Option<String>,
    creation_time: DateTime<Utc>,
    modification_time: DateTime<Utc>,
    #[serde(skip)]
    modified_time_is_locked: bool,
    pub lexical_form: MultiText,
    pub senses: Vec<LexSense>,
    pub properties: PropertyBag,
    /// Set by the import merger while it builds this entry.
    #[serde(skip)]
    pub(crate) construction_key: Option<u64>,
}

impl Default for LexEntry {
    fn default() -> Self {
        let now = Utc::now();
        LexEntry {
            id: String::new(),
            guid: None,
            creation_time: now,
            modification_time: now,
            modified_time_is_locked: false,
            lexical_form: MultiText::new(),
            senses: Vec::new(),
            properties: PropertyBag::new(),
            construction_key: None,
        }
    }
}

impl LexEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_times(
        id: &str,
        guid: Option<String>,
        creation_time: DateTime<Utc>,
        modification_time: DateTime<Utc>,
    ) -> Self {
        LexEntry {
            id: id.to_string(),
            guid,
            creation_time,
            modification_time,
            ..Default::default()
        }
    }

    pub fn guid(&self) -> Option<&str> {
        self.guid.as_deref()
    }

    /// Returns the stable external id, assigning a fresh one when the entry
    /// has none yet.
    pub fn get_or_create_id(&mut self) -> &str {
        self.guid
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .as_str()
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn modification_time(&self) -> DateTime<Utc> {
        self.modification_time
    }

    pub fn modified_time_is_locked(&self) -> bool {
        self.modified_time_is_locked
    }

    /// While locked, [`LexEntry::something_was_modified`] leaves the
    /// modification time alone.
    pub fn set_modified_time_is_locked(&mut self, locked: bool) {
        self.modified_time_is_locked = locked;
    }

    pub fn something_was_modified(&mut self) {
        if !self.modified_time_is_locked {
            self.modification_time = Utc::now();
        }
    }

    pub fn add_sense(&mut self, sense: LexSense) -> &mut LexSense {
        self.senses.push(sense);
        let i = self.senses.len() - 1;
        &mut self.senses[i]
    }
}

impl LexObject for LexEntry {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Entry
    }

    fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut PropertyBag {
        &mut self.properties
    }
}

/// One meaning of an entry. The id is only unique within its entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexSense {
    pub id: String,
    pub gloss: MultiText,
    pub examples: Vec<LexExampleSentence>,
    pub properties: PropertyBag,
}

impl LexSense {
    pub fn new(id: &str) -> Self {
        LexSense {
            id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn add_example(&mut self, example: LexExampleSentence) -> &mut LexExampleSentence {
        self.examples.push(example);
        let i = self.examples.len() - 1;
        &mut self.examples[i]
    }
}

impl LexObject for LexSense {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Sense
    }

    fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut PropertyBag {
        &mut self.properties
    }

    fn as_sense_mut(&mut self) -> Option<&mut LexSense> {
        Some(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexExampleSentence {
    pub sentence: MultiText,
    pub translation: MultiText,
    pub properties: PropertyBag,
}

impl LexObject for LexExampleSentence {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Example
    }

    fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut PropertyBag {
        &mut self.properties
    }
}
