//! Builds lexicon entries from the events of a LIFT parser.
//!
//! The parser calls one [`LexiconMerger`] operation per element it meets, in
//! document order: `begin_entry`, the entry's fields, each sense with its
//! fields and examples, then `finish_entry`. Nothing is visible in the
//! repository before `finish_entry`.

use std::collections::HashMap;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::app_settings::{LexiconSettings, MergePolicyName};
use crate::db::query::find_entry_by_guid;
use crate::db::{Repository, RepositoryId};
use crate::error::RepositoryError;
use crate::models_lexicon::{well_known, LexEntry, LexExampleSentence, LexObject, LexSense};
use crate::multitext::MultiText;
use crate::properties::{LexRelation, LexRelationCollection, OptionRef, OptionRefCollection, PictureRef, PropertyValue};

// === Event payloads ===

/// Identification and dates of an element, as far as the source gives them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtensibleInfo {
    pub id: String,
    pub guid: Option<String>,
    pub creation_time: Option<DateTime<Utc>>,
    pub modification_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Annotation {
    pub name: String,
    pub writing_system_id: String,
    pub value: String,
}

/// A multi-text as the parser hands it over: plain forms plus annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiftMultiText {
    pub forms: IndexMap<String, String>,
    pub annotations: Vec<Annotation>,
}

impl LiftMultiText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        LiftMultiText {
            forms: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            annotations: Vec::new(),
        }
    }

    pub fn with_annotation(mut self, name: &str, writing_system_id: &str, value: &str) -> Self {
        self.annotations.push(Annotation {
            name: name.to_string(),
            writing_system_id: writing_system_id.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    pub fn prepend(&mut self, writing_system_id: &str, text: &str) {
        let form = self.forms.entry(writing_system_id.to_string()).or_default();
        form.insert_str(0, text);
    }

    pub fn to_multitext(&self) -> MultiText {
        MultiText::from_pairs(self.forms.iter().map(|(ws, text)| (ws.as_str(), text.as_str())))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiftTrait {
    pub name: String,
    pub value: String,
    pub traits: Vec<LiftTrait>,
}

impl LiftTrait {
    pub fn new(name: &str, value: &str) -> Self {
        LiftTrait {
            name: name.to_string(),
            value: value.to_string(),
            traits: Vec::new(),
        }
    }
}

// === Merge policy ===

/// Decides whether an incoming entry replaces one already in the repository.
pub trait EntryMergePolicy: Send {
    fn name(&self) -> &'static str;

    fn find_existing(
        &self,
        repo: &dyn Repository<LexEntry>,
        info: &ExtensibleInfo,
    ) -> Result<Option<RepositoryId>, RepositoryError>;
}

/// Every incoming entry is added as a new record.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysNew;

impl EntryMergePolicy for AlwaysNew {
    fn name(&self) -> &'static str {
        "always-new"
    }

    fn find_existing(
        &self,
        _repo: &dyn Repository<LexEntry>,
        _info: &ExtensibleInfo,
    ) -> Result<Option<RepositoryId>, RepositoryError> {
        Ok(None)
    }
}

/// An incoming entry whose guid (or, without one, its id) matches a stored
/// entry replaces that entry's content under the same identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReuseById;

impl EntryMergePolicy for ReuseById {
    fn name(&self) -> &'static str {
        "reuse-by-id"
    }

    fn find_existing(
        &self,
        repo: &dyn Repository<LexEntry>,
        info: &ExtensibleInfo,
    ) -> Result<Option<RepositoryId>, RepositoryError> {
        match info.guid.as_deref().filter(|g| !g.is_empty()) {
            Some(guid) => find_entry_by_guid(repo, guid),
            None if !info.id.is_empty() => find_entry_by_guid(repo, &info.id),
            None => Ok(None),
        }
    }
}

pub fn merge_policy_from_name(name: MergePolicyName) -> Box<dyn EntryMergePolicy> {
    match name {
        MergePolicyName::AlwaysNew => Box::new(AlwaysNew),
        MergePolicyName::ReuseById => Box::new(ReuseById),
    }
}

// === The merger interface ===

/// The operations a LIFT parser drives, one per element.
pub trait LexiconMerger {
    fn begin_entry(&mut self, info: &ExtensibleInfo) -> LexEntry;
    fn entry_was_deleted(&mut self, info: &ExtensibleInfo, date_deleted: DateTime<Utc>);
    fn begin_sense<'e>(&mut self, entry: &'e mut LexEntry, info: &ExtensibleInfo) -> &'e mut LexSense;
    fn begin_subsense<'s>(&mut self, sense: &'s mut LexSense, info: &ExtensibleInfo) -> Option<&'s mut LexSense>;
    fn begin_example<'s>(&mut self, sense: &'s mut LexSense, info: &ExtensibleInfo) -> &'s mut LexExampleSentence;

    fn merge_lexical_form(&mut self, entry: &mut LexEntry, forms: &LiftMultiText);
    fn merge_citation_form(&mut self, entry: &mut LexEntry, forms: &LiftMultiText);
    fn merge_pronunciation(&mut self, entry: &mut LexEntry, forms: &LiftMultiText);
    fn merge_variant(&mut self, entry: &mut LexEntry, forms: &LiftMultiText);
    fn merge_etymology(&mut self, entry: &mut LexEntry, source: &str, form: &LiftMultiText, gloss: &LiftMultiText);

    fn merge_gloss(&mut self, sense: &mut LexSense, forms: &LiftMultiText);
    fn merge_definition(&mut self, sense: &mut LexSense, forms: &LiftMultiText);
    fn merge_picture(&mut self, sense: &mut LexSense, href: &str, caption: Option<&LiftMultiText>);
    fn merge_reversal(&mut self, sense: &mut LexSense, forms: &LiftMultiText, reversal_type: Option<&str>);

    fn merge_example_sentence(&mut self, example: &mut LexExampleSentence, forms: &LiftMultiText);
    fn merge_translation(&mut self, example: &mut LexExampleSentence, translation_type: Option<&str>, forms: &LiftMultiText);
    fn merge_source(&mut self, example: &mut LexExampleSentence, source: &str);

    fn merge_note(&mut self, record: &mut dyn LexObject, note_type: Option<&str>, contents: &LiftMultiText);
    fn merge_grammatical_info(&mut self, record: &mut dyn LexObject, value: &str, traits: &[LiftTrait]);
    fn merge_field(
        &mut self,
        record: &mut dyn LexObject,
        tag: &str,
        created: Option<DateTime<Utc>>,
        modified: Option<DateTime<Utc>>,
        contents: &LiftMultiText,
    );
    fn merge_field_with_traits(
        &mut self,
        record: &mut dyn LexObject,
        tag: &str,
        created: Option<DateTime<Utc>>,
        modified: Option<DateTime<Utc>>,
        contents: &LiftMultiText,
        traits: &[LiftTrait],
    );
    fn merge_trait(&mut self, record: &mut dyn LexObject, lift_trait: &LiftTrait);
    fn merge_relation(&mut self, record: &mut dyn LexObject, relation_field_id: &str, target_id: &str);

    fn process_range_element(&mut self, range: &str, id: &str, guid: &str, parent: &str, label: &LiftMultiText);
    fn process_field_definition(&mut self, tag: &str, description: &LiftMultiText);

    fn finish_entry(&mut self, entry: &mut LexEntry) -> Result<RepositoryId, RepositoryError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub entries_begun: usize,
    pub entries_committed: usize,
    pub fields_skipped: usize,
}

// === LiftMerger ===

/// Merges parser events into a repository of entries.
pub struct LiftMerger<'a> {
    repository: &'a mut dyn Repository<LexEntry>,
    policy: Box<dyn EntryMergePolicy>,
    expected_option_traits: Vec<String>,
    expected_option_collection_traits: Vec<String>,
    multitext_separator: String,
    note_separator: String,
    next_construction_key: u64,
    // construction key -> identity, for entries already committed
    committed: HashMap<u64, RepositoryId>,
    // construction key -> identity of the stored entry it replaces
    replacing: HashMap<u64, RepositoryId>,
    stats: MergeStats,
}

impl<'a> LiftMerger<'a> {
    pub fn new(repository: &'a mut dyn Repository<LexEntry>, settings: &LexiconSettings) -> Self {
        let policy = merge_policy_from_name(settings.merge_policy);
        Self::with_policy(repository, settings, policy)
    }

    pub fn with_policy(
        repository: &'a mut dyn Repository<LexEntry>,
        settings: &LexiconSettings,
        policy: Box<dyn EntryMergePolicy>,
    ) -> Self {
        LiftMerger {
            repository,
            policy,
            expected_option_traits: settings.expected_option_traits.clone(),
            expected_option_collection_traits: settings.expected_option_collection_traits.clone(),
            multitext_separator: settings.multitext_separator.clone(),
            note_separator: settings.note_separator.clone(),
            next_construction_key: 1,
            committed: HashMap::new(),
            replacing: HashMap::new(),
            stats: MergeStats::default(),
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    fn construction_key(&mut self) -> u64 {
        let key = self.next_construction_key;
        self.next_construction_key += 1;
        key
    }

    fn skip(&mut self, what: &str, reason: impl Display) {
        self.stats.fields_skipped += 1;
        tracing::warn!("Skipping {}: {}", what, reason);
    }

    /// Applies `flag` annotations to the starred bit of the destination.
    fn add_annotations(&mut self, forms: &LiftMultiText, text: &mut MultiText) {
        for annotation in &forms.annotations {
            if annotation.name != "flag" {
                tracing::debug!("Dropping annotation '{}'", annotation.name);
                continue;
            }
            match annotation.value.trim().parse::<i64>() {
                Ok(n) => text.set_annotation_of_alternative_is_starred(&annotation.writing_system_id, n > 0),
                Err(e) => self.skip("flag annotation", format!("'{}': {}", annotation.value, e)),
            }
        }
    }

    fn merge_with_append(&mut self, text: &mut MultiText, forms: &LiftMultiText, separator: &str) {
        text.merge_in_with_append(&forms.to_multitext(), separator);
        self.add_annotations(forms, text);
    }

    fn add_or_append_multitext_property(
        &mut self,
        record: &mut dyn LexObject,
        forms: &LiftMultiText,
        name: &str,
        separator: &str,
    ) {
        match record.properties_mut().get_or_create_property::<MultiText>(name) {
            Ok(text) => self.merge_with_append(text, forms, separator),
            Err(e) => self.skip(name, e),
        }
    }
}

impl LexiconMerger for LiftMerger<'_> {
    fn begin_entry(&mut self, info: &ExtensibleInfo) -> LexEntry {
        self.stats.entries_begun += 1;
        let now = Utc::now();
        let key = self.construction_key();

        let existing = match self.policy.find_existing(&*self.repository, info) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Entry lookup failed, adding '{}' as new: {}", info.id, e);
                None
            }
        };

        let stored = existing.and_then(|id| {
            self.repository
                .get_item(id)
                .ok()
                .map(|e| (id, e.guid().map(str::to_string), e.creation_time()))
        });

        let mut entry = match stored {
            Some((id, guid, creation_time)) => {
                self.replacing.insert(key, id);
                LexEntry::with_times(
                    &info.id,
                    guid.or_else(|| info.guid.clone()),
                    creation_time,
                    info.modification_time.unwrap_or(now),
                )
            }
            None => LexEntry::with_times(
                &info.id,
                info.guid.clone().filter(|g| !g.is_empty()),
                info.creation_time.unwrap_or(now),
                info.modification_time.unwrap_or(now),
            ),
        };

        entry.construction_key = Some(key);
        entry.set_modified_time_is_locked(true);
        entry
    }

    fn entry_was_deleted(&mut self, info: &ExtensibleInfo, date_deleted: DateTime<Utc>) {
        // The store always reflects the last full import.
        tracing::debug!("Entry '{}' was deleted at {}, not importing it", info.id, date_deleted);
    }

    fn begin_sense<'e>(&mut self, entry: &'e mut LexEntry, info: &ExtensibleInfo) -> &'e mut LexSense {
        entry.add_sense(LexSense::new(&info.id))
    }

    fn begin_subsense<'s>(&mut self, _sense: &'s mut LexSense, info: &ExtensibleInfo) -> Option<&'s mut LexSense> {
        tracing::debug!("Dropping subsense '{}'", info.id);
        None
    }

    fn begin_example<'s>(&mut self, sense: &'s mut LexSense, _info: &ExtensibleInfo) -> &'s mut LexExampleSentence {
        sense.add_example(LexExampleSentence::default())
    }

    fn merge_lexical_form(&mut self, entry: &mut LexEntry, forms: &LiftMultiText) {
        let separator = self.multitext_separator.clone();
        self.merge_with_append(&mut entry.lexical_form, forms, &separator);
    }

    fn merge_citation_form(&mut self, entry: &mut LexEntry, forms: &LiftMultiText) {
        let separator = self.multitext_separator.clone();
        self.add_or_append_multitext_property(entry, forms, well_known::CITATION, &separator);
    }

    fn merge_pronunciation(&mut self, _entry: &mut LexEntry, _forms: &LiftMultiText) {}

    fn merge_variant(&mut self, _entry: &mut LexEntry, _forms: &LiftMultiText) {}

    fn merge_etymology(&mut self, _entry: &mut LexEntry, _source: &str, _form: &LiftMultiText, _gloss: &LiftMultiText) {}

    fn merge_gloss(&mut self, sense: &mut LexSense, forms: &LiftMultiText) {
        let separator = self.multitext_separator.clone();
        self.merge_with_append(&mut sense.gloss, forms, &separator);
    }

    fn merge_definition(&mut self, sense: &mut LexSense, forms: &LiftMultiText) {
        let separator = self.multitext_separator.clone();
        self.add_or_append_multitext_property(sense, forms, well_known::DEFINITION, &separator);
    }

    /// One picture per sense; a second call overwrites the first.
    fn merge_picture(&mut self, sense: &mut LexSense, href: &str, caption: Option<&LiftMultiText>) {
        match sense.properties.get_or_create_property::<PictureRef>(well_known::PICTURE) {
            Ok(picture) => {
                picture.value = href.to_string();
                if let Some(caption) = caption {
                    picture.caption = Some(caption.to_multitext());
                }
            }
            Err(e) => self.skip(well_known::PICTURE, e),
        }
    }

    fn merge_reversal(&mut self, _sense: &mut LexSense, _forms: &LiftMultiText, _reversal_type: Option<&str>) {}

    fn merge_example_sentence(&mut self, example: &mut LexExampleSentence, forms: &LiftMultiText) {
        let separator = self.multitext_separator.clone();
        self.merge_with_append(&mut example.sentence, forms, &separator);
    }

    fn merge_translation(&mut self, example: &mut LexExampleSentence, _translation_type: Option<&str>, forms: &LiftMultiText) {
        let separator = self.multitext_separator.clone();
        self.merge_with_append(&mut example.translation, forms, &separator);
    }

    fn merge_source(&mut self, example: &mut LexExampleSentence, source: &str) {
        match example.properties.get_or_create_property::<OptionRef>(well_known::SOURCE) {
            Ok(option) => option.value = source.to_string(),
            Err(e) => self.skip(well_known::SOURCE, e),
        }
    }

    fn merge_note(&mut self, record: &mut dyn LexObject, note_type: Option<&str>, contents: &LiftMultiText) {
        let separator = self.note_separator.clone();
        match note_type.filter(|t| !t.is_empty()) {
            Some(t) => {
                let mut typed = contents.clone();
                let prefix = format!("({}) ", t);
                let writing_systems: Vec<String> = typed.forms.keys().cloned().collect();
                for ws in writing_systems {
                    typed.prepend(&ws, &prefix);
                }
                self.add_or_append_multitext_property(record, &typed, well_known::NOTE, &separator);
            }
            None => self.add_or_append_multitext_property(record, contents, well_known::NOTE, &separator),
        }
    }

    fn merge_grammatical_info(&mut self, record: &mut dyn LexObject, value: &str, traits: &[LiftTrait]) {
        let Some(sense) = record.as_sense_mut() else {
            return;
        };

        let mut starred = false;
        for t in traits {
            if t.name != "flag" {
                tracing::debug!("Dropping grammatical info trait '{}'", t.name);
                continue;
            }
            match t.value.trim().parse::<i64>() {
                Ok(n) => starred |= n > 0,
                Err(e) => self.skip("grammatical info flag", format!("'{}': {}", t.value, e)),
            }
        }

        match sense.properties.get_or_create_property::<OptionRef>(well_known::PART_OF_SPEECH) {
            Ok(option) => {
                option.value = value.to_string();
                if starred {
                    option.starred = true;
                }
            }
            Err(e) => self.skip(well_known::PART_OF_SPEECH, e),
        }
    }

    fn merge_field(
        &mut self,
        record: &mut dyn LexObject,
        tag: &str,
        _created: Option<DateTime<Utc>>,
        _modified: Option<DateTime<Utc>>,
        contents: &LiftMultiText,
    ) {
        record
            .properties_mut()
            .add(tag, PropertyValue::MultiText(contents.to_multitext()));
    }

    fn merge_field_with_traits(
        &mut self,
        _record: &mut dyn LexObject,
        tag: &str,
        _created: Option<DateTime<Utc>>,
        _modified: Option<DateTime<Utc>>,
        _contents: &LiftMultiText,
        _traits: &[LiftTrait],
    ) {
        tracing::debug!("Dropping field '{}' with traits", tag);
    }

    fn merge_trait(&mut self, record: &mut dyn LexObject, lift_trait: &LiftTrait) {
        let name = lift_trait.name.as_str();
        if name.is_empty() {
            self.skip("trait", "empty trait name");
            return;
        }

        let properties = record.properties_mut();
        let result = if self.expected_option_traits.iter().any(|t| t == name) {
            properties
                .get_or_create_property::<OptionRef>(name)
                .map(|option| option.value = lift_trait.value.clone())
        } else if name.starts_with("flag_") {
            properties.set_flag(name)
        } else {
            if !self.expected_option_collection_traits.iter().any(|t| t == name) {
                tracing::debug!("Unknown trait '{}', collecting its values", name);
            }
            properties
                .get_or_create_property::<OptionRefCollection>(name)
                .map(|collection| collection.add(lift_trait.value.as_str()))
        };

        if let Err(e) = result {
            self.skip(name, e);
        }
    }

    fn merge_relation(&mut self, record: &mut dyn LexObject, relation_field_id: &str, target_id: &str) {
        if relation_field_id.is_empty() {
            self.skip("relation", "empty relation field id");
            return;
        }

        let owner = record.kind();
        match record
            .properties_mut()
            .get_or_create_property::<LexRelationCollection>(relation_field_id)
        {
            Ok(collection) => collection.relations.push(LexRelation {
                field_id: relation_field_id.to_string(),
                target_id: target_id.to_string(),
                owner,
            }),
            Err(e) => self.skip(relation_field_id, e),
        }
    }

    fn process_range_element(&mut self, _range: &str, _id: &str, _guid: &str, _parent: &str, _label: &LiftMultiText) {}

    fn process_field_definition(&mut self, _tag: &str, _description: &LiftMultiText) {}

    /// Commits the entry. Finishing the same constructed entry again writes
    /// it back under the identity it got the first time.
    fn finish_entry(&mut self, entry: &mut LexEntry) -> Result<RepositoryId, RepositoryError> {
        entry.get_or_create_id();
        entry.set_modified_time_is_locked(false);

        let key = match entry.construction_key {
            Some(k) => k,
            None => {
                let k = self.construction_key();
                entry.construction_key = Some(k);
                k
            }
        };

        let target = match self.committed.get(&key) {
            Some(id) => Some(*id),
            None => {
                let replaced = self.replacing.remove(&key);
                if replaced.is_some() {
                    self.stats.entries_committed += 1;
                }
                replaced
            }
        };

        if let Some(id) = target {
            if self.repository.contains_id(id)? {
                *self.repository.get_item_mut(id)? = entry.clone();
                self.repository.save_item(id)?;
                self.committed.insert(key, id);
                return Ok(id);
            }
        }

        let (id, slot) = self.repository.create_item()?;
        *slot = entry.clone();
        self.repository.save_item(id)?;
        if target.is_none() {
            self.stats.entries_committed += 1;
        }
        self.committed.insert(key, id);
        Ok(id)
    }
}
