//! Imports parsed LIFT records into a repository.
//!
//! A [`LiftEntryRecord`] is one `<entry>` as the parser delivered it. Records
//! are replayed against a [`LexiconMerger`] in document order, one entry at a
//! time, while an [`ImportProgress`] reports to the foreground.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app_settings::LexiconSettings;
use crate::db::{DatabaseHandle, Repository, RepositoryId};
use crate::error::RepositoryError;
use crate::lift_merger::{ExtensibleInfo, LexiconMerger, LiftMerger, LiftMultiText, LiftTrait};
use crate::models_lexicon::{LexEntry, LexObject, LexSense};

// === Parsed records ===

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiftNoteRecord {
    #[serde(rename = "type")]
    pub note_type: Option<String>,
    pub contents: LiftMultiText,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiftFieldRecord {
    pub tag: String,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub contents: LiftMultiText,
    pub traits: Vec<LiftTrait>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiftRelationRecord {
    #[serde(rename = "type")]
    pub field_id: String,
    #[serde(rename = "ref")]
    pub target_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiftGrammaticalInfo {
    pub value: String,
    pub traits: Vec<LiftTrait>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiftPictureRecord {
    pub href: String,
    pub caption: Option<LiftMultiText>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiftTranslationRecord {
    #[serde(rename = "type")]
    pub translation_type: Option<String>,
    pub contents: LiftMultiText,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiftExampleRecord {
    pub source: Option<String>,
    pub sentence: LiftMultiText,
    pub translations: Vec<LiftTranslationRecord>,
    pub notes: Vec<LiftNoteRecord>,
    pub traits: Vec<LiftTrait>,
    pub fields: Vec<LiftFieldRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiftSenseRecord {
    pub info: ExtensibleInfo,
    pub grammatical_info: Option<LiftGrammaticalInfo>,
    pub gloss: LiftMultiText,
    pub definition: LiftMultiText,
    pub picture: Option<LiftPictureRecord>,
    pub notes: Vec<LiftNoteRecord>,
    pub traits: Vec<LiftTrait>,
    pub fields: Vec<LiftFieldRecord>,
    pub relations: Vec<LiftRelationRecord>,
    pub reversals: Vec<LiftMultiText>,
    pub examples: Vec<LiftExampleRecord>,
    pub subsenses: Vec<LiftSenseRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiftEntryRecord {
    pub info: ExtensibleInfo,
    /// Set for entries the source marks as deleted.
    pub date_deleted: Option<DateTime<Utc>>,
    pub lexical_unit: LiftMultiText,
    pub citation: LiftMultiText,
    pub pronunciations: Vec<LiftMultiText>,
    pub variants: Vec<LiftMultiText>,
    pub notes: Vec<LiftNoteRecord>,
    pub traits: Vec<LiftTrait>,
    pub fields: Vec<LiftFieldRecord>,
    pub relations: Vec<LiftRelationRecord>,
    pub senses: Vec<LiftSenseRecord>,
}

pub fn read_lift_records(path: &Path) -> Result<Vec<LiftEntryRecord>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Can't read LIFT records: {}", path.display()))?;
    let records: Vec<LiftEntryRecord> = serde_json::from_str(&text)
        .with_context(|| format!("Can't parse LIFT records: {}", path.display()))?;
    Ok(records)
}

// === Event replay ===

fn drive_common<M: LexiconMerger + ?Sized>(
    merger: &mut M,
    record: &mut dyn LexObject,
    notes: &[LiftNoteRecord],
    fields: &[LiftFieldRecord],
    traits: &[LiftTrait],
) {
    for note in notes {
        merger.merge_note(record, note.note_type.as_deref(), &note.contents);
    }
    for field in fields {
        if field.traits.is_empty() {
            merger.merge_field(record, &field.tag, field.created, field.modified, &field.contents);
        } else {
            merger.merge_field_with_traits(record, &field.tag, field.created, field.modified, &field.contents, &field.traits);
        }
    }
    for t in traits {
        merger.merge_trait(record, t);
    }
}

fn drive_sense_body<M: LexiconMerger + ?Sized>(merger: &mut M, sense: &mut LexSense, record: &LiftSenseRecord) {
    if let Some(info) = &record.grammatical_info {
        merger.merge_grammatical_info(sense, &info.value, &info.traits);
    }
    if !record.gloss.is_empty() {
        merger.merge_gloss(sense, &record.gloss);
    }
    if !record.definition.is_empty() {
        merger.merge_definition(sense, &record.definition);
    }
    if let Some(picture) = &record.picture {
        merger.merge_picture(sense, &picture.href, picture.caption.as_ref());
    }
    drive_common(merger, sense, &record.notes, &record.fields, &record.traits);
    for relation in &record.relations {
        merger.merge_relation(sense, &relation.field_id, &relation.target_id);
    }
    for reversal in &record.reversals {
        merger.merge_reversal(sense, reversal, None);
    }

    for example_record in &record.examples {
        let example = merger.begin_example(sense, &ExtensibleInfo::default());
        if let Some(source) = &example_record.source {
            merger.merge_source(example, source);
        }
        if !example_record.sentence.is_empty() {
            merger.merge_example_sentence(example, &example_record.sentence);
        }
        for translation in &example_record.translations {
            merger.merge_translation(example, translation.translation_type.as_deref(), &translation.contents);
        }
        drive_common(merger, example, &example_record.notes, &example_record.fields, &example_record.traits);
    }

    for subsense_record in &record.subsenses {
        if let Some(subsense) = merger.begin_subsense(sense, &subsense_record.info) {
            drive_sense_body(merger, subsense, subsense_record);
        }
    }
}

/// Replays one record against the merger in parser order. Returns the
/// identity it was committed under, or `None` for a deleted entry.
pub fn drive_entry<M: LexiconMerger + ?Sized>(
    merger: &mut M,
    record: &LiftEntryRecord,
) -> Result<Option<RepositoryId>, RepositoryError> {
    if let Some(date_deleted) = record.date_deleted {
        merger.entry_was_deleted(&record.info, date_deleted);
        return Ok(None);
    }

    let mut entry = merger.begin_entry(&record.info);
    if !record.lexical_unit.is_empty() {
        merger.merge_lexical_form(&mut entry, &record.lexical_unit);
    }
    if !record.citation.is_empty() {
        merger.merge_citation_form(&mut entry, &record.citation);
    }
    for pronunciation in &record.pronunciations {
        merger.merge_pronunciation(&mut entry, pronunciation);
    }
    for variant in &record.variants {
        merger.merge_variant(&mut entry, variant);
    }
    drive_common(merger, &mut entry, &record.notes, &record.fields, &record.traits);
    for relation in &record.relations {
        merger.merge_relation(&mut entry, &relation.field_id, &relation.target_id);
    }

    for sense_record in &record.senses {
        let sense = merger.begin_sense(&mut entry, &sense_record.info);
        drive_sense_body(merger, sense, sense_record);
    }

    merger.finish_entry(&mut entry).map(Some)
}

// === Progress ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportState {
    Idle,
    Running,
    Finished,
    Cancelled,
    Failed,
}

impl ImportState {
    fn from_u8(n: u8) -> Self {
        match n {
            1 => ImportState::Running,
            2 => ImportState::Finished,
            3 => ImportState::Cancelled,
            4 => ImportState::Failed,
            _ => ImportState::Idle,
        }
    }

    fn as_u8(&self) -> u8 {
        match self {
            ImportState::Idle => 0,
            ImportState::Running => 1,
            ImportState::Finished => 2,
            ImportState::Cancelled => 3,
            ImportState::Failed => 4,
        }
    }
}

/// Status and cancellation shared between an import worker and the
/// foreground. It never touches the records themselves.
#[derive(Debug, Default)]
pub struct ImportProgress {
    total: AtomicUsize,
    processed: AtomicUsize,
    cancelled: AtomicBool,
    state: AtomicU8,
}

impl ImportProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Acquire)
    }

    /// Between 0.0 and 1.0.
    pub fn fraction(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.processed() as f64 / total as f64,
        }
    }

    pub fn state(&self) -> ImportState {
        ImportState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The worker stops before the next entry.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn start(&self, total: usize) {
        self.total.store(total, Ordering::Release);
        self.processed.store(0, Ordering::Release);
        self.set_state(ImportState::Running);
    }

    fn advance(&self) {
        self.processed.fetch_add(1, Ordering::AcqRel);
    }

    fn set_state(&self, state: ImportState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub entries_read: usize,
    pub entries_committed: usize,
    pub entries_deleted: usize,
    pub fields_skipped: usize,
    pub elapsed: Duration,
}

enum PassOutcome {
    Done(ImportSummary),
    Cancelled,
}

/// Imports all records in one pass, holding the repository's write lock
/// throughout. A cancelled pass returns an error and leaves whatever was
/// committed so far.
pub fn import_lift_records<R>(
    handle: &DatabaseHandle<R>,
    records: &[LiftEntryRecord],
    settings: &LexiconSettings,
    progress: &ImportProgress,
) -> Result<ImportSummary>
where
    R: Repository<LexEntry>,
{
    let start = Instant::now();
    progress.start(records.len());

    let outcome = handle.do_write(|repo| {
        let mut merger = LiftMerger::new(repo, settings);
        tracing::info!("Importing {} LIFT entries, policy {}", records.len(), merger.policy_name());
        let mut deleted = 0;

        for record in records {
            if progress.is_cancelled() {
                return Ok(PassOutcome::Cancelled);
            }
            if drive_entry(&mut merger, record)?.is_none() {
                deleted += 1;
            }
            progress.advance();
        }

        let stats = merger.stats();
        Ok(PassOutcome::Done(ImportSummary {
            entries_read: records.len(),
            entries_committed: stats.entries_committed,
            entries_deleted: deleted,
            fields_skipped: stats.fields_skipped,
            elapsed: start.elapsed(),
        }))
    });

    match outcome {
        Ok(PassOutcome::Done(summary)) => {
            progress.set_state(ImportState::Finished);
            tracing::info!(
                "Imported {} entries, {} deleted, {} fields skipped",
                summary.entries_committed,
                summary.entries_deleted,
                summary.fields_skipped
            );
            Ok(summary)
        }
        Ok(PassOutcome::Cancelled) => {
            progress.set_state(ImportState::Cancelled);
            tracing::warn!("Import cancelled after {} of {} entries", progress.processed(), progress.total());
            Err(anyhow!(
                "Import was cancelled after {} of {} entries",
                progress.processed(),
                progress.total()
            ))
        }
        Err(e) => {
            progress.set_state(ImportState::Failed);
            Err(e.context("LIFT import failed"))
        }
    }
}

/// Runs [`import_lift_records`] on a worker thread.
pub fn spawn_import<R>(
    handle: Arc<DatabaseHandle<R>>,
    records: Vec<LiftEntryRecord>,
    settings: LexiconSettings,
    progress: Arc<ImportProgress>,
) -> JoinHandle<Result<ImportSummary>>
where
    R: Repository<LexEntry> + Send + 'static,
{
    thread::spawn(move || import_lift_records(&handle, &records, &settings, &progress))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryRepository;
    use crate::models_lexicon::well_known;
    use crate::multitext::MultiText;
    use crate::properties::OptionRef;

    const RECORDS_JSON: &str = r#"[
        {
            "info": { "id": "dog_1", "guid": "0ae89610-fc01-4bfd-a0d6-1125b7281dd1" },
            "lexical_unit": { "forms": { "de": "Hund" } },
            "traits": [ { "name": "morph-type", "value": "stem" } ],
            "senses": [
                {
                    "info": { "id": "s1" },
                    "grammatical_info": { "value": "Noun" },
                    "gloss": { "forms": { "en": "dog" } },
                    "examples": [
                        {
                            "source": "fieldnotes",
                            "sentence": { "forms": { "de": "Der Hund bellt." } },
                            "translations": [ { "type": "free", "contents": { "forms": { "en": "The dog barks." } } } ]
                        }
                    ]
                }
            ]
        },
        {
            "info": { "id": "cat_1" },
            "date_deleted": "2008-01-01T00:00:00Z"
        }
    ]"#;

    #[test]
    fn test_read_and_import_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        fs::write(&path, RECORDS_JSON).unwrap();

        let records = read_lift_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].info.id, "cat_1");

        let handle = DatabaseHandle::new(MemoryRepository::<LexEntry>::new());
        let progress = ImportProgress::new();
        let summary = import_lift_records(&handle, &records, &LexiconSettings::default(), &progress).unwrap();

        assert_eq!(summary.entries_read, 2);
        assert_eq!(summary.entries_committed, 1);
        assert_eq!(summary.entries_deleted, 1);
        assert_eq!(progress.state(), ImportState::Finished);
        assert_eq!(progress.fraction(), 1.0);

        handle
            .do_read(|repo| {
                let ids = repo.get_all_items()?;
                assert_eq!(ids.len(), 1);
                let entry = repo.get_item(ids[0])?;
                assert_eq!(entry.guid(), Some("0ae89610-fc01-4bfd-a0d6-1125b7281dd1"));
                assert_eq!(entry.lexical_form.get_exact_alternative("de"), "Hund");

                let morph = entry.properties.get_property::<OptionRef>("morph-type").unwrap().unwrap();
                assert_eq!(morph.value, "stem");

                let sense = &entry.senses[0];
                assert_eq!(sense.gloss.get_exact_alternative("en"), "dog");
                let pos = sense.properties.get_property::<OptionRef>(well_known::PART_OF_SPEECH).unwrap().unwrap();
                assert_eq!(pos.value, "Noun");

                let example = &sense.examples[0];
                assert_eq!(example.translation.get_exact_alternative("en"), "The dog barks.");
                assert!(example.properties.get_property::<OptionRef>(well_known::SOURCE).unwrap().is_some());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_misnamed_keys_fail_to_read() {
        let dir = tempfile::tempdir().unwrap();

        // Forms given directly, without the "forms" wrapper
        let path = dir.path().join("translation.json");
        fs::write(
            &path,
            r#"[ { "senses": [ { "examples": [ { "translations": [ { "contents": { "en": "The dog barks." } } ] } ] } ] } ]"#,
        )
        .unwrap();
        assert!(read_lift_records(&path).is_err());

        let path = dir.path().join("entry.json");
        fs::write(&path, r#"[ { "lexical_form": { "forms": { "en": "dog" } } } ]"#).unwrap();
        assert!(read_lift_records(&path).is_err());

        let path = dir.path().join("info.json");
        fs::write(&path, r#"[ { "info": { "id": "dog_1", "uuid": "x" } } ]"#).unwrap();
        assert!(read_lift_records(&path).is_err());
    }

    #[test]
    fn test_cancelled_import_fails() {
        let records = vec![LiftEntryRecord::default(); 3];
        let handle = DatabaseHandle::new(MemoryRepository::<LexEntry>::new());
        let progress = ImportProgress::new();
        progress.cancel();

        let result = import_lift_records(&handle, &records, &LexiconSettings::default(), &progress);
        assert!(result.is_err());
        assert_eq!(progress.state(), ImportState::Cancelled);
        assert_eq!(progress.processed(), 0);
        assert_eq!(handle.do_read(|repo| repo.count_all_items()).unwrap(), 0);
    }

    #[test]
    fn test_spawned_import() {
        let records: Vec<LiftEntryRecord> = (0..10)
            .map(|i| LiftEntryRecord {
                info: ExtensibleInfo { id: format!("e{}", i), ..Default::default() },
                lexical_unit: LiftMultiText::from_pairs([("en", format!("word{}", i))]),
                ..Default::default()
            })
            .collect();

        let handle = Arc::new(DatabaseHandle::new(MemoryRepository::<LexEntry>::new()));
        let progress = Arc::new(ImportProgress::new());
        let worker = spawn_import(handle.clone(), records, LexiconSettings::default(), progress.clone());

        let summary = worker.join().unwrap().unwrap();
        assert_eq!(summary.entries_committed, 10);
        assert_eq!(progress.processed(), 10);
        assert_eq!(handle.do_read(|repo| repo.count_all_items()).unwrap(), 10);
    }

    #[test]
    fn test_subsenses_are_dropped() {
        let record = LiftEntryRecord {
            senses: vec![LiftSenseRecord {
                gloss: LiftMultiText::from_pairs([("en", "run")]),
                subsenses: vec![LiftSenseRecord {
                    gloss: LiftMultiText::from_pairs([("en", "jog")]),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };

        let handle = DatabaseHandle::new(MemoryRepository::<LexEntry>::new());
        import_lift_records(&handle, &[record], &LexiconSettings::default(), &ImportProgress::new()).unwrap();
        handle
            .do_read(|repo| {
                let entry = repo.get_item(repo.get_all_items()?[0])?;
                assert_eq!(entry.senses.len(), 1);
                assert_eq!(entry.senses[0].gloss, MultiText::from_pairs([("en", "run")]));
                Ok(())
            })
            .unwrap();
    }
}
