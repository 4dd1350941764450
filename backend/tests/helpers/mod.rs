use dotenvy::dotenv;

use lexicon_backend::app_settings::LexiconSettings;
use lexicon_backend::db::{DatabaseHandle, MemoryRepository};
use lexicon_backend::lift_import::{import_lift_records, ImportProgress, LiftEntryRecord, LiftSenseRecord};
use lexicon_backend::lift_merger::{ExtensibleInfo, LiftMultiText};
use lexicon_backend::models_lexicon::LexEntry;

pub type LexiconHandle = DatabaseHandle<MemoryRepository<LexEntry>>;

pub fn test_setup() {
    dotenv().ok();
}

/// An entry with one sense per gloss, all in `en`.
#[allow(dead_code)]
pub fn entry_record(id: &str, form: &str, glosses: &[&str]) -> LiftEntryRecord {
    entry_record_in("en", id, form, glosses)
}

/// Same as [`entry_record`], with the form and glosses in writing system `ws`.
#[allow(dead_code)]
pub fn entry_record_in(ws: &str, id: &str, form: &str, glosses: &[&str]) -> LiftEntryRecord {
    LiftEntryRecord {
        info: ExtensibleInfo { id: id.to_string(), ..Default::default() },
        lexical_unit: LiftMultiText::from_pairs([(ws, form)]),
        senses: glosses
            .iter()
            .enumerate()
            .map(|(i, g)| LiftSenseRecord {
                info: ExtensibleInfo { id: format!("{}_s{}", id, i), ..Default::default() },
                gloss: LiftMultiText::from_pairs([(ws, *g)]),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn import_with_settings(records: &[LiftEntryRecord], settings: &LexiconSettings) -> LexiconHandle {
    let handle = DatabaseHandle::new(MemoryRepository::<LexEntry>::new());
    import_lift_records(&handle, records, settings, &ImportProgress::new()).expect("Import failed");
    handle
}

#[allow(dead_code)]
pub fn import(records: &[LiftEntryRecord]) -> LexiconHandle {
    import_with_settings(records, &LexiconSettings::default())
}
