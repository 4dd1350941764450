use lexicon_backend::app_settings::{LexiconSettings, MergePolicyName};
use lexicon_backend::db::query::{resolve_relation, GlossQuery};
use lexicon_backend::db::{DatabaseHandle, MemoryRepository, Repository};
use lexicon_backend::lift_import::{drive_entry, LiftRelationRecord};
use lexicon_backend::lift_merger::{ExtensibleInfo, LexiconMerger, LiftMerger, LiftMultiText, LiftTrait};
use lexicon_backend::models_lexicon::LexEntry;
use lexicon_backend::properties::{LexRelationCollection, OptionRefCollection};

mod helpers;
use helpers as h;

#[test]
fn test_repeated_import_appends_by_default() {
    h::test_setup();
    let mut record = h::entry_record("dog_1", "dog", &["dog"]);
    record.info.guid = Some("guid-dog".to_string());

    let handle = h::import(&[record.clone(), record]);
    assert_eq!(handle.do_read(|repo| repo.count_all_items()).unwrap(), 2);
}

#[test]
fn test_repeated_import_reuses_by_guid() {
    h::test_setup();
    let settings = LexiconSettings {
        merge_policy: MergePolicyName::ReuseById,
        ..Default::default()
    };

    let mut first = h::entry_record("dog_1", "dgo", &["dog"]);
    first.info.guid = Some("guid-dog".to_string());
    let mut second = h::entry_record("dog_1", "dog", &["dog", "hound"]);
    second.info.guid = Some("guid-dog".to_string());

    let handle = h::import_with_settings(&[first, second], &settings);
    handle
        .do_read(|repo| {
            let ids = repo.get_all_items()?;
            assert_eq!(ids.len(), 1);
            let entry = repo.get_item(ids[0])?;
            assert_eq!(entry.lexical_form.get_exact_alternative("en"), "dog");
            assert_eq!(entry.senses.len(), 2);
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_relations_resolve_after_import() {
    h::test_setup();
    let mut run = h::entry_record("run_1", "run", &["run"]);
    run.relations.push(LiftRelationRecord {
        field_id: "synonym".to_string(),
        target_id: "sprint_1".to_string(),
    });
    run.relations.push(LiftRelationRecord {
        field_id: "antonym".to_string(),
        target_id: "walk_1".to_string(),
    });
    let sprint = h::entry_record("sprint_1", "sprint", &["sprint"]);

    let handle = h::import(&[run, sprint]);
    handle
        .do_read(|repo| {
            let ids = repo.get_all_items()?;
            let run = repo.get_item(ids[0])?;

            let synonyms = run
                .properties
                .get_property::<LexRelationCollection>("synonym")
                .unwrap()
                .unwrap();
            assert_eq!(resolve_relation(repo, &synonyms.relations[0])?, Some(ids[1]));

            let antonyms = run
                .properties
                .get_property::<LexRelationCollection>("antonym")
                .unwrap()
                .unwrap();
            assert_eq!(resolve_relation(repo, &antonyms.relations[0])?, None);
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_gloss_query_over_imported_entries() {
    h::test_setup();
    let handle = h::import(&[
        h::entry_record("run_1", "run", &["run; sprint", "flee"]),
        h::entry_record("walk_1", "walk", &["walk"]),
    ]);

    handle
        .do_read(|repo| {
            let mut results = repo.get_items_matching(&GlossQuery { writing_system_id: "en".to_string() })?;
            assert_eq!(results.len(), 4);
            results.sort_by_field("gloss", |a, b| a.cmp(b));
            let glosses: Vec<&str> = results.iter().filter_map(|t| t.get("gloss")).collect();
            assert_eq!(glosses, vec!["flee", "run", "sprint", "walk"]);
            assert_eq!(results.iter().next().and_then(|t| t.get("sense_id")), Some("run_1_s1"));
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_unknown_traits_accumulate_across_senses_and_entries() {
    h::test_setup();
    let mut record = h::entry_record("run_1", "run", &[]);
    record.traits = vec![
        LiftTrait::new("semantic-domain-ddp4", "7.2.1 Walk"),
        LiftTrait::new("semantic-domain-ddp4", "7.2.2 Run"),
        LiftTrait::new("flag_needs-review", "1"),
        LiftTrait::new("", "ignored"),
    ];

    let handle = h::import(&[record]);
    handle
        .do_read(|repo| {
            let entry = repo.get_item(repo.get_all_items()?[0])?;
            let domains = entry
                .properties
                .get_property::<OptionRefCollection>("semantic-domain-ddp4")
                .unwrap()
                .unwrap();
            assert_eq!(domains.len(), 2);
            assert!(entry.properties.get_flag("flag_needs-review"));
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_driving_the_same_entry_twice() {
    h::test_setup();
    let handle = DatabaseHandle::new(MemoryRepository::<LexEntry>::new());
    let settings = LexiconSettings::default();

    handle
        .do_write(|repo| {
            let mut merger = LiftMerger::new(repo, &settings);
            let record = h::entry_record("dog_1", "dog", &["dog"]);
            let first = drive_entry(&mut merger, &record)?;
            let second = drive_entry(&mut merger, &record)?;
            assert_ne!(first, second);

            let mut entry = merger.begin_entry(&ExtensibleInfo::default());
            merger.merge_lexical_form(&mut entry, &LiftMultiText::from_pairs([("en", "cat")]));
            let a = merger.finish_entry(&mut entry)?;
            let b = merger.finish_entry(&mut entry)?;
            assert_eq!(a, b);
            assert_eq!(merger.stats().entries_committed, 3);
            Ok(())
        })
        .unwrap();

    assert_eq!(handle.do_read(|repo| repo.count_all_items()).unwrap(), 3);
}

#[test]
fn test_edit_after_import_moves_last_modified() {
    h::test_setup();
    let handle = h::import(&[h::entry_record("dog_1", "dog", &["dog"])]);

    let before = handle.do_read(|repo| Ok(repo.last_modified())).unwrap();
    handle
        .do_write(|repo| {
            let id = repo.get_all_items()?[0];
            let entry = repo.get_item_mut(id)?;
            entry.lexical_form.set_alternative("en", "doggo");
            entry.something_was_modified();
            repo.save_item(id)
        })
        .unwrap();
    let after = handle.do_read(|repo| Ok(repo.last_modified())).unwrap();
    assert!(after >= before);

    handle.do_write(|repo| repo.delete_all_items()).unwrap();
    assert_eq!(handle.do_read(|repo| repo.count_all_items()).unwrap(), 0);
}
