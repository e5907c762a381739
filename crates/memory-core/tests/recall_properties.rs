//! End-to-end recall behavior through a real in-memory store.

use std::collections::HashMap;

use memory_core::{
    DetailLevel, MemoryEngine, QueryRewriter, RecallOptions, StoreInput, UpdateFields,
};
use memory_store::{DriverConfig, MemoryStore};
use memory_types::{MemoryType, Settings};

fn engine() -> MemoryEngine {
    let mut settings = Settings::default();
    settings.db_path = ":memory:".to_string();
    let store = MemoryStore::open(&DriverConfig::Ephemeral).unwrap();
    MemoryEngine::with_store(store, settings)
}

fn store_fact(engine: &MemoryEngine, content: &str) -> String {
    engine
        .store(StoreInput {
            content: content.to_string(),
            ..Default::default()
        })
        .unwrap()
        .id
}

#[test]
fn multi_term_query_matches_superset_of_each_term() {
    let engine = engine();
    store_fact(&engine, "The juniper bonsai sits on the east windowsill.");
    store_fact(&engine, "Watering schedules shift in winter for most plants.");
    store_fact(&engine, "The ficus bonsai needs watering twice a week.");

    let bonsai_only = engine.recall(RecallOptions::new("bonsai")).unwrap();
    let watering_only = engine.recall(RecallOptions::new("watering")).unwrap();
    let combined = engine.recall(RecallOptions::new("bonsai watering")).unwrap();

    assert_eq!(bonsai_only.total_count, 2);
    assert_eq!(watering_only.total_count, 2);
    // OR semantics: the union, never the intersection
    assert_eq!(combined.total_count, 3);
}

#[test]
fn prefix_wildcards_match_longer_words() {
    let engine = engine();
    store_fact(&engine, "UMass Global runs its enrollment portal on weekends.");
    store_fact(&engine, "The homelab switch needs a firmware update soon.");

    let umass = engine.recall(RecallOptions::new("UMass")).unwrap();
    assert_eq!(umass.total_count, 1);

    let home = engine.recall(RecallOptions::new("home")).unwrap();
    assert_eq!(home.total_count, 1, "home* should reach homelab");
}

#[test]
fn quoted_phrase_must_match_exactly() {
    let engine = engine();
    store_fact(&engine, "The database migration plan ships next quarter.");
    store_fact(&engine, "A migration of the database happened last year.");

    let loose = engine.recall(RecallOptions::new("database migration")).unwrap();
    assert_eq!(loose.total_count, 2);

    let phrase = engine
        .recall(RecallOptions::new("\"database migration\""))
        .unwrap();
    assert_eq!(phrase.total_count, 1);
}

#[test]
fn full_coverage_outranks_partial_coverage() {
    let engine = engine();
    let both = store_fact(
        &engine,
        "The juniper bonsai watering routine runs every Monday morning.",
    );
    store_fact(&engine, "The juniper hedge out front needs trimming again.");

    let response = engine
        .recall(RecallOptions::new("juniper watering"))
        .unwrap();
    assert_eq!(response.total_count, 2);
    assert_eq!(response.index[0].id, both);
}

#[test]
fn type_filter_is_structural_not_textual() {
    let engine = engine();
    engine
        .store(StoreInput {
            content: "Ada runs the observability guild at work.".to_string(),
            memory_type: MemoryType::Entity,
            ..Default::default()
        })
        .unwrap();
    store_fact(&engine, "Ada mentioned the guild meets on Fridays.");

    let all = engine.recall(RecallOptions::new("Ada guild")).unwrap();
    assert_eq!(all.total_count, 2);

    let entities = engine
        .recall(RecallOptions::new("Ada guild").with_type(MemoryType::Entity))
        .unwrap();
    assert_eq!(entities.total_count, 1);
    assert_eq!(entities.index[0].memory_type, "entity");
}

#[test]
fn recall_is_deterministic_for_identical_data() {
    let engine = engine();
    for i in 0..5 {
        store_fact(
            &engine,
            &format!("Shared note number {i} about backup rotation policy."),
        );
    }

    let first = engine
        .recall(RecallOptions::new("backup rotation").with_detail(DetailLevel::Minimal))
        .unwrap();
    let second = engine
        .recall(RecallOptions::new("backup rotation").with_detail(DetailLevel::Minimal))
        .unwrap();
    let ids = |r: &memory_core::RecallResponse| {
        r.index.iter().map(|e| e.id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
}

#[test]
fn stopword_only_query_is_a_validation_error() {
    let engine = engine();
    store_fact(&engine, "Anything at all, just so the store is not empty.");
    assert!(engine.recall(RecallOptions::new("the and of")).is_err());
    assert!(engine.recall(RecallOptions::new("   ")).is_err());
}

#[test]
fn importance_updates_stay_clamped() {
    let engine = engine();
    let id = store_fact(&engine, "Ordinary note about the weekly standup time.");

    let high = engine
        .update(
            &id,
            UpdateFields {
                importance: Some(42.0),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(high.importance <= 10.0);

    let low = engine
        .update(
            &id,
            UpdateFields {
                importance: Some(-5.0),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(low.importance >= 0.0);
}

#[test]
fn metadata_merges_instead_of_replacing() {
    let engine = engine();
    let mut initial = HashMap::new();
    initial.insert("source".to_string(), serde_json::json!("import"));
    let memory = engine
        .store(StoreInput {
            content: "Imported note about the greenhouse thermostat settings.".to_string(),
            metadata: initial,
            ..Default::default()
        })
        .unwrap();

    let mut extra = HashMap::new();
    extra.insert("reviewed".to_string(), serde_json::json!(true));
    let updated = engine
        .update(
            &memory.id,
            UpdateFields {
                metadata: Some(extra),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.metadata["source"], serde_json::json!("import"));
    assert_eq!(updated.metadata["reviewed"], serde_json::json!(true));
}

#[test]
fn rewriter_and_engine_agree_on_match_expression() {
    let engine = engine();
    store_fact(&engine, "Bonsai tree plant care takes patience and practice.");

    let rewriter = QueryRewriter::new(&Settings::default().search);
    let expected = rewriter.rewrite("bonsai tree plant care").unwrap();
    let response = engine
        .recall(RecallOptions::new("bonsai tree plant care"))
        .unwrap();
    assert_eq!(response.query, expected.match_expr);
    assert_eq!(response.query, "bonsai* OR tree* OR plant* OR care*");
}

#[test]
fn end_to_end_store_recall_forget_prune() {
    let engine = engine();
    let id = store_fact(&engine, "The sourdough starter gets fed every morning at eight.");

    let found = engine.recall(RecallOptions::new("sourdough starter")).unwrap();
    assert_eq!(found.total_count, 1);
    assert_eq!(found.details.len(), 1);

    engine.forget(&id, None).unwrap();
    let gone = engine.recall(RecallOptions::new("sourdough starter")).unwrap();
    assert_eq!(gone.total_count, 0);

    let report = engine.prune(Some(0), false).unwrap();
    assert_eq!(report.deleted_count, 1);
    assert_eq!(report.pruned_count, 1);

    let empty = engine.prune(Some(0), false).unwrap();
    assert_eq!(empty.pruned_count, 0);
}
