//! End-to-end scenarios over the public service contract.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{Duration, Utc};
use kuzu_memory::service::RememberOptions;
use kuzu_memory::{
    KuzuMemoryConfig, Memory, MemoryService, MemoryType, RecallFilters, RecallStrategy,
};
use std::sync::Arc;

fn open_service(dir: &tempfile::TempDir) -> MemoryService {
    MemoryService::initialize(
        dir.path().join(".kuzu-memory").join("memories.db"),
        KuzuMemoryConfig::default(),
    )
    .unwrap()
}

fn opts() -> RememberOptions {
    RememberOptions::default()
}

/// A live memory of the given age. Retention is disabled so the age alone
/// drives maintenance behavior.
fn backdated(content: &str, days_old: i64, access_count: u32, importance: f64) -> Memory {
    let mut memory = Memory::new(content, MemoryType::Episodic, "ai-conversation")
        .with_importance(importance)
        .with_valid_to(None);
    memory.created_at = Utc::now() - Duration::days(days_old);
    memory.valid_from = memory.created_at;
    memory.access_count = access_count;
    if access_count > 0 {
        memory.accessed_at = Some(Utc::now() - Duration::days(days_old.min(30)));
    }
    memory
}

#[test]
fn exact_dedup_returns_first_id() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir);

    let first = service
        .remember("My name is Alice.", "manual", &opts())
        .unwrap()
        .unwrap();
    let second = service
        .remember("my   name   is alice.", "manual", &opts())
        .unwrap()
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(service.count().unwrap(), 1);
    service.close();
}

#[test]
fn update_recognition_links_old_preference() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir);

    let old = service
        .remember("I prefer Django.", "manual", &opts())
        .unwrap()
        .unwrap();
    let old_memory = service.get_memory(&old).unwrap().unwrap();
    assert_eq!(old_memory.memory_type, MemoryType::Preference);

    let new = service
        .remember("Actually, I prefer FastAPI.", "manual", &opts())
        .unwrap()
        .unwrap();
    let new_memory = service.get_memory(&new).unwrap().unwrap();
    assert!(new_memory.content.contains("FastAPI"));

    // The new memory points at the one it supersedes
    let related = service.store().related_ids(&new).unwrap();
    assert!(related.contains(&old));
    service.close();
}

#[test]
fn recall_ranking_is_deterministic_by_importance() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir);

    let contents = [
        ("Python drives the ranking experiments", 0.9),
        ("Python utilities cover the data exports", 0.5),
        ("Python came up in the hallway chat", 0.2),
    ];
    let mut ids = Vec::new();
    for (content, importance) in contents {
        let memory = Memory::new(content, MemoryType::Semantic, "manual")
            .with_importance(importance)
            .with_entities(vec!["Python".to_string()]);
        service.batch_store(std::slice::from_ref(&memory)).unwrap();
        ids.push(memory.id);
    }

    let first = service
        .recall("python", Some(3), RecallStrategy::Auto, &RecallFilters::new())
        .unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(first[0].id, ids[0]);
    assert_eq!(first[1].id, ids[1]);
    assert_eq!(first[2].id, ids[2]);

    let second = service
        .recall("python", Some(3), RecallStrategy::Auto, &RecallFilters::new())
        .unwrap();
    let order_first: Vec<_> = first.iter().map(|m| m.id.clone()).collect();
    let order_second: Vec<_> = second.iter().map(|m| m.id.clone()).collect();
    assert_eq!(order_first, order_second);
    service.close();
}

#[test]
fn shared_database_across_three_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join(".kuzu-memory").join("memories.db");
    let config = KuzuMemoryConfig::default();

    let observer = MemoryService::initialize(&db_path, config.clone()).unwrap();

    let mut handles = Vec::new();
    for session in 0..3 {
        let db_path = db_path.clone();
        let config = config.clone();
        handles.push(std::thread::spawn(move || {
            let service = MemoryService::initialize(&db_path, config).unwrap();
            let mut stored = 0_usize;
            for item in 0..10 {
                // Token-distinct contents so deduplication stays out of
                // the way of the concurrency measurement
                let content = format!(
                    "Worker w{session} recorded fact f{session}x{item} for subsystem s{session}n{item}."
                );
                if service
                    .remember(&content, "ai-conversation", &RememberOptions::default())
                    .is_ok()
                {
                    stored += 1;
                }
            }
            service.close();
            stored
        }));
    }

    let stored: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(stored, 30, "no session observed an open failure");

    // Under write contention with retries at least 80% of 30 land
    let live = observer.count().unwrap();
    assert!(live >= 24, "expected >= 24 live memories, got {live}");

    // All worker sessions closed; only the observer holds the handle
    assert_eq!(observer.shared_refcount(), 1);
    observer.close();
    assert_eq!(observer.shared_refcount(), 0);
}

#[test]
fn smart_pruning_dry_run_then_execute() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir);

    // 100 memories spanning ages 1-400 days, access 0-25, importance .1-.95.
    // The first 30 are genuinely low-value: very old, never accessed,
    // unimportant, and bulky enough that the size factor bites.
    let memories: Vec<Memory> = (0..100)
        .map(|i| {
            if i < 30 {
                let filler = format!("incident follow-up {i} notes ").repeat(80);
                backdated(
                    &format!("Observation {i} from the engineering log: {filler}"),
                    360 + i % 40,
                    0,
                    0.1,
                )
            } else {
                let age = 1 + (i * 4) % 340;
                let access = u32::try_from(i % 26).unwrap();
                let importance = 0.1 + f64::from(u32::try_from(i % 9).unwrap()) * 0.1;
                backdated(
                    &format!("Observation {i} from the daily engineering log archive"),
                    age,
                    access,
                    importance.min(0.95),
                )
            }
        })
        .collect();
    service.batch_store(&memories).unwrap();
    let before = service.count().unwrap();
    assert_eq!(before, 100);

    let dry = service.smart_prune(Some(0.3), true).unwrap();
    assert!(dry.dry_run);
    assert_eq!(dry.pruned, 0);
    assert_eq!(dry.archived, 0);
    assert!(dry.candidates > 0, "expected prune candidates");
    assert_eq!(service.count().unwrap(), before);

    let wet = service.smart_prune(Some(0.3), false).unwrap();
    assert_eq!(wet.pruned, dry.candidates);
    assert_eq!(wet.archived, dry.candidates);
    assert_eq!(
        service.count().unwrap(),
        before - u64::try_from(dry.candidates).unwrap()
    );
    assert_eq!(
        service.stats().unwrap().archives,
        u64::try_from(dry.candidates).unwrap()
    );
    service.close();
}

#[test]
fn consolidation_builds_summary_and_archives_members() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir);

    let episodes = [
        "Sprint review covered the search index rebuild milestones",
        "Sprint review covered the search index rebuild regressions",
        "Sprint review covered the search index rebuild followups",
    ];
    let memories: Vec<Memory> = episodes
        .iter()
        .map(|content| backdated(content, 120, 1, 0.4))
        .collect();
    service.batch_store(&memories).unwrap();

    let result = service.consolidate(false).unwrap();
    assert_eq!(result.clusters_found, 1);
    assert_eq!(result.memories_consolidated, 3);
    assert_eq!(result.new_memories_created, 1);
    assert_eq!(result.memories_archived, 3);

    let live = service.get_recent(10, None).unwrap();
    assert_eq!(live.len(), 1);
    let summary = &live[0];
    assert_eq!(summary.source_type, "consolidation");

    let members = service.store().consolidated_members(&summary.id).unwrap();
    assert_eq!(members.len(), 3);
    assert_eq!(service.stats().unwrap().archives, 3);
    service.close();
}

#[test]
fn archive_restore_roundtrip_preserves_record() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir);

    let original = backdated("A memory bound for the archive and back", 360, 0, 0.3);
    service.batch_store(std::slice::from_ref(&original)).unwrap();

    let pruned = service.smart_prune(Some(0.5), false).unwrap();
    assert_eq!(pruned.pruned, 1);
    assert!(service.get_memory(&original.id).unwrap().is_none());

    let manager = service.archive_manager();
    let archives = manager.list_archives(10).unwrap();
    assert_eq!(archives.len(), 1);

    let restored_id = manager.restore(&archives[0].archive_id).unwrap().unwrap();
    assert_eq!(restored_id, original.id);
    let restored = service.get_memory(&restored_id).unwrap().unwrap();
    assert_eq!(restored.content, original.content);
    assert_eq!(restored.memory_type, original.memory_type);
    assert_eq!(restored.source_type, original.source_type);
    assert!((restored.importance - original.importance).abs() < f64::EPSILON);
    assert_eq!(restored.created_at, original.created_at);
    assert_eq!(manager.list_archives(10).unwrap().len(), 0);
    service.close();
}

#[test]
fn batch_store_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir);

    let batch = vec![
        Memory::new("Commit sync fact one", MemoryType::Semantic, "git_sync"),
        Memory::new("Commit sync fact two", MemoryType::Semantic, "git_sync"),
    ];
    let inserted = service.batch_store(&batch).unwrap();
    assert_eq!(inserted.len(), 2);

    // A second insert of the same content is a full no-op
    let again: Vec<Memory> = batch
        .iter()
        .map(|m| Memory::new(m.content.clone(), m.memory_type, &m.source_type))
        .collect();
    assert!(service.batch_store(&again).unwrap().is_empty());
    assert_eq!(service.count().unwrap(), 2);
    service.close();
}

#[test]
fn boundary_validation_and_caps() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir);

    // Empty and whitespace-only content
    for bad in ["", "   ", "\t\n"] {
        assert!(service.remember(bad, "manual", &opts()).is_err());
    }

    // Zero cap yields an untouched prompt
    service
        .remember("We decided to use PostgreSQL.", "manual", &opts())
        .unwrap();
    let ctx = service
        .attach_memories("postgresql", Some(0), RecallStrategy::Auto, &RecallFilters::new())
        .unwrap();
    assert!(ctx.memories.is_empty());
    assert_eq!(ctx.enhanced_prompt, ctx.original_prompt);
    service.close();
}

#[test]
fn overlong_content_truncated_not_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir);
    let max = service.config().extraction.max_memory_length;

    let long = format!(
        "The incident retrospective recorded {} as contributing factors",
        "cause ".repeat(400)
    );
    assert!(long.len() > max);
    let id = service
        .remember(&long, "manual", &opts())
        .unwrap()
        .expect("oversized content is stored truncated, not dropped");
    let stored = service.get_memory(&id).unwrap().unwrap();
    assert!(stored.content.len() <= max);
    service.close();
}

#[test]
fn expired_memories_invisible_to_recall() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir);

    let mut expiring = Memory::new(
        "Sensory note about the flaky monitor output",
        MemoryType::Sensory,
        "ai-conversation",
    );
    expiring.valid_to = Some(Utc::now() - Duration::seconds(1));
    service.batch_store(std::slice::from_ref(&expiring)).unwrap();

    let recalled = service
        .recall(
            "flaky monitor output",
            Some(10),
            RecallStrategy::Keyword,
            &RecallFilters::new(),
        )
        .unwrap();
    assert!(recalled.is_empty());

    assert_eq!(service.cleanup_expired().unwrap(), 1);
    service.close();
}

#[test]
fn dry_run_operations_never_change_live_count() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir);

    let mut batch = Vec::new();
    for i in 0..20 {
        batch.push(backdated(
            &format!("Historical background item {i} with modest value"),
            200 + i,
            0,
            0.2,
        ));
    }
    service.batch_store(&batch).unwrap();
    let before = service.count().unwrap();

    for result in service.cleanup(true) {
        assert!(result.success, "pass {} failed: {:?}", result.pass, result.error);
    }
    service.smart_prune(Some(0.5), true).unwrap();
    service.consolidate(true).unwrap();

    assert_eq!(service.count().unwrap(), before);
    service.close();
}

#[test]
fn concurrent_recall_during_writes_sees_whole_memories_only() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join(".kuzu-memory").join("memories.db");
    let config = KuzuMemoryConfig::default();

    let writer = Arc::new(MemoryService::initialize(&db_path, config.clone()).unwrap());
    let reader = Arc::new(MemoryService::initialize(&db_path, config).unwrap());

    let writer_thread = {
        let writer = Arc::clone(&writer);
        std::thread::spawn(move || {
            for item in 0..20 {
                let content =
                    format!("Pipeline stage p{item} emits checkpoint marker c{item} hourly.");
                writer
                    .remember(&content, "ai-conversation", &RememberOptions::default())
                    .unwrap();
            }
        })
    };

    // A recall racing a write may or may not see the newest memory, but
    // never a partially constructed one
    for _ in 0..20 {
        let recalled = reader
            .recall(
                "pipeline checkpoint marker",
                Some(50),
                RecallStrategy::Keyword,
                &RecallFilters::new(),
            )
            .unwrap();
        for memory in &recalled {
            assert!(!memory.content.is_empty());
            assert_eq!(memory.content_hash.len(), 64);
            assert!(memory.content.contains("checkpoint"));
        }
    }

    writer_thread.join().unwrap();
    reader.close();
    writer.close();
}

#[test]
fn concurrent_opens_share_one_handle() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("shared-refcount.db");
    let config = KuzuMemoryConfig::default();

    let services: Vec<Arc<MemoryService>> = (0..4)
        .map(|_| Arc::new(MemoryService::initialize(&db_path, config.clone()).unwrap()))
        .collect();
    assert_eq!(services[0].shared_refcount(), 4);

    for (closed, service) in services.iter().enumerate() {
        service.close();
        let expected = 4 - closed - 1;
        if expected > 0 {
            assert_eq!(services[0].shared_refcount(), expected);
        }
    }
    // Last close dropped the registry entry entirely
    assert_eq!(services[0].shared_refcount(), 0);
}
