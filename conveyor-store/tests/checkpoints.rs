use conveyor_store::{
    CheckpointKey, CheckpointStatus, CheckpointStore, FileStore, MemoryStore, RecordOutcome,
};

async fn exercise_insert_only_semantics(store: &dyn CheckpointStore) {
    let key = CheckpointKey::new("run-1", "story-1", "script");

    assert!(!store.is_completed(&key).await.unwrap());
    assert_eq!(
        store.record(&key, CheckpointStatus::Failed, None).await.unwrap(),
        RecordOutcome::Written
    );
    assert!(!store.is_completed(&key).await.unwrap());

    assert_eq!(
        store
            .record(&key, CheckpointStatus::Succeeded, Some("{\"words\":320}"))
            .await
            .unwrap(),
        RecordOutcome::Written
    );
    assert!(store.is_completed(&key).await.unwrap());

    // A succeeded checkpoint is authoritative and never replaced.
    assert_eq!(
        store
            .record(&key, CheckpointStatus::Failed, Some("null"))
            .await
            .unwrap(),
        RecordOutcome::Unchanged
    );
    let cp = store.get_checkpoint(&key).await.unwrap().unwrap();
    assert_eq!(cp.status, CheckpointStatus::Succeeded);
    assert_eq!(cp.output_ref.as_deref(), Some("{\"words\":320}"));
}

async fn exercise_queries(store: &dyn CheckpointStore) {
    store
        .record(&CheckpointKey::new("r1", "c1", "idea"), CheckpointStatus::Succeeded, Some("1"))
        .await
        .unwrap();
    store
        .record(&CheckpointKey::new("r1", "c1", "script"), CheckpointStatus::Skipped, None)
        .await
        .unwrap();
    store
        .record(&CheckpointKey::new("r2", "c1", "voice"), CheckpointStatus::Succeeded, Some("2"))
        .await
        .unwrap();
    store
        .record(&CheckpointKey::new("r3", "c2", "idea"), CheckpointStatus::Succeeded, Some("3"))
        .await
        .unwrap();

    let r1: Vec<String> = store
        .list_run_checkpoints("r1")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.stage_id)
        .collect();
    assert_eq!(r1, vec!["idea".to_string(), "script".to_string()]);

    let done = store.completed_stages("c1").await.unwrap();
    assert_eq!(
        done.into_iter().collect::<Vec<_>>(),
        vec!["idea".to_string(), "voice".to_string()]
    );
}

async fn exercise_staged_outputs(store: &dyn CheckpointStore) {
    let key = CheckpointKey::new("r1", "c1", "voice");
    assert!(store.load_staged_output(&key).await.unwrap().is_none());
    store.save_staged_output(&key, "\"first\"").await.unwrap();
    store.save_staged_output(&key, "\"second\"").await.unwrap();
    let staged = store.load_staged_output(&key).await.unwrap().unwrap();
    assert_eq!(staged.output_ref, "\"second\"");
    // Staging is not completion.
    assert!(!store.is_completed(&key).await.unwrap());

    assert!(store.clear_staged_output(&key).await.unwrap());
    assert!(store.load_staged_output(&key).await.unwrap().is_none());
    assert!(!store.clear_staged_output(&key).await.unwrap());
}

async fn exercise_settled_stages(store: &dyn CheckpointStore) {
    store
        .record(&CheckpointKey::new("r1", "c9", "idea"), CheckpointStatus::Succeeded, Some("1"))
        .await
        .unwrap();
    store
        .record(&CheckpointKey::new("r2", "c9", "idea"), CheckpointStatus::Failed, None)
        .await
        .unwrap();
    store
        .record(&CheckpointKey::new("r1", "c9", "thumbnail"), CheckpointStatus::Skipped, None)
        .await
        .unwrap();
    store
        .record(&CheckpointKey::new("r1", "c9", "script"), CheckpointStatus::Running, None)
        .await
        .unwrap();
    store
        .record(&CheckpointKey::new("r1", "other", "voice"), CheckpointStatus::Failed, None)
        .await
        .unwrap();

    let settled = store.settled_stages("c9").await.unwrap();
    assert_eq!(settled.len(), 2);
    // A later failure in another run does not hide an earlier success.
    assert_eq!(settled.get("idea"), Some(&CheckpointStatus::Succeeded));
    assert_eq!(settled.get("thumbnail"), Some(&CheckpointStatus::Skipped));
    assert!(!settled.contains_key("script"));
}

#[tokio::test]
async fn memory_store_checkpoints() {
    exercise_insert_only_semantics(&MemoryStore::new()).await;
    exercise_queries(&MemoryStore::new()).await;
    exercise_staged_outputs(&MemoryStore::new()).await;
    exercise_settled_stages(&MemoryStore::new()).await;
}

#[tokio::test]
async fn file_store_checkpoints() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let c = tempfile::tempdir().unwrap();
    let d = tempfile::tempdir().unwrap();
    exercise_insert_only_semantics(&FileStore::open(a.path()).unwrap()).await;
    exercise_queries(&FileStore::open(b.path()).unwrap()).await;
    exercise_staged_outputs(&FileStore::open(c.path()).unwrap()).await;
    exercise_settled_stages(&FileStore::open(d.path()).unwrap()).await;
}

#[tokio::test]
async fn file_store_handles_share_one_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let writer = FileStore::open(tmp.path()).unwrap();
    let reader = FileStore::open(tmp.path()).unwrap();

    let key = CheckpointKey::new("r1", "c1", "idea");
    writer
        .record(&key, CheckpointStatus::Succeeded, Some("{}"))
        .await
        .unwrap();
    assert!(reader.is_completed(&key).await.unwrap());
}
