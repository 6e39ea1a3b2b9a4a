use async_trait::async_trait;
use chrono::{Duration, Utc};
use coinquest_engine::{
    CompletionCallback, PendingTask, StaticShortener, TaskCatalog, TaskDefinition, TaskEngine,
    TaskFlowError, VerifyOutcome,
};
use coinquest_store::{AccountStore, MemoryAccountStore, StoreError};
use coinquest_types::{AccountPatch, Coins, NetworkId, TaskId, UserRecord};
use std::collections::HashSet;
use std::sync::Arc;

const APP_URL: &str = "https://app.coinquest.test/dashboard";

fn catalog() -> TaskCatalog {
    let networks: HashSet<NetworkId> = ["traffictot", "layma"]
        .into_iter()
        .map(NetworkId::from)
        .collect();
    TaskCatalog::new(
        vec![
            TaskDefinition {
                id: TaskId::from("t1"),
                name: "Visit sponsor page".to_string(),
                reward: Coins::new(50),
                max_turns: 3,
                network: NetworkId::from("traffictot"),
            },
            TaskDefinition {
                id: TaskId::from("t2"),
                name: "Read article".to_string(),
                reward: Coins::new(30),
                max_turns: 2,
                network: NetworkId::from("layma"),
            },
        ],
        &networks,
    )
    .unwrap()
}

fn today() -> String {
    chrono::Local::now().date_naive().to_string()
}

async fn engine_with_user(user: UserRecord) -> (TaskEngine, Arc<MemoryAccountStore>, Arc<StaticShortener>) {
    let store = Arc::new(MemoryAccountStore::new());
    store.seed(user.clone()).await;

    let shortener = Arc::new(StaticShortener::new());
    let engine = TaskEngine::new(catalog(), store.clone(), shortener.clone(), APP_URL).unwrap();
    engine.session.install(user, "tok").await;
    (engine, store, shortener)
}

fn fresh_user() -> UserRecord {
    let mut user = UserRecord::new("alice", "alice@example.com", "", "secret", "AB12CD");
    user.last_access_date = Some(today());
    user
}

fn callback_for(record: &PendingTask, reward: u64) -> CompletionCallback {
    CompletionCallback {
        reward: Coins::new(reward),
        task_name: record.task_name.clone(),
        task_id: record.task_id.clone(),
        key: record.key.clone(),
    }
}

async fn complete_once(engine: &TaskEngine) -> Coins {
    let record = engine.issuer.issue(&TaskId::from("t1")).await.unwrap();
    let outcome = engine
        .verifier
        .handle_callback(&callback_for(&record, 50))
        .await
        .unwrap();
    match outcome {
        VerifyOutcome::Credited { new_balance, .. } => new_balance,
        other => panic!("expected credit, got {other:?}"),
    }
}

#[tokio::test]
async fn quota_decreases_by_one_per_completion() {
    let (engine, _store, _sl) = engine_with_user(fresh_user()).await;
    let def = engine.catalog.get(&TaskId::from("t1")).unwrap().clone();

    for n in 1..=3u32 {
        complete_once(&engine).await;

        let user = engine.session.current_user().await.unwrap();
        assert_eq!(user.turns_done(&def.id), n);
        assert_eq!(
            engine.quota.remaining_turns(&def).await.unwrap(),
            def.max_turns - n
        );
    }
}

#[tokio::test]
async fn day_rollover_restores_full_quota() {
    let mut user = fresh_user();
    user.last_access_date = Some("2024-02-01".to_string());
    user.daily_tasks.insert(TaskId::from("t1"), 3);

    let (engine, store, _sl) = engine_with_user(user).await;
    let def = engine.catalog.get(&TaskId::from("t1")).unwrap().clone();

    assert_eq!(
        engine.quota.remaining_turns(&def).await.unwrap(),
        def.max_turns
    );

    // The reset reached the store, not just the cache.
    let stored = store.find("alice").await.unwrap().unwrap();
    assert!(stored.daily_tasks.is_empty());
    assert_eq!(stored.last_access_date, Some(today()));
}

#[tokio::test]
async fn replayed_callback_credits_exactly_once() {
    let (engine, store, _sl) = engine_with_user(fresh_user()).await;

    let record = engine.issuer.issue(&TaskId::from("t1")).await.unwrap();
    let callback = callback_for(&record, 50);

    let first = engine.verifier.handle_callback(&callback).await.unwrap();
    assert!(matches!(first, VerifyOutcome::Credited { .. }));

    // Same navigation again after the slot was cleared: stale, ignored.
    let second = engine.verifier.handle_callback(&callback).await.unwrap();
    assert_eq!(second, VerifyOutcome::Ignored);

    // Cross-tab scenario: another tab still holds the consumed attempt in
    // its slot. The store's consumed-key set stops the second credit.
    engine.pending.put(record.clone()).await;
    let third = engine.verifier.handle_callback(&callback).await.unwrap();
    assert_eq!(third, VerifyOutcome::AlreadyCredited);

    let stored = store.find("alice").await.unwrap().unwrap();
    assert_eq!(stored.balance, Coins::new(50));
    assert_eq!(stored.tasks_completed, 1);
}

#[tokio::test]
async fn key_mismatch_rejects_without_touching_state() {
    let (engine, store, _sl) = engine_with_user(fresh_user()).await;

    let record = engine.issuer.issue(&TaskId::from("t1")).await.unwrap();
    let mut forged = callback_for(&record, 50);
    forged.key = "xyz".to_string();

    let outcome = engine.verifier.handle_callback(&forged).await.unwrap();
    assert_eq!(outcome, VerifyOutcome::Rejected);

    // Balance unchanged, pending attempt still in place.
    let stored = store.find("alice").await.unwrap().unwrap();
    assert_eq!(stored.balance, Coins::ZERO);
    assert_eq!(engine.pending.get().await, Some(record.clone()));

    // A mismatching task id is rejected the same way.
    let mut wrong_task = callback_for(&record, 50);
    wrong_task.task_id = TaskId::from("t2");
    let outcome = engine.verifier.handle_callback(&wrong_task).await.unwrap();
    assert_eq!(outcome, VerifyOutcome::Rejected);
    assert_eq!(engine.pending.get().await, Some(record));
}

#[tokio::test]
async fn expired_attempt_is_discarded_and_reissuable() {
    let (engine, _store, _sl) = engine_with_user(fresh_user()).await;

    let record = engine.issuer.issue(&TaskId::from("t1")).await.unwrap();

    // Age the attempt past its window.
    let mut aged = record.clone();
    aged.issued_at = Utc::now() - Duration::minutes(11);
    engine.pending.put(aged).await;

    assert!(engine.pending.get().await.is_none());

    let outcome = engine
        .verifier
        .handle_callback(&callback_for(&record, 50))
        .await
        .unwrap();
    assert_eq!(outcome, VerifyOutcome::Expired);
    assert!(engine.pending.snapshot().await.is_none());

    // Re-issuing the same task now mints a fresh attempt.
    let reissued = engine.issuer.issue(&TaskId::from("t1")).await.unwrap();
    assert_ne!(reissued.key, record.key);
}

#[tokio::test]
async fn three_turns_end_to_end_then_refusal_without_a_shortlink_call() {
    let (engine, store, shortener) = engine_with_user(fresh_user()).await;
    let def = engine.catalog.get(&TaskId::from("t1")).unwrap().clone();

    for _ in 0..3 {
        complete_once(&engine).await;
    }

    let stored = store.find("alice").await.unwrap().unwrap();
    assert_eq!(stored.balance, Coins::new(150));
    assert_eq!(stored.turns_done(&def.id), 3);
    assert_eq!(engine.quota.remaining_turns(&def).await.unwrap(), 0);

    let calls_before = shortener.calls();
    let err = engine.issuer.issue(&TaskId::from("t1")).await.unwrap_err();
    assert!(matches!(err, TaskFlowError::QuotaExhausted { .. }));
    assert_eq!(shortener.calls(), calls_before);
}

#[tokio::test]
async fn provider_failure_leaves_no_pending_state() {
    let (engine, _store, shortener) = engine_with_user(fresh_user()).await;

    shortener.set_failing(true);
    let err = engine.issuer.issue(&TaskId::from("t1")).await.unwrap_err();
    assert!(matches!(err, TaskFlowError::Shortlink(_)));
    assert!(engine.pending.snapshot().await.is_none());

    // The outage is transient: the next attempt goes through.
    shortener.set_failing(false);
    assert!(engine.issuer.issue(&TaskId::from("t1")).await.is_ok());
}

#[tokio::test]
async fn pending_attempt_for_same_task_is_continued() {
    let (engine, _store, shortener) = engine_with_user(fresh_user()).await;

    let first = engine.issuer.issue(&TaskId::from("t1")).await.unwrap();
    let again = engine.issuer.issue(&TaskId::from("t1")).await.unwrap();
    assert_eq!(first, again);
    assert_eq!(shortener.calls(), 1);

    // A different task overwrites the slot with a fresh attempt.
    let other = engine.issuer.issue(&TaskId::from("t2")).await.unwrap();
    assert_eq!(other.task_id, TaskId::from("t2"));
    assert_eq!(engine.pending.get().await, Some(other));
}

#[tokio::test]
async fn expiry_watch_clears_the_slot_at_the_deadline() {
    let (engine, _store, _sl) = engine_with_user(fresh_user()).await;

    let record = engine.issuer.issue(&TaskId::from("t1")).await.unwrap();

    // Re-arm against an attempt that is already past its deadline, as after
    // a reload: the watch fires from the original issuance instant.
    let mut aged = record.clone();
    aged.issued_at = Utc::now() - Duration::minutes(11);
    engine.pending.put(aged.clone()).await;

    engine.spawn_expiry_watch(&aged).await.unwrap();
    assert!(engine.pending.snapshot().await.is_none());
}

/// Store stub that answers every update with 401, as a remote does once the
/// session token has lapsed.
struct ExpiredSessionStore;

#[async_trait]
impl AccountStore for ExpiredSessionStore {
    async fn find(&self, _identifier: &str) -> Result<Option<UserRecord>, StoreError> {
        Err(StoreError::Unauthorized)
    }
    async fn find_by_referral_code(&self, _code: &str) -> Result<Option<UserRecord>, StoreError> {
        Err(StoreError::Unauthorized)
    }
    async fn create(&self, _user: UserRecord) -> Result<(), StoreError> {
        Err(StoreError::Unauthorized)
    }
    async fn update_fields(
        &self,
        _username: &str,
        _patch: AccountPatch,
    ) -> Result<UserRecord, StoreError> {
        Err(StoreError::Unauthorized)
    }
    async fn list_referred(&self, _username: &str) -> Result<Vec<UserRecord>, StoreError> {
        Err(StoreError::Unauthorized)
    }
    async fn list_all(&self) -> Result<Vec<UserRecord>, StoreError> {
        Err(StoreError::Unauthorized)
    }
}

#[tokio::test]
async fn unauthorized_settlement_tears_the_session_down() {
    let shortener = Arc::new(StaticShortener::new());
    let engine = TaskEngine::new(
        catalog(),
        Arc::new(ExpiredSessionStore),
        shortener,
        APP_URL,
    )
    .unwrap();
    engine.session.install(fresh_user(), "stale-token").await;

    let def = engine.catalog.get(&TaskId::from("t1")).unwrap().clone();
    let err = engine.settlement.credit(&def, "some-key").await.unwrap_err();
    assert!(matches!(err, TaskFlowError::SessionExpired));
    assert!(!engine.session.is_active().await);
}
