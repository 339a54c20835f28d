use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};

use conveyor_exec::{BreakerConfig, CircuitBreaker};
use conveyor_store::{BreakerState, BreakerStore, FileStore, MemoryStore};

fn config() -> BreakerConfig {
    BreakerConfig {
        failure_threshold: 2,
        cooldown: Duration::from_secs(60),
    }
}

async fn trip(breaker: &CircuitBreaker, stage: &str) {
    breaker.record_result(stage, false).await.unwrap();
    let t = breaker.record_result(stage, false).await.unwrap().unwrap();
    assert_eq!(t.to, BreakerState::Open);
}

#[tokio::test]
async fn open_breaker_survives_a_restart() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let store: Arc<dyn BreakerStore> = Arc::new(FileStore::open(tmp.path()).unwrap());
        let breaker = CircuitBreaker::new(config()).with_store(store);
        trip(&breaker, "voice").await;
    }

    let store: Arc<dyn BreakerStore> = Arc::new(FileStore::open(tmp.path()).unwrap());
    let breaker = CircuitBreaker::new(config()).with_store(store.clone());
    assert!(!breaker.should_attempt("voice").await.unwrap());
    assert!(breaker.should_attempt("script").await.unwrap());

    let later = Utc::now() + TimeDelta::seconds(61);
    assert!(breaker.should_attempt_at("voice", later).await.unwrap());
    let persisted = store.load_breaker("voice").await.unwrap().unwrap();
    assert_eq!(persisted.state, BreakerState::HalfOpen);
}

#[tokio::test]
async fn reset_clears_persisted_state() {
    let store = Arc::new(MemoryStore::new());
    let breaker = CircuitBreaker::new(config()).with_store(store.clone());
    trip(&breaker, "voice").await;
    assert_eq!(store.list_breakers().await.unwrap().len(), 1);

    breaker.reset("voice").await.unwrap();
    assert!(store.load_breaker("voice").await.unwrap().is_none());
    assert!(breaker.should_attempt("voice").await.unwrap());

    let fresh = CircuitBreaker::new(config()).with_store(store.clone());
    let record = fresh.snapshot("voice").await.unwrap();
    assert_eq!(record.state, BreakerState::Closed);
    assert_eq!(record.consecutive_failures, 0);
}

#[tokio::test]
async fn failure_count_is_shared_through_the_store() {
    let store = Arc::new(MemoryStore::new());
    let first = CircuitBreaker::new(config()).with_store(store.clone());
    assert!(first.record_result("voice", false).await.unwrap().is_none());

    let second = CircuitBreaker::new(config()).with_store(store.clone());
    let t = second.record_result("voice", false).await.unwrap().unwrap();
    assert_eq!((t.from, t.to), (BreakerState::Closed, BreakerState::Open));
}
