use std::{env, thread, time::Duration};

use futures::future::join_all;
use redis::AsyncCommands;

use super::runtime::block_on;
use crate::{
    ApopeiraError, ConsumeOutcome, LimitConfig, LimitKey, LimitState, LimitStore, RedisLimitStore,
};

fn redis_url() -> String {
    env::var("REDIS_URL")
        .expect("REDIS_URL must be set to run redis integration tests (try `make test-redis`)")
}

fn unique_prefix() -> String {
    let n: u64 = rand::random();
    format!("apopeira_test_{n}")
}

fn key(s: &str) -> LimitKey {
    LimitKey::try_from(s.to_string()).unwrap()
}

async fn build_store(url: &str) -> (RedisLimitStore, redis::aio::ConnectionManager) {
    let client = redis::Client::open(url).unwrap();
    let connection_manager = client.get_connection_manager().await.unwrap();
    let store = RedisLimitStore::with_prefix(connection_manager.clone(), unique_prefix());

    (store, connection_manager)
}

#[test]
fn read_absent_key_returns_none() {
    let url = redis_url();

    block_on(async {
        let (store, _conn) = build_store(&url).await;

        let snapshot = store.read(&key("missing")).await.unwrap();
        assert!(snapshot.is_none());
    });
}

#[test]
fn read_does_not_create_redis_state() {
    let url = redis_url();

    block_on(async {
        let (store, mut conn) = build_store(&url).await;
        let k = key("missing");

        let _ = store.read(&k).await.unwrap();

        let exists: bool = conn.exists(store.storage_key(&k)).await.unwrap();
        assert!(!exists);
    });
}

#[test]
fn first_consume_creates_window_with_full_ttl() {
    let url = redis_url();

    block_on(async {
        let (store, _conn) = build_store(&url).await;
        let config = LimitConfig::new(5, 60).unwrap();

        let outcome = store.consume(&key("k"), &config).await.unwrap();
        let ConsumeOutcome::Created(snapshot) = outcome else {
            panic!("expected created outcome");
        };

        assert_eq!(snapshot.state.remaining, 4);
        assert_eq!(snapshot.state.total, 5);
        assert_eq!(snapshot.state.duration, 60);
        assert_eq!(snapshot.reset, 60);
    });
}

#[test]
fn consume_sequence_counts_down_then_rejects() {
    let url = redis_url();

    block_on(async {
        let (store, _conn) = build_store(&url).await;
        let config = LimitConfig::new(3, 60).unwrap();
        let k = key("k");

        let mut seen = Vec::new();
        for _ in 0..3 {
            let outcome = store.consume(&k, &config).await.unwrap();
            assert!(outcome.is_admitted());
            seen.push(outcome.snapshot().state.remaining);
        }
        assert_eq!(seen, vec![2, 1, 0]);

        let outcome = store.consume(&k, &config).await.unwrap();
        let ConsumeOutcome::Rejected(snapshot) = outcome else {
            panic!("expected rejected outcome");
        };
        assert_eq!(snapshot.state.remaining, 0);
        assert!(snapshot.reset > 0);
        assert!(snapshot.reset <= 60);
    });
}

#[test]
fn write_then_read_roundtrips_with_ttl() {
    let url = redis_url();

    block_on(async {
        let (store, _conn) = build_store(&url).await;
        let k = key("k");
        let state = LimitState {
            remaining: 2,
            total: 5,
            duration: 60,
        };

        store.write(&k, &state).await.unwrap();

        let snapshot = store.read(&k).await.unwrap().unwrap();
        assert_eq!(snapshot.state, state);
        assert!(snapshot.reset > 0);
        assert!(snapshot.reset <= 60);
    });
}

#[test]
fn decrement_preserves_original_ttl() {
    let url = redis_url();

    block_on(async {
        let (store, _conn) = build_store(&url).await;
        let config = LimitConfig::new(5, 2).unwrap();
        let k = key("k");

        store.consume(&k, &config).await.unwrap();

        thread::sleep(Duration::from_millis(1100));

        // Under a second of window left; the decrement must not re-arm the
        // key back to the full 2 seconds.
        let outcome = store.consume(&k, &config).await.unwrap();
        assert!(matches!(outcome, ConsumeOutcome::Admitted(_)));
        assert!(outcome.snapshot().reset <= 1);
    });
}

#[test]
fn rejected_consume_does_not_extend_ttl() {
    let url = redis_url();

    block_on(async {
        let (store, _conn) = build_store(&url).await;
        let config = LimitConfig::new(1, 2).unwrap();
        let k = key("k");

        store.consume(&k, &config).await.unwrap();

        thread::sleep(Duration::from_millis(1100));

        let outcome = store.consume(&k, &config).await.unwrap();
        assert!(matches!(outcome, ConsumeOutcome::Rejected(_)));
        assert!(outcome.snapshot().reset <= 1);
    });
}

#[test]
fn consume_after_expiry_creates_fresh_window() {
    let url = redis_url();

    block_on(async {
        let (store, _conn) = build_store(&url).await;
        let config = LimitConfig::new(2, 1).unwrap();
        let k = key("k");

        store.consume(&k, &config).await.unwrap();
        store.consume(&k, &config).await.unwrap();
        assert!(matches!(
            store.consume(&k, &config).await.unwrap(),
            ConsumeOutcome::Rejected(_)
        ));

        thread::sleep(Duration::from_millis(1100));

        let outcome = store.consume(&k, &config).await.unwrap();
        let ConsumeOutcome::Created(snapshot) = outcome else {
            panic!("expected a fresh window after expiry");
        };
        assert_eq!(snapshot.state.remaining, 1);
    });
}

#[test]
fn malformed_state_is_surfaced_not_masked() {
    let url = redis_url();

    block_on(async {
        let (store, mut conn) = build_store(&url).await;
        let config = LimitConfig::new(5, 60).unwrap();
        let k = key("k");

        // Corrupt value with a live TTL.
        let _: () = conn
            .set_ex(store.storage_key(&k), "not json", 60)
            .await
            .unwrap();

        assert!(matches!(
            store.read(&k).await.unwrap_err(),
            ApopeiraError::MalformedState { .. }
        ));
        assert!(matches!(
            store.consume(&k, &config).await.unwrap_err(),
            ApopeiraError::MalformedState { .. }
        ));
    });
}

#[test]
fn value_without_ttl_reads_as_absent() {
    let url = redis_url();

    block_on(async {
        let (store, mut conn) = build_store(&url).await;
        let k = key("k");

        // A persistent key was never written by this store; the TTL is
        // authoritative, so it must read as absent rather than as a counter.
        let _: () = conn
            .set(
                store.storage_key(&k),
                r#"{"remaining":1,"total":5,"duration":60}"#,
            )
            .await
            .unwrap();

        assert!(store.read(&k).await.unwrap().is_none());
    });
}

#[test]
fn concurrent_consumes_never_over_admit() {
    let url = redis_url();

    block_on(async {
        let (store, _conn) = build_store(&url).await;
        let config = LimitConfig::new(3, 60).unwrap();
        let k = key("contended");

        let outcomes = join_all((0..10).map(|_| store.consume(&k, &config))).await;

        let admitted = outcomes
            .into_iter()
            .map(|outcome| outcome.unwrap())
            .filter(ConsumeOutcome::is_admitted)
            .count();

        assert_eq!(admitted, 3);

        let snapshot = store.read(&k).await.unwrap().unwrap();
        assert_eq!(snapshot.state.remaining, 0);
    });
}
