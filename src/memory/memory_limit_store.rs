use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    ApopeiraError, ConsumeOutcome, LimitConfig, LimitKey, LimitState, LimitStore, WindowSnapshot,
    policy,
};

struct StoredWindow {
    state: LimitState,
    expires_at: Instant,
}

impl StoredWindow {
    fn new(state: LimitState, now: Instant) -> Self {
        let expires_at = now + Duration::from_secs(state.duration);
        Self { state, expires_at }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }

    fn snapshot(&self, now: Instant) -> WindowSnapshot {
        WindowSnapshot {
            state: self.state,
            reset: ttl_seconds(self.expires_at.saturating_duration_since(now)),
        }
    }
}

/// Rounded-up whole seconds, so a freshly created window reports its full
/// duration the way a fresh Redis TTL does.
fn ttl_seconds(remaining: Duration) -> u64 {
    let secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 { secs + 1 } else { secs }
}

/// In-process [`LimitStore`] backend.
///
/// Counters live in a [`DashMap`] with explicit expiry instants standing in
/// for Redis TTLs. Expired entries are evicted lazily when touched; the
/// same "TTL expiry deletes the counter" lifecycle as the Redis backend, at
/// the cost of dead entries lingering until their key is next read.
///
/// # Concurrency
///
/// `consume` holds the map's per-key entry lock across the whole
/// read-decide-write, so concurrent consumers for one key can never
/// over-admit. Different keys proceed in parallel on separate shards.
///
/// Suited to single-process hosts and tests; for a limit shared across
/// processes use [`RedisLimitStore`](crate::RedisLimitStore).
#[derive(Default)]
pub struct MemoryLimitStore {
    windows: DashMap<LimitKey, StoredWindow>,
}

impl MemoryLimitStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Number of windows currently held, live or not yet evicted.
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }
}

#[async_trait]
impl LimitStore for MemoryLimitStore {
    async fn read(&self, key: &LimitKey) -> Result<Option<WindowSnapshot>, ApopeiraError> {
        let now = Instant::now();

        let snapshot = match self.windows.get(key) {
            None => return Ok(None),
            Some(window) if !window.is_live(now) => None,
            Some(window) => Some(window.snapshot(now)),
        };

        if snapshot.is_none() {
            // Lazy eviction; re-check expiry under the entry lock in case a
            // concurrent consume just recreated the window.
            self.windows
                .remove_if(key, |_, window| !window.is_live(Instant::now()));
        }

        Ok(snapshot)
    }

    async fn write(&self, key: &LimitKey, state: &LimitState) -> Result<(), ApopeiraError> {
        self.windows
            .insert(key.clone(), StoredWindow::new(*state, Instant::now()));

        Ok(())
    }

    async fn consume(
        &self,
        key: &LimitKey,
        config: &LimitConfig,
    ) -> Result<ConsumeOutcome, ApopeiraError> {
        let now = Instant::now();

        match self.windows.entry(key.clone()) {
            Entry::Occupied(mut occupied) if occupied.get().is_live(now) => {
                let window = occupied.get_mut();

                if policy::record_attempt(&mut window.state) {
                    Ok(ConsumeOutcome::Admitted(window.snapshot(now)))
                } else {
                    Ok(ConsumeOutcome::Rejected(window.snapshot(now)))
                }
            }
            Entry::Occupied(mut occupied) => {
                let window = StoredWindow::new(opening_state(config), now);
                let snapshot = window.snapshot(now);
                occupied.insert(window);

                Ok(ConsumeOutcome::Created(snapshot))
            }
            Entry::Vacant(vacant) => {
                let window = StoredWindow::new(opening_state(config), now);
                let snapshot = window.snapshot(now);
                vacant.insert(window);

                Ok(ConsumeOutcome::Created(snapshot))
            }
        }
    }
}

/// A fresh window with the attempt that created it already recorded.
fn opening_state(config: &LimitConfig) -> LimitState {
    let mut state = policy::fresh_window(config);
    // limit >= 1, so the opening attempt always fits.
    policy::record_attempt(&mut state);
    state
}
