use async_trait::async_trait;

use crate::{ApopeiraError, LimitConfig, LimitKey, LimitState, LimitView};

/// A live counter paired with its remaining lifetime, both observed at the
/// same point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// The persisted counter.
    pub state: LimitState,
    /// Seconds until the key expires, clamped to zero.
    pub reset: u64,
}

impl WindowSnapshot {
    /// The caller-facing view of this snapshot.
    pub fn view(&self) -> LimitView {
        LimitView {
            remaining: self.state.remaining,
            total: self.state.total,
            duration: self.state.duration,
            reset: self.reset,
        }
    }
}

/// Outcome of an atomic consume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// No live window existed. A fresh one was created with the attempt
    /// already recorded; `reset` equals the full duration.
    Created(WindowSnapshot),
    /// A live window had allowance left; one attempt was recorded. The
    /// window's original TTL is preserved.
    Admitted(WindowSnapshot),
    /// The window is exhausted. Nothing was written and the TTL was not
    /// extended.
    Rejected(WindowSnapshot),
}

impl ConsumeOutcome {
    /// The snapshot carried by any variant.
    pub fn snapshot(&self) -> &WindowSnapshot {
        match self {
            Self::Created(snapshot) | Self::Admitted(snapshot) | Self::Rejected(snapshot) => {
                snapshot
            }
        }
    }

    /// Whether the attempt was recorded.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Created(_) | Self::Admitted(_))
    }
}

/// The storage surface the limiter needs: get value + TTL, set value with
/// TTL, and an atomic conditional decrement. All durable state lives behind
/// this trait; the limiter itself holds no locks and no counters.
#[async_trait]
pub trait LimitStore: Send + Sync {
    /// Read the live counter for `key`.
    ///
    /// The value and its TTL must be observed against the same point in time
    /// (an atomic multi-read), so a caller never sees a stale `reset` for a
    /// freshly expired or recreated key. The TTL is authoritative: when it is
    /// not positive the counter is absent, even if the backend returned a
    /// stale value in the same round trip.
    ///
    /// # Errors
    ///
    /// [`ApopeiraError::MalformedState`] when a live value fails to
    /// deserialize; backend failures are propagated unchanged.
    async fn read(&self, key: &LimitKey) -> Result<Option<WindowSnapshot>, ApopeiraError>;

    /// Persist `state` under `key`, expiring after `state.duration` seconds.
    ///
    /// Value and TTL are set as one atomic operation; a reader must never
    /// observe a value without a TTL. Only the three persistent fields are
    /// written; a view's transient `reset` never is.
    async fn write(&self, key: &LimitKey, state: &LimitState) -> Result<(), ApopeiraError>;

    /// Atomically decrement-or-create the counter for `key`.
    ///
    /// This is the write path's single round trip. Implementations must make
    /// the whole read-decide-write sequence atomic per key: two concurrent
    /// consumers observing `remaining = 1` and both admitting would silently
    /// over-admit, which is exactly the race this method exists to prevent.
    ///
    /// Semantics:
    /// - no live window: create one with `remaining = limit - 1` (the attempt
    ///   being recorded already happened) and a fresh TTL of
    ///   `config.duration`;
    /// - live window with allowance: decrement, *preserving* the original
    ///   TTL. Only creation arms a fresh expiry, so rejected-attempt storms
    ///   cannot stretch the penalty window;
    /// - exhausted window: write nothing, extend nothing.
    async fn consume(
        &self,
        key: &LimitKey,
        config: &LimitConfig,
    ) -> Result<ConsumeOutcome, ApopeiraError>;
}
