use tracing::{debug, trace};

use crate::{Admission, ApopeiraError, ConsumeOutcome, LimitConfig, LimitKey, LimitStore, policy};

/// The attempts-limiter engine.
///
/// Composes a [`LimitStore`] backend with the pure [`policy`] rules into the
/// two operations the host pipeline calls: a read-only [`check`] before the
/// protected work runs, and an atomic [`consume`] afterwards. All durable
/// state lives in the store; the engine holds no locks and is safe to share
/// across any number of concurrent workers.
///
/// Errors are returned to the caller, never logged or swallowed here, and a
/// store failure is never turned into an implicit allow or deny.
///
/// [`check`]: AttemptLimiter::check
/// [`consume`]: AttemptLimiter::consume
///
/// # Examples
///
/// ```
/// use apopeira::{AttemptLimiter, LimitConfig, LimitKey, MemoryLimitStore};
///
/// # futures::executor::block_on(async {
/// let limiter = AttemptLimiter::new(MemoryLimitStore::new());
/// let config = LimitConfig::new(2, 60)?;
/// let key = LimitKey::try_from("10.0.0.1:/login".to_string())?;
///
/// assert!(limiter.check(&key, &config).await?.is_allowed());
///
/// limiter.consume(&key, &config).await?;
/// limiter.consume(&key, &config).await?;
///
/// assert!(!limiter.check(&key, &config).await?.is_allowed());
/// # Ok::<(), apopeira::ApopeiraError>(())
/// # }).unwrap();
/// ```
pub struct AttemptLimiter<S> {
    store: S,
}

impl<S: LimitStore> AttemptLimiter<S> {
    /// Create a limiter over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read-only admission test, run before the protected work executes.
    ///
    /// Never mutates the store: calling this any number of times changes
    /// nothing but the monotonically decreasing `reset` in the returned view.
    /// When the decision is [`Admission::Rejected`] the pipeline should
    /// short-circuit with a "too many requests" outcome carrying
    /// `view().reset`; formatting that response is the caller's job.
    pub async fn check(
        &self,
        key: &LimitKey,
        config: &LimitConfig,
    ) -> Result<Admission, ApopeiraError> {
        trace!(%key, "checking admission");

        match self.store.read(key).await? {
            None => Ok(Admission::Allowed(policy::fresh_view(config))),
            Some(snapshot) => {
                if policy::admits(Some(&snapshot.state)) {
                    Ok(Admission::Allowed(snapshot.view()))
                } else {
                    debug!(%key, reset = snapshot.reset, "window exhausted");
                    Ok(Admission::Rejected(snapshot.view()))
                }
            }
        }
    }

    /// Record one attempt against `key`, run after the protected work.
    ///
    /// A single atomic decrement-or-create against the store: a fresh window
    /// is created with the attempt already deducted and `reset` equal to the
    /// full duration; an existing window is decremented with its original TTL
    /// preserved; an exhausted window is left exactly as it was.
    pub async fn consume(
        &self,
        key: &LimitKey,
        config: &LimitConfig,
    ) -> Result<Admission, ApopeiraError> {
        trace!(%key, "consuming attempt");

        match self.store.consume(key, config).await? {
            ConsumeOutcome::Created(snapshot) | ConsumeOutcome::Admitted(snapshot) => {
                Ok(Admission::Allowed(snapshot.view()))
            }
            ConsumeOutcome::Rejected(snapshot) => {
                debug!(%key, reset = snapshot.reset, "window exhausted");
                Ok(Admission::Rejected(snapshot.view()))
            }
        }
    }

    /// Post-action hook: consume only when the outcome counts.
    ///
    /// With `generic_mode` set every attempt counts; otherwise only
    /// non-successes do. Returns `None` when the attempt did not count. The
    /// engine never inspects outcomes beyond this dispatch.
    pub async fn record_outcome(
        &self,
        key: &LimitKey,
        config: &LimitConfig,
        success: bool,
    ) -> Result<Option<Admission>, ApopeiraError> {
        if !config.counts_outcome(success) {
            return Ok(None);
        }

        self.consume(key, config).await.map(Some)
    }
}
