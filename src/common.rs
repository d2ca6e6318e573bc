use std::{fmt, ops::Deref, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::ApopeiraError;

/// Maximum attempts per window.
///
/// A validated newtype: must be at least 1. Building the limit up front means
/// an invalid value is rejected before any store round trip happens.
///
/// # Examples
///
/// ```
/// use apopeira::AttemptLimit;
///
/// let limit = AttemptLimit::try_from(5).unwrap();
/// assert_eq!(*limit, 5);
///
/// assert!(AttemptLimit::try_from(0).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttemptLimit(u32);

impl Deref for AttemptLimit {
    type Target = u32;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u32> for AttemptLimit {
    type Error = ApopeiraError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value == 0 {
            return Err(ApopeiraError::InvalidConfig(
                "limit must be at least 1".to_string(),
            ));
        }

        Ok(Self(value))
    }
}

/// Window length in seconds.
///
/// A validated newtype: must be at least 1. The value is snapshotted into each
/// window at creation and doubles as the key's expiry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowSeconds(u64);

impl Deref for WindowSeconds {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for WindowSeconds {
    type Error = ApopeiraError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            return Err(ApopeiraError::InvalidConfig(
                "duration must be at least 1 second".to_string(),
            ));
        }

        Ok(Self(value))
    }
}

/// Per-route limiter configuration.
///
/// Resolved by the host from its global defaults and per-route overrides, then
/// passed by reference into every [`check`](crate::AttemptLimiter::check) and
/// [`consume`](crate::AttemptLimiter::consume) call. There is no process-wide
/// settings object inside the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LimitConfig {
    /// Maximum attempts per window.
    pub limit: AttemptLimit,
    /// Window length in seconds.
    pub duration: WindowSeconds,
    /// When `true`, every attempt counts against the limit. When `false`
    /// (the default), only attempts whose outcome was not a success count.
    pub generic_mode: bool,
    /// Trust the forwarded-for header chain when resolving identity.
    pub trust_proxy: bool,
}

impl LimitConfig {
    /// Build a config with the given limit and duration and both flags off.
    ///
    /// # Errors
    ///
    /// [`ApopeiraError::InvalidConfig`] when `limit` or `duration` is zero.
    pub fn new(limit: u32, duration: u64) -> Result<Self, ApopeiraError> {
        Ok(Self {
            limit: AttemptLimit::try_from(limit)?,
            duration: WindowSeconds::try_from(duration)?,
            generic_mode: false,
            trust_proxy: false,
        })
    }

    /// Whether an attempt with the given outcome counts against the limit.
    ///
    /// In generic mode every attempt counts; otherwise only non-successes do.
    /// The limiter itself never inspects outcomes; this helper only decides
    /// whether [`consume`](crate::AttemptLimiter::consume) should be called.
    pub fn counts_outcome(&self, success: bool) -> bool {
        self.generic_mode || !success
    }
}

impl Default for LimitConfig {
    /// 5 attempts per 60 second window, selective accounting, proxies
    /// untrusted.
    fn default() -> Self {
        Self {
            limit: AttemptLimit(5),
            duration: WindowSeconds(60),
            generic_mode: false,
            trust_proxy: false,
        }
    }
}

/// The persisted counter for one identifier.
///
/// Stored serialized under the identifier's key; the key's TTL, not any
/// stored timestamp, says when the window resets. A `LimitState` exists for
/// an identifier iff its key has a live TTL, so expiry deletes the counter
/// implicitly and nothing ever deletes it explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitState {
    /// Attempts left in the current window. Never exceeds `total`; once it
    /// reaches 0 it is never decremented further.
    pub remaining: u32,
    /// The configured limit, snapshotted when the window was created.
    pub total: u32,
    /// The configured duration in seconds, snapshotted at creation.
    pub duration: u64,
}

/// A point-in-time view of one identifier's allowance.
///
/// Ephemeral, never persisted. `reset` is derived from the key's live TTL at
/// read time, so it counts down correctly inside a window that is not freshly
/// created. The `total`/`remaining`/`reset` triple maps directly onto the
/// usual rate-limit response headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LimitView {
    /// Attempts left in the current window.
    pub remaining: u32,
    /// Maximum attempts for this window.
    pub total: u32,
    /// Window length in seconds.
    pub duration: u64,
    /// Seconds until the window resets, clamped to zero.
    pub reset: u64,
}

/// The limiter's answer for one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// The attempt may proceed (or, on the consume path, was recorded).
    Allowed(LimitView),
    /// The window is exhausted. Nothing was written; `view().reset` says how
    /// long until the window expires.
    Rejected(LimitView),
}

impl Admission {
    /// Whether the attempt was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }

    /// The view carried by either variant.
    pub fn view(&self) -> &LimitView {
        match self {
            Self::Allowed(view) | Self::Rejected(view) => view,
        }
    }

    /// Consume the decision, keeping only the view.
    pub fn into_view(self) -> LimitView {
        match self {
            Self::Allowed(view) | Self::Rejected(view) => view,
        }
    }
}

const MAX_KEY_BYTES: usize = 512;

/// A validated limiter key.
///
/// Produced by [`RequestIdentity::resolve`](crate::RequestIdentity::resolve)
/// as `address:path`, or built directly via `TryFrom<String>` for callers
/// keying on something else (account ids, API tokens). Must not be empty and
/// must fit in 512 bytes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LimitKey(Arc<str>);

impl LimitKey {
    /// Internal constructor for resolver output, which is non-empty by
    /// construction.
    pub(crate) fn from_resolved(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl Deref for LimitKey {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LimitKey {
    type Error = ApopeiraError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(ApopeiraError::InvalidKey(
                "limit key must not be empty".to_string(),
            ))
        } else if value.len() > MAX_KEY_BYTES {
            Err(ApopeiraError::InvalidKey(format!(
                "limit key must not be longer than {MAX_KEY_BYTES} bytes"
            )))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}
