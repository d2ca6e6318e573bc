//! Pure window accounting decisions.
//!
//! Everything here is synchronous and does no I/O: given a counter (or its
//! absence) and a config, decide admission and produce the state a backend
//! should persist. The Redis backend mirrors [`record_attempt`] inside its
//! consume script so the decision happens atomically server-side; the two
//! must stay in agreement.

use crate::{LimitConfig, LimitState, LimitView};

/// A window as it looks the moment it is created: full allowance, limit and
/// duration snapshotted from `config`.
///
/// The first recorded attempt is *not* deducted here: creation and
/// consumption are separate steps so the read-only check path can reason
/// about a window that does not exist yet.
pub fn fresh_window(config: &LimitConfig) -> LimitState {
    LimitState {
        remaining: *config.limit,
        total: *config.limit,
        duration: *config.duration,
    }
}

/// Deduct one attempt, with a floor at zero.
///
/// Returns `false` and leaves the state untouched when the window is already
/// exhausted; a rejected attempt must not mutate anything.
pub fn record_attempt(state: &mut LimitState) -> bool {
    if state.remaining == 0 {
        return false;
    }

    state.remaining -= 1;
    true
}

/// Whether an attempt is admitted given the current counter.
///
/// No counter means no attempts recorded yet, which always admits.
pub fn admits(existing: Option<&LimitState>) -> bool {
    match existing {
        None => true,
        Some(state) => state.remaining > 0,
    }
}

/// The view reported when no window exists: full allowance, `reset` equal to
/// the duration a window would get if one were created now.
pub fn fresh_view(config: &LimitConfig) -> LimitView {
    LimitView {
        remaining: *config.limit,
        total: *config.limit,
        duration: *config.duration,
        reset: *config.duration,
    }
}
