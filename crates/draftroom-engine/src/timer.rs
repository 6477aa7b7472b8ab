// Timer scheduler types and tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// Lifecycle of a session's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    /// No clock has run for the current turn.
    #[default]
    Idle,
    /// Armed; the first tick has not elapsed yet.
    Armed,
    /// Counting down once per tick.
    Ticking,
    /// Team is absent with auto-pick on: a single delayed auto-pick is pending
    /// and no countdown is shown.
    Deferred,
    /// Reached zero and auto-picked.
    Expired,
    /// Torn down before reaching zero.
    Cancelled,
}

impl TimerState {
    /// Whether a tick task or deferred pick is live.
    pub fn is_live(&self) -> bool {
        matches!(self, TimerState::Armed | TimerState::Ticking | TimerState::Deferred)
    }

    /// Whether a visible countdown is running (extensions only apply here).
    pub fn is_counting(&self) -> bool {
        matches!(self, TimerState::Armed | TimerState::Ticking)
    }
}

/// Scheduler tuning shared by every session in an engine.
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Wall-clock length of one countdown tick.
    pub tick_interval: Duration,
    /// Pause between a pick landing and the next turn's clock being armed.
    /// Lets in-flight expiry or arm events for the finished turn drain first.
    pub settle_delay: Duration,
    /// Seconds added by one extension token.
    pub extension_secs: u32,
    /// Wait before auto-picking for an absent auto-pick team. Always treated
    /// as at least one second longer than the session's visible clock.
    pub absent_grace: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        TimerConfig {
            tick_interval: Duration::from_secs(1),
            settle_delay: Duration::from_millis(250),
            extension_secs: 30,
            absent_grace: Duration::from_secs(90),
        }
    }
}

impl TimerConfig {
    /// Effective grace window for a session whose clock is `clock_secs` long.
    pub fn absent_grace_for(&self, clock_secs: u32) -> Duration {
        let floor = Duration::from_secs(u64::from(clock_secs) + 1);
        self.absent_grace.max(floor)
    }
}

/// The live clock of one session. Owned by the session runtime; at most one
/// exists per session.
#[derive(Debug)]
pub(crate) struct ActiveTimer {
    /// Generation this timer was armed with. Tasks whose generation no longer
    /// matches the session's exit without touching state.
    pub generation: u64,
    /// Turn the timer was armed for.
    pub turn_index: usize,
    pub remaining: u32,
    pub handle: JoinHandle<()>,
}
