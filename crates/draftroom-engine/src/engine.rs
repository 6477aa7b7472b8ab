// Session registry and timer scheduler.
//
// Each session lives behind its own async mutex. Every pick, tick, expiry and
// admin command runs to completion while holding it, so a session only ever
// has one writer. Spawned tasks (countdowns, deferred auto-picks, settle-delay
// arms, admin auto-play) re-acquire the lock and re-check their generation or
// expected turn before touching anything.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use draftroom_core::autopick;
use draftroom_core::pick::Pick;
use draftroom_core::player::PlayerPool;
use draftroom_core::resolver;
use draftroom_core::session::{DraftSession, SessionConfig};
use draftroom_core::turn_order::{self, secure_rng};
use draftroom_core::DraftError;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::broadcast::{BroadcastError, BroadcastSink};
use crate::protocol::{ClockTick, EngineEvent, SessionSnapshot};
use crate::timer::{ActiveTimer, TimerConfig, TimerState};

/// Where a pick came from. Decides whether the next turn's clock is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PickSource {
    Manual,
    ClockExpiry,
    AdminAutoPlay,
}

/// Counters for conditions the engine recovers from on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub active_sessions: usize,
    pub broadcast_failures: u64,
    pub timer_arm_races: u64,
    pub abandoned_turns: u64,
}

struct SessionRuntime {
    session: DraftSession,
    timer: Option<ActiveTimer>,
    timer_state: TimerState,
    /// Bumped on every arm and cancel. A task armed with an older value is stale.
    timer_generation: u64,
    /// Turn a settle-delayed arm is waiting to start.
    pending_arm: Option<usize>,
    autoplay: Option<JoinHandle<()>>,
    /// Set by cleanup. Pending tasks that still hold the slot bail out.
    closed: bool,
}

impl SessionRuntime {
    fn new(session: DraftSession) -> Self {
        SessionRuntime {
            session,
            timer: None,
            timer_state: TimerState::Idle,
            timer_generation: 0,
            pending_arm: None,
            autoplay: None,
            closed: false,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::from_session(
            &self.session,
            self.timer_state,
            self.timer.as_ref().map(|t| t.remaining),
        )
    }

    fn ensure_open(&self) -> Result<(), DraftError> {
        if self.closed {
            return Err(DraftError::SessionNotFound(self.session.session_id.clone()));
        }
        Ok(())
    }

    fn cancel_timer(&mut self) {
        self.timer_generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
            self.timer_state = TimerState::Cancelled;
            debug!(
                session = %self.session.session_id,
                turn = timer.turn_index,
                "Clock cancelled with {}s left",
                timer.remaining
            );
        }
    }

    fn stop_autoplay(&mut self) -> bool {
        match self.autoplay.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

type SessionSlot = Mutex<SessionRuntime>;

struct EngineInner {
    pool: Arc<PlayerPool>,
    sink: Arc<dyn BroadcastSink>,
    timers: TimerConfig,
    sessions: StdMutex<HashMap<String, Arc<SessionSlot>>>,
    broadcast_failures: AtomicU64,
    timer_arm_races: AtomicU64,
    abandoned_turns: AtomicU64,
}

/// Runs any number of concurrent draft sessions, routed by session id.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct DraftEngine {
    inner: Arc<EngineInner>,
}

impl DraftEngine {
    pub fn new(pool: Arc<PlayerPool>, sink: Arc<dyn BroadcastSink>, timers: TimerConfig) -> Self {
        DraftEngine {
            inner: Arc::new(EngineInner {
                pool,
                sink,
                timers,
                sessions: StdMutex::new(HashMap::new()),
                broadcast_failures: AtomicU64::new(0),
                timer_arm_races: AtomicU64::new(0),
                abandoned_turns: AtomicU64::new(0),
            }),
        }
    }

    /// Produce a turn sequence for `config` without registering anything.
    pub fn generate_turn_order(&self, config: &SessionConfig) -> Result<Vec<String>, DraftError> {
        config.validate(&self.inner.pool)?;
        turn_order::generate(
            &config.team_ids(),
            config.rounds,
            config.mode,
            config.manual_order.as_deref(),
            &mut secure_rng(),
        )
    }

    /// Register a new, not yet started session.
    pub async fn create_session(&self, config: SessionConfig) -> Result<SessionSnapshot, DraftError> {
        let session_id = config.session_id.clone();
        let (slot, created) = self.inner.get_or_create(config)?;
        if !created {
            return Err(DraftError::InvalidConfig {
                field: "session_id".into(),
                message: format!("session `{session_id}` already exists"),
            });
        }
        let rt = slot.lock().await;
        Ok(rt.snapshot())
    }

    /// Create the session if needed, mark it started and generate its turn
    /// order. Calling it again on a started session changes nothing.
    pub async fn start_session(&self, config: SessionConfig) -> Result<SessionSnapshot, DraftError> {
        let (slot, _) = self.inner.get_or_create(config)?;
        let mut rt = slot.lock().await;
        rt.ensure_open()?;

        if rt.session.started {
            debug!(session = %rt.session.session_id, "start_session on a started session; no change");
            return Ok(rt.snapshot());
        }

        rt.session.ensure_turn_order(&mut secure_rng())?;
        rt.session.started = true;
        info!(
            session = %rt.session.session_id,
            "Session started: {} teams, {} rounds, {}s clock",
            rt.session.team_count(),
            rt.session.config.rounds,
            rt.session.config.clock_secs
        );
        self.inner.publish_snapshot(&rt);
        Ok(rt.snapshot())
    }

    /// Start the countdown for the team on the clock.
    ///
    /// No-op when a clock is already live, admin auto-play is running or the
    /// draft is finished.
    pub async fn start_clock(&self, session_id: &str) -> Result<(), DraftError> {
        let slot = self.inner.slot(session_id)?;
        let mut rt = slot.lock().await;
        rt.ensure_open()?;

        if rt.session.complete {
            debug!(session = %session_id, "start_clock on a complete session; ignoring");
            return Ok(());
        }
        if !rt.session.started || rt.session.turn_order.is_empty() {
            return Err(DraftError::SessionNotStarted(session_id.to_string()));
        }
        if rt.timer.is_some() {
            debug!(session = %session_id, "Clock already running; ignoring start_clock");
            return Ok(());
        }
        if rt.autoplay.is_some() {
            debug!(session = %session_id, "Auto-play active; ignoring start_clock");
            return Ok(());
        }

        self.inner.arm_timer(&slot, &mut rt);
        Ok(())
    }

    /// Draft `player_id` for the team on the clock.
    pub async fn submit_pick(&self, session_id: &str, player_id: &str) -> Result<Pick, DraftError> {
        let slot = self.inner.slot(session_id)?;
        let mut rt = slot.lock().await;
        rt.ensure_open()?;

        let pick = resolver::apply_pick(&mut rt.session, player_id, false, Utc::now())?;
        self.inner.after_pick(&slot, &mut rt, PickSource::Manual);
        Ok(pick)
    }

    /// Spend one extension token of the team on the clock. Returns the new
    /// remaining time in seconds.
    pub async fn extend_time(&self, session_id: &str) -> Result<u32, DraftError> {
        let slot = self.inner.slot(session_id)?;
        let mut rt = slot.lock().await;
        rt.ensure_open()?;

        if rt.session.complete {
            return Err(DraftError::SessionComplete(session_id.to_string()));
        }
        if rt.timer.is_none() || !rt.timer_state.is_counting() {
            return Err(DraftError::TimerNotRunning(session_id.to_string()));
        }
        let team_id = rt
            .session
            .team_on_clock_id()
            .ok_or_else(|| DraftError::SessionNotStarted(session_id.to_string()))?
            .to_string();

        let team = rt
            .session
            .team_mut(&team_id)
            .ok_or_else(|| DraftError::TeamNotFound(team_id.clone()))?;
        if team.extensions_remaining == 0 {
            return Err(DraftError::NoExtensionsRemaining(team_id));
        }
        team.extensions_remaining -= 1;
        let tokens_left = team.extensions_remaining;

        let extension = self.inner.timers.extension_secs;
        let remaining = match rt.timer.as_mut() {
            Some(timer) => {
                timer.remaining = timer.remaining.saturating_add(extension);
                timer.remaining
            }
            None => return Err(DraftError::TimerNotRunning(session_id.to_string())),
        };

        info!(
            session = %session_id,
            team = %team_id,
            "Clock extended by {extension}s to {remaining}s ({tokens_left} extensions left)"
        );
        self.inner.publish_tick(&rt);
        Ok(remaining)
    }

    /// Auto-pick on a fixed cadence until the draft completes, bypassing the
    /// clock. Replaces any auto-play loop already running.
    pub async fn admin_auto_play(&self, session_id: &str, every: Duration) -> Result<(), DraftError> {
        if every.is_zero() {
            return Err(DraftError::InvalidConfig {
                field: "interval".into(),
                message: "auto-play interval must be greater than 0".into(),
            });
        }
        let slot = self.inner.slot(session_id)?;
        let mut rt = slot.lock().await;
        rt.ensure_open()?;

        if rt.session.complete {
            return Err(DraftError::SessionComplete(session_id.to_string()));
        }
        if rt.session.turn_order.is_empty() {
            return Err(DraftError::SessionNotStarted(session_id.to_string()));
        }

        rt.cancel_timer();
        if rt.stop_autoplay() {
            info!(session = %session_id, "Replacing running auto-play loop");
        }
        let handle = tokio::spawn(run_autoplay(
            Arc::clone(&self.inner),
            Arc::clone(&slot),
            every,
        ));
        rt.autoplay = Some(handle);
        info!(session = %session_id, "Admin auto-play started every {:?}", every);
        Ok(())
    }

    /// Stop admin auto-play. Returns whether a loop was running.
    pub async fn stop_auto_play(&self, session_id: &str) -> Result<bool, DraftError> {
        let slot = self.inner.slot(session_id)?;
        let mut rt = slot.lock().await;
        rt.ensure_open()?;

        let stopped = rt.stop_autoplay();
        if stopped {
            info!(session = %session_id, "Admin auto-play stopped");
        }
        Ok(stopped)
    }

    /// Revert the most recent pick. If the clock was running it is re-armed
    /// for the rewound turn after the settle delay.
    pub async fn undo_last_pick(&self, session_id: &str) -> Result<Pick, DraftError> {
        let slot = self.inner.slot(session_id)?;
        let mut rt = slot.lock().await;
        rt.ensure_open()?;

        let clock_was_live = rt.timer.is_some() || rt.pending_arm.is_some();
        let pick = resolver::undo_last_pick(&mut rt.session, Utc::now())?;
        rt.cancel_timer();
        self.inner.publish_snapshot(&rt);

        if clock_was_live && rt.autoplay.is_none() {
            let turn = rt.session.current_turn;
            self.inner.schedule_arm(&slot, &mut rt, turn);
        }
        Ok(pick)
    }

    /// Mark a team's manager as connected or not.
    ///
    /// When an absent auto-pick team on the clock comes back, its deferred
    /// auto-pick is replaced by a visible countdown.
    pub async fn set_team_presence(
        &self,
        session_id: &str,
        team_id: &str,
        present: bool,
    ) -> Result<(), DraftError> {
        let slot = self.inner.slot(session_id)?;
        let mut rt = slot.lock().await;
        rt.ensure_open()?;

        let team = rt
            .session
            .team_mut(team_id)
            .ok_or_else(|| DraftError::TeamNotFound(team_id.to_string()))?;
        team.present = present;
        info!(session = %session_id, team = %team_id, "Team presence set to {present}");

        let on_clock = rt.session.team_on_clock_id() == Some(team_id);
        if present && on_clock && rt.timer_state == TimerState::Deferred {
            rt.cancel_timer();
            self.inner.arm_timer(&slot, &mut rt);
        }
        self.inner.publish_snapshot(&rt);
        Ok(())
    }

    /// Allow or forbid picking for an absent team without the visible clock.
    pub async fn set_team_auto_pick(
        &self,
        session_id: &str,
        team_id: &str,
        enabled: bool,
    ) -> Result<(), DraftError> {
        let slot = self.inner.slot(session_id)?;
        let mut rt = slot.lock().await;
        rt.ensure_open()?;

        let team = rt
            .session
            .team_mut(team_id)
            .ok_or_else(|| DraftError::TeamNotFound(team_id.to_string()))?;
        team.auto_pick = enabled;
        info!(session = %session_id, team = %team_id, "Team auto-pick set to {enabled}");
        self.inner.publish_snapshot(&rt);
        Ok(())
    }

    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, DraftError> {
        let slot = self.inner.slot(session_id)?;
        let rt = slot.lock().await;
        rt.ensure_open()?;
        Ok(rt.snapshot())
    }

    /// Cancel the clock and auto-play, then drop the session from the
    /// registry. Returns the final snapshot so results can still be exported.
    pub async fn cleanup(&self, session_id: &str) -> Result<SessionSnapshot, DraftError> {
        let slot = self
            .inner
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
            .ok_or_else(|| DraftError::SessionNotFound(session_id.to_string()))?;

        let mut rt = slot.lock().await;
        rt.closed = true;
        rt.cancel_timer();
        rt.stop_autoplay();
        info!(
            session = %session_id,
            "Session cleaned up after {} picks",
            rt.session.current_turn
        );
        Ok(rt.snapshot())
    }

    /// Ids of every registered session, sorted.
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            active_sessions: self
                .inner
                .sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            broadcast_failures: self.inner.broadcast_failures.load(Ordering::Relaxed),
            timer_arm_races: self.inner.timer_arm_races.load(Ordering::Relaxed),
            abandoned_turns: self.inner.abandoned_turns.load(Ordering::Relaxed),
        }
    }
}

impl EngineInner {
    fn slot(&self, session_id: &str) -> Result<Arc<SessionSlot>, DraftError> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .ok_or_else(|| DraftError::SessionNotFound(session_id.to_string()))
    }

    /// Look up a session, creating it from `config` if it is not registered.
    /// The bool is `true` when a new session was created.
    fn get_or_create(&self, config: SessionConfig) -> Result<(Arc<SessionSlot>, bool), DraftError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = sessions.get(&config.session_id) {
            return Ok((Arc::clone(slot), false));
        }

        let session_id = config.session_id.clone();
        let session = DraftSession::new(config, &self.pool)?;
        let slot = Arc::new(Mutex::new(SessionRuntime::new(session)));
        sessions.insert(session_id.clone(), Arc::clone(&slot));
        info!(session = %session_id, "Registered draft session");
        Ok((slot, true))
    }

    fn notify(&self, session_id: &str, event: EngineEvent) {
        if let Err(err) = self.sink.notify(session_id, &event) {
            self.broadcast_failures.fetch_add(1, Ordering::Relaxed);
            match err {
                BroadcastError::NoSubscribers => {
                    debug!(session = %session_id, "Broadcast skipped: {err}")
                }
                _ => warn!(session = %session_id, "Broadcast failed: {err}"),
            }
        }
    }

    fn publish_snapshot(&self, rt: &SessionRuntime) {
        let event = EngineEvent::SessionSnapshot(Box::new(rt.snapshot()));
        self.notify(&rt.session.session_id, event);
    }

    fn publish_tick(&self, rt: &SessionRuntime) {
        let (Some(timer), Some(team)) = (rt.timer.as_ref(), rt.session.team_on_clock()) else {
            return;
        };
        let tick = ClockTick {
            team_id: team.team_id.clone(),
            remaining_seconds: timer.remaining,
            can_extend: rt.timer_state.is_counting() && team.extensions_remaining > 0,
            turn_number: timer.turn_index as u32 + 1,
        };
        self.notify(&rt.session.session_id, EngineEvent::ClockTick(tick));
    }

    /// Arm the clock for the team on the clock.
    ///
    /// Any live timer is torn down first, so at most one tick task exists per
    /// session. Finding one here means two arm paths raced for the same turn.
    fn arm_timer(self: &Arc<Self>, slot: &Arc<SessionSlot>, rt: &mut SessionRuntime) {
        if let Some(existing) = rt.timer.take() {
            existing.handle.abort();
            self.timer_arm_races.fetch_add(1, Ordering::Relaxed);
            warn!(
                session = %rt.session.session_id,
                turn = existing.turn_index,
                "Timer arm race detected; replacing live clock"
            );
        }

        let Some(team) = rt.session.team_on_clock() else {
            return;
        };
        let deferred = team.auto_pick && !team.present;
        let team_id = team.team_id.clone();
        let turn_index = rt.session.current_turn;
        let clock_secs = rt.session.config.clock_secs;

        rt.timer_generation += 1;
        let generation = rt.timer_generation;

        if deferred {
            let grace = self.timers.absent_grace_for(clock_secs);
            let handle = tokio::spawn(run_deferred_pick(
                Arc::clone(self),
                Arc::clone(slot),
                generation,
                grace,
            ));
            rt.timer = Some(ActiveTimer {
                generation,
                turn_index,
                remaining: grace.as_secs() as u32,
                handle,
            });
            rt.timer_state = TimerState::Deferred;
            info!(
                session = %rt.session.session_id,
                team = %team_id,
                "Team absent with auto-pick on; picking for it in {:?}",
                grace
            );
            return;
        }

        let handle = tokio::spawn(run_countdown(Arc::clone(self), Arc::clone(slot), generation));
        rt.timer = Some(ActiveTimer {
            generation,
            turn_index,
            remaining: clock_secs,
            handle,
        });
        rt.timer_state = TimerState::Armed;
        info!(
            session = %rt.session.session_id,
            team = %team_id,
            "Clock armed: {clock_secs}s for pick {}",
            turn_index + 1
        );
        self.publish_tick(rt);
    }

    /// Arm the clock for `turn_index`, unless the session has moved on.
    fn arm_for_turn(self: &Arc<Self>, slot: &Arc<SessionSlot>, rt: &mut SessionRuntime, turn_index: usize) {
        if rt.pending_arm == Some(turn_index) {
            rt.pending_arm = None;
        }
        if rt.closed || rt.session.complete || rt.autoplay.is_some() {
            debug!(session = %rt.session.session_id, "Skipping arm: session closed, complete or on auto-play");
            return;
        }
        if rt.session.current_turn != turn_index {
            debug!(
                session = %rt.session.session_id,
                "Ignoring arm for turn {} (now on turn {})",
                turn_index,
                rt.session.current_turn
            );
            return;
        }
        self.arm_timer(slot, rt);
    }

    /// Arm the clock for `turn_index` after the settle delay.
    fn schedule_arm(
        self: &Arc<Self>,
        slot: &Arc<SessionSlot>,
        rt: &mut SessionRuntime,
        turn_index: usize,
    ) {
        rt.pending_arm = Some(turn_index);
        let inner = Arc::clone(self);
        let slot = Arc::clone(slot);
        let delay = self.timers.settle_delay;
        tokio::spawn(async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            let mut rt = slot.lock().await;
            inner.arm_for_turn(&slot, &mut rt, turn_index);
        });
    }

    /// Bookkeeping shared by every successful pick.
    fn after_pick(self: &Arc<Self>, slot: &Arc<SessionSlot>, rt: &mut SessionRuntime, source: PickSource) {
        rt.cancel_timer();

        if rt.session.complete {
            // The auto-play loop exits on its own when it made the final pick.
            if let Some(handle) = rt.autoplay.take() {
                if source != PickSource::AdminAutoPlay {
                    handle.abort();
                }
            }
            info!(session = %rt.session.session_id, "Draft complete; clock and auto-play released");
            self.publish_snapshot(rt);
            return;
        }

        self.publish_snapshot(rt);
        if source != PickSource::AdminAutoPlay && rt.autoplay.is_none() {
            let turn = rt.session.current_turn;
            self.schedule_arm(slot, rt, turn);
        }
    }

    /// Auto-pick for the team whose clock ran out.
    fn expire_turn(self: &Arc<Self>, slot: &Arc<SessionSlot>, rt: &mut SessionRuntime) {
        match autopick::auto_pick(&mut rt.session, Utc::now()) {
            Ok(_) => self.after_pick(slot, rt, PickSource::ClockExpiry),
            Err(err) => self.abandon_turn(rt, err),
        }
    }

    fn abandon_turn(&self, rt: &mut SessionRuntime, err: DraftError) {
        self.abandoned_turns.fetch_add(1, Ordering::Relaxed);
        match &err {
            DraftError::PoolExhausted { .. } => error!(
                session = %rt.session.session_id,
                "Invariant violated: {err}; abandoning pick {}",
                rt.session.current_turn + 1
            ),
            _ => warn!(
                session = %rt.session.session_id,
                "Auto-pick failed: {err}; abandoning pick {}",
                rt.session.current_turn + 1
            ),
        }
        self.publish_snapshot(rt);
    }
}

/// Count down once per tick; auto-pick at zero.
async fn run_countdown(inner: Arc<EngineInner>, slot: Arc<SessionSlot>, generation: u64) {
    let period = inner.timers.tick_interval;
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        ticker.tick().await;
        let mut rt = slot.lock().await;
        if rt.closed || rt.timer_generation != generation {
            return;
        }
        let remaining = match rt.timer.as_mut() {
            Some(timer) if timer.generation == generation => {
                timer.remaining = timer.remaining.saturating_sub(1);
                timer.remaining
            }
            _ => return,
        };

        if remaining > 0 {
            rt.timer_state = TimerState::Ticking;
            inner.publish_tick(&rt);
            continue;
        }

        rt.timer_state = TimerState::Expired;
        inner.publish_tick(&rt);
        // Dropping our own handle detaches it; this task ends below.
        rt.timer = None;
        info!(
            session = %rt.session.session_id,
            "Clock expired on pick {}",
            rt.session.current_turn + 1
        );
        inner.expire_turn(&slot, &mut rt);
        return;
    }
}

/// Single delayed auto-pick for an absent team.
async fn run_deferred_pick(
    inner: Arc<EngineInner>,
    slot: Arc<SessionSlot>,
    generation: u64,
    grace: Duration,
) {
    sleep(grace).await;
    let mut rt = slot.lock().await;
    if rt.closed || rt.timer_generation != generation {
        return;
    }
    rt.timer = None;
    rt.timer_state = TimerState::Expired;
    info!(
        session = %rt.session.session_id,
        "Grace window elapsed for absent team on pick {}",
        rt.session.current_turn + 1
    );
    inner.expire_turn(&slot, &mut rt);
}

async fn run_autoplay(inner: Arc<EngineInner>, slot: Arc<SessionSlot>, every: Duration) {
    let mut ticker = interval_at(Instant::now() + every, every);

    loop {
        ticker.tick().await;
        let mut rt = slot.lock().await;
        if rt.closed || rt.session.complete {
            rt.autoplay = None;
            return;
        }
        match autopick::auto_pick(&mut rt.session, Utc::now()) {
            Ok(_) => {
                inner.after_pick(&slot, &mut rt, PickSource::AdminAutoPlay);
                if rt.session.complete {
                    return;
                }
            }
            Err(err) => {
                rt.autoplay = None;
                inner.abandon_turn(&mut rt, err);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftroom_core::player::{Player, Position};
    use draftroom_core::roster::PositionCaps;
    use draftroom_core::session::TeamConfig;
    use draftroom_core::turn_order::DraftMode;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct RecordingSink {
        events: StdMutex<Vec<EngineEvent>>,
    }

    impl RecordingSink {
        fn ticks(&self) -> Vec<ClockTick> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    EngineEvent::ClockTick(t) => Some(t.clone()),
                    _ => None,
                })
                .collect()
        }

        fn snapshot_count(&self) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| matches!(e, EngineEvent::SessionSnapshot(_)))
                .count()
        }
    }

    impl BroadcastSink for RecordingSink {
        fn notify(&self, _session_id: &str, event: &EngineEvent) -> Result<(), BroadcastError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl BroadcastSink for FailingSink {
        fn notify(&self, _session_id: &str, _event: &EngineEvent) -> Result<(), BroadcastError> {
            Err(BroadcastError::Delivery("client went away".into()))
        }
    }

    fn pool() -> Arc<PlayerPool> {
        let mut players = Vec::new();
        let mut rank = 1;
        for pos in Position::ALL {
            for i in 1..=8 {
                players.push(Player {
                    id: format!("{}{i}", pos.display_str().to_lowercase()),
                    name: format!("{} {i}", pos.display_str()),
                    position: pos,
                    team: "DAL".into(),
                    rank,
                });
                rank += 1;
            }
        }
        Arc::new(PlayerPool::new(players))
    }

    fn config(teams: usize, rounds: usize, mode: DraftMode, clock_secs: u32) -> SessionConfig {
        let ids: Vec<String> = ["A", "B", "C", "D", "E"][..teams]
            .iter()
            .map(|s| s.to_string())
            .collect();
        SessionConfig {
            session_id: "draft-1".into(),
            teams: ids
                .iter()
                .map(|id| TeamConfig {
                    team_id: id.clone(),
                    team_name: format!("Team {id}"),
                })
                .collect(),
            rounds,
            mode,
            clock_secs,
            extension_tokens: 2,
            position_caps: PositionCaps::default(),
            manual_order: Some(ids),
        }
    }

    fn timers(settle_ms: u64) -> TimerConfig {
        TimerConfig {
            settle_delay: Duration::from_millis(settle_ms),
            absent_grace: Duration::from_secs(10),
            ..TimerConfig::default()
        }
    }

    fn engine(settle_ms: u64) -> (DraftEngine, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let engine = DraftEngine::new(pool(), sink.clone(), timers(settle_ms));
        (engine, sink)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn start_session_is_idempotent() {
        let (engine, _) = engine(250);
        let first = engine.start_session(config(4, 2, DraftMode::Snake, 30)).await.unwrap();
        engine.submit_pick("draft-1", "qb1").await.unwrap();

        let mut other = config(4, 2, DraftMode::Linear, 30);
        other.manual_order = None;
        let second = engine.start_session(other).await.unwrap();

        assert_eq!(second.turn_order, first.turn_order);
        assert_eq!(second.picks.len(), 1);
        assert_eq!(second.current_turn, 1);
        assert_eq!(engine.session_ids(), vec!["draft-1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn start_clock_twice_runs_a_single_timer() {
        let (engine, sink) = engine(250);
        engine.start_session(config(4, 2, DraftMode::Snake, 30)).await.unwrap();

        engine.start_clock("draft-1").await.unwrap();
        engine.start_clock("draft-1").await.unwrap();
        sleep(ms(5_500)).await;

        let remaining: Vec<u32> = sink.ticks().iter().map(|t| t.remaining_seconds).collect();
        assert_eq!(remaining, vec![30, 29, 28, 27, 26, 25]);
        assert_eq!(engine.stats().timer_arm_races, 0);
        let snap = engine.snapshot("draft-1").await.unwrap();
        assert_eq!(snap.timer_state, TimerState::Ticking);
        assert_eq!(snap.remaining_seconds, Some(25));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_produces_exactly_one_auto_pick() {
        let (engine, sink) = engine(250);
        engine.start_session(config(4, 2, DraftMode::Snake, 3)).await.unwrap();
        engine.start_clock("draft-1").await.unwrap();

        sleep(ms(3_500)).await;

        let snap = engine.snapshot("draft-1").await.unwrap();
        assert_eq!(snap.picks.len(), 1);
        let pick = &snap.picks[0];
        assert!(pick.is_auto_pick);
        assert_eq!(pick.team.team_id, "A");
        assert_eq!(pick.player.id, "qb1");

        let ticks = sink.ticks();
        let zero = ticks.iter().find(|t| t.remaining_seconds == 0).unwrap();
        assert!(!zero.can_extend);
        assert_eq!(zero.turn_number, 1);
        // Next team's clock is armed after the settle delay.
        assert_eq!(snap.on_the_clock.as_deref(), Some("B"));
        assert_eq!(ticks.last().unwrap().turn_number, 2);
        assert_eq!(snap.timer_state, TimerState::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_pick_cancels_clock_and_rearms_after_settle() {
        let (engine, sink) = engine(500);
        engine.start_session(config(4, 2, DraftMode::Snake, 30)).await.unwrap();
        engine.start_clock("draft-1").await.unwrap();
        sleep(ms(2_500)).await;

        engine.submit_pick("draft-1", "rb1").await.unwrap();
        let snap = engine.snapshot("draft-1").await.unwrap();
        assert_eq!(snap.timer_state, TimerState::Cancelled);
        assert_eq!(snap.remaining_seconds, None);

        // Nothing to extend between turns, and no token is spent trying.
        let err = engine.extend_time("draft-1").await.unwrap_err();
        assert!(matches!(err, DraftError::TimerNotRunning(_)));
        let snap = engine.snapshot("draft-1").await.unwrap();
        assert!(snap.teams.iter().all(|t| t.extensions_remaining == 2));

        sleep(ms(400)).await;
        assert_eq!(engine.snapshot("draft-1").await.unwrap().timer_state, TimerState::Cancelled);

        sleep(ms(200)).await;
        let snap = engine.snapshot("draft-1").await.unwrap();
        assert_eq!(snap.timer_state, TimerState::Armed);
        assert_eq!(snap.remaining_seconds, Some(30));
        assert_eq!(snap.on_the_clock.as_deref(), Some("B"));

        // No auto-pick happened and the old clock stopped ticking.
        assert!(snap.picks.iter().all(|p| !p.is_auto_pick));
        let turn_one: Vec<u32> = sink
            .ticks()
            .iter()
            .filter(|t| t.turn_number == 1)
            .map(|t| t.remaining_seconds)
            .collect();
        assert_eq!(turn_one, vec![30, 29, 28]);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_arm_for_a_past_turn_is_ignored() {
        let (engine, sink) = engine(1_000);
        engine.start_session(config(4, 2, DraftMode::Snake, 30)).await.unwrap();

        engine.submit_pick("draft-1", "qb1").await.unwrap();
        engine.submit_pick("draft-1", "qb2").await.unwrap();
        sleep(ms(1_500)).await;

        let ticks = sink.ticks();
        assert!(!ticks.is_empty());
        assert!(ticks.iter().all(|t| t.turn_number == 3));
        assert_eq!(ticks[0].team_id, "C");
        assert_eq!(engine.stats().timer_arm_races, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn racing_arm_paths_leave_one_tick_stream() {
        let (engine, sink) = engine(0);
        engine.start_session(config(4, 2, DraftMode::Snake, 30)).await.unwrap();

        // The pick schedules an arm for the next turn; the client starts the
        // clock for the same turn before that arm runs.
        engine.submit_pick("draft-1", "qb1").await.unwrap();
        engine.start_clock("draft-1").await.unwrap();
        sleep(ms(3_500)).await;

        assert!(engine.stats().timer_arm_races <= 1);
        let ticks = sink.ticks();
        for second in [29, 28, 27] {
            let n = ticks.iter().filter(|t| t.remaining_seconds == second).count();
            assert_eq!(n, 1, "remaining={second} was broadcast {n} times");
        }
        assert!(ticks.iter().all(|t| t.turn_number == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn extend_time_adds_seconds_and_spends_tokens() {
        let (engine, sink) = engine(250);
        engine.start_session(config(4, 2, DraftMode::Snake, 30)).await.unwrap();

        let err = engine.extend_time("draft-1").await.unwrap_err();
        assert!(matches!(err, DraftError::TimerNotRunning(_)));

        engine.start_clock("draft-1").await.unwrap();
        sleep(ms(2_500)).await;
        assert_eq!(engine.extend_time("draft-1").await.unwrap(), 58);
        assert_eq!(engine.extend_time("draft-1").await.unwrap(), 88);
        let err = engine.extend_time("draft-1").await.unwrap_err();
        assert_eq!(err, DraftError::NoExtensionsRemaining("A".into()));

        let snap = engine.snapshot("draft-1").await.unwrap();
        assert_eq!(snap.teams[0].extensions_remaining, 0);
        assert_eq!(snap.teams[1].extensions_remaining, 2);
        let last = sink.ticks().last().cloned().unwrap();
        assert_eq!(last.remaining_seconds, 88);
        assert!(!last.can_extend);
    }

    #[tokio::test(start_paused = true)]
    async fn absent_auto_pick_team_gets_deferred_pick_without_ticks() {
        let (engine, sink) = engine(250);
        engine.start_session(config(4, 2, DraftMode::Snake, 3)).await.unwrap();
        engine.set_team_auto_pick("draft-1", "A", true).await.unwrap();
        engine.set_team_presence("draft-1", "A", false).await.unwrap();

        engine.start_clock("draft-1").await.unwrap();
        assert_eq!(
            engine.snapshot("draft-1").await.unwrap().timer_state,
            TimerState::Deferred
        );
        let err = engine.extend_time("draft-1").await.unwrap_err();
        assert!(matches!(err, DraftError::TimerNotRunning(_)));

        sleep(ms(9_500)).await;
        assert!(sink.ticks().is_empty());
        assert!(engine.snapshot("draft-1").await.unwrap().picks.is_empty());

        sleep(ms(1_000)).await;
        let snap = engine.snapshot("draft-1").await.unwrap();
        assert_eq!(snap.picks.len(), 1);
        assert!(snap.picks[0].is_auto_pick);
        assert_eq!(snap.picks[0].team.team_id, "A");
        // B is present, so B gets a visible countdown.
        assert!(sink.ticks().iter().all(|t| t.team_id == "B"));
        assert!(!sink.ticks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn absent_team_rejoining_gets_visible_clock() {
        let (engine, sink) = engine(250);
        engine.start_session(config(4, 2, DraftMode::Snake, 30)).await.unwrap();
        engine.set_team_auto_pick("draft-1", "A", true).await.unwrap();
        engine.set_team_presence("draft-1", "A", false).await.unwrap();
        engine.start_clock("draft-1").await.unwrap();
        sleep(ms(2_000)).await;

        engine.set_team_presence("draft-1", "A", true).await.unwrap();
        let snap = engine.snapshot("draft-1").await.unwrap();
        assert_eq!(snap.timer_state, TimerState::Armed);
        assert_eq!(snap.remaining_seconds, Some(30));
        assert_eq!(sink.ticks().len(), 1);
        assert_eq!(engine.stats().timer_arm_races, 0);

        // The deferred pick that would have fired at 31s never happens.
        sleep(ms(29_500)).await;
        let snap = engine.snapshot("draft-1").await.unwrap();
        assert!(snap.picks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn admin_auto_play_runs_draft_to_completion() {
        let (engine, sink) = engine(250);
        engine.start_session(config(4, 2, DraftMode::Linear, 30)).await.unwrap();
        engine.start_clock("draft-1").await.unwrap();

        engine.admin_auto_play("draft-1", ms(100)).await.unwrap();
        sleep(ms(1_000)).await;

        let snap = engine.snapshot("draft-1").await.unwrap();
        assert!(snap.complete);
        assert_eq!(snap.picks.len(), 8);
        assert!(snap.picks.iter().all(|p| p.is_auto_pick));
        assert!(snap.teams.iter().all(|t| t.roster.len() == 2));
        // Only the initial tick from start_clock; auto-play bypasses the clock.
        assert_eq!(sink.ticks().len(), 1);
        assert!(!snap.timer_state.is_live());

        let err = engine.admin_auto_play("draft-1", ms(100)).await.unwrap_err();
        assert!(matches!(err, DraftError::SessionComplete(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_auto_play_halts_picking() {
        let (engine, _) = engine(250);
        engine.start_session(config(4, 2, DraftMode::Linear, 30)).await.unwrap();
        engine.admin_auto_play("draft-1", ms(100)).await.unwrap();
        sleep(ms(350)).await;

        assert!(engine.stop_auto_play("draft-1").await.unwrap());
        assert!(!engine.stop_auto_play("draft-1").await.unwrap());
        sleep(ms(1_000)).await;
        assert_eq!(engine.snapshot("draft-1").await.unwrap().picks.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn pool_exhaustion_abandons_the_turn() {
        let (engine, _) = engine(250);
        let mut cfg = config(5, 2, DraftMode::Linear, 30);
        cfg.position_caps = PositionCaps::new(BTreeMap::from([(Position::Quarterback, 2)]));
        engine.start_session(cfg).await.unwrap();

        engine.admin_auto_play("draft-1", ms(10)).await.unwrap();
        sleep(ms(1_000)).await;

        let snap = engine.snapshot("draft-1").await.unwrap();
        assert_eq!(snap.picks.len(), 8);
        assert_eq!(snap.current_turn, 8);
        assert!(!snap.complete);
        assert_eq!(engine.stats().abandoned_turns, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_stops_ticks_and_unregisters() {
        let (engine, sink) = engine(250);
        engine.start_session(config(4, 2, DraftMode::Snake, 30)).await.unwrap();
        engine.start_clock("draft-1").await.unwrap();
        sleep(ms(2_500)).await;

        let final_snap = engine.cleanup("draft-1").await.unwrap();
        assert_eq!(final_snap.timer_state, TimerState::Cancelled);
        let ticks_at_cleanup = sink.ticks().len();

        sleep(ms(5_000)).await;
        assert_eq!(sink.ticks().len(), ticks_at_cleanup);
        assert!(engine.session_ids().is_empty());
        assert_eq!(engine.stats().active_sessions, 0);

        let err = engine.snapshot("draft-1").await.unwrap_err();
        assert_eq!(err, DraftError::SessionNotFound("draft-1".into()));
        let err = engine.submit_pick("draft-1", "qb1").await.unwrap_err();
        assert_eq!(err, DraftError::SessionNotFound("draft-1".into()));
        assert!(engine.cleanup("draft-1").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_failures_are_counted_not_fatal() {
        let engine = DraftEngine::new(pool(), Arc::new(FailingSink), timers(250));
        engine.start_session(config(4, 2, DraftMode::Snake, 30)).await.unwrap();
        engine.start_clock("draft-1").await.unwrap();
        let pick = engine.submit_pick("draft-1", "wr1").await.unwrap();
        assert_eq!(pick.player.id, "wr1");

        // snapshot on start, initial tick, snapshot after the pick
        assert!(engine.stats().broadcast_failures >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_pick_leaves_session_untouched() {
        let (engine, sink) = engine(250);
        engine.start_session(config(4, 2, DraftMode::Snake, 30)).await.unwrap();
        engine.submit_pick("draft-1", "qb1").await.unwrap();
        let before = engine.snapshot("draft-1").await.unwrap();
        let published = sink.snapshot_count();

        let err = engine.submit_pick("draft-1", "qb1").await.unwrap_err();
        assert_eq!(err, DraftError::PlayerUnavailable("qb1".into()));
        let err = engine.submit_pick("nope", "qb2").await.unwrap_err();
        assert_eq!(err, DraftError::SessionNotFound("nope".into()));

        assert_eq!(engine.snapshot("draft-1").await.unwrap(), before);
        assert_eq!(sink.snapshot_count(), published);
    }

    #[tokio::test(start_paused = true)]
    async fn undo_rewinds_and_rearms_running_clock() {
        let (engine, sink) = engine(250);
        engine.start_session(config(4, 2, DraftMode::Snake, 30)).await.unwrap();
        engine.submit_pick("draft-1", "qb1").await.unwrap();
        sleep(ms(500)).await; // B's clock is armed

        let undone = engine.undo_last_pick("draft-1").await.unwrap();
        assert_eq!(undone.player.id, "qb1");
        let snap = engine.snapshot("draft-1").await.unwrap();
        assert_eq!(snap.current_turn, 0);
        assert_eq!(snap.history.len(), 2);
        assert!(snap.picks.is_empty());
        assert_eq!(snap.available[0].id, "qb1");

        sleep(ms(500)).await;
        let snap = engine.snapshot("draft-1").await.unwrap();
        assert_eq!(snap.timer_state, TimerState::Armed);
        assert_eq!(sink.ticks().last().unwrap().team_id, "A");

        let err = engine.undo_last_pick("draft-1").await.unwrap_err();
        assert!(matches!(err, DraftError::NothingToUndo(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_extension_saturates_instead_of_overflowing() {
        let sink = Arc::new(RecordingSink::default());
        let timers = TimerConfig {
            extension_secs: u32::MAX,
            ..timers(250)
        };
        let engine = DraftEngine::new(pool(), sink, timers);
        engine.start_session(config(4, 2, DraftMode::Snake, 30)).await.unwrap();
        engine.start_clock("draft-1").await.unwrap();

        assert_eq!(engine.extend_time("draft-1").await.unwrap(), u32::MAX);
        assert_eq!(engine.extend_time("draft-1").await.unwrap(), u32::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn undo_before_next_clock_arms_still_rearms_rewound_turn() {
        let (engine, sink) = engine(250);
        engine.start_session(config(4, 2, DraftMode::Snake, 5)).await.unwrap();
        engine.start_clock("draft-1").await.unwrap();
        sleep(ms(1_500)).await;

        engine.submit_pick("draft-1", "qb1").await.unwrap();
        sleep(ms(100)).await; // B's arm is still pending
        engine.undo_last_pick("draft-1").await.unwrap();

        sleep(ms(300)).await;
        let snap = engine.snapshot("draft-1").await.unwrap();
        assert_eq!(snap.current_turn, 0);
        assert_eq!(snap.timer_state, TimerState::Armed);
        assert_eq!(snap.remaining_seconds, Some(5));
        assert!(sink.ticks().iter().all(|t| t.team_id == "A"));

        // Left alone, the rewound turn expires into an auto-pick.
        sleep(Duration::from_secs(8)).await;
        let snap = engine.snapshot("draft-1").await.unwrap();
        assert_eq!(snap.picks.len(), 1);
        assert_eq!(snap.picks[0].team.team_id, "A");
        assert!(snap.picks[0].is_auto_pick);
        assert_eq!(engine.stats().timer_arm_races, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn create_session_rejects_duplicates_and_waits_for_start() {
        let (engine, _) = engine(250);
        let snap = engine.create_session(config(2, 1, DraftMode::Snake, 30)).await.unwrap();
        assert!(!snap.started);
        assert!(snap.turn_order.is_empty());

        let err = engine.start_clock("draft-1").await.unwrap_err();
        assert!(matches!(err, DraftError::SessionNotStarted(_)));
        let err = engine.create_session(config(2, 1, DraftMode::Snake, 30)).await.unwrap_err();
        assert!(matches!(err, DraftError::InvalidConfig { .. }));
    }

    #[test]
    fn generate_turn_order_validates_config() {
        let (engine, _) = engine(250);
        let seq = engine.generate_turn_order(&config(4, 2, DraftMode::Snake, 30)).unwrap();
        assert_eq!(seq, vec!["A", "B", "C", "D", "D", "C", "B", "A"]);

        let mut bad = config(4, 2, DraftMode::Snake, 30);
        bad.manual_order = Some(vec!["A".into(), "A".into(), "B".into(), "C".into()]);
        assert!(matches!(
            engine.generate_turn_order(&bad),
            Err(DraftError::InvalidTurnOrder(_))
        ));
    }
}
