use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::types::Session;

/// Capacity of the fired-reminder channel. Fires are rare (one timer exists
/// at a time), so a small buffer suffices.
const FIRED_CHANNEL_CAPACITY: usize = 8;

/// A reminder timer that reached its deadline while its session was still
/// the active one. Consumed by the runtime's reminder delivery loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderFire {
    pub session_id: String,
}

struct ArmedTimer {
    session_id: String,
    handle: JoinHandle<()>,
}

/// Everything the exactly-one-timer invariant protects. Mutated only under
/// the manager's mutex — including from timer-callback tasks.
struct TimerState {
    active_session_id: Option<String>,
    timer: Option<ArmedTimer>,
    last_activity: Instant,
    /// Bumped on every cancel/re-arm; a fired task whose generation is stale
    /// lost a race with cancellation and is dropped.
    generation: u64,
}

/// Process-wide session activity tracker and master inactivity timer.
///
/// At any instant at most one timer is armed, bound to the most recently
/// active session. Arming, cancelling, activation, and the fire-time gate
/// all serialize on one mutex; the timer itself is a spawned sleep task
/// cancelled synchronously via `abort()`.
pub struct SessionTimerManager {
    inner: Mutex<TimerState>,
    sessions: DashMap<String, Session>,
    /// transport id → client session id.
    transport_map: DashMap<String, String>,
    fired_tx: mpsc::Sender<ReminderFire>,
}

impl SessionTimerManager {
    /// Create the manager plus the receiving end of the fired-reminder
    /// channel (consumed by the reminder delivery loop).
    pub fn new() -> (Arc<Self>, mpsc::Receiver<ReminderFire>) {
        let (fired_tx, fired_rx) = mpsc::channel(FIRED_CHANNEL_CAPACITY);
        let manager = Arc::new(Self {
            inner: Mutex::new(TimerState {
                active_session_id: None,
                timer: None,
                last_activity: Instant::now(),
                generation: 0,
            }),
            sessions: DashMap::new(),
            transport_map: DashMap::new(),
            fired_tx,
        });
        (manager, fired_rx)
    }

    /// Make `session_id` the active session, cancelling any armed timer.
    /// Idempotent for the same id (the timer is still cancelled).
    pub fn set_active(&self, session_id: &str) {
        {
            let mut state = self.inner.lock().unwrap();
            Self::cancel_locked(&mut state);
            state.active_session_id = Some(session_id.to_string());
            state.last_activity = Instant::now();
        }
        self.sessions
            .entry(session_id.to_string())
            .and_modify(|s| s.touch())
            .or_insert_with(|| Session::new(session_id));
        info!(session = %session_id, "active session set");
    }

    /// Arm the inactivity timer for `session_id`. Always activates the
    /// session first (which cancels any previous timer); `seconds <= 0`
    /// means "do not arm".
    pub fn arm(self: &Arc<Self>, session_id: &str, seconds: i64) {
        self.set_active(session_id);
        if seconds <= 0 {
            debug!(session = %session_id, seconds, "inactivity timer not armed");
            return;
        }
        self.arm_after(session_id, Duration::from_secs(seconds as u64));
    }

    /// Duration-granular arm used by `arm` and by tests that cannot afford
    /// whole-second waits. Does not touch the active session.
    pub fn arm_after(self: &Arc<Self>, session_id: &str, delay: Duration) {
        let mut state = self.inner.lock().unwrap();
        Self::cancel_locked(&mut state);
        let generation = state.generation;

        let manager = Arc::clone(self);
        let owner = session_id.to_string();
        let task_owner = owner.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.fire(&task_owner, generation);
        });

        state.timer = Some(ArmedTimer {
            session_id: owner,
            handle,
        });
        info!(session = %session_id, delay_ms = delay.as_millis() as u64, "inactivity timer armed");
    }

    /// Cancel the armed timer unconditionally. The active session is
    /// unchanged.
    pub fn cancel(&self, session_id: &str) {
        let mut state = self.inner.lock().unwrap();
        if state.timer.is_some() {
            info!(requested_by = %session_id, "inactivity timer cancelled");
        }
        Self::cancel_locked(&mut state);
    }

    /// Bind a transport session to a client session and make it active.
    pub fn on_session_activate(&self, transport_id: &str, client_session_id: &str) {
        self.transport_map
            .insert(transport_id.to_string(), client_session_id.to_string());
        debug!(transport = %transport_id, session = %client_session_id, "transport mapped");
        self.set_active(client_session_id);
    }

    /// Transport disconnect: if the mapped client session is the active one,
    /// cancel the timer and clear the active session. Fails when the
    /// transport id was never bound via `on_session_activate`.
    pub fn on_disconnect(&self, transport_id: &str) -> Result<()> {
        let Some((_, client_session_id)) = self.transport_map.remove(transport_id) else {
            return Err(SessionError::UnknownTransport {
                id: transport_id.to_string(),
            });
        };

        let mut state = self.inner.lock().unwrap();
        if state.active_session_id.as_deref() == Some(client_session_id.as_str()) {
            info!(session = %client_session_id, "active session disconnected, tearing down timer");
            Self::cancel_locked(&mut state);
            state.active_session_id = None;
        }
        Ok(())
    }

    /// The currently active session id, if any.
    pub fn active_session(&self) -> Option<String> {
        self.inner.lock().unwrap().active_session_id.clone()
    }

    /// Time since the last activity touch (any `set_active`).
    pub fn idle_for(&self) -> Duration {
        self.inner.lock().unwrap().last_activity.elapsed()
    }

    /// Whether a timer is currently armed (and for which session).
    pub fn armed_for(&self) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .timer
            .as_ref()
            .map(|t| t.session_id.clone())
    }

    /// Look up a known session.
    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    /// Resolve a transport id to its client session.
    pub fn client_session(&self, transport_id: &str) -> Option<String> {
        self.transport_map.get(transport_id).map(|s| s.clone())
    }

    // --- private helpers ---------------------------------------------------

    /// Abort any armed timer and invalidate in-flight fires. Callers hold
    /// the state mutex.
    fn cancel_locked(state: &mut TimerState) {
        if let Some(timer) = state.timer.take() {
            timer.handle.abort();
            debug!(session = %timer.session_id, "armed timer aborted");
        }
        state.generation = state.generation.wrapping_add(1);
    }

    /// Timer deadline reached. Under the same mutex every mutation uses:
    /// drop the fire when it lost a race with cancellation, or when the
    /// session it was armed for is no longer the active one.
    fn fire(&self, session_id: &str, generation: u64) {
        {
            let mut state = self.inner.lock().unwrap();
            if state.generation != generation {
                debug!(session = %session_id, "stale timer fire dropped");
                return;
            }
            if state.active_session_id.as_deref() != Some(session_id) {
                info!(
                    session = %session_id,
                    active = state.active_session_id.as_deref().unwrap_or("none"),
                    "timer fired for a superseded session, dropped"
                );
                return;
            }
            state.timer = None;
            state.generation = state.generation.wrapping_add(1);
        }

        info!(session = %session_id, "inactivity timer fired");
        // try_send keeps the timer task from ever blocking; a full channel
        // means the delivery loop is wedged and dropping is the safe move.
        if self
            .fired_tx
            .try_send(ReminderFire {
                session_id: session_id.to_string(),
            })
            .is_err()
        {
            warn!(session = %session_id, "reminder channel full or closed, fire dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout};

    async fn expect_no_fire(rx: &mut mpsc::Receiver<ReminderFire>, wait_ms: u64) {
        let result = timeout(Duration::from_millis(wait_ms), rx.recv()).await;
        assert!(result.is_err(), "no reminder should fire, got {result:?}");
    }

    #[tokio::test]
    async fn timer_fires_for_the_active_session() {
        let (manager, mut rx) = SessionTimerManager::new();
        manager.set_active("a");
        manager.arm_after("a", Duration::from_millis(20));

        let fire = timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("fire within deadline")
            .expect("channel open");
        assert_eq!(fire.session_id, "a");
    }

    #[tokio::test]
    async fn switching_sessions_cancels_the_armed_timer() {
        let (manager, mut rx) = SessionTimerManager::new();
        manager.set_active("a");
        manager.arm_after("a", Duration::from_millis(60));

        sleep(Duration::from_millis(10)).await;
        manager.set_active("b");

        expect_no_fire(&mut rx, 150).await;
        assert_eq!(manager.active_session().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn rearming_keeps_exactly_one_timer() {
        let (manager, mut rx) = SessionTimerManager::new();
        manager.set_active("a");
        manager.arm_after("a", Duration::from_millis(30));
        manager.set_active("b");
        manager.arm_after("b", Duration::from_millis(30));

        let fire = timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("fire")
            .expect("open");
        assert_eq!(fire.session_id, "b");
        expect_no_fire(&mut rx, 100).await;
    }

    #[tokio::test]
    async fn non_positive_timeout_means_no_timer() {
        let (manager, mut rx) = SessionTimerManager::new();
        manager.arm("a", -1);
        manager.arm("a", 0);
        expect_no_fire(&mut rx, 80).await;
    }

    #[tokio::test]
    async fn disconnect_of_active_session_tears_down_everything() {
        let (manager, mut rx) = SessionTimerManager::new();
        manager.on_session_activate("transport-1", "a");
        manager.arm_after("a", Duration::from_millis(60));

        sleep(Duration::from_millis(10)).await;
        manager.on_disconnect("transport-1").expect("bound transport");

        expect_no_fire(&mut rx, 150).await;
        assert_eq!(manager.active_session(), None);
    }

    #[tokio::test]
    async fn disconnect_of_an_unbound_transport_is_an_error() {
        let (manager, _rx) = SessionTimerManager::new();
        let err = manager
            .on_disconnect("never-seen")
            .expect_err("unknown transport must fail");
        assert!(matches!(err, SessionError::UnknownTransport { id } if id == "never-seen"));
    }

    #[tokio::test]
    async fn disconnect_of_inactive_session_is_ignored() {
        let (manager, mut rx) = SessionTimerManager::new();
        manager.on_session_activate("transport-1", "a");
        manager.on_session_activate("transport-2", "b");
        manager.arm_after("b", Duration::from_millis(30));

        // "a" is no longer active; its disconnect must not disturb "b".
        manager.on_disconnect("transport-1").expect("bound transport");
        assert_eq!(manager.active_session().as_deref(), Some("b"));

        let fire = timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("fire")
            .expect("open");
        assert_eq!(fire.session_id, "b");
    }

    #[tokio::test]
    async fn cancel_keeps_the_active_session() {
        let (manager, mut rx) = SessionTimerManager::new();
        manager.set_active("a");
        manager.arm_after("a", Duration::from_millis(40));
        manager.cancel("a");

        expect_no_fire(&mut rx, 120).await;
        assert_eq!(manager.active_session().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn activity_touch_resets_the_idle_clock() {
        let (manager, _rx) = SessionTimerManager::new();
        sleep(Duration::from_millis(30)).await;
        manager.set_active("a");
        assert!(manager.idle_for() < Duration::from_millis(25));
    }

    #[tokio::test]
    async fn sessions_are_upserted_and_never_deleted() {
        let (manager, _rx) = SessionTimerManager::new();
        manager.on_session_activate("t1", "a");
        manager.on_session_activate("t2", "b");
        manager.on_disconnect("t1").expect("bound transport");

        assert!(manager.session("a").is_some());
        assert!(manager.session("b").is_some());
    }
}
