//! Session registry
//!
//! Tracks at most one session per [`ProbeKind`] and drives the per-kind state
//! machine:
//!
//! ```text
//!          start                 isEnd / Finished observed
//!   Idle ─────────▶ Running ──────────────────────────────▶ Idle
//!                      │
//!                      │ stop
//!                      ▼
//!                  Stopping ── engine ack / grace elapsed ──▶ Idle
//! ```
//!
//! A `start` while Running either supersedes the running session (implicit
//! stop, then a fresh start) or is refused, depending on [`RestartPolicy`].
//!
//! ## Locking
//!
//! Every kind has its own slot. A slot pairs a synchronous state lock, held
//! only for short transitions and never across an await, with an async
//! command lane that serializes the engine commands of that kind. Nothing is
//! shared between kinds.
//!
//! A third, synchronous delivery lock is held while an event of the slot is
//! handed to listeners. `start` and `stop` take it briefly after retiring a
//! session, which blocks the calling thread until an in-flight delivery
//! returns. Listeners must therefore return promptly; a listener that blocks
//! stalls the runtime worker that is running `start` or `stop` of its kind.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{RestartPolicy, SessionConfig};
use crate::error::{Error, Result};
use crate::probe::{ProbeKind, ProbeParams, SessionId};
use crate::traits::ProbeEngine;

/// Lifecycle state of a kind's session slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
}

/// The runtime instance of a started probe
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub params: ProbeParams,
    pub created_at: DateTime<Utc>,
}

impl Session {
    fn new(id: SessionId, params: ProbeParams) -> Self {
        Self {
            id,
            params,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> ProbeKind {
        self.params.kind()
    }
}

#[derive(Debug)]
struct SlotState {
    state: SessionState,
    session: Option<Session>,
}

#[derive(Debug)]
struct SessionSlot {
    lane: tokio::sync::Mutex<()>,
    delivery: Mutex<()>,
    state: Mutex<SlotState>,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            lane: tokio::sync::Mutex::new(()),
            delivery: Mutex::new(()),
            state: Mutex::new(SlotState {
                state: SessionState::Idle,
                session: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // Transitions never panic half-way, so a poisoned slot is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait until no delivery for the slot's previous session is in flight
    fn await_deliveries(&self) {
        drop(self.delivery.lock().unwrap_or_else(|e| e.into_inner()));
    }
}

/// Exclusive owner of session state, one slot per probe kind
#[derive(Debug)]
pub struct SessionRegistry {
    slots: HashMap<ProbeKind, SessionSlot>,
    policy: RestartPolicy,
    grace_period: Duration,
    next_id: AtomicU64,
}

impl SessionRegistry {
    /// Create a registry with every slot Idle
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            slots: ProbeKind::ALL.iter().map(|kind| (*kind, SessionSlot::new())).collect(),
            policy: config.restart_policy,
            grace_period: config.stop_grace_period(),
            next_id: AtomicU64::new(1),
        }
    }

    fn slot(&self, kind: ProbeKind) -> &SessionSlot {
        // Slots are created for every kind up front.
        &self.slots[&kind]
    }

    /// Start a session and issue the engine start command
    ///
    /// Returns the id the engine tags this session's raw results with.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidState` if the kind is Running and the policy is `Reject`
    /// - Whatever the engine returns for the start command; the slot is left Idle
    pub async fn start(&self, engine: &dyn ProbeEngine, params: ProbeParams) -> Result<SessionId> {
        self.start_with(engine, params, || ()).await.map(|(id, ())| id)
    }

    /// Like [`SessionRegistry::start`], running `admit` once the start is accepted
    ///
    /// `admit` runs after the restart policy allowed the start and any
    /// superseded session can no longer deliver, but before the engine is
    /// told to start. Its value is dropped if the engine refuses.
    pub async fn start_with<T>(
        &self,
        engine: &dyn ProbeEngine,
        params: ProbeParams,
        admit: impl FnOnce() -> T,
    ) -> Result<(SessionId, T)> {
        let kind = params.kind();
        let slot = self.slot(kind);
        let _lane = slot.lane.lock().await;

        let superseded = {
            let mut st = slot.lock();
            if st.state == SessionState::Running && self.policy == RestartPolicy::Reject {
                let running = st.session.as_ref().map(|s| s.id.to_string()).unwrap_or_default();
                return Err(Error::invalid_state(format!(
                    "{} session {} is already running",
                    kind, running
                )));
            }
            let previous = st.session.take();
            if previous.is_some() {
                st.state = SessionState::Stopping;
            }
            previous
        };
        slot.await_deliveries();
        let admitted = admit();

        if let Some(previous) = superseded {
            info!("Superseding {} session {}", kind, previous.id);
            self.stop_in_engine(engine, kind).await;
        }

        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        {
            let mut st = slot.lock();
            st.session = Some(Session::new(id, params.clone()));
            st.state = SessionState::Running;
        }

        if let Err(e) = engine.start(id, &params).await {
            warn!("Engine {} refused to start {} session {}: {}", engine.engine_name(), kind, id, e);
            let mut st = slot.lock();
            if st.session.as_ref().is_some_and(|s| s.id == id) {
                st.session = None;
                st.state = SessionState::Idle;
            }
            return Err(e);
        }

        info!("Started {} session {}", kind, id);
        Ok((id, admitted))
    }

    /// Stop the running session of `kind`
    ///
    /// Stopping an Idle kind is a no-op. A Running session moves to Stopping,
    /// the engine stop command is issued, and the slot returns to Idle once
    /// the engine acknowledges or the grace period elapses.
    pub async fn stop(&self, engine: &dyn ProbeEngine, kind: ProbeKind) {
        let slot = self.slot(kind);
        let _lane = slot.lane.lock().await;

        let stopping = {
            let mut st = slot.lock();
            if st.state != SessionState::Running {
                debug!("Stop for idle {} ignored", kind);
                return;
            }
            st.state = SessionState::Stopping;
            st.session.as_ref().map(|s| s.id)
        };
        slot.await_deliveries();

        self.stop_in_engine(engine, kind).await;

        let mut st = slot.lock();
        st.session = None;
        st.state = SessionState::Idle;
        if let Some(id) = stopping {
            info!("Stopped {} session {}", kind, id);
        }
    }

    async fn stop_in_engine(&self, engine: &dyn ProbeEngine, kind: ProbeKind) {
        match tokio::time::timeout(self.grace_period, engine.stop(kind)).await {
            Ok(Ok(())) => debug!("Engine acknowledged {} stop", kind),
            Ok(Err(e)) => warn!("Engine {} failed to stop {}: {}", engine.engine_name(), kind, e),
            Err(_) => warn!(
                "Engine {} did not acknowledge {} stop within {:?}",
                engine.engine_name(),
                kind,
                self.grace_period
            ),
        }
    }

    /// Run `publish` if `session` is still the Running session of `kind`
    ///
    /// Start and stop wait for an in-flight `publish` before they return, so
    /// once a session is superseded or stopped none of its events reach
    /// listeners. A `terminal` delivery returns the slot to Idle before
    /// `publish` runs.
    ///
    /// Returns `false` (without calling `publish`) for stale sessions.
    pub fn deliver(
        &self,
        kind: ProbeKind,
        session: SessionId,
        terminal: bool,
        publish: impl FnOnce(),
    ) -> bool {
        let slot = self.slot(kind);
        let _delivery = slot.delivery.lock().unwrap_or_else(|e| e.into_inner());

        {
            let mut st = slot.lock();
            let current =
                st.state == SessionState::Running && st.session.as_ref().is_some_and(|s| s.id == session);
            if !current {
                return false;
            }
            if terminal {
                st.session = None;
                st.state = SessionState::Idle;
                info!("Completed {} session {}", kind, session);
            }
        }

        publish();
        true
    }

    /// Whether `session` is the Running session of `kind`
    pub fn is_current(&self, kind: ProbeKind, session: SessionId) -> bool {
        let st = self.slot(kind).lock();
        st.state == SessionState::Running && st.session.as_ref().is_some_and(|s| s.id == session)
    }

    /// Whether `kind` has a Running session
    pub fn is_active(&self, kind: ProbeKind) -> bool {
        self.state(kind) == SessionState::Running
    }

    pub fn state(&self, kind: ProbeKind) -> SessionState {
        self.slot(kind).lock().state
    }

    /// Snapshot of the current session of `kind`, if any
    pub fn session(&self, kind: ProbeKind) -> Option<Session> {
        self.slot(kind).lock().session.clone()
    }
}
