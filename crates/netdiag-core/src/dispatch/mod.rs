//! Result dispatcher
//!
//! Drains the engine's raw result stream, decodes each record and hands it to
//! the multiplexer, while the session registry decides which records are
//! still wanted.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ ProbeEngine  │─── RawResult ───┐
//! └──────────────┘                 │
//!                                  ▼
//!                          ┌──────────────┐
//!                          │    router    │  stamps per-kind sequence
//!                          └──────────────┘
//!                                  │ one lane per ProbeKind
//!         ┌────────────────────────┼────────────────────────┐
//!         ▼                        ▼                        ▼
//!  ┌─────────────┐          ┌─────────────┐          ┌─────────────┐
//!  │ ping worker │   ...    │ scan worker │   ...    │ lan worker  │
//!  └─────────────┘          └─────────────┘          └─────────────┘
//!         │  decode, check session, publish
//!         ▼
//!  ┌──────────────────┐
//!  │ EventMultiplexer │
//!  └──────────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. Raw record arrives and is stamped with the next sequence of its kind
//! 2. The kind's worker decodes it
//! 3. Records of a session that is no longer Running are dropped
//! 4. A terminal record returns the session to Idle, then is published
//!
//! A slow listener on one kind never delays another kind: each kind has its
//! own lane and worker task.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decoder;
use crate::multiplexer::{Envelope, EventMultiplexer};
use crate::probe::{DecodedResult, ProbeEvent, ProbeKind, ProbeParams, SessionId};
use crate::session::SessionRegistry;
use crate::traits::{EngineEvent, ProbeEngine, RawResult};

type Lane = mpsc::UnboundedSender<(u64, RawResult)>;

/// Background tasks that move engine results to listeners
///
/// Dropping the dispatcher cancels its tasks; [`Dispatcher::shutdown`] also
/// waits for them to finish.
pub struct Dispatcher {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn the router and one worker per probe kind
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        engine: &Arc<dyn ProbeEngine>,
        sessions: Arc<SessionRegistry>,
        mux: EventMultiplexer,
    ) -> Self {
        let cancel = CancellationToken::new();
        let mut tasks = Vec::with_capacity(ProbeKind::ALL.len() + 1);
        let mut lanes: HashMap<ProbeKind, Lane> = HashMap::new();

        for kind in ProbeKind::ALL {
            let (tx, rx) = mpsc::unbounded_channel();
            lanes.insert(kind, tx);

            let worker = KindWorker {
                kind,
                sessions: Arc::clone(&sessions),
                mux: mux.clone(),
                port_progress: None,
            };
            tasks.push(tokio::spawn(worker.run(rx, cancel.clone())));
        }

        let results = engine.results();
        let engine_name = engine.engine_name();
        tasks.push(tokio::spawn(route(results, lanes, mux, engine_name, cancel.clone())));

        debug!("Dispatcher started for engine {}", engine_name);
        Self { cancel, tasks }
    }

    /// Cancel the background tasks and wait for them to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await
                && e.is_panic()
            {
                warn!("Dispatcher task panicked during shutdown: {}", e);
            }
        }
        info!("Dispatcher stopped");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn route(
    mut results: std::pin::Pin<Box<dyn tokio_stream::Stream<Item = RawResult> + Send>>,
    lanes: HashMap<ProbeKind, Lane>,
    mux: EventMultiplexer,
    engine_name: &'static str,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Router cancelled");
                break;
            }

            next = results.next() => {
                let Some(raw) = next else {
                    info!("Result stream of engine {} ended", engine_name);
                    break;
                };
                let kind = raw.kind();
                let sequence = mux.next_sequence(kind);
                if let Some(lane) = lanes.get(&kind)
                    && lane.send((sequence, raw)).is_err()
                {
                    warn!("Worker for {} is gone, dropping result", kind);
                }
            }
        }
    }
}

/// Per-kind consumer of raw results
struct KindWorker {
    kind: ProbeKind,
    sessions: Arc<SessionRegistry>,
    mux: EventMultiplexer,
    /// Ports reported so far for the current port scan session
    port_progress: Option<(SessionId, usize)>,
}

impl KindWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<(u64, RawResult)>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                next = rx.recv() => match next {
                    Some((sequence, raw)) => self.handle(sequence, raw),
                    None => break,
                },
            }
        }
        debug!("Worker for {} stopped", self.kind);
    }

    fn handle(&mut self, sequence: u64, raw: RawResult) {
        let kind = self.kind;
        let session = raw.session;

        if !self.sessions.is_current(kind, session) {
            debug!("Dropping {} from stale session {}", raw.event.name(), session);
            return;
        }

        let last_port = raw.event == EngineEvent::PortScanResult && self.count_port(session);

        let (event, terminal) = match decoder::decode(&raw) {
            Ok(mut result) => {
                if let DecodedResult::PortScan(port) = &mut result
                    && last_port
                {
                    port.is_end = true;
                }
                let terminal = result.is_terminal();
                (ProbeEvent::Result { session, result }, terminal)
            }
            Err(error) => {
                warn!("Failed to decode {} for session {}: {}", raw.event.name(), session, error);
                let terminal = last_port || decoder::signals_end(&raw);
                (
                    ProbeEvent::Failed {
                        session,
                        kind,
                        error,
                        terminal,
                    },
                    terminal,
                )
            }
        };

        let envelope = Envelope { sequence, event };
        let published = self.sessions.deliver(kind, session, terminal, || {
            self.mux.publish(kind, &envelope);
        });
        if !published {
            debug!("Session {} ended before {} #{} was delivered", session, kind, sequence);
        }
    }

    /// Count a port record of `session`, decoded or not
    ///
    /// Returns true once every port of the selection has reported.
    fn count_port(&mut self, session: SessionId) -> bool {
        let seen = match self.port_progress {
            Some((id, count)) if id == session => count + 1,
            _ => 1,
        };
        self.port_progress = Some((session, seen));

        match self.sessions.session(self.kind) {
            Some(current) if current.id == session => match current.params {
                ProbeParams::PortScan { ports, .. } => seen >= ports.len(),
                _ => false,
            },
            _ => false,
        }
    }
}
