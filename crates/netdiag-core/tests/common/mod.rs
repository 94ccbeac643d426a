//! Test doubles and common utilities for contract tests
//!
//! The `ControlledEngine` stands in for a platform probe engine: the test
//! decides which raw records it emits and inspects which commands it got.

#![allow(dead_code)]

use netdiag_core::error::{Error, Result};
use netdiag_core::traits::{EngineEvent, ProbeEngine, RawPayload, RawResult};
use netdiag_core::{NetDiagConfig, NetDiagnosis, PlatformGate, ProbeEvent, ProbeKind, ProbeParams, SdkLogLevel, SessionId};
use serde_json::Value;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::Stream;

/// How long a test waits for an event before failing
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Knobs for the controlled engine
#[derive(Debug, Clone, Default)]
pub struct EngineBehavior {
    /// Never resolve `stop`, forcing the grace period
    pub hang_on_stop: bool,
    /// Fail every `start`
    pub refuse_start: bool,
    /// Payload answered to `lookup_domain`
    pub lookup_response: Option<Value>,
    /// Payload answered to `network_info`
    pub network_info_response: Option<Value>,
    /// Delay before answering a one-shot query
    pub query_delay: Option<Duration>,
}

/// A controlled ProbeEngine that emits raw records on demand
pub struct ControlledEngine {
    behavior: EngineBehavior,
    /// Sender for the test to push raw records
    test_tx: mpsc::UnboundedSender<RawResult>,
    /// Receiver handed out by results()
    engine_rx: Mutex<Option<mpsc::UnboundedReceiver<RawResult>>>,
    /// Every start command, in order
    starts: Mutex<Vec<(SessionId, ProbeParams)>>,
    /// Every stop command, in order
    stops: Mutex<Vec<ProbeKind>>,
    log_levels: Mutex<Vec<SdkLogLevel>>,
    initialize_call_count: AtomicUsize,
    lookup_call_count: AtomicUsize,
    network_info_call_count: AtomicUsize,
}

impl ControlledEngine {
    pub fn new(behavior: EngineBehavior) -> Arc<Self> {
        let (test_tx, engine_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            behavior,
            test_tx,
            engine_rx: Mutex::new(Some(engine_rx)),
            starts: Mutex::new(Vec::new()),
            stops: Mutex::new(Vec::new()),
            log_levels: Mutex::new(Vec::new()),
            initialize_call_count: AtomicUsize::new(0),
            lookup_call_count: AtomicUsize::new(0),
            network_info_call_count: AtomicUsize::new(0),
        })
    }

    /// Emit a raw record as the engine would
    pub fn emit(&self, session: SessionId, event: EngineEvent, payload: impl Into<RawPayload>) {
        let _ = self.test_tx.send(RawResult::new(session, event, payload));
    }

    /// Session id of the most recent start of `kind`
    pub fn last_session(&self, kind: ProbeKind) -> SessionId {
        self.starts
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(_, params)| params.kind() == kind)
            .map(|(id, _)| *id)
            .expect("kind was never started")
    }

    pub fn starts(&self) -> Vec<(SessionId, ProbeParams)> {
        self.starts.lock().unwrap().clone()
    }

    pub fn stops(&self) -> Vec<ProbeKind> {
        self.stops.lock().unwrap().clone()
    }

    pub fn log_levels(&self) -> Vec<SdkLogLevel> {
        self.log_levels.lock().unwrap().clone()
    }

    pub fn initialize_call_count(&self) -> usize {
        self.initialize_call_count.load(Ordering::SeqCst)
    }

    pub fn lookup_call_count(&self) -> usize {
        self.lookup_call_count.load(Ordering::SeqCst)
    }

    pub fn network_info_call_count(&self) -> usize {
        self.network_info_call_count.load(Ordering::SeqCst)
    }

    async fn answer(&self, response: &Option<Value>) -> Result<RawPayload> {
        if let Some(delay) = self.behavior.query_delay {
            tokio::time::sleep(delay).await;
        }
        response
            .clone()
            .map(RawPayload::from)
            .ok_or_else(|| Error::engine("controlled", "no response configured"))
    }
}

#[async_trait::async_trait]
impl ProbeEngine for ControlledEngine {
    async fn initialize(&self) -> Result<()> {
        self.initialize_call_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_log_level(&self, level: SdkLogLevel) -> Result<()> {
        self.log_levels.lock().unwrap().push(level);
        Ok(())
    }

    fn sdk_version(&self) -> String {
        "controlled-1.0".to_string()
    }

    async fn start(&self, session: SessionId, params: &ProbeParams) -> Result<()> {
        self.starts.lock().unwrap().push((session, params.clone()));
        if self.behavior.refuse_start {
            return Err(Error::engine("controlled", "start refused"));
        }
        Ok(())
    }

    async fn stop(&self, kind: ProbeKind) -> Result<()> {
        self.stops.lock().unwrap().push(kind);
        if self.behavior.hang_on_stop {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn results(&self) -> Pin<Box<dyn Stream<Item = RawResult> + Send + 'static>> {
        // Take the receiver (only called once)
        let rx = self
            .engine_rx
            .lock()
            .unwrap()
            .take()
            .expect("results() can only be called once");

        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }

    async fn lookup_domain(&self, _domain: &str) -> Result<RawPayload> {
        self.lookup_call_count.fetch_add(1, Ordering::SeqCst);
        self.answer(&self.behavior.lookup_response).await
    }

    async fn network_info(&self) -> Result<RawPayload> {
        self.network_info_call_count.fetch_add(1, Ordering::SeqCst);
        self.answer(&self.behavior.network_info_response).await
    }

    fn engine_name(&self) -> &'static str {
        "controlled"
    }
}

/// Install a test-friendly tracing subscriber once per test binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Build a supported façade over `engine`
pub fn client_with(engine: &Arc<ControlledEngine>, config: NetDiagConfig) -> NetDiagnosis {
    init_tracing();
    let engine: Arc<dyn ProbeEngine> = engine.clone();
    NetDiagnosis::new(PlatformGate::supported("test", engine), config).expect("client construction succeeds")
}

/// Listener that forwards every event into a channel
pub fn collector() -> (impl Fn(&ProbeEvent) + Send + Sync + 'static, mpsc::UnboundedReceiver<ProbeEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = move |event: &ProbeEvent| {
        let _ = tx.send(event.clone());
    };
    (listener, rx)
}

/// Wait for the next event or fail the test
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<ProbeEvent>) -> ProbeEvent {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("listener channel closed")
}

/// Assert that nothing arrives within `window`
pub async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<ProbeEvent>, window: Duration) {
    if let Ok(Some(event)) = tokio::time::timeout(window, rx.recv()).await {
        panic!("unexpected event: {:?}", event);
    }
}

/// Poll `condition` until it holds or the event timeout passes
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition never became true");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
