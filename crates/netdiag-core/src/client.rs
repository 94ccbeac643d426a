//! Network diagnosis façade
//!
//! [`NetDiagnosis`] is the single entry point callers use. It owns the
//! session registry, the event multiplexer and the result dispatcher, and
//! applies the capability gate uniformly: without an engine every start
//! returns an inert [`Subscription`], every liveness query is `false` and
//! every one-shot query fails with [`crate::Error::UnsupportedPlatform`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use netdiag_core::{NetDiagnosis, NetDiagConfig, PlatformGate, ProbeEvent};
//!
//! let client = NetDiagnosis::new(PlatformGate::supported("ios", engine), NetDiagConfig::default())?;
//! client.initialize().await?;
//!
//! let subscription = client
//!     .start_ping("192.0.2.1", 4, |event: &ProbeEvent| println!("{:?}", event))
//!     .await?;
//!
//! // ... later
//! subscription.unsubscribe();
//! client.shutdown().await;
//! ```

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{NetDiagConfig, SdkLogLevel};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::gate::{EngineRegistry, PlatformGate};
use crate::multiplexer::{EventMultiplexer, Subscription};
use crate::probe::{LookupRecord, NetworkInfo, PortSelection, ProbeEvent, ProbeKind, ProbeParams};
use crate::query::QueryFacade;
use crate::session::{Session, SessionRegistry, SessionState};

/// Version reported when no engine is available
pub const SDK_VERSION_UNAVAILABLE: &str = "N/A";

/// Unified API for streaming probes and one-shot queries
pub struct NetDiagnosis {
    gate: PlatformGate,
    config: NetDiagConfig,
    sessions: Arc<SessionRegistry>,
    mux: EventMultiplexer,
    queries: QueryFacade,
    dispatcher: Option<Dispatcher>,
}

impl NetDiagnosis {
    /// Create the façade over a resolved gate
    ///
    /// With a supported gate this spawns the result dispatcher, so it must be
    /// called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the configuration is invalid
    /// - `Error::InvalidState` for a supported gate outside a tokio runtime
    pub fn new(gate: PlatformGate, config: NetDiagConfig) -> Result<Self> {
        config.validate()?;
        if gate.is_supported() && tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::invalid_state("a tokio runtime is required to run probes"));
        }

        let sessions = Arc::new(SessionRegistry::new(&config.session));
        let mux = EventMultiplexer::new();
        let dispatcher = match &gate {
            PlatformGate::Supported { engine, .. } => {
                Some(Dispatcher::spawn(engine, Arc::clone(&sessions), mux.clone()))
            }
            PlatformGate::Unsupported { .. } => None,
        };

        info!("Network diagnosis ready on {} (supported: {})", gate.platform(), gate.is_supported());

        Ok(Self {
            queries: QueryFacade::new(gate.clone()),
            gate,
            config,
            sessions,
            mux,
            dispatcher,
        })
    }

    /// Resolve the engine for the configured platform and create the façade
    pub fn from_registry(registry: &EngineRegistry, config: NetDiagConfig) -> Result<Self> {
        let gate = PlatformGate::resolve(registry, &config)?;
        Self::new(gate, config)
    }

    /// A façade with no engine; every operation takes the fallback path
    pub fn unsupported() -> Self {
        let config = NetDiagConfig::default();
        let gate = PlatformGate::unsupported(config.platform_name());
        Self {
            sessions: Arc::new(SessionRegistry::new(&config.session)),
            mux: EventMultiplexer::new(),
            queries: QueryFacade::new(gate.clone()),
            dispatcher: None,
            gate,
            config,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.gate.is_supported()
    }

    pub fn platform(&self) -> &str {
        self.gate.platform()
    }

    pub fn config(&self) -> &NetDiagConfig {
        &self.config
    }

    // ---- SDK pass-through ----

    /// Initialize the engine and apply the configured SDK log level
    pub async fn initialize(&self) -> Result<()> {
        let Ok(engine) = self.gate.engine() else {
            debug!("initialize ignored: platform not supported");
            return Ok(());
        };
        engine.initialize().await?;
        engine.set_log_level(self.config.sdk.log_level).await
    }

    /// Forward a log level to the engine SDK
    pub async fn set_log_level(&self, level: SdkLogLevel) -> Result<()> {
        match self.gate.engine() {
            Ok(engine) => engine.set_log_level(level).await,
            Err(_) => Ok(()),
        }
    }

    pub fn sdk_version(&self) -> String {
        match self.gate.engine() {
            Ok(engine) => engine.sdk_version(),
            Err(_) => SDK_VERSION_UNAVAILABLE.to_string(),
        }
    }

    // ---- Generic session API ----

    /// Register a listener for `kind` without starting anything
    ///
    /// Allowed before any session of `kind` exists; events arrive once one is
    /// started.
    pub fn subscribe<F>(&self, kind: ProbeKind, listener: F) -> Subscription
    where
        F: Fn(&ProbeEvent) + Send + Sync + 'static,
    {
        if !self.gate.is_supported() {
            return Subscription::inert(kind);
        }
        self.mux.subscribe(kind, listener)
    }

    /// Start a probe and subscribe `listener` to its kind
    ///
    /// The listener is registered once the restart policy admits the start
    /// and before the engine is told to start, so it sees every event of the
    /// new session and none of a running one. A running session of the same
    /// kind is superseded or the start is refused, per the restart policy.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidInput` for invalid parameters
    /// - `Error::InvalidState` if the kind is running and the policy rejects
    /// - The engine's error if it refuses to start; the listener is removed
    pub async fn start<F>(&self, params: ProbeParams, listener: F) -> Result<Subscription>
    where
        F: Fn(&ProbeEvent) + Send + Sync + 'static,
    {
        let kind = params.kind();
        let Ok(engine) = self.gate.engine() else {
            debug!("start {} ignored: platform not supported", kind);
            return Ok(Subscription::inert(kind));
        };

        params.validate()?;
        let (_, subscription) = self
            .sessions
            .start_with(engine.as_ref(), params, || self.mux.subscribe(kind, listener))
            .await?;
        Ok(subscription)
    }

    /// Stop the running session of `kind`; a no-op when Idle
    ///
    /// Existing subscriptions stay registered.
    pub async fn stop(&self, kind: ProbeKind) {
        if let Ok(engine) = self.gate.engine() {
            self.sessions.stop(engine.as_ref(), kind).await;
        }
    }

    /// Whether `kind` has a Running session
    pub fn is_active(&self, kind: ProbeKind) -> bool {
        self.gate.is_supported() && self.sessions.is_active(kind)
    }

    pub fn session_state(&self, kind: ProbeKind) -> SessionState {
        self.sessions.state(kind)
    }

    /// The current session of `kind`, if any
    pub fn session(&self, kind: ProbeKind) -> Option<Session> {
        self.sessions.session(kind)
    }

    // ---- Ping ----

    pub async fn start_ping<F>(&self, host: impl Into<String>, count: u32, listener: F) -> Result<Subscription>
    where
        F: Fn(&ProbeEvent) + Send + Sync + 'static,
    {
        let params = ProbeParams::Ping {
            host: host.into(),
            count,
        };
        self.start(params, listener).await
    }

    pub async fn stop_ping(&self) {
        self.stop(ProbeKind::Ping).await
    }

    pub fn is_pinging(&self) -> bool {
        self.is_active(ProbeKind::Ping)
    }

    // ---- Traceroute ----

    pub async fn start_traceroute<F>(&self, host: impl Into<String>, listener: F) -> Result<Subscription>
    where
        F: Fn(&ProbeEvent) + Send + Sync + 'static,
    {
        self.start(ProbeParams::Traceroute { host: host.into() }, listener).await
    }

    pub async fn stop_traceroute(&self) {
        self.stop(ProbeKind::Traceroute).await
    }

    pub fn is_tracerouting(&self) -> bool {
        self.is_active(ProbeKind::Traceroute)
    }

    // ---- UDP traceroute ----

    /// Start a UDP traceroute; runs until stopped
    ///
    /// `max_ttl` falls back to `defaults.udp_max_ttl`.
    pub async fn start_udp_traceroute<F>(
        &self,
        host: impl Into<String>,
        max_ttl: Option<u8>,
        listener: F,
    ) -> Result<Subscription>
    where
        F: Fn(&ProbeEvent) + Send + Sync + 'static,
    {
        let params = ProbeParams::UdpTraceroute {
            host: host.into(),
            max_ttl: max_ttl.unwrap_or(self.config.defaults.udp_max_ttl),
        };
        self.start(params, listener).await
    }

    pub async fn stop_udp_traceroute(&self) {
        self.stop(ProbeKind::UdpTraceroute).await
    }

    pub fn is_udp_tracerouting(&self) -> bool {
        self.is_active(ProbeKind::UdpTraceroute)
    }

    // ---- TCP ping ----

    /// Start a TCP ping
    ///
    /// `port` and `count` fall back to `defaults.tcp_port` and
    /// `defaults.tcp_ping_count`.
    pub async fn start_tcp_ping<F>(
        &self,
        host: impl Into<String>,
        port: Option<u16>,
        count: Option<u32>,
        listener: F,
    ) -> Result<Subscription>
    where
        F: Fn(&ProbeEvent) + Send + Sync + 'static,
    {
        let params = ProbeParams::TcpPing {
            host: host.into(),
            port: port.unwrap_or(self.config.defaults.tcp_port),
            count: count.unwrap_or(self.config.defaults.tcp_ping_count),
        };
        self.start(params, listener).await
    }

    pub async fn stop_tcp_ping(&self) {
        self.stop(ProbeKind::TcpPing).await
    }

    pub fn is_tcp_pinging(&self) -> bool {
        self.is_active(ProbeKind::TcpPing)
    }

    // ---- Port scan ----

    pub async fn start_port_scan<F>(
        &self,
        host: impl Into<String>,
        ports: PortSelection,
        listener: F,
    ) -> Result<Subscription>
    where
        F: Fn(&ProbeEvent) + Send + Sync + 'static,
    {
        let params = ProbeParams::PortScan {
            host: host.into(),
            ports,
        };
        self.start(params, listener).await
    }

    pub async fn stop_port_scan(&self) {
        self.stop(ProbeKind::PortScan).await
    }

    pub fn is_port_scanning(&self) -> bool {
        self.is_active(ProbeKind::PortScan)
    }

    // ---- LAN scan ----

    /// Start LAN host discovery; ends on the engine's finished signal or a stop
    pub async fn start_lan_scan<F>(&self, listener: F) -> Result<Subscription>
    where
        F: Fn(&ProbeEvent) + Send + Sync + 'static,
    {
        self.start(ProbeParams::LanScan, listener).await
    }

    pub async fn stop_lan_scan(&self) {
        self.stop(ProbeKind::LanScan).await
    }

    pub fn is_lan_scanning(&self) -> bool {
        self.is_active(ProbeKind::LanScan)
    }

    // ---- One-shot queries ----

    /// Resolve a domain; see [`QueryFacade::lookup_domain`]
    pub async fn lookup_domain(&self, domain: &str) -> Result<Vec<LookupRecord>> {
        self.queries.lookup_domain(domain).await
    }

    /// Device network snapshot; see [`QueryFacade::network_info`]
    pub async fn get_network_info(&self) -> Result<NetworkInfo> {
        self.queries.network_info().await
    }

    /// Stop every running session, then tear down the dispatcher
    pub async fn shutdown(mut self) {
        if let Ok(engine) = self.gate.engine() {
            for kind in ProbeKind::ALL {
                self.sessions.stop(engine.as_ref(), kind).await;
            }
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.shutdown().await;
        }
        info!("Network diagnosis shut down");
    }
}

impl std::fmt::Debug for NetDiagnosis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetDiagnosis")
            .field("gate", &self.gate)
            .field("running", &self.dispatcher.is_some())
            .finish()
    }
}
