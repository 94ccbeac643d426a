// # Probe Engine Trait
//
// Defines the interface to the external packet-level probing engine.
//
// The engine owns everything that touches the network: raw sockets, TTL
// manipulation, RTT measurement, ARP/broadcast discovery and DNS resolution.
// The core only issues commands and consumes the raw records it emits.
//
// ## Usage
//
// ```rust,ignore
// use netdiag_core::traits::ProbeEngine;
// use tokio_stream::StreamExt;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let engine = /* ProbeEngine implementation */;
//
//     let mut results = engine.results();
//     engine.start(SessionId(1), &ProbeParams::Ping { host: "10.0.0.1".into(), count: 4 }).await?;
//
//     while let Some(raw) = results.next().await {
//         println!("{:?}", raw);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

use crate::config::SdkLogLevel;
use crate::probe::{ProbeKind, ProbeParams, SessionId};

/// Name of the engine event a raw record was emitted under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineEvent {
    #[serde(rename = "onPingResult")]
    PingResult,
    #[serde(rename = "onTracerouteResult")]
    TracerouteResult,
    #[serde(rename = "onUdpTracerouteResult")]
    UdpTracerouteResult,
    #[serde(rename = "onTcpPingResult")]
    TcpPingResult,
    #[serde(rename = "onPortScanResult")]
    PortScanResult,
    #[serde(rename = "onLanScanActiveIp")]
    LanScanActiveIp,
    #[serde(rename = "onLanScanProgress")]
    LanScanProgress,
    #[serde(rename = "onLanScanFinished")]
    LanScanFinished,
}

impl EngineEvent {
    /// The session slot this event feeds
    pub fn kind(self) -> ProbeKind {
        match self {
            EngineEvent::PingResult => ProbeKind::Ping,
            EngineEvent::TracerouteResult => ProbeKind::Traceroute,
            EngineEvent::UdpTracerouteResult => ProbeKind::UdpTraceroute,
            EngineEvent::TcpPingResult => ProbeKind::TcpPing,
            EngineEvent::PortScanResult => ProbeKind::PortScan,
            EngineEvent::LanScanActiveIp
            | EngineEvent::LanScanProgress
            | EngineEvent::LanScanFinished => ProbeKind::LanScan,
        }
    }

    /// Wire name, as the engine reports it
    pub fn name(self) -> &'static str {
        match self {
            EngineEvent::PingResult => "onPingResult",
            EngineEvent::TracerouteResult => "onTracerouteResult",
            EngineEvent::UdpTracerouteResult => "onUdpTracerouteResult",
            EngineEvent::TcpPingResult => "onTcpPingResult",
            EngineEvent::PortScanResult => "onPortScanResult",
            EngineEvent::LanScanActiveIp => "onLanScanActiveIp",
            EngineEvent::LanScanProgress => "onLanScanProgress",
            EngineEvent::LanScanFinished => "onLanScanFinished",
        }
    }
}

/// Payload of a raw record: already structured, or serialized JSON text
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Structured(serde_json::Value),
    Text(String),
}

impl RawPayload {
    /// Parse the payload into a JSON value
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            RawPayload::Structured(value) => Ok(value.clone()),
            RawPayload::Text(text) => serde_json::from_str(text),
        }
    }
}

impl From<serde_json::Value> for RawPayload {
    fn from(value: serde_json::Value) -> Self {
        RawPayload::Structured(value)
    }
}

impl From<String> for RawPayload {
    fn from(text: String) -> Self {
        RawPayload::Text(text)
    }
}

impl From<&str> for RawPayload {
    fn from(text: &str) -> Self {
        RawPayload::Text(text.to_string())
    }
}

/// One record emitted by the engine for a running session
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    /// Session the engine was started with
    pub session: SessionId,
    /// Event the record was emitted under
    pub event: EngineEvent,
    /// Record body
    pub payload: RawPayload,
}

impl RawResult {
    /// Create a raw result
    ///
    /// Public for use in `ProbeEngine` implementations and tests.
    pub fn new(session: SessionId, event: EngineEvent, payload: impl Into<RawPayload>) -> Self {
        Self {
            session,
            event,
            payload: payload.into(),
        }
    }

    pub fn kind(&self) -> ProbeKind {
        self.event.kind()
    }
}

/// Trait for probe engine implementations
///
/// The engine is a black box that accepts start/stop commands, emits raw
/// records asynchronously from its own execution contexts, and answers
/// one-shot queries with a single payload.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// ## Responsibilities
/// - ✅ Run the packet-level probe for each started session
/// - ✅ Tag every raw record with the session id it was started with
/// - ✅ Report failures for one-shot queries through the reserved `error` field
///
/// ## Not Responsibilities
/// - ❌ Session bookkeeping (owned by `SessionRegistry`)
/// - ❌ Fan-out to listeners (owned by `EventMultiplexer`)
/// - ❌ Payload validation (owned by the decoder)
/// - ❌ Retries (callers decide)
#[async_trait]
pub trait ProbeEngine: Send + Sync {
    /// Prepare the engine for use
    async fn initialize(&self) -> Result<(), crate::Error> {
        Ok(())
    }

    /// Set engine-side log verbosity
    ///
    /// Pass-through only: the level has no effect on core behavior.
    async fn set_log_level(&self, level: SdkLogLevel) -> Result<(), crate::Error>;

    /// Version string of the engine SDK
    fn sdk_version(&self) -> String;

    /// Start a probe
    ///
    /// All raw records produced for this probe must carry `session`.
    /// The engine may assume any previous probe of the same kind has already
    /// been stopped.
    async fn start(&self, session: SessionId, params: &ProbeParams) -> Result<(), crate::Error>;

    /// Stop the running probe of `kind`
    ///
    /// Resolving the returned future acknowledges the stop. Stopping a kind
    /// that is not running must succeed.
    async fn stop(&self, kind: ProbeKind) -> Result<(), crate::Error>;

    /// Stream of raw records for all kinds
    ///
    /// Called once. Records of one kind must be yielded in production order.
    fn results(&self) -> Pin<Box<dyn Stream<Item = RawResult> + Send + 'static>>;

    /// Resolve a domain, answering with a single payload
    ///
    /// Success is a JSON array of `{ "name", "ip" }` objects; failure is an
    /// object carrying the reserved `error` field.
    async fn lookup_domain(&self, domain: &str) -> Result<RawPayload, crate::Error>;

    /// Snapshot of the device network, answering with a single payload
    async fn network_info(&self) -> Result<RawPayload, crate::Error>;

    /// Engine name (for logging/debugging)
    fn engine_name(&self) -> &'static str;
}

/// Helper trait for constructing probe engines from configuration
pub trait ProbeEngineFactory: Send + Sync {
    /// Create a ProbeEngine instance
    ///
    /// # Parameters
    ///
    /// - `config`: The full configuration (engines read the sections they need)
    fn create(
        &self,
        config: &crate::config::NetDiagConfig,
    ) -> Result<std::sync::Arc<dyn ProbeEngine>, crate::Error>;
}
