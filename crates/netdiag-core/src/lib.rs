// # netdiag-core
//
// Core library of the network diagnosis façade.
//
// ## Architecture Overview
//
// Packet-level probing is delegated to a platform engine; this crate owns
// everything between that engine and the caller:
// - **ProbeEngine**: Trait for the platform engine (start/stop commands, raw
//   result stream, one-shot requests)
// - **SessionRegistry**: At most one session per probe kind, with the
//   start/supersede/stop state machine
// - **Decoder**: Raw engine records → typed results or `DecodeError`
// - **EventMultiplexer**: Per-kind listener lists and subscription handles
// - **Dispatcher**: Background tasks moving raw results through the decoder
//   to listeners
// - **QueryFacade**: Domain lookup and network info, resolved once
// - **PlatformGate**: The only place that knows whether an engine exists
// - **NetDiagnosis**: The façade tying it all together
//
// ## Design Principles
//
// 1. **Engine as a black box**: No packet code in the core
// 2. **Event-Driven**: Results flow through async streams and callbacks
// 3. **Per-kind isolation**: No lock spans two probe kinds
// 4. **Uniform fallback**: Unsupported platforms degrade the same way everywhere
// 5. **Library-First**: The façade is usable from any tokio application

pub mod traits;
pub mod probe;
pub mod config;
pub mod error;
pub mod decoder;
pub mod session;
pub mod multiplexer;
pub mod dispatch;
pub mod gate;
pub mod query;
pub mod client;

// Re-export core types for convenience
pub use traits::{EngineEvent, ProbeEngine, ProbeEngineFactory, RawPayload, RawResult};
pub use probe::{
    DecodedResult, LookupRecord, NetworkInfo, PortSelection, ProbeEvent, ProbeKind, ProbeParams,
    SessionId,
};
pub use config::{NetDiagConfig, RestartPolicy, SdkLogLevel};
pub use error::{DecodeError, Error, Result};
pub use session::{SessionRegistry, SessionState};
pub use multiplexer::{EventMultiplexer, Subscription};
pub use gate::{EngineRegistry, PlatformGate};
pub use query::QueryFacade;
pub use client::NetDiagnosis;
