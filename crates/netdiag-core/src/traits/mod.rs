//! Core traits for the network diagnosis system
//!
//! This module defines the abstract interface the external probing engine
//! must follow.
//!
//! - [`ProbeEngine`]: Issue probe commands, stream raw results, answer queries
//! - [`ProbeEngineFactory`]: Build an engine for a platform

pub mod probe_engine;

pub use probe_engine::{EngineEvent, ProbeEngine, ProbeEngineFactory, RawPayload, RawResult};
