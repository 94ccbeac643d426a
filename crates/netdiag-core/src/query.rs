//! One-shot queries
//!
//! Engine operations that answer once: domain lookup and network info. Each
//! call issues exactly one engine request; overlapping calls are independent
//! and never coalesced.

use tracing::{debug, warn};

use crate::decoder;
use crate::error::{Error, Result};
use crate::gate::PlatformGate;
use crate::probe::{LookupRecord, NetworkInfo};

/// Single-resolution engine requests behind the capability gate
#[derive(Debug, Clone)]
pub struct QueryFacade {
    gate: PlatformGate,
}

impl QueryFacade {
    pub fn new(gate: PlatformGate) -> Self {
        Self { gate }
    }

    /// Resolve `domain` to its name/address records
    ///
    /// # Errors
    ///
    /// - `Error::UnsupportedPlatform` without an engine
    /// - `Error::InvalidInput` for an empty domain
    /// - `Error::EngineSignaled` with the engine's message when the payload
    ///   carries the reserved error field
    /// - `Error::Decode` for a malformed payload
    pub async fn lookup_domain(&self, domain: &str) -> Result<Vec<LookupRecord>> {
        let engine = self.gate.engine()?;

        let domain = domain.trim();
        if domain.is_empty() {
            return Err(Error::invalid_input("Domain cannot be empty"));
        }

        let payload = engine.lookup_domain(domain).await.inspect_err(|e| {
            warn!("Engine {} failed to look up {}: {}", engine.engine_name(), domain, e);
        })?;

        match decoder::decode_lookup(&payload) {
            Ok(records) => {
                debug!("Lookup of {} returned {} records", domain, records.len());
                Ok(records)
            }
            Err(e) => {
                warn!("Lookup of {} failed: {}", domain, e);
                Err(e.into())
            }
        }
    }

    /// Snapshot of the device network and public IP details
    ///
    /// # Errors
    ///
    /// Same classes as [`QueryFacade::lookup_domain`], minus input validation.
    pub async fn network_info(&self) -> Result<NetworkInfo> {
        let engine = self.gate.engine()?;

        let payload = engine.network_info().await.inspect_err(|e| {
            warn!("Engine {} failed to report network info: {}", engine.engine_name(), e);
        })?;

        decoder::decode_network_info(&payload).map_err(|e| {
            warn!("Network info failed: {}", e);
            Error::from(e)
        })
    }
}
