//! Platform capability gate
//!
//! Decides once whether a probe engine exists for the current platform, so
//! that no other part of the crate ever branches on the platform.
//!
//! Engines are registered per platform name in an [`EngineRegistry`];
//! [`PlatformGate::resolve`] looks up the configured platform and yields a
//! gate that either hands out the engine or reports
//! [`Error::UnsupportedPlatform`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use netdiag_core::gate::{EngineRegistry, PlatformGate};
//! use netdiag_core::NetDiagConfig;
//!
//! let registry = EngineRegistry::new();
//! registry.register_engine("ios", Box::new(IosEngineFactory));
//!
//! let config = NetDiagConfig { platform: Some("ios".into()), ..Default::default() };
//! let gate = PlatformGate::resolve(&registry, &config)?;
//! assert!(gate.is_supported());
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::config::NetDiagConfig;
use crate::error::{Error, Result};
use crate::traits::{ProbeEngine, ProbeEngineFactory};

/// Engine registry for platform-based engine creation
///
/// The registry maintains a map of platform names to factory objects.
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct EngineRegistry {
    engines: RwLock<HashMap<String, Arc<dyn ProbeEngineFactory>>>,
}

impl EngineRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine factory for a platform
    ///
    /// # Parameters
    ///
    /// - `platform`: Platform name (e.g., "ios", "linux")
    /// - `factory`: Factory object for creating engine instances
    pub fn register_engine(&self, platform: impl Into<String>, factory: Box<dyn ProbeEngineFactory>) {
        let platform = platform.into();
        let mut engines = self.engines.write().unwrap_or_else(|e| e.into_inner());
        engines.insert(platform, Arc::from(factory));
    }

    /// Create the engine registered for `platform`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(engine))`: A factory is registered and created an engine
    /// - `Ok(None)`: No factory is registered for the platform
    /// - `Err(Error)`: The factory failed
    pub fn create_engine(
        &self,
        platform: &str,
        config: &NetDiagConfig,
    ) -> Result<Option<Arc<dyn ProbeEngine>>> {
        let factory = {
            let engines = self.engines.read().unwrap_or_else(|e| e.into_inner());
            engines.get(platform).cloned()
        };

        match factory {
            Some(factory) => factory.create(config).map(Some),
            None => Ok(None),
        }
    }

    /// List all platforms with a registered engine
    pub fn list_platforms(&self) -> Vec<String> {
        let engines = self.engines.read().unwrap_or_else(|e| e.into_inner());
        engines.keys().cloned().collect()
    }

    /// Check if an engine is registered for `platform`
    pub fn has_engine(&self, platform: &str) -> bool {
        let engines = self.engines.read().unwrap_or_else(|e| e.into_inner());
        engines.contains_key(platform)
    }
}

/// Whether the probe engine is available, and the engine if it is
#[derive(Clone)]
pub enum PlatformGate {
    Supported {
        platform: String,
        engine: Arc<dyn ProbeEngine>,
    },
    Unsupported {
        platform: String,
    },
}

impl PlatformGate {
    /// Resolve the gate for the configured platform
    ///
    /// A platform without a registered engine is not an error; it yields an
    /// unsupported gate. A registered factory that fails is.
    pub fn resolve(registry: &EngineRegistry, config: &NetDiagConfig) -> Result<Self> {
        config.validate()?;
        let platform = config.platform_name().to_string();

        match registry.create_engine(&platform, config)? {
            Some(engine) => {
                info!("Probe engine {} available on {}", engine.engine_name(), platform);
                Ok(Self::Supported { platform, engine })
            }
            None => {
                warn!("No probe engine registered for {}; all probes disabled", platform);
                Ok(Self::Unsupported { platform })
            }
        }
    }

    /// Gate over an already-built engine
    pub fn supported(platform: impl Into<String>, engine: Arc<dyn ProbeEngine>) -> Self {
        Self::Supported {
            platform: platform.into(),
            engine,
        }
    }

    /// Gate with no engine at all
    pub fn unsupported(platform: impl Into<String>) -> Self {
        Self::Unsupported {
            platform: platform.into(),
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Supported { .. })
    }

    pub fn platform(&self) -> &str {
        match self {
            Self::Supported { platform, .. } | Self::Unsupported { platform } => platform,
        }
    }

    /// The engine, or `Error::UnsupportedPlatform`
    pub fn engine(&self) -> Result<&Arc<dyn ProbeEngine>> {
        match self {
            Self::Supported { engine, .. } => Ok(engine),
            Self::Unsupported { .. } => Err(Error::UnsupportedPlatform),
        }
    }
}

impl std::fmt::Debug for PlatformGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Supported { platform, engine } => f
                .debug_struct("Supported")
                .field("platform", platform)
                .field("engine", &engine.engine_name())
                .finish(),
            Self::Unsupported { platform } => {
                f.debug_struct("Unsupported").field("platform", platform).finish()
            }
        }
    }
}
