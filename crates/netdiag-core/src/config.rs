//! Configuration types for the network diagnosis core
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetDiagConfig {
    /// Platform name used to pick an engine (defaults to the host OS)
    #[serde(default)]
    pub platform: Option<String>,

    /// Settings passed through to the engine SDK
    #[serde(default)]
    pub sdk: SdkConfig,

    /// Session lifecycle settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Defaults for optional start parameters
    #[serde(default)]
    pub defaults: ProbeDefaults,
}

impl NetDiagConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self, crate::Error> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Platform the capability gate should look up
    pub fn platform_name(&self) -> &str {
        self.platform.as_deref().unwrap_or(std::env::consts::OS)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if let Some(platform) = &self.platform
            && platform.trim().is_empty()
        {
            return Err(crate::Error::config("Platform name cannot be empty"));
        }

        self.session.validate()?;
        self.defaults.validate()?;

        Ok(())
    }
}

/// Engine SDK log level
///
/// Ordered from least to most verbose. Only forwarded to the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdkLogLevel {
    Fatal = 0,
    Error = 1,
    Warn = 2,
    #[default]
    Info = 3,
    Debug = 4,
}

impl SdkLogLevel {
    /// Numeric level as the engine SDK expects it
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for SdkLogLevel {
    type Error = crate::Error;

    fn try_from(value: u8) -> Result<Self, crate::Error> {
        match value {
            0 => Ok(SdkLogLevel::Fatal),
            1 => Ok(SdkLogLevel::Error),
            2 => Ok(SdkLogLevel::Warn),
            3 => Ok(SdkLogLevel::Info),
            4 => Ok(SdkLogLevel::Debug),
            other => Err(crate::Error::invalid_input(format!("Unknown SDK log level: {}", other))),
        }
    }
}

/// SDK pass-through settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SdkConfig {
    /// Log level applied on `initialize()`
    #[serde(default)]
    pub log_level: SdkLogLevel,
}

/// What `start` does when the kind already has a Running session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Stop the running session, then start the new one
    #[default]
    Supersede,
    /// Refuse with `Error::InvalidState`
    Reject,
}

/// Session lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Policy for starting a kind that is already Running
    #[serde(default)]
    pub restart_policy: RestartPolicy,

    /// How long a stop waits for the engine to acknowledge (in milliseconds)
    ///
    /// When it elapses the session goes Idle regardless.
    #[serde(default = "default_stop_grace_period_ms")]
    pub stop_grace_period_ms: u64,
}

impl SessionConfig {
    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_millis(self.stop_grace_period_ms)
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if !(1..=60_000).contains(&self.stop_grace_period_ms) {
            return Err(crate::Error::config(format!(
                "Stop grace period must be between 1 and 60000 ms. Got: {}",
                self.stop_grace_period_ms
            )));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            restart_policy: RestartPolicy::default(),
            stop_grace_period_ms: default_stop_grace_period_ms(),
        }
    }
}

/// Defaults for optional start parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeDefaults {
    /// Maximum TTL for UDP traceroute
    #[serde(default = "default_udp_max_ttl")]
    pub udp_max_ttl: u8,

    /// Port for TCP ping
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,

    /// Number of TCP connect attempts
    #[serde(default = "default_tcp_ping_count")]
    pub tcp_ping_count: u32,
}

impl ProbeDefaults {
    fn validate(&self) -> Result<(), crate::Error> {
        if self.udp_max_ttl == 0 {
            return Err(crate::Error::config("UDP traceroute max TTL must be > 0"));
        }
        if self.tcp_port == 0 {
            return Err(crate::Error::config("TCP ping port must be > 0"));
        }
        if self.tcp_ping_count == 0 {
            return Err(crate::Error::config("TCP ping count must be > 0"));
        }
        Ok(())
    }
}

impl Default for ProbeDefaults {
    fn default() -> Self {
        Self {
            udp_max_ttl: default_udp_max_ttl(),
            tcp_port: default_tcp_port(),
            tcp_ping_count: default_tcp_ping_count(),
        }
    }
}

fn default_stop_grace_period_ms() -> u64 {
    2000
}

fn default_udp_max_ttl() -> u8 {
    30
}

fn default_tcp_port() -> u16 {
    80
}

fn default_tcp_ping_count() -> u32 {
    4
}
