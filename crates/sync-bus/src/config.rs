//! # Engine Configuration
//!
//! All knobs have sane defaults; `from_env` overlays environment overrides.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Default well-known channel name for multiplexed delivery.
pub const DEFAULT_FALLBACK_CHANNEL: &str = "state-sync:message";

/// Default cap on staged operations per transaction.
pub const DEFAULT_MAX_STAGED_OPS: usize = 1024;

/// How a window's transport strategy is chosen at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportMode {
    /// Probe the endpoint: dedicated port if it offers one, otherwise fallback.
    #[default]
    Auto,
    /// Require a dedicated port; registration fails without one.
    ZeroCopy,
    /// Always multiplex over the well-known channel.
    Fallback,
}

impl FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "zero-copy" | "zerocopy" | "port" => Ok(Self::ZeroCopy),
            "fallback" | "ipc" => Ok(Self::Fallback),
            other => Err(ConfigError::UnknownTransportMode(other.to_owned())),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown transport mode '{0}' (expected auto, zero-copy or fallback)")]
    UnknownTransportMode(String),

    #[error("Fallback channel name must not be empty")]
    EmptyFallbackChannel,

    #[error("max_staged_ops must be greater than zero")]
    ZeroStagingLimit,
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Transport selection policy.
    pub transport_mode: TransportMode,
    /// Whether the window that made a change is notified of it too.
    pub notify_origin: bool,
    /// Channel name used by the multiplexed strategy.
    pub fallback_channel: String,
    /// Staging buffer limit per transaction.
    pub max_staged_ops: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            transport_mode: TransportMode::Auto,
            notify_origin: true,
            fallback_channel: DEFAULT_FALLBACK_CHANNEL.to_owned(),
            max_staged_ops: DEFAULT_MAX_STAGED_OPS,
        }
    }
}

impl SyncConfig {
    /// Defaults overlaid with `SYNC_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::default().overlay(|name| std::env::var(name).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup("SYNC_TRANSPORT_MODE") {
            match raw.parse() {
                Ok(mode) => self.transport_mode = mode,
                Err(e) => warn!(error = %e, "Ignoring SYNC_TRANSPORT_MODE"),
            }
        }
        if let Some(raw) = lookup("SYNC_NOTIFY_ORIGIN") {
            self.notify_origin = raw == "1" || raw.eq_ignore_ascii_case("true");
        }
        if let Some(raw) = lookup("SYNC_FALLBACK_CHANNEL") {
            self.fallback_channel = raw;
        }
        if let Some(raw) = lookup("SYNC_MAX_STAGED_OPS") {
            match raw.parse() {
                Ok(n) => self.max_staged_ops = n,
                Err(_) => warn!(value = %raw, "Ignoring SYNC_MAX_STAGED_OPS"),
            }
        }
        self
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fallback_channel.is_empty() {
            return Err(ConfigError::EmptyFallbackChannel);
        }
        if self.max_staged_ops == 0 {
            return Err(ConfigError::ZeroStagingLimit);
        }
        Ok(())
    }
}
