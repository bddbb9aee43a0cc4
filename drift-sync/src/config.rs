//! Transport configuration, resolved once at startup by the composing
//! application and turned into a concrete [`SyncTransport`] instance.
//!
//! The core never auto-detects its environment; whatever mode the
//! configuration names is what gets built.

use crate::transport::{
    AutoTransport, DirectOptions, DirectTransport, RelayTransport, SyncTransport, TransportError,
};
use drift_types::{PeerId, Topic};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Default connection timeout in milliseconds.
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 30_000;

/// Which transport stack to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Direct first, then relay. The default.
    Auto,
    /// Direct TCP only.
    Direct,
    /// Relay only.
    Relay,
}

/// Startup configuration for the transport layer.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Transport selection mode (default: auto).
    #[serde(default = "default_mode")]
    pub mode: TransportMode,
    /// Relay server address, required for relay mode and used as the
    /// fallback in auto mode.
    #[serde(default)]
    pub relay_addr: Option<String>,
    /// Default peer address for direct active opens.
    #[serde(default)]
    pub direct_addr: Option<String>,
    /// Bind address for direct passive opens.
    #[serde(default)]
    pub listen_addr: Option<String>,
    /// Per-attempt connection timeout in milliseconds (default: 30000).
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

fn default_mode() -> TransportMode {
    TransportMode::Auto
}

fn default_connection_timeout_ms() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_MS
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            relay_addr: None,
            direct_addr: None,
            listen_addr: None,
            connection_timeout_ms: default_connection_timeout_ms(),
        }
    }
}

impl TransportConfig {
    /// The configured connection timeout as a [`Duration`].
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Build the configured transport, scoped to `topic` as `peer`.
    pub fn build(
        &self,
        topic: Topic,
        peer: PeerId,
    ) -> Result<Arc<dyn SyncTransport>, TransportError> {
        let timeout = self.connection_timeout();
        let direct = || -> Arc<dyn SyncTransport> {
            Arc::new(DirectTransport::new(DirectOptions {
                bind_addr: self.listen_addr.clone(),
                peer_addr: self.direct_addr.clone(),
                connect_timeout: timeout,
            }))
        };

        match self.mode {
            TransportMode::Direct => Ok(direct()),
            TransportMode::Relay => {
                let addr = self.relay_addr.clone().ok_or_else(|| {
                    TransportError::ConnectionFailed("no relay address configured".into())
                })?;
                Ok(Arc::new(RelayTransport::with_timeout(
                    addr, topic, peer, timeout,
                )))
            }
            TransportMode::Auto => {
                let mut chain: Vec<Arc<dyn SyncTransport>> = vec![direct()];
                if let Some(addr) = &self.relay_addr {
                    chain.push(Arc::new(RelayTransport::with_timeout(
                        addr.clone(),
                        topic,
                        peer,
                        timeout,
                    )));
                }
                Ok(Arc::new(AutoTransport::new(chain, timeout)))
            }
        }
    }
}
