//! Auto transport: an ordered fallback chain.
//!
//! Tries each configured transport in turn with a bounded per-attempt
//! timeout. Failures are recorded, not surfaced, until the whole chain is
//! exhausted; then the aggregate error lists each transport's reason so
//! operators can see which layer is blocked.

use super::{SyncConnection, SyncTransport, TransportError, TransportFailure};
use async_trait::async_trait;
use futures_util::future::select_all;
use std::sync::Arc;
use std::time::Duration;

/// Composite transport trying Direct, then one or more Relay endpoints.
pub struct AutoTransport {
    transports: Vec<Arc<dyn SyncTransport>>,
    attempt_timeout: Duration,
}

impl AutoTransport {
    /// Create a chain over `transports`, tried in order.
    pub fn new(transports: Vec<Arc<dyn SyncTransport>>, attempt_timeout: Duration) -> Self {
        Self {
            transports,
            attempt_timeout,
        }
    }

    /// Names of the chained transports, in attempt order.
    pub fn chain(&self) -> Vec<&'static str> {
        self.transports.iter().map(|t| t.name()).collect()
    }
}

#[async_trait]
impl SyncTransport for AutoTransport {
    fn name(&self) -> &'static str {
        "auto"
    }

    async fn connect(&self, peer: &str) -> Result<Arc<dyn SyncConnection>, TransportError> {
        let mut failures = Vec::new();

        for transport in &self.transports {
            match tokio::time::timeout(self.attempt_timeout, transport.connect(peer)).await {
                Ok(Ok(conn)) => {
                    if !failures.is_empty() {
                        tracing::debug!(
                            transport = transport.name(),
                            skipped = failures.len(),
                            "connected after fallback"
                        );
                    }
                    return Ok(conn);
                }
                Ok(Err(e)) => {
                    tracing::debug!(transport = transport.name(), error = %e, "connect failed");
                    failures.push(TransportFailure {
                        transport: transport.name().to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    tracing::debug!(transport = transport.name(), "connect attempt timed out");
                    failures.push(TransportFailure {
                        transport: transport.name().to_string(),
                        reason: TransportError::Timeout.to_string(),
                    });
                }
            }
        }

        Err(TransportError::AllTransportsFailed(failures))
    }

    // Listen on every transport concurrently; surface whichever accepts
    // first. Transports that error drop out of the race.
    async fn accept(&self) -> Result<Arc<dyn SyncConnection>, TransportError> {
        if self.transports.is_empty() {
            return Err(TransportError::AllTransportsFailed(Vec::new()));
        }

        let mut pending: Vec<_> = self
            .transports
            .iter()
            .map(|t| {
                let transport = Arc::clone(t);
                Box::pin(async move { (transport.name(), transport.accept().await) })
            })
            .collect();

        let mut failures = Vec::new();
        loop {
            let ((name, result), _, remaining) = select_all(pending).await;
            match result {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    tracing::debug!(transport = name, error = %e, "accept failed");
                    failures.push(TransportFailure {
                        transport: name.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
            if remaining.is_empty() {
                return Err(TransportError::AllTransportsFailed(failures));
            }
            pending = remaining;
        }
    }

    async fn close(&self) {
        for transport in &self.transports {
            transport.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ConnectionEvent, MemoryHub, MemoryTransport};

    /// A transport whose connect never completes, to exercise the
    /// per-attempt timeout.
    struct HangingTransport;

    #[async_trait]
    impl SyncTransport for HangingTransport {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn connect(&self, _peer: &str) -> Result<Arc<dyn SyncConnection>, TransportError> {
            futures_util::future::pending().await
        }

        async fn accept(&self) -> Result<Arc<dyn SyncConnection>, TransportError> {
            futures_util::future::pending().await
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn falls_back_past_a_failing_transport() {
        let hub = MemoryHub::new();
        let failing = MemoryTransport::new(Arc::clone(&hub), "t");
        failing.fail_connects(true);
        let working = MemoryTransport::new(Arc::clone(&hub), "t");

        let auto = AutoTransport::new(
            vec![Arc::new(failing), Arc::new(working)],
            Duration::from_secs(1),
        );

        // The failure is recorded internally, not surfaced.
        let conn = auto.connect("").await.unwrap();
        conn.send(b"works").await.unwrap();
    }

    #[tokio::test]
    async fn exhausted_chain_reports_every_failure() {
        let hub = MemoryHub::new();
        let first = MemoryTransport::new(Arc::clone(&hub), "t");
        first.fail_connects(true);
        let second = MemoryTransport::new(Arc::clone(&hub), "t");
        second.fail_connects(true);

        let auto = AutoTransport::new(
            vec![Arc::new(first), Arc::new(second)],
            Duration::from_secs(1),
        );

        match auto.connect("").await {
            Err(TransportError::AllTransportsFailed(failures)) => {
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().all(|f| f.transport == "memory"));
                assert!(failures.iter().all(|f| f.reason.contains("forced failure")));
            }
            other => panic!("expected aggregate failure, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn hanging_transport_is_timed_out_and_skipped() {
        let hub = MemoryHub::new();
        let working = MemoryTransport::new(Arc::clone(&hub), "t");

        let auto = AutoTransport::new(
            vec![Arc::new(HangingTransport), Arc::new(working)],
            Duration::from_millis(50),
        );

        let conn = auto.connect("").await.unwrap();
        conn.send(b"made it").await.unwrap();
    }

    #[tokio::test]
    async fn hanging_only_chain_fails_with_timeout_reason() {
        let auto = AutoTransport::new(
            vec![Arc::new(HangingTransport)],
            Duration::from_millis(50),
        );

        match auto.connect("").await {
            Err(TransportError::AllTransportsFailed(failures)) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].transport, "hanging");
                assert_eq!(failures[0].reason, "connection timeout");
            }
            other => panic!("expected aggregate failure, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn accept_surfaces_first_acceptor() {
        let hub = MemoryHub::new();
        let slow = HangingTransport;
        let fast = MemoryTransport::new(Arc::clone(&hub), "t");

        let auto = AutoTransport::new(
            vec![Arc::new(slow), Arc::new(fast)],
            Duration::from_secs(1),
        );

        let conn = auto.accept().await.unwrap();
        // The bus works end to end.
        let other = MemoryTransport::new(hub, "t").connect("").await.unwrap();
        other.send(b"hi").await.unwrap();

        loop {
            match conn.recv().await.unwrap() {
                ConnectionEvent::Data { bytes, .. } => {
                    assert_eq!(bytes, b"hi");
                    break;
                }
                ConnectionEvent::PeerJoined { .. } => continue,
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn empty_chain_fails() {
        let auto = AutoTransport::new(Vec::new(), Duration::from_secs(1));
        assert!(matches!(
            auto.connect("").await,
            Err(TransportError::AllTransportsFailed(f)) if f.is_empty()
        ));
        assert!(auto.accept().await.is_err());
    }

    #[tokio::test]
    async fn close_tears_down_every_transport() {
        let hub = MemoryHub::new();
        let first = MemoryTransport::new(Arc::clone(&hub), "t");
        let second = MemoryTransport::new(Arc::clone(&hub), "t");

        let auto = AutoTransport::new(
            vec![Arc::new(first), Arc::new(second)],
            Duration::from_secs(1),
        );

        auto.close().await;
        // Every inner transport rejects new connections after close.
        assert!(auto.connect("").await.is_err());
    }
}
