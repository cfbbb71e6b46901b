//! Round-trip measurement to a peer.
//!
//! ICMP echo needs raw socket privileges, so the latency is the time taken to
//! complete a TCP handshake with the peer's P2P port. The connection is
//! dropped as soon as it is established.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use crate::error::ProbeError;

#[async_trait::async_trait]
pub trait LatencyProber: Send + Sync {
    async fn probe(&self, addr: SocketAddr, timeout: Duration) -> Result<Duration, ProbeError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProber;

#[async_trait::async_trait]
impl LatencyProber for TcpProber {
    async fn probe(&self, addr: SocketAddr, timeout: Duration) -> Result<Duration, ProbeError> {
        let started = Instant::now();

        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Ok(started.elapsed()),
            Ok(Err(e)) => Err(ProbeError::Unreachable {
                addr,
                reason: e.to_string(),
            }),
            Err(_) => Err(ProbeError::Unreachable {
                addr,
                reason: format!("no answer within {}ms", timeout.as_millis()),
            }),
        }
    }
}
