//! Upstream relay.
//!
//! Allowed queries are forwarded as the original wire bytes and the first
//! successful reply is relayed verbatim, so the client sees exactly what the
//! upstream produced. Each upstream gets its own socket and deadline; the
//! next one is tried only after the previous failed or timed out.

use std::{net::SocketAddr, time::Duration};

use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::EngineError;

/// Upper bound on a relayed UDP reply.
const MAX_REPLY_SIZE: usize = 4096;

/// Ordered list of upstream resolvers.
#[derive(Debug, Clone)]
pub struct UpstreamPool {
    upstreams: Vec<SocketAddr>,
    timeout: Duration,
}

impl UpstreamPool {
    #[must_use]
    pub fn new(upstreams: Vec<SocketAddr>, timeout: Duration) -> Self {
        Self { upstreams, timeout }
    }

    /// Forward `payload` to the upstreams in configured order and return the
    /// first reply. Exhausting the list is [`EngineError::UpstreamExhausted`].
    pub async fn exchange(&self, payload: &[u8], query: &str) -> Result<Vec<u8>, EngineError> {
        for upstream in &self.upstreams {
            match self.exchange_one(*upstream, payload).await {
                Ok(reply) => return Ok(reply),
                Err(err) => {
                    debug!(%upstream, %err, "upstream exchange failed, trying next");
                }
            }
        }

        Err(EngineError::UpstreamExhausted {
            query: query.to_string(),
        })
    }

    async fn exchange_one(
        &self,
        upstream: SocketAddr,
        payload: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        let bind_addr: SocketAddr = if upstream.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(upstream).await?;
        socket.send(payload).await?;

        let mut buf = vec![0u8; MAX_REPLY_SIZE];
        let len = tokio::time::timeout(self.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| {
                EngineError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("upstream {upstream} timed out"),
                ))
            })??;

        buf.truncate(len);
        Ok(buf)
    }
}
