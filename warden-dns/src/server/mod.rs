//! The DNS listener pair and its per-query workers.
//!
//! Binding and serving are separate steps: [`DnsServer::bind`] either
//! acquires both sockets or fails outright, and [`BoundServer::serve`] runs
//! the accept loops until shutdown. Every incoming message is handled by a
//! fresh spawned worker; the only state workers share is the rule store,
//! the decision cache, the counters and the audit publisher.

mod query;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
    sync::broadcast,
};
use tracing::{debug, error, info, trace};
use warden_common::{Signal, audit::AuditPublisher};
use warden_filter::{DecisionCache, Rule, RuleError, RuleStore};

use crate::{
    config::DnsConfig,
    error::EngineError,
    stats::{EngineStats, StatsSnapshot},
    upstream::UpstreamPool,
};

/// Largest datagram the UDP listener accepts.
const MAX_DATAGRAM: usize = 4096;

/// Largest message the TCP listener accepts.
const MAX_TCP_MESSAGE: usize = u16::MAX as usize;

/// The DNS interception engine.
pub struct DnsServer {
    config: DnsConfig,
    store: Arc<RuleStore>,
    cache: Arc<DecisionCache>,
    stats: Arc<EngineStats>,
    audit: AuditPublisher,
    upstreams: UpstreamPool,
}

impl DnsServer {
    #[must_use]
    pub fn new(
        config: DnsConfig,
        store: Arc<RuleStore>,
        cache: Arc<DecisionCache>,
        audit: AuditPublisher,
    ) -> Self {
        let upstreams = UpstreamPool::new(
            config.upstreams.clone(),
            Duration::from_secs(config.upstream_timeout_secs.max(1)),
        );

        Self {
            config,
            store,
            cache,
            stats: Arc::new(EngineStats::new()),
            audit,
            upstreams,
        }
    }

    /// Pass-through rule management, sharing the store's semantics.
    pub fn add_rule(&self, rule: Rule) -> Result<(), RuleError> {
        self.store.upsert(rule)
    }

    pub fn remove_rule(&self, id: &str) -> Result<(), RuleError> {
        self.store.remove(id)
    }

    pub fn clear_all_rules(&self) {
        self.store.clear();
    }

    #[must_use]
    pub fn get_all_rules(&self) -> Vec<Rule> {
        self.store.rules()
    }

    /// Snapshot of the engine counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Shared handle to the live counters, for the management plane.
    #[must_use]
    pub fn stats_handle(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    #[must_use]
    pub fn cache_handle(&self) -> Arc<DecisionCache> {
        Arc::clone(&self.cache)
    }

    /// Bind both listeners, or fail without starting anything.
    pub async fn bind(self) -> Result<BoundServer, EngineError> {
        let addr = self.config.listen_addr;
        let udp = UdpSocket::bind(addr).await.map_err(|source| EngineError::Bind {
            listener: "udp",
            address: addr,
            source,
        })?;
        // Resolve port 0 once so both listeners share the same port.
        let effective = udp.local_addr().map_err(|source| EngineError::Bind {
            listener: "udp",
            address: addr,
            source,
        })?;
        let tcp = TcpListener::bind(effective)
            .await
            .map_err(|source| EngineError::Bind {
                listener: "tcp",
                address: effective,
                source,
            })?;

        info!(addr = %effective, "DNS engine bound");
        Ok(BoundServer {
            server: Arc::new(self),
            udp: Arc::new(udp),
            tcp,
        })
    }
}

/// A server whose sockets are live.
pub struct BoundServer {
    server: Arc<DnsServer>,
    udp: Arc<UdpSocket>,
    tcp: TcpListener,
}

impl BoundServer {
    /// The actual UDP listener address (useful when bound to port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, EngineError> {
        Ok(self.udp.local_addr()?)
    }

    #[must_use]
    pub fn handle(&self) -> Arc<DnsServer> {
        Arc::clone(&self.server)
    }

    /// Run both listeners until shutdown. In-flight workers finish
    /// best-effort, bounded by the upstream timeout.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<Signal>) -> Result<(), EngineError> {
        let udp_server = Arc::clone(&self.server);
        let udp_socket = Arc::clone(&self.udp);
        let udp_loop = async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                match udp_socket.recv_from(&mut buf).await {
                    Ok((len, peer)) => {
                        let payload = buf[..len].to_vec();
                        let server = Arc::clone(&udp_server);
                        let socket = Arc::clone(&udp_socket);
                        tokio::spawn(async move {
                            if let Some(response) = query::handle(&server, &payload, "udp").await {
                                if let Err(err) = socket.send_to(&response, peer).await {
                                    debug!(%peer, %err, "failed to send udp reply");
                                }
                            }
                        });
                    }
                    Err(err) => {
                        error!(%err, "udp receive failed");
                        return Err(EngineError::Io(err));
                    }
                }
            }
        };

        let tcp_server = Arc::clone(&self.server);
        let tcp_listener = self.tcp;
        let tcp_loop = async move {
            loop {
                match tcp_listener.accept().await {
                    Ok((stream, peer)) => {
                        trace!(%peer, "tcp connection accepted");
                        let server = Arc::clone(&tcp_server);
                        tokio::spawn(async move {
                            if let Err(err) = serve_tcp_connection(&server, stream).await {
                                debug!(%peer, %err, "tcp connection ended");
                            }
                        });
                    }
                    Err(err) => {
                        error!(%err, "tcp accept failed");
                        return Err(EngineError::Io(err));
                    }
                }
            }
        };

        tokio::select! {
            result = udp_loop => result,
            result = tcp_loop => result,
            _ = shutdown.recv() => {
                info!("DNS engine shutting down");
                Ok(())
            }
        }
    }
}

/// One TCP connection may carry a pipeline of length-prefixed messages.
async fn serve_tcp_connection(
    server: &Arc<DnsServer>,
    mut stream: TcpStream,
) -> Result<(), EngineError> {
    loop {
        let mut len_buf = [0u8; 2];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            // Clean EOF between messages ends the connection.
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(EngineError::Io(err)),
        }

        let len = usize::from(u16::from_be_bytes(len_buf));
        if len == 0 || len > MAX_TCP_MESSAGE {
            server.stats.record_error();
            return Ok(());
        }

        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await?;

        if let Some(response) = query::handle(server, &payload, "tcp").await {
            let response_len = u16::try_from(response.len()).unwrap_or(u16::MAX);
            stream.write_all(&response_len.to_be_bytes()).await?;
            stream.write_all(&response[..usize::from(response_len)]).await?;
            stream.flush().await?;
        }
    }
}
