//! Top-level controller: ordered startup and shutdown of every component.
//!
//! Startup order is load-bearing: redirect rules are installed before the
//! engine binds so no query slips through unfiltered, and torn down after it
//! stops so the host is never left pointing at a dead listener. The audit
//! channel closes last.

use std::{
    path::PathBuf,
    sync::{Arc, LazyLock},
};

use anyhow::Context;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::warn;
use warden_common::{Signal, audit, audit::AuditConfig, internal, logging};
use warden_control::{ControlAuthConfig, ControlServer, DEFAULT_CONTROL_SOCKET};
use warden_dns::{DnsConfig, DnsServer, Redirector};
use warden_filter::{CacheConfig, DecisionCache, MemoryBackend, Rule, RuleStore};
use warden_proc::{InventoryConfig, ProcessInventory};

use crate::control_handler::WardenControlHandler;

/// Control socket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
    #[serde(default)]
    pub auth: ControlAuthConfig,
}

fn default_socket_path() -> String {
    DEFAULT_CONTROL_SOCKET.to_string()
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            auth: ControlAuthConfig::default(),
        }
    }
}

/// The deserialized daemon configuration and its run loop.
#[derive(Default, Deserialize)]
pub struct Warden {
    #[serde(default)]
    dns: DnsConfig,
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    inventory: InventoryConfig,
    #[serde(default)]
    audit: AuditConfig,
    #[serde(default)]
    control: ControlConfig,
    /// Rules seeded from the configuration file.
    #[serde(default)]
    rules: Vec<Rule>,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!("Terminate signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

/// Candidate config locations when `WARDEN_CONFIG` is unset, in order.
const CONFIG_PATHS: &[&str] = &["./warden.config.ron", "/etc/warden/warden.config.ron"];

fn config_path() -> anyhow::Result<PathBuf> {
    // An explicit WARDEN_CONFIG is authoritative: a dangling value is an
    // error, not a fall-through to the defaults.
    if let Some(value) = std::env::var_os("WARDEN_CONFIG") {
        let path = PathBuf::from(value);
        anyhow::ensure!(
            path.exists(),
            "WARDEN_CONFIG points at a missing file: {}",
            path.display()
        );
        return Ok(path);
    }

    CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
        .with_context(|| {
            format!(
                "no configuration found; set WARDEN_CONFIG or create one of: {}",
                CONFIG_PATHS.join(", ")
            )
        })
}

impl Warden {
    /// Locate, read and parse the daemon configuration.
    ///
    /// # Errors
    ///
    /// Fails when no config file can be found, or when the file does not
    /// parse as RON.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        ron::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Run this controller, and everything it controls
    ///
    /// # Errors
    ///
    /// This function will return an error if any component fails to start;
    /// startup is all-or-nothing.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();
        internal!("Controller running");

        let cache = Arc::new(DecisionCache::new(&self.cache));
        let store = Arc::new(
            RuleStore::new()
                .with_cache(Arc::clone(&cache))
                .with_backend(Box::new(MemoryBackend::seeded(self.rules.clone()))),
        );
        let (audit_publisher, audit_records) = audit::channel(&self.audit);

        let inventory = Arc::new(ProcessInventory::new(self.inventory.clone()));
        let inventory_task = inventory.start(SHUTDOWN_BROADCAST.subscribe())?;

        // Lifecycle events invalidate cached decisions whose scope changed.
        let mut lifecycle = inventory.subscribe();
        let lifecycle_cache = Arc::clone(&cache);
        tokio::spawn(async move {
            while let Some(event) = lifecycle.recv().await {
                lifecycle_cache.invalidate_scope(event.record.pid, &event.record.name);
            }
        });

        let sweeper = cache.spawn_sweeper(SHUTDOWN_BROADCAST.subscribe());
        let audit_consumer = tokio::spawn(audit::consume(
            audit_records,
            SHUTDOWN_BROADCAST.subscribe(),
        ));

        // Redirect rules must be live before the engine accepts anything.
        let redirector = Redirector::new(self.dns.listen_addr.port());
        if self.dns.redirect {
            redirector.setup().await?;
        }

        let engine = DnsServer::new(
            self.dns.clone(),
            Arc::clone(&store),
            Arc::clone(&cache),
            audit_publisher.clone(),
        );
        let bound = match engine.bind().await {
            Ok(bound) => bound,
            Err(err) => {
                // The engine never starts partially.
                if let Err(teardown) = redirector.teardown().await {
                    warn!(%teardown, "redirect teardown after failed bind");
                }
                return Err(err.into());
            }
        };

        let handler = Arc::new(WardenControlHandler::new(
            bound.handle(),
            Arc::clone(&store),
            Arc::clone(&inventory),
            Arc::clone(&cache),
        ));
        let control = ControlServer::new(
            self.control.socket_path.clone(),
            self.control.auth.clone(),
            handler,
        );

        let ret: anyhow::Result<()> = tokio::select! {
            r = bound.serve(SHUTDOWN_BROADCAST.subscribe()) => r.map_err(Into::into),
            r = control.serve(SHUTDOWN_BROADCAST.subscribe()) => r.map_err(Into::into),
            r = shutdown() => r,
        };

        internal!("Shutting down...");

        // Wake every remaining task, whatever ended the select.
        let _ = SHUTDOWN_BROADCAST.send(Signal::Shutdown);
        inventory.stop();

        // Teardown runs after the engine has stopped serving.
        if let Err(err) = redirector.teardown().await {
            warn!(%err, "failed to remove redirect rules");
        }

        drop(audit_publisher);
        let _ = audit_consumer.await;
        let _ = inventory_task.await;
        sweeper.abort();

        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_sample_config_parses() {
        let warden: Warden =
            ron::from_str(include_str!("../../warden.config.ron")).expect("sample config");
        assert_eq!(warden.dns.listen_addr.port(), 53);
        assert_eq!(warden.rules.len(), 1);
        assert_eq!(warden.rules[0].id, "block-doubleclick");
        assert!(!warden.control.auth.enabled);
    }

    #[test]
    fn empty_config_falls_back_to_defaults() {
        let warden: Warden = ron::from_str("()").expect("empty config");
        assert_eq!(warden.cache.ttl_secs, 300);
        assert_eq!(warden.inventory.poll_interval_secs, 10);
        assert_eq!(warden.control.socket_path, DEFAULT_CONTROL_SOCKET);
        assert!(warden.rules.is_empty());
    }
}
