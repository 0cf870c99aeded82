//! Audit pipeline boundary.
//!
//! Every served query attempts exactly one publish onto a bounded channel.
//! The publish never blocks the hot path: a full channel drops the record and
//! the caller counts an error. The consumer side drains the channel and emits
//! each record as a structured tracing event, so persistence, retention and
//! rotation ride on whatever log pipeline the operator runs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::{Decision, Signal};

/// Audit pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Enable per-query audit publishes.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bound on the publish channel; a full channel drops records.
    #[serde(default = "default_capacity")]
    pub channel_capacity: usize,
}

const fn default_true() -> bool {
    true
}

const fn default_capacity() -> usize {
    1000
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            channel_capacity: default_capacity(),
        }
    }
}

/// Errors surfaced by the publish side of the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The channel is at capacity; the record was dropped.
    #[error("audit channel full, record dropped")]
    SinkFull,

    /// The consumer has gone away; no further publishes will succeed.
    #[error("audit channel closed")]
    Closed,
}

/// One record published per served query.
///
/// `details` is an opaque bag for the consumer; the core never reads it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub decision: Decision,
    #[serde(default)]
    pub details: HashMap<String, String>,
}

impl AuditRecord {
    #[must_use]
    pub fn new(decision: Decision) -> Self {
        Self {
            decision,
            details: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Handle used by the hot path to publish records.
///
/// Cloneable; all clones feed the same channel. Dropping every clone closes
/// the channel, which is how the controller signals the consumer to finish.
#[derive(Debug, Clone)]
pub struct AuditPublisher {
    tx: mpsc::Sender<AuditRecord>,
    enabled: bool,
}

impl AuditPublisher {
    /// Non-blocking publish. A disabled pipeline accepts and discards
    /// everything.
    pub fn publish(&self, record: AuditRecord) -> Result<(), AuditError> {
        if !self.enabled {
            return Ok(());
        }

        self.tx.try_send(record).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => AuditError::SinkFull,
            mpsc::error::TrySendError::Closed(_) => AuditError::Closed,
        })
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Create the bounded audit channel described by `config`.
#[must_use]
pub fn channel(config: &AuditConfig) -> (AuditPublisher, mpsc::Receiver<AuditRecord>) {
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    (
        AuditPublisher {
            tx,
            enabled: config.enabled,
        },
        rx,
    )
}

/// Drain the audit channel until it closes or shutdown is signalled, logging
/// each record as a structured event.
pub async fn consume(
    mut records: mpsc::Receiver<AuditRecord>,
    mut shutdown: broadcast::Receiver<Signal>,
) {
    loop {
        tokio::select! {
            record = records.recv() => {
                let Some(record) = record else {
                    debug!("audit channel closed, consumer finishing");
                    break;
                };
                log_record(&record);
            }
            sig = shutdown.recv() => {
                match sig {
                    Ok(Signal::Shutdown | Signal::Finalised) | Err(_) => {
                        // Drain whatever is already queued before leaving.
                        while let Ok(record) = records.try_recv() {
                            log_record(&record);
                        }
                        break;
                    }
                }
            }
        }
    }
}

fn log_record(record: &AuditRecord) {
    let decision = &record.decision;
    tracing::event!(
        target: crate::logging::AUDIT_TARGET,
        tracing::Level::INFO,
        action = %decision.action,
        rule_id = decision.rule_id.as_deref().unwrap_or("-"),
        reason = %decision.reason,
        query = %decision.query,
        pid = decision.process.as_ref().map(|p| p.pid),
        process = decision.process.as_ref().map(|p| p.name.as_str()),
        "decision"
    );
}
