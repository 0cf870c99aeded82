//! Control handler for the running daemon.
//!
//! Maps control-protocol commands onto the rule store, the process
//! inventory and the engine counters.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use warden_control::{
    ControlError, ProcessCommand, Request, RequestCommand, Response, RuleCommand, SystemCommand,
    protocol::{ResponseData, StatsReport, SystemStatus},
    server::CommandHandler,
};
use warden_common::ProcessContext;
use warden_dns::DnsServer;
use warden_filter::{DecisionCache, Evaluator, RuleStore};
use warden_proc::ProcessInventory;

/// Handler for control commands
pub struct WardenControlHandler {
    engine: Arc<DnsServer>,
    store: Arc<RuleStore>,
    inventory: Arc<ProcessInventory>,
    cache: Arc<DecisionCache>,
    /// Server start time for uptime calculation
    start_time: Instant,
}

impl WardenControlHandler {
    #[must_use]
    pub fn new(
        engine: Arc<DnsServer>,
        store: Arc<RuleStore>,
        inventory: Arc<ProcessInventory>,
        cache: Arc<DecisionCache>,
    ) -> Self {
        Self {
            engine,
            store,
            inventory,
            cache,
            start_time: Instant::now(),
        }
    }

    fn audit_command(command: &RequestCommand) {
        #[cfg(unix)]
        let uid = unsafe { libc::getuid() };
        #[cfg(not(unix))]
        let uid = "N/A";

        let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());

        tracing::event!(
            target: "warden::control",
            tracing::Level::INFO,
            user = %user,
            uid = %uid,
            command = ?command,
            "Control command"
        );
    }

    fn handle_rules(&self, command: RuleCommand) -> Response {
        match command {
            RuleCommand::List => Response::data(ResponseData::Rules(self.store.rules())),
            RuleCommand::Upsert(rule) => match self.store.upsert(*rule) {
                Ok(()) => Response::ok(),
                Err(err) => Response::error(err.to_string()),
            },
            RuleCommand::Delete { id } => {
                // Idempotent: deleting a missing rule is not an error.
                self.store.delete(&id);
                Response::ok()
            }
            RuleCommand::Clear => {
                self.store.clear();
                Response::ok()
            }
            RuleCommand::Check {
                query,
                pid,
                process_name,
            } => {
                // Resolve a bare pid to its inventoried name so scoped rules
                // see the same context the cache keys on.
                let context = match (pid, process_name) {
                    (None, None) => None,
                    (Some(pid), None) => {
                        let name = self
                            .inventory
                            .get(pid)
                            .map(|record| record.name)
                            .unwrap_or_default();
                        Some(ProcessContext::new(pid, name))
                    }
                    (pid, Some(name)) => Some(ProcessContext::new(pid.unwrap_or(0), name)),
                };

                let decision = Evaluator::new(Arc::clone(&self.store))
                    .decide(&query, context.as_ref());
                Response::data(ResponseData::Decision(decision))
            }
        }
    }

    async fn handle_process(&self, command: ProcessCommand) -> Response {
        match command {
            ProcessCommand::List => {
                Response::data(ResponseData::Processes(self.inventory.list()))
            }
            ProcessCommand::Terminate { pid, graceful } => {
                match self.inventory.terminate(pid, graceful).await {
                    Ok(()) => Response::data(ResponseData::Message(format!(
                        "terminated process {pid}"
                    ))),
                    Err(err) => Response::error(err.to_string()),
                }
            }
        }
    }

    fn handle_system(&self, command: &SystemCommand) -> Response {
        match command {
            SystemCommand::Ping => Response::ok(),
            SystemCommand::Stats => Response::data(ResponseData::Stats(StatsReport {
                engine: self.engine.stats(),
                cache_entries: self.cache.len(),
                process_count: self.inventory.count(),
            })),
            SystemCommand::Status => Response::data(ResponseData::Status(SystemStatus {
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs: self.start_time.elapsed().as_secs(),
                rule_count: self.store.len(),
                process_count: self.inventory.count(),
                cache_entries: self.cache.len(),
            })),
        }
    }
}

#[async_trait]
impl CommandHandler for WardenControlHandler {
    async fn handle_request(&self, request: Request) -> warden_control::Result<Response> {
        // Validate protocol version
        if !request.is_version_compatible() {
            return Err(ControlError::ServerError(format!(
                "Incompatible protocol version: client={}, server={}",
                request.version,
                warden_control::PROTOCOL_VERSION
            )));
        }

        Self::audit_command(&request.command);

        Ok(match request.command {
            RequestCommand::Rules(command) => self.handle_rules(command),
            RequestCommand::Process(command) => self.handle_process(command).await,
            RequestCommand::System(command) => self.handle_system(&command),
        })
    }
}
