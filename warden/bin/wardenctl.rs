//! Command-line utility for managing the warden daemon
//!
//! This tool provides operational control over the running service:
//! - Rule management (list, block, allow, delete, clear)
//! - Process inventory (list, terminate)
//! - System status, statistics and health checks

use clap::{Parser, Subcommand, ValueEnum};
use warden_common::Action;
use warden_control::{
    ControlClient, DEFAULT_CONTROL_SOCKET, ProcessCommand, RequestCommand, ResponsePayload,
    RuleCommand, SystemCommand, protocol::ResponseData,
};
use warden_filter::{MatchMode, Rule};

/// Command-line utility for managing the warden daemon
#[derive(Parser, Debug)]
#[command(name = "wardenctl")]
#[command(about = "Manage the warden parental-control service", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the control socket
    #[arg(short = 'c', long, default_value = DEFAULT_CONTROL_SOCKET)]
    control_socket: String,

    /// Bearer token, when the daemon has control auth enabled
    #[arg(short, long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rule management
    Rules {
        #[command(subcommand)]
        action: RuleAction,
    },
    /// Process inventory
    Ps {
        #[command(subcommand)]
        action: PsAction,
    },
    /// System status and health
    System {
        #[command(subcommand)]
        action: SystemAction,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Domain,
    Exact,
    Wildcard,
    Regex,
}

impl From<Mode> for MatchMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Domain => Self::Domain,
            Mode::Exact => Self::Exact,
            Mode::Wildcard => Self::Wildcard,
            Mode::Regex => Self::Regex,
        }
    }
}

#[derive(Subcommand, Debug)]
enum RuleAction {
    /// List the current rules in evaluation order
    List,
    /// Add or replace a blocking rule
    Block {
        /// Pattern to block
        pattern: String,
        /// How the pattern is interpreted
        #[arg(long, value_enum, default_value = "domain")]
        mode: Mode,
        /// Rule identifier (defaults to the pattern)
        #[arg(long)]
        id: Option<String>,
        /// Higher priority wins
        #[arg(long, default_value_t = 0)]
        priority: i32,
        /// Restrict the rule to queries from this executable name
        #[arg(long)]
        process: Option<String>,
    },
    /// Add or replace an allow rule
    Allow {
        /// Pattern to allow
        pattern: String,
        /// How the pattern is interpreted
        #[arg(long, value_enum, default_value = "domain")]
        mode: Mode,
        /// Rule identifier (defaults to the pattern)
        #[arg(long)]
        id: Option<String>,
        /// Higher priority wins
        #[arg(long, default_value_t = 0)]
        priority: i32,
        /// Restrict the rule to queries from this executable name
        #[arg(long)]
        process: Option<String>,
    },
    /// Evaluate a query against the current rules without resolving it
    Check {
        /// Query name to evaluate
        query: String,
        /// Evaluate under this pid's scope
        #[arg(long)]
        pid: Option<u32>,
        /// Evaluate under this executable name's scope
        #[arg(long)]
        process: Option<String>,
    },
    /// Delete a rule by id (idempotent)
    Delete {
        /// Rule identifier
        id: String,
    },
    /// Delete every rule
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum PsAction {
    /// List the current process inventory
    List,
    /// Terminate a process (graceful by default)
    Kill {
        /// Target pid
        pid: u32,
        /// Skip the graceful shutdown window and kill outright
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SystemAction {
    /// Check if the daemon is responding
    Ping,
    /// Get system status
    Status,
    /// Get engine statistics
    Stats,
}

fn build_rule(
    action: Action,
    pattern: String,
    mode: Mode,
    id: Option<String>,
    priority: i32,
    process: Option<String>,
) -> Rule {
    let id = id.unwrap_or_else(|| pattern.clone());
    Rule::new(id, action, pattern, mode.into())
        .with_priority(priority)
        .with_scope(None, process.as_deref())
}

fn command_for(cli_command: Commands) -> anyhow::Result<RequestCommand> {
    Ok(match cli_command {
        Commands::Rules { action } => RequestCommand::Rules(match action {
            RuleAction::List => RuleCommand::List,
            RuleAction::Block {
                pattern,
                mode,
                id,
                priority,
                process,
            } => RuleCommand::Upsert(Box::new(build_rule(
                Action::Block,
                pattern,
                mode,
                id,
                priority,
                process,
            ))),
            RuleAction::Allow {
                pattern,
                mode,
                id,
                priority,
                process,
            } => RuleCommand::Upsert(Box::new(build_rule(
                Action::Allow,
                pattern,
                mode,
                id,
                priority,
                process,
            ))),
            RuleAction::Check {
                query,
                pid,
                process,
            } => RuleCommand::Check {
                query,
                pid,
                process_name: process,
            },
            RuleAction::Delete { id } => RuleCommand::Delete { id },
            RuleAction::Clear { yes } => {
                if !yes {
                    anyhow::bail!("refusing to clear every rule without --yes");
                }
                RuleCommand::Clear
            }
        }),
        Commands::Ps { action } => RequestCommand::Process(match action {
            PsAction::List => ProcessCommand::List,
            PsAction::Kill { pid, force } => ProcessCommand::Terminate {
                pid,
                graceful: !force,
            },
        }),
        Commands::System { action } => RequestCommand::System(match action {
            SystemAction::Ping => SystemCommand::Ping,
            SystemAction::Status => SystemCommand::Status,
            SystemAction::Stats => SystemCommand::Stats,
        }),
    })
}

fn print_response(payload: ResponsePayload) {
    match payload {
        ResponsePayload::Ok => println!("ok"),
        ResponsePayload::Error(err) => eprintln!("error: {err}"),
        ResponsePayload::Data(data) => match *data {
            ResponseData::Message(message) => println!("{message}"),
            ResponseData::Decision(decision) => {
                println!("query:  {}", decision.query);
                println!("action: {}", decision.action);
                println!("reason: {}", decision.reason);
                if let Some(rule_id) = decision.rule_id {
                    println!("rule:   {rule_id}");
                }
            }
            ResponseData::Rules(rules) => {
                if rules.is_empty() {
                    println!("no rules configured");
                    return;
                }
                println!(
                    "{:<24} {:<7} {:<9} {:>8}  {:<8} pattern",
                    "id", "action", "mode", "priority", "enabled"
                );
                for rule in rules {
                    println!(
                        "{:<24} {:<7} {:<9} {:>8}  {:<8} {}",
                        rule.id,
                        rule.action.to_string(),
                        format!("{:?}", rule.match_mode).to_lowercase(),
                        rule.priority,
                        rule.enabled,
                        rule.pattern,
                    );
                }
            }
            ResponseData::Processes(processes) => {
                println!("{:<8} {:<8} {:<24} path", "pid", "ppid", "name");
                for process in processes {
                    println!(
                        "{:<8} {:<8} {:<24} {}",
                        process.pid, process.ppid, process.name, process.path
                    );
                }
            }
            ResponseData::Stats(report) => {
                let engine = report.engine;
                println!("queries:          {}", engine.queries);
                println!("blocked:          {}", engine.blocked);
                println!("allowed:          {}", engine.allowed);
                println!("upstream lookups: {}", engine.upstream_lookups);
                println!("cache hits:       {}", engine.cache_hits);
                println!("cache hit ratio:  {:.2}", engine.cache_hit_ratio);
                println!("errors:           {}", engine.errors);
                println!("cache entries:    {}", report.cache_entries);
                println!("processes:        {}", report.process_count);
            }
            ResponseData::Status(status) => {
                println!("version:       {}", status.version);
                println!("uptime:        {}s", status.uptime_secs);
                println!("rules:         {}", status.rule_count);
                println!("processes:     {}", status.process_count);
                println!("cache entries: {}", status.cache_entries);
            }
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut client = ControlClient::new(cli.control_socket);
    if let Some(token) = cli.token {
        client = client.with_token(token);
    }

    let command = command_for(cli.command)?;
    let response = client.send_command(command).await?;
    print_response(response.payload);

    Ok(())
}
