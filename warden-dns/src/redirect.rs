//! Transparent DNS redirection.
//!
//! Two NAT OUTPUT rules divert every outbound packet destined for port 53
//! (UDP and TCP) to the local listener, excluding traffic owned by root so
//! the engine's own upstream exchanges still leave the host. Setup must
//! finish before the engine binds; teardown runs after the engine stops.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::RedirectError;

const IPTABLES: &str = "iptables";

/// Installs and removes the NAT redirect rules.
#[derive(Debug)]
pub struct Redirector {
    /// Local port queries are redirected to.
    port: u16,
    installed: AtomicBool,
}

impl Redirector {
    #[must_use]
    pub const fn new(port: u16) -> Self {
        Self {
            port,
            installed: AtomicBool::new(false),
        }
    }

    /// Rule arguments for one protocol, without the insert/delete verb.
    fn rule_args(&self, proto: &str) -> Vec<String> {
        [
            "-t",
            "nat",
            "-p",
            proto,
            "--dport",
            "53",
            "-m",
            "owner",
            "!",
            "--uid-owner",
            "0",
            "-j",
            "REDIRECT",
            "--to-ports",
        ]
        .iter()
        .map(ToString::to_string)
        .chain(std::iter::once(self.port.to_string()))
        .collect()
    }

    async fn run(verb: &str, args: &[String], context: &'static str) -> Result<(), RedirectError> {
        let output = Command::new(IPTABLES)
            .arg(verb)
            .arg("OUTPUT")
            .args(args)
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(RedirectError::CommandFailed {
                context,
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Install both redirect rules. If the TCP rule fails after the UDP rule
    /// succeeded, the UDP rule is removed before returning so the host is
    /// never left half-redirected.
    pub async fn setup(&self) -> Result<(), RedirectError> {
        if !has_root() {
            return Err(RedirectError::PrivilegeRequired);
        }

        Self::run("-I", &self.rule_args("udp"), "install udp redirect").await?;

        if let Err(err) = Self::run("-I", &self.rule_args("tcp"), "install tcp redirect").await {
            if let Err(cleanup) =
                Self::run("-D", &self.rule_args("udp"), "rollback udp redirect").await
            {
                warn!(%cleanup, "failed to roll back udp redirect rule");
            }
            return Err(err);
        }

        self.installed.store(true, Ordering::SeqCst);
        debug!(port = self.port, "redirect rules installed");
        Ok(())
    }

    /// Remove both rules. Running it twice, or against rules that were never
    /// installed, is not a fault.
    pub async fn teardown(&self) -> Result<(), RedirectError> {
        if !self.installed.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let mut first_failure = None;
        for (proto, context) in [("udp", "remove udp redirect"), ("tcp", "remove tcp redirect")] {
            if let Err(err) = Self::run("-D", &self.rule_args(proto), context).await {
                warn!(%err, proto, "failed to remove redirect rule");
                first_failure.get_or_insert(err);
            }
        }

        match first_failure {
            None => {
                debug!("redirect rules removed");
                Ok(())
            }
            Some(err) => Err(err),
        }
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }
}

#[cfg(unix)]
fn has_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
const fn has_root() -> bool {
    false
}
