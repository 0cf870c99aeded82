//! The critical-process guard.
//!
//! A process-wide constant set of names that must never be the target of a
//! termination attempt, plus the blanket rule that any pid ≤ 100 is
//! untouchable. Initialized once, never mutated after startup.

/// Names that are never terminated, compared case-insensitively.
///
/// The table covers both Unix and Windows service names so the guard is
/// complete regardless of which substrate is compiled in.
const CRITICAL_NAMES: &[&str] = &[
    "systemd",
    "init",
    "kthreadd",
    "sshd",
    "dbus-daemon",
    "NetworkManager",
    "login",
    "csrss.exe",
    "lsass.exe",
    "winlogon.exe",
    "services.exe",
    "smss.exe",
    "wininit.exe",
];

/// Name prefixes that are never terminated (kernel worker families).
const CRITICAL_PREFIXES: &[&str] = &["rcu_"];

/// Pids at or below this are considered system-critical regardless of name.
pub const PROTECTED_PID_MAX: u32 = 100;

/// Whether the name alone marks a process as critical.
#[must_use]
pub fn is_critical_name(name: &str) -> bool {
    CRITICAL_NAMES
        .iter()
        .any(|critical| critical.eq_ignore_ascii_case(name))
        || CRITICAL_PREFIXES
            .iter()
            .any(|prefix| name.len() >= prefix.len() && name[..prefix.len()].eq_ignore_ascii_case(prefix))
}

/// Whether a `(pid, name)` pair must be refused by `terminate`.
#[must_use]
pub fn is_protected(pid: u32, name: &str) -> bool {
    pid <= PROTECTED_PID_MAX || is_critical_name(name)
}
