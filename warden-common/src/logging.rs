//! Tracing subscriber wiring for the daemon.
//!
//! Everything the daemon emits lives under the `warden` target family: the
//! crate targets (`warden_dns::server`, `warden_proc::inventory`, ...) plus
//! the explicit streams `warden::audit` and `warden::control`. The filter
//! admits only that family, and treats the audit stream specially: audit
//! records are data, not diagnostics, so they pass whatever the diagnostic
//! threshold is. Targets are printed so the streams stay separable in the
//! operator's log pipeline.

use chrono::{SecondsFormat, Utc};
use tracing::Level;
use tracing_subscriber::{
    Layer, filter::FilterFn, fmt::time::FormatTime, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

/// Target of the per-decision audit stream.
pub const AUDIT_TARGET: &str = "warden::audit";

struct Rfc3339;

impl FormatTime for Rfc3339 {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        w.write_str(&Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!(target: "warden", $level, $span);
        let _enter = span.enter();

        $crate::tracing::event!(target: "warden", $level, $($msg),*)
    }};
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = INFO, $($msg),*)
    };
}

/// Diagnostic threshold: `LOG_LEVEL` env var when set, otherwise TRACE for
/// debug builds and INFO for release builds. Unknown values fall back to
/// INFO rather than silencing the daemon.
fn threshold() -> Level {
    match std::env::var("LOG_LEVEL").map(|value| value.to_ascii_lowercase()) {
        Ok(value) => match value.as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::INFO,
        },
        Err(_) if cfg!(debug_assertions) => Level::TRACE,
        Err(_) => Level::INFO,
    }
}

fn is_warden_target(target: &str) -> bool {
    target == "warden" || target.starts_with("warden::") || target.starts_with("warden_")
}

pub fn init() {
    let threshold = threshold();

    let events = tracing_subscriber::fmt::layer()
        .compact()
        .with_ansi(true)
        .with_timer(Rfc3339)
        .with_target(true)
        .with_level(false)
        .with_filter(FilterFn::new(move |metadata| {
            let target = metadata.target();
            if !is_warden_target(target) {
                return false;
            }
            // The audit trail rides the log pipeline unconditionally; the
            // threshold only gates diagnostics.
            target == AUDIT_TARGET || *metadata.level() <= threshold
        }));

    tracing_subscriber::registry().with(events).init();
}
