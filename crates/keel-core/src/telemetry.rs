//! Tracing setup for the keel binary.
//!
//! Logs always go to stderr. Stdout carries command output only (the rendered
//! Dockerfile, the rule table), and tool stderr is echoed to the same stream
//! the logs use, so interleaved lines stay in order.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const KEEL_TARGETS: &[&str] = &["keel_core", "keel_image", "keel_lint", "keel_cli"];

/// Filter used when `RUST_LOG` is not set: keel crates at `level`, everything
/// else at `warn`.
pub fn default_directives(level: Level) -> String {
    std::iter::once("warn".to_string())
        .chain(KEEL_TARGETS.iter().map(|target| format!("{target}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber.
///
/// `json` selects newline-delimited JSON lines for CI log collectors. Only the
/// first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };
    installed.ok();
}
