//! Log output for the `gitexec` binary.
//!
//! `gitexec exec` prints the captured git result on stdout, so every log
//! line is written to stderr. The core library only emits `tracing` events
//! (spawn and exit at debug, launch and capture failures at warn); it never
//! installs a subscriber itself.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over `level`. With `json` set each event is
/// one JSON object per line, which keeps `gitexec --json exec ...` output
/// machine-readable on both streams. Only the first call in a process has
/// any effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if json {
        registry.with(stderr_layer.json()).try_init()
    } else {
        registry.with(stderr_layer).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing(false, Level::DEBUG);
        init_tracing(true, Level::INFO);
        tracing::debug!("still alive");
    }
}
