//! Tracing setup for the binary.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding a filter directive, e.g.
/// `TIERSCAN_LOG=tierscan::parser=debug`.
pub const LOG_ENV: &str = "TIERSCAN_LOG";

static INIT: Once = Once::new();

/// Filter used when the environment does not provide one.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "tierscan=debug"
    } else {
        "warn"
    }
}

/// Install a stderr subscriber. Safe to call more than once; only the first
/// call has an effect, and an already-installed global subscriber wins.
pub fn init(verbose: bool) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbose)
                    .with_thread_ids(verbose),
            )
            .with(filter)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "warn");
        assert_eq!(default_directive(true), "tierscan=debug");
    }

    #[test]
    fn test_init_idempotent() {
        init(false);
        init(true);
        tracing::debug!("still alive");
    }
}
