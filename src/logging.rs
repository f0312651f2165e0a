//! Log output setup.
//!
//! Filter precedence: `--verbose`, then `--quiet`, then `RUST_LOG`, then
//! `WEBDIFF_LOG`, then `webdiff=info`. Logs go to stderr so stdout stays free
//! for the run directory path.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config;

/// Filter directive for the given flags, `None` to defer to the environment
fn flag_filter(verbose: bool, quiet: bool) -> Option<&'static str> {
    if verbose {
        Some("webdiff=debug")
    } else if quiet {
        Some("webdiff=error")
    } else {
        None
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_logging(verbose: bool, quiet: bool) {
    let filter = match flag_filter(verbose, quiet) {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config::log_filter())),
    };

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    // A subscriber may already be set, e.g. when embedded in tests
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
