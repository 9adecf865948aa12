//! Logger bootstrap. All crates in the workspace log through the `log`
//! facade; binaries and tests call [`init_logger`] once to attach the
//! env_logger backend.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the global logger with the given default filter string.
/// `RUST_LOG` overrides the default. Subsequent calls are no-ops, so tests
/// may call this freely.
pub fn init_logger(default_filter: &str) {
    INIT.call_once(|| {
        let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
        let _ = env_logger::Builder::new().parse_filters(&filters).format_timestamp_millis().try_init();
    });
}
