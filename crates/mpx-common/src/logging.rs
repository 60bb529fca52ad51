//! Structured Logging Configuration
//!
//! - JSON output for log aggregation (LOG_FORMAT=json)
//! - Human-readable output otherwise
//!
//! Everything is written to stderr so command output on stdout stays clean.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mpx_common::logging::init_logging;
//!
//! fn main() {
//!     init_logging("mpx-cli");
//!     tracing::info!(service = "media", "Listing objects");
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `LOG_FORMAT`: Set to "json" for JSON output, anything else for text (default: text)
//! - `RUST_LOG`: Standard log level filter (default: warn, plus info for the mpx crates)
//!   Examples: `RUST_LOG=debug`, `RUST_LOG=mpx_sdk=trace,reqwest=info`

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "warn,mpx_sdk=info,mpx_config=info";

/// Initialize logging for the named binary.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_logging(service_name: &str) {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    let env_filter = build_filter(service_name);

    if log_format.eq_ignore_ascii_case("json") {
        init_json_logging(env_filter);
    } else {
        init_text_logging(env_filter);
    }
}

/// Initialize logging with defaults (uses "mpx" as service name).
pub fn init_default_logging() {
    init_logging("mpx");
}

/// `RUST_LOG` if set and valid, otherwise [`DEFAULT_FILTER`] plus info for the binary itself
fn build_filter(service_name: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let own = service_name.replace('-', "_");
        EnvFilter::try_new(format!("{},{}=info", DEFAULT_FILTER, own))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    })
}

fn init_json_logging(env_filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true)
                .flatten_event(true),
        )
        .try_init();
}

fn init_text_logging(env_filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(true),
        )
        .try_init();
}
