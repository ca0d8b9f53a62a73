//! Process-level tracing setup for embedding applications.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing for a pipeline process.
///
/// Reads `.env`, then installs a subscriber: colored output for dev,
/// JSON when `LOG_FORMAT=json`. `RUST_LOG` refines the filter; the
/// pipeline's own crates default to `info`.
///
/// Call once at startup. Panics if a global subscriber is already set.
pub fn init_tracing() {
    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("clipmill=info".parse().expect("static directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}
