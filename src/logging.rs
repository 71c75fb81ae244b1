//! Tracing initialization. Grounded on `common::logger::init`, simplified:
//! the teacher's circular-file-writer and custom RAM-usage formatter are
//! dropped (this crate is a library, not a long-running server with its own
//! rotating log file) but the `EnvFilter`-driven `tracing-subscriber`
//! wiring is kept.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::Config;

pub fn init(config: &Config) {
    let level = config.logging.level.as_str();
    let filters = config.logging.filters.as_deref().unwrap_or("");

    let filter_str = if filters.is_empty() {
        level.to_string()
    } else {
        format!("{level},{filters}")
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_str));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();
}
