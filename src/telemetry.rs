//! Tracing subscriber setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingSection;

/// Install a global fmt subscriber. `RUST_LOG` wins over the configured level.
/// Returns false if a subscriber was already installed.
pub fn init_tracing(logging: &LoggingSection) -> bool {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.clone().into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .try_init()
    .is_ok()
}
