//! Logging setup for the explorer binary.
//!
//! Library code logs through `log` and wraps its heavier passes in `tracing`
//! spans. [`init_logging`] installs a formatting subscriber that receives
//! both; closed spans are reported with their timing.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Error, Result};

pub const DEFAULT_FILTER: &str = "info,spanscope=debug";

/// Installs the global subscriber, filtered by `RUST_LOG` when set.
pub fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_span_events(FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| Error::Logging(err.to_string()))?;

    log::debug!("logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn second_install_is_an_error() {
        let _ = init_logging();
        assert!(matches!(init_logging(), Err(Error::Logging(_))));
    }
}
