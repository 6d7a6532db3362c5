//! Logging setup with `tracing_subscriber`.

use std::io::IsTerminal;
use std::sync::Once;

use tracing_subscriber::{EnvFilter, filter::LevelFilter};

/// Variable holding the log level of this crate.
pub const LOG_ENV_VAR: &str = "BGVISOR_LOG";

/// Initializes a `fmt` subscriber writing to stderr.
///
/// `RUST_LOG` directives are honoured; the level of `bgvisor` itself comes
/// from `BGVISOR_LOG` (default `info`) unless `RUST_LOG` names it. Safe to
/// call more than once, so tests and demos can use it freely.
pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let (filter, level) = env_filter_and_log_level();
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
            .try_init()
            .is_ok();
        if installed {
            tracing::info!("log level: {level}");
        }
    });
}

fn env_filter_and_log_level() -> (EnvFilter, String) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse_lossy(&directives);

    let level = std::env::var(LOG_ENV_VAR).unwrap_or_else(|_| "info".to_string());
    if !directives.contains("bgvisor=") {
        match format!("bgvisor={level}").parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(_) => filter = filter.add_directive(LevelFilter::INFO.into()),
        }
    }
    (filter, level)
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_is_idempotent() {
        super::init();
        super::init();
    }
}
