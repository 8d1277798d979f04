use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable overriding the log filter when `RUST_LOG` is unset
const LOG_ENV_VAR: &str = "RESPONSE_VALIDATOR_LOG";

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "response_validator=debug"
    } else {
        "response_validator=warn"
    }
}

/// Initialize structured logging to stderr
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env(LOG_ENV_VAR))
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .try_init()?;

    Ok(())
}
