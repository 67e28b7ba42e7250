use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for operator-facing output.
///
/// `RUST_LOG` wins when set; otherwise `verbose` selects `debug` for this
/// tool's crates and the default is `warn`.
pub fn init(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fallback = if verbose {
        "warn,stackup=debug,stackup_core=debug"
    } else {
        "warn"
    };
    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(fallback))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_level(true)
        .compact();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent_enough() {
        // only the first init in a process succeeds
        let _ = init(true);
        assert!(init(false).is_err());
        tracing::debug!("logging initialized");
    }
}
