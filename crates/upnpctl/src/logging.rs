use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn default_rust_log(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    }
}

/// Logs go to stderr so they never mix with command output. RUST_LOG, when set, wins over
/// the level picked by the -v flags.
pub fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let stderr_filter = EnvFilter::builder()
        .with_default_directive(
            default_rust_log(verbose)
                .parse()
                .context("can't parse default rust_log value")?,
        )
        .from_env()
        .context("invalid RUST_LOG value")?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(stderr_filter)
        .try_init()
        .context("can't initialize logging")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(default_rust_log(0), "warn");
        assert_eq!(default_rust_log(1), "debug");
        assert_eq!(default_rust_log(2), "trace");
        assert_eq!(default_rust_log(5), "trace");
    }
}
