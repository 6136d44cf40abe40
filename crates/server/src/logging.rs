use mystyle_core::config::{AppConfig, LogFormat};
use tracing_subscriber::{fmt::MakeWriter, EnvFilter};

/// Installs the global subscriber writing to stdout. `RUST_LOG` wins over the
/// configured level. A second call is ignored.
pub fn init_logging(config: &AppConfig) {
    install(config, std::io::stdout);
}

/// Same as [`init_logging`] but on stderr, keeping stdout for command output.
pub fn init_stderr_logging(config: &AppConfig) {
    install(config, std::io::stderr);
}

fn install<W>(config: &AppConfig, writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder =
        tracing_subscriber::fmt().with_target(false).with_env_filter(filter).with_writer(writer);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use mystyle_core::config::{AppConfig, LogFormat};

    use super::{init_logging, init_stderr_logging};

    #[test]
    fn repeated_initialization_does_not_panic() {
        let mut config = AppConfig::default();
        config.logging.format = LogFormat::Json;
        config.logging.level = "not a level [".to_string();

        init_logging(&config);
        init_stderr_logging(&config);
    }
}
