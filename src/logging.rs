//! Logging Setup
//!
//! Builds the `tracing` subscriber used by the binary. Output goes to stderr
//! so command output on stdout stays clean. `RUST_LOG` directives still take
//! precedence over the configured level.

use anyhow::{Context, Result};
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "compact" => Some(LogFormat::Compact),
            "pretty" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Effective level: debug when verbose, else the configured level
pub fn effective_level(config: &LoggingConfig, verbose: bool) -> Level {
    if verbose {
        return Level::DEBUG;
    }
    config.log_level().unwrap_or(Level::WARN)
}

fn subscriber<W>(format: LogFormat, filter: EnvFilter, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false);

    match format {
        LogFormat::Compact => Box::new(builder.compact().finish()),
        LogFormat::Pretty => Box::new(builder.pretty().finish()),
        LogFormat::Json => Box::new(builder.json().finish()),
    }
}

/// Install the global subscriber
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = effective_level(config, verbose);
    let format = LogFormat::parse(&config.format).unwrap_or(LogFormat::Compact);
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing::subscriber::set_global_default(subscriber(format, filter, std::io::stderr))
        .context("Failed to initialize logging")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing::{debug, info, warn};

    /// Writer collecting everything into a shared buffer
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("Pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("compact"), Some(LogFormat::Compact));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_effective_level() {
        let mut config = LoggingConfig::default();
        assert_eq!(effective_level(&config, false), Level::WARN);
        assert_eq!(effective_level(&config, true), Level::DEBUG);

        config.level = "error".to_string();
        assert_eq!(effective_level(&config, false), Level::ERROR);

        config.level = "nonsense".to_string();
        assert_eq!(effective_level(&config, false), Level::WARN);
    }

    #[test]
    fn test_level_filtering() {
        let capture = Capture::default();
        let subscriber = subscriber(LogFormat::Compact, EnvFilter::new("warn"), capture.clone());

        tracing::subscriber::with_default(subscriber, || {
            debug!("hidden debug");
            info!("hidden info");
            warn!("visible warning");
        });

        let output = capture.contents();
        assert!(output.contains("visible warning"));
        assert!(!output.contains("hidden"));
    }

    #[test]
    fn test_json_output_is_parseable() {
        let capture = Capture::default();
        let subscriber = subscriber(LogFormat::Json, EnvFilter::new("info"), capture.clone());

        tracing::subscriber::with_default(subscriber, || {
            info!(service = "gemini", "Delegating");
        });

        let output = capture.contents();
        let line = output.lines().next().unwrap();
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["fields"]["message"], "Delegating");
        assert_eq!(value["fields"]["service"], "gemini");
        assert_eq!(value["level"], "INFO");
    }
}
