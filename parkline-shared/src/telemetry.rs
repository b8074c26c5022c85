/// Tracing setup and the component logger capability
///
/// Logging is configured once per process by [`init_tracing`], normally the
/// first thing `main` does. Library components never reach for a global
/// logger; they receive a [`Logger`] at construction and emit every event as
/// a child of its span, so each line carries the component it came from.
///
/// # Process-lifetime contract
///
/// - Call [`init_tracing`] exactly once, before any component is built.
/// - A second call returns [`TelemetryError::AlreadyInitialized`] and leaves
///   the first subscriber in place.
/// - Components built before initialization still work; their events are
///   simply discarded.
///
/// # Example
///
/// ```no_run
/// use parkline_shared::config::LogConfig;
/// use parkline_shared::telemetry::{init_tracing, Logger};
///
/// # fn example() -> anyhow::Result<()> {
/// init_tracing(&LogConfig::from_env())?;
///
/// let logger = Logger::new("presence");
/// tracing::info!(parent: logger.span(), "presence tracker ready");
/// # Ok(())
/// # }
/// ```

use crate::config::{LogConfig, LogFormat};
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing::{Level, Span};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Telemetry errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// A global subscriber was already installed
    #[error("Tracing already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Parses a log level name, falling back to `info` for anything unknown
pub fn parse_level(level: &str) -> Level {
    level.trim().parse::<Level>().unwrap_or(Level::INFO)
}

/// Installs the process-wide tracing subscriber
///
/// `RUST_LOG` takes precedence when set; otherwise the level from
/// `config.level` applies to every target.
///
/// # Errors
///
/// Returns an error if a subscriber has already been installed.
pub fn init_tracing(config: &LogConfig) -> Result<(), TelemetryError> {
    let level = LevelFilter::from_level(parse_level(&config.level));
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    result.map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

    tracing::debug!(level = %level, format = ?config.format, "Tracing initialized");
    Ok(())
}

/// Logging capability handed to each component
///
/// Wraps a `component` span. Cloning is cheap and clones share the span.
#[derive(Debug, Clone)]
pub struct Logger {
    span: Span,
}

impl Logger {
    /// Creates a logger for the named component
    pub fn new(component: &'static str) -> Self {
        Self {
            span: tracing::info_span!("component", name = component),
        }
    }

    /// Creates a logger under an existing span
    pub fn from_span(span: Span) -> Self {
        Self { span }
    }

    /// Creates a logger that discards everything
    pub fn disabled() -> Self {
        Self { span: Span::none() }
    }

    /// Span to use as the parent of emitted events
    pub fn span(&self) -> &Span {
        &self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_known_names() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("WARN"), Level::WARN);
        assert_eq!(parse_level(" error "), Level::ERROR);
    }

    #[test]
    fn test_parse_level_falls_back_to_info() {
        assert_eq!(parse_level("chatty"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_disabled_logger_has_no_span() {
        let logger = Logger::disabled();
        assert!(logger.span().is_none());
    }

    #[test]
    fn test_second_init_is_rejected() {
        let config = LogConfig::default();
        // Other tests in this binary may already have installed a subscriber.
        let _ = init_tracing(&config);
        assert!(matches!(
            init_tracing(&config),
            Err(TelemetryError::AlreadyInitialized(_))
        ));
    }
}
