/// Worker and generator configuration
///
/// Both binaries share the broker, store and logging settings from
/// `parkline_shared::config` and add their own pipeline settings on top.
///
/// # Environment Variables
///
/// - `ENTRY_QUEUE`: Queue carrying entry events (default: entry)
/// - `EXIT_QUEUE`: Queue carrying exit events (default: exit)
/// - `PRESENCE_SET`: Set of parked vehicles (default: vehicles_parked)
/// - `HANDLER_FAILURE_POLICY`: log_and_continue or abort (worker, default: log_and_continue)
/// - `FATAL_POLICY`: exit or propagate (default: exit)
/// - `GENERATOR_INTERVAL_MS`: Delay between generated events (generator, default: 1000)
/// - `GENERATOR_EXIT_RATIO`: Probability of an exit when vehicles are parked (generator, default: 0.5)

use parkline_shared::config::{env_or, BrokerConfig, ConfigError, LogConfig, StoreConfig};
use parkline_shared::fatal::FatalPolicy;
use parkline_shared::messaging::HandlerFailurePolicy;
use parkline_shared::presence::DEFAULT_PRESENCE_SET;
use std::time::Duration;

/// Default queue for entry events
pub const DEFAULT_ENTRY_QUEUE: &str = "entry";

/// Default queue for exit events
pub const DEFAULT_EXIT_QUEUE: &str = "exit";

/// Queue and set names shared by the worker and the generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Queue carrying entry events
    pub entry_queue: String,

    /// Queue carrying exit events
    pub exit_queue: String,

    /// Set of vehicles currently parked
    pub presence_set: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            entry_queue: DEFAULT_ENTRY_QUEUE.to_string(),
            exit_queue: DEFAULT_EXIT_QUEUE.to_string(),
            presence_set: DEFAULT_PRESENCE_SET.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Loads queue and set names from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            entry_queue: env_or("ENTRY_QUEUE", DEFAULT_ENTRY_QUEUE.to_string())?,
            exit_queue: env_or("EXIT_QUEUE", DEFAULT_EXIT_QUEUE.to_string())?,
            presence_set: env_or("PRESENCE_SET", DEFAULT_PRESENCE_SET.to_string())?,
        })
    }
}

/// Everything the worker binary needs
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub broker: BrokerConfig,
    pub store: StoreConfig,
    pub log: LogConfig,
    pub pipeline: PipelineConfig,
    pub handler_policy: HandlerFailurePolicy,
    pub fatal_policy: FatalPolicy,
}

impl WorkerConfig {
    /// Loads the worker configuration from `.env` and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does
    /// not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            broker: BrokerConfig::from_env()?,
            store: StoreConfig::from_env()?,
            log: LogConfig::from_env(),
            pipeline: PipelineConfig::from_env()?,
            handler_policy: env_or("HANDLER_FAILURE_POLICY", HandlerFailurePolicy::default())?,
            fatal_policy: env_or("FATAL_POLICY", FatalPolicy::default())?,
        })
    }
}

/// Everything the generator binary needs
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub broker: BrokerConfig,
    pub store: StoreConfig,
    pub log: LogConfig,
    pub pipeline: PipelineConfig,

    /// Delay between generated events
    pub interval: Duration,

    /// Probability of generating an exit while vehicles are parked
    pub exit_ratio: f64,

    pub fatal_policy: FatalPolicy,
}

impl GeneratorConfig {
    /// Loads the generator configuration from `.env` and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing, a value does not
    /// parse, `GENERATOR_INTERVAL_MS` is zero, or `GENERATOR_EXIT_RATIO` is
    /// outside `0.0..=1.0`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let interval = validate_interval(env_or("GENERATOR_INTERVAL_MS", 1000)?)?;
        let exit_ratio = validate_ratio(env_or("GENERATOR_EXIT_RATIO", 0.5)?)?;

        Ok(Self {
            broker: BrokerConfig::from_env()?,
            store: StoreConfig::from_env()?,
            log: LogConfig::from_env(),
            pipeline: PipelineConfig::from_env()?,
            interval,
            exit_ratio,
            fatal_policy: env_or("FATAL_POLICY", FatalPolicy::default())?,
        })
    }
}

fn validate_interval(interval_ms: u64) -> Result<Duration, ConfigError> {
    if interval_ms == 0 {
        return Err(ConfigError::Invalid {
            name: "GENERATOR_INTERVAL_MS",
            value: interval_ms.to_string(),
        });
    }
    Ok(Duration::from_millis(interval_ms))
}

fn validate_ratio(ratio: f64) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&ratio) {
        Ok(ratio)
    } else {
        Err(ConfigError::Invalid {
            name: "GENERATOR_EXIT_RATIO",
            value: ratio.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.entry_queue, "entry");
        assert_eq!(config.exit_queue, "exit");
        assert_eq!(config.presence_set, "vehicles_parked");
    }

    #[test]
    fn test_validate_interval_rejects_zero() {
        let err = validate_interval(0).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "GENERATOR_INTERVAL_MS", .. }));
        assert_eq!(validate_interval(250).unwrap(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_validated_interval_is_usable_by_ticker() {
        let interval = validate_interval(1).unwrap();
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
    }

    #[test]
    fn test_validate_ratio() {
        assert_eq!(validate_ratio(0.0).unwrap(), 0.0);
        assert_eq!(validate_ratio(1.0).unwrap(), 1.0);
        assert!(validate_ratio(1.5).is_err());
        assert!(validate_ratio(-0.1).is_err());
        assert!(validate_ratio(f64::NAN).is_err());
    }
}
