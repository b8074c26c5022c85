/// Connection establishment with bounded exponential backoff
///
/// The broker and the store are both reached through [`ResilientConnector`].
/// It runs a caller-supplied attempt closure up to the policy's attempt
/// budget, sleeping on the backoff schedule between failures.
///
/// # Retry Protocol
///
/// ```text
/// attempt 0 ──fail──> warn, sleep 2s
/// attempt 1 ──fail──> warn, sleep 4s
/// attempt 2 ──fail──> warn, sleep 8s
/// attempt 3 ──fail──> warn, sleep 16s
/// attempt 4 ──fail──> ConnectError (Fatal or Exhausted)
///
/// any attempt ──ok──> info, return connection
/// ```
///
/// # Exhaustion Modes
///
/// - [`OnExhausted::Terminate`]: the error is fatal. The binary's
///   `FatalPolicy` ends the process.
/// - [`OnExhausted::ReturnError`]: the error is recoverable and left to the
///   caller.
///
/// # Example
///
/// ```no_run
/// use parkline_shared::connector::{OnExhausted, ResilientConnector};
/// use parkline_shared::telemetry::Logger;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let connector = ResilientConnector::new(Logger::new("connector"))
///     .on_exhausted(OnExhausted::ReturnError);
///
/// let stream = connector
///     .connect("echo server", |_attempt| tokio::net::TcpStream::connect("127.0.0.1:7"))
///     .await?;
/// # drop(stream);
/// # Ok(())
/// # }
/// ```

pub mod backoff;

pub use backoff::BackoffPolicy;

use crate::fatal::Severity;
use crate::telemetry::Logger;
use std::future::Future;
use thiserror::Error;

/// Boxed underlying error from the last attempt
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What happens once every attempt has failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnExhausted {
    /// Report a fatal error; the process is expected to stop
    #[default]
    Terminate,

    /// Report a recoverable error to the caller
    ReturnError,
}

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Budget exhausted, caller decides what to do
    #[error("Failed to connect to {target} after {attempts} attempts: {source}")]
    Exhausted {
        target: String,
        attempts: u32,
        #[source]
        source: BoxError,
    },

    /// Budget exhausted in terminate mode
    #[error("Fatal: could not connect to {target} after {attempts} attempts: {source}")]
    Fatal {
        target: String,
        attempts: u32,
        #[source]
        source: BoxError,
    },
}

impl ConnectError {
    /// Name of the dependency that could not be reached
    pub fn target(&self) -> &str {
        match self {
            ConnectError::Exhausted { target, .. } | ConnectError::Fatal { target, .. } => target,
        }
    }

    /// Number of attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            ConnectError::Exhausted { attempts, .. } | ConnectError::Fatal { attempts, .. } => {
                *attempts
            }
        }
    }
}

impl Severity for ConnectError {
    fn is_fatal(&self) -> bool {
        matches!(self, ConnectError::Fatal { .. })
    }
}

/// Retries connection attempts on a backoff schedule
#[derive(Debug, Clone)]
pub struct ResilientConnector {
    policy: BackoffPolicy,
    on_exhausted: OnExhausted,
    logger: Logger,
}

impl ResilientConnector {
    /// Creates a connector with the default policy in terminate mode
    pub fn new(logger: Logger) -> Self {
        Self {
            policy: BackoffPolicy::default(),
            on_exhausted: OnExhausted::default(),
            logger,
        }
    }

    /// Replaces the backoff policy
    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Selects the exhaustion mode
    pub fn on_exhausted(mut self, mode: OnExhausted) -> Self {
        self.on_exhausted = mode;
        self
    }

    /// Backoff policy in use
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Exhaustion mode in use
    pub fn exhaustion_mode(&self) -> OnExhausted {
        self.on_exhausted
    }

    /// Runs `attempt` until it succeeds or the budget is spent
    ///
    /// `attempt` receives the 0-based attempt number. Sleeps only happen
    /// between attempts, never after the last one.
    ///
    /// # Errors
    ///
    /// Returns `ConnectError::Fatal` or `ConnectError::Exhausted`, depending
    /// on the exhaustion mode, carrying the last attempt's error.
    pub async fn connect<T, E, F, Fut>(
        &self,
        target: &str,
        mut attempt: F,
    ) -> Result<T, ConnectError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        let attempts = self.policy.attempts();
        let mut attempt_no = 0;

        let last_error: BoxError = loop {
            tracing::debug!(
                parent: self.logger.span(),
                dependency = %target,
                attempt = attempt_no + 1,
                max_attempts = attempts,
                "Connecting"
            );

            match attempt(attempt_no).await {
                Ok(conn) => {
                    tracing::info!(
                        parent: self.logger.span(),
                        dependency = %target,
                        attempt = attempt_no + 1,
                        "Successfully connected to {}",
                        target
                    );
                    return Ok(conn);
                }
                Err(e) => {
                    let e: BoxError = e.into();
                    if attempt_no + 1 >= attempts {
                        break e;
                    }

                    let backoff = self.policy.delay_for(attempt_no);
                    tracing::warn!(
                        parent: self.logger.span(),
                        dependency = %target,
                        attempt = attempt_no + 1,
                        backoff_secs = backoff.as_secs_f64(),
                        error = %e,
                        "Failed to connect to {}, retrying in {:?}",
                        target,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt_no += 1;
                }
            }
        };

        let target = target.to_string();
        match self.on_exhausted {
            OnExhausted::Terminate => {
                tracing::error!(
                    parent: self.logger.span(),
                    dependency = %target,
                    attempts = attempts,
                    error = %last_error,
                    "Failed to connect to {} after multiple attempts",
                    target
                );
                Err(ConnectError::Fatal {
                    target,
                    attempts,
                    source: last_error,
                })
            }
            OnExhausted::ReturnError => {
                tracing::warn!(
                    parent: self.logger.span(),
                    dependency = %target,
                    attempts = attempts,
                    error = %last_error,
                    "Giving up connecting to {}",
                    target
                );
                Err(ConnectError::Exhausted {
                    target,
                    attempts,
                    source: last_error,
                })
            }
        }
    }
}
