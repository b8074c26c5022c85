/// Fatal error classification and the top-level termination policy
///
/// Library components never end the process. Conditions that the pipeline
/// treats as unrecoverable (connection budget exhausted in terminate mode,
/// an event that cannot be serialized, a handler failure under the abort
/// policy) surface as errors whose [`Severity::is_fatal`] is `true`. The
/// binary hands those errors to its [`FatalPolicy`], which decides whether
/// to exit.

use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;

/// Classifies an error as fatal or recoverable
pub trait Severity {
    /// Whether the error should end the process under `FatalPolicy::Exit`
    fn is_fatal(&self) -> bool;
}

/// What a binary does with fatal errors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FatalPolicy {
    /// Log at error level and exit with status 1
    #[default]
    Exit,

    /// Return the error to the caller like any other
    Propagate,
}

impl FatalPolicy {
    /// Whether `err` ends the process under this policy
    pub fn should_terminate<E: Severity + ?Sized>(&self, err: &E) -> bool {
        matches!(self, FatalPolicy::Exit) && err.is_fatal()
    }

    /// Applies the policy to a result
    ///
    /// Ok values and recoverable errors pass through untouched. A fatal error
    /// under `Exit` is logged and the process exits; under `Propagate` it is
    /// returned.
    pub fn enforce<T, E>(&self, result: Result<T, E>) -> Result<T, E>
    where
        E: Severity + fmt::Display,
    {
        match result {
            Err(err) if self.should_terminate(&err) => {
                tracing::error!(error = %err, "Fatal error, terminating process");
                std::process::exit(1);
            }
            other => other,
        }
    }
}

impl FromStr for FatalPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exit" => Ok(FatalPolicy::Exit),
            "propagate" => Ok(FatalPolicy::Propagate),
            _ => Err(ConfigError::Invalid {
                name: "FATAL_POLICY",
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Classified(bool);

    impl Severity for Classified {
        fn is_fatal(&self) -> bool {
            self.0
        }
    }

    impl fmt::Display for Classified {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "classified({})", self.0)
        }
    }

    #[test]
    fn test_exit_terminates_only_fatal() {
        let policy = FatalPolicy::Exit;
        assert!(policy.should_terminate(&Classified(true)));
        assert!(!policy.should_terminate(&Classified(false)));
    }

    #[test]
    fn test_propagate_never_terminates() {
        let policy = FatalPolicy::Propagate;
        assert!(!policy.should_terminate(&Classified(true)));
    }

    #[test]
    fn test_enforce_passes_recoverable_errors() {
        let result: Result<(), Classified> = Err(Classified(false));
        assert!(FatalPolicy::Exit.enforce(result).is_err());

        let fatal: Result<(), Classified> = Err(Classified(true));
        assert!(FatalPolicy::Propagate.enforce(fatal).is_err());
    }

    #[test]
    fn test_parse() {
        assert_eq!("exit".parse::<FatalPolicy>().unwrap(), FatalPolicy::Exit);
        assert_eq!("PROPAGATE".parse::<FatalPolicy>().unwrap(), FatalPolicy::Propagate);
        assert!("ignore".parse::<FatalPolicy>().is_err());
    }
}
