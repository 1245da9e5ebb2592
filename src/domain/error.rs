//! Domain error taxonomy.
//!
//! Every variant raised while processing an event carries the instrument and
//! the event timestamp so the failure can be replayed against the same input
//! history.

use chrono::{DateTime, Utc};
use std::fmt;

/// Coarse classification used by callers that only care about the family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Data,
    Configuration,
    InvariantViolation,
    Execution,
    Strategy,
    Io,
}

/// Optional event timestamp rendered as RFC 3339 or `-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct At(pub Option<DateTime<Utc>>);

impl fmt::Display for At {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ts) => write!(f, "{}", ts.to_rfc3339()),
            None => write!(f, "-"),
        }
    }
}

/// Top-level error type for tickloom.
#[derive(Debug, thiserror::Error)]
pub enum TickloomError {
    #[error("data error for {instrument} at {timestamp}: {reason}")]
    Data {
        instrument: String,
        timestamp: At,
        reason: String,
    },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invariant violation for {instrument} at {timestamp}: {reason}")]
    InvariantViolation {
        instrument: String,
        timestamp: At,
        reason: String,
    },

    #[error("execution error for {instrument} at {timestamp}: {reason}")]
    Execution {
        instrument: String,
        timestamp: At,
        reason: String,
    },

    #[error("strategy error for {instrument} at {timestamp}: {reason}")]
    Strategy {
        instrument: String,
        timestamp: At,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TickloomError {
    pub fn data(
        instrument: impl Into<String>,
        timestamp: Option<DateTime<Utc>>,
        reason: impl Into<String>,
    ) -> Self {
        TickloomError::Data {
            instrument: instrument.into(),
            timestamp: At(timestamp),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        TickloomError::Configuration {
            reason: reason.into(),
        }
    }

    pub fn invariant(
        instrument: impl Into<String>,
        timestamp: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        TickloomError::InvariantViolation {
            instrument: instrument.into(),
            timestamp: At(Some(timestamp)),
            reason: reason.into(),
        }
    }

    pub fn execution(
        instrument: impl Into<String>,
        timestamp: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        TickloomError::Execution {
            instrument: instrument.into(),
            timestamp: At(Some(timestamp)),
            reason: reason.into(),
        }
    }

    pub fn strategy(
        instrument: impl Into<String>,
        timestamp: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        TickloomError::Strategy {
            instrument: instrument.into(),
            timestamp: At(Some(timestamp)),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TickloomError::Data { .. } => ErrorKind::Data,
            TickloomError::Configuration { .. }
            | TickloomError::ConfigParse { .. }
            | TickloomError::ConfigMissing { .. }
            | TickloomError::ConfigInvalid { .. } => ErrorKind::Configuration,
            TickloomError::InvariantViolation { .. } => ErrorKind::InvariantViolation,
            TickloomError::Execution { .. } => ErrorKind::Execution,
            TickloomError::Strategy { .. } => ErrorKind::Strategy,
            TickloomError::Io(_) => ErrorKind::Io,
        }
    }

    /// Instrument and timestamp of the event that raised this error, if any.
    pub fn context(&self) -> Option<(&str, Option<DateTime<Utc>>)> {
        match self {
            TickloomError::Data {
                instrument,
                timestamp,
                ..
            }
            | TickloomError::InvariantViolation {
                instrument,
                timestamp,
                ..
            }
            | TickloomError::Execution {
                instrument,
                timestamp,
                ..
            }
            | TickloomError::Strategy {
                instrument,
                timestamp,
                ..
            } => Some((instrument.as_str(), timestamp.0)),
            _ => None,
        }
    }
}

impl From<ErrorKind> for std::process::ExitCode {
    fn from(kind: ErrorKind) -> Self {
        let code: u8 = match kind {
            ErrorKind::Io => 1,
            ErrorKind::Configuration => 2,
            ErrorKind::Data => 3,
            ErrorKind::InvariantViolation => 4,
            ErrorKind::Execution => 5,
            ErrorKind::Strategy => 6,
        };
        std::process::ExitCode::from(code)
    }
}

impl From<&TickloomError> for std::process::ExitCode {
    fn from(err: &TickloomError) -> Self {
        err.kind().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn data_error_carries_context() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        let err = TickloomError::data("GBPUSD", Some(ts), "timestamp went backwards");
        assert_eq!(err.kind(), ErrorKind::Data);
        assert_eq!(err.context(), Some(("GBPUSD", Some(ts))));
        assert_eq!(
            err.to_string(),
            "data error for GBPUSD at 2024-01-02T10:00:00+00:00: timestamp went backwards"
        );
    }

    #[test]
    fn missing_timestamp_renders_dash() {
        let err = TickloomError::data("EURUSD", None, "empty file");
        assert_eq!(err.to_string(), "data error for EURUSD at -: empty file");
    }

    #[test]
    fn config_variants_share_kind() {
        let a = TickloomError::configuration("duplicate subscription");
        let b = TickloomError::ConfigMissing {
            section: "data".into(),
            key: "dir".into(),
        };
        assert_eq!(a.kind(), ErrorKind::Configuration);
        assert_eq!(b.kind(), ErrorKind::Configuration);
        assert!(a.context().is_none());
    }
}
