use std::time::Duration;
use thiserror::Error;

/// How much offending text a `Parse` error keeps for diagnostics.
const SAMPLE_LIMIT: usize = 400;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// A CLI subprocess exited non-zero or could not be launched.
    #[error("command `{command}` failed with status {status}: {stderr}")]
    Client {
        command: String,
        status: i32,
        stderr: String,
    },

    /// Output from a CLI or HTTP call did not match any recognized shape.
    #[error("could not parse {what}: {sample:?}")]
    Parse { what: String, sample: String },

    /// The registry HTTP call failed at the connection level. A missing
    /// key is not a transport error.
    #[error("registry transport error: {message}")]
    Transport { message: String },

    /// A bounded-retry predicate never reached its condition. Carries the
    /// last observed state so the test failure is actionable on its own.
    #[error("timed out after {elapsed:?} waiting for {what}; last seen: {last_seen}")]
    WaitTimeout {
        what: String,
        elapsed: Duration,
        last_seen: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub fn parse(what: &str, sample: &str) -> Self {
        let sample = if sample.len() > SAMPLE_LIMIT {
            let mut end = SAMPLE_LIMIT;
            while !sample.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}…", &sample[..end])
        } else {
            sample.to_string()
        };
        HarnessError::Parse {
            what: what.to_string(),
            sample,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, HarnessError::WaitTimeout { .. })
    }
}

impl From<reqwest::Error> for HarnessError {
    fn from(err: reqwest::Error) -> Self {
        HarnessError::Transport {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_truncates_long_samples() {
        let sample = "x".repeat(SAMPLE_LIMIT * 2);
        let err = HarnessError::parse("listing", &sample);
        match err {
            HarnessError::Parse { sample, .. } => {
                assert!(sample.len() < SAMPLE_LIMIT + 8);
                assert!(sample.ends_with('…'));
            }
            _ => panic!("expected Parse variant"),
        }
    }

    #[test]
    fn test_timeout_message_carries_snapshot() {
        let err = HarnessError::WaitTimeout {
            what: "containers up".to_string(),
            elapsed: Duration::from_secs(30),
            last_seen: "app_nginx_1=Restarting".to_string(),
        };
        assert!(err.is_timeout());
        let message = err.to_string();
        assert!(message.contains("containers up"));
        assert!(message.contains("app_nginx_1=Restarting"));
    }
}
