//! Connection manager: bounded-retry session acquisition.
//!
//! Transient failures are retried with a fixed backoff until the attempt
//! budget runs out. Rejected credentials end the acquisition immediately.

use std::time::Duration;

use serde::Deserialize;

use crate::session::{Connector, OpenError};

/// Retry budget for session acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Total connection attempts, at least 1.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between two attempts.
    #[serde(default = "default_backoff", rename = "backoff_ms", deserialize_with = "de_millis")]
    pub backoff: Duration,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_backoff() -> Duration {
    Duration::from_millis(2000)
}

fn de_millis<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: default_backoff(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    fn budget(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Why no session could be acquired.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Every attempt failed transiently.
    #[error(
        "Unable to connect to {address} after {attempts} attempts, ensure the database is \
         running and that there is a working network connection to it"
    )]
    Unreachable { address: String, attempts: u32 },

    /// Credentials were rejected; never retried.
    #[error("Unable to connect: wrong username/password")]
    Authentication,

    #[error("Invalid connection settings: {0}")]
    InvalidConfig(String),
}

/// Acquire a session from `connector`, retrying transient failures.
///
/// Makes at most `policy.max_attempts` attempts, sleeping `policy.backoff`
/// between two consecutive ones. No sleep follows the final attempt.
pub async fn connect<C: Connector>(
    connector: &C,
    policy: &RetryPolicy,
) -> Result<C::Session, ConnectError> {
    let address = connector.address();
    let budget = policy.budget();
    let mut failures = 0u32;

    loop {
        match connector.open_session().await {
            Ok(session) => {
                tracing::info!(%address, attempts = failures + 1, "Connected to Neo4j");
                return Ok(session);
            }
            Err(OpenError::Transient(reason)) => {
                failures += 1;
                tracing::warn!(
                    %address,
                    attempt = failures,
                    max_attempts = budget,
                    %reason,
                    "Unable to connect to {address}, ensure the database is running and that \
                     there is a working network connection to it"
                );
                if failures >= budget {
                    return Err(ConnectError::Unreachable {
                        address,
                        attempts: failures,
                    });
                }
                tokio::time::sleep(policy.backoff).await;
            }
            Err(OpenError::Authentication(reason)) => {
                tracing::error!(%address, %reason, "Unable to connect to {address}, wrong username/password");
                return Err(ConnectError::Authentication);
            }
            Err(OpenError::InvalidConfig(reason)) => {
                tracing::error!(%address, %reason, "Invalid Neo4j connection settings");
                return Err(ConnectError::InvalidConfig(reason));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConnector, MemoryStore};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(10, Duration::from_millis(1))
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.backoff, Duration::from_millis(2000));
    }

    #[test]
    fn test_policy_from_json_millis() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"max_attempts": 3, "backoff_ms": 50}"#).unwrap();
        assert_eq!(policy, RetryPolicy::new(3, Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_never_reachable_exhausts_budget() {
        let connector = MemoryConnector::new(MemoryStore::new()).unreachable();
        let err = connect(&connector, &fast_policy()).await.err().unwrap();

        match err {
            ConnectError::Unreachable { address, attempts } => {
                assert_eq!(address, "memory");
                assert_eq!(attempts, 10);
            }
            other => panic!("expected Unreachable, got {other:?}"),
        }
        assert_eq!(connector.attempts(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_separates_attempts() {
        let connector = MemoryConnector::new(MemoryStore::new()).unreachable();
        let policy = RetryPolicy::default();

        let start = tokio::time::Instant::now();
        let result = connect(&connector, &policy).await;
        let elapsed = start.elapsed();

        assert!(result.is_err());
        assert_eq!(connector.attempts(), 10);
        // Nine pauses between ten attempts.
        assert_eq!(elapsed, Duration::from_millis(9 * 2000));
    }

    #[tokio::test]
    async fn test_authentication_failure_is_not_retried() {
        let store = MemoryStore::new().require_login("neo4j", "secret");
        let connector = MemoryConnector::new(store).login("neo4j", "wrong");
        let err = connect(&connector, &fast_policy()).await.err().unwrap();

        assert!(matches!(err, ConnectError::Authentication));
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_authentication_after_transient_failures_stops_immediately() {
        let connector = MemoryConnector::new(MemoryStore::new()).with_script([
            Some(OpenError::Transient("starting".to_string())),
            Some(OpenError::Authentication("rejected".to_string())),
        ]);
        let err = connect(&connector, &fast_policy()).await.err().unwrap();

        assert!(matches!(err, ConnectError::Authentication));
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_success_on_last_attempt() {
        let script = (0..9)
            .map(|_| Some(OpenError::Transient("not ready".to_string())))
            .chain(std::iter::once(None));
        let connector = MemoryConnector::new(MemoryStore::new()).with_script(script);

        let session = connect(&connector, &fast_policy()).await;
        assert!(session.is_ok());
        assert_eq!(connector.attempts(), 10);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let connector = MemoryConnector::new(MemoryStore::new()).unreachable();
        let policy = RetryPolicy::new(0, Duration::from_millis(1));
        let err = connect(&connector, &policy).await.err().unwrap();

        assert!(matches!(err, ConnectError::Unreachable { attempts: 1, .. }));
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_is_fatal() {
        let connector = MemoryConnector::new(MemoryStore::new())
            .with_script([Some(OpenError::InvalidConfig("bad uri".to_string()))]);
        let err = connect(&connector, &fast_policy()).await.err().unwrap();

        assert!(matches!(err, ConnectError::InvalidConfig(_)));
        assert_eq!(connector.attempts(), 1);
    }
}
