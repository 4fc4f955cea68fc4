use connectors::sql::error::DbError;
use std::time::Duration;

/// Indicates whether an error should be retried or treated as terminal for
/// the current attempt loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

pub fn classify_db_error(err: &DbError) -> RetryDisposition {
    if err.is_transient() {
        RetryDisposition::Retry
    } else {
        RetryDisposition::Stop
    }
}

/// Bounded retry with a fixed delay between attempts. The upsert preset
/// rides out short target-store maintenance windows instead of hammering a
/// struggling server.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_upsert()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn for_upsert() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(600),
        }
    }

    /// True when `attempt` (zero-based) is the last one allowed.
    pub fn is_final(&self, attempt: usize) -> bool {
        attempt + 1 >= self.max_attempts
    }

    pub async fn back_off(&self) {
        tokio::time::sleep(self.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_are_bounded() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        assert!(!policy.is_final(0));
        assert!(!policy.is_final(1));
        assert!(policy.is_final(2));
    }

    #[test]
    fn at_least_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn stale_and_duplicate_are_not_retryable() {
        assert_eq!(
            classify_db_error(&DbError::DuplicateKey("dup".into())),
            RetryDisposition::Stop
        );
        assert_eq!(
            classify_db_error(&DbError::StaleUpdate("stale".into())),
            RetryDisposition::Stop
        );
    }
}
