//! Retry state machine for sync queue items.
//!
//! `pending → success`, or on failure `pending | error → error` with an
//! exponential backoff, until the retry budget is spent and the item becomes
//! `failed`. Failed items are never drained again unless reset explicitly.

use std::time::Duration;

use time::OffsetDateTime;

use crate::domain::types::QueueStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_base: Duration::from_secs(30),
            max_backoff: Duration::from_secs(3600),
        }
    }
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureTransition {
    pub status: QueueStatus,
    pub retry_count: i64,
    pub next_attempt_at: Option<OffsetDateTime>,
}

impl RetryPolicy {
    pub fn on_failure(&self, previous_retries: i64, now: OffsetDateTime) -> FailureTransition {
        let retry_count = previous_retries.max(0) + 1;

        if retry_count >= i64::from(self.max_retries) {
            return FailureTransition {
                status: QueueStatus::Failed,
                retry_count,
                next_attempt_at: None,
            };
        }

        FailureTransition {
            status: QueueStatus::Error,
            retry_count,
            next_attempt_at: Some(now + self.backoff_for(retry_count)),
        }
    }

    /// `base × 2^(retry_count - 1)`, capped at `max_backoff`.
    pub fn backoff_for(&self, retry_count: i64) -> Duration {
        let exponent = u32::try_from(retry_count.saturating_sub(1)).unwrap_or(u32::MAX);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn first_failure_moves_to_error_with_base_delay() {
        let policy = RetryPolicy::default();
        let now = datetime!(2025-01-01 00:00 UTC);

        let transition = policy.on_failure(0, now);
        assert_eq!(transition.status, QueueStatus::Error);
        assert_eq!(transition.retry_count, 1);
        assert_eq!(transition.next_attempt_at, Some(datetime!(2025-01-01 00:00:30 UTC)));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 50,
            backoff_base: Duration::from_secs(10),
            max_backoff: Duration::from_secs(60),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_secs(10));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(20));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(40));
        assert_eq!(policy.backoff_for(4), Duration::from_secs(60));
        assert_eq!(policy.backoff_for(40), Duration::from_secs(60));
    }

    #[test]
    fn exhausting_retries_fails_permanently() {
        let policy = RetryPolicy {
            max_retries: 3,
            ..RetryPolicy::default()
        };
        let now = datetime!(2025-01-01 00:00 UTC);

        assert_eq!(policy.on_failure(1, now).status, QueueStatus::Error);
        let last = policy.on_failure(2, now);
        assert_eq!(last.status, QueueStatus::Failed);
        assert_eq!(last.retry_count, 3);
        assert_eq!(last.next_attempt_at, None);
    }
}
