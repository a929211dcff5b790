//! Retry policy: how long a failed job waits before becoming claimable again.

use std::time::Duration;

/// Backoff between failed attempts.
///
/// The default is `Immediate`: a failed job with attempts left goes straight
/// back to Waiting. `Fixed` and `Exponential` park it in Delayed until the
/// backoff elapses.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RetryPolicy {
    #[default]
    Immediate,

    Fixed(Duration),

    /// `base * multiplier^(attempt - 1)`, attempt counting from 1.
    Exponential { base: Duration, multiplier: f64 },
}

impl RetryPolicy {
    /// Delay before the next execution, given the number of attempts already
    /// made (1-indexed). `None` means immediately re-eligible.
    pub fn next_delay(&self, attempts_made: u32) -> Option<Duration> {
        match self {
            RetryPolicy::Immediate => None,
            RetryPolicy::Fixed(delay) => Some(*delay),
            RetryPolicy::Exponential { base, multiplier } => {
                // Cap the exponent; past ~2^32 seconds the exact value stops
                // mattering.
                let exponent = attempts_made.saturating_sub(1).min(32) as i32;
                let secs = base.as_secs_f64() * multiplier.powi(exponent);
                Some(Duration::from_secs_f64(secs))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn immediate_is_the_default_and_yields_no_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy, RetryPolicy::Immediate);
        assert_eq!(policy.next_delay(1), None);
        assert_eq!(policy.next_delay(7), None);
    }

    #[test]
    fn fixed_delay_ignores_attempt_count() {
        let policy = RetryPolicy::Fixed(Duration::from_secs(3));
        assert_eq!(policy.next_delay(1), Some(Duration::from_secs(3)));
        assert_eq!(policy.next_delay(5), Some(Duration::from_secs(3)));
    }

    #[rstest]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(3, 8)]
    #[case(4, 16)]
    #[case(5, 32)]
    fn exponential_backoff_doubles(#[case] attempts: u32, #[case] expected_secs: u64) {
        let policy = RetryPolicy::Exponential {
            base: Duration::from_secs(2),
            multiplier: 2.0,
        };
        assert_eq!(
            policy.next_delay(attempts),
            Some(Duration::from_secs(expected_secs))
        );
    }

    #[test]
    fn exponent_is_capped() {
        let policy = RetryPolicy::Exponential {
            base: Duration::from_secs(1),
            multiplier: 2.0,
        };
        assert_eq!(policy.next_delay(100), policy.next_delay(33));
    }
}
