//! Cycle retry policy.
//!
//! Pure decision function: given the retry count before a failed
//! location check and the configured maximum, decide whether the
//! alarm cycle retriggers or the session is exhausted.

/// Outcome of a failed location check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retrigger the alarm cycle; carries the post-increment retry count.
    Retry(u32),
    /// Retries used up; the session resets to idle.
    Exhausted,
}

/// Decide whether a failed location check consumes a retry or exhausts.
///
/// `max_retries = 0` exhausts on the first failure; no retry is ever
/// attempted.
pub fn decide(retry_count: u32, max_retries: u32) -> RetryDecision {
    if retry_count + 1 < max_retries {
        RetryDecision::Retry(retry_count + 1)
    } else {
        RetryDecision::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_failures_retry_then_exhaust() {
        assert_eq!(decide(0, 3), RetryDecision::Retry(1));
        assert_eq!(decide(1, 3), RetryDecision::Retry(2));
        assert_eq!(decide(2, 3), RetryDecision::Exhausted);
    }

    #[test]
    fn zero_max_retries_exhausts_immediately() {
        assert_eq!(decide(0, 0), RetryDecision::Exhausted);
    }

    #[test]
    fn one_max_retry_exhausts_on_first_failure() {
        assert_eq!(decide(0, 1), RetryDecision::Exhausted);
    }

    proptest! {
        /// Exactly `max_retries` consecutive failures exhaust, with the
        /// count visiting 0, 1, ..., max_retries - 1 along the way.
        #[test]
        fn consecutive_failures_walk_the_counter(max_retries in 1u32..20) {
            let mut count = 0;
            for step in 0..max_retries {
                prop_assert_eq!(count, step);
                match decide(count, max_retries) {
                    RetryDecision::Retry(next) => {
                        prop_assert_eq!(next, count + 1);
                        count = next;
                    }
                    RetryDecision::Exhausted => {
                        prop_assert_eq!(step, max_retries - 1);
                        count = 0;
                    }
                }
            }
            prop_assert_eq!(count, 0);
        }
    }
}
