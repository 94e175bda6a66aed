//! Exponential backoff with jitter for re-delivery attempts, following the
//! default retry schedule: base 1 minute, factor 2, ±20% jitter, capped at
//! 8 attempts and ~24h total elapsed time.

use std::time::Duration;

use apfed_config::RetrySchedule;
use rand::Rng;

/// The outcome of asking whether a given attempt should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after this delay.
    Retry(Duration),
    /// Attempt budget or elapsed-time budget is exhausted; give up.
    Exhausted,
}

/// Decides whether delivery attempt `attempt` (1-indexed: the attempt that
/// just failed) should be retried, and if so after how long.
///
/// `elapsed_since_first_attempt` is compared against `schedule.max_elapsed`
/// so a burst of quick failures does not get a full 8-attempt budget if the
/// wall-clock cap is reached first.
pub fn decide(schedule: &RetrySchedule, attempt: u32, elapsed_since_first_attempt: Duration) -> RetryDecision {
    if attempt >= schedule.max_attempts {
        return RetryDecision::Exhausted;
    }
    if elapsed_since_first_attempt >= schedule.max_elapsed {
        return RetryDecision::Exhausted;
    }
    RetryDecision::Retry(compute_delay(schedule, attempt))
}

/// `base * factor^(attempt - 1)`, jittered by `±jitter` of the computed
/// value and never exceeding the remaining elapsed-time budget.
pub fn compute_delay(schedule: &RetrySchedule, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1) as i32;
    let base_millis = schedule.base_delay.as_millis() as f64;
    let raw = base_millis * schedule.factor.powi(exponent);

    let jitter_span = raw * schedule.jitter;
    let offset = if jitter_span > 0.0 {
        rand::thread_rng().gen_range(-jitter_span..=jitter_span)
    } else {
        0.0
    };
    let jittered = (raw + offset).max(0.0);

    let capped = jittered.min(schedule.max_elapsed.as_millis() as f64);
    Duration::from_millis(capped.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> RetrySchedule {
        RetrySchedule::default()
    }

    #[test]
    fn delay_grows_geometrically_before_jitter_bounds() {
        let schedule = RetrySchedule {
            jitter: 0.0,
            ..schedule()
        };
        assert_eq!(compute_delay(&schedule, 1), Duration::from_secs(60));
        assert_eq!(compute_delay(&schedule, 2), Duration::from_secs(120));
        assert_eq!(compute_delay(&schedule, 3), Duration::from_secs(240));
    }

    #[test]
    fn jitter_stays_within_twenty_percent_band() {
        let schedule = schedule();
        for _ in 0..200 {
            let delay = compute_delay(&schedule, 1).as_millis() as f64;
            assert!(delay >= 60_000.0 * 0.8 - 1.0);
            assert!(delay <= 60_000.0 * 1.2 + 1.0);
        }
    }

    #[test]
    fn decide_exhausts_after_max_attempts() {
        let schedule = schedule();
        assert!(matches!(
            decide(&schedule, schedule.max_attempts, Duration::ZERO),
            RetryDecision::Exhausted
        ));
        assert!(matches!(
            decide(&schedule, schedule.max_attempts - 1, Duration::ZERO),
            RetryDecision::Retry(_)
        ));
    }

    #[test]
    fn decide_exhausts_once_elapsed_budget_is_spent() {
        let schedule = schedule();
        let decision = decide(&schedule, 2, schedule.max_elapsed);
        assert!(matches!(decision, RetryDecision::Exhausted));
    }
}
