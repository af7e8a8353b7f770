//! Retry and failure classification policy.
//!
//! The policy is a pure function from (failure kind, attempts so far on the
//! engine just tried, ceiling) to a decision, so it is testable without any
//! network. The download manager drives a small loop around it.
//!
//! Policy table:
//!
//! | Failure kind      | attempts < ceiling         | attempts >= ceiling        |
//! |-------------------|----------------------------|----------------------------|
//! | NetworkError      | retry same (backoff)       | give up                    |
//! | RateLimited       | retry same (long backoff)  | switch engine, then give up|
//! | AuthRejected      | retry same (after refresh) | switch engine, then give up|
//! | FormatUnavailable | switch engine              | give up                    |
//! | Unknown           | retry same (backoff)       | give up                    |
//!
//! "then give up" is enforced by the caller: a job switches engines at most
//! once, so a second switch verdict degrades to give-up there. The token
//! refresh on AuthRejected also happens in the caller, before the retry.

use std::time::Duration;

use rand::Rng;

use crate::engine::{EngineFailureKind, EngineKind};

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again on the same engine after the given delay.
    RetrySameEngine { backoff: Duration },
    /// Move the job to the other engine.
    SwitchEngine,
    /// Stop; mark the job failed.
    GiveUp,
}

/// Tunables for the backoff schedule.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the second attempt.
    pub base: Duration,
    /// Hard cap on any single delay.
    pub max: Duration,
    /// Multiplier applied when the source rate-limited us.
    pub rate_limit_factor: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            max: Duration::from_secs(120),
            rate_limit_factor: 4,
        }
    }
}

/// Classify a failed attempt into the next action.
///
/// `attempts_on_engine` counts attempts made on `engine_just_tried` only;
/// switching engines resets it (a fallback engine gets its own budget).
pub fn classify(
    kind: EngineFailureKind,
    attempts_on_engine: u32,
    ceiling: u32,
    engine_just_tried: EngineKind,
    backoff: &BackoffConfig,
) -> RetryDecision {
    let _ = engine_just_tried; // policy is engine-symmetric today
    let exhausted = attempts_on_engine >= ceiling;

    match kind {
        EngineFailureKind::NetworkError | EngineFailureKind::Unknown => {
            if exhausted {
                RetryDecision::GiveUp
            } else {
                RetryDecision::RetrySameEngine {
                    backoff: backoff_delay(attempts_on_engine, backoff, false),
                }
            }
        }
        EngineFailureKind::RateLimited => {
            if exhausted {
                RetryDecision::SwitchEngine
            } else {
                RetryDecision::RetrySameEngine {
                    backoff: backoff_delay(attempts_on_engine, backoff, true),
                }
            }
        }
        EngineFailureKind::AuthRejected => {
            // The caller has already invalidated the token; a retry runs
            // against freshly verified material.
            if exhausted {
                RetryDecision::SwitchEngine
            } else {
                RetryDecision::RetrySameEngine {
                    backoff: backoff_delay(attempts_on_engine, backoff, false),
                }
            }
        }
        EngineFailureKind::FormatUnavailable => {
            // Retrying the same engine cannot make a format appear.
            if exhausted {
                RetryDecision::GiveUp
            } else {
                RetryDecision::SwitchEngine
            }
        }
    }
}

/// Exponential backoff with jitter: `base * 2^(attempt-1)`, +/-25% jitter,
/// capped at `max`. Rate-limited failures get the configured multiplier.
pub fn backoff_delay(attempt: u32, config: &BackoffConfig, rate_limited: bool) -> Duration {
    let attempt = attempt.max(1);
    let factor = if rate_limited {
        config.rate_limit_factor.max(1) as u64
    } else {
        1
    };

    let exp = 2u64.saturating_pow(attempt.saturating_sub(1).min(16));
    let base_ms = config.base.as_millis() as u64;
    let raw_ms = base_ms.saturating_mul(exp).saturating_mul(factor);
    let capped_ms = raw_ms.min(config.max.as_millis() as u64);

    // +/-25% jitter so concurrent retries do not stampede.
    let jitter_span = capped_ms / 4;
    let jittered = if jitter_span > 0 {
        let offset = rand::rng().random_range(0..=jitter_span * 2);
        capped_ms - jitter_span + offset
    } else {
        capped_ms
    };

    Duration::from_millis(jittered.min(config.max.as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> BackoffConfig {
        BackoffConfig::default()
    }

    #[test]
    fn test_network_error_retries_below_ceiling() {
        let decision = classify(
            EngineFailureKind::NetworkError,
            1,
            3,
            EngineKind::Primary,
            &cfg(),
        );
        assert!(matches!(decision, RetryDecision::RetrySameEngine { .. }));
    }

    #[test]
    fn test_network_error_gives_up_at_ceiling() {
        let decision = classify(
            EngineFailureKind::NetworkError,
            3,
            3,
            EngineKind::Primary,
            &cfg(),
        );
        assert_eq!(decision, RetryDecision::GiveUp);
    }

    #[test]
    fn test_rate_limited_switches_at_ceiling() {
        let below = classify(
            EngineFailureKind::RateLimited,
            2,
            3,
            EngineKind::Primary,
            &cfg(),
        );
        assert!(matches!(below, RetryDecision::RetrySameEngine { .. }));

        let at = classify(
            EngineFailureKind::RateLimited,
            3,
            3,
            EngineKind::Primary,
            &cfg(),
        );
        assert_eq!(at, RetryDecision::SwitchEngine);
    }

    #[test]
    fn test_auth_rejected_switches_at_ceiling() {
        let at = classify(
            EngineFailureKind::AuthRejected,
            3,
            3,
            EngineKind::Primary,
            &cfg(),
        );
        assert_eq!(at, RetryDecision::SwitchEngine);
    }

    #[test]
    fn test_format_unavailable_switches_immediately() {
        let decision = classify(
            EngineFailureKind::FormatUnavailable,
            1,
            3,
            EngineKind::Primary,
            &cfg(),
        );
        assert_eq!(decision, RetryDecision::SwitchEngine);

        let at_ceiling = classify(
            EngineFailureKind::FormatUnavailable,
            3,
            3,
            EngineKind::Secondary,
            &cfg(),
        );
        assert_eq!(at_ceiling, RetryDecision::GiveUp);
    }

    #[test]
    fn test_unknown_behaves_like_network() {
        let below = classify(EngineFailureKind::Unknown, 1, 3, EngineKind::Primary, &cfg());
        assert!(matches!(below, RetryDecision::RetrySameEngine { .. }));

        let at = classify(EngineFailureKind::Unknown, 3, 3, EngineKind::Primary, &cfg());
        assert_eq!(at, RetryDecision::GiveUp);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = BackoffConfig {
            base: Duration::from_millis(100),
            max: Duration::from_secs(5),
            rate_limit_factor: 4,
        };

        // Jitter is +/-25%, so compare against the widened envelope.
        let first = backoff_delay(1, &config, false);
        assert!(first >= Duration::from_millis(75) && first <= Duration::from_millis(125));

        let third = backoff_delay(3, &config, false);
        assert!(third >= Duration::from_millis(300) && third <= Duration::from_millis(500));

        let huge = backoff_delay(30, &config, false);
        assert!(huge <= Duration::from_secs(5));
    }

    #[test]
    fn test_rate_limited_backoff_is_longer() {
        let config = BackoffConfig {
            base: Duration::from_millis(100),
            max: Duration::from_secs(60),
            rate_limit_factor: 4,
        };
        // Max jittered plain delay (125ms) stays below min jittered
        // rate-limited delay (300ms).
        let plain = backoff_delay(1, &config, false);
        let limited = backoff_delay(1, &config, true);
        assert!(limited > plain);
    }
}
