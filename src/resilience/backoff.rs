//! Exponential backoff with jitter.
//!
//! Used between readiness probes while a backend starts up.

use rand::Rng;
use std::time::Duration;

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped at
/// `max`, plus up to 10% jitter. Attempt 0 means "no delay".
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    let capped = base_ms.saturating_mul(factor).min(max_ms);
    Duration::from_millis(capped + jitter(capped))
}

fn jitter(delay_ms: u64) -> u64 {
    let range = delay_ms / 10;
    if range == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..range)
    }
}
