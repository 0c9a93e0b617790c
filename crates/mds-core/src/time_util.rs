//! Wall-clock helpers.
//!
//! Every timestamp in the service is milliseconds since Unix epoch; these
//! helpers keep the conversions in one place.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    since_epoch().as_millis() as u64
}

/// Current time as whole **seconds** since Unix epoch.
#[inline]
pub fn now_secs() -> u64 {
    since_epoch().as_secs()
}

/// Align `ts_ms` down to the start of its `step_ms` bucket.
#[inline]
pub fn align_down(ts_ms: u64, step_ms: u64) -> u64 {
    if step_ms == 0 { ts_ms } else { ts_ms - ts_ms % step_ms }
}

fn since_epoch() -> Duration {
    // A clock before 1970 reads as the epoch itself.
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_after_2020() {
        assert!(now_ms() > 1_577_836_800_000);
        assert!(now_secs() > 1_577_836_800);
    }

    #[test]
    fn align_to_bucket() {
        assert_eq!(align_down(125_000, 60_000), 120_000);
        assert_eq!(align_down(120_000, 60_000), 120_000);
        assert_eq!(align_down(7, 0), 7);
    }
}
