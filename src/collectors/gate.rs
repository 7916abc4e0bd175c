//! Sampling Gate
//!
//! Decides whether a kind is due for sampling and which time window to ask
//! for. Windows overlap previous ones on purpose so a late scrape loses no
//! samples.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Settle margin added to a historical kind's interval before it is sampled again.
pub const SAMPLE_JITTER: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// `None` when a historical kind is not due yet. Realtime kinds are always due.
pub fn plan_window(
    now: DateTime<Utc>,
    last_sample: Option<DateTime<Utc>>,
    sampling: Duration,
    realtime: bool,
    lookback_multiplier: u32,
) -> Option<SampleWindow> {
    let interval = to_delta(sampling);

    let latest = match last_sample {
        Some(last) => {
            let elapsed = now - last;
            let due_after = interval
                .checked_add(&to_delta(SAMPLE_JITTER))
                .unwrap_or(TimeDelta::MAX);
            if !realtime && elapsed < due_after {
                return None;
            }
            last
        }
        None => now.checked_sub_signed(interval).unwrap_or(now),
    };

    let lookback = i32::try_from(lookback_multiplier.saturating_sub(1)).unwrap_or(i32::MAX);
    let start = interval
        .checked_mul(lookback)
        .and_then(|span| latest.checked_sub_signed(span))
        .unwrap_or(latest);
    Some(SampleWindow { start, end: now })
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    const FIVE_MIN: Duration = Duration::from_secs(300);

    #[test]
    fn first_run_seeds_one_interval_back() {
        let window = plan_window(t0(), None, FIVE_MIN, false, 1).unwrap();
        assert_eq!(window.start, t0() - TimeDelta::seconds(300));
        assert_eq!(window.end, t0());
    }

    #[test]
    fn historical_kind_waits_for_interval() {
        let last = t0();
        let early = last + TimeDelta::seconds(299);
        assert!(plan_window(early, Some(last), FIVE_MIN, false, 3).is_none());

        let due = last + TimeDelta::seconds(306);
        assert!(plan_window(due, Some(last), FIVE_MIN, false, 3).is_some());
    }

    #[test]
    fn realtime_kind_is_never_skipped() {
        let last = t0();
        let now = last + TimeDelta::seconds(1);
        assert!(plan_window(now, Some(last), Duration::from_secs(20), true, 3).is_some());
    }

    #[test]
    fn lookback_overlaps_previous_windows() {
        let last = t0();
        let now = last + TimeDelta::seconds(400);
        let window = plan_window(now, Some(last), FIVE_MIN, false, 3).unwrap();
        assert_eq!(window.start, last - TimeDelta::seconds(600));
        assert_eq!(window.end, now);
    }
}
