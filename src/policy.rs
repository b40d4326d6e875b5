// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use jiff::SignedDuration;
use jiff::Timestamp;
use jiff::Zoned;

use crate::config::Config;

/// Decides when the hot file must be rotated.
///
/// Three triggers, checked in order: size threshold, fixed interval,
/// midnight boundary. The schedules are re-armed by [`rearm`](Self::rearm)
/// whenever a new hot file starts, so at most one rotation results from any
/// single evaluation.
#[derive(Debug)]
pub(crate) struct RotationPolicy {
    max_hot_size: u64,
    rotate_interval: Duration,
    at_midnight: bool,
    next_interval_at: Option<Timestamp>,
    next_midnight_at: Option<Timestamp>,
}

impl RotationPolicy {
    pub(crate) fn new(config: &Config, now: &Zoned) -> Self {
        let mut policy = Self {
            max_hot_size: config.max_hot_size,
            rotate_interval: config.rotate_interval,
            at_midnight: config.rotate_at_midnight,
            next_interval_at: None,
            next_midnight_at: None,
        };
        policy.rearm(now);
        policy
    }

    /// Re-arm both time schedules relative to `now`. Called when a hot file
    /// is opened and after every rotation, including empty no-op ones.
    pub(crate) fn rearm(&mut self, now: &Zoned) {
        self.next_interval_at = if self.rotate_interval.is_zero() {
            None
        } else {
            Some(add_duration(now.timestamp(), self.rotate_interval))
        };
        self.next_midnight_at = if self.at_midnight {
            next_midnight(now).map(|boundary| boundary.timestamp())
        } else {
            None
        };
    }

    pub(crate) fn should_rotate(&self, now: &Zoned, hot_len: u64) -> bool {
        if self.max_hot_size > 0 && hot_len > self.max_hot_size {
            return true;
        }
        let ts = now.timestamp();
        if self.next_interval_at.is_some_and(|due| ts >= due) {
            return true;
        }
        self.next_midnight_at.is_some_and(|due| ts >= due)
    }

    /// The earliest armed time trigger, if any. Size is not a time trigger.
    pub(crate) fn next_deadline(&self) -> Option<Timestamp> {
        match (self.next_interval_at, self.next_midnight_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// The next local midnight strictly after `now`.
fn next_midnight(now: &Zoned) -> Option<Zoned> {
    let tomorrow = now.date().tomorrow().ok()?;
    tomorrow.to_zoned(now.time_zone().clone()).ok()
}

pub(crate) fn add_duration(ts: Timestamp, dur: Duration) -> Timestamp {
    let nanos = dur.as_nanos().min(i64::MAX as u128) as i64;
    ts.checked_add(SignedDuration::from_nanos(nanos))
        .unwrap_or(Timestamp::MAX)
}

/// Wall-clock time from `now` until `deadline`, zero if already due.
pub(crate) fn duration_until(now: Timestamp, deadline: Timestamp) -> Duration {
    let nanos = deadline.as_nanosecond().saturating_sub(now.as_nanosecond());
    if nanos <= 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos(nanos.min(u64::MAX as i128) as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use jiff::Span;

    use super::*;

    fn config(max_hot_size: u64, rotate_interval: Duration, at_midnight: bool) -> Config {
        Config {
            max_hot_size,
            rotate_interval,
            rotate_at_midnight: at_midnight,
            ..Config::default()
        }
    }

    #[test]
    fn test_size_threshold_is_strict() {
        let now = Zoned::from_str("2024-08-10T17:12:52[UTC]").unwrap();
        let policy = RotationPolicy::new(&config(1000, Duration::ZERO, false), &now);

        assert!(!policy.should_rotate(&now, 0));
        assert!(!policy.should_rotate(&now, 1000));
        assert!(policy.should_rotate(&now, 1001));
    }

    #[test]
    fn test_disabled_triggers_never_fire() {
        let now = Zoned::from_str("2024-08-10T17:12:52[UTC]").unwrap();
        let policy = RotationPolicy::new(&config(0, Duration::ZERO, false), &now);

        assert!(!policy.should_rotate(&now, u64::MAX));
        assert_eq!(policy.next_deadline(), None);
    }

    #[test]
    fn test_interval_elapses_and_rearms() {
        let start = Zoned::from_str("2024-08-10T17:00:00[UTC]").unwrap();
        let mut policy = RotationPolicy::new(&config(0, Duration::from_secs(60), false), &start);

        let before = &start + Span::new().seconds(59);
        assert!(!policy.should_rotate(&before, 1));

        let due = &start + Span::new().seconds(60);
        assert!(policy.should_rotate(&due, 1));

        policy.rearm(&due);
        assert!(!policy.should_rotate(&due, 1));
        let due_again = &due + Span::new().seconds(60);
        assert!(policy.should_rotate(&due_again, 1));
    }

    #[test]
    fn test_midnight_boundary() {
        let evening = Zoned::from_str("2024-08-10T23:59:59[UTC]").unwrap();
        let mut policy = RotationPolicy::new(&config(0, Duration::ZERO, true), &evening);

        assert!(!policy.should_rotate(&evening, 1));

        let past_midnight = Zoned::from_str("2024-08-11T00:00:01[UTC]").unwrap();
        assert!(policy.should_rotate(&past_midnight, 1));

        policy.rearm(&past_midnight);
        assert!(!policy.should_rotate(&past_midnight, 1));
        assert_eq!(
            policy.next_deadline(),
            Some(Zoned::from_str("2024-08-12T00:00:00[UTC]").unwrap().timestamp())
        );
    }

    #[test]
    fn test_next_deadline_picks_earliest() {
        let now = Zoned::from_str("2024-08-10T12:00:00[UTC]").unwrap();
        let policy = RotationPolicy::new(&config(0, Duration::from_secs(3600), true), &now);

        // 13:00 interval beats the 00:00 midnight boundary
        assert_eq!(
            policy.next_deadline(),
            Some(Zoned::from_str("2024-08-10T13:00:00[UTC]").unwrap().timestamp())
        );
    }

    #[test]
    fn test_duration_until_clamps_past_deadlines() {
        let now = Zoned::from_str("2024-08-10T12:00:00[UTC]").unwrap().timestamp();
        let later = add_duration(now, Duration::from_secs(5));

        assert_eq!(duration_until(now, later), Duration::from_secs(5));
        assert_eq!(duration_until(later, now), Duration::ZERO);
    }
}
