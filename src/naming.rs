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

use jiff::Zoned;

/// Produces the file name a rotated hot file is archived under.
///
/// Arguments are the sink id, the cold file suffix, the configured rotation
/// interval, and the rotation time. The interval is only consulted to decide
/// whether the name needs sub-second disambiguation; see
/// [`default_cold_name`].
pub type ColdNameFormatter = Box<dyn Fn(&str, &str, Duration, &Zoned) -> String + Send + 'static>;

/// The default cold file name: `<id>-<YYYYMMDD-HHMMSS>.<suffix>`.
///
/// When the rotation interval is non-zero and shorter than one second,
/// several rotations can land in the same second, so a `-<microseconds>`
/// component is appended before the suffix to keep names unique.
pub fn default_cold_name(id: &str, suffix: &str, rotate_interval: Duration, now: &Zoned) -> String {
    let stamp = now.strftime("%Y%m%d-%H%M%S");
    if !rotate_interval.is_zero() && rotate_interval < Duration::from_secs(1) {
        let micros = now.timestamp().subsec_nanosecond() / 1_000;
        format!("{id}-{stamp}-{micros:06}.{suffix}")
    } else {
        format!("{id}-{stamp}.{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_default_cold_name() {
        let now = Zoned::from_str("2024-08-10T17:12:52.345678[UTC]").unwrap();

        assert_eq!(
            default_cold_name("app", "log", Duration::ZERO, &now),
            "app-20240810-171252.log"
        );
        assert_eq!(
            default_cold_name("app", "log", Duration::from_secs(3600), &now),
            "app-20240810-171252.log"
        );
    }

    #[test]
    fn test_sub_second_interval_appends_microseconds() {
        let now = Zoned::from_str("2024-08-10T17:12:52.345678[UTC]").unwrap();

        assert_eq!(
            default_cold_name("app", "log", Duration::from_millis(100), &now),
            "app-20240810-171252-345678.log"
        );
    }

    #[test]
    fn test_microseconds_are_zero_padded() {
        let now = Zoned::from_str("2024-08-10T17:12:52.000042[UTC]").unwrap();

        assert_eq!(
            default_cold_name("svc", "trc", Duration::from_millis(10), &now),
            "svc-20240810-171252-000042.trc"
        );
    }
}
