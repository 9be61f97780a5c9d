use chrono::prelude::*;
use chrono::Duration;
use serde::Deserialize;
use serde::Serialize;

use super::{
    from_millis, offset_millis, parse_payload, positive_millis, DecodeError, IntervalWindow, Window,
};

/// Sliding windows of fixed duration.
///
/// If period == size, windows cover all time but do not
/// overlap. Each item will fall in exactly one window. The
/// [`super::FixedWindows`] function does this for you.
///
/// If period < size, windows overlap. Each item will fall in
/// multiple windows.
///
/// If period > size, there will be gaps between windows. Each item
/// can fall in up to one window, but might fall into none.
///
/// Window start times are inclusive, but end times are exclusive.
/// Windows are aligned so that `offset` (modulo `period`) starts a
/// window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlidingWindows {
    size: Duration,
    period: Duration,
    offset: Duration,
}

/// JSON payload of a sliding windows descriptor.
#[derive(Serialize, Deserialize)]
struct SlidingWindowsPayload {
    size_millis: i64,
    period_millis: i64,
    #[serde(default)]
    offset_millis: i64,
}

impl SlidingWindows {
    pub fn new(size: Duration, period: Duration, offset: Duration) -> Self {
        assert!(size > Duration::zero(), "sliding window size must be positive");
        assert!(
            period > Duration::zero(),
            "sliding window period must be positive"
        );
        Self {
            size,
            period,
            offset,
        }
    }

    pub(crate) fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        let payload: SlidingWindowsPayload = parse_payload(payload)?;
        let period = positive_millis("period", payload.period_millis)?;
        Ok(Self {
            size: positive_millis("size", payload.size_millis)?,
            period,
            offset: offset_millis("offset", payload.offset_millis, period)?,
        })
    }

    pub(crate) fn to_payload(&self) -> Vec<u8> {
        serde_json::to_vec(&SlidingWindowsPayload {
            size_millis: self.size.num_milliseconds(),
            period_millis: self.period.num_milliseconds(),
            offset_millis: self.offset.num_milliseconds(),
        })
        .unwrap_or_default()
    }

    /// All windows that contain a given time, in ascending start
    /// order.
    pub(crate) fn assign(&self, time: &DateTime<Utc>) -> Vec<Window> {
        // Widen so that huge sizes or offsets next to the ends of time
        // can't overflow; window bounds saturate back into range.
        let time = i128::from(time.timestamp_millis());
        let size = i128::from(self.size.num_milliseconds());
        let period = i128::from(self.period.num_milliseconds());
        let offset = i128::from(self.offset.num_milliseconds());

        // We always want to round towards -inf so negative times land
        // in the window that starts before them.
        let last_start = time - (time - offset).rem_euclid(period);

        let mut windows = Vec::new();
        let mut start = last_start;
        while start > time - size {
            windows.push(Window::Interval(IntervalWindow::new(
                from_millis(saturate(start)),
                from_millis(saturate(start + size)),
            )));
            start -= period;
        }
        windows.reverse();
        windows
    }
}

fn saturate(millis: i128) -> i64 {
    i64::try_from(millis).unwrap_or(if millis < 0 { i64::MIN } else { i64::MAX })
}

#[cfg(test)]
fn windows_at(windows: &SlidingWindows, time: DateTime<Utc>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    windows
        .assign(&time)
        .into_iter()
        .map(|window| match window {
            Window::Interval(window) => (window.start(), window.end()),
            Window::Global => panic!("sliding windows never assign the global window"),
        })
        .collect()
}

#[test]
fn test_assign_overlap_offset_divisible_by_size() {
    let windows = SlidingWindows::new(Duration::seconds(10), Duration::seconds(5), Duration::zero());

    //              9:00:13
    //              I
    // [---------)
    //      [---------)
    //           [---------)
    //                [---------)
    let item_time = Utc.with_ymd_and_hms(2023, 3, 16, 9, 0, 13).unwrap();
    assert_eq!(
        windows_at(&windows, item_time),
        vec![
            (
                Utc.with_ymd_and_hms(2023, 3, 16, 9, 0, 5).unwrap(),
                Utc.with_ymd_and_hms(2023, 3, 16, 9, 0, 15).unwrap()
            ),
            (
                Utc.with_ymd_and_hms(2023, 3, 16, 9, 0, 10).unwrap(),
                Utc.with_ymd_and_hms(2023, 3, 16, 9, 0, 20).unwrap()
            ),
        ],
    );
}

#[test]
fn test_assign_overlap_indivisible_by_size() {
    let windows = SlidingWindows::new(Duration::seconds(10), Duration::seconds(3), Duration::zero());

    //            0:00:11
    //            I
    // [---------)
    //    [---------)
    //       [---------)
    //          [---------)
    let item_time = Utc.timestamp_millis_opt(11_000).unwrap();
    assert_eq!(
        windows_at(&windows, item_time),
        vec![
            (
                Utc.timestamp_millis_opt(3_000).unwrap(),
                Utc.timestamp_millis_opt(13_000).unwrap()
            ),
            (
                Utc.timestamp_millis_opt(6_000).unwrap(),
                Utc.timestamp_millis_opt(16_000).unwrap()
            ),
            (
                Utc.timestamp_millis_opt(9_000).unwrap(),
                Utc.timestamp_millis_opt(19_000).unwrap()
            ),
        ],
    );
}

#[test]
fn test_assign_negative_time() {
    let windows = SlidingWindows::new(Duration::seconds(10), Duration::seconds(5), Duration::zero());

    //   -0:00:01
    //   I
    // [---------)
    //      [---------)
    let item_time = Utc.timestamp_millis_opt(-1_000).unwrap();
    assert_eq!(
        windows_at(&windows, item_time),
        vec![
            (
                Utc.timestamp_millis_opt(-10_000).unwrap(),
                Utc.timestamp_millis_opt(0).unwrap()
            ),
            (
                Utc.timestamp_millis_opt(-5_000).unwrap(),
                Utc.timestamp_millis_opt(5_000).unwrap()
            ),
        ],
    );
}

#[test]
fn test_assign_gap_between_windows() {
    let windows = SlidingWindows::new(Duration::seconds(2), Duration::seconds(5), Duration::zero());

    //      0:00:03
    //      I
    // [-)  [-)  [-)
    let in_gap = Utc.timestamp_millis_opt(3_000).unwrap();
    assert_eq!(windows_at(&windows, in_gap), vec![]);

    let in_window = Utc.timestamp_millis_opt(6_000).unwrap();
    assert_eq!(
        windows_at(&windows, in_window),
        vec![(
            Utc.timestamp_millis_opt(5_000).unwrap(),
            Utc.timestamp_millis_opt(7_000).unwrap()
        )],
    );
}

#[test]
fn test_assign_with_offset() {
    let windows = SlidingWindows::new(
        Duration::seconds(10),
        Duration::seconds(10),
        Duration::seconds(3),
    );

    let item_time = Utc.timestamp_millis_opt(12_000).unwrap();
    assert_eq!(
        windows_at(&windows, item_time),
        vec![(
            Utc.timestamp_millis_opt(3_000).unwrap(),
            Utc.timestamp_millis_opt(13_000).unwrap()
        )],
    );
}

#[test]
fn test_window_end_is_exclusive() {
    let windows = SlidingWindows::new(Duration::seconds(10), Duration::seconds(10), Duration::zero());

    let item_time = Utc.timestamp_millis_opt(10_000).unwrap();
    assert_eq!(
        windows_at(&windows, item_time),
        vec![(
            Utc.timestamp_millis_opt(10_000).unwrap(),
            Utc.timestamp_millis_opt(20_000).unwrap()
        )],
    );
}

#[test]
fn test_payload_defaults_offset() {
    let windows =
        SlidingWindows::from_payload(br#"{"size_millis": 10, "period_millis": 5}"#).unwrap();
    assert_eq!(
        windows,
        SlidingWindows::new(
            Duration::milliseconds(10),
            Duration::milliseconds(5),
            Duration::zero()
        )
    );
}

#[test]
fn test_extreme_sizes_saturate() {
    let windows = SlidingWindows::new(
        Duration::milliseconds(i64::MAX),
        Duration::milliseconds(i64::MAX),
        Duration::zero(),
    );

    assert_eq!(
        windows_at(&windows, Utc.timestamp_millis_opt(-5).unwrap()),
        vec![(super::MIN_TIMESTAMP, Utc.timestamp_millis_opt(0).unwrap())],
    );
}

#[test]
fn test_assign_at_the_ends_of_time() {
    let windows = SlidingWindows::new(
        Duration::milliseconds(10),
        Duration::milliseconds(5),
        Duration::milliseconds(3),
    );

    for time in [super::MIN_TIMESTAMP, super::MAX_TIMESTAMP] {
        let assigned = windows_at(&windows, time);
        assert_eq!(assigned.len(), 2, "{time:?}");
        assert!(
            assigned.iter().all(|(start, end)| *start <= time && time <= *end),
            "{assigned:?}"
        );
    }
}
