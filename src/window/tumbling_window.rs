use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::sliding_window::SlidingWindows;
use super::{offset_millis, parse_payload, positive_millis, DecodeError, Window};

/// Tumbling windows of fixed duration.
///
/// Windows are aligned so that `offset` (modulo `size`) starts a
/// window. Every timestamp falls in exactly one window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixedWindows {
    size: Duration,
    offset: Duration,
}

#[derive(Serialize, Deserialize)]
struct FixedWindowsPayload {
    size_millis: i64,
    #[serde(default)]
    offset_millis: i64,
}

impl FixedWindows {
    pub fn new(size: Duration, offset: Duration) -> Self {
        assert!(size > Duration::zero(), "fixed window size must be positive");
        Self { size, offset }
    }

    pub(crate) fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        let payload: FixedWindowsPayload = parse_payload(payload)?;
        let size = positive_millis("size", payload.size_millis)?;
        Ok(Self {
            size,
            offset: offset_millis("offset", payload.offset_millis, size)?,
        })
    }

    pub(crate) fn to_payload(&self) -> Vec<u8> {
        serde_json::to_vec(&FixedWindowsPayload {
            size_millis: self.size.num_milliseconds(),
            offset_millis: self.offset.num_milliseconds(),
        })
        .unwrap_or_default()
    }

    pub(crate) fn assign(&self, time: &DateTime<Utc>) -> Vec<Window> {
        SlidingWindows::new(self.size, self.size, self.offset).assign(time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::from_millis;
    use crate::window::IntervalWindow;

    #[test]
    fn test_every_time_has_one_window() {
        let windows = FixedWindows::new(Duration::milliseconds(10), Duration::zero());
        for (time, start) in [(0, 0), (9, 0), (10, 10), (-1, -10), (-10, -10), (25, 20)] {
            assert_eq!(
                windows.assign(&from_millis(time)),
                vec![Window::Interval(IntervalWindow::from_millis(
                    start,
                    start + 10
                ))],
                "time {time}"
            );
        }
    }

    #[test]
    fn test_payload_rejects_negative_size() {
        assert!(FixedWindows::from_payload(br#"{"size_millis": -5}"#).is_err());
    }
}
