use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{from_millis, parse_payload, positive_millis, DecodeError, IntervalWindow, Window};

/// Session windowing with a fixed inactivity gap.
///
/// Each item is initially assigned to its own proto-window
/// `[timestamp, timestamp + gap)`. Grouping merges every pair of
/// proto-windows that intersect into a single session, so a session
/// closes once no item has arrived within `gap` of its last one.
///
/// ```text
///           gap
///          |---|
/// I   I  I       I    I
/// [------------) [-------)
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sessions {
    gap: Duration,
}

#[derive(Serialize, Deserialize)]
struct SessionsPayload {
    gap_millis: i64,
}

impl Sessions {
    pub fn new(gap: Duration) -> Self {
        assert!(gap > Duration::zero(), "session gap must be positive");
        Self { gap }
    }

    pub fn gap(&self) -> Duration {
        self.gap
    }

    pub(crate) fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        let payload: SessionsPayload = parse_payload(payload)?;
        Ok(Self {
            gap: positive_millis("gap", payload.gap_millis)?,
        })
    }

    pub(crate) fn to_payload(&self) -> Vec<u8> {
        serde_json::to_vec(&SessionsPayload {
            gap_millis: self.gap.num_milliseconds(),
        })
        .unwrap_or_default()
    }

    pub(crate) fn assign(&self, time: &DateTime<Utc>) -> Window {
        let start = time.timestamp_millis();
        Window::Interval(IntervalWindow::new(
            *time,
            from_millis(start.saturating_add(self.gap.num_milliseconds())),
        ))
    }
}

/// Merge `window` with every window in `pending` it intersects.
///
/// Returns the merged session and the pending windows that were
/// absorbed into it. Absorbed windows may themselves be the result of
/// earlier merges; the returned span covers all of them.
pub(crate) fn merge_into<'a>(
    window: IntervalWindow,
    pending: impl IntoIterator<Item = &'a IntervalWindow>,
) -> (IntervalWindow, Vec<IntervalWindow>) {
    let mut merged = window;
    let mut absorbed = Vec::new();
    let mut pending: Vec<IntervalWindow> = pending.into_iter().copied().collect();
    pending.sort();

    // Absorbing a window can grow the session enough to reach a
    // window we already skipped, so repeat until nothing changes.
    loop {
        let before = absorbed.len();
        pending.retain(|candidate| {
            if merged.intersects(candidate) {
                merged = merged.span(candidate);
                absorbed.push(*candidate);
                false
            } else {
                true
            }
        });
        if absorbed.len() == before {
            break;
        }
    }

    absorbed.sort();
    (merged, absorbed)
}
