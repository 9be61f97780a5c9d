//! Low-level, generic extensions for Timely.
//!
//! Translated dataflows use `u64` timestamps that double as the event
//! time watermark: a frontier at `t` promises no more input before
//! `t` milliseconds since the Unix epoch.

use chrono::DateTime;
use chrono::Utc;
use timely::progress::frontier::MutableAntichain;

use crate::window::from_millis;
use crate::window::MIN_TIMESTAMP;

/// Extension trait for frontiers.
pub(crate) trait FrontierEx {
    /// Collapse a frontier into a single epoch value.
    ///
    /// We can do this because we're using a totally ordered epoch in
    /// our dataflows.
    fn simplify(&self) -> Option<u64>;

    /// Is this input EOF and will see no more values?
    fn is_eof(&self) -> bool {
        self.simplify().is_none()
    }

    /// The event time watermark this frontier stands for, or [`None`]
    /// at EOF.
    fn watermark(&self) -> Option<DateTime<Utc>> {
        self.simplify().map(watermark_at)
    }
}

impl FrontierEx for MutableAntichain<u64> {
    fn simplify(&self) -> Option<u64> {
        self.frontier().iter().min().copied()
    }
}

/// To allow collapsing frontiers of all inputs in an operator.
impl FrontierEx for [MutableAntichain<u64>] {
    fn simplify(&self) -> Option<u64> {
        self.iter().flat_map(FrontierEx::simplify).min()
    }
}

/// Interpret an epoch as an event time watermark.
///
/// Epoch 0 is where every timely input starts, before anything is
/// known about event time, so it maps to the beginning of time rather
/// than to the Unix epoch.
pub(crate) fn watermark_at(epoch: u64) -> DateTime<Utc> {
    if epoch == 0 {
        MIN_TIMESTAMP
    } else {
        from_millis(i64::try_from(epoch).unwrap_or(i64::MAX))
    }
}
