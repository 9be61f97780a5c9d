//! Windows, window functions and windowing strategies.
//!
//! Architecture
//! ------------
//!
//! A collection's windowing strategy arrives as an opaque
//! descriptor: a [`FunctionSpec`] naming the window function by URN
//! with a JSON payload, plus allowed lateness and a timestamp
//! combiner. Decoding is a pure step: [`WindowFn::from_spec`] and
//! [`WindowingStrategy::from_spec`] turn descriptors into a tagged
//! [`WindowFn`], which the translators then hand to operators.
//!
//! Assigning windows to an element only depends on its timestamp, so
//! it lives here next to the window math. Merging (for sessions) and
//! firing live in [`crate::operators::window_reduce`] since they
//! need per-key state.

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::errors::Error;
use crate::pipeline::urns;
use crate::pipeline::FunctionSpec;
use crate::pipeline::Pipeline;
use crate::pipeline::WindowingStrategySpec;

pub(crate) mod session_window;
pub(crate) mod sliding_window;
pub(crate) mod tumbling_window;

pub use self::session_window::Sessions;
pub use self::sliding_window::SlidingWindows;
pub use self::tumbling_window::FixedWindows;

/// Smallest representable event time.
pub const MIN_TIMESTAMP: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

/// Largest representable event time.
pub const MAX_TIMESTAMP: DateTime<Utc> = DateTime::<Utc>::MAX_UTC;

/// Convert milliseconds since the Unix epoch, saturating at the
/// representable range.
pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or(if millis < 0 {
        MIN_TIMESTAMP
    } else {
        MAX_TIMESTAMP
    })
}

/// A half-open `[start, end)` span of event time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IntervalWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl IntervalWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start <= end, "window {start:?} starts after it ends {end:?}");
        Self { start, end }
    }

    pub fn from_millis(start: i64, end: i64) -> Self {
        Self::new(from_millis(start), from_millis(end))
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// The last instant that still belongs to this window.
    pub fn max_timestamp(&self) -> DateTime<Utc> {
        self.end
            .checked_sub_signed(Duration::milliseconds(1))
            .unwrap_or(self.end)
    }

    pub fn intersects(&self, other: &IntervalWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The smallest window containing both.
    pub fn span(&self, other: &IntervalWindow) -> IntervalWindow {
        IntervalWindow {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// A window an element is assigned to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Window {
    /// The single window covering all of time.
    Global,
    Interval(IntervalWindow),
}

impl Window {
    /// The last instant that still belongs to this window.
    ///
    /// The global window ends a day before the end of time so that
    /// anything added to it (like allowed lateness) stays
    /// representable. It is a whole millisecond so coders can carry
    /// it.
    pub fn max_timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Global => from_millis(
                MAX_TIMESTAMP.timestamp_millis() - Duration::days(1).num_milliseconds(),
            ),
            Self::Interval(window) => window.max_timestamp(),
        }
    }
}

/// An error decoding a windowing descriptor.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON descriptor: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

/// How window functions should assign windows to elements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WindowFn {
    Global,
    Fixed(FixedWindows),
    Sliding(SlidingWindows),
    Sessions(Sessions),
    /// A window function only the producing SDK understands.
    Custom(FunctionSpec),
}

impl WindowFn {
    /// Decode a window function descriptor.
    ///
    /// Unknown URNs decode to [`WindowFn::Custom`]; only a bad payload
    /// for a known URN is an error.
    pub fn from_spec(spec: &FunctionSpec) -> Result<Self, DecodeError> {
        match spec.urn.as_str() {
            urns::GLOBAL_WINDOWS => Ok(Self::Global),
            urns::FIXED_WINDOWS => FixedWindows::from_payload(&spec.payload).map(Self::Fixed),
            urns::SLIDING_WINDOWS => {
                SlidingWindows::from_payload(&spec.payload).map(Self::Sliding)
            }
            urns::SESSION_WINDOWS => Sessions::from_payload(&spec.payload).map(Self::Sessions),
            _ => Ok(Self::Custom(spec.clone())),
        }
    }

    /// Encode back into a descriptor.
    pub fn to_spec(&self) -> FunctionSpec {
        match self {
            Self::Global => FunctionSpec::new(urns::GLOBAL_WINDOWS, Vec::new()),
            Self::Fixed(fixed) => FunctionSpec::new(urns::FIXED_WINDOWS, fixed.to_payload()),
            Self::Sliding(sliding) => {
                FunctionSpec::new(urns::SLIDING_WINDOWS, sliding.to_payload())
            }
            Self::Sessions(sessions) => {
                FunctionSpec::new(urns::SESSION_WINDOWS, sessions.to_payload())
            }
            Self::Custom(spec) => spec.clone(),
        }
    }

    /// Reject window functions that the translated operators can't
    /// execute.
    pub fn check_supported(&self) -> crate::errors::Result<()> {
        match self {
            Self::Custom(spec) => Err(Error::UnsupportedWindowFn {
                urn: spec.urn.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Does grouping need to merge windows of this function?
    pub fn is_merging(&self) -> bool {
        matches!(self, Self::Sessions(_))
    }

    /// Windows for an element at `timestamp`, in ascending order.
    ///
    /// Custom window functions must have been rejected with
    /// [`WindowFn::check_supported`] before building any operator.
    pub fn assign(&self, timestamp: &DateTime<Utc>) -> Vec<Window> {
        match self {
            Self::Global => vec![Window::Global],
            Self::Fixed(fixed) => fixed.assign(timestamp),
            Self::Sliding(sliding) => sliding.assign(timestamp),
            Self::Sessions(sessions) => vec![sessions.assign(timestamp)],
            Self::Custom(spec) => panic!(
                "window function {:?} can not assign windows; it should have been rejected during translation",
                spec.urn
            ),
        }
    }
}

/// Which timestamp a grouped output gets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampCombiner {
    /// The maximum timestamp of the window.
    #[default]
    EndOfWindow,
    /// The earliest timestamp of the grouped elements.
    Earliest,
    /// The latest timestamp of the grouped elements.
    Latest,
}

/// A decoded windowing strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowingStrategy {
    pub window_fn: WindowFn,
    pub allowed_lateness: Duration,
    pub timestamp_combiner: TimestampCombiner,
}

impl WindowingStrategy {
    pub fn global() -> Self {
        Self {
            window_fn: WindowFn::Global,
            allowed_lateness: Duration::zero(),
            timestamp_combiner: TimestampCombiner::EndOfWindow,
        }
    }

    pub fn from_spec(spec: &WindowingStrategySpec) -> Result<Self, DecodeError> {
        if spec.allowed_lateness_millis < 0 {
            return Err(DecodeError::Invalid(format!(
                "allowed lateness must not be negative, got {}ms",
                spec.allowed_lateness_millis
            )));
        }
        Ok(Self {
            window_fn: WindowFn::from_spec(&spec.window_fn)?,
            allowed_lateness: Duration::milliseconds(spec.allowed_lateness_millis),
            timestamp_combiner: spec.timestamp_combiner,
        })
    }

    /// Decode the windowing strategy declared for a collection.
    pub fn for_collection(pipeline: &Pipeline, collection_id: &str) -> crate::errors::Result<Self> {
        let collection = pipeline.collection(collection_id)?;
        let spec = pipeline.windowing_strategy(&collection.windowing_strategy_id)?;
        Self::from_spec(spec)
            .map_err(|err| Error::malformed_payload("windowing strategy", &spec.window_fn.payload, err))
    }

    /// The watermark past which a window can see no more input and
    /// fires.
    pub fn expiry(&self, window: &Window) -> DateTime<Utc> {
        window
            .max_timestamp()
            .checked_add_signed(self.allowed_lateness)
            .unwrap_or(MAX_TIMESTAMP)
    }
}

/// The payload of a window-into (assign windows) transform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowIntoPayload {
    pub window_fn: FunctionSpec,
}

impl WindowIntoPayload {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn encode(&self) -> Vec<u8> {
        // Serializing plain structs of strings and bytes can't fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Parse a JSON payload for one of the known window functions.
pub(crate) fn parse_payload<'de, T>(payload: &'de [u8]) -> Result<T, DecodeError>
where
    T: Deserialize<'de>,
{
    Ok(serde_json::from_slice(payload)?)
}

/// The widest span of event time, from [`MIN_TIMESTAMP`] to
/// [`MAX_TIMESTAMP`].
pub(crate) fn max_span_millis() -> i64 {
    MAX_TIMESTAMP.timestamp_millis() - MIN_TIMESTAMP.timestamp_millis()
}

/// Durations in payloads must be positive and no longer than all of
/// representable time.
pub(crate) fn positive_millis(name: &str, millis: i64) -> Result<Duration, DecodeError> {
    if millis <= 0 {
        Err(DecodeError::Invalid(format!(
            "{name} must be positive, got {millis}ms"
        )))
    } else if millis > max_span_millis() {
        Err(DecodeError::Invalid(format!(
            "{name} of {millis}ms is longer than the representable range of time"
        )))
    } else {
        Ok(Duration::milliseconds(millis))
    }
}

/// Window offsets can be negative but have the same bound as
/// durations. Returns the offset normalized into `[0, period)`.
pub(crate) fn offset_millis(
    name: &str,
    millis: i64,
    period: Duration,
) -> Result<Duration, DecodeError> {
    if millis.checked_abs().map_or(true, |abs| abs > max_span_millis()) {
        return Err(DecodeError::Invalid(format!(
            "{name} of {millis}ms is outside the representable range of time"
        )));
    }
    Ok(Duration::milliseconds(
        millis.rem_euclid(period.num_milliseconds()),
    ))
}
