//! The payload and envelope types that flow through translated
//! dataflows.
//!
//! Every element of every translated stream is a [`WindowedValue`]
//! wrapping a dynamically typed [`Value`]. User payloads that the
//! translator does not understand travel as opaque
//! [`Value::Bytes`], which is how they come out of a coder the
//! translator does not know (see [`crate::coders`]).

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::window::Window;
use crate::window::MIN_TIMESTAMP;

/// A payload flowing through a translated dataflow.
///
/// Totally ordered so that captured outputs can be sorted and
/// compared; ordering carries no meaning for the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Bytes(Vec<u8>),
    String(String),
    Kv(Box<Value>, Box<Value>),
    Iterable(Vec<Value>),
}

impl Value {
    pub fn kv(key: impl Into<Value>, value: impl Into<Value>) -> Self {
        Self::Kv(Box::new(key.into()), Box::new(value.into()))
    }

    /// Split a key/value pair, handing back the original value if it
    /// is not one.
    pub fn into_kv(self) -> Result<(Value, Value), Value> {
        match self {
            Self::Kv(key, value) => Ok((*key, *value)),
            other => Err(other),
        }
    }

    /// Short name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Bytes(_) => "bytes",
            Self::String(_) => "string",
            Self::Kv(_, _) => "kv",
            Self::Iterable(_) => "iterable",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Self::Iterable(values)
    }
}

/// When a pane fired relative to the watermark.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timing {
    Early,
    OnTime,
    Late,
    Unknown,
}

/// Which firing of a window produced an element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PaneInfo {
    pub is_first: bool,
    pub is_last: bool,
    pub timing: Timing,
    pub index: u64,
    pub on_time_index: u64,
}

impl PaneInfo {
    /// Elements that were never produced by a window firing.
    pub const NO_FIRING: PaneInfo = PaneInfo {
        is_first: true,
        is_last: true,
        timing: Timing::Unknown,
        index: 0,
        on_time_index: 0,
    };

    /// The single on-time firing of a window.
    pub const ON_TIME_AND_ONLY_FIRING: PaneInfo = PaneInfo {
        is_first: true,
        is_last: true,
        timing: Timing::OnTime,
        index: 0,
        on_time_index: 0,
    };
}

impl Default for PaneInfo {
    fn default() -> Self {
        Self::NO_FIRING
    }
}

/// The envelope carried by every element of a translated stream.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WindowedValue<T = Value> {
    pub value: T,
    pub timestamp: DateTime<Utc>,
    pub windows: Vec<Window>,
    pub pane: PaneInfo,
}

impl<T> WindowedValue<T> {
    pub fn new(value: T, timestamp: DateTime<Utc>, windows: Vec<Window>, pane: PaneInfo) -> Self {
        Self {
            value,
            timestamp,
            windows,
            pane,
        }
    }

    /// An element in a single window that was not produced by a
    /// firing.
    pub fn timestamped(value: T, timestamp: DateTime<Utc>, window: Window) -> Self {
        Self::new(value, timestamp, vec![window], PaneInfo::NO_FIRING)
    }

    /// An element at the minimum timestamp in the global window.
    pub fn in_global_window(value: T) -> Self {
        Self::timestamped(value, MIN_TIMESTAMP, Window::Global)
    }

    /// Replace the payload, keeping timestamp, windows and pane.
    pub fn map_value<U>(self, f: impl FnOnce(T) -> U) -> WindowedValue<U> {
        WindowedValue {
            value: f(self.value),
            timestamp: self.timestamp,
            windows: self.windows,
            pane: self.pane,
        }
    }

    /// Replace the set of windows, keeping everything else.
    pub fn with_windows(self, windows: Vec<Window>) -> Self {
        Self { windows, ..self }
    }
}

impl<T> WindowedValue<T>
where
    T: Clone,
{
    /// One element per assigned window, each carrying only that
    /// window.
    pub fn explode_windows(self) -> impl Iterator<Item = WindowedValue<T>> {
        let Self {
            value,
            timestamp,
            windows,
            pane,
        } = self;
        windows.into_iter().map(move |window| WindowedValue {
            value: value.clone(),
            timestamp,
            windows: vec![window],
            pane,
        })
    }
}
