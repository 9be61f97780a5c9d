//! Bridge between collection coders and the values in streams.
//!
//! Every collection declares a coder by id. Translated streams carry
//! decoded [`Value`]s, but two places still need the byte encodings:
//! grouping routes and compares keys by their encoded bytes, and
//! reshuffle moves elements between workers encoded with the
//! [`WindowedValueCoder`] each stream handle carries.
//!
//! All encodings here are in the nested context: anything that is not
//! self delimiting is length prefixed, so encodings can be
//! concatenated.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;

use crate::errors::Error;
use crate::pipeline::urns;
use crate::pipeline::CoderSpec;
use crate::pipeline::Pipeline;
use crate::values::PaneInfo;
use crate::values::Timing;
use crate::values::Value;
use crate::values::WindowedValue;
use crate::window::IntervalWindow;
use crate::window::Window;
use crate::window::WindowFn;
use crate::window::WindowingStrategy;

#[derive(Debug, thiserror::Error)]
pub enum CoderError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("expected a {expected} value, found {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("varint is longer than 64 bits")]
    VarIntOverflow,
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("timestamp {0}ms is out of range")]
    TimestampOutOfRange(i64),
    #[error("{0}")]
    Invalid(String),
    #[error("{0} trailing bytes after decoding")]
    TrailingBytes(usize),
}

/// Serializes [`Value`]s of one shape.
pub trait Coder: fmt::Debug + Send + Sync {
    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), CoderError>;

    /// Decode one value from the front of `input`, advancing it.
    fn decode(&self, input: &mut &[u8]) -> Result<Value, CoderError>;

    fn encode_to_vec(&self, value: &Value) -> Result<Vec<u8>, CoderError> {
        let mut out = Vec::new();
        self.encode(value, &mut out)?;
        Ok(out)
    }

    /// Decode exactly one value from `bytes`.
    fn decode_all(&self, bytes: &[u8]) -> Result<Value, CoderError> {
        let mut input = bytes;
        let value = self.decode(&mut input)?;
        if input.is_empty() {
            Ok(value)
        } else {
            Err(CoderError::TrailingBytes(input.len()))
        }
    }
}

pub(crate) fn write_varint(mut n: u64, out: &mut Vec<u8>) {
    while n >= 0x80 {
        out.push((n as u8) | 0x80);
        n >>= 7;
    }
    out.push(n as u8);
}

pub(crate) fn read_varint(input: &mut &[u8]) -> Result<u64, CoderError> {
    let mut n = 0u64;
    let mut shift = 0;
    loop {
        let byte = read_byte(input)?;
        if shift == 63 && byte > 1 {
            return Err(CoderError::VarIntOverflow);
        }
        n |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(n);
        }
        shift += 7;
        if shift > 63 {
            return Err(CoderError::VarIntOverflow);
        }
    }
}

fn read_byte(input: &mut &[u8]) -> Result<u8, CoderError> {
    let (&byte, rest) = input.split_first().ok_or(CoderError::UnexpectedEof)?;
    *input = rest;
    Ok(byte)
}

fn read_bytes<'a>(input: &mut &'a [u8], len: usize) -> Result<&'a [u8], CoderError> {
    if input.len() < len {
        return Err(CoderError::UnexpectedEof);
    }
    let (bytes, rest) = input.split_at(len);
    *input = rest;
    Ok(bytes)
}

fn read_len(input: &mut &[u8]) -> Result<usize, CoderError> {
    let len = read_varint(input)?;
    usize::try_from(len).map_err(|_| CoderError::Invalid(format!("length {len} is too large")))
}

/// Milliseconds with the sign bit flipped, so encodings sort like the
/// timestamps they hold.
pub(crate) fn write_timestamp(timestamp: &DateTime<Utc>, out: &mut Vec<u8>) {
    let flipped = (timestamp.timestamp_millis() as u64) ^ (1 << 63);
    out.extend_from_slice(&flipped.to_be_bytes());
}

pub(crate) fn read_timestamp(input: &mut &[u8]) -> Result<DateTime<Utc>, CoderError> {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(read_bytes(input, 8)?);
    let millis = (u64::from_be_bytes(buf) ^ (1 << 63)) as i64;
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or(CoderError::TimestampOutOfRange(millis))
}

fn mismatch(expected: &'static str, actual: &Value) -> CoderError {
    CoderError::TypeMismatch {
        expected,
        actual: actual.type_name(),
    }
}

/// Length prefixed raw bytes. Also stands in for coders nobody here
/// understands.
#[derive(Debug)]
pub struct BytesCoder;

impl Coder for BytesCoder {
    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), CoderError> {
        match value {
            Value::Bytes(bytes) => {
                write_varint(bytes.len() as u64, out);
                out.extend_from_slice(bytes);
                Ok(())
            }
            other => Err(mismatch("bytes", other)),
        }
    }

    fn decode(&self, input: &mut &[u8]) -> Result<Value, CoderError> {
        let len = read_len(input)?;
        Ok(Value::Bytes(read_bytes(input, len)?.to_vec()))
    }
}

#[derive(Debug)]
pub struct StringUtf8Coder;

impl Coder for StringUtf8Coder {
    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), CoderError> {
        match value {
            Value::String(s) => {
                write_varint(s.len() as u64, out);
                out.extend_from_slice(s.as_bytes());
                Ok(())
            }
            other => Err(mismatch("string", other)),
        }
    }

    fn decode(&self, input: &mut &[u8]) -> Result<Value, CoderError> {
        let len = read_len(input)?;
        let bytes = read_bytes(input, len)?.to_vec();
        Ok(Value::String(String::from_utf8(bytes)?))
    }
}

/// Variable length integers. Negative numbers always take ten bytes.
#[derive(Debug)]
pub struct VarIntCoder;

impl Coder for VarIntCoder {
    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), CoderError> {
        match value {
            Value::Int(i) => {
                write_varint(*i as u64, out);
                Ok(())
            }
            other => Err(mismatch("int", other)),
        }
    }

    fn decode(&self, input: &mut &[u8]) -> Result<Value, CoderError> {
        Ok(Value::Int(read_varint(input)? as i64))
    }
}

#[derive(Debug)]
pub struct BoolCoder;

impl Coder for BoolCoder {
    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), CoderError> {
        match value {
            Value::Bool(b) => {
                out.push(u8::from(*b));
                Ok(())
            }
            other => Err(mismatch("bool", other)),
        }
    }

    fn decode(&self, input: &mut &[u8]) -> Result<Value, CoderError> {
        match read_byte(input)? {
            0 => Ok(Value::Bool(false)),
            1 => Ok(Value::Bool(true)),
            byte => Err(CoderError::Invalid(format!("invalid bool byte {byte:#x}"))),
        }
    }
}

#[derive(Debug)]
pub struct VoidCoder;

impl Coder for VoidCoder {
    fn encode(&self, value: &Value, _out: &mut Vec<u8>) -> Result<(), CoderError> {
        match value {
            Value::Null => Ok(()),
            other => Err(mismatch("null", other)),
        }
    }

    fn decode(&self, _input: &mut &[u8]) -> Result<Value, CoderError> {
        Ok(Value::Null)
    }
}

#[derive(Debug)]
pub struct KvCoder {
    key: Arc<dyn Coder>,
    value: Arc<dyn Coder>,
}

impl KvCoder {
    pub fn new(key: Arc<dyn Coder>, value: Arc<dyn Coder>) -> Self {
        Self { key, value }
    }

    pub fn key_coder(&self) -> &Arc<dyn Coder> {
        &self.key
    }

    pub fn value_coder(&self) -> &Arc<dyn Coder> {
        &self.value
    }
}

impl Coder for KvCoder {
    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), CoderError> {
        match value {
            Value::Kv(k, v) => {
                self.key.encode(k, out)?;
                self.value.encode(v, out)
            }
            other => Err(mismatch("kv", other)),
        }
    }

    fn decode(&self, input: &mut &[u8]) -> Result<Value, CoderError> {
        let key = self.key.decode(input)?;
        let value = self.value.decode(input)?;
        Ok(Value::Kv(Box::new(key), Box::new(value)))
    }
}

/// A 4 byte big endian element count, then the elements.
#[derive(Debug)]
pub struct IterableCoder {
    element: Arc<dyn Coder>,
}

impl IterableCoder {
    pub fn new(element: Arc<dyn Coder>) -> Self {
        Self { element }
    }
}

impl Coder for IterableCoder {
    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), CoderError> {
        match value {
            Value::Iterable(values) => {
                let count = i32::try_from(values.len()).map_err(|_| {
                    CoderError::Invalid(format!("too many elements: {}", values.len()))
                })?;
                out.extend_from_slice(&count.to_be_bytes());
                for value in values {
                    self.element.encode(value, out)?;
                }
                Ok(())
            }
            other => Err(mismatch("iterable", other)),
        }
    }

    fn decode(&self, input: &mut &[u8]) -> Result<Value, CoderError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(read_bytes(input, 4)?);
        let count = i32::from_be_bytes(buf);
        if count < 0 {
            return Err(CoderError::Invalid(format!(
                "negative element count {count}"
            )));
        }
        (0..count)
            .map(|_| self.element.decode(input))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Iterable)
    }
}

/// The byte length of the inner encoding, then the inner encoding.
#[derive(Debug)]
pub struct LengthPrefixCoder {
    inner: Arc<dyn Coder>,
}

impl LengthPrefixCoder {
    pub fn new(inner: Arc<dyn Coder>) -> Self {
        Self { inner }
    }
}

impl Coder for LengthPrefixCoder {
    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), CoderError> {
        let inner = self.inner.encode_to_vec(value)?;
        write_varint(inner.len() as u64, out);
        out.extend_from_slice(&inner);
        Ok(())
    }

    fn decode(&self, input: &mut &[u8]) -> Result<Value, CoderError> {
        let len = read_len(input)?;
        self.inner.decode_all(read_bytes(input, len)?)
    }
}

/// Builds a custom coder from its descriptor and its already
/// instantiated components.
pub type CoderFactory =
    Arc<dyn Fn(&CoderSpec, Vec<Arc<dyn Coder>>) -> Result<Arc<dyn Coder>, CoderError> + Send + Sync>;

/// Instantiates coders from their descriptors.
///
/// Standard coder URNs are built in. Anything else is looked up among
/// registered factories, and if none matches the encoding is treated
/// as opaque length prefixed bytes.
#[derive(Clone, Default)]
pub struct CoderRegistry {
    custom: HashMap<String, CoderFactory>,
}

impl fmt::Debug for CoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut urns: Vec<_> = self.custom.keys().collect();
        urns.sort();
        f.debug_struct("CoderRegistry")
            .field("custom", &urns)
            .finish()
    }
}

impl CoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, urn: impl Into<String>, factory: F)
    where
        F: Fn(&CoderSpec, Vec<Arc<dyn Coder>>) -> Result<Arc<dyn Coder>, CoderError>
            + Send
            + Sync
            + 'static,
    {
        self.custom.insert(urn.into(), Arc::new(factory));
    }

    /// Instantiate the coder declared with `coder_id`.
    pub fn instantiate(&self, pipeline: &Pipeline, coder_id: &str) -> crate::errors::Result<Arc<dyn Coder>> {
        self.instantiate_nested(pipeline, coder_id, &mut Vec::new())
    }

    fn instantiate_nested<'a>(
        &self,
        pipeline: &'a Pipeline,
        coder_id: &'a str,
        parents: &mut Vec<&'a str>,
    ) -> crate::errors::Result<Arc<dyn Coder>> {
        if parents.contains(&coder_id) {
            return Err(Error::MalformedCoder {
                coder_id: coder_id.to_owned(),
                reason: "coder contains itself".to_owned(),
            });
        }
        let spec = pipeline.coder(coder_id)?;

        parents.push(coder_id);
        let components = spec
            .components
            .iter()
            .map(|component| self.instantiate_nested(pipeline, component, parents))
            .collect::<crate::errors::Result<Vec<_>>>()?;
        parents.pop();

        let arity = |n: usize| -> crate::errors::Result<()> {
            if components.len() == n {
                Ok(())
            } else {
                Err(Error::MalformedCoder {
                    coder_id: coder_id.to_owned(),
                    reason: format!(
                        "{} takes {n} component coders, found {}",
                        spec.urn,
                        components.len()
                    ),
                })
            }
        };

        let coder: Arc<dyn Coder> = match spec.urn.as_str() {
            urns::BYTES_CODER => Arc::new(BytesCoder),
            urns::STRING_UTF8_CODER => Arc::new(StringUtf8Coder),
            urns::VARINT_CODER => Arc::new(VarIntCoder),
            urns::BOOL_CODER => Arc::new(BoolCoder),
            urns::VOID_CODER => Arc::new(VoidCoder),
            urns::KV_CODER => {
                arity(2)?;
                Arc::new(KvCoder::new(components[0].clone(), components[1].clone()))
            }
            urns::ITERABLE_CODER => {
                arity(1)?;
                Arc::new(IterableCoder::new(components[0].clone()))
            }
            urns::LENGTH_PREFIX_CODER => {
                arity(1)?;
                Arc::new(LengthPrefixCoder::new(components[0].clone()))
            }
            urn => match self.custom.get(urn) {
                Some(factory) => factory(spec, components)?,
                None => {
                    tracing::trace!("Treating unknown coder {coder_id:?} ({urn}) as opaque bytes");
                    Arc::new(BytesCoder)
                }
            },
        };
        Ok(coder)
    }
}

/// Serializes the windows an element belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowCoder {
    /// The global window encodes to nothing.
    Global,
    /// The end timestamp, then the span in milliseconds as a varint.
    Interval,
}

impl WindowCoder {
    pub fn for_window_fn(window_fn: &WindowFn) -> Self {
        match window_fn {
            WindowFn::Global => Self::Global,
            _ => Self::Interval,
        }
    }

    pub fn encode(&self, window: &Window, out: &mut Vec<u8>) -> Result<(), CoderError> {
        match (self, window) {
            (Self::Global, Window::Global) => Ok(()),
            (Self::Interval, Window::Interval(window)) => {
                write_timestamp(&window.end(), out);
                let span = (window.end() - window.start()).num_milliseconds();
                write_varint(span as u64, out);
                Ok(())
            }
            (Self::Global, Window::Interval(_)) => Err(CoderError::TypeMismatch {
                expected: "global window",
                actual: "interval window",
            }),
            (Self::Interval, Window::Global) => Err(CoderError::TypeMismatch {
                expected: "interval window",
                actual: "global window",
            }),
        }
    }

    pub fn decode(&self, input: &mut &[u8]) -> Result<Window, CoderError> {
        match self {
            Self::Global => Ok(Window::Global),
            Self::Interval => {
                let end = read_timestamp(input)?;
                let span = read_varint(input)? as i64;
                if span < 0 {
                    return Err(CoderError::Invalid(format!("negative window span {span}")));
                }
                let start_millis = end
                    .timestamp_millis()
                    .checked_sub(span)
                    .ok_or_else(|| CoderError::Invalid(format!("window span {span} is too large")))?;
                let start = DateTime::<Utc>::from_timestamp_millis(start_millis)
                    .ok_or(CoderError::TimestampOutOfRange(start_millis))?;
                Ok(Window::Interval(IntervalWindow::new(start, end)))
            }
        }
    }
}

fn encode_pane(pane: &PaneInfo, out: &mut Vec<u8>) {
    let timing = match pane.timing {
        Timing::Early => 0,
        Timing::OnTime => 1,
        Timing::Late => 2,
        Timing::Unknown => 3,
    };
    out.push(u8::from(pane.is_first) | u8::from(pane.is_last) << 1 | timing << 2);
    write_varint(pane.index, out);
    write_varint(pane.on_time_index, out);
}

fn decode_pane(input: &mut &[u8]) -> Result<PaneInfo, CoderError> {
    let tag = read_byte(input)?;
    if tag >> 4 != 0 {
        return Err(CoderError::Invalid(format!("invalid pane tag {tag:#x}")));
    }
    let timing = match (tag >> 2) & 0b11 {
        0 => Timing::Early,
        1 => Timing::OnTime,
        2 => Timing::Late,
        _ => Timing::Unknown,
    };
    Ok(PaneInfo {
        is_first: tag & 1 != 0,
        is_last: tag & 2 != 0,
        timing,
        index: read_varint(input)?,
        on_time_index: read_varint(input)?,
    })
}

/// The element serializer attached to every stream: a collection's
/// value coder combined with the window coder of its windowing
/// strategy.
#[derive(Clone, Debug)]
pub struct WindowedValueCoder {
    value: Arc<dyn Coder>,
    window: WindowCoder,
}

impl WindowedValueCoder {
    pub fn new(value: Arc<dyn Coder>, window: WindowCoder) -> Self {
        Self { value, window }
    }

    /// The element coder of a declared collection.
    pub fn for_collection(
        pipeline: &Pipeline,
        collection_id: &str,
        registry: &CoderRegistry,
    ) -> crate::errors::Result<Self> {
        let collection = pipeline.collection(collection_id)?;
        let value = registry.instantiate(pipeline, &collection.coder_id)?;
        let strategy = WindowingStrategy::for_collection(pipeline, collection_id)?;
        Ok(Self::new(value, WindowCoder::for_window_fn(&strategy.window_fn)))
    }

    pub fn encode(&self, element: &WindowedValue, out: &mut Vec<u8>) -> Result<(), CoderError> {
        write_timestamp(&element.timestamp, out);
        let count = i32::try_from(element.windows.len())
            .map_err(|_| CoderError::Invalid("too many windows".to_owned()))?;
        out.extend_from_slice(&count.to_be_bytes());
        for window in &element.windows {
            self.window.encode(window, out)?;
        }
        encode_pane(&element.pane, out);
        self.value.encode(&element.value, out)
    }

    pub fn encode_to_vec(&self, element: &WindowedValue) -> Result<Vec<u8>, CoderError> {
        let mut out = Vec::new();
        self.encode(element, &mut out)?;
        Ok(out)
    }

    pub fn decode(&self, input: &mut &[u8]) -> Result<WindowedValue, CoderError> {
        let timestamp = read_timestamp(input)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(read_bytes(input, 4)?);
        let count = i32::from_be_bytes(buf);
        if count < 0 {
            return Err(CoderError::Invalid(format!("negative window count {count}")));
        }
        let windows = (0..count)
            .map(|_| self.window.decode(input))
            .collect::<Result<Vec<_>, _>>()?;
        let pane = decode_pane(input)?;
        let value = self.value.decode(input)?;
        Ok(WindowedValue::new(value, timestamp, windows, pane))
    }
}
