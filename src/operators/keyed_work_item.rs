use serde::Deserialize;
use serde::Serialize;

use crate::coders::Coder;
use crate::values::Value;
use crate::values::WindowedValue;

/// A group of values for one key, headed to the worker that owns the
/// key.
///
/// Keys are compared and routed by their encoded bytes, never by the
/// decoded [`Value`], so two keys are equal exactly when their coder
/// says so.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub(crate) struct KeyedWorkItem {
    pub(crate) key: Value,
    pub(crate) encoded_key: Vec<u8>,
    pub(crate) values: Vec<Value>,
}

impl KeyedWorkItem {
    /// Which worker this item should go to. The exchange wraps this
    /// modulo the worker count.
    pub(crate) fn route(&self) -> u64 {
        seahash::hash(&self.encoded_key)
    }
}

/// Split a windowed key/value pair into one work item per window.
///
/// Elements that are not key/value pairs, or whose key the coder
/// can't encode, mean the pipeline's declared coder doesn't match its
/// data. There is no way to recover from that inside a running
/// dataflow, so this panics.
pub(crate) fn to_keyed_work_items(
    element: WindowedValue,
    key_coder: &dyn Coder,
    transform_id: &str,
) -> Vec<WindowedValue<KeyedWorkItem>> {
    let element = element.map_value(|value| {
        let (key, value) = value.into_kv().unwrap_or_else(|other| {
            panic!(
                "group by key {transform_id:?} requires (key, value) elements; got a {} value: {other:?}",
                other.type_name()
            )
        });
        let encoded_key = key_coder.encode_to_vec(&key).unwrap_or_else(|err| {
            panic!("group by key {transform_id:?} can't encode key {key:?}: {err}")
        });
        KeyedWorkItem {
            key,
            encoded_key,
            values: vec![value],
        }
    });
    element.explode_windows().collect()
}
