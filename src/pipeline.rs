//! In-memory description of a portable pipeline.
//!
//! A pipeline is a graph of transforms connected by collections. Every
//! component is referenced by id through the sorted maps in
//! [`Components`], so iterating any of them is deterministic on every
//! worker. The description is read-only; translation never mutates
//! it.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::errors::Error;
use crate::errors::Result;
use crate::window::TimestampCombiner;

/// Identifiers of transform kinds, coders and window functions.
pub mod urns {
    pub const FLATTEN: &str = "beam:transform:flatten:v1";
    pub const IMPULSE: &str = "beam:transform:impulse:v1";
    pub const ASSIGN_WINDOWS: &str = "beam:transform:window_into:v1";
    pub const GROUP_BY_KEY: &str = "beam:transform:group_by_key:v1";
    pub const RESHUFFLE: &str = "beam:transform:reshuffle:v1";
    pub const EXECUTABLE_STAGE: &str = "beam:runner:executable_stage:v1";

    pub const BYTES_CODER: &str = "beam:coder:bytes:v1";
    pub const STRING_UTF8_CODER: &str = "beam:coder:string_utf8:v1";
    pub const VARINT_CODER: &str = "beam:coder:varint:v1";
    pub const BOOL_CODER: &str = "beam:coder:bool:v1";
    pub const VOID_CODER: &str = "beam:coder:void:v1";
    pub const KV_CODER: &str = "beam:coder:kv:v1";
    pub const ITERABLE_CODER: &str = "beam:coder:iterable:v1";
    pub const LENGTH_PREFIX_CODER: &str = "beam:coder:length_prefix:v1";

    pub const GLOBAL_WINDOWS: &str = "beam:window_fn:global_windows:v1";
    pub const FIXED_WINDOWS: &str = "beam:window_fn:fixed_windows:v1";
    pub const SLIDING_WINDOWS: &str = "beam:window_fn:sliding_windows:v1";
    pub const SESSION_WINDOWS: &str = "beam:window_fn:session_windows:v1";
}

/// A kind tag plus an opaque, kind specific payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub urn: String,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl FunctionSpec {
    pub fn new(urn: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            urn: urn.into(),
            payload,
        }
    }
}

/// One node of the pipeline graph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    pub unique_name: String,
    pub spec: FunctionSpec,
    /// Local input name to collection id.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    /// Local output name to collection id.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    /// Non-empty for composite transforms.
    #[serde(default)]
    pub subtransforms: Vec<String>,
}

impl Transform {
    pub fn is_primitive(&self) -> bool {
        self.subtransforms.is_empty()
    }

    /// The collection id of the single input of this transform.
    pub fn only_input(&self, transform_id: &str) -> Result<&str> {
        only_value(&self.inputs).ok_or_else(|| {
            Error::malformed_transform(
                transform_id,
                format!("expected exactly one input, found {}", self.inputs.len()),
            )
        })
    }

    /// The collection id of the single output of this transform.
    pub fn only_output(&self, transform_id: &str) -> Result<&str> {
        only_value(&self.outputs).ok_or_else(|| {
            Error::malformed_transform(
                transform_id,
                format!("expected exactly one output, found {}", self.outputs.len()),
            )
        })
    }
}

fn only_value(map: &BTreeMap<String, String>) -> Option<&str> {
    let mut values = map.values();
    match (values.next(), values.next()) {
        (Some(value), None) => Some(value.as_str()),
        _ => None,
    }
}

/// A typed collection of elements flowing between transforms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub unique_name: String,
    pub coder_id: String,
    pub windowing_strategy_id: String,
    #[serde(default = "default_bounded")]
    pub is_bounded: bool,
}

fn default_bounded() -> bool {
    true
}

/// How elements of a collection are serialized.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoderSpec {
    pub urn: String,
    #[serde(default)]
    pub payload: Vec<u8>,
    /// Ids of component coders, e.g. key and value of a KV coder.
    #[serde(default)]
    pub components: Vec<String>,
}

impl CoderSpec {
    pub fn new(urn: impl Into<String>, components: Vec<String>) -> Self {
        Self {
            urn: urn.into(),
            payload: Vec::new(),
            components,
        }
    }
}

/// The undecoded windowing strategy of a collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowingStrategySpec {
    pub window_fn: FunctionSpec,
    #[serde(default)]
    pub allowed_lateness_millis: i64,
    #[serde(default)]
    pub timestamp_combiner: TimestampCombiner,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Components {
    #[serde(default)]
    pub transforms: BTreeMap<String, Transform>,
    #[serde(default)]
    pub collections: BTreeMap<String, Collection>,
    #[serde(default)]
    pub windowing_strategies: BTreeMap<String, WindowingStrategySpec>,
    #[serde(default)]
    pub coders: BTreeMap<String, CoderSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub components: Components,
    /// Top level transforms. When empty, every transform without
    /// subtransforms is treated as a root.
    #[serde(default)]
    pub root_transform_ids: Vec<String>,
}

impl Pipeline {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn transform(&self, id: &str) -> Result<&Transform> {
        lookup(&self.components.transforms, "transform", id)
    }

    pub fn collection(&self, id: &str) -> Result<&Collection> {
        lookup(&self.components.collections, "collection", id)
    }

    pub fn windowing_strategy(&self, id: &str) -> Result<&WindowingStrategySpec> {
        lookup(
            &self.components.windowing_strategies,
            "windowing strategy",
            id,
        )
    }

    pub fn coder(&self, id: &str) -> Result<&CoderSpec> {
        lookup(&self.components.coders, "coder", id)
    }

    /// Ids of every leaf transform reachable from the roots, sorted.
    pub fn primitive_transform_ids(&self) -> Result<Vec<String>> {
        if self.root_transform_ids.is_empty() {
            return Ok(self
                .components
                .transforms
                .iter()
                .filter(|(_id, transform)| transform.is_primitive())
                .map(|(id, _transform)| id.clone())
                .collect());
        }

        let mut primitives = BTreeSet::new();
        let mut seen = BTreeSet::new();
        let mut pending: Vec<&str> = self.root_transform_ids.iter().map(String::as_str).collect();
        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                continue;
            }
            let transform = self.transform(id)?;
            if transform.is_primitive() {
                primitives.insert(id.to_owned());
            } else {
                pending.extend(transform.subtransforms.iter().map(String::as_str));
            }
        }
        Ok(primitives.into_iter().collect())
    }

    /// Primitive transform ids ordered so every transform comes after
    /// the producers of all its inputs.
    ///
    /// Collections no primitive produces are external inputs. Among
    /// transforms that are ready at the same time the smallest id goes
    /// first, so the order is the same on every worker.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let primitives = self.primitive_transform_ids()?;

        let mut producers: BTreeMap<&str, &str> = BTreeMap::new();
        for id in &primitives {
            let transform = self.transform(id)?;
            for collection_id in transform.outputs.values() {
                self.collection(collection_id)?;
                if let Some(other) = producers.insert(collection_id.as_str(), id.as_str()) {
                    return Err(Error::malformed_transform(
                        id,
                        format!("collection {collection_id:?} is also produced by {other:?}"),
                    ));
                }
            }
        }

        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut consumers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for id in &primitives {
            in_degree.entry(id.as_str()).or_insert(0);
            for collection_id in self.transform(id)?.inputs.values() {
                self.collection(collection_id)?;
                if let Some(producer) = producers.get(collection_id.as_str()) {
                    *in_degree.entry(id.as_str()).or_insert(0) += 1;
                    consumers.entry(*producer).or_default().push(id.as_str());
                }
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_id, degree)| **degree == 0)
            .map(|(id, _degree)| *id)
            .collect();
        let mut order = Vec::with_capacity(primitives.len());
        while let Some(id) = ready.pop_first() {
            order.push(id.to_owned());
            for consumer in consumers.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(consumer) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*consumer);
                    }
                }
            }
        }

        if order.len() < primitives.len() {
            let stuck = in_degree
                .iter()
                .find(|(_id, degree)| **degree > 0)
                .map(|(id, _degree)| id.to_string())
                .unwrap_or_default();
            return Err(Error::CycleDetected(stuck));
        }
        Ok(order)
    }
}

fn lookup<'a, T>(map: &'a BTreeMap<String, T>, kind: &'static str, id: &str) -> Result<&'a T> {
    map.get(id).ok_or_else(|| Error::UnknownComponent {
        kind,
        id: id.to_owned(),
    })
}
