//! The state threaded through a single translation.
//!
//! [`TranslationContext`] maps each collection id to the timely
//! stream that materializes it. Handlers read their inputs from here
//! and bind their outputs back. A context is built for one
//! translation inside one timely worker and is never shared.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use timely::dataflow::Scope;
use timely::dataflow::Stream;

use crate::coders::CoderRegistry;
use crate::coders::WindowedValueCoder;
use crate::errors::Error;
use crate::errors::Result;
use crate::options::PipelineOptions;
use crate::pipeline::Pipeline;
use crate::values::WindowedValue;

/// Identity of a materialized stream.
///
/// Two bindings refer to the same stream exactly when their handles
/// are equal. Handles are never reused within a context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamHandle(usize);

/// A timely stream together with the coder of its elements.
pub struct CollectionStream<S: Scope> {
    pub handle: StreamHandle,
    pub stream: Stream<S, WindowedValue>,
    pub coder: WindowedValueCoder,
}

impl<S: Scope> Clone for CollectionStream<S> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            stream: self.stream.clone(),
            coder: self.coder.clone(),
        }
    }
}

impl<S: Scope> fmt::Debug for CollectionStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionStream")
            .field("handle", &self.handle)
            .field("coder", &self.coder)
            .finish_non_exhaustive()
    }
}

pub struct TranslationContext<S: Scope> {
    scope: S,
    options: PipelineOptions,
    coders: Arc<CoderRegistry>,
    streams: BTreeMap<String, CollectionStream<S>>,
    next_handle: usize,
}

impl<S> TranslationContext<S>
where
    S: Scope<Timestamp = u64>,
{
    pub fn new(scope: S, options: PipelineOptions, coders: Arc<CoderRegistry>) -> Self {
        Self {
            scope,
            options,
            coders,
            streams: BTreeMap::new(),
            next_handle: 0,
        }
    }

    pub fn scope(&self) -> &S {
        &self.scope
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn coders(&self) -> &CoderRegistry {
        &self.coders
    }

    /// Wrap a freshly built stream with a new handle.
    pub fn register(
        &mut self,
        stream: Stream<S, WindowedValue>,
        coder: WindowedValueCoder,
    ) -> CollectionStream<S> {
        let handle = StreamHandle(self.next_handle);
        self.next_handle += 1;
        CollectionStream {
            handle,
            stream,
            coder,
        }
    }

    /// Bind a collection to a stream.
    ///
    /// Binding the same stream again is a no-op. Binding a different
    /// stream to an already bound collection fails and keeps the
    /// original binding.
    pub fn add_stream(&mut self, collection_id: &str, stream: CollectionStream<S>) -> Result<()> {
        match self.streams.get(collection_id) {
            Some(existing) if existing.handle == stream.handle => Ok(()),
            Some(_existing) => Err(Error::ConflictingBinding(collection_id.to_owned())),
            None => {
                tracing::debug!(
                    "Bound collection {collection_id:?} to stream {:?}",
                    stream.handle
                );
                self.streams.insert(collection_id.to_owned(), stream);
                Ok(())
            }
        }
    }

    pub fn get_stream(&self, collection_id: &str) -> Result<&CollectionStream<S>> {
        self.streams
            .get(collection_id)
            .ok_or_else(|| Error::CollectionNotBound(collection_id.to_owned()))
    }

    pub fn is_bound(&self, collection_id: &str) -> bool {
        self.streams.contains_key(collection_id)
    }

    /// Every binding, in collection id order.
    pub fn streams(&self) -> impl Iterator<Item = (&str, &CollectionStream<S>)> {
        self.streams.iter().map(|(id, stream)| (id.as_str(), stream))
    }

    /// The element coder of a declared collection.
    pub fn collection_coder(
        &self,
        pipeline: &Pipeline,
        collection_id: &str,
    ) -> Result<WindowedValueCoder> {
        WindowedValueCoder::for_collection(pipeline, collection_id, &self.coders)
    }
}
