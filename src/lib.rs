//! Translates portable pipeline graphs into Timely dataflows.
//!
//! A [`Pipeline`] is a graph of transforms connected by collections.
//! [`translate()`] walks its primitive transforms in dependency order
//! and builds Timely operators for each one inside a
//! [`TranslationContext`], which maps every collection to the stream
//! that materializes it.
//!
//! The runners in [`run`] build and execute that dataflow on one or
//! more worker threads.
//!
//! Supported transforms are flatten, impulse, assign windows
//! (window into), group by key and reshuffle. Elements flow as
//! [`WindowedValue`]s and are grouped per key and window using the
//! collection's windowing strategy; Timely epochs double as the event
//! time watermark in milliseconds since the Unix epoch.

pub mod coders;
pub mod context;
pub mod errors;
pub mod metrics;
pub(crate) mod operators;
pub mod options;
pub mod pipeline;
pub mod run;
pub(crate) mod timely;
pub mod tracing;
pub mod translate;
pub(crate) mod translators;
pub mod values;
pub mod window;
pub(crate) mod worker;

#[cfg(test)]
mod testing;

pub use crate::context::CollectionStream;
pub use crate::context::StreamHandle;
pub use crate::context::TranslationContext;
pub use crate::errors::Error;
pub use crate::errors::Result;
pub use crate::options::PipelineOptions;
pub use crate::pipeline::Pipeline;
pub use crate::run::cluster_main;
pub use crate::run::run_main;
pub use crate::translate::translate;
pub use crate::translate::TransformKind;
pub use crate::values::Value;
pub use crate::values::WindowedValue;
