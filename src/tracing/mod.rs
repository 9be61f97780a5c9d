//! Internal code for logging.
//!
//! Logs go to stdout through a compact formatter, filtered to events
//! from this crate at the level given in
//! [`crate::options::PipelineOptions::log_level`] (`ERROR` unless
//! configured otherwise).

use tracing::Subscriber;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

use crate::errors::Result;
use crate::options::PipelineOptions;

/// Install the global logging subscriber for a pipeline run.
///
/// Fails only if the options name an unknown log level. If a global
/// subscriber is already installed this keeps it and warns.
pub fn setup(options: &PipelineOptions) -> Result<()> {
    let log_level = options.level_filter()?;

    let logs = tracing_subscriber::fmt::Layer::default()
        .compact()
        // Show source file
        .with_file(true)
        // Display source code line numbers
        .with_line_number(true)
        // Display the thread ID an event was recorded on
        .with_thread_ids(true)
        .with_filter(Targets::new().with_target("flowport", log_level));

    set_global_subscriber(Registry::default().with(logs));
    Ok(())
}

// Try to set a global default subscriber, logging the error without
// failing if it was already set.
fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    // This can fail if logging was already initialized, which happens
    // in tests and if a pipeline is run more than once in the same
    // process.
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        tracing::warn!("{err}");
    }
}
