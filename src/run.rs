//! Entry points for executing pipelines.
//!
//! [`crate::worker::worker_main`] is the root of all the action on
//! each worker; these functions only decide how many workers there
//! are and turn their failures into [`Error`]s.
//!
//! Timely doesn't offer a way to cleanly stop workers with an
//! `Err`, so anything that goes wrong while the dataflow runs (like
//! an element that doesn't match its collection's coder) panics the
//! worker. Those panics are caught here and reported as
//! [`Error::Worker`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::coders::CoderRegistry;
use crate::errors::prepend_tname;
use crate::errors::Error;
use crate::errors::Result;
use crate::options::PipelineOptions;
use crate::pipeline::Pipeline;
use crate::worker::worker_main;

/// Execute a pipeline in the current thread.
///
/// Blocks until execution is complete.
pub fn run_main(pipeline: &Pipeline, options: &PipelineOptions) -> Result<()> {
    run_main_with(pipeline, options, CoderRegistry::new())
}

/// Like [`run_main`], with custom coders.
pub fn run_main_with(
    pipeline: &Pipeline,
    options: &PipelineOptions,
    coders: CoderRegistry,
) -> Result<()> {
    options.validate()?;
    crate::tracing::setup(options)?;
    tracing::info!("Running single worker on single process");

    let pipeline = pipeline.clone();
    let options = options.clone();
    let coders = Arc::new(coders);
    let res = std::panic::catch_unwind(AssertUnwindSafe(move || {
        timely::execute::execute_directly::<Result<()>, _>(move |worker| {
            worker_main(worker, || false, &pipeline, &options, coders)
        })
    }));

    res.map_err(|panic_err| Error::Worker(panic_message(&*panic_err)))?
}

/// Execute a pipeline on `options.workers` threads of the current
/// process.
///
/// Blocks until execution is complete. If any worker fails, the
/// others are told to shut down and the first error is returned.
pub fn cluster_main(pipeline: &Pipeline, options: &PipelineOptions) -> Result<()> {
    cluster_main_with(pipeline, options, CoderRegistry::new())
}

/// Like [`cluster_main`], with custom coders.
pub fn cluster_main_with(
    pipeline: &Pipeline,
    options: &PipelineOptions,
    coders: CoderRegistry,
) -> Result<()> {
    options.validate()?;
    crate::tracing::setup(options)?;
    tracing::info!("Running {} workers on single process", options.workers);

    let should_shutdown = Arc::new(AtomicBool::new(false));
    let should_shutdown_w = should_shutdown.clone();
    let should_shutdown_p = should_shutdown;

    // Custom hook to tell the other workers to shut down and to print
    // which worker thread panicked.
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        should_shutdown_p.store(true, Ordering::Relaxed);
        let msg = prepend_tname(info.to_string());
        // Acquire stderr lock and write the string as bytes, so we
        // avoid interleaving outputs from different threads.
        let mut stderr = std::io::stderr().lock();
        std::io::Write::write_all(&mut stderr, msg.as_bytes())
            .unwrap_or_else(|err| eprintln!("Error printing error (that's not good): {err}"));
    }));

    let pipeline = Arc::new(pipeline.clone());
    let worker_options = options.clone();
    let coders = Arc::new(coders);
    let guards = timely::execute(
        timely::Config::process(options.workers),
        move |worker| {
            worker_main(
                worker,
                || should_shutdown_w.load(Ordering::Relaxed),
                &pipeline,
                &worker_options,
                coders.clone(),
            )
        },
    );
    let results = guards.map(|guards| guards.join());
    std::panic::set_hook(previous_hook);

    let mut errors = Vec::new();
    for result in results.map_err(Error::Worker)? {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => errors.push(err),
            // Timely casts panic payloads to a String.
            Err(msg) => errors.push(Error::Worker(msg)),
        }
    }

    let mut errors = errors.into_iter();
    match errors.next() {
        None => Ok(()),
        Some(first) => {
            for other in errors {
                tracing::error!("Another worker also failed: {other}");
            }
            Err(first)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<String>() {
        // Panics with String payload usually comes from timely here.
        msg.clone()
    } else if let Some(msg) = payload.downcast_ref::<&str>() {
        // Panic with &str payload, usually from a direct call to
        // `panic!`.
        msg.to_string()
    } else {
        "unknown error".to_owned()
    }
}
