//! Definition of a flowport worker.

use std::sync::Arc;
use std::time::Duration;

use timely::communication::Allocate;
use timely::dataflow::operators::Probe;
use timely::dataflow::ProbeHandle;
use timely::progress::Timestamp;
use timely::worker::Worker as TimelyWorker;
use tracing::instrument;

use crate::coders::CoderRegistry;
use crate::context::TranslationContext;
use crate::errors::Result;
use crate::options::PipelineOptions;
use crate::pipeline::Pipeline;
use crate::translate::translate;

/// flowport worker.
///
/// Wraps a [`TimelyWorker`].
struct Worker<'a, A, F>
where
    A: Allocate,
    F: Fn() -> bool,
{
    worker: &'a mut TimelyWorker<A>,
    /// This is a function that should return `true` only when the
    /// dataflow should perform an abrupt shutdown.
    interrupt_callback: F,
}

impl<'a, A, F> Worker<'a, A, F>
where
    A: Allocate,
    F: Fn() -> bool,
{
    fn new(worker: &'a mut TimelyWorker<A>, interrupt_callback: F) -> Self {
        Self {
            worker,
            interrupt_callback,
        }
    }

    /// Run a specific dataflow until it is complete.
    ///
    /// [`ProbeHandle`]s are how we ID a dataflow.
    fn run<T>(&mut self, probe: ProbeHandle<T>)
    where
        T: Timestamp,
    {
        tracing::info!("Timely dataflow start");
        let cooldown = Duration::from_millis(1);
        while !(self.interrupt_callback)() && !probe.done() {
            tracing::debug_span!("step").in_scope(|| {
                self.worker.step_or_park(Some(cooldown));
            });
        }
        tracing::info!("Timely dataflow stop");
    }

    /// Terminate all dataflows in this worker.
    ///
    /// We need this because otherwise all of Timely's entry points
    /// (e.g. [`timely::execute::execute_from`]) wait until all work
    /// is complete and we will hang if we are shutting down due to
    /// error.
    fn shutdown(&mut self) {
        for dataflow_id in self.worker.installed_dataflows() {
            self.worker.drop_dataflow(dataflow_id);
        }
    }
}

/// Public, main entry point for a worker thread.
///
/// Translates `pipeline` into a new dataflow and runs it to
/// completion. Every collection must be produced by some transform;
/// there is nothing to bind external inputs to here.
#[instrument(name = "worker_main", skip_all, fields(worker = worker.index()))]
pub(crate) fn worker_main<A>(
    worker: &mut TimelyWorker<A>,
    interrupt_callback: impl Fn() -> bool,
    pipeline: &Pipeline,
    options: &PipelineOptions,
    coders: Arc<CoderRegistry>,
) -> Result<()>
where
    A: Allocate,
{
    let mut worker = Worker::new(worker, interrupt_callback);
    tracing::info!("Worker start");

    let probe = match build_dataflow(worker.worker, pipeline, options, coders) {
        Ok(probe) => probe,
        Err(err) => {
            // Operators built before the error are already installed.
            worker.shutdown();
            return Err(err);
        }
    };

    tracing::info_span!("pipeline_dataflow").in_scope(|| {
        worker.run(probe);
    });

    worker.shutdown();
    tracing::info!("Worker stop");
    Ok(())
}

/// Turn a pipeline into a Timely dataflow.
///
/// The probe watches every translated collection, so it is done once
/// all of them are.
fn build_dataflow<A>(
    worker: &mut TimelyWorker<A>,
    pipeline: &Pipeline,
    options: &PipelineOptions,
    coders: Arc<CoderRegistry>,
) -> Result<ProbeHandle<u64>>
where
    A: Allocate,
{
    // Remember! Never build different numbers of Timely operators on
    // different workers! Timely does not like that and you'll see a
    // mysterious `failed to correctly cast channel` panic. You must
    // build asymmetry within each operator.
    worker.dataflow_named::<u64, _, _>(&options.job_name, |scope| {
        let mut probe = ProbeHandle::new();

        let mut ctx = TranslationContext::new(scope.clone(), options.clone(), coders);
        translate(&mut ctx, pipeline)?;

        for (collection_id, bound) in ctx.streams() {
            tracing::trace!("Probing collection {collection_id:?}");
            bound.stream.probe_with(&mut probe);
        }

        Ok(probe)
    })
}
