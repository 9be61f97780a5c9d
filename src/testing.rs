//! Helpers for building pipelines and running them in tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use timely::dataflow::operators::capture::Extract;
use timely::dataflow::operators::Capture;
use timely::dataflow::operators::Inspect;
use timely::dataflow::operators::ToStream;

use crate::coders::CoderRegistry;
use crate::context::TranslationContext;
use crate::errors::Error;
use crate::errors::Result;
use crate::options::PipelineOptions;
use crate::pipeline::urns;
use crate::pipeline::CoderSpec;
use crate::pipeline::Collection;
use crate::pipeline::FunctionSpec;
use crate::pipeline::Pipeline;
use crate::pipeline::Transform;
use crate::pipeline::WindowingStrategySpec;
use crate::translate::translate;
use crate::values::WindowedValue;
use crate::window::TimestampCombiner;
use crate::window::WindowFn;

/// Coder id every collection uses unless told otherwise.
pub(crate) const BYTES: &str = "bytes";
/// Windowing strategy id every collection uses unless told otherwise.
pub(crate) const GLOBAL: &str = "global";

pub(crate) struct PipelineBuilder {
    pipeline: Pipeline,
}

impl PipelineBuilder {
    pub(crate) fn new() -> Self {
        let mut builder = Self {
            pipeline: Pipeline::default(),
        };
        builder.coder(BYTES, urns::BYTES_CODER, &[]);
        builder.windowing_strategy(GLOBAL, WindowFn::Global, 0);
        builder
    }

    pub(crate) fn coder(&mut self, id: &str, urn: &str, components: &[&str]) -> &mut Self {
        self.pipeline.components.coders.insert(
            id.to_owned(),
            CoderSpec::new(urn, components.iter().map(|c| c.to_string()).collect()),
        );
        self
    }

    pub(crate) fn windowing_strategy(
        &mut self,
        id: &str,
        window_fn: WindowFn,
        allowed_lateness_millis: i64,
    ) -> &mut Self {
        self.windowing_strategy_spec(
            id,
            WindowingStrategySpec {
                window_fn: window_fn.to_spec(),
                allowed_lateness_millis,
                timestamp_combiner: TimestampCombiner::EndOfWindow,
            },
        )
    }

    pub(crate) fn windowing_strategy_spec(
        &mut self,
        id: &str,
        spec: WindowingStrategySpec,
    ) -> &mut Self {
        self.pipeline
            .components
            .windowing_strategies
            .insert(id.to_owned(), spec);
        self
    }

    /// Declare a collection of bytes in the global window.
    pub(crate) fn collection(&mut self, id: &str) -> &mut Self {
        self.typed_collection(id, BYTES, GLOBAL)
    }

    pub(crate) fn typed_collection(
        &mut self,
        id: &str,
        coder_id: &str,
        windowing_strategy_id: &str,
    ) -> &mut Self {
        self.pipeline.components.collections.insert(
            id.to_owned(),
            Collection {
                unique_name: id.to_owned(),
                coder_id: coder_id.to_owned(),
                windowing_strategy_id: windowing_strategy_id.to_owned(),
                is_bounded: true,
            },
        );
        self
    }

    /// Add a primitive transform with an empty payload.
    ///
    /// Collections it mentions that are not declared yet are declared
    /// as bytes in the global window.
    pub(crate) fn transform(
        &mut self,
        id: &str,
        urn: &str,
        inputs: &[&str],
        outputs: &[&str],
    ) -> &mut Self {
        self.transform_with_payload(id, urn, Vec::new(), inputs, outputs)
    }

    pub(crate) fn transform_with_payload(
        &mut self,
        id: &str,
        urn: &str,
        payload: Vec<u8>,
        inputs: &[&str],
        outputs: &[&str],
    ) -> &mut Self {
        for collection_id in inputs.iter().chain(outputs) {
            if !self
                .pipeline
                .components
                .collections
                .contains_key(*collection_id)
            {
                self.collection(collection_id);
            }
        }
        let named = |prefix: &str, ids: &[&str]| -> BTreeMap<String, String> {
            ids.iter()
                .enumerate()
                .map(|(i, id)| (format!("{prefix}{i:02}"), id.to_string()))
                .collect()
        };
        self.pipeline.components.transforms.insert(
            id.to_owned(),
            Transform {
                unique_name: id.to_owned(),
                spec: FunctionSpec::new(urn, payload),
                inputs: named("in", inputs),
                outputs: named("out", outputs),
                subtransforms: Vec::new(),
            },
        );
        self
    }

    pub(crate) fn build(&self) -> Pipeline {
        self.pipeline.clone()
    }
}

/// Translate `pipeline` on a single worker and capture what the
/// `outputs` collections emit.
///
/// `inputs` are bound to their (external) collections before
/// translation, all at epoch 0. Captured elements are sorted.
pub(crate) fn translate_and_capture(
    pipeline: &Pipeline,
    inputs: Vec<(&str, Vec<WindowedValue>)>,
    outputs: &[&str],
) -> Result<BTreeMap<String, Vec<WindowedValue>>> {
    translate_and_capture_with(pipeline, CoderRegistry::new(), inputs, outputs)
}

pub(crate) fn translate_and_capture_with(
    pipeline: &Pipeline,
    coders: CoderRegistry,
    inputs: Vec<(&str, Vec<WindowedValue>)>,
    outputs: &[&str],
) -> Result<BTreeMap<String, Vec<WindowedValue>>> {
    let pipeline = pipeline.clone();
    let coders = Arc::new(coders);
    let inputs: Vec<(String, Vec<WindowedValue>)> = inputs
        .into_iter()
        .map(|(id, elements)| (id.to_owned(), elements))
        .collect();
    let outputs: Vec<String> = outputs.iter().map(|id| id.to_string()).collect();

    let captures = timely::execute_directly(move |worker| {
        worker.dataflow::<u64, _, _>(|scope| {
            let mut ctx =
                TranslationContext::new(scope.clone(), PipelineOptions::default(), coders);
            for (collection_id, elements) in inputs {
                let coder = ctx.collection_coder(&pipeline, &collection_id)?;
                let stream = elements.to_stream(scope);
                let stream = ctx.register(stream, coder);
                ctx.add_stream(&collection_id, stream)?;
            }

            translate(&mut ctx, &pipeline)?;

            outputs
                .into_iter()
                .map(|collection_id| {
                    let captured = ctx.get_stream(&collection_id)?.stream.capture();
                    Ok((collection_id, captured))
                })
                .collect::<Result<Vec<_>>>()
        })
    })?;

    Ok(captures
        .into_iter()
        .map(|(collection_id, captured)| {
            let mut elements: Vec<WindowedValue> = captured
                .extract()
                .into_iter()
                .flat_map(|(_epoch, elements)| elements)
                .collect();
            elements.sort();
            (collection_id, elements)
        })
        .collect())
}

/// Translate `pipeline` on `workers` threads and capture what each
/// worker emits on `output`, indexed by worker.
///
/// `inputs` are only fed on worker 0, so anything another worker
/// emits was routed there. Captured elements are sorted.
pub(crate) fn translate_and_capture_workers(
    pipeline: &Pipeline,
    workers: usize,
    inputs: Vec<(&str, Vec<WindowedValue>)>,
    output: &str,
) -> Result<Vec<Vec<WindowedValue>>> {
    let pipeline = Arc::new(pipeline.clone());
    let coders = Arc::new(CoderRegistry::new());
    let inputs: Arc<Vec<(String, Vec<WindowedValue>)>> = Arc::new(
        inputs
            .into_iter()
            .map(|(id, elements)| (id.to_owned(), elements))
            .collect(),
    );
    let output = output.to_owned();
    let captured = Arc::new(Mutex::new(vec![Vec::new(); workers]));
    let sink = captured.clone();

    let guards = timely::execute(timely::Config::process(workers), move |worker| {
        let index = worker.index();
        worker.dataflow::<u64, _, _>(|scope| {
            let mut ctx =
                TranslationContext::new(scope.clone(), PipelineOptions::default(), coders.clone());
            for (collection_id, elements) in inputs.iter() {
                let elements = if index == 0 {
                    elements.clone()
                } else {
                    Vec::new()
                };
                let coder = ctx.collection_coder(&pipeline, collection_id)?;
                let stream = ctx.register(elements.to_stream(scope), coder);
                ctx.add_stream(collection_id, stream)?;
            }

            translate(&mut ctx, &pipeline)?;

            let sink = sink.clone();
            ctx.get_stream(&output)?.stream.inspect(move |element| {
                sink.lock().unwrap()[index].push(element.clone());
            });
            Ok::<(), Error>(())
        })
    })
    .map_err(Error::Worker)?;
    for result in guards.join() {
        result.map_err(Error::Worker)??;
    }

    let mut captured = std::mem::take(&mut *captured.lock().unwrap());
    for elements in &mut captured {
        elements.sort();
    }
    Ok(captured)
}
