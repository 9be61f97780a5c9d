use std::collections::BTreeMap;

use timely::dataflow::operators::Concatenate;
use timely::dataflow::operators::Map;
use timely::dataflow::operators::ToStream;
use timely::dataflow::Scope;

use crate::context::StreamHandle;
use crate::context::TranslationContext;
use crate::errors::Result;
use crate::pipeline::Pipeline;
use crate::pipeline::Transform;
use crate::values::WindowedValue;

/// Union all inputs into one stream.
///
/// A stream given as input `k` times contributes each of its
/// elements `k` times. A flatten of nothing is a stream that never
/// emits.
pub(crate) fn translate_flatten<S>(
    transform_id: &str,
    transform: &Transform,
    pipeline: &Pipeline,
    ctx: &mut TranslationContext<S>,
) -> Result<()>
where
    S: Scope<Timestamp = u64>,
{
    let output_id = transform.only_output(transform_id)?;
    let coder = ctx.collection_coder(pipeline, output_id)?;
    let mut scope = ctx.scope().clone();

    let stream = if transform.inputs.is_empty() {
        // A source is still needed so the output has a producer
        // whose frontier advances and closes.
        let bootstrap = if scope.index() == 0 { vec![()] } else { Vec::new() };
        bootstrap
            .to_stream(&mut scope)
            .flat_map(|()| None::<WindowedValue>)
    } else {
        let inputs = transform
            .inputs
            .values()
            .map(|collection_id| ctx.get_stream(collection_id).cloned())
            .collect::<Result<Vec<_>>>()?;

        let mut uses: BTreeMap<StreamHandle, usize> = BTreeMap::new();
        for input in &inputs {
            *uses.entry(input.handle).or_default() += 1;
        }

        let streams: Vec<_> = inputs
            .into_iter()
            .map(|input| {
                if uses[&input.handle] > 1 {
                    // Concatenating a stream with itself needs
                    // distinct edges.
                    input.stream.map(|element| element)
                } else {
                    input.stream
                }
            })
            .collect();
        scope.concatenate(streams)
    };

    let stream = ctx.register(stream, coder);
    ctx.add_stream(output_id, stream)
}
