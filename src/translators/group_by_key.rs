use timely::dataflow::operators::Map;
use timely::dataflow::Scope;

use crate::context::TranslationContext;
use crate::errors::Error;
use crate::errors::Result;
use crate::operators::keyed_work_item::to_keyed_work_items;
use crate::operators::window_reduce::BufferingReduceFn;
use crate::operators::window_reduce::WindowReduce;
use crate::pipeline::urns;
use crate::pipeline::Pipeline;
use crate::pipeline::Transform;
use crate::translators::labels;
use crate::window::WindowingStrategy;

/// Group values by key and window.
///
/// Each output is a `(key, values)` pair emitted once per window,
/// when the watermark passes the window's expiry or at the end of
/// input.
pub(crate) fn translate_group_by_key<S>(
    transform_id: &str,
    transform: &Transform,
    pipeline: &Pipeline,
    ctx: &mut TranslationContext<S>,
) -> Result<()>
where
    S: Scope<Timestamp = u64>,
{
    let input_id = transform.only_input(transform_id)?;
    let output_id = transform.only_output(transform_id)?;

    let strategy = WindowingStrategy::for_collection(pipeline, input_id)?;
    strategy.window_fn.check_supported()?;

    let coder_id = &pipeline.collection(input_id)?.coder_id;
    let coder_spec = pipeline.coder(coder_id)?;
    if coder_spec.urn != urns::KV_CODER {
        return Err(Error::UnexpectedCoder {
            coder_id: coder_id.clone(),
            expected: "key/value",
            actual: coder_spec.urn.clone(),
        });
    }
    let key_coder_id = coder_spec.components.first().ok_or_else(|| Error::MalformedCoder {
        coder_id: coder_id.clone(),
        reason: "key/value coder has no key component".to_owned(),
    })?;
    let key_coder = ctx.coders().instantiate(pipeline, key_coder_id)?;

    let input = ctx.get_stream(input_id)?.clone();
    let coder = ctx.collection_coder(pipeline, output_id)?;
    let labels = labels(ctx.scope(), transform_id);

    let name = transform_id.to_owned();
    let stream = input
        .stream
        .flat_map(move |element| to_keyed_work_items(element, key_coder.as_ref(), &name))
        .window_reduce(
            format!("{transform_id}.window_reduce"),
            BufferingReduceFn,
            strategy,
            labels,
        );

    let stream = ctx.register(stream, coder);
    ctx.add_stream(output_id, stream)
}
