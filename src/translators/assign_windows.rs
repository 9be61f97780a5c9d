use timely::dataflow::operators::Map;
use timely::dataflow::Scope;

use crate::context::TranslationContext;
use crate::errors::Error;
use crate::errors::Result;
use crate::pipeline::Pipeline;
use crate::pipeline::Transform;
use crate::window::WindowFn;
use crate::window::WindowIntoPayload;

/// Replace each element's windows with those its timestamp falls
/// into.
pub(crate) fn translate_assign_windows<S>(
    transform_id: &str,
    transform: &Transform,
    pipeline: &Pipeline,
    ctx: &mut TranslationContext<S>,
) -> Result<()>
where
    S: Scope<Timestamp = u64>,
{
    let payload = &transform.spec.payload;
    let window_fn = WindowIntoPayload::decode(payload)
        .and_then(|decoded| WindowFn::from_spec(&decoded.window_fn))
        .map_err(|err| Error::malformed_payload("window into payload", payload, err))?;
    window_fn.check_supported()?;
    tracing::debug!("Assigning windows with {window_fn:?} in {transform_id:?}");

    let input = ctx.get_stream(transform.only_input(transform_id)?)?.clone();
    let output_id = transform.only_output(transform_id)?;
    let coder = ctx.collection_coder(pipeline, output_id)?;

    let stream = input.stream.map(move |element| {
        let windows = window_fn.assign(&element.timestamp);
        element.with_windows(windows)
    });
    let stream = ctx.register(stream, coder);
    ctx.add_stream(output_id, stream)
}
