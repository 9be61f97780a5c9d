use timely::dataflow::operators::Exchange;
use timely::dataflow::operators::Map;
use timely::dataflow::Scope;

use crate::context::TranslationContext;
use crate::errors::Result;
use crate::pipeline::Pipeline;
use crate::pipeline::Transform;

/// Redistribute elements to random workers.
///
/// Elements cross workers in their collection's encoding and are
/// decoded unchanged on the other side. An element its coder can't
/// encode means the pipeline's declared coder doesn't match its data,
/// which panics the worker.
pub(crate) fn translate_reshuffle<S>(
    transform_id: &str,
    transform: &Transform,
    _pipeline: &Pipeline,
    ctx: &mut TranslationContext<S>,
) -> Result<()>
where
    S: Scope<Timestamp = u64>,
{
    let input = ctx.get_stream(transform.only_input(transform_id)?)?.clone();
    let output_id = transform.only_output(transform_id)?;

    let encoder = input.coder.clone();
    let encode_id = transform_id.to_owned();
    let decoder = input.coder.clone();
    let decode_id = transform_id.to_owned();
    let stream = input
        .stream
        .map(move |element| {
            encoder.encode_to_vec(&element).unwrap_or_else(|err| {
                panic!("reshuffle {encode_id:?} can't encode {element:?}: {err}")
            })
        })
        // The exchange operator wraps the number to a modulo of
        // workers_count, so we can pass any valid u64.
        .exchange(move |_| fastrand::u64(..))
        .map(move |encoded: Vec<u8>| {
            decoder
                .decode(&mut encoded.as_slice())
                .unwrap_or_else(|err| panic!("reshuffle {decode_id:?} can't decode element: {err}"))
        });

    let stream = ctx.register(stream, input.coder);
    ctx.add_stream(output_id, stream)
}
