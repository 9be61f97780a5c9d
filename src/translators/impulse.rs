use std::sync::Arc;

use timely::dataflow::operators::ToStream;
use timely::dataflow::Scope;

use crate::coders::BytesCoder;
use crate::coders::WindowCoder;
use crate::coders::WindowedValueCoder;
use crate::context::TranslationContext;
use crate::errors::Result;
use crate::pipeline::Pipeline;
use crate::pipeline::Transform;
use crate::values::PaneInfo;
use crate::values::Value;
use crate::values::WindowedValue;
use crate::window::Window;
use crate::window::MIN_TIMESTAMP;

/// The element every impulse emits.
pub(crate) fn impulse_element() -> WindowedValue {
    WindowedValue::new(
        Value::Bytes(Vec::new()),
        MIN_TIMESTAMP,
        vec![Window::Global],
        PaneInfo::NO_FIRING,
    )
}

/// A single empty bytes element in the global window.
///
/// Only worker 0 emits it, so the whole dataflow sees it once.
pub(crate) fn translate_impulse<S>(
    transform_id: &str,
    transform: &Transform,
    _pipeline: &Pipeline,
    ctx: &mut TranslationContext<S>,
) -> Result<()>
where
    S: Scope<Timestamp = u64>,
{
    let output_id = transform.only_output(transform_id)?;

    let mut scope = ctx.scope().clone();
    let elements = if scope.index() == 0 {
        vec![impulse_element()]
    } else {
        Vec::new()
    };
    let stream = elements.to_stream(&mut scope);

    let coder = WindowedValueCoder::new(Arc::new(BytesCoder), WindowCoder::Global);
    let stream = ctx.register(stream, coder);
    ctx.add_stream(output_id, stream)
}
