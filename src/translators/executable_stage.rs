use timely::dataflow::Scope;

use crate::context::TranslationContext;
use crate::errors::Error;
use crate::errors::Result;
use crate::pipeline::Pipeline;
use crate::pipeline::Transform;

/// Fused stages of user code are not executed by this runner.
pub(crate) fn translate_executable_stage<S>(
    transform_id: &str,
    transform: &Transform,
    _pipeline: &Pipeline,
    _ctx: &mut TranslationContext<S>,
) -> Result<()>
where
    S: Scope<Timestamp = u64>,
{
    Err(Error::NotImplemented {
        urn: transform.spec.urn.clone(),
        transform_id: transform_id.to_owned(),
    })
}
