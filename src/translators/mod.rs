//! One handler per primitive transform kind.
//!
//! Every handler reads its inputs from the [`TranslationContext`],
//! builds timely operators in the context's scope, and binds its
//! outputs back. Handlers run on every worker and must build the same
//! operators everywhere; asymmetry between workers lives inside the
//! operators.
//!
//! [`TranslationContext`]: crate::context::TranslationContext

use opentelemetry::KeyValue;
use timely::dataflow::Scope;

mod assign_windows;
mod executable_stage;
mod flatten;
mod group_by_key;
pub(crate) mod impulse;
mod reshuffle;

pub(crate) use assign_windows::translate_assign_windows;
pub(crate) use executable_stage::translate_executable_stage;
pub(crate) use flatten::translate_flatten;
pub(crate) use group_by_key::translate_group_by_key;
pub(crate) use impulse::translate_impulse;
pub(crate) use reshuffle::translate_reshuffle;

/// Metric labels for operators built for a transform.
pub(crate) fn labels<S: Scope>(scope: &S, transform_id: &str) -> Vec<KeyValue> {
    vec![
        KeyValue::new("transform_id", transform_id.to_owned()),
        KeyValue::new("worker_id", scope.index().to_string()),
    ]
}
