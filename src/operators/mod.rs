//! Custom timely operators used by the translators.

pub(crate) mod keyed_work_item;
pub(crate) mod window_reduce;
