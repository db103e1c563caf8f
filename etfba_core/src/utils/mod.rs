//! Small helpers shared across modules
pub(crate) mod rounding;
