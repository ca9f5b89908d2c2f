//! Internal implementation details.

pub(crate) mod path;
pub(crate) mod teardown;

pub(crate) use path::ResolutionPath;
pub(crate) use teardown::TeardownBag;
