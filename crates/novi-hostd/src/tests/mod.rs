//! Test suites for the host.

pub(crate) mod support;
