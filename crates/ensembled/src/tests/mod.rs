//! Test suites for the embedded server controller and host.

mod support;
