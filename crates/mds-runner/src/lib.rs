//! # mds-runner
//!
//! Service orchestration shared by the `mds-runner` binary and its tests.

pub mod service;
