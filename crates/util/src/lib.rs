//! Shared utilities for the yorkie workspace.
//!
//! Currently this is only the seeded [`fuzzer::Fuzzer`] used by the
//! convergence test suites in `yorkie-core`.

pub mod fuzzer;
