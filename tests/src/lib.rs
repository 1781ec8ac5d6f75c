//! Shared harness for killboard sync integration tests.

pub mod containers;
pub mod fixtures;
