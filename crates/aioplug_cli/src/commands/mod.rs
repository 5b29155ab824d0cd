//! CLI command implementations.

pub mod list;
pub mod probe;
pub mod roundtrip;
