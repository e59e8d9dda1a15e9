//! Shared fixtures
//!
//! Fixture definitions and the per-scope mapping managers that build, share and
//! dispose them.

mod definition;
mod manager;

pub use definition::{Dependencies, FixtureBuilder, FixtureDefinition, FixtureInstance, FixtureKey};
pub use manager::FixtureMappingManager;
