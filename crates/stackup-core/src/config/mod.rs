//! Configuration layers, merging and the resolved tree
//!
//! This module provides:
//! - Layer loading from the config file, env file and CLI overrides
//! - The precedence merge (mappings deep-merge, sequences replace)
//! - `ResolvedConfig` with key-path lookup and typed accessors
//! - Self-reference interpolation and version compatibility checks

pub mod envfile;
pub mod interpolate;
pub mod keypath;
pub mod layer;
pub mod loader;
pub mod merge;
pub mod resolved;
pub mod version;

pub use keypath::{KeyPath, Segment};
pub use layer::{ConfigLayer, LayerOrigin};
pub use loader::{load_layers, ProjectPaths};
pub use merge::{deep_merge, merge_layers};
pub use resolved::ResolvedConfig;

use crate::error::Result;

/// Merge `layers` and resolve self-references in one step
pub fn resolve(layers: &[ConfigLayer]) -> Result<ResolvedConfig> {
    interpolate::interpolate(merge_layers(layers))
}
