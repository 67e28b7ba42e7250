//! Transformation engines
//!
//! An engine may rewrite the resolved configuration before expansion and the
//! compiled text after it. The default engine leaves both untouched; a
//! user-supplied engine is an external executable (see `hook`).

pub mod hook;

pub use hook::HookEngine;

use crate::config::{ConfigLayer, LayerOrigin, ResolvedConfig};
use crate::context::StartupContext;
use crate::error::Result;
use crate::template::CompiledTemplate;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Base-layer key naming an engine hook
pub const ENGINE_KEY: &str = "engine";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineKind {
    Default,
    UserSupplied(PathBuf),
}

impl EngineKind {
    /// `--engine-hook` wins; then the project's base layer `engine` key,
    /// relative to the config directory; then the application template's
    /// `engine` key, relative to the template directory
    pub fn select(
        ctx: &StartupContext,
        flag: Option<&Path>,
        layers: &[ConfigLayer],
        config_dir: &Path,
        app_template_dir: Option<&Path>,
    ) -> Self {
        if let Some(path) = flag {
            return EngineKind::UserSupplied(ctx.resolve(path));
        }
        if let Some(path) = engine_key(layers, LayerOrigin::Base) {
            return EngineKind::UserSupplied(config_dir.join(path));
        }
        match (app_template_dir, engine_key(layers, LayerOrigin::AppTemplate)) {
            (Some(dir), Some(path)) => EngineKind::UserSupplied(dir.join(path)),
            _ => EngineKind::Default,
        }
    }

    pub fn build(&self) -> Box<dyn Engine> {
        match self {
            EngineKind::Default => Box::new(DefaultEngine),
            EngineKind::UserSupplied(path) => Box::new(HookEngine::new(path.clone())),
        }
    }
}

/// `engine` key of the first layer with `origin`; deployment sections never pick engines
fn engine_key(layers: &[ConfigLayer], origin: LayerOrigin) -> Option<String> {
    layers
        .iter()
        .find(|layer| layer.origin() == origin)
        .and_then(|layer| match layer.values().get(ENGINE_KEY) {
            Some(Value::String(path)) if !path.trim().is_empty() => Some(path.clone()),
            _ => None,
        })
}

#[async_trait]
pub trait Engine: Send + Sync {
    async fn transform_config(&self, config: ResolvedConfig) -> Result<ResolvedConfig>;

    async fn transform_template(&self, template: CompiledTemplate) -> Result<CompiledTemplate>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEngine;

#[async_trait]
impl Engine for DefaultEngine {
    async fn transform_config(&self, config: ResolvedConfig) -> Result<ResolvedConfig> {
        Ok(config)
    }

    async fn transform_template(&self, template: CompiledTemplate) -> Result<CompiledTemplate> {
        Ok(template)
    }
}
