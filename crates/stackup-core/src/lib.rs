//! Stackup Core - configuration compiler and stack lifecycle engine
//!
//! This library turns a layered project configuration and an infrastructure
//! template into one resolved, syntactically valid template, then drives a
//! remote stack-management API through validate, compile, create, update and
//! deploy. The `stackup` binary is a thin clap front end over it.
//!
//! # Architecture
//!
//! - **Configuration** (`config`): layer loading, precedence merge,
//!   self-reference interpolation, typed accessors
//! - **Templates** (`template`): `{{ }}` / `{% %}` expansion against the
//!   resolved tree
//! - **Packaging** (`package`): deterministic zip bundles for deployable units
//! - **Engines** (`engine`): optional external hooks that rewrite the config
//!   or the compiled text
//! - **Lifecycle** (`stack`): decision table, polling, single-unit updates
//! - **Gateway** (`gateway`): the remote API seam, over HTTP or in memory
//!
//! # Example Usage
//!
//! ```ignore
//! use stackup_core::{pipeline, DeployOptions, Operation, StartupContext};
//!
//! let ctx = StartupContext::capture()?;
//! let opts = DeployOptions::default();
//! let prepared = pipeline::prepare(&ctx, &opts, "0.3.0").await?;
//! let outcome = pipeline::execute(&ctx, &opts, prepared, &Operation::Compile, &services, &mut sink).await?;
//! ```

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod options;
pub mod package;
pub mod pipeline;
pub mod scaffold;
pub mod stack;
pub mod template;

// Re-export main types for convenience
pub use config::{ConfigLayer, KeyPath, LayerOrigin, ResolvedConfig};
pub use context::StartupContext;
pub use engine::{Engine, EngineKind};
pub use error::{Error, Result};
pub use gateway::{HttpGateway, MemoryGateway, StackGateway};
pub use options::{DeployOptions, Operation, DEFAULT_DEPLOYMENT};
pub use package::{ArtifactPackager, BundleInfo, ZipPackager};
pub use stack::{
    CancelToken, LifecycleController, Outcome, RemoteStackState, StackIdentity, StackStatus,
    StatusSink,
};
pub use template::{expand, CompiledTemplate, TemplateDocument};
