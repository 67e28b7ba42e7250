//! One invocation end to end
//!
//! `prepare` loads and resolves configuration (layers, merge, interpolation,
//! engine config hook). `execute` packages units, expands the template, runs
//! the engine template hook, then hands the result to the lifecycle
//! controller, or performs a single-unit code update.

use crate::config::resolved::UNITS_KEY;
use crate::config::{self, load_layers, ProjectPaths, ResolvedConfig};
use crate::context::StartupContext;
use crate::engine::{Engine, EngineKind};
use crate::error::{Error, Result};
use crate::gateway::StackGateway;
use crate::options::{DeployOptions, Operation};
use crate::package::{self, ArtifactPackager, BundleInfo};
use crate::stack::unit::{locate_function, update_unit_code};
use crate::stack::{
    CancelToken, LifecycleController, Outcome, PollPolicy, StackRequest, StatusSink,
};
use crate::template::{expand, CompiledTemplate, TemplateDocument};
use serde_json::Value;
use std::path::PathBuf;

/// Configuration resolved for one invocation
pub struct Prepared {
    pub paths: ProjectPaths,
    pub config: ResolvedConfig,
    pub engine_kind: EngineKind,
    engine: Box<dyn Engine>,
    /// Non-fatal notices for the operator
    pub warnings: Vec<String>,
}

impl Prepared {
    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }
}

/// Load, merge and resolve configuration, then apply the engine config hook
pub async fn prepare(
    ctx: &StartupContext,
    opts: &DeployOptions,
    cli_version: &str,
) -> Result<Prepared> {
    let paths = ProjectPaths::from_options(ctx, opts);
    let layers = load_layers(ctx, opts, &paths)?;
    let engine_kind = EngineKind::select(
        ctx,
        opts.engine_hook.as_deref(),
        &layers,
        &paths.config_dir,
        paths.app_template_dir.as_deref(),
    );
    tracing::debug!(layers = layers.len(), engine = ?engine_kind, "Layers loaded");

    let resolved = config::resolve(&layers)?;
    let engine = engine_kind.build();
    let config = engine.transform_config(resolved).await?;

    let warnings = config::version::check_config(&config, cli_version)
        .into_iter()
        .collect();

    Ok(Prepared {
        paths,
        config,
        engine_kind,
        engine,
        warnings,
    })
}

/// Collaborators an invocation talks to
pub struct Services<'a> {
    pub gateway: &'a dyn StackGateway,
    pub packager: &'a dyn ArtifactPackager,
    pub cancel: CancelToken,
}

pub async fn execute(
    ctx: &StartupContext,
    opts: &DeployOptions,
    prepared: Prepared,
    op: &Operation,
    services: &Services<'_>,
    sink: &mut dyn StatusSink,
) -> Result<Outcome> {
    match op {
        Operation::UpdateUnit(unit) => update_single_unit(prepared, unit, services).await,
        _ => run_stack_operation(ctx, opts, prepared, op, services, sink).await,
    }
}

/// Package, expand and transform; returns the template and the bundles to upload
pub async fn compile(
    prepared: &Prepared,
    packager: &dyn ArtifactPackager,
) -> Result<(CompiledTemplate, ResolvedConfig, Vec<BundleInfo>)> {
    let bundles = package::package_all(packager, &prepared.config)?;
    let (compiled, config) = expand_with_bundles(prepared, &bundles).await?;
    Ok((compiled, config, bundles))
}

/// Inject build metadata into the config, then expand and transform the template
async fn expand_with_bundles(
    prepared: &Prepared,
    bundles: &[BundleInfo],
) -> Result<(CompiledTemplate, ResolvedConfig)> {
    let mut config = prepared.config.clone();
    for bundle in bundles {
        package::inject(&mut config, bundle)?;
    }
    package::inject_function_names(&mut config)?;

    let doc = TemplateDocument::load(&prepared.paths.template)?;
    let compiled = expand(&doc, &config)?;
    let compiled = prepared.engine().transform_template(compiled).await?;
    Ok((compiled, config))
}

async fn run_stack_operation(
    ctx: &StartupContext,
    opts: &DeployOptions,
    prepared: Prepared,
    op: &Operation,
    services: &Services<'_>,
    sink: &mut dyn StatusSink,
) -> Result<Outcome> {
    let (compiled, config, bundles) = compile(&prepared, services.packager).await?;
    let identity = config.stack_identity()?;
    let capabilities = config.capabilities();
    let (interval, max_wait) = config.poll_settings();

    let output: PathBuf = match (op, &opts.output_path) {
        (Operation::Compile, Some(path)) => ctx.resolve(path),
        _ => prepared.paths.compiled.clone(),
    };
    let artifacts = if op.uploads_artifacts() {
        bundles
    } else {
        Vec::new()
    };

    tracing::info!(operation = %op, stack = %identity, deployment = config.deployment(), "Running");
    let controller = LifecycleController::new(
        services.gateway,
        PollPolicy::new(interval, max_wait),
        services.cancel.clone(),
    );
    let request = StackRequest {
        identity: &identity,
        template: &compiled,
        capabilities: &capabilities,
        output: &output,
        artifacts: &artifacts,
    };
    controller.run(op, &request, sink).await
}

/// Rebuild one unit and point its function at the new bundle.
/// The template is expanded exactly as for a deploy, so references to other
/// units stay bound; only the selected unit's bundle is uploaded.
async fn update_single_unit(
    prepared: Prepared,
    unit: &str,
    services: &Services<'_>,
) -> Result<Outcome> {
    if prepared.config.unit(unit).is_none() {
        return Err(Error::unresolved(format!("{}.{}", UNITS_KEY, unit)));
    }
    let identity = prepared.config.stack_identity()?;

    let mut bundles = package::package_all(services.packager, &prepared.config)?;
    // a unit with a prebuilt `remote` is rebuilt from `source` here
    let bundle = match bundles.iter().find(|b| b.unit == unit) {
        Some(bundle) => bundle.clone(),
        None => {
            let bundle = services.packager.package(unit, &prepared.config)?;
            bundles.push(bundle.clone());
            bundle
        }
    };

    let (compiled, config) = expand_with_bundles(&prepared, &bundles).await?;
    let function_name = match config
        .unit(unit)
        .and_then(|u| u.get("functionName"))
        .and_then(Value::as_str)
    {
        Some(name) => name.to_string(),
        None => package::default_function_name(&config, unit)?,
    };

    let target = locate_function(&compiled, unit, &function_name, &bundle)?;
    update_unit_code(services.gateway, &identity, &target, bundle.read_bytes()?).await
}
