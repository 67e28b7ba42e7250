//! stackup CLI - compile layered configuration into stack templates and deploy them

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use stackup_core::gateway::HttpGateway;
use stackup_core::pipeline::{self, Services};
use stackup_core::scaffold::{self, InitOptions};
use stackup_core::{
    CancelToken, DeployOptions, MemoryGateway, Operation, Outcome, StackGateway, StackStatus,
    StartupContext, ZipPackager,
};
use std::path::{Path, PathBuf};

/// CLI version
pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

const USER_AGENT: &str = concat!("stackup/", env!("CARGO_PKG_VERSION"));

/// Exit code after an operator interrupt
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "stackup")]
#[command(about = "Compile layered configuration into stack templates and deploy them")]
#[command(version)]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug, Default)]
pub struct GlobalArgs {
    /// Deployment section to apply on top of `default`
    #[arg(short, long, global = true)]
    pub deployment: Option<String>,

    /// Region override
    #[arg(short, long, global = true)]
    pub region: Option<String>,

    /// Credentials profile passed to the gateway
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Role to assume for stack operations
    #[arg(long, global = true)]
    pub role: Option<String>,

    /// Stack name override
    #[arg(long, global = true)]
    pub stack: Option<String>,

    /// Config file (default: <config-dir>/config.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Env file (default: <config-dir>/.env, if present)
    #[arg(long = "env-file", global = true)]
    pub env_file: Option<PathBuf>,

    /// Template file (default: <config-dir>/cloudformation.template.yml)
    #[arg(long = "cf-file", global = true)]
    pub cf_file: Option<PathBuf>,

    /// Application template directory used as the base for the configuration
    #[arg(short = 't', long = "template", value_name = "DIR", global = true)]
    pub template: Option<PathBuf>,

    /// Folder holding config, template and compiled output (default: .stackup)
    #[arg(short = 'k', long = "config-dir", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Executable implementing the config/template engine hooks
    #[arg(long = "engine-hook", global = true)]
    pub engine_hook: Option<PathBuf>,

    /// Override a config value, e.g. --set lambdas.api.memory=512 (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    pub set: Vec<String>,

    /// Where `cf compile` writes the compiled template
    #[arg(long, global = true)]
    pub output: Option<PathBuf>,

    /// Stack gateway endpoint (else gateway.endpoint, else STACKUP_GATEWAY_URL)
    #[arg(long = "gateway-url", global = true)]
    pub gateway_url: Option<String>,

    /// Run against an in-memory gateway; nothing is sent anywhere
    #[arg(long = "dry-run", global = true)]
    pub dry_run: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    fn to_options(&self) -> DeployOptions {
        DeployOptions {
            deployment: self.deployment.clone(),
            region: self.region.clone(),
            profile: self.profile.clone(),
            role: self.role.clone(),
            stack: self.stack.clone(),
            config_dir: self.config_dir.clone(),
            config_path: self.config.clone(),
            env_file: self.env_file.clone(),
            template_path: self.cf_file.clone(),
            app_template: self.template.clone(),
            output_path: self.output.clone(),
            set: self.set.clone(),
            engine_hook: self.engine_hook.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stack operations
    Cf {
        #[command(subcommand)]
        op: CfCommand,
    },
    /// Replace the code of one function without a stack update
    Lambda {
        /// Unit name under `lambdas`
        name: String,
    },
    /// Write a starter config and template
    Init(InitArgs),
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfCommand {
    /// Create the stack; fails if it exists
    Create,
    /// Update the stack; fails if it does not exist
    Update,
    /// Create or update
    Upsert,
    /// Create or update
    Deploy,
    /// Compile and validate remotely
    Validate,
    /// Compile to a local file only
    Compile,
}

impl From<CfCommand> for Operation {
    fn from(cmd: CfCommand) -> Self {
        match cmd {
            CfCommand::Create => Operation::Create,
            CfCommand::Update => Operation::Update,
            CfCommand::Upsert => Operation::Upsert,
            CfCommand::Deploy => Operation::Deploy,
            CfCommand::Validate => Operation::Validate,
            CfCommand::Compile => Operation::Compile,
        }
    }
}

/// `init` takes the stack name from the global `--stack`
#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Bucket for compiled templates and function bundles
    #[arg(long)]
    pub bucket: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = stackup_core::logging::init(args.global.verbose) {
        eprintln!("{} {}", "Warning: logging unavailable:".yellow(), e);
    }

    // First Ctrl+C detaches from polling, a second one exits at once
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_token.signal() > 1 {
            std::process::exit(EXIT_INTERRUPTED);
        }
        eprintln!(
            "\n  {} {}",
            "△".yellow(),
            "Interrupted: detaching, the remote operation keeps running (Ctrl+C again to quit)"
                .yellow()
        );
    })
    .ok();

    let code = match run(args, cancel.clone()).await {
        Ok(()) if cancel.is_cancelled() => EXIT_INTERRUPTED,
        Ok(()) => 0,
        Err(e) => {
            println!("  {} {}", "✗".red(), format!("{:#}", e).red());
            1
        }
    };
    std::process::exit(code);
}

async fn run(args: Args, cancel: CancelToken) -> Result<()> {
    let ctx = StartupContext::capture().context("Failed to read the working directory")?;

    match args.command {
        Command::Init(init) => run_init(&ctx, &args.global, init).await,
        Command::Cf { op } => run_operation(&ctx, &args.global, Operation::from(op), cancel).await,
        Command::Lambda { name } => {
            run_operation(&ctx, &args.global, Operation::UpdateUnit(name), cancel).await
        }
    }
}

async fn run_init(ctx: &StartupContext, global: &GlobalArgs, init: InitArgs) -> Result<()> {
    let config_dir = ctx.resolve(
        global
            .config_dir
            .as_deref()
            .unwrap_or_else(|| Path::new(stackup_core::config::loader::DEFAULT_CONFIG_DIR)),
    );
    let stack_name = global
        .stack
        .clone()
        .context("init needs a stack name: pass --stack <name>")?;
    let opts = InitOptions {
        stack_name,
        bucket: init.bucket,
        config_dir,
        project_dir: ctx.cwd().to_path_buf(),
        cli_version: CLI_VERSION.to_string(),
    };

    let written = scaffold::init_project(&opts).await?;
    println!("  {} Project initialized", "●".green());
    for path in written {
        let shown = path.strip_prefix(ctx.cwd()).unwrap_or(path.as_path());
        println!("    {}", shown.display().to_string().dimmed());
    }
    println!();
    println!("  {} Next: {}", "◇".blue(), "stackup cf compile".bold());
    Ok(())
}

async fn run_operation(
    ctx: &StartupContext,
    global: &GlobalArgs,
    op: Operation,
    cancel: CancelToken,
) -> Result<()> {
    let opts = global.to_options();
    let prepared = pipeline::prepare(ctx, &opts, CLI_VERSION).await?;
    for warning in &prepared.warnings {
        println!("  {} {}", "△".yellow(), "Version warning".yellow());
        println!("    {}", warning.dimmed());
    }

    if let Some(notice) = deprecation_notice(&op) {
        println!("  {} {}", "△".yellow(), notice.yellow());
    }

    let gateway = build_gateway(ctx, global, &prepared.config, &op)?;
    let packager = ZipPackager::new(ctx.cwd(), prepared.paths.dist_dir.clone());
    let services = Services {
        gateway: gateway.as_ref(),
        packager: &packager,
        cancel,
    };

    println!(
        "  {} {} {}",
        "●".blue(),
        op.to_string().bold(),
        format!("({})", opts.deployment_name()).dimmed()
    );
    let mut sink = |stack: &str, status: &StackStatus| print_status(stack, status);
    let outcome = pipeline::execute(ctx, &opts, prepared, &op, &services, &mut sink).await?;
    print_outcome(&outcome, global.dry_run);
    Ok(())
}

/// create, update and upsert are kept for compatibility; deploy covers all three
fn deprecation_notice(op: &Operation) -> Option<String> {
    match op {
        Operation::Create | Operation::Update | Operation::Upsert => {
            Some(format!("`cf {}` is deprecated, use `cf deploy`", op))
        }
        _ => None,
    }
}

fn build_gateway(
    ctx: &StartupContext,
    global: &GlobalArgs,
    config: &stackup_core::ResolvedConfig,
    op: &Operation,
) -> Result<Box<dyn StackGateway>> {
    if global.dry_run {
        tracing::info!("Dry run: using the in-memory gateway");
        return Ok(Box::new(MemoryGateway::new()));
    }
    match HttpGateway::resolve_endpoint(global.gateway_url.as_deref(), config, ctx)? {
        Some(url) => {
            tracing::debug!(endpoint = %url, "Using HTTP gateway");
            Ok(Box::new(HttpGateway::new(url, USER_AGENT)))
        }
        // compile never talks to the gateway
        None if *op == Operation::Compile => Ok(Box::new(MemoryGateway::new())),
        None => anyhow::bail!(
            "No stack gateway configured: pass --gateway-url, set gateway.endpoint or export {}",
            stackup_core::gateway::http::GATEWAY_URL_ENV
        ),
    }
}

fn print_status(stack: &str, status: &StackStatus) {
    let code = if status.status.ends_with("_FAILED") || status.status.contains("ROLLBACK") {
        status.status.red()
    } else if status.status.ends_with("_COMPLETE") {
        status.status.green()
    } else {
        status.status.yellow()
    };
    match &status.reason {
        Some(reason) => println!("    {} {} {}", stack.dimmed(), code, format!("({})", reason).dimmed()),
        None => println!("    {} {}", stack.dimmed(), code),
    }
}

fn print_outcome(outcome: &Outcome, dry_run: bool) {
    let suffix = if dry_run {
        " (dry run)".dimmed().to_string()
    } else {
        String::new()
    };
    match outcome {
        Outcome::Validated => println!("  {} Template is valid{}", "●".green(), suffix),
        Outcome::Compiled(path) => {
            println!("  {} Compiled to {}{}", "●".green(), path.display(), suffix)
        }
        Outcome::Created(status) => {
            println!("  {} Stack created: {}{}", "●".green(), status.status, suffix)
        }
        Outcome::Updated(status) => {
            println!("  {} Stack updated: {}{}", "●".green(), status.status, suffix)
        }
        Outcome::NoChanges => println!("  {} No changes to deploy{}", "○".blue(), suffix),
        Outcome::Detached { stack, last } => {
            let last = last
                .as_ref()
                .map(|s| s.status.clone())
                .unwrap_or_else(|| "unknown".to_string());
            println!(
                "  {} Stopped waiting for {} (last status: {}); the operation continues remotely",
                "△".yellow(),
                stack.bold(),
                last
            );
        }
        Outcome::UnitUpdated {
            function_name,
            bucket,
            key,
        } => println!(
            "  {} Updated {} {}{}",
            "●".green(),
            function_name.bold(),
            format!("(s3://{}/{})", bucket, key).dimmed(),
            suffix
        ),
    }
}
