//! Non-interactive project initialization
//!
//! Writes a starter `config.yml` (rendered with the stack name and bucket),
//! a starter template and a sample function source. Existing files are never
//! overwritten.

use crate::config::loader::{CONFIG_FILE_NAME, TEMPLATE_FILE_NAME};
use crate::config::ResolvedConfig;
use crate::template::{expand, TemplateDocument};
use anyhow::{bail, Context, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::fs;

const STARTER_CONFIG: &str = include_str!("../../../templates/starter/config.yml");
const STARTER_TEMPLATE: &str =
    include_str!("../../../templates/starter/cloudformation.template.yml");
const STARTER_HANDLER: &str = include_str!("../../../templates/starter/src/hello/index.js");

/// Sample function source, relative to the project directory
const STARTER_HANDLER_PATH: &str = "src/hello/index.js";

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub stack_name: String,
    pub bucket: String,
    /// Absolute config directory
    pub config_dir: PathBuf,
    /// Absolute project directory; function sources are relative to it
    pub project_dir: PathBuf,
    pub cli_version: String,
}

/// Stack names: a letter, then letters, digits and hyphens, at most 128 chars
pub fn validate_stack_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    if !starts_with_letter
        || name.len() > 128
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        bail!(
            "Invalid stack name '{}': use a letter followed by letters, digits or hyphens",
            name
        );
    }
    Ok(())
}

/// Render the starter config for `opts`
pub fn render_config(opts: &InitOptions) -> Result<String> {
    let values = ResolvedConfig::from_value(json!({
        "stackName": opts.stack_name,
        "bucket": opts.bucket,
        "cliVersion": opts.cli_version,
    }))?;
    let compiled = expand(&TemplateDocument::new("starter config.yml", STARTER_CONFIG), &values)?;
    Ok(compiled.into_text())
}

/// Create the starter files and return the paths written
pub async fn init_project(opts: &InitOptions) -> Result<Vec<PathBuf>> {
    validate_stack_name(&opts.stack_name)?;
    if opts.bucket.trim().is_empty() {
        bail!("A bucket name is required");
    }

    let config_file = opts.config_dir.join(CONFIG_FILE_NAME);
    if config_file.exists() {
        bail!(
            "{} already exists; remove it or choose another --config-dir",
            config_file.display()
        );
    }

    fs::create_dir_all(&opts.config_dir)
        .await
        .with_context(|| format!("Failed to create directory: {}", opts.config_dir.display()))?;

    let mut written = Vec::new();
    write_new(&config_file, &render_config(opts)?, &mut written).await?;
    write_new(
        &opts.config_dir.join(TEMPLATE_FILE_NAME),
        STARTER_TEMPLATE,
        &mut written,
    )
    .await?;
    write_new(
        &opts.project_dir.join(STARTER_HANDLER_PATH),
        STARTER_HANDLER,
        &mut written,
    )
    .await?;

    tracing::info!(files = written.len(), dir = %opts.config_dir.display(), "Project initialized");
    Ok(written)
}

/// Write `content` unless `path` exists
async fn write_new(path: &Path, content: &str, written: &mut Vec<PathBuf>) -> Result<()> {
    if path.exists() {
        tracing::debug!(path = %path.display(), "Keeping existing file");
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write file: {}", path.display()))?;
    written.push(path.to_path_buf());
    Ok(())
}
