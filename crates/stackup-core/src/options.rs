//! Already-parsed invocation options
//!
//! The binary owns argument parsing; the core only sees these plain values.

use std::fmt;
use std::path::PathBuf;

/// Deployment name used when none is given
pub const DEFAULT_DEPLOYMENT: &str = "default";

/// Operation requested by the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Validate,
    Compile,
    Create,
    Update,
    /// Create-or-update, kept as an alias of `Deploy`
    Upsert,
    Deploy,
    /// Update the code of one unit without a stack operation
    UpdateUnit(String),
}

impl Operation {
    /// True for operations that change remote stack state
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Create | Self::Update | Self::Upsert | Self::Deploy
        )
    }

    /// True for operations that upload packaged artifacts
    pub fn uploads_artifacts(&self) -> bool {
        self.is_mutating() || matches!(self, Self::UpdateUnit(_))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validate => write!(f, "validate"),
            Self::Compile => write!(f, "compile"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Upsert => write!(f, "upsert"),
            Self::Deploy => write!(f, "deploy"),
            Self::UpdateUnit(name) => write!(f, "lambda {}", name),
        }
    }
}

/// Every option the CLI surface hands to the core
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Named deployment section to apply on top of `default`
    pub deployment: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub role: Option<String>,
    pub stack: Option<String>,

    /// Folder holding config.yml, the template and the compiled output
    pub config_dir: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub template_path: Option<PathBuf>,
    /// Application template directory whose config and template sit below the project's
    pub app_template: Option<PathBuf>,
    /// Explicit compile output path
    pub output_path: Option<PathBuf>,

    /// `key.path=value` overrides
    pub set: Vec<String>,

    /// Executable implementing the user-supplied engine hooks
    pub engine_hook: Option<PathBuf>,
}

impl DeployOptions {
    pub fn deployment_name(&self) -> &str {
        self.deployment.as_deref().unwrap_or(DEFAULT_DEPLOYMENT)
    }
}
