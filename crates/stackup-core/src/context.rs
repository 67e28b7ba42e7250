//! Process-wide state captured once at startup

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Snapshot of the working directory and environment taken when the
/// invocation starts. The core never reads either ad hoc.
#[derive(Debug, Clone)]
pub struct StartupContext {
    cwd: PathBuf,
    env: BTreeMap<String, String>,
}

impl StartupContext {
    /// Capture the current process state
    pub fn capture() -> std::io::Result<Self> {
        Ok(Self {
            cwd: std::env::current_dir()?,
            env: std::env::vars().collect(),
        })
    }

    /// Build a context from explicit values (tests, embedding)
    pub fn new(cwd: impl Into<PathBuf>, env: BTreeMap<String, String>) -> Self {
        Self {
            cwd: cwd.into(),
            env,
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }

    /// Resolve a possibly-relative path against the captured cwd
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}
