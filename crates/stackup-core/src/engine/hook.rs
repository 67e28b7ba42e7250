//! External engine hook
//!
//! The hook is an executable invoked as `<hook> config` or `<hook> template`.
//! It receives the resolved config as JSON (or the compiled template text)
//! on stdin and prints the replacement on stdout. Empty output keeps the
//! input unchanged. A non-zero exit or a run longer than the timeout fails.

use super::Engine;
use crate::config::ResolvedConfig;
use crate::error::{Error, Result};
use crate::template::CompiledTemplate;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Time allowed for one hook invocation
pub const HOOK_TIMEOUT: Duration = Duration::from_secs(60);

pub struct HookEngine {
    path: PathBuf,
    timeout: Duration,
}

impl HookEngine {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            timeout: HOOK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the hook with `stage` as its argument and return its stdout
    async fn invoke(&self, stage: &str, input: Vec<u8>) -> Result<String> {
        tracing::debug!(hook = %self.path.display(), stage, "Running engine hook");

        let mut child = Command::new(&self.path)
            .arg(stage)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::EngineHook {
                message: format!("cannot start {}: {}", self.path.display(), e),
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| Error::EngineHook {
            message: "hook stdin unavailable".to_string(),
        })?;
        let feed = async move {
            let written = stdin.write_all(&input).await;
            drop(stdin);
            written
        };

        let run = async { tokio::join!(feed, child.wait_with_output()) };
        let (written, output) = timeout(self.timeout, run).await.map_err(|_| Error::EngineHook {
            message: format!(
                "{} {} did not finish within {}s",
                self.path.display(),
                stage,
                self.timeout.as_secs()
            ),
        })?;

        let output = output.map_err(|e| Error::EngineHook {
            message: format!("{} {}: {}", self.path.display(), stage, e),
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::EngineHook {
                message: format!(
                    "{} {} exited with {}: {}",
                    self.path.display(),
                    stage,
                    output.status,
                    stderr.trim()
                ),
            });
        }
        // a hook that exits without reading stdin is fine
        if let Err(e) = written {
            tracing::debug!(error = %e, "Engine hook closed stdin early");
        }

        String::from_utf8(output.stdout).map_err(|_| Error::EngineHook {
            message: format!("{} {} printed non-UTF-8 output", self.path.display(), stage),
        })
    }
}

#[async_trait]
impl Engine for HookEngine {
    async fn transform_config(&self, config: ResolvedConfig) -> Result<ResolvedConfig> {
        let input = serde_json::to_vec(config.as_value())?;
        let stdout = self.invoke("config", input).await?;
        if stdout.trim().is_empty() {
            return Ok(config);
        }
        let value: serde_json::Value = serde_json::from_str(&stdout).map_err(|e| Error::EngineHook {
            message: format!("config hook output is not JSON: {}", e),
        })?;
        ResolvedConfig::from_value(value).map_err(|_| Error::EngineHook {
            message: "config hook must print a JSON object".to_string(),
        })
    }

    async fn transform_template(&self, template: CompiledTemplate) -> Result<CompiledTemplate> {
        let stdout = self
            .invoke("template", template.text().as_bytes().to_vec())
            .await?;
        if stdout.trim().is_empty() {
            return Ok(template);
        }
        Ok(template.with_text(stdout))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::template::{expand, TemplateDocument};
    use serde_json::json;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("hook.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn template(text: &str) -> CompiledTemplate {
        expand(&TemplateDocument::new("t", text), &ResolvedConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_config_hook_replaces_tree() {
        let dir = tempfile::tempdir().unwrap();
        let hook = HookEngine::new(script(
            dir.path(),
            r#"[ "$1" = config ] || exit 3; cat >/dev/null; echo '{"stackName":"from-hook"}'"#,
        ));
        let cfg = ResolvedConfig::from_value(json!({"stackName": "orig"})).unwrap();
        let out = hook.transform_config(cfg).await.unwrap();
        assert_eq!(out.get_str("stackName"), Some("from-hook"));
    }

    #[tokio::test]
    async fn test_template_hook_and_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let hook = HookEngine::new(script(dir.path(), "tr a-z A-Z"));
        let out = hook.transform_template(template("a: b\n")).await.unwrap();
        assert_eq!(out.text(), "A: B\n");

        let silent = HookEngine::new(script(dir.path(), "cat >/dev/null"));
        let out = silent.transform_template(template("a: b\n")).await.unwrap();
        assert_eq!(out.text(), "a: b\n");
    }

    #[tokio::test]
    async fn test_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let hook = HookEngine::new(script(dir.path(), "echo 'bad input' >&2; exit 2"));
        let err = hook.transform_template(template("a: b\n")).await.unwrap_err();
        assert!(matches!(err, Error::EngineHook { ref message } if message.contains("bad input")));
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let hook = HookEngine::new(script(dir.path(), "sleep 5"))
            .with_timeout(Duration::from_millis(200));
        let err = hook.transform_template(template("a: b\n")).await.unwrap_err();
        assert!(err.to_string().contains("did not finish"));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let hook = HookEngine::new(PathBuf::from("/nonexistent/stackup-hook"));
        let err = hook.transform_template(template("a: b\n")).await.unwrap_err();
        assert!(err.to_string().contains("cannot start"));
    }
}
