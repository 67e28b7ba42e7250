//! Drives a compiled template through the gateway
//!
//! Validate and compile never look at remote state. Mutating operations
//! describe the stack, consult the decision table, persist the compiled
//! template, submit, then poll to a terminal status.

use super::decision::{decide, needs_remote_state, Action};
use super::poll::{CancelToken, PollOutcome, PollPolicy, Poller, StatusSink};
use super::state::{RemoteStackState, StackStatus};
use super::StackIdentity;
use crate::error::{Error, Result};
use crate::gateway::{OperationHandle, StackGateway, Submission};
use crate::options::Operation;
use crate::package::BundleInfo;
use crate::template::CompiledTemplate;
use std::path::{Path, PathBuf};

/// Successful end of an invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Validated,
    Compiled(PathBuf),
    Created(StackStatus),
    Updated(StackStatus),
    /// The update was accepted as a no-op
    NoChanges,
    /// Operator interrupted polling; the remote operation is still running
    Detached {
        stack: String,
        last: Option<StackStatus>,
    },
    UnitUpdated {
        function_name: String,
        bucket: String,
        key: String,
    },
}

/// Everything a stack operation submits
pub struct StackRequest<'r> {
    pub identity: &'r StackIdentity,
    pub template: &'r CompiledTemplate,
    pub capabilities: &'r [String],
    /// Compile target, or the deploy copy for mutating operations
    pub output: &'r Path,
    /// Bundles uploaded after the decision and before submission
    pub artifacts: &'r [BundleInfo],
}

pub struct LifecycleController<'a> {
    gateway: &'a dyn StackGateway,
    policy: PollPolicy,
    cancel: CancelToken,
}

impl<'a> LifecycleController<'a> {
    pub fn new(gateway: &'a dyn StackGateway, policy: PollPolicy, cancel: CancelToken) -> Self {
        Self {
            gateway,
            policy,
            cancel,
        }
    }

    pub async fn run(
        &self,
        op: &Operation,
        request: &StackRequest<'_>,
        sink: &mut dyn StatusSink,
    ) -> Result<Outcome> {
        let StackRequest {
            identity,
            template,
            capabilities,
            output,
            artifacts,
        } = *request;
        let stack = identity.stack_name.as_str();

        let state = if needs_remote_state(op) {
            template.validate_syntax()?;
            let state = self.gateway.describe_stack(identity).await?;
            tracing::info!(stack, state = %state, "Remote stack state");
            state
        } else {
            RemoteStackState::Absent
        };

        match decide(op, &state, stack)? {
            Action::ValidateOnly => {
                template.validate_syntax()?;
                self.gateway.validate_template(identity, template.text()).await?;
                tracing::info!(stack, "Template validated");
                Ok(Outcome::Validated)
            }
            Action::CompileOnly => {
                write_atomic(output, template.text()).await?;
                template.validate_syntax()?;
                Ok(Outcome::Compiled(output.to_path_buf()))
            }
            Action::Create => {
                write_atomic(output, template.text()).await?;
                self.upload(identity, artifacts).await?;
                tracing::info!(stack, "Creating stack");
                let handle = self
                    .gateway
                    .create_stack(identity, template.text(), capabilities)
                    .await?;
                self.finish(&handle, sink, Outcome::Created).await
            }
            Action::Update => {
                write_atomic(output, template.text()).await?;
                self.upload(identity, artifacts).await?;
                tracing::info!(stack, "Updating stack");
                match self
                    .gateway
                    .update_stack(identity, template.text(), capabilities)
                    .await?
                {
                    Submission::NoChanges => {
                        tracing::info!(stack, "No changes to apply");
                        Ok(Outcome::NoChanges)
                    }
                    Submission::Started(handle) => self.finish(&handle, sink, Outcome::Updated).await,
                }
            }
            Action::UpdateUnit => Err(Error::config(
                "operation",
                "single-unit updates do not go through the stack controller",
            )),
        }
    }

    async fn upload(&self, identity: &StackIdentity, artifacts: &[BundleInfo]) -> Result<()> {
        for bundle in artifacts {
            tracing::info!(unit = %bundle.unit, bucket = %bundle.bucket, key = %bundle.key, "Uploading bundle");
            self.gateway
                .upload_artifact(identity, &bundle.bucket, &bundle.key, bundle.read_bytes()?)
                .await?;
        }
        Ok(())
    }

    async fn finish(
        &self,
        handle: &OperationHandle,
        sink: &mut dyn StatusSink,
        done: fn(StackStatus) -> Outcome,
    ) -> Result<Outcome> {
        let poller = Poller::new(self.gateway, self.policy, self.cancel.clone());
        match poller.wait(handle, sink).await? {
            PollOutcome::Completed(status) => Ok(done(status)),
            PollOutcome::Detached(last) => Ok(Outcome::Detached {
                stack: handle.stack_name.clone(),
                last,
            }),
        }
    }
}

/// Write `text` to `path` via a sibling temp file and a rename
pub async fn write_atomic(path: &Path, text: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| Error::io(parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::config("output path", format!("{} has no file name", path.display())))?;
    let temp = parent.join(format!(".{}.{}.tmp", file_name, std::process::id()));

    if let Err(e) = tokio::fs::write(&temp, text).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(Error::io(&temp, e));
    }
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(Error::io(path, e));
    }
    tracing::debug!(path = %path.display(), bytes = text.len(), "Wrote compiled template");
    Ok(())
}
