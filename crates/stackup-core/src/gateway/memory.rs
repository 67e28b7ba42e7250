//! Scripted in-process gateway
//!
//! Holds remote state in memory, replays configured status sequences for
//! issued operations, can be told to fail any method, and records every call.

use super::{BundleRef, OperationHandle, StackGateway, Submission};
use crate::error::{Error, Result};
use crate::stack::{RemoteStackState, StackIdentity, StackStatus, StatusPhase};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// One recorded gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    ValidateTemplate { stack: String },
    DescribeStack { stack: String },
    CreateStack { stack: String, template: String },
    UpdateStack { stack: String, template: String },
    OperationStatus { id: String },
    UpdateFunctionCode { function_name: String, bucket: String, key: String },
    UploadArtifact { bucket: String, key: String, size: usize },
}

impl GatewayCall {
    /// Calls that change a stack
    pub fn is_stack_mutation(&self) -> bool {
        matches!(self, GatewayCall::CreateStack { .. } | GatewayCall::UpdateStack { .. })
    }

    pub fn method(&self) -> &'static str {
        match self {
            GatewayCall::ValidateTemplate { .. } => "validate_template",
            GatewayCall::DescribeStack { .. } => "describe_stack",
            GatewayCall::CreateStack { .. } => "create_stack",
            GatewayCall::UpdateStack { .. } => "update_stack",
            GatewayCall::OperationStatus { .. } => "operation_status",
            GatewayCall::UpdateFunctionCode { .. } => "update_function_code",
            GatewayCall::UploadArtifact { .. } => "upload_artifact",
        }
    }
}

struct PendingOperation {
    stack: String,
    statuses: VecDeque<StackStatus>,
    last: Option<StackStatus>,
}

#[derive(Default)]
struct Inner {
    stacks: HashMap<String, RemoteStackState>,
    scripted: Option<Vec<StackStatus>>,
    no_changes: bool,
    failures: HashMap<String, String>,
    operations: HashMap<String, PendingOperation>,
    calls: Vec<GatewayCall>,
    next_id: u64,
}

#[derive(Default)]
pub struct MemoryGateway {
    inner: Mutex<Inner>,
}

impl MemoryGateway {
    /// Gateway where every stack is absent and every operation succeeds at once
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stack(self, name: impl Into<String>, state: RemoteStackState) -> Self {
        self.lock().stacks.insert(name.into(), state);
        self
    }

    /// Statuses returned, in order, by `operation_status` for each issued
    /// operation. The last one repeats once the list is exhausted.
    pub fn with_statuses<I, S>(self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().scripted = Some(statuses.into_iter().map(StackStatus::new).collect());
        self
    }

    /// Same as `with_statuses` but with reason texts
    pub fn with_status_list(self, statuses: Vec<StackStatus>) -> Self {
        self.lock().scripted = Some(statuses);
        self
    }

    /// Updates report that nothing changed
    pub fn with_no_changes(self) -> Self {
        self.lock().no_changes = true;
        self
    }

    /// Make `method` (e.g. `"describe_stack"`) fail with `message`
    pub fn fail_on(self, method: &str, message: impl Into<String>) -> Self {
        self.lock().failures.insert(method.to_string(), message.into());
        self
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    pub fn stack_state(&self, name: &str) -> RemoteStackState {
        self.lock()
            .stacks
            .get(name)
            .cloned()
            .unwrap_or(RemoteStackState::Absent)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the call, then apply any injected failure for it
    fn record(&self, call: GatewayCall) -> Result<MutexGuard<'_, Inner>> {
        let mut inner = self.lock();
        let method = call.method();
        inner.calls.push(call);
        match inner.failures.get(method).cloned() {
            Some(message) => Err(Error::gateway(message)),
            None => Ok(inner),
        }
    }

    fn start_operation(inner: &mut Inner, stack: &str, success: &str) -> OperationHandle {
        inner.next_id += 1;
        let id = format!("op-{}", inner.next_id);
        let statuses = inner
            .scripted
            .clone()
            .unwrap_or_else(|| vec![StackStatus::new(success)]);
        inner.operations.insert(
            id.clone(),
            PendingOperation {
                stack: stack.to_string(),
                statuses: statuses.into(),
                last: None,
            },
        );
        inner
            .stacks
            .insert(stack.to_string(), RemoteStackState::InProgress);
        OperationHandle {
            stack_name: stack.to_string(),
            id,
        }
    }
}

#[async_trait]
impl StackGateway for MemoryGateway {
    async fn validate_template(&self, identity: &StackIdentity, _text: &str) -> Result<()> {
        self.record(GatewayCall::ValidateTemplate {
            stack: identity.stack_name.clone(),
        })?;
        Ok(())
    }

    async fn describe_stack(&self, identity: &StackIdentity) -> Result<RemoteStackState> {
        let inner = self.record(GatewayCall::DescribeStack {
            stack: identity.stack_name.clone(),
        })?;
        Ok(inner
            .stacks
            .get(&identity.stack_name)
            .cloned()
            .unwrap_or(RemoteStackState::Absent))
    }

    async fn create_stack(
        &self,
        identity: &StackIdentity,
        text: &str,
        _capabilities: &[String],
    ) -> Result<OperationHandle> {
        let mut inner = self.record(GatewayCall::CreateStack {
            stack: identity.stack_name.clone(),
            template: text.to_string(),
        })?;
        Ok(Self::start_operation(&mut inner, &identity.stack_name, "CREATE_COMPLETE"))
    }

    async fn update_stack(
        &self,
        identity: &StackIdentity,
        text: &str,
        _capabilities: &[String],
    ) -> Result<Submission> {
        let mut inner = self.record(GatewayCall::UpdateStack {
            stack: identity.stack_name.clone(),
            template: text.to_string(),
        })?;
        if inner.no_changes {
            return Ok(Submission::NoChanges);
        }
        Ok(Submission::Started(Self::start_operation(
            &mut inner,
            &identity.stack_name,
            "UPDATE_COMPLETE",
        )))
    }

    async fn operation_status(&self, handle: &OperationHandle) -> Result<StackStatus> {
        let mut inner = self.record(GatewayCall::OperationStatus {
            id: handle.id.clone(),
        })?;
        let op = inner
            .operations
            .get_mut(&handle.id)
            .ok_or_else(|| Error::gateway(format!("Unknown operation {}", handle)))?;

        let status = match op.statuses.pop_front() {
            Some(next) => next,
            None => op
                .last
                .clone()
                .ok_or_else(|| Error::gateway(format!("No status scripted for {}", handle)))?,
        };
        op.last = Some(status.clone());
        let stack = op.stack.clone();

        if status.phase() != StatusPhase::InProgress {
            inner.stacks.insert(stack, status.classify());
        }
        Ok(status)
    }

    async fn update_function_code(
        &self,
        _identity: &StackIdentity,
        function_name: &str,
        bundle: &BundleRef,
    ) -> Result<()> {
        self.record(GatewayCall::UpdateFunctionCode {
            function_name: function_name.to_string(),
            bucket: bundle.bucket.clone(),
            key: bundle.key.clone(),
        })?;
        Ok(())
    }

    async fn upload_artifact(
        &self,
        _identity: &StackIdentity,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        self.record(GatewayCall::UploadArtifact {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: bytes.len(),
        })?;
        Ok(())
    }
}
