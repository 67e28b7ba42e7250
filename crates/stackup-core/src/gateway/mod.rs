//! Remote stack-management API
//!
//! `StackGateway` is the only seam between the lifecycle controller and the
//! outside world. `HttpGateway` speaks the JSON contract over `reqwest`;
//! `MemoryGateway` is a scripted stand-in used by tests and `--dry-run`.

pub mod http;
pub mod memory;

pub use http::HttpGateway;
pub use memory::{GatewayCall, MemoryGateway};

use crate::error::Result;
use crate::stack::{RemoteStackState, StackIdentity, StackStatus};
use async_trait::async_trait;
use std::fmt;

/// Opaque id of an accepted create/update
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationHandle {
    pub stack_name: String,
    pub id: String,
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.stack_name, self.id)
    }
}

/// Result of submitting an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Started(OperationHandle),
    /// The remote side found nothing to change
    NoChanges,
}

/// Location of an uploaded code bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRef {
    pub bucket: String,
    pub key: String,
}

#[async_trait]
pub trait StackGateway: Send + Sync {
    async fn validate_template(&self, identity: &StackIdentity, text: &str) -> Result<()>;

    async fn describe_stack(&self, identity: &StackIdentity) -> Result<RemoteStackState>;

    async fn create_stack(
        &self,
        identity: &StackIdentity,
        text: &str,
        capabilities: &[String],
    ) -> Result<OperationHandle>;

    async fn update_stack(
        &self,
        identity: &StackIdentity,
        text: &str,
        capabilities: &[String],
    ) -> Result<Submission>;

    /// One status read; looping is the caller's business
    async fn operation_status(&self, handle: &OperationHandle) -> Result<StackStatus>;

    async fn update_function_code(
        &self,
        identity: &StackIdentity,
        function_name: &str,
        bundle: &BundleRef,
    ) -> Result<()>;

    async fn upload_artifact(
        &self,
        identity: &StackIdentity,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<()>;
}
