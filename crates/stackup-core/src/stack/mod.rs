//! Stack lifecycle control
//!
//! This module provides:
//! - Classification of remote status into `RemoteStackState`
//! - The decision table mapping (operation, state) to an action
//! - Bounded polling with operator cancellation
//! - The controller that drives a compiled template through the gateway
//! - Single-unit code updates that bypass the stack entirely

pub mod controller;
pub mod decision;
pub mod poll;
pub mod state;
pub mod unit;

pub use controller::{write_atomic, LifecycleController, Outcome, StackRequest};
pub use decision::{decide, Action};
pub use poll::{CancelToken, LogSink, PollOutcome, PollPolicy, Poller, StatusSink};
pub use state::{RemoteStackState, StackStatus, StatusPhase};

use std::fmt;

/// Which stack to act on and with what credentials context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackIdentity {
    pub stack_name: String,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub role: Option<String>,
}

impl StackIdentity {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            region: None,
            profile: None,
            role: None,
        }
    }
}

impl fmt::Display for StackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stack_name)?;
        if let Some(region) = &self.region {
            write!(f, " ({})", region)?;
        }
        Ok(())
    }
}
