//! Bounded polling of an issued stack operation
//!
//! The poller reads status at a fixed interval until a terminal status, the
//! wait budget runs out, or the operator interrupts. Interrupting detaches:
//! the remote operation keeps running and nothing is sent to the gateway.

use super::state::{StackStatus, StatusPhase};
use crate::error::{Error, Result};
use crate::gateway::{OperationHandle, StackGateway};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Longest single sleep between cancellation checks
const SLEEP_SLICE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(1800))
    }
}

/// Operator interrupt flag shared with the Ctrl+C handler
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    signals: Arc<AtomicU8>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one interrupt and return how many have been seen
    pub fn signal(&self) -> u8 {
        self.signals.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    pub fn cancel(&self) {
        self.signal();
    }

    pub fn is_cancelled(&self) -> bool {
        self.signals.load(Ordering::SeqCst) > 0
    }
}

/// Receives every observed status change
pub trait StatusSink: Send {
    fn status_changed(&mut self, stack: &str, status: &StackStatus);
}

impl<F> StatusSink for F
where
    F: FnMut(&str, &StackStatus) + Send,
{
    fn status_changed(&mut self, stack: &str, status: &StackStatus) {
        self(stack, status)
    }
}

/// Sink that only logs
#[derive(Debug, Default)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn status_changed(&mut self, stack: &str, status: &StackStatus) {
        tracing::info!(stack, status = %status, "Stack status changed");
    }
}

/// How polling ended without an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed(StackStatus),
    /// Interrupted by the operator; carries the last status seen
    Detached(Option<StackStatus>),
}

pub struct Poller<'a> {
    gateway: &'a dyn StackGateway,
    policy: PollPolicy,
    cancel: CancelToken,
}

impl<'a> Poller<'a> {
    pub fn new(gateway: &'a dyn StackGateway, policy: PollPolicy, cancel: CancelToken) -> Self {
        Self {
            gateway,
            policy,
            cancel,
        }
    }

    pub async fn wait(
        &self,
        handle: &OperationHandle,
        sink: &mut dyn StatusSink,
    ) -> Result<PollOutcome> {
        let started = Instant::now();
        let stack = handle.stack_name.as_str();
        let mut last: Option<StackStatus> = None;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(stack, "Polling interrupted, operation left running");
                return Ok(PollOutcome::Detached(last));
            }

            // a stalled read must not outlive the budget or an interrupt
            let deadline = started + self.policy.max_wait;
            let status = tokio::select! {
                read = self.gateway.operation_status(handle) => read?,
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(Error::PollTimeout {
                        stack: stack.to_string(),
                        last: last.map(|s| s.to_string()).unwrap_or_default(),
                    });
                }
                _ = self.cancelled() => {
                    tracing::info!(stack, "Polling interrupted, operation left running");
                    return Ok(PollOutcome::Detached(last));
                }
            };
            if last.as_ref() != Some(&status) {
                sink.status_changed(stack, &status);
            }

            match status.phase() {
                StatusPhase::Succeeded => return Ok(PollOutcome::Completed(status)),
                StatusPhase::Failed => {
                    return Err(Error::StackOperationFailed {
                        stack: stack.to_string(),
                        reason: status.failure_reason(),
                        status: status.status,
                    })
                }
                StatusPhase::InProgress => {}
            }
            last = Some(status);

            if started.elapsed() >= self.policy.max_wait {
                return Err(Error::PollTimeout {
                    stack: stack.to_string(),
                    last: last.map(|s| s.to_string()).unwrap_or_default(),
                });
            }

            self.sleep_interval().await;
        }
    }

    /// Resolves once the operator has interrupted
    async fn cancelled(&self) {
        while !self.cancel.is_cancelled() {
            tokio::time::sleep(SLEEP_SLICE).await;
        }
    }

    /// Sleep one interval in short slices so an interrupt is noticed promptly
    async fn sleep_interval(&self) {
        let deadline = Instant::now() + self.policy.interval;
        loop {
            let now = Instant::now();
            if now >= deadline || self.cancel.is_cancelled() {
                return;
            }
            tokio::time::sleep((deadline - now).min(SLEEP_SLICE)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use crate::stack::StackIdentity;

    fn fast() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), Duration::from_secs(5))
    }

    async fn start(gw: &MemoryGateway) -> OperationHandle {
        gw.create_stack(&StackIdentity::new("orders"), "t", &[]).await.unwrap()
    }

    #[tokio::test]
    async fn test_reports_each_change_once() {
        let gw = MemoryGateway::new().with_statuses([
            "CREATE_IN_PROGRESS",
            "CREATE_IN_PROGRESS",
            "CREATE_COMPLETE",
        ]);
        let handle = start(&gw).await;
        let mut seen = Vec::new();
        let mut sink = |_: &str, s: &StackStatus| seen.push(s.status.clone());

        let outcome = Poller::new(&gw, fast(), CancelToken::new())
            .wait(&handle, &mut sink)
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Completed(StackStatus::new("CREATE_COMPLETE")));
        assert_eq!(seen, vec!["CREATE_IN_PROGRESS", "CREATE_COMPLETE"]);
    }

    #[tokio::test]
    async fn test_terminal_failure() {
        let gw = MemoryGateway::new().with_status_list(vec![
            StackStatus::new("CREATE_IN_PROGRESS"),
            StackStatus::with_reason("ROLLBACK_COMPLETE", "Bucket name taken"),
        ]);
        let handle = start(&gw).await;
        let err = Poller::new(&gw, fast(), CancelToken::new())
            .wait(&handle, &mut LogSink)
            .await
            .unwrap_err();
        match err {
            Error::StackOperationFailed { status, reason, .. } => {
                assert_eq!(status, "ROLLBACK_COMPLETE");
                assert_eq!(reason, "Bucket name taken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_reports_last_status() {
        let gw = MemoryGateway::new().with_statuses(["UPDATE_IN_PROGRESS"]);
        let handle = start(&gw).await;
        let policy = PollPolicy::new(Duration::from_millis(5), Duration::from_millis(20));
        let err = Poller::new(&gw, policy, CancelToken::new())
            .wait(&handle, &mut LogSink)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PollTimeout { last, .. } if last == "UPDATE_IN_PROGRESS"));
    }

    #[tokio::test]
    async fn test_cancel_detaches_without_more_calls() {
        let gw = MemoryGateway::new().with_statuses(["CREATE_IN_PROGRESS"]);
        let handle = start(&gw).await;
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut sink = move |_: &str, _: &StackStatus| trigger.cancel();

        let outcome = Poller::new(&gw, fast(), cancel)
            .wait(&handle, &mut sink)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Detached(Some(StackStatus::new("CREATE_IN_PROGRESS")))
        );
        let status_reads = gw
            .calls()
            .iter()
            .filter(|c| c.method() == "operation_status")
            .count();
        assert_eq!(status_reads, 1);
    }

    /// Gateway whose status reads never answer
    struct StalledGateway;

    #[async_trait::async_trait]
    impl StackGateway for StalledGateway {
        async fn validate_template(&self, _: &StackIdentity, _: &str) -> Result<()> {
            Ok(())
        }
        async fn describe_stack(&self, _: &StackIdentity) -> Result<crate::stack::RemoteStackState> {
            Ok(crate::stack::RemoteStackState::Absent)
        }
        async fn create_stack(
            &self,
            identity: &StackIdentity,
            _: &str,
            _: &[String],
        ) -> Result<OperationHandle> {
            Ok(OperationHandle {
                stack_name: identity.stack_name.clone(),
                id: "op-1".into(),
            })
        }
        async fn update_stack(
            &self,
            _: &StackIdentity,
            _: &str,
            _: &[String],
        ) -> Result<crate::gateway::Submission> {
            Ok(crate::gateway::Submission::NoChanges)
        }
        async fn operation_status(&self, _: &OperationHandle) -> Result<StackStatus> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(StackStatus::new("CREATE_COMPLETE"))
        }
        async fn update_function_code(
            &self,
            _: &StackIdentity,
            _: &str,
            _: &crate::gateway::BundleRef,
        ) -> Result<()> {
            Ok(())
        }
        async fn upload_artifact(&self, _: &StackIdentity, _: &str, _: &str, _: Vec<u8>) -> Result<()> {
            Ok(())
        }
    }

    fn stalled_handle() -> OperationHandle {
        OperationHandle {
            stack_name: "orders".into(),
            id: "op-1".into(),
        }
    }

    #[tokio::test]
    async fn test_stalled_read_times_out() {
        let policy = PollPolicy::new(Duration::from_millis(5), Duration::from_millis(50));
        let waited = tokio::time::timeout(
            Duration::from_secs(2),
            Poller::new(&StalledGateway, policy, CancelToken::new())
                .wait(&stalled_handle(), &mut LogSink),
        )
        .await
        .expect("poller must give up on its own");
        assert!(matches!(waited, Err(Error::PollTimeout { ref last, .. }) if last.is_empty()));
    }

    #[tokio::test]
    async fn test_stalled_read_detaches_on_interrupt() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.signal();
        });

        let waited = tokio::time::timeout(
            Duration::from_secs(2),
            Poller::new(&StalledGateway, PollPolicy::default(), cancel)
                .wait(&stalled_handle(), &mut LogSink),
        )
        .await
        .expect("interrupt must detach");
        assert_eq!(waited.unwrap(), PollOutcome::Detached(None));
    }

    #[test]
    fn test_signal_counts() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.signal(), 1);
        assert_eq!(token.clone().signal(), 2);
        assert!(token.is_cancelled());
    }
}
