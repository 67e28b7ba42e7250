//! The lifecycle decision table

use super::state::RemoteStackState;
use crate::error::{Error, Result};
use crate::options::Operation;

/// What the controller does after consulting remote state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Remote validate only
    ValidateOnly,
    /// Write the compiled template locally, no remote call
    CompileOnly,
    Create,
    Update,
    /// Replace one function's code, stack untouched
    UpdateUnit,
}

/// Whether `op` needs a `describe_stack` before `decide`
pub fn needs_remote_state(op: &Operation) -> bool {
    matches!(
        op,
        Operation::Create | Operation::Update | Operation::Upsert | Operation::Deploy
    )
}

/// Map an operation and the live stack state to an action.
/// `state` is ignored for operations that never query it.
pub fn decide(op: &Operation, state: &RemoteStackState, stack: &str) -> Result<Action> {
    let busy = || Error::StackBusy {
        stack: stack.to_string(),
        state: state.clone(),
    };

    let mutating = match op {
        Operation::Validate => return Ok(Action::ValidateOnly),
        Operation::Compile => return Ok(Action::CompileOnly),
        Operation::UpdateUnit(_) => return Ok(Action::UpdateUnit),
        mutating => mutating,
    };

    if let RemoteStackState::Failed { reason } = state {
        return Err(Error::StackInFailedState {
            stack: stack.to_string(),
            state: state.clone(),
            reason: reason.clone(),
        });
    }

    match (mutating, state) {
        (Operation::Create, RemoteStackState::Absent) => Ok(Action::Create),
        (Operation::Create, _) => Err(Error::StackAlreadyExists {
            stack: stack.to_string(),
            state: state.clone(),
        }),

        (Operation::Update, RemoteStackState::Exists) => Ok(Action::Update),
        (Operation::Update, RemoteStackState::Absent) => Err(Error::StackNotFound {
            stack: stack.to_string(),
            state: state.clone(),
        }),

        (_, RemoteStackState::Absent) => Ok(Action::Create),
        (_, RemoteStackState::Exists) => Ok(Action::Update),
        (_, _) => Err(busy()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed() -> RemoteStackState {
        RemoteStackState::Failed {
            reason: "The following resource(s) failed to create: [Bucket]".into(),
        }
    }

    fn all_states() -> Vec<RemoteStackState> {
        vec![
            RemoteStackState::Absent,
            RemoteStackState::Exists,
            RemoteStackState::InProgress,
            failed(),
        ]
    }

    #[test]
    fn test_non_mutating_ignore_state() {
        for state in all_states() {
            assert_eq!(decide(&Operation::Validate, &state, "s").unwrap(), Action::ValidateOnly);
            assert_eq!(decide(&Operation::Compile, &state, "s").unwrap(), Action::CompileOnly);
        }
        assert!(!needs_remote_state(&Operation::Validate));
        assert!(!needs_remote_state(&Operation::Compile));
        assert!(!needs_remote_state(&Operation::UpdateUnit("api".into())));
    }

    #[test]
    fn test_create_row() {
        assert_eq!(
            decide(&Operation::Create, &RemoteStackState::Absent, "s").unwrap(),
            Action::Create
        );
        for state in [RemoteStackState::Exists, RemoteStackState::InProgress] {
            let err = decide(&Operation::Create, &state, "s").unwrap_err();
            assert!(matches!(err, Error::StackAlreadyExists { .. }));
        }
    }

    #[test]
    fn test_update_row() {
        assert_eq!(
            decide(&Operation::Update, &RemoteStackState::Exists, "s").unwrap(),
            Action::Update
        );
        assert!(matches!(
            decide(&Operation::Update, &RemoteStackState::Absent, "s").unwrap_err(),
            Error::StackNotFound { .. }
        ));
        assert!(matches!(
            decide(&Operation::Update, &RemoteStackState::InProgress, "s").unwrap_err(),
            Error::StackBusy { .. }
        ));
    }

    #[test]
    fn test_upsert_and_deploy_rows() {
        for op in [Operation::Upsert, Operation::Deploy] {
            assert_eq!(decide(&op, &RemoteStackState::Absent, "s").unwrap(), Action::Create);
            assert_eq!(decide(&op, &RemoteStackState::Exists, "s").unwrap(), Action::Update);
            assert!(matches!(
                decide(&op, &RemoteStackState::InProgress, "s").unwrap_err(),
                Error::StackBusy { .. }
            ));
        }
    }

    #[test]
    fn test_failed_state_carries_remote_reason() {
        for op in [
            Operation::Create,
            Operation::Update,
            Operation::Upsert,
            Operation::Deploy,
        ] {
            match decide(&op, &failed(), "orders").unwrap_err() {
                Error::StackInFailedState {
                    stack,
                    state,
                    reason,
                } => {
                    assert_eq!(stack, "orders");
                    assert_eq!(state, failed());
                    assert_eq!(reason, "The following resource(s) failed to create: [Bucket]");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn test_deterministic() {
        for state in all_states() {
            let a = format!("{:?}", decide(&Operation::Deploy, &state, "s"));
            let b = format!("{:?}", decide(&Operation::Deploy, &state, "s"));
            assert_eq!(a, b);
        }
    }
}
