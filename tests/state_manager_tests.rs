//! Tests for the transaction state machine
//!
//! Covers every (state, action) pair against the transition table, plus the
//! sequences the transaction coordinators drive in practice.

use rsadapter::{Error, StateManager, TransactionAction, TransactionState};

use TransactionAction as A;
use TransactionState as S;

/// Legal transitions as (action, from, to); every other pair is illegal
const LEGAL: &[(TransactionAction, TransactionState, TransactionState)] = &[
    (A::XaStart, S::NoTransactionActive, S::GlobalTransactionActive),
    (A::XaEnd, S::GlobalTransactionActive, S::TransactionEnding),
    (A::XaEndFail, S::GlobalTransactionActive, S::TransactionFail),
    (A::XaEndFail, S::TransactionEnding, S::TransactionFail),
    (A::XaCommit, S::TransactionEnding, S::NoTransactionActive),
    (A::XaCommit, S::RecoveryInProgress, S::NoTransactionActive),
    (A::XaReadOnly, S::TransactionEnding, S::NoTransactionActive),
    (A::XaReadOnly, S::RecoveryInProgress, S::NoTransactionActive),
    (A::XaRollback, S::TransactionEnding, S::NoTransactionActive),
    (A::XaRollback, S::RecoveryInProgress, S::NoTransactionActive),
    (A::XaRollback, S::TransactionFail, S::TransactionFail),
    (A::LtBegin, S::NoTransactionActive, S::LocalTransactionActive),
    (A::LtCommit, S::LocalTransactionActive, S::NoTransactionActive),
    (A::LtRollback, S::LocalTransactionActive, S::NoTransactionActive),
    (A::Execute, S::LocalTransactionActive, S::LocalTransactionActive),
    (A::Execute, S::GlobalTransactionActive, S::GlobalTransactionActive),
];

/// Actions legal from every state, with their fixed target
const FROM_ANY: &[(TransactionAction, TransactionState)] = &[
    (A::XaRecover, S::RecoveryInProgress),
    (A::XaForget, S::NoTransactionActive),
    (A::McCleanup, S::NoTransactionActive),
    (A::HeuristicEnd, S::TransactionHeuristicEnd),
];

fn expected(state: TransactionState, action: TransactionAction) -> Option<TransactionState> {
    if let Some((_, to)) = FROM_ANY.iter().find(|(a, _)| *a == action) {
        return Some(*to);
    }
    LEGAL
        .iter()
        .find(|(a, from, _)| *a == action && *from == state)
        .map(|(_, _, to)| *to)
}

fn manager_in(state: TransactionState) -> StateManager {
    let mut mgr = StateManager::new();
    mgr.set_unconditionally(state);
    mgr
}

mod transition_table_tests {
    use super::*;

    #[test]
    fn test_every_pair_matches_table() {
        for state in TransactionState::ALL {
            for action in TransactionAction::ALL {
                let mut mgr = manager_in(state);
                let result = mgr.apply(action);

                match expected(state, action) {
                    Some(to) => {
                        assert!(result.is_ok(), "{} from {} should be legal", action, state);
                        assert_eq!(mgr.state(), to, "{} from {}", action, state);
                    }
                    None => {
                        let err = result.expect_err("illegal transition accepted");
                        assert!(err.is_illegal_transition());
                        assert_eq!(mgr.state(), state, "illegal {} changed state", action);
                    }
                }
            }
        }
    }

    #[test]
    fn test_check_valid_agrees_with_apply() {
        for state in TransactionState::ALL {
            for action in TransactionAction::ALL {
                let mgr = manager_in(state);
                assert_eq!(
                    mgr.check_valid(action).is_ok(),
                    expected(state, action).is_some(),
                    "{} from {}",
                    action,
                    state
                );
                assert_eq!(mgr.state(), state);
            }
        }
    }

    #[test]
    fn test_next_matches_table() {
        for state in TransactionState::ALL {
            for action in TransactionAction::ALL {
                assert_eq!(state.next(action), expected(state, action));
            }
        }
    }

    #[test]
    fn test_illegal_transition_error_names_action_and_state() {
        let mut mgr = StateManager::new();
        let err = mgr.apply(A::XaCommit).unwrap_err();
        match &err {
            Error::IllegalTransition { action, state } => {
                assert_eq!(*action, A::XaCommit);
                assert_eq!(*state, S::NoTransactionActive);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let msg = err.to_string();
        assert!(msg.contains("XA_COMMIT"));
        assert!(msg.contains("NO_TRANSACTION_ACTIVE"));
    }
}

mod progression_tests {
    use super::*;

    #[test]
    fn test_global_transaction_commit() {
        let mut mgr = StateManager::new();
        mgr.apply(A::XaStart).unwrap();
        mgr.apply(A::Execute).unwrap();
        assert_eq!(mgr.state(), S::GlobalTransactionActive);
        mgr.apply(A::XaEnd).unwrap();
        assert_eq!(mgr.state_name(), "TRANSACTION_ENDING");
        mgr.apply(A::XaCommit).unwrap();
        assert_eq!(mgr.state(), S::NoTransactionActive);
    }

    #[test]
    fn test_failed_branch_needs_cleanup() {
        let mut mgr = StateManager::new();
        mgr.apply(A::XaStart).unwrap();
        mgr.apply(A::XaEndFail).unwrap();
        mgr.apply(A::XaRollback).unwrap();
        assert_eq!(mgr.state(), S::TransactionFail);

        // Nothing new can start until the connection is cleaned up
        assert!(mgr.check_valid(A::XaStart).is_err());
        assert!(mgr.check_valid(A::LtBegin).is_err());
        mgr.apply(A::McCleanup).unwrap();
        mgr.apply(A::LtBegin).unwrap();
    }

    #[test]
    fn test_local_transaction_blocks_global_start() {
        let mut mgr = StateManager::new();
        mgr.apply(A::LtBegin).unwrap();
        assert!(mgr.apply(A::XaStart).is_err());
        assert!(mgr.apply(A::LtBegin).is_err());
        mgr.apply(A::LtRollback).unwrap();
        mgr.apply(A::XaStart).unwrap();
    }

    #[test]
    fn test_recovery_then_commit() {
        let mut mgr = StateManager::new();
        mgr.apply(A::XaRecover).unwrap();
        assert_eq!(mgr.state(), S::RecoveryInProgress);
        mgr.apply(A::XaCommit).unwrap();
        assert_eq!(mgr.state(), S::NoTransactionActive);
    }

    #[test]
    fn test_heuristic_end_then_forget() {
        let mut mgr = StateManager::new();
        mgr.apply(A::XaStart).unwrap();
        mgr.apply(A::HeuristicEnd).unwrap();
        assert_eq!(mgr.state(), S::TransactionHeuristicEnd);
        assert!(mgr.check_valid(A::Execute).is_err());
        mgr.apply(A::XaForget).unwrap();
        assert_eq!(mgr.state(), S::NoTransactionActive);
    }
}
