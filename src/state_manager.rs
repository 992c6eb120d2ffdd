//! Transaction state machine for a physical connection
//!
//! Every physical connection carries one [`StateManager`]. The transactional
//! coordinators consult it before and after each connection-level
//! begin/commit/rollback/XA call, so that the connection can never be driven
//! into an illegal sequence such as committing a global transaction that was
//! never ended.
//!
//! # Transitions
//!
//! | Action | Valid from | Next state |
//! |---|---|---|
//! | `XA_START` | `NO_TRANSACTION_ACTIVE` | `GLOBAL_TRANSACTION_ACTIVE` |
//! | `XA_END` | `GLOBAL_TRANSACTION_ACTIVE` | `TRANSACTION_ENDING` |
//! | `XA_END_FAIL` | `GLOBAL_TRANSACTION_ACTIVE`, `TRANSACTION_ENDING` | `TRANSACTION_FAIL` |
//! | `XA_COMMIT`, `XA_READONLY` | `TRANSACTION_ENDING`, `RECOVERY_IN_PROGRESS` | `NO_TRANSACTION_ACTIVE` |
//! | `XA_ROLLBACK` | `TRANSACTION_ENDING`, `RECOVERY_IN_PROGRESS` | `NO_TRANSACTION_ACTIVE` |
//! | `XA_ROLLBACK` | `TRANSACTION_FAIL` | `TRANSACTION_FAIL` |
//! | `XA_RECOVER` | any | `RECOVERY_IN_PROGRESS` |
//! | `XA_FORGET` | any | `NO_TRANSACTION_ACTIVE` |
//! | `LT_BEGIN` | `NO_TRANSACTION_ACTIVE` | `LOCAL_TRANSACTION_ACTIVE` |
//! | `LT_COMMIT`, `LT_ROLLBACK` | `LOCAL_TRANSACTION_ACTIVE` | `NO_TRANSACTION_ACTIVE` |
//! | `EXECUTE` | `LOCAL_TRANSACTION_ACTIVE`, `GLOBAL_TRANSACTION_ACTIVE` | unchanged |
//! | `MC_CLEANUP` | any | `NO_TRANSACTION_ACTIVE` |
//! | `HEURISTIC_END` | any | `TRANSACTION_HEURISTIC_END` |
//!
//! A rolled-back failed transaction stays in `TRANSACTION_FAIL` until the
//! connection is cleaned up.

use std::fmt;

use crate::error::{Error, Result};

/// Transaction state of a physical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionState {
    /// No transaction
    #[default]
    NoTransactionActive,
    /// Application-demarcated local transaction
    LocalTransactionActive,
    /// XA transaction branch started
    GlobalTransactionActive,
    /// XA branch ended, awaiting completion
    TransactionEnding,
    /// XA branch ended with failure
    TransactionFail,
    /// Completed heuristically
    TransactionHeuristicEnd,
    /// Transaction manager recovery scan in progress
    RecoveryInProgress,
}

impl TransactionState {
    /// All states
    pub const ALL: [TransactionState; 7] = [
        TransactionState::NoTransactionActive,
        TransactionState::LocalTransactionActive,
        TransactionState::GlobalTransactionActive,
        TransactionState::TransactionEnding,
        TransactionState::TransactionFail,
        TransactionState::TransactionHeuristicEnd,
        TransactionState::RecoveryInProgress,
    ];

    /// Diagnostic name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::NoTransactionActive => "NO_TRANSACTION_ACTIVE",
            TransactionState::LocalTransactionActive => "LOCAL_TRANSACTION_ACTIVE",
            TransactionState::GlobalTransactionActive => "GLOBAL_TRANSACTION_ACTIVE",
            TransactionState::TransactionEnding => "TRANSACTION_ENDING",
            TransactionState::TransactionFail => "TRANSACTION_FAIL",
            TransactionState::TransactionHeuristicEnd => "TRANSACTION_HEURISTIC_END",
            TransactionState::RecoveryInProgress => "RECOVERY_IN_PROGRESS",
        }
    }

    /// State reached by applying `action`, or `None` if the action is illegal here
    pub fn next(self, action: TransactionAction) -> Option<TransactionState> {
        use TransactionAction as A;
        use TransactionState as S;

        match (action, self) {
            (A::XaStart, S::NoTransactionActive) => Some(S::GlobalTransactionActive),
            (A::XaEnd, S::GlobalTransactionActive) => Some(S::TransactionEnding),
            (A::XaEndFail, S::GlobalTransactionActive | S::TransactionEnding) => {
                Some(S::TransactionFail)
            }
            (
                A::XaCommit | A::XaReadOnly | A::XaRollback,
                S::TransactionEnding | S::RecoveryInProgress,
            ) => Some(S::NoTransactionActive),
            (A::XaRollback, S::TransactionFail) => Some(S::TransactionFail),
            (A::XaRecover, _) => Some(S::RecoveryInProgress),
            (A::XaForget, _) => Some(S::NoTransactionActive),
            (A::LtBegin, S::NoTransactionActive) => Some(S::LocalTransactionActive),
            (A::LtCommit | A::LtRollback, S::LocalTransactionActive) => {
                Some(S::NoTransactionActive)
            }
            (A::Execute, S::LocalTransactionActive | S::GlobalTransactionActive) => Some(self),
            (A::McCleanup, _) => Some(S::NoTransactionActive),
            (A::HeuristicEnd, _) => Some(S::TransactionHeuristicEnd),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions that drive the transaction state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionAction {
    /// Begin a local transaction
    LtBegin,
    /// Commit a local transaction
    LtCommit,
    /// Roll back a local transaction
    LtRollback,
    /// Start an XA branch
    XaStart,
    /// End an XA branch successfully
    XaEnd,
    /// End an XA branch with failure
    XaEndFail,
    /// Commit an XA branch
    XaCommit,
    /// Roll back an XA branch
    XaRollback,
    /// Recovery scan
    XaRecover,
    /// Forget a heuristically completed branch
    XaForget,
    /// Run work on the connection
    Execute,
    /// Managed connection cleanup
    McCleanup,
    /// Heuristic completion
    HeuristicEnd,
    /// Branch voted read-only
    XaReadOnly,
}

impl TransactionAction {
    /// All actions
    pub const ALL: [TransactionAction; 14] = [
        TransactionAction::LtBegin,
        TransactionAction::LtCommit,
        TransactionAction::LtRollback,
        TransactionAction::XaStart,
        TransactionAction::XaEnd,
        TransactionAction::XaEndFail,
        TransactionAction::XaCommit,
        TransactionAction::XaRollback,
        TransactionAction::XaRecover,
        TransactionAction::XaForget,
        TransactionAction::Execute,
        TransactionAction::McCleanup,
        TransactionAction::HeuristicEnd,
        TransactionAction::XaReadOnly,
    ];

    /// Diagnostic name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionAction::LtBegin => "LT_BEGIN",
            TransactionAction::LtCommit => "LT_COMMIT",
            TransactionAction::LtRollback => "LT_ROLLBACK",
            TransactionAction::XaStart => "XA_START",
            TransactionAction::XaEnd => "XA_END",
            TransactionAction::XaEndFail => "XA_END_FAIL",
            TransactionAction::XaCommit => "XA_COMMIT",
            TransactionAction::XaRollback => "XA_ROLLBACK",
            TransactionAction::XaRecover => "XA_RECOVER",
            TransactionAction::XaForget => "XA_FORGET",
            TransactionAction::Execute => "EXECUTE",
            TransactionAction::McCleanup => "MC_CLEANUP",
            TransactionAction::HeuristicEnd => "HEURISTIC_END",
            TransactionAction::XaReadOnly => "XA_READONLY",
        }
    }
}

impl fmt::Display for TransactionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guard for the transaction state of one physical connection
///
/// Not synchronized; the owning connection serializes access.
#[derive(Debug, Clone, Default)]
pub struct StateManager {
    state: TransactionState,
}

impl StateManager {
    /// Create a state manager in `NO_TRANSACTION_ACTIVE`
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and perform a transition
    ///
    /// The state is left untouched when the transition is illegal.
    pub fn apply(&mut self, action: TransactionAction) -> Result<()> {
        let next = self.validate(action)?;
        if next != self.state {
            tracing::trace!(
                action = action.as_str(),
                from = self.state.as_str(),
                to = next.as_str(),
                "Transaction state transition"
            );
        }
        self.state = next;
        Ok(())
    }

    /// Validate a transition without performing it
    pub fn check_valid(&self, action: TransactionAction) -> Result<()> {
        self.validate(action).map(|_| ())
    }

    /// Current state
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Diagnostic name of the current state
    pub fn state_name(&self) -> &'static str {
        self.state.as_str()
    }

    /// Overwrite the state without validation
    ///
    /// Only for reassociating a connection handle with a managed connection.
    pub fn set_unconditionally(&mut self, state: TransactionState) {
        tracing::debug!(
            from = self.state.as_str(),
            to = state.as_str(),
            "Transaction state set without validation"
        );
        self.state = state;
    }

    fn validate(&self, action: TransactionAction) -> Result<TransactionState> {
        self.state.next(action).ok_or_else(|| {
            tracing::debug!(
                action = action.as_str(),
                state = self.state.as_str(),
                "Rejected transaction state transition"
            );
            Error::IllegalTransition {
                action,
                state: self.state,
            }
        })
    }
}
