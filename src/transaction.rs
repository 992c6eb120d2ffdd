//! Transaction coordinators
//!
//! [`LocalTransaction`] handles application-demarcated local transactions.
//! [`OnePhaseXaResource`] lets a transaction manager drive a connection without
//! XA support as the single one-phase participant of a global transaction.
//! Both validate every step against the connection's transaction state
//! machine and only record the new state once the driver call has succeeded.

use std::fmt;

use crate::connection::PhysicalConnection;
use crate::error::{Error, Result};
use crate::managed_connection::{ManagedConnection, ManagedInner};
use crate::state_manager::{TransactionAction, TransactionState};

/// Global transaction branch identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Xid {
    /// Format identifier
    pub format_id: i32,
    /// Global transaction id
    pub gtrid: Vec<u8>,
    /// Branch qualifier
    pub bqual: Vec<u8>,
}

impl Xid {
    /// Create an xid
    pub fn new(format_id: i32, gtrid: impl Into<Vec<u8>>, bqual: impl Into<Vec<u8>>) -> Self {
        Self {
            format_id,
            gtrid: gtrid.into(),
            bqual: bqual.into(),
        }
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for b in bytes {
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.format_id)?;
        write_hex(f, &self.gtrid)?;
        f.write_str(":")?;
        write_hex(f, &self.bqual)
    }
}

/// Flags for [`OnePhaseXaResource::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFlag {
    /// Start a new branch
    NoFlags,
    /// Join the active branch
    Join,
    /// Resume a suspended branch
    Resume,
}

/// Flags for [`OnePhaseXaResource::end`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndFlag {
    /// Work completed successfully
    Success,
    /// Work failed; the branch can only be rolled back
    Fail,
    /// Work suspended, to be resumed later
    Suspend,
}

/// Application-demarcated local transaction on a managed connection
pub struct LocalTransaction<C: PhysicalConnection> {
    mc: ManagedConnection<C>,
}

impl<C: PhysicalConnection> LocalTransaction<C> {
    pub(crate) fn new(mc: ManagedConnection<C>) -> Self {
        Self { mc }
    }

    /// Begin a local transaction, switching auto-commit off
    pub async fn begin(&self) -> Result<()> {
        let mut inner = self.mc.lock().await;
        inner.conn()?;
        inner.state.check_valid(TransactionAction::LtBegin)?;
        if inner.auto_commit() {
            tracing::debug!("Auto-commit is on, switching off for local transaction");
            inner.set_auto_commit(false).await?;
        }
        inner.state.apply(TransactionAction::LtBegin)
    }

    /// Commit the local transaction
    pub async fn commit(&self) -> Result<()> {
        let mut inner = self.mc.lock().await;
        inner.conn()?;
        inner.state.check_valid(TransactionAction::LtCommit)?;
        // No work may have been done yet, and some drivers refuse commit under auto-commit.
        if !inner.auto_commit() {
            inner.conn()?.commit().await?;
        }
        inner.state.apply(TransactionAction::LtCommit)
    }

    /// Roll back the local transaction
    pub async fn rollback(&self) -> Result<()> {
        let mut inner = self.mc.lock().await;
        inner.conn()?;
        inner.state.check_valid(TransactionAction::LtRollback)?;
        if !inner.auto_commit() {
            inner.conn()?.rollback().await?;
        }
        inner.state.apply(TransactionAction::LtRollback)
    }
}

/// One-phase XA participant wrapping a non-XA connection
///
/// Only one branch is associated at a time, and two-phase commit is refused
/// with [`Error::TwoPhaseNotSupported`].
pub struct OnePhaseXaResource<C: PhysicalConnection> {
    mc: ManagedConnection<C>,
}

impl<C: PhysicalConnection> OnePhaseXaResource<C> {
    pub(crate) fn new(mc: ManagedConnection<C>) -> Self {
        Self { mc }
    }

    /// Associate the connection with a transaction branch
    pub async fn start(&self, xid: &Xid, flag: StartFlag) -> Result<()> {
        let mut inner = self.mc.lock().await;
        inner.conn()?;

        match flag {
            StartFlag::NoFlags => {
                inner.state.check_valid(TransactionAction::XaStart)?;
                if inner.auto_commit() {
                    inner.set_auto_commit(false).await?;
                }
                inner.state.apply(TransactionAction::XaStart)?;
                inner.xid = Some(xid.clone());
                tracing::debug!(xid = %xid, "Global transaction branch started");
                Ok(())
            }
            StartFlag::Join | StartFlag::Resume => {
                if inner.xid.as_ref() == Some(xid)
                    && inner.state.state() == TransactionState::GlobalTransactionActive
                {
                    tracing::trace!(xid = %xid, flag = ?flag, "Rejoined active branch");
                    Ok(())
                } else {
                    Err(Error::XaProtocol(format!(
                        "cannot {:?} branch {}: not the active branch",
                        flag, xid
                    )))
                }
            }
        }
    }

    /// Dissociate the connection from its branch
    pub async fn end(&self, xid: &Xid, flag: EndFlag) -> Result<()> {
        let mut inner = self.mc.lock().await;
        inner.conn()?;
        check_xid(&inner, xid)?;

        match flag {
            EndFlag::Success => inner.state.apply(TransactionAction::XaEnd),
            EndFlag::Fail => inner.state.apply(TransactionAction::XaEndFail),
            EndFlag::Suspend => {
                tracing::trace!(xid = %xid, "Branch suspended");
                Ok(())
            }
        }
    }

    /// Commit the branch; only one-phase commit is supported
    pub async fn commit(&self, xid: &Xid, one_phase: bool) -> Result<()> {
        if !one_phase {
            return Err(Error::TwoPhaseNotSupported);
        }

        let mut inner = self.mc.lock().await;
        inner.conn()?;
        check_xid(&inner, xid)?;
        inner.state.check_valid(TransactionAction::XaCommit)?;
        inner.conn()?.commit().await?;
        inner.state.apply(TransactionAction::XaCommit)?;
        tracing::debug!(xid = %xid, "Global transaction branch committed");
        complete(&mut inner).await
    }

    /// Roll back the branch
    ///
    /// A branch that ended with [`EndFlag::Fail`] stays in
    /// [`TransactionState::TransactionFail`] until the connection is cleaned
    /// up.
    pub async fn rollback(&self, xid: &Xid) -> Result<()> {
        let mut inner = self.mc.lock().await;
        inner.conn()?;
        check_xid(&inner, xid)?;
        inner.state.check_valid(TransactionAction::XaRollback)?;

        if inner.state.state() == TransactionState::TransactionFail {
            if let Err(e) = inner.conn()?.rollback().await {
                tracing::warn!(error = %e, xid = %xid, "Rollback of failed branch did not complete");
            }
            // The branch stays associated until cleanup so a repeated rollback succeeds.
            inner.state.apply(TransactionAction::XaRollback)?;
            return inner.restore_auto_commit().await;
        }

        inner.conn()?.rollback().await?;
        inner.state.apply(TransactionAction::XaRollback)?;
        tracing::debug!(xid = %xid, "Global transaction branch rolled back");
        complete(&mut inner).await
    }

    /// Always fails: a one-phase resource cannot prepare
    pub async fn prepare(&self, _xid: &Xid) -> Result<()> {
        Err(Error::TwoPhaseNotSupported)
    }

    /// Start a recovery scan
    ///
    /// A one-phase resource never has prepared branches, so the list is empty.
    /// While the scan is in progress, `commit` and `rollback` accept any xid.
    pub async fn recover(&self) -> Result<Vec<Xid>> {
        let mut inner = self.mc.lock().await;
        inner.state.apply(TransactionAction::XaRecover)?;
        Ok(Vec::new())
    }

    /// Forget a heuristically completed branch
    pub async fn forget(&self, xid: &Xid) -> Result<()> {
        let mut inner = self.mc.lock().await;
        inner.state.apply(TransactionAction::XaForget)?;
        if inner.xid.as_ref() == Some(xid) {
            inner.xid = None;
        }
        Ok(())
    }

    /// Record that the branch completed heuristically
    pub async fn heuristic_end(&self) -> Result<()> {
        let mut inner = self.mc.lock().await;
        tracing::warn!(xid = ?inner.xid, "Branch completed heuristically");
        inner.state.apply(TransactionAction::HeuristicEnd)
    }
}

fn check_xid<C: PhysicalConnection>(inner: &ManagedInner<C>, xid: &Xid) -> Result<()> {
    // Branches completed during a recovery scan were never started here.
    if inner.state.state() == TransactionState::RecoveryInProgress {
        return Ok(());
    }
    match &inner.xid {
        Some(active) if active == xid => Ok(()),
        Some(active) => Err(Error::XaProtocol(format!(
            "branch {} is not associated with this connection (active branch {})",
            xid, active
        ))),
        None => Err(Error::XaProtocol(format!(
            "branch {} is not associated with this connection",
            xid
        ))),
    }
}

async fn complete<C: PhysicalConnection>(inner: &mut ManagedInner<C>) -> Result<()> {
    inner.xid = None;
    inner.restore_auto_commit().await
}
