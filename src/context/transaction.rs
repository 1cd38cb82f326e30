/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use crate::error::{PersistError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::*;

pub type TransactionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    MarkedRollback,
    Committed,
    RolledBack,
    /// unknown id, or one that already finished
    NoTransaction,
}

/// Decides the fate of transactions.  A Context asks it before committing its connection, and
/// rolls the connection back if the answer is no.
pub trait TransactionManager: Send + Sync {
    fn begin(&self) -> Result<TransactionId>;
    /// Fails, having rolled the transaction back, if it was marked rollback-only or timed out.
    fn commit(&self, tx: TransactionId) -> Result<()>;
    fn rollback(&self, tx: TransactionId) -> Result<()>;
    fn set_rollback_only(&self, tx: TransactionId) -> Result<()>;
    fn get_status(&self, tx: TransactionId) -> TransactionStatus;
    /// Applies to transactions begun after the call.
    fn set_transaction_timeout(&self, timeout: Duration);
}

struct TransactionState {
    status: TransactionStatus,
    started: Instant,
    timeout: Duration,
}

/// Keeps transaction state in memory, for a single process.
pub struct LocalTransactionManager {
    next_id: AtomicU64,
    timeout: Mutex<Duration>,
    transactions: Mutex<HashMap<TransactionId, TransactionState>>,
}

impl LocalTransactionManager {
    pub fn new(timeout: Duration) -> LocalTransactionManager {
        LocalTransactionManager {
            next_id: AtomicU64::new(1),
            timeout: Mutex::new(timeout),
            transactions: Mutex::new(HashMap::new()),
        }
    }

    fn unknown(tx: TransactionId) -> PersistError {
        PersistError::context(format!("Transaction {} is not active", tx))
    }
}

impl TransactionManager for LocalTransactionManager {
    fn begin(&self) -> Result<TransactionId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let timeout = *self.timeout.lock();
        self.transactions.lock().insert(
            id,
            TransactionState {
                status: TransactionStatus::Active,
                started: Instant::now(),
                timeout,
            },
        );
        debug!("Began transaction {}.", id);
        Ok(id)
    }

    fn commit(&self, tx: TransactionId) -> Result<()> {
        let state = self.transactions.lock().remove(&tx).ok_or_else(|| Self::unknown(tx))?;
        if state.status == TransactionStatus::MarkedRollback {
            return Err(PersistError::execution(format!(
                "Transaction {} was marked rollback-only; rolled back",
                tx
            )));
        }
        if state.started.elapsed() > state.timeout {
            return Err(PersistError::execution(format!(
                "Transaction {} timed out after {:?}; rolled back",
                tx, state.timeout
            )));
        }
        debug!("Committed transaction {}.", tx);
        Ok(())
    }

    fn rollback(&self, tx: TransactionId) -> Result<()> {
        self.transactions.lock().remove(&tx).ok_or_else(|| Self::unknown(tx))?;
        debug!("Rolled back transaction {}.", tx);
        Ok(())
    }

    fn set_rollback_only(&self, tx: TransactionId) -> Result<()> {
        let mut transactions = self.transactions.lock();
        let state = transactions.get_mut(&tx).ok_or_else(|| Self::unknown(tx))?;
        state.status = TransactionStatus::MarkedRollback;
        Ok(())
    }

    fn get_status(&self, tx: TransactionId) -> TransactionStatus {
        self.transactions
            .lock()
            .get(&tx)
            .map(|s| s.status)
            .unwrap_or(TransactionStatus::NoTransaction)
    }

    fn set_transaction_timeout(&self, timeout: Duration) {
        *self.timeout.lock() = timeout;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_commit_and_rollback() {
        let tm = LocalTransactionManager::new(Duration::from_secs(60));
        let a = tm.begin().unwrap();
        let b = tm.begin().unwrap();
        assert_ne!(a, b);
        assert_eq!(tm.get_status(a), TransactionStatus::Active);
        tm.commit(a).unwrap();
        assert_eq!(tm.get_status(a), TransactionStatus::NoTransaction);
        assert!(tm.commit(a).is_err());
        tm.rollback(b).unwrap();
        assert!(tm.rollback(b).is_err());
    }

    #[test]
    fn test_rollback_only_refuses_commit() {
        let tm = LocalTransactionManager::new(Duration::from_secs(60));
        let tx = tm.begin().unwrap();
        tm.set_rollback_only(tx).unwrap();
        assert_eq!(tm.get_status(tx), TransactionStatus::MarkedRollback);
        let e = tm.commit(tx).unwrap_err();
        assert!(e.is_kind(ErrorKind::Execution));
        assert_eq!(tm.get_status(tx), TransactionStatus::NoTransaction);
    }

    #[test]
    fn test_timeout_is_checked_at_commit() {
        let tm = LocalTransactionManager::new(Duration::from_secs(60));
        tm.set_transaction_timeout(Duration::from_millis(1));
        let tx = tm.begin().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let e = tm.commit(tx).unwrap_err();
        assert!(e.get_message().contains("timed out"));
    }
}
