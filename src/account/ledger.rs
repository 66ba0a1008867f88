//! Balance ledger: atomic per-account credit/debit

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use rust_decimal::Decimal;

use super::store::AccountStore;
use super::types::{Account, AccountId};
use crate::error::ServiceError;

/// Upper bound on waiting for an account row. A caller that cannot get the
/// lock in time fails with `Busy` instead of blocking the request forever.
const LOCK_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) fn lock_row<T>(row: &Mutex<T>) -> Result<MutexGuard<'_, T>, ServiceError> {
    let deadline = Instant::now() + LOCK_TIMEOUT;
    loop {
        match row.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return Err(ServiceError::Busy);
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(TryLockError::Poisoned(_)) => return Err(ServiceError::Busy),
        }
    }
}

/// Authoritative record of spendable balances. Operations on one account
/// are linearized by its row mutex; different accounts run in parallel.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<AccountStore>,
}

impl Ledger {
    pub fn new(store: Arc<AccountStore>) -> Self {
        Self { store }
    }

    /// Run a closure against a draft of the locked account row. The draft
    /// only replaces the live row after it has been persisted, so a failed
    /// write leaves the row untouched (all-or-nothing per call).
    pub(crate) fn with_account<T>(
        &self,
        id: AccountId,
        f: impl FnOnce(&mut Account) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let row = self
            .store
            .entry(id)
            .ok_or_else(|| ServiceError::not_found("account"))?;
        let mut account = lock_row(&row)?;

        let mut draft = account.clone();
        let result = f(&mut draft)?;
        self.store.persist(&draft)?;
        *account = draft;
        Ok(result)
    }

    /// Increase the balance. Amount must be strictly positive.
    pub fn credit(&self, id: AccountId, amount: Decimal) -> Result<Decimal, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::validation("Amount must be positive"));
        }
        self.with_account(id, |account| {
            account.balance = account
                .balance
                .checked_add(amount)
                .ok_or_else(|| ServiceError::validation("Balance overflow"))?;
            Ok(account.balance)
        })
    }

    /// Decrease the balance, rejecting atomically if it would go negative.
    pub fn debit(&self, id: AccountId, amount: Decimal) -> Result<Decimal, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::validation("Amount must be positive"));
        }
        self.with_account(id, |account| {
            if amount > account.balance {
                return Err(ServiceError::InsufficientFunds);
            }
            account.balance -= amount;
            Ok(account.balance)
        })
    }

    pub fn balance(&self, id: AccountId) -> Result<Decimal, ServiceError> {
        self.store
            .get(id)
            .map(|account| account.balance)
            .ok_or_else(|| ServiceError::not_found("account"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn setup() -> (Arc<AccountStore>, Ledger, AccountId) {
        let store = Arc::new(AccountStore::new("tmdf28dns"));
        let account = store
            .create_account("a@x.com", "secure_password_123", None, None)
            .unwrap();
        let ledger = Ledger::new(store.clone());
        (store, ledger, account.id)
    }

    #[test]
    fn test_credit_debit() {
        let (_store, ledger, id) = setup();

        assert_eq!(ledger.credit(id, Decimal::from(1000)).unwrap(), Decimal::from(1000));
        assert_eq!(ledger.debit(id, Decimal::from(300)).unwrap(), Decimal::from(700));
        assert_eq!(ledger.balance(id).unwrap(), Decimal::from(700));
    }

    #[test]
    fn test_insufficient_funds_is_a_no_op() {
        let (_store, ledger, id) = setup();
        ledger.credit(id, Decimal::from(50)).unwrap();

        assert_eq!(
            ledger.debit(id, Decimal::from(51)).unwrap_err(),
            ServiceError::InsufficientFunds
        );
        assert_eq!(ledger.balance(id).unwrap(), Decimal::from(50));
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        let (_store, ledger, id) = setup();

        assert!(matches!(
            ledger.credit(id, Decimal::ZERO).unwrap_err(),
            ServiceError::Validation(_)
        ));
        assert!(matches!(
            ledger.debit(id, Decimal::from(-5)).unwrap_err(),
            ServiceError::Validation(_)
        ));
        assert_eq!(ledger.balance(id).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_unknown_account() {
        let (_store, ledger, _id) = setup();
        assert!(matches!(
            ledger.credit(999, Decimal::ONE).unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }

    #[test]
    fn test_concurrent_credits_lose_nothing() {
        let (_store, ledger, id) = setup();

        let threads = 8;
        let per_thread = 100;
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let ledger = ledger.clone();
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        ledger.credit(id, Decimal::ONE).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            ledger.balance(id).unwrap(),
            Decimal::from(threads * per_thread)
        );
    }

    #[test]
    fn test_concurrent_mixed_ops_never_go_negative() {
        let (_store, ledger, id) = setup();
        ledger.credit(id, Decimal::from(100)).unwrap();

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let ledger = ledger.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        if i % 2 == 0 {
                            ledger.credit(id, Decimal::from(3)).unwrap();
                        } else {
                            // Debits may legitimately bounce; they must
                            // never make the balance negative.
                            let _ = ledger.debit(id, Decimal::from(7));
                        }
                        assert!(ledger.balance(id).unwrap() >= Decimal::ZERO);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(ledger.balance(id).unwrap() >= Decimal::ZERO);
    }
}
