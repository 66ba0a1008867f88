//! Deposit / withdrawal history records

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{current_timestamp, AccountId};
use crate::error::ServiceError;
use crate::storage::{keys, Storage};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum TxKind {
    Deposit,
    Withdrawal,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum TxStatus {
    /// Recorded and awaiting external payout processing
    Pending,
    Completed,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TxRecord {
    pub id: String,
    pub account_id: AccountId,
    pub kind: TxKind,
    pub amount: Decimal,
    pub status: TxStatus,
    pub created_at: i64,
}

/// Append-only log of balance-changing requests, per account.
pub struct TransactionLog {
    records: Mutex<HashMap<AccountId, Vec<TxRecord>>>,
    storage: Option<Arc<Storage>>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            storage: None,
        }
    }

    pub fn with_storage(storage: Arc<Storage>) -> Result<Self, ServiceError> {
        let rows: Vec<TxRecord> = storage.scan_prefix("txn:").map_err(ServiceError::Storage)?;
        let mut records: HashMap<AccountId, Vec<TxRecord>> = HashMap::new();
        for row in rows {
            records.entry(row.account_id).or_default().push(row);
        }
        Ok(Self {
            records: Mutex::new(records),
            storage: Some(storage),
        })
    }

    pub fn record(
        &self,
        account_id: AccountId,
        kind: TxKind,
        amount: Decimal,
        status: TxStatus,
    ) -> Result<TxRecord, ServiceError> {
        let record = TxRecord {
            id: Uuid::new_v4().to_string(),
            account_id,
            kind,
            amount,
            status,
            created_at: current_timestamp(),
        };
        if let Some(storage) = &self.storage {
            storage
                .put(&keys::transaction(account_id, &record.id), &record)
                .map_err(ServiceError::Storage)?;
        }
        self.records
            .lock()
            .map_err(|_| ServiceError::Busy)?
            .entry(account_id)
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    /// The caller's records, newest first.
    pub fn list(&self, account_id: AccountId) -> Vec<TxRecord> {
        let mut out = self
            .records
            .lock()
            .ok()
            .and_then(|m| m.get(&account_id).cloned())
            .unwrap_or_default();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_list_per_account() {
        let log = TransactionLog::new();
        log.record(1, TxKind::Deposit, Decimal::from(100), TxStatus::Completed)
            .unwrap();
        log.record(1, TxKind::Withdrawal, Decimal::from(40), TxStatus::Pending)
            .unwrap();
        log.record(2, TxKind::Deposit, Decimal::from(5), TxStatus::Completed)
            .unwrap();

        let mine = log.list(1);
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|r| r.account_id == 1));
        assert_eq!(log.list(2).len(), 1);
        assert!(log.list(3).is_empty());
    }
}
