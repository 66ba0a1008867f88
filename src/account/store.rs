//! Account storage and credential management

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use rust_decimal::Decimal;

use super::auth::{hash_password, verify_password, AuthError};
use super::types::{current_timestamp, normalize_email, Account, AccountId};
use crate::error::ServiceError;
use crate::storage::{keys, Storage};

impl From<AuthError> for ServiceError {
    fn from(_: AuthError) -> Self {
        ServiceError::BadCredentials
    }
}

const MIN_PASSWORD_LEN: usize = 8;

/// Owns every account row. Rows live behind per-account mutexes so that
/// credential transitions and ledger mutations on the same account are
/// serialized while different accounts proceed in parallel.
pub struct AccountStore {
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<Account>>>>,
    /// normalized email -> id. Also serves as the signup critical section:
    /// duplicate check and insert happen under this one lock.
    email_index: Mutex<HashMap<String, AccountId>>,
    next_id: AtomicU64,
    referral_code: String,
    storage: Option<Arc<Storage>>,
}

impl AccountStore {
    /// Create a new empty in-memory store (tests, ephemeral runs)
    pub fn new(referral_code: &str) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            email_index: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            referral_code: referral_code.to_string(),
            storage: None,
        }
    }

    /// Create with storage backend, loading existing rows
    pub fn with_storage(
        storage: Arc<Storage>,
        referral_code: &str,
    ) -> Result<Self, ServiceError> {
        let rows: Vec<Account> = storage
            .scan_prefix("account:")
            .map_err(ServiceError::Storage)?;

        let mut accounts = HashMap::new();
        let mut email_index = HashMap::new();
        let mut max_id = 0;
        for account in rows {
            max_id = max_id.max(account.id);
            email_index.insert(account.email.clone(), account.id);
            accounts.insert(account.id, Arc::new(Mutex::new(account)));
        }

        Ok(Self {
            accounts: RwLock::new(accounts),
            email_index: Mutex::new(email_index),
            next_id: AtomicU64::new(max_id + 1),
            referral_code: referral_code.to_string(),
            storage: Some(storage),
        })
    }

    /// Create a new unverified account. Validation and the referral check
    /// run before any state is written; on any error nothing is created.
    pub fn create_account(
        &self,
        email: &str,
        password: &str,
        phone: Option<String>,
        referral: Option<String>,
    ) -> Result<Account, ServiceError> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(ServiceError::validation("Valid email required"));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(ServiceError::validation(
                "Password must be at least 8 characters",
            ));
        }
        // Blank referral is allowed; anything else must match the one code.
        let referral = referral.filter(|r| !r.trim().is_empty());
        if let Some(code) = &referral {
            if code != &self.referral_code {
                return Err(ServiceError::InvalidReferral);
            }
        }

        let password_hash = hash_password(password)?;

        let mut index = self
            .email_index
            .lock()
            .map_err(|_| ServiceError::Busy)?;
        if index.contains_key(&email) {
            return Err(ServiceError::DuplicateEmail);
        }

        let account = Account {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            email: email.clone(),
            phone,
            password_hash,
            verified: false,
            is_admin: false,
            balance: Decimal::ZERO,
            referral,
            created_at: current_timestamp(),
        };

        self.persist(&account)?;
        index.insert(email, account.id);
        self.accounts
            .write()
            .map_err(|_| ServiceError::Busy)?
            .insert(account.id, Arc::new(Mutex::new(account.clone())));

        Ok(account)
    }

    /// Provisioned accounts for first boot (admin / demo). Skips the
    /// referral gate and lets the caller set flags and opening balance.
    pub fn create_provisioned(
        &self,
        email: &str,
        password: &str,
        verified: bool,
        is_admin: bool,
        balance: Decimal,
    ) -> Result<Account, ServiceError> {
        let email = normalize_email(email);
        let password_hash = hash_password(password)?;

        let mut index = self
            .email_index
            .lock()
            .map_err(|_| ServiceError::Busy)?;
        if index.contains_key(&email) {
            return Err(ServiceError::DuplicateEmail);
        }

        let account = Account {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            email: email.clone(),
            phone: None,
            password_hash,
            verified,
            is_admin,
            balance,
            referral: None,
            created_at: current_timestamp(),
        };

        self.persist(&account)?;
        index.insert(email, account.id);
        self.accounts
            .write()
            .map_err(|_| ServiceError::Busy)?
            .insert(account.id, Arc::new(Mutex::new(account.clone())));

        Ok(account)
    }

    /// Check credentials. Password is verified before the verified-flag
    /// check so an unverified account with a wrong password still reads as
    /// `BadCredentials`, while a correct password reads as `NotVerified`.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Account, ServiceError> {
        let account = self
            .get_by_email(email)
            .ok_or(ServiceError::BadCredentials)?;

        verify_password(password, &account.password_hash)
            .map_err(|_| ServiceError::BadCredentials)?;

        if !account.verified {
            return Err(ServiceError::NotVerified);
        }
        Ok(account)
    }

    /// Snapshot of an account by id
    pub fn get(&self, id: AccountId) -> Option<Account> {
        let entry = self.entry(id)?;
        let guard = entry.lock().ok()?;
        Some(guard.clone())
    }

    pub fn get_by_email(&self, email: &str) -> Option<Account> {
        let email = normalize_email(email);
        let id = *self.email_index.lock().ok()?.get(&email)?;
        self.get(id)
    }

    /// Per-account row handle; lock it for any read-modify-write.
    pub(crate) fn entry(&self, id: AccountId) -> Option<Arc<Mutex<Account>>> {
        self.accounts.read().ok()?.get(&id).cloned()
    }

    /// Flip the verified flag (verification token consumption).
    pub fn mark_verified(&self, id: AccountId) -> Result<(), ServiceError> {
        let entry = self.entry(id).ok_or_else(|| ServiceError::not_found("account"))?;
        let mut account = entry.lock().map_err(|_| ServiceError::Busy)?;
        if !account.verified {
            let mut updated = account.clone();
            updated.verified = true;
            self.persist(&updated)?;
            *account = updated;
        }
        Ok(())
    }

    pub(crate) fn persist(&self, account: &Account) -> Result<(), ServiceError> {
        if let Some(storage) = &self.storage {
            storage
                .put(&keys::account(account.id), account)
                .map_err(ServiceError::Storage)?;
        }
        Ok(())
    }

    pub(crate) fn storage(&self) -> Option<Arc<Storage>> {
        self.storage.clone()
    }

    pub fn count(&self) -> usize {
        self.accounts.read().map(|m| m.len()).unwrap_or(0)
    }
}
