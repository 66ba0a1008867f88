//! One-time email verification tokens

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::store::AccountStore;
use super::types::AccountId;
use crate::error::ServiceError;
use crate::storage::{keys, Storage};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VerificationToken {
    pub token: String,
    pub account_id: AccountId,
    pub created_at: i64,
}

/// Issues and consumes single-use verification tokens. Several live tokens
/// per account are allowed (each resend mints a fresh one); consuming any
/// of them verifies the account.
pub struct VerificationTokens {
    tokens: Mutex<HashMap<String, VerificationToken>>,
    ttl_secs: i64,
    accounts: Arc<AccountStore>,
    storage: Option<Arc<Storage>>,
}

impl VerificationTokens {
    pub fn new(accounts: Arc<AccountStore>, ttl_hours: i64) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            ttl_secs: ttl_hours * 3600,
            accounts,
            storage: None,
        }
    }

    pub fn with_storage(
        storage: Arc<Storage>,
        accounts: Arc<AccountStore>,
        ttl_hours: i64,
    ) -> Result<Self, ServiceError> {
        let rows: Vec<VerificationToken> = storage
            .scan_prefix("vtoken:")
            .map_err(ServiceError::Storage)?;
        let tokens = rows
            .into_iter()
            .map(|t| (t.token.clone(), t))
            .collect::<HashMap<_, _>>();

        Ok(Self {
            tokens: Mutex::new(tokens),
            ttl_secs: ttl_hours * 3600,
            accounts,
            storage: Some(storage),
        })
    }

    pub fn issue(&self, account_id: AccountId) -> Result<String, ServiceError> {
        self.issue_at(account_id, Utc::now())
    }

    pub fn issue_at(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<String, ServiceError> {
        // 20 random bytes, hex encoded: unpredictable and unique
        let mut bytes = [0u8; 20];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let row = VerificationToken {
            token: token.clone(),
            account_id,
            created_at: now.timestamp(),
        };
        if let Some(storage) = &self.storage {
            storage
                .put(&keys::verify_token(&token), &row)
                .map_err(ServiceError::Storage)?;
        }
        self.tokens
            .lock()
            .map_err(|_| ServiceError::Busy)?
            .insert(token.clone(), row);

        Ok(token)
    }

    /// Consume a token: verify the owning account, then delete the token.
    /// A second consume of the same value reads `NotFound`.
    pub fn consume(&self, token: &str) -> Result<AccountId, ServiceError> {
        self.consume_at(token, Utc::now())
    }

    pub fn consume_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AccountId, ServiceError> {
        let mut tokens = self.tokens.lock().map_err(|_| ServiceError::Busy)?;
        let row = tokens
            .get(token)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("verification token"))?;

        if now.timestamp() - row.created_at >= self.ttl_secs {
            // An expired token can never be consumed; drop it on touch.
            self.delete_persisted(token)?;
            tokens.remove(token);
            return Err(ServiceError::TokenExpired);
        }

        self.accounts.mark_verified(row.account_id)?;
        self.delete_persisted(token)?;
        tokens.remove(token);

        Ok(row.account_id)
    }

    /// Mint a fresh token for an unverified account. Outstanding tokens
    /// stay live.
    pub fn resend(&self, email: &str) -> Result<(AccountId, String), ServiceError> {
        let account = self
            .accounts
            .get_by_email(email)
            .ok_or_else(|| ServiceError::not_found("account"))?;
        if account.verified {
            return Err(ServiceError::validation("Already verified"));
        }
        let token = self.issue(account.id)?;
        Ok((account.id, token))
    }

    /// Drop every token past its TTL. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        let mut tokens = self.tokens.lock().map_err(|_| ServiceError::Busy)?;
        let cutoff = now.timestamp() - self.ttl_secs;
        let expired: Vec<String> = tokens
            .values()
            .filter(|t| t.created_at <= cutoff)
            .map(|t| t.token.clone())
            .collect();
        for token in &expired {
            self.delete_persisted(token)?;
            tokens.remove(token);
        }
        Ok(expired.len())
    }

    fn delete_persisted(&self, token: &str) -> Result<(), ServiceError> {
        if let Some(storage) = &self.storage {
            storage
                .delete(&keys::verify_token(token))
                .map_err(ServiceError::Storage)?;
        }
        Ok(())
    }

    pub fn live_count(&self) -> usize {
        self.tokens.lock().map(|t| t.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn setup() -> (Arc<AccountStore>, VerificationTokens, AccountId) {
        let accounts = Arc::new(AccountStore::new("tmdf28dns"));
        let account = accounts
            .create_account("a@x.com", "secure_password_123", None, None)
            .unwrap();
        let tokens = VerificationTokens::new(accounts.clone(), 24);
        (accounts, tokens, account.id)
    }

    #[test]
    fn test_consume_verifies_account_once() {
        let (accounts, tokens, id) = setup();

        let token = tokens.issue(id).unwrap();
        assert_eq!(tokens.consume(&token).unwrap(), id);
        assert!(accounts.get(id).unwrap().verified);

        // Second consume: gone, and no state change
        assert!(matches!(
            tokens.consume(&token).unwrap_err(),
            ServiceError::NotFound(_)
        ));
        assert!(accounts.get(id).unwrap().verified);
    }

    #[test]
    fn test_unknown_token() {
        let (_accounts, tokens, _id) = setup();
        assert!(matches!(
            tokens.consume("deadbeef").unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }

    #[test]
    fn test_expired_token() {
        let (accounts, tokens, id) = setup();
        let issued = Utc::now();
        let token = tokens.issue_at(id, issued).unwrap();

        let late = issued + Duration::hours(24);
        assert_eq!(
            tokens.consume_at(&token, late).unwrap_err(),
            ServiceError::TokenExpired
        );
        // The account stays unverified and the token is gone
        assert!(!accounts.get(id).unwrap().verified);
        assert_eq!(tokens.live_count(), 0);
    }

    #[test]
    fn test_resend_allows_multiple_live_tokens() {
        let (accounts, tokens, id) = setup();

        let first = tokens.issue(id).unwrap();
        let (resend_id, second) = tokens.resend("a@x.com").unwrap();
        assert_eq!(resend_id, id);
        assert_ne!(first, second);
        assert_eq!(tokens.live_count(), 2);

        // Either token verifies
        tokens.consume(&first).unwrap();
        assert!(accounts.get(id).unwrap().verified);

        // Once verified, resend is refused
        assert!(matches!(
            tokens.resend("a@x.com").unwrap_err(),
            ServiceError::Validation(_)
        ));
    }

    #[test]
    fn test_resend_unknown_email() {
        let (_accounts, tokens, _id) = setup();
        assert!(matches!(
            tokens.resend("nobody@x.com").unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }

    #[test]
    fn test_purge_expired() {
        let (_accounts, tokens, id) = setup();
        let issued = Utc::now();
        tokens.issue_at(id, issued - Duration::hours(30)).unwrap();
        tokens.issue_at(id, issued).unwrap();

        assert_eq!(tokens.purge_expired(issued).unwrap(), 1);
        assert_eq!(tokens.live_count(), 1);
    }
}
