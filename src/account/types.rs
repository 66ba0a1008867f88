//! Account type definitions

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account identifier - monotonic numeric id
pub type AccountId = u64;

/// Main account structure
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Account {
    // Identity
    pub id: AccountId,
    /// Stored lower-cased; uniqueness is checked on the normalized form.
    pub email: String,
    pub phone: Option<String>,

    // Authentication
    pub password_hash: String, // Argon2id PHC string
    pub verified: bool,
    pub is_admin: bool,

    // Ledger state
    pub balance: Decimal,

    pub referral: Option<String>,
    pub created_at: i64, // unix seconds
}

/// The subset of account fields safe to return to clients.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AccountProfile {
    pub id: AccountId,
    pub email: String,
    pub phone: Option<String>,
    pub balance: Decimal,
    pub verified: bool,
    pub is_admin: bool,
}

impl Account {
    pub fn profile(&self) -> AccountProfile {
        AccountProfile {
            id: self.id,
            email: self.email.clone(),
            phone: self.phone.clone(),
            balance: self.balance,
            verified: self.verified,
            is_admin: self.is_admin,
        }
    }
}

pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Lower-case normalization applied before every email lookup and store.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("A@X.com "), "a@x.com");
        assert_eq!(
            normalize_email("user@profitbliss.com"),
            "user@profitbliss.com"
        );
    }
}
