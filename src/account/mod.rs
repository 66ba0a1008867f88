//! Account system: credential store, balance ledger, token lifecycle
//!
//! - Email/password accounts with Argon2id hashing
//! - Per-account row locking for linearizable balance mutations
//! - One-time verification tokens and stateless signed sessions

pub mod auth;
pub mod history;
pub mod ledger;
pub mod store;
pub mod tokens;
pub mod types;

pub use auth::SessionSigner;
pub use history::{TransactionLog, TxKind, TxRecord, TxStatus};
pub use ledger::Ledger;
pub use store::AccountStore;
pub use tokens::VerificationTokens;
pub use types::{Account, AccountId, AccountProfile};
