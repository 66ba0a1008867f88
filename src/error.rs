use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("Invalid referral code")]
    InvalidReferral,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid email or password")]
    BadCredentials,
    #[error("Email not verified")]
    NotVerified,
    #[error("Invalid session token")]
    InvalidSession,
    #[error("Session expired")]
    SessionExpired,
    #[error("Verification token expired")]
    TokenExpired,
    #[error("Insufficient funds")]
    InsufficientFunds,
    #[error("Account busy, try again")]
    Busy,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

impl ServiceError {
    pub fn not_found(what: &str) -> Self {
        ServiceError::NotFound(what.to_string())
    }

    pub fn validation(msg: &str) -> Self {
        ServiceError::Validation(msg.to_string())
    }
}
