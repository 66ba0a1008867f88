// RPC types for JSON-RPC 2.0 protocol
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

#[derive(Deserialize, Debug)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub id: u64,
}

#[derive(Serialize, Debug)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: u64,
}

#[derive(Serialize, Debug, Clone)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl From<ServiceError> for RpcError {
    fn from(err: ServiceError) -> Self {
        let code = match &err {
            ServiceError::Validation(_) => -32602,
            ServiceError::NotFound(_) => -32001,
            ServiceError::InsufficientFunds => -32002,
            ServiceError::Unauthorized => -32003,
            ServiceError::Busy => -32005,
            ServiceError::Storage(_) => -32006,
            ServiceError::Delivery(_) => -32007,
            ServiceError::InvalidReferral => -32008,
            ServiceError::DuplicateEmail => -32009,
            ServiceError::BadCredentials => -32010,
            ServiceError::NotVerified => -32011,
            ServiceError::InvalidSession => -32012,
            ServiceError::SessionExpired => -32013,
            ServiceError::TokenExpired => -32014,
        };
        RpcError {
            code,
            message: err.to_string(),
        }
    }
}

// Method-specific parameter types. Every request body is parsed into one
// of these before it reaches the core; nothing dynamic flows through.

#[derive(Deserialize, Debug)]
pub struct SignupParams {
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub referral: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct VerifyEmailParams {
    pub token: String,
}

#[derive(Deserialize, Debug)]
pub struct ResendParams {
    pub email: String,
}

#[derive(Deserialize, Debug)]
pub struct LoginParams {
    pub email: String,
    pub password: String,
}

/// Methods that only need the caller's identity
#[derive(Deserialize, Debug)]
pub struct SessionParams {
    pub session: String,
}

#[derive(Deserialize, Debug)]
pub struct AmountParams {
    pub session: String,
    pub amount: Decimal,
}

#[derive(Deserialize, Debug)]
pub struct OpenPlanParams {
    pub session: String,
    pub plan_id: u64,
}

#[derive(Deserialize, Debug)]
pub struct SendMessageParams {
    pub session: String,
    pub subject: Option<String>,
    pub body: String,
}

#[derive(Deserialize, Debug)]
pub struct ReplyMessageParams {
    pub session: String,
    pub message_id: String,
    pub body: String,
}

#[derive(Serialize, Debug)]
pub struct LoginResponse {
    pub session: String,
    pub account: crate::account::AccountProfile,
}

#[derive(Serialize, Debug)]
pub struct BalanceResponse {
    pub balance: Decimal,
}

#[derive(Serialize, Debug)]
pub struct OkResponse {
    pub ok: bool,
    pub message: String,
}
