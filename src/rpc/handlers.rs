use super::types::*;
use crate::account::Account;
use crate::account::{TxKind, TxStatus};
use crate::error::ServiceError;
use crate::mailer::verification_email;
use crate::rpc::RpcState;
use axum::{extract::State, Json};
use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

/// Main dispatcher: routes incoming JSON-RPC requests to the correct handler.
pub async fn handle_rpc_request(
    State(state): State<RpcState>,
    Json(req): Json<RpcRequest>,
) -> Json<RpcResponse> {
    debug!("RPC Request: method={}, id={}", req.method, req.id);

    let result = match req.method.as_str() {
        "signup" => handle_signup(&state, req.params).await,
        "verifyEmail" => handle_verify_email(&state, req.params).await,
        "resendVerification" => handle_resend(&state, req.params).await,
        "login" => handle_login(&state, req.params).await,
        "me" => handle_me(&state, req.params).await,
        "getBalance" => handle_get_balance(&state, req.params).await,
        "deposit" => handle_deposit(&state, req.params).await,
        "withdraw" => handle_withdraw(&state, req.params).await,
        "listTransactions" => handle_list_transactions(&state, req.params).await,
        "listPlans" => handle_list_plans(&state).await,
        "openPlan" => handle_open_plan(&state, req.params).await,
        "myPlans" => handle_my_plans(&state, req.params).await,
        "sendMessage" => handle_send_message(&state, req.params).await,
        "replyMessage" => handle_reply_message(&state, req.params).await,
        "listMessages" => handle_list_messages(&state, req.params).await,
        "runAccrual" => handle_run_accrual(&state, req.params).await,
        "health" => Ok(serde_json::json!({ "ok": true })),
        "getVersion" => handle_get_version().await,
        _ => Err(RpcError {
            code: -32601,
            message: format!("Method not found: {}", req.method),
        }),
    };

    // Build response
    match result {
        Ok(val) => Json(RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: Some(val),
            error: None,
            id: req.id,
        }),
        Err(err) => Json(RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(err),
            id: req.id,
        }),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError {
        code: -32603,
        message: format!("Serialization error: {}", e),
    })
}

fn parse_params<T: DeserializeOwned>(params: serde_json::Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError {
        code: -32602,
        message: format!("Invalid params: {}", e),
    })
}

/// Resolve a session token to the acting account. The account id is always
/// taken from the validated token, never from the request body.
fn authorize(state: &RpcState, session: &str) -> Result<Account, RpcError> {
    let account_id = state.sessions.validate(session)?;
    state
        .accounts
        .get(account_id)
        .ok_or_else(|| ServiceError::InvalidSession.into())
}

fn authorize_admin(state: &RpcState, session: &str) -> Result<Account, RpcError> {
    let account = authorize(state, session)?;
    if !account.is_admin {
        return Err(ServiceError::Unauthorized.into());
    }
    Ok(account)
}

async fn handle_signup(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: SignupParams = parse_params(params)?;

    let account = state
        .accounts
        .create_account(&p.email, &p.password, p.phone, p.referral)?;
    // Account survives a token-issuance failure; resend repairs it later
    let token = state.tokens.issue(account.id)?;
    info!("New signup: {} (account {})", account.email, account.id);

    // Best-effort delivery; the account exists either way
    let (subject, html) = verification_email(&state.base_url, &token);
    if let Err(e) = state.mailer.send(&account.email, &subject, &html).await {
        error!("Email send failed: {}", e);
    }

    to_json(&OkResponse {
        ok: true,
        message: "Signup successful. Check your email for verification link.".to_string(),
    })
}

async fn handle_verify_email(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: VerifyEmailParams = parse_params(params)?;
    let account_id = state.tokens.consume(&p.token)?;
    info!("Account {} verified", account_id);

    to_json(&OkResponse {
        ok: true,
        message: "Email verified! You can now log in.".to_string(),
    })
}

async fn handle_resend(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: ResendParams = parse_params(params)?;
    let (account_id, token) = state.tokens.resend(&p.email)?;
    debug!("Reissued verification token for account {}", account_id);

    let (subject, html) = verification_email(&state.base_url, &token);
    if let Err(e) = state.mailer.send(&p.email, &subject, &html).await {
        error!("Email send failed: {}", e);
    }

    to_json(&OkResponse {
        ok: true,
        message: "Verification email resent".to_string(),
    })
}

async fn handle_login(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: LoginParams = parse_params(params)?;
    let account = state.accounts.authenticate(&p.email, &p.password)?;
    let session = state.sessions.issue(account.id);

    to_json(&LoginResponse {
        session,
        account: account.profile(),
    })
}

async fn handle_me(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: SessionParams = parse_params(params)?;
    let account = authorize(state, &p.session)?;
    to_json(&account.profile())
}

async fn handle_get_balance(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: SessionParams = parse_params(params)?;
    let account = authorize(state, &p.session)?;
    let balance = state.ledger.balance(account.id)?;
    to_json(&BalanceResponse { balance })
}

async fn handle_deposit(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: AmountParams = parse_params(params)?;
    let account = authorize(state, &p.session)?;

    let balance = state.ledger.credit(account.id, p.amount)?;
    // History is advisory; the ledger already holds the money
    if let Err(e) =
        state
            .history
            .record(account.id, TxKind::Deposit, p.amount, TxStatus::Completed)
    {
        error!("Failed to record deposit for account {}: {}", account.id, e);
    }
    info!("Deposit of {} for account {}", p.amount, account.id);

    to_json(&BalanceResponse { balance })
}

async fn handle_withdraw(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: AmountParams = parse_params(params)?;
    let account = authorize(state, &p.session)?;

    let balance = state.ledger.debit(account.id, p.amount)?;
    if let Err(e) = state.history.record(
        account.id,
        TxKind::Withdrawal,
        p.amount,
        TxStatus::Pending,
    ) {
        error!(
            "Failed to record withdrawal for account {}: {}",
            account.id, e
        );
    }
    info!("Withdrawal of {} for account {}", p.amount, account.id);

    to_json(&BalanceResponse { balance })
}

async fn handle_list_transactions(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: SessionParams = parse_params(params)?;
    let account = authorize(state, &p.session)?;
    to_json(&state.history.list(account.id))
}

async fn handle_list_plans(state: &RpcState) -> Result<serde_json::Value, RpcError> {
    to_json(&state.registry.list())
}

async fn handle_open_plan(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: OpenPlanParams = parse_params(params)?;
    let account = authorize(state, &p.session)?;

    let instance = state.engine.open(account.id, p.plan_id)?;
    info!(
        "Account {} opened plan '{}' (instance {})",
        account.id, instance.plan_name, instance.id
    );
    to_json(&instance)
}

async fn handle_my_plans(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: SessionParams = parse_params(params)?;
    let account = authorize(state, &p.session)?;
    to_json(&state.engine.list_for(account.id))
}

async fn handle_send_message(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: SendMessageParams = parse_params(params)?;
    let account = authorize(state, &p.session)?;
    let message = state.messages.send(account.id, p.subject, &p.body)?;
    to_json(&message)
}

async fn handle_reply_message(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: ReplyMessageParams = parse_params(params)?;
    authorize_admin(state, &p.session)?;
    let message = state.messages.reply(&p.message_id, &p.body)?;
    to_json(&message)
}

async fn handle_list_messages(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: SessionParams = parse_params(params)?;
    let account = authorize(state, &p.session)?;
    if account.is_admin {
        to_json(&state.messages.list_all())
    } else {
        to_json(&state.messages.list_for(account.id))
    }
}

async fn handle_run_accrual(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: SessionParams = parse_params(params)?;
    authorize_admin(state, &p.session)?;

    let results = state.engine.accrue_due(Utc::now())?;
    info!("Manual accrual sweep settled {} instance(s)", results.len());
    to_json(&results)
}

async fn handle_get_version() -> Result<serde_json::Value, RpcError> {
    Ok(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
