pub mod handlers;
pub mod types;

use axum::{routing::post, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::account::{AccountStore, Ledger, SessionSigner, TransactionLog, VerificationTokens};
use crate::mailer::Mailer;
use crate::messages::MessageStore;
use crate::plans::{AccrualEngine, PlanRegistry};

#[derive(Clone)]
pub struct RpcState {
    pub accounts: Arc<AccountStore>,
    pub ledger: Ledger,
    pub tokens: Arc<VerificationTokens>,
    pub sessions: SessionSigner,
    pub registry: Arc<PlanRegistry>,
    pub engine: Arc<AccrualEngine>,
    pub history: Arc<TransactionLog>,
    pub messages: Arc<MessageStore>,
    pub mailer: Arc<dyn Mailer>,
    pub base_url: String,
}

pub struct RpcServer {
    state: RpcState,
    bind_addr: String,
}

impl RpcServer {
    pub fn new(state: RpcState, port: u16) -> Self {
        Self {
            state,
            bind_addr: format!("0.0.0.0:{}", port),
        }
    }

    pub async fn start(self) -> std::io::Result<()> {
        let app = Router::new()
            .route("/", post(handlers::handle_rpc_request))
            .layer(CorsLayer::permissive())
            .with_state(self.state);

        let listener = tokio::net::TcpListener::bind(&self.bind_addr).await?;

        info!("RPC server listening on {}", self.bind_addr);
        axum::serve(listener, app).await
    }
}
