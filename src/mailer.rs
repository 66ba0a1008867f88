//! Outbound mail collaborator
//!
//! Delivery is best-effort: callers log a failed send and carry on, the
//! triggering operation never rolls back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::config::MailConfig;
use crate::error::ServiceError;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), ServiceError>;
}

/// Posts {from, to, subject, html} to an HTTP relay endpoint.
pub struct HttpMailer {
    client: reqwest::Client,
    relay_url: String,
    from: String,
}

impl HttpMailer {
    pub fn new(relay_url: &str, from: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            relay_url: relay_url.to_string(),
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), ServiceError> {
        let body = json!({
            "from": self.from,
            "to": to,
            "subject": subject,
            "html": html,
        });
        let response = self
            .client
            .post(&self.relay_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::Delivery(format!(
                "relay returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Logs instead of delivering. Used when no relay is configured.
pub struct NullMailer;

#[async_trait]
impl Mailer for NullMailer {
    async fn send(&self, to: &str, subject: &str, _html: &str) -> Result<(), ServiceError> {
        info!("Mail delivery disabled; would send '{}' to {}", subject, to);
        Ok(())
    }
}

pub fn from_config(config: &MailConfig) -> Arc<dyn Mailer> {
    match &config.relay_url {
        Some(url) => Arc::new(HttpMailer::new(url, &config.from_address)),
        None => Arc::new(NullMailer),
    }
}

/// Subject and HTML body for the verification link mail.
pub fn verification_email(base_url: &str, token: &str) -> (String, String) {
    let link = format!("{}/verify/{}", base_url, token);
    let html = format!(
        "<div>\
         <h3>Welcome to Profit Bliss</h3>\
         <p>Click to verify your email:</p>\
         <a href=\"{link}\">{link}</a>\
         <p>If you did not sign up, ignore this message.</p>\
         </div>"
    );
    ("Verify your Profit Bliss account".to_string(), html)
}
