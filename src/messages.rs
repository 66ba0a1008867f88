//! Support messages between users and the platform

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::types::current_timestamp;
use crate::account::AccountId;
use crate::error::ServiceError;
use crate::storage::{keys, Storage};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub id: String,
    /// The user whose thread this message belongs to
    pub account_id: AccountId,
    pub subject: Option<String>,
    pub body: String,
    pub from_admin: bool,
    pub created_at: i64,
}

pub struct MessageStore {
    messages: Mutex<Vec<Message>>,
    storage: Option<Arc<Storage>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            storage: None,
        }
    }

    pub fn with_storage(storage: Arc<Storage>) -> Result<Self, ServiceError> {
        let rows: Vec<Message> = storage.scan_prefix("msg:").map_err(ServiceError::Storage)?;
        Ok(Self {
            messages: Mutex::new(rows),
            storage: Some(storage),
        })
    }

    pub fn send(
        &self,
        account_id: AccountId,
        subject: Option<String>,
        body: &str,
    ) -> Result<Message, ServiceError> {
        if body.trim().is_empty() {
            return Err(ServiceError::validation("Message body required"));
        }
        self.append(account_id, subject, body, false)
    }

    /// Admin reply lands in the thread of the message it answers.
    pub fn reply(&self, message_id: &str, body: &str) -> Result<Message, ServiceError> {
        if body.trim().is_empty() {
            return Err(ServiceError::validation("Message body required"));
        }
        let account_id = {
            let messages = self.messages.lock().map_err(|_| ServiceError::Busy)?;
            messages
                .iter()
                .find(|m| m.id == message_id)
                .map(|m| m.account_id)
                .ok_or_else(|| ServiceError::not_found("message"))?
        };
        self.append(account_id, None, body, true)
    }

    fn append(
        &self,
        account_id: AccountId,
        subject: Option<String>,
        body: &str,
        from_admin: bool,
    ) -> Result<Message, ServiceError> {
        let message = Message {
            id: Uuid::new_v4().to_string(),
            account_id,
            subject,
            body: body.to_string(),
            from_admin,
            created_at: current_timestamp(),
        };
        if let Some(storage) = &self.storage {
            storage
                .put(&keys::message(&message.id), &message)
                .map_err(ServiceError::Storage)?;
        }
        self.messages
            .lock()
            .map_err(|_| ServiceError::Busy)?
            .push(message.clone());
        Ok(message)
    }

    /// One user's thread, newest first
    pub fn list_for(&self, account_id: AccountId) -> Vec<Message> {
        let mut out: Vec<Message> = self
            .messages
            .lock()
            .map(|m| {
                m.iter()
                    .filter(|msg| msg.account_id == account_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Every thread, newest first (admin view)
    pub fn list_all(&self) -> Vec<Message> {
        let mut out = self
            .messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_reply_share_a_thread() {
        let store = MessageStore::new();
        let sent = store
            .send(1, Some("Help".to_string()), "Where is my payout?")
            .unwrap();
        let reply = store.reply(&sent.id, "On its way.").unwrap();

        assert_eq!(reply.account_id, 1);
        assert!(reply.from_admin);

        let thread = store.list_for(1);
        assert_eq!(thread.len(), 2);
        assert!(store.list_for(2).is_empty());
    }

    #[test]
    fn test_reply_unknown_message() {
        let store = MessageStore::new();
        assert!(matches!(
            store.reply("nope", "hello").unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }

    #[test]
    fn test_empty_body_rejected() {
        let store = MessageStore::new();
        assert!(matches!(
            store.send(1, None, "   ").unwrap_err(),
            ServiceError::Validation(_)
        ));
    }
}
