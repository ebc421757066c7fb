//! Mail gateway: the narrow view of a mailbox the pipeline works against.
//!
//! Every gateway call reports failure as an empty/absent result after
//! logging, so one bad message never aborts a sync.

mod client;
pub mod mime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{NewEmail, User};

pub use client::GmailConnector;

/// One message as read from the provider, flattened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub gmail_id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl ParsedMessage {
    pub fn into_new_email(self, user_id: uuid::Uuid) -> NewEmail {
        NewEmail {
            user_id,
            gmail_id: self.gmail_id,
            thread_id: self.thread_id,
            subject: self.subject,
            sender: self.sender,
            recipient: self.recipient,
            body_text: self.body_text,
            body_html: self.body_html,
            received_at: self.received_at,
        }
    }
}

/// Mailbox operations scoped to one authorized user.
#[async_trait]
pub trait MailGateway: Send + Sync {
    /// Message ids matching a provider search query, at most `max_results`.
    /// Empty on any failure.
    async fn list_messages(&self, query: &str, max_results: u32) -> Vec<String>;

    /// Full message by provider id; `None` on failure.
    async fn get_message(&self, message_id: &str) -> Option<ParsedMessage>;

    /// Send a plain-text message; the provider message id on success.
    async fn send_message(&self, to: &str, subject: &str, body: &str) -> Option<String>;
}

/// Opens a [`MailGateway`] for a user from their stored credentials.
#[async_trait]
pub trait MailConnector: Send + Sync {
    async fn connect(&self, user: &User) -> anyhow::Result<Box<dyn MailGateway>>;
}
