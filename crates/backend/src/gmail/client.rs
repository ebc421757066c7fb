//! Gmail API client for reading and sending a user's mail.

use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_gmail1::api::{Message, Scope};
use google_gmail1::hyper_rustls::HttpsConnector;
use google_gmail1::Gmail;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use super::{mime, MailConnector, MailGateway, ParsedMessage};
use crate::models::User;
use crate::store::Store;

/// Builds authorized Gmail clients and writes refreshed access tokens back
/// to the store.
pub struct GmailConnector {
    store: Arc<dyn Store>,
    client_id: String,
    client_secret: String,
    timeout: Duration,
}

impl GmailConnector {
    pub fn new(
        store: Arc<dyn Store>,
        client_id: String,
        client_secret: String,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            client_id,
            client_secret,
            timeout,
        }
    }
}

#[async_trait]
impl MailConnector for GmailConnector {
    async fn connect(&self, user: &User) -> Result<Box<dyn MailGateway>> {
        let refresh_token = user
            .refresh_token
            .clone()
            .context("User has no stored refresh token")?;

        // Use the yup_oauth2 re-exported by google_gmail1 to avoid version mismatch
        let secret = google_gmail1::yup_oauth2::authorized_user::AuthorizedUserSecret {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            refresh_token,
            key_type: "authorized_user".to_string(),
        };

        let auth = google_gmail1::yup_oauth2::AuthorizedUserAuthenticator::builder(secret)
            .build()
            .await
            .context("Failed to build authenticator from refresh token")?;

        let token = tokio::time::timeout(
            self.timeout,
            auth.token(&[Scope::Readonly.as_ref(), Scope::Send.as_ref()]),
        )
        .await
        .context("Timed out refreshing Gmail access token")?
        .context("Failed to refresh Gmail access token")?;

        if let Some(access) = token.token() {
            let expires_at = token
                .expiration_time()
                .and_then(|t| DateTime::<Utc>::from_timestamp(t.unix_timestamp(), 0));
            if let Err(e) = self
                .store
                .update_access_token(user.id, access, expires_at)
                .await
            {
                tracing::warn!("Failed to persist refreshed token for {}: {}", user.email, e);
            }
        }

        let connector = google_gmail1::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native TLS roots")?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        let hub = Gmail::new(client, auth);

        Ok(Box::new(GmailClient {
            hub,
            email_address: user.email.clone(),
            timeout: self.timeout,
        }))
    }
}

/// Client for interacting with Gmail API
pub struct GmailClient {
    hub: Gmail<HttpsConnector<HttpConnector>>,
    email_address: String,
    timeout: Duration,
}

impl GmailClient {
    /// Await a Gmail call under the configured timeout, logging any failure.
    async fn timed<T, E, F>(&self, what: &str, call: F) -> Option<T>
    where
        E: std::fmt::Display,
        F: Future<Output = std::result::Result<T, E>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                tracing::warn!("Gmail {} failed for {}: {}", what, self.email_address, e);
                None
            }
            Err(_) => {
                tracing::warn!(
                    "Gmail {} timed out after {:?} for {}",
                    what,
                    self.timeout,
                    self.email_address
                );
                None
            }
        }
    }
}

#[async_trait]
impl MailGateway for GmailClient {
    async fn list_messages(&self, query: &str, max_results: u32) -> Vec<String> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = max_results.saturating_sub(ids.len() as u32);
            if remaining == 0 {
                break;
            }

            let mut call = self
                .hub
                .users()
                .messages_list("me")
                .q(query)
                .max_results(remaining)
                .add_scope(Scope::Readonly);
            if let Some(token) = &page_token {
                call = call.page_token(token);
            }

            let Some((_, page)) = self.timed("list messages", call.doit()).await else {
                break;
            };

            ids.extend(
                page.messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        ids.truncate(max_results as usize);
        tracing::debug!("Listed {} message ids for {} ({})", ids.len(), self.email_address, query);
        ids
    }

    async fn get_message(&self, message_id: &str) -> Option<ParsedMessage> {
        let call = self
            .hub
            .users()
            .messages_get("me", message_id)
            .format("full")
            .add_scope(Scope::Readonly)
            .doit();

        let (_, message) = self.timed("get message", call).await?;
        let parsed = mime::parse_message(&message);
        if parsed.is_none() {
            tracing::warn!("Gmail returned message {} without an id", message_id);
        }
        parsed
    }

    async fn send_message(&self, to: &str, subject: &str, body: &str) -> Option<String> {
        let raw = mime::build_rfc822(to, subject, body);
        let content_type: ::mime::Mime = match "message/rfc822".parse() {
            Ok(m) => m,
            Err(e) => {
                tracing::error!("Invalid upload content type: {}", e);
                return None;
            }
        };

        let call = self
            .hub
            .users()
            .messages_send(Message::default(), "me")
            .add_scope(Scope::Send)
            .upload(Cursor::new(raw.into_bytes()), content_type);

        let (_, sent) = self.timed("send message", call).await?;
        tracing::info!("Sent message to {} from {}", to, self.email_address);
        sent.id
    }
}
