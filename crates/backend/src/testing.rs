//! In-memory stand-ins for the store, the mail gateway and the chat model.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::{DraftReply, Email, ExtractedInterviewInfo, ExtractionStatus, InterviewInvitation};
use uuid::Uuid;

use crate::gmail::{MailConnector, MailGateway, ParsedMessage};
use crate::llm::ChatCompletion;
use crate::models::{merge_invitation, NewDraftReply, NewEmail, NewInvitation, NewUser, User};
use crate::store::Store;

// ----------------------------------------------------------------------------
// Store
// ----------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    emails: Vec<Email>,
    invitations: Vec<InterviewInvitation>,
    drafts: Vec<DraftReply>,
    /// Provider ids another writer stores between our lookup and our insert.
    racing: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user with a refresh token and return it.
    pub fn seed_user(&self, email: &str, last_sync_at: Option<DateTime<Utc>>) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            google_id: format!("google-{}", email),
            email: email.to_string(),
            name: None,
            access_token: Some("access".to_string()),
            refresh_token: Some("refresh".to_string()),
            token_expires_at: Some(now + chrono::Duration::hours(1)),
            last_sync_at,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().unwrap().users.push(user.clone());
        user
    }

    pub fn seed_email(&self, user_id: Uuid, gmail_id: &str, subject: &str, sender: &str, body: &str) -> Email {
        let now = Utc::now();
        let email = Email {
            id: Uuid::new_v4(),
            user_id,
            gmail_id: gmail_id.to_string(),
            thread_id: format!("thread-{}", gmail_id),
            subject: subject.to_string(),
            sender: sender.to_string(),
            recipient: "me@example.com".to_string(),
            body_text: Some(body.to_string()),
            body_html: None,
            received_at: now,
            is_processed: false,
            is_interview_related: false,
            created_at: now,
        };
        self.tables.lock().unwrap().emails.push(email.clone());
        email
    }

    /// Make the next ingestion of `gmail_id` lose to a concurrent writer: the
    /// dedupe lookup misses, then the competing row lands just before our insert.
    pub fn race_insert(&self, gmail_id: &str) {
        self.tables.lock().unwrap().racing.insert(gmail_id.to_string());
    }

    pub fn emails(&self) -> Vec<Email> {
        self.tables.lock().unwrap().emails.clone()
    }

    pub fn invitations(&self) -> Vec<InterviewInvitation> {
        self.tables.lock().unwrap().invitations.clone()
    }

    pub fn drafts(&self) -> Vec<DraftReply> {
        self.tables.lock().unwrap().drafts.clone()
    }

    pub fn user(&self, user_id: Uuid) -> Option<User> {
        self.tables
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.tables.lock().unwrap().users.clone())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.user(user_id))
    }

    async fn upsert_user(&self, new_user: NewUser) -> Result<User> {
        let mut tables = self.tables.lock().unwrap();
        let now = Utc::now();
        if let Some(user) = tables
            .users
            .iter_mut()
            .find(|u| u.google_id == new_user.google_id)
        {
            user.email = new_user.email;
            user.name = new_user.name;
            user.access_token = new_user.access_token;
            if new_user.refresh_token.is_some() {
                user.refresh_token = new_user.refresh_token;
            }
            user.token_expires_at = new_user.token_expires_at;
            user.updated_at = now;
            return Ok(user.clone());
        }

        if tables.users.iter().any(|u| u.email == new_user.email) {
            return Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                Box::new("users_email_key".to_string()),
            )
            .into());
        }

        let user = User {
            id: Uuid::new_v4(),
            google_id: new_user.google_id,
            email: new_user.email,
            name: new_user.name,
            access_token: new_user.access_token,
            refresh_token: new_user.refresh_token,
            token_expires_at: new_user.token_expires_at,
            last_sync_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn update_access_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
            user.access_token = Some(token.to_string());
            user.token_expires_at = expires_at;
        }
        Ok(())
    }

    async fn advance_watermark(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
            if user.last_sync_at.map_or(true, |current| current <= at) {
                user.last_sync_at = Some(at);
            }
        }
        Ok(())
    }

    async fn get_email(&self, email_id: Uuid) -> Result<Option<Email>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.emails.iter().find(|e| e.id == email_id).cloned())
    }

    async fn find_email_by_provider_id(&self, gmail_id: &str) -> Result<Option<Email>> {
        let tables = self.tables.lock().unwrap();
        if tables.racing.contains(gmail_id) {
            return Ok(None);
        }
        Ok(tables.emails.iter().find(|e| e.gmail_id == gmail_id).cloned())
    }

    async fn insert_email(&self, new_email: NewEmail) -> Result<Option<Email>> {
        let mut tables = self.tables.lock().unwrap();
        if tables.emails.iter().any(|e| e.gmail_id == new_email.gmail_id) {
            return Ok(None);
        }
        let email = Email {
            id: Uuid::new_v4(),
            user_id: new_email.user_id,
            gmail_id: new_email.gmail_id,
            thread_id: new_email.thread_id,
            subject: new_email.subject,
            sender: new_email.sender,
            recipient: new_email.recipient,
            body_text: new_email.body_text,
            body_html: new_email.body_html,
            received_at: new_email.received_at,
            is_processed: false,
            is_interview_related: false,
            created_at: Utc::now(),
        };
        tables.emails.push(email.clone());
        if tables.racing.remove(&email.gmail_id) {
            return Ok(None);
        }
        Ok(Some(email))
    }

    async fn list_recent_emails(&self, user_id: Uuid, limit: i64) -> Result<Vec<Email>> {
        let tables = self.tables.lock().unwrap();
        let mut emails: Vec<Email> = tables
            .emails
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        emails.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        emails.truncate(limit.max(0) as usize);
        Ok(emails)
    }

    async fn count_emails(&self, user_id: Uuid) -> Result<i64> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.emails.iter().filter(|e| e.user_id == user_id).count() as i64)
    }

    async fn count_interview_emails(&self, user_id: Uuid) -> Result<i64> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .emails
            .iter()
            .filter(|e| e.user_id == user_id && e.is_interview_related)
            .count() as i64)
    }

    async fn set_interview_flag(&self, email_id: Uuid, is_interview: bool) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(email) = tables.emails.iter_mut().find(|e| e.id == email_id) {
            email.is_interview_related = is_interview;
            email.is_processed = true;
        }
        Ok(())
    }

    async fn get_invitation(&self, invitation_id: Uuid) -> Result<Option<InterviewInvitation>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .invitations
            .iter()
            .find(|i| i.id == invitation_id)
            .cloned())
    }

    async fn get_invitation_by_email(&self, email_id: Uuid) -> Result<Option<InterviewInvitation>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .invitations
            .iter()
            .find(|i| i.email_id == email_id)
            .cloned())
    }

    async fn upsert_invitation(
        &self,
        email_id: Uuid,
        info: &ExtractedInterviewInfo,
        status: ExtractionStatus,
    ) -> Result<InterviewInvitation> {
        let mut tables = self.tables.lock().unwrap();
        let now = Utc::now();
        if let Some(existing) = tables.invitations.iter_mut().find(|i| i.email_id == email_id) {
            merge_invitation(existing, info, status, now).apply_to(existing);
            return Ok(existing.clone());
        }

        let row = NewInvitation::new(email_id, info, status);
        let invitation = InterviewInvitation {
            id: Uuid::new_v4(),
            email_id: row.email_id,
            company_name: row.company_name,
            position: row.position,
            interview_date: row.interview_date,
            interview_time: row.interview_time,
            interview_location: row.interview_location,
            interview_type: row.interview_type,
            interviewer_name: row.interviewer_name,
            interviewer_email: row.interviewer_email,
            additional_info: row.additional_info,
            confidence_score: row.confidence_score,
            extraction_status: row.extraction_status,
            created_at: now,
            updated_at: now,
        };
        tables.invitations.push(invitation.clone());
        Ok(invitation)
    }

    async fn insert_draft(&self, new_draft: NewDraftReply) -> Result<DraftReply> {
        let draft = DraftReply {
            id: Uuid::new_v4(),
            interview_invitation_id: new_draft.interview_invitation_id,
            subject: new_draft.subject,
            body: new_draft.body,
            tone: new_draft.tone,
            is_sent: false,
            sent_at: None,
            created_at: Utc::now(),
        };
        self.tables.lock().unwrap().drafts.push(draft.clone());
        Ok(draft)
    }

    async fn get_draft(&self, draft_id: Uuid) -> Result<Option<DraftReply>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.drafts.iter().find(|d| d.id == draft_id).cloned())
    }

    async fn list_drafts(&self, invitation_id: Uuid) -> Result<Vec<DraftReply>> {
        let tables = self.tables.lock().unwrap();
        let mut drafts: Vec<DraftReply> = tables
            .drafts
            .iter()
            .filter(|d| d.interview_invitation_id == invitation_id)
            .cloned()
            .collect();
        drafts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(drafts)
    }

    async fn mark_draft_sent(&self, draft_id: Uuid, at: DateTime<Utc>) -> Result<Option<DraftReply>> {
        let mut tables = self.tables.lock().unwrap();
        match tables.drafts.iter_mut().find(|d| d.id == draft_id && !d.is_sent) {
            Some(draft) => {
                draft.is_sent = true;
                draft.sent_at = Some(at);
                Ok(Some(draft.clone()))
            }
            None => Ok(None),
        }
    }

    async fn release_draft(&self, draft_id: Uuid, claimed_at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(draft) = tables
            .drafts
            .iter_mut()
            .find(|d| d.id == draft_id && d.is_sent && d.sent_at == Some(claimed_at))
        {
            draft.is_sent = false;
            draft.sent_at = None;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Mail gateway
// ----------------------------------------------------------------------------

#[derive(Default)]
struct Mailbox {
    listed: Vec<String>,
    messages: HashMap<String, ParsedMessage>,
    broken: HashSet<String>,
    queries: Vec<String>,
    sent: Vec<(String, String, String)>,
    reject_sends: bool,
}

/// Shared-state fake; clones see the same mailbox, so a clone handed out by
/// [`MailConnector::connect`] can be inspected afterwards.
#[derive(Clone, Default)]
pub struct FakeGateway {
    mailbox: Arc<Mutex<Mailbox>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a message both listable and fetchable.
    pub fn add_message(&self, message: ParsedMessage) {
        let mut mailbox = self.mailbox.lock().unwrap();
        mailbox.listed.push(message.gmail_id.clone());
        mailbox.messages.insert(message.gmail_id.clone(), message);
    }

    /// List an id whose fetch fails.
    pub fn add_broken(&self, gmail_id: &str) {
        let mut mailbox = self.mailbox.lock().unwrap();
        mailbox.listed.push(gmail_id.to_string());
        mailbox.broken.insert(gmail_id.to_string());
    }

    pub fn reject_sends(&self) {
        self.mailbox.lock().unwrap().reject_sends = true;
    }

    pub fn queries(&self) -> Vec<String> {
        self.mailbox.lock().unwrap().queries.clone()
    }

    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.mailbox.lock().unwrap().sent.clone()
    }
}

pub fn message(gmail_id: &str, subject: &str, sender: &str, body: &str) -> ParsedMessage {
    ParsedMessage {
        gmail_id: gmail_id.to_string(),
        thread_id: format!("thread-{}", gmail_id),
        subject: subject.to_string(),
        sender: sender.to_string(),
        recipient: "me@example.com".to_string(),
        body_text: Some(body.to_string()),
        body_html: None,
        received_at: Utc::now(),
    }
}

#[async_trait]
impl MailGateway for FakeGateway {
    async fn list_messages(&self, query: &str, max_results: u32) -> Vec<String> {
        let mut mailbox = self.mailbox.lock().unwrap();
        mailbox.queries.push(query.to_string());
        mailbox
            .listed
            .iter()
            .take(max_results as usize)
            .cloned()
            .collect()
    }

    async fn get_message(&self, message_id: &str) -> Option<ParsedMessage> {
        let mailbox = self.mailbox.lock().unwrap();
        if mailbox.broken.contains(message_id) {
            return None;
        }
        mailbox.messages.get(message_id).cloned()
    }

    async fn send_message(&self, to: &str, subject: &str, body: &str) -> Option<String> {
        let mut mailbox = self.mailbox.lock().unwrap();
        if mailbox.reject_sends {
            return None;
        }
        mailbox
            .sent
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Some(format!("sent-{}", mailbox.sent.len()))
    }
}

#[async_trait]
impl MailConnector for FakeGateway {
    async fn connect(&self, _user: &User) -> Result<Box<dyn MailGateway>> {
        Ok(Box::new(self.clone()))
    }
}

// ----------------------------------------------------------------------------
// Chat model
// ----------------------------------------------------------------------------

type Responder = dyn Fn(&str, &str) -> std::result::Result<String, String> + Send + Sync;

/// Chat model answering through a closure of (system, user) prompt.
#[derive(Clone)]
pub struct ScriptedChat {
    responder: Arc<Responder>,
    calls: Arc<Mutex<usize>>,
}

impl ScriptedChat {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &str) -> std::result::Result<String, String> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Same answer to every prompt.
    pub fn replying(answer: &str) -> Self {
        let answer = answer.to_string();
        Self::new(move |_, _| Ok(answer.clone()))
    }

    /// Every request fails as if the provider were down.
    pub fn unreachable() -> Self {
        Self::new(|_, _| Err("connection refused".to_string()))
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ChatCompletion for ScriptedChat {
    async fn complete(&self, system: &str, user: &str, _temperature: f32) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        (self.responder)(system, user).map_err(|e| anyhow!(e))
    }
}
