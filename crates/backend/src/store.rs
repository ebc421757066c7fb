//! Persistence seam used by the pipeline.
//!
//! Services only see the [`Store`] trait; [`PgStore`] implements it over the
//! diesel-async pool. Every method checks a connection out of the pool for the
//! duration of one unit of work and returns it when the guard drops.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::{DraftReply, Email, ExtractedInterviewInfo, ExtractionStatus, InterviewInvitation};
use uuid::Uuid;

use crate::db::{self, DbPool};
use crate::models::{NewDraftReply, NewEmail, NewUser, User};

#[async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>>;
    async fn upsert_user(&self, new_user: NewUser) -> Result<User>;
    async fn update_access_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
    /// Set the sync watermark to `at` unless it is already later.
    async fn advance_watermark(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    // Emails
    async fn get_email(&self, email_id: Uuid) -> Result<Option<Email>>;
    async fn find_email_by_provider_id(&self, gmail_id: &str) -> Result<Option<Email>>;
    /// Insert-or-skip on the provider id; `None` when the id already exists.
    async fn insert_email(&self, new_email: NewEmail) -> Result<Option<Email>>;
    async fn list_recent_emails(&self, user_id: Uuid, limit: i64) -> Result<Vec<Email>>;
    async fn count_emails(&self, user_id: Uuid) -> Result<i64>;
    async fn count_interview_emails(&self, user_id: Uuid) -> Result<i64>;
    async fn set_interview_flag(&self, email_id: Uuid, is_interview: bool) -> Result<()>;

    // Invitations
    async fn get_invitation(&self, invitation_id: Uuid) -> Result<Option<InterviewInvitation>>;
    async fn get_invitation_by_email(&self, email_id: Uuid) -> Result<Option<InterviewInvitation>>;
    /// Create or merge the single invitation attached to `email_id`.
    async fn upsert_invitation(
        &self,
        email_id: Uuid,
        info: &ExtractedInterviewInfo,
        status: ExtractionStatus,
    ) -> Result<InterviewInvitation>;

    // Drafts
    async fn insert_draft(&self, new_draft: NewDraftReply) -> Result<DraftReply>;
    async fn get_draft(&self, draft_id: Uuid) -> Result<Option<DraftReply>>;
    async fn list_drafts(&self, invitation_id: Uuid) -> Result<Vec<DraftReply>>;
    /// Mark an unsent draft as sent; `None` if it was missing or already sent.
    async fn mark_draft_sent(&self, draft_id: Uuid, at: DateTime<Utc>) -> Result<Option<DraftReply>>;
    /// Undo a `mark_draft_sent` made at `claimed_at` whose delivery failed.
    async fn release_draft(&self, draft_id: Uuid, claimed_at: DateTime<Utc>) -> Result<()>;
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn list_users(&self) -> Result<Vec<User>> {
        let mut conn = self.pool.get().await?;
        db::users::list_all(&mut conn).await
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let mut conn = self.pool.get().await?;
        db::users::get_by_id(&mut conn, user_id).await
    }

    async fn upsert_user(&self, new_user: NewUser) -> Result<User> {
        let mut conn = self.pool.get().await?;
        db::users::upsert(&mut conn, new_user).await
    }

    async fn update_access_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut conn = self.pool.get().await?;
        db::users::update_access_token(&mut conn, user_id, token, expires_at).await
    }

    async fn advance_watermark(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.pool.get().await?;
        db::users::advance_watermark(&mut conn, user_id, at).await
    }

    async fn get_email(&self, email_id: Uuid) -> Result<Option<Email>> {
        let mut conn = self.pool.get().await?;
        db::emails::get_by_id(&mut conn, email_id).await
    }

    async fn find_email_by_provider_id(&self, gmail_id: &str) -> Result<Option<Email>> {
        let mut conn = self.pool.get().await?;
        db::emails::find_by_gmail_id(&mut conn, gmail_id).await
    }

    async fn insert_email(&self, new_email: NewEmail) -> Result<Option<Email>> {
        let mut conn = self.pool.get().await?;
        db::emails::insert(&mut conn, new_email).await
    }

    async fn list_recent_emails(&self, user_id: Uuid, limit: i64) -> Result<Vec<Email>> {
        let mut conn = self.pool.get().await?;
        db::emails::list_recent(&mut conn, user_id, limit).await
    }

    async fn count_emails(&self, user_id: Uuid) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        db::emails::count_by_user(&mut conn, user_id).await
    }

    async fn count_interview_emails(&self, user_id: Uuid) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        db::emails::count_interviews_by_user(&mut conn, user_id).await
    }

    async fn set_interview_flag(&self, email_id: Uuid, is_interview: bool) -> Result<()> {
        let mut conn = self.pool.get().await?;
        db::emails::set_interview_flag(&mut conn, email_id, is_interview).await
    }

    async fn get_invitation(&self, invitation_id: Uuid) -> Result<Option<InterviewInvitation>> {
        let mut conn = self.pool.get().await?;
        db::invitations::get_by_id(&mut conn, invitation_id).await
    }

    async fn get_invitation_by_email(&self, email_id: Uuid) -> Result<Option<InterviewInvitation>> {
        let mut conn = self.pool.get().await?;
        db::invitations::get_by_email(&mut conn, email_id).await
    }

    async fn upsert_invitation(
        &self,
        email_id: Uuid,
        info: &ExtractedInterviewInfo,
        status: ExtractionStatus,
    ) -> Result<InterviewInvitation> {
        let mut conn = self.pool.get().await?;
        db::invitations::upsert(&mut conn, email_id, info, status).await
    }

    async fn insert_draft(&self, new_draft: NewDraftReply) -> Result<DraftReply> {
        let mut conn = self.pool.get().await?;
        db::drafts::insert(&mut conn, new_draft).await
    }

    async fn get_draft(&self, draft_id: Uuid) -> Result<Option<DraftReply>> {
        let mut conn = self.pool.get().await?;
        db::drafts::get_by_id(&mut conn, draft_id).await
    }

    async fn list_drafts(&self, invitation_id: Uuid) -> Result<Vec<DraftReply>> {
        let mut conn = self.pool.get().await?;
        db::drafts::list_by_invitation(&mut conn, invitation_id).await
    }

    async fn mark_draft_sent(&self, draft_id: Uuid, at: DateTime<Utc>) -> Result<Option<DraftReply>> {
        let mut conn = self.pool.get().await?;
        db::drafts::mark_sent(&mut conn, draft_id, at).await
    }

    async fn release_draft(&self, draft_id: Uuid, claimed_at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.pool.get().await?;
        db::drafts::release(&mut conn, draft_id, claimed_at).await
    }
}
