use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager, ManagerConfig},
    AsyncPgConnection, RunQueryDsl,
};
use shared_types::{DraftReply, Email, InterviewInvitation};
use uuid::Uuid;

use crate::models::{NewDraftReply, NewEmail, NewUser, User};

pub type DbPool = Pool<AsyncPgConnection>;

async fn establish_tls_connection(config: String) -> diesel::ConnectionResult<AsyncPgConnection> {
    // Set up rustls TLS configuration
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    let (client, connection) = tokio_postgres::connect(&config, tls)
        .await
        .map_err(|e| diesel::ConnectionError::BadConnection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    AsyncPgConnection::try_from(client).await
}

/// Build the process-wide pool. Called once from `main`; the pool is then
/// handed to the store by value.
pub fn establish_connection_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let mut manager_config = ManagerConfig::default();
    manager_config.custom_setup =
        Box::new(|url| Box::pin(establish_tls_connection(url.to_string())));

    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(
        database_url,
        manager_config,
    );
    let pool = Pool::builder(config).build()?;

    Ok(pool)
}

// User database operations
pub mod users {
    use super::*;

    pub async fn list_all(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<User>> {
        use crate::schema::users::dsl::*;

        let items = users.order_by(created_at.desc()).load::<User>(conn).await?;

        Ok(items)
    }

    pub async fn get_by_id(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
    ) -> anyhow::Result<Option<User>> {
        use crate::schema::users::dsl::*;

        let user = users
            .filter(id.eq(user_id))
            .first::<User>(conn)
            .await
            .optional()?;

        Ok(user)
    }

    /// Insert a user or refresh the tokens of the one with the same provider identity.
    pub async fn upsert(conn: &mut AsyncPgConnection, new_user: NewUser) -> anyhow::Result<User> {
        use crate::schema::users::dsl::*;

        // Google only returns a refresh token on first consent; keep the stored one otherwise.
        let kept_refresh = match &new_user.refresh_token {
            Some(_) => new_user.refresh_token.clone(),
            None => users
                .filter(google_id.eq(&new_user.google_id))
                .select(refresh_token)
                .first::<Option<String>>(conn)
                .await
                .optional()?
                .flatten(),
        };

        let user = diesel::insert_into(users)
            .values(&new_user)
            .on_conflict(google_id)
            .do_update()
            .set((
                email.eq(&new_user.email),
                name.eq(&new_user.name),
                access_token.eq(&new_user.access_token),
                refresh_token.eq(&kept_refresh),
                token_expires_at.eq(new_user.token_expires_at),
                updated_at.eq(Utc::now()),
            ))
            .get_result::<User>(conn)
            .await?;

        Ok(user)
    }

    pub async fn update_access_token(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        use crate::schema::users::dsl::*;

        diesel::update(users.filter(id.eq(user_id)))
            .set((
                access_token.eq(Some(token)),
                token_expires_at.eq(expires_at),
                updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Move the sync watermark forward. Rows whose watermark is already
    /// later than `at` are left alone, so the value never decreases.
    pub async fn advance_watermark(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        use crate::schema::users::dsl::*;

        diesel::update(
            users
                .filter(id.eq(user_id))
                .filter(last_sync_at.is_null().or(last_sync_at.le(at))),
        )
        .set((last_sync_at.eq(Some(at)), updated_at.eq(Utc::now())))
        .execute(conn)
        .await?;

        Ok(())
    }
}

// Email database operations
pub mod emails {
    use super::*;

    pub async fn get_by_id(
        conn: &mut AsyncPgConnection,
        email_id: Uuid,
    ) -> anyhow::Result<Option<Email>> {
        use crate::schema::emails::dsl::*;

        let email = emails
            .filter(id.eq(email_id))
            .first::<Email>(conn)
            .await
            .optional()?;
        Ok(email)
    }

    pub async fn find_by_gmail_id(
        conn: &mut AsyncPgConnection,
        provider_id: &str,
    ) -> anyhow::Result<Option<Email>> {
        use crate::schema::emails::dsl::*;

        let email = emails
            .filter(gmail_id.eq(provider_id))
            .first::<Email>(conn)
            .await
            .optional()?;
        Ok(email)
    }

    /// Insert a new email. Uses ON CONFLICT DO NOTHING on the provider id, so
    /// `None` means another sync already stored it.
    pub async fn insert(
        conn: &mut AsyncPgConnection,
        new_email: NewEmail,
    ) -> anyhow::Result<Option<Email>> {
        use crate::schema::emails::dsl::*;

        let result = diesel::insert_into(emails)
            .values(&new_email)
            .on_conflict(gmail_id)
            .do_nothing()
            .get_result::<Email>(conn)
            .await
            .optional()?;

        Ok(result)
    }

    pub async fn list_recent(
        conn: &mut AsyncPgConnection,
        owner_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<Email>> {
        use crate::schema::emails::dsl::*;

        let items = emails
            .filter(user_id.eq(owner_id))
            .order_by(received_at.desc())
            .limit(limit)
            .load::<Email>(conn)
            .await?;
        Ok(items)
    }

    pub async fn count_by_user(conn: &mut AsyncPgConnection, owner_id: Uuid) -> anyhow::Result<i64> {
        use crate::schema::emails::dsl::*;

        let count: i64 = emails
            .filter(user_id.eq(owner_id))
            .count()
            .get_result(conn)
            .await?;
        Ok(count)
    }

    pub async fn count_interviews_by_user(
        conn: &mut AsyncPgConnection,
        owner_id: Uuid,
    ) -> anyhow::Result<i64> {
        use crate::schema::emails::dsl::*;

        let count: i64 = emails
            .filter(user_id.eq(owner_id))
            .filter(is_interview_related.eq(true))
            .count()
            .get_result(conn)
            .await?;
        Ok(count)
    }

    /// Record a classification result and mark the email processed
    pub async fn set_interview_flag(
        conn: &mut AsyncPgConnection,
        email_id: Uuid,
        flag: bool,
    ) -> anyhow::Result<()> {
        use crate::schema::emails::dsl::*;

        diesel::update(emails.filter(id.eq(email_id)))
            .set((is_interview_related.eq(flag), is_processed.eq(true)))
            .execute(conn)
            .await?;

        Ok(())
    }
}

// Interview invitation database operations
pub mod invitations {
    use super::*;
    use crate::models::{merge_invitation, NewInvitation};
    use diesel_async::scoped_futures::ScopedFutureExt;
    use diesel_async::AsyncConnection;
    use shared_types::{ExtractedInterviewInfo, ExtractionStatus};

    pub async fn get_by_id(
        conn: &mut AsyncPgConnection,
        invitation_id: Uuid,
    ) -> anyhow::Result<Option<InterviewInvitation>> {
        use crate::schema::interview_invitations::dsl::*;

        let row = interview_invitations
            .filter(id.eq(invitation_id))
            .first::<InterviewInvitation>(conn)
            .await
            .optional()?;
        Ok(row)
    }

    pub async fn get_by_email(
        conn: &mut AsyncPgConnection,
        for_email: Uuid,
    ) -> anyhow::Result<Option<InterviewInvitation>> {
        use crate::schema::interview_invitations::dsl::*;

        let row = interview_invitations
            .filter(email_id.eq(for_email))
            .first::<InterviewInvitation>(conn)
            .await
            .optional()?;
        Ok(row)
    }

    /// Create the invitation for an email or merge into the existing one.
    ///
    /// Runs in one transaction; the unique index on `email_id` keeps it a
    /// singleton even if two extractions race.
    pub async fn upsert(
        conn: &mut AsyncPgConnection,
        for_email: Uuid,
        info: &ExtractedInterviewInfo,
        status: ExtractionStatus,
    ) -> anyhow::Result<InterviewInvitation> {
        use crate::schema::interview_invitations::dsl::*;

        let row = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                async move {
                    let inserted = diesel::insert_into(interview_invitations)
                        .values(NewInvitation::new(for_email, info, status))
                        .on_conflict(email_id)
                        .do_nothing()
                        .get_result::<InterviewInvitation>(conn)
                        .await
                        .optional()?;

                    if let Some(row) = inserted {
                        return Ok(row);
                    }

                    let existing = interview_invitations
                        .filter(email_id.eq(for_email))
                        .for_update()
                        .first::<InterviewInvitation>(conn)
                        .await?;

                    let changes = merge_invitation(&existing, info, status, Utc::now());
                    diesel::update(interview_invitations.filter(id.eq(existing.id)))
                        .set(&changes)
                        .get_result::<InterviewInvitation>(conn)
                        .await
                }
                .scope_boxed()
            })
            .await?;

        Ok(row)
    }
}

// Draft reply database operations
pub mod drafts {
    use super::*;

    pub async fn insert(
        conn: &mut AsyncPgConnection,
        new_draft: NewDraftReply,
    ) -> anyhow::Result<DraftReply> {
        use crate::schema::draft_replies::dsl::*;

        let row = diesel::insert_into(draft_replies)
            .values(&new_draft)
            .get_result::<DraftReply>(conn)
            .await?;
        Ok(row)
    }

    pub async fn get_by_id(
        conn: &mut AsyncPgConnection,
        draft_id: Uuid,
    ) -> anyhow::Result<Option<DraftReply>> {
        use crate::schema::draft_replies::dsl::*;

        let row = draft_replies
            .filter(id.eq(draft_id))
            .first::<DraftReply>(conn)
            .await
            .optional()?;
        Ok(row)
    }

    pub async fn list_by_invitation(
        conn: &mut AsyncPgConnection,
        invitation_id: Uuid,
    ) -> anyhow::Result<Vec<DraftReply>> {
        use crate::schema::draft_replies::dsl::*;

        let rows = draft_replies
            .filter(interview_invitation_id.eq(invitation_id))
            .order_by(created_at.desc())
            .load::<DraftReply>(conn)
            .await?;
        Ok(rows)
    }

    /// Flip a draft to sent. Only unsent drafts match, so a draft is marked at most once.
    pub async fn mark_sent(
        conn: &mut AsyncPgConnection,
        draft_id: Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<DraftReply>> {
        use crate::schema::draft_replies::dsl::*;

        let row = diesel::update(draft_replies.filter(id.eq(draft_id)).filter(is_sent.eq(false)))
            .set((is_sent.eq(true), sent_at.eq(Some(at))))
            .get_result::<DraftReply>(conn)
            .await
            .optional()?;
        Ok(row)
    }

    /// Reset a draft marked sent at `claimed_at`. A later claim is left alone.
    pub async fn release(
        conn: &mut AsyncPgConnection,
        draft_id: Uuid,
        claimed_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        use crate::schema::draft_replies::dsl::*;

        diesel::update(
            draft_replies
                .filter(id.eq(draft_id))
                .filter(is_sent.eq(true))
                .filter(sent_at.eq(Some(claimed_at))),
        )
        .set((is_sent.eq(false), sent_at.eq(None::<DateTime<Utc>>)))
        .execute(conn)
        .await?;
        Ok(())
    }
}
