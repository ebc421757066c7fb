// Database models for Diesel
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use shared_types::{ExtractedInterviewInfo, ExtractionStatus, InterviewInvitation};
use uuid::Uuid;

/// Mailbox owner. Holds OAuth tokens, so it never leaves the backend;
/// API responses use `shared_types::UserResponse`.
#[derive(Debug, Clone, PartialEq, Eq, Queryable)]
pub struct User {
    pub id: Uuid,
    pub google_id: String,
    pub email: String,
    pub name: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// An access token exists and has not expired at `now`.
    pub fn has_live_token(&self, now: DateTime<Utc>) -> bool {
        self.access_token.is_some() && !self.token_expired(now)
    }

    pub fn token_expired(&self, now: DateTime<Utc>) -> bool {
        self.token_expires_at.is_some_and(|exp| now > exp)
    }
}

impl From<User> for shared_types::UserResponse {
    fn from(user: User) -> Self {
        shared_types::UserResponse {
            id: user.id,
            email: user.email,
            name: user.name,
            last_sync_at: user.last_sync_at,
            created_at: user.created_at,
        }
    }
}

/// Insertable struct for users registering through the OAuth flow
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub google_id: String,
    pub email: String,
    pub name: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// Insertable struct for new emails
#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = crate::schema::emails)]
pub struct NewEmail {
    pub user_id: Uuid,
    pub gmail_id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Insertable struct for the first extraction of an email
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::interview_invitations)]
pub struct NewInvitation {
    pub email_id: Uuid,
    pub company_name: Option<String>,
    pub position: Option<String>,
    pub interview_date: Option<NaiveDate>,
    pub interview_time: Option<String>,
    pub interview_location: Option<String>,
    pub interview_type: Option<String>,
    pub interviewer_name: Option<String>,
    pub interviewer_email: Option<String>,
    pub additional_info: Option<String>,
    pub confidence_score: i32,
    pub extraction_status: String,
}

impl NewInvitation {
    pub fn new(email_id: Uuid, info: &ExtractedInterviewInfo, status: ExtractionStatus) -> Self {
        NewInvitation {
            email_id,
            company_name: info.company_name.clone(),
            position: info.position.clone(),
            interview_date: info.interview_date,
            interview_time: info.interview_time.clone(),
            interview_location: info.interview_location.clone(),
            interview_type: info.interview_type.map(|t| t.as_str().to_string()),
            interviewer_name: info.interviewer_name.clone(),
            interviewer_email: info.interviewer_email.clone(),
            additional_info: info.additional_info.clone(),
            confidence_score: i32::from(info.confidence_score.min(100)),
            extraction_status: status.as_str().to_string(),
        }
    }
}

/// Full replacement row for an existing invitation, produced by [`merge_invitation`].
#[derive(Debug, Clone, PartialEq, Eq, AsChangeset)]
#[diesel(table_name = crate::schema::interview_invitations)]
#[diesel(treat_none_as_null = true)]
pub struct InvitationChanges {
    pub company_name: Option<String>,
    pub position: Option<String>,
    pub interview_date: Option<NaiveDate>,
    pub interview_time: Option<String>,
    pub interview_location: Option<String>,
    pub interview_type: Option<String>,
    pub interviewer_name: Option<String>,
    pub interviewer_email: Option<String>,
    pub additional_info: Option<String>,
    pub confidence_score: i32,
    pub extraction_status: String,
    pub updated_at: DateTime<Utc>,
}

impl InvitationChanges {
    /// Write the changes onto an in-memory row.
    pub fn apply_to(self, row: &mut InterviewInvitation) {
        row.company_name = self.company_name;
        row.position = self.position;
        row.interview_date = self.interview_date;
        row.interview_time = self.interview_time;
        row.interview_location = self.interview_location;
        row.interview_type = self.interview_type;
        row.interviewer_name = self.interviewer_name;
        row.interviewer_email = self.interviewer_email;
        row.additional_info = self.additional_info;
        row.confidence_score = self.confidence_score;
        row.extraction_status = self.extraction_status;
        row.updated_at = self.updated_at;
    }
}

/// Merge a new extraction into an existing invitation.
///
/// Fields present in `incoming` overwrite, absent ones keep their stored
/// value. The confidence score and extraction status always take the
/// incoming value.
pub fn merge_invitation(
    existing: &InterviewInvitation,
    incoming: &ExtractedInterviewInfo,
    status: ExtractionStatus,
    now: DateTime<Utc>,
) -> InvitationChanges {
    fn keep<T: Clone>(stored: &Option<T>, new: &Option<T>) -> Option<T> {
        new.clone().or_else(|| stored.clone())
    }

    InvitationChanges {
        company_name: keep(&existing.company_name, &incoming.company_name),
        position: keep(&existing.position, &incoming.position),
        interview_date: incoming.interview_date.or(existing.interview_date),
        interview_time: keep(&existing.interview_time, &incoming.interview_time),
        interview_location: keep(&existing.interview_location, &incoming.interview_location),
        interview_type: incoming
            .interview_type
            .map(|t| t.as_str().to_string())
            .or_else(|| existing.interview_type.clone()),
        interviewer_name: keep(&existing.interviewer_name, &incoming.interviewer_name),
        interviewer_email: keep(&existing.interviewer_email, &incoming.interviewer_email),
        additional_info: keep(&existing.additional_info, &incoming.additional_info),
        confidence_score: i32::from(incoming.confidence_score.min(100)),
        extraction_status: status.as_str().to_string(),
        updated_at: now,
    }
}

/// Insertable struct for generated reply drafts
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::draft_replies)]
pub struct NewDraftReply {
    pub interview_invitation_id: Uuid,
    pub subject: String,
    pub body: String,
    pub tone: String,
}
