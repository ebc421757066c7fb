use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of the body preview returned by email listings.
pub const BODY_PREVIEW_CHARS: usize = 200;

// ============================================================================
// Stored entities
// ============================================================================

/// Email struct matching database column order exactly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct Email {
    pub id: Uuid,
    pub user_id: Uuid,
    pub gmail_id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub received_at: DateTime<Utc>,
    pub is_processed: bool,
    pub is_interview_related: bool,
    pub created_at: DateTime<Utc>,
}

/// Interview metadata extracted from a single email.
/// At most one row exists per email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct InterviewInvitation {
    pub id: Uuid,
    pub email_id: Uuid,
    pub company_name: Option<String>,
    pub position: Option<String>,
    pub interview_date: Option<NaiveDate>,
    pub interview_time: Option<String>,
    pub interview_location: Option<String>,
    pub interview_type: Option<String>, // stored as VARCHAR: "online", "onsite", "phone"
    pub interviewer_name: Option<String>,
    pub interviewer_email: Option<String>,
    pub additional_info: Option<String>,
    pub confidence_score: i32,
    pub extraction_status: String, // "structured" or "degraded"
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A generated reply candidate. Drafts are never overwritten, each
/// generation adds a new row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct DraftReply {
    pub id: Uuid,
    pub interview_invitation_id: Uuid,
    pub subject: String,
    pub body: String,
    pub tone: String, // stored as VARCHAR: "professional", "friendly", "formal"
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Enumerations
// ============================================================================

/// Tone requested for a generated reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Friendly,
    Formal,
}

impl Tone {
    pub fn as_str(&self) -> &str {
        match self {
            Tone::Professional => "professional",
            Tone::Friendly => "friendly",
            Tone::Formal => "formal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "professional" => Some(Tone::Professional),
            "friendly" => Some(Tone::Friendly),
            "formal" => Some(Tone::Formal),
            _ => None,
        }
    }
}

/// How the interview takes place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterviewType {
    Online,
    Onsite,
    Phone,
}

impl InterviewType {
    pub fn as_str(&self) -> &str {
        match self {
            InterviewType::Online => "online",
            InterviewType::Onsite => "onsite",
            InterviewType::Phone => "phone",
        }
    }

    /// Lenient parse used on model output ("On-site", "ONLINE", ...).
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        match normalized.as_str() {
            "online" | "video" | "virtual" | "remote" => Some(InterviewType::Online),
            "onsite" | "inperson" | "office" => Some(InterviewType::Onsite),
            "phone" | "telephone" | "call" => Some(InterviewType::Phone),
            _ => None,
        }
    }
}

/// Language family used to pick prompt templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Chinese,
    #[default]
    English,
}

impl Language {
    pub fn as_str(&self) -> &str {
        match self {
            Language::Chinese => "chinese",
            Language::English => "english",
        }
    }
}

/// Whether an extraction came from a parsed model response or from the
/// all-null fallback used when the response could not be structured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Structured,
    Degraded,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ExtractionStatus::Structured => "structured",
            ExtractionStatus::Degraded => "degraded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "structured" => Some(ExtractionStatus::Structured),
            "degraded" => Some(ExtractionStatus::Degraded),
            _ => None,
        }
    }
}

/// Which strategy produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    /// Parsed from the model's JSON answer
    Structured,
    /// Model answered but not in the expected shape; keyword scan used
    KeywordFallback,
    /// Model unreachable; narrowed keyword scan used
    OfflineFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Initial,
    Incremental,
}

// ============================================================================
// Extraction record
// ============================================================================

/// Normalized interview fields produced by the extraction step.
///
/// `None` means "no information"; merging into an existing invitation only
/// overwrites fields that are `Some`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtractedInterviewInfo {
    pub company_name: Option<String>,
    pub position: Option<String>,
    pub interview_date: Option<NaiveDate>,
    pub interview_time: Option<String>,
    pub interview_location: Option<String>,
    pub interview_type: Option<InterviewType>,
    pub interviewer_name: Option<String>,
    pub interviewer_email: Option<String>,
    pub additional_info: Option<String>,
    pub confidence_score: u8,
}

impl ExtractedInterviewInfo {
    /// Record with every field empty and the given confidence.
    pub fn empty(confidence_score: u8) -> Self {
        Self {
            confidence_score,
            ..Default::default()
        }
    }
}

impl From<&InterviewInvitation> for ExtractedInterviewInfo {
    fn from(inv: &InterviewInvitation) -> Self {
        ExtractedInterviewInfo {
            company_name: inv.company_name.clone(),
            position: inv.position.clone(),
            interview_date: inv.interview_date,
            interview_time: inv.interview_time.clone(),
            interview_location: inv.interview_location.clone(),
            interview_type: inv.interview_type.as_deref().and_then(InterviewType::from_str),
            interviewer_name: inv.interviewer_name.clone(),
            interviewer_email: inv.interviewer_email.clone(),
            additional_info: inv.additional_info.clone(),
            confidence_score: inv.confidence_score.clamp(0, 100) as u8,
        }
    }
}

// ============================================================================
// API Request/Response types
// ============================================================================

/// Registers a mailbox owner with tokens obtained by an OAuth flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterUserRequest {
    pub google_id: String,
    pub email: String,
    pub name: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds (defaults to one hour)
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncInfo {
    pub last_sync_at: Option<DateTime<Utc>>,
    pub need_initial_sync: bool,
    pub current_email_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatusResponse {
    pub user_id: Uuid,
    pub email: String,
    pub gmail_connected: bool,
    pub token_expired: bool,
    pub total_emails: i64,
    pub interview_emails: i64,
    pub sync_info: SyncInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncQuery {
    pub max_results: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub user_id: Uuid,
    pub sync_type: SyncType,
    pub query: String,
    pub synced_count: usize,
    pub listed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub last_sync_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailListQuery {
    pub limit: Option<i64>,
}

/// Email listing entry with a truncated body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: Uuid,
    pub subject: String,
    pub sender: String,
    pub received_at: DateTime<Utc>,
    pub is_interview_related: bool,
    pub body_preview: Option<String>,
}

impl From<Email> for EmailSummary {
    fn from(email: Email) -> Self {
        EmailSummary {
            id: email.id,
            body_preview: email.body_text.as_deref().map(body_preview),
            subject: email.subject,
            sender: email.sender,
            received_at: email.received_at,
            is_interview_related: email.is_interview_related,
        }
    }
}

/// Truncate a body to the preview length, marking truncation with "...".
pub fn body_preview(body: &str) -> String {
    if body.chars().count() > BODY_PREVIEW_CHARS {
        let head: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        body.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub email_id: Uuid,
    pub subject: String,
    pub is_interview: bool,
    pub confidence: u8,
    pub method: ClassificationMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub email_id: Uuid,
    pub status: ExtractionStatus,
    pub extracted_info: ExtractedInterviewInfo,
    pub invitation: InterviewInvitation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotateQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAnnotateResponse {
    pub examined: usize,
    pub interviews: usize,
    pub extracted: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplyQuery {
    pub tone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftReplyResponse {
    pub email_id: Uuid,
    pub draft: DraftReply,
    /// True when the invitation was extracted as part of this request
    pub auto_extracted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendDraftResponse {
    pub draft: DraftReply,
    pub provider_message_id: String,
}
