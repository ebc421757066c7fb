use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use shared_types::{
    AnalyzeResponse, AnnotateQuery, BatchAnnotateResponse, DraftReply, DraftReplyResponse,
    EmailListQuery, EmailSummary, ExtractResponse, RegisterUserRequest, ReplyQuery,
    SendDraftResponse, SyncInfo, SyncQuery, SyncResponse, Tone, UserResponse, UserStatusResponse,
};
use uuid::Uuid;

use crate::annotation::AnnotationEngine;
use crate::config::SyncConfig;
use crate::error::{ApiError, ApiResult};
use crate::gmail::MailConnector;
use crate::models::{NewUser, User};
use crate::services::{AnnotationService, ReplyService, SyncService};
use crate::store::Store;

const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;
const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 3600;
const DEFAULT_EMAIL_LIST_LIMIT: i64 = 10;
const MAX_LIST_LIMIT: i64 = 100;
const MAX_SYNC_RESULTS: u32 = 500;

/// Shared handler state. Everything is injected at startup.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub engine: AnnotationEngine,
    pub mail: Arc<dyn MailConnector>,
    pub sync: SyncConfig,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // User routes
        .route("/api/users", get(list_users).post(register_user))
        .route("/api/users/:id", get(get_user))
        .route("/api/users/:id/status", get(user_status))
        .route("/api/users/:id/sync", post(sync_emails))
        .route("/api/users/:id/emails", get(list_emails))
        .route("/api/users/:id/annotate", post(annotate_recent))
        // Email routes
        .route("/api/emails/:id/analyze", post(analyze_email))
        .route("/api/emails/:id/extract", post(extract_email))
        .route("/api/emails/:id/reply", post(generate_reply))
        .route("/api/emails/:id/drafts", get(list_drafts))
        // Draft routes
        .route("/api/drafts/:id/send", post(send_draft))
        .with_state(state)
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn load_user(store: &dyn Store, user_id: Uuid) -> ApiResult<User> {
    store
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

// User handlers
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUserRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    if payload.google_id.trim().is_empty() {
        return Err(ApiError::bad_request("google_id is required"));
    }
    if !payload.email.contains('@') {
        return Err(ApiError::bad_request("email is not a valid address"));
    }
    if payload.access_token.trim().is_empty() {
        return Err(ApiError::bad_request("access_token is required"));
    }

    let lifetime = payload.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    if !(1..=MAX_TOKEN_LIFETIME_SECS).contains(&lifetime) {
        return Err(ApiError::bad_request(
            "expires_in must be between 1 second and one year",
        ));
    }
    let user = state
        .store
        .upsert_user(NewUser {
            google_id: payload.google_id,
            email: payload.email,
            name: payload.name,
            access_token: Some(payload.access_token),
            refresh_token: payload.refresh_token,
            token_expires_at: Some(Utc::now() + chrono::Duration::seconds(lifetime)),
        })
        .await?;

    tracing::info!("Registered user {} ({})", user.email, user.id);
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserResponse>>> {
    let users = state.store.list_users().await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<UserResponse>> {
    let user = load_user(state.store.as_ref(), user_id).await?;
    Ok(Json(user.into()))
}

pub async fn user_status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<UserStatusResponse>> {
    let user = load_user(state.store.as_ref(), user_id).await?;
    let total_emails = state.store.count_emails(user.id).await?;
    let interview_emails = state.store.count_interview_emails(user.id).await?;
    let now = Utc::now();

    Ok(Json(UserStatusResponse {
        user_id: user.id,
        gmail_connected: user.has_live_token(now),
        token_expired: user.token_expired(now),
        total_emails,
        interview_emails,
        sync_info: SyncInfo {
            last_sync_at: user.last_sync_at,
            need_initial_sync: user.last_sync_at.is_none(),
            current_email_count: total_emails,
        },
        email: user.email,
    }))
}

pub async fn sync_emails(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<SyncQuery>,
) -> ApiResult<Json<SyncResponse>> {
    if query.max_results == Some(0) {
        return Err(ApiError::bad_request("max_results must be at least 1"));
    }
    let max_results = query.max_results.map(|n| n.min(MAX_SYNC_RESULTS));

    let user = load_user(state.store.as_ref(), user_id).await?;
    if user.refresh_token.is_none() {
        return Err(ApiError::bad_request("User has not authorized Gmail access"));
    }

    let gateway = state.mail.connect(&user).await?;
    let result = SyncService::sync_user(
        state.store.as_ref(),
        gateway.as_ref(),
        &user,
        &state.sync,
        max_results,
    )
    .await?;

    Ok(Json(result))
}

pub async fn list_emails(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<EmailListQuery>,
) -> ApiResult<Json<Vec<EmailSummary>>> {
    let user = load_user(state.store.as_ref(), user_id).await?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EMAIL_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let emails = state.store.list_recent_emails(user.id, limit).await?;
    Ok(Json(emails.into_iter().map(EmailSummary::from).collect()))
}

pub async fn annotate_recent(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<AnnotateQuery>,
) -> ApiResult<Json<BatchAnnotateResponse>> {
    let user = load_user(state.store.as_ref(), user_id).await?;
    let limit = query
        .limit
        .unwrap_or(state.sync.annotate_batch_limit)
        .clamp(1, MAX_LIST_LIMIT);

    let result =
        AnnotationService::annotate_recent(state.store.as_ref(), &state.engine, user.id, limit)
            .await?;
    Ok(Json(result))
}

// Email handlers
pub async fn analyze_email(
    State(state): State<AppState>,
    Path(email_id): Path<Uuid>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let result = AnnotationService::analyze(state.store.as_ref(), &state.engine, email_id).await?;
    Ok(Json(result))
}

pub async fn extract_email(
    State(state): State<AppState>,
    Path(email_id): Path<Uuid>,
) -> ApiResult<Json<ExtractResponse>> {
    let result = AnnotationService::extract(state.store.as_ref(), &state.engine, email_id).await?;
    Ok(Json(result))
}

pub async fn generate_reply(
    State(state): State<AppState>,
    Path(email_id): Path<Uuid>,
    Query(query): Query<ReplyQuery>,
) -> ApiResult<(StatusCode, Json<DraftReplyResponse>)> {
    let tone = match query.tone.as_deref() {
        None => Tone::default(),
        Some(raw) => Tone::from_str(raw).ok_or_else(|| {
            ApiError::bad_request(format!(
                "Unknown tone '{}', expected professional, friendly or formal",
                raw
            ))
        })?,
    };

    let result = ReplyService::generate(state.store.as_ref(), &state.engine, email_id, tone).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn list_drafts(
    State(state): State<AppState>,
    Path(email_id): Path<Uuid>,
) -> ApiResult<Json<Vec<DraftReply>>> {
    let email = state
        .store
        .get_email(email_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Email"))?;

    let drafts = match state.store.get_invitation_by_email(email.id).await? {
        Some(invitation) => state.store.list_drafts(invitation.id).await?,
        None => Vec::new(),
    };
    Ok(Json(drafts))
}

// Draft handlers
pub async fn send_draft(
    State(state): State<AppState>,
    Path(draft_id): Path<Uuid>,
) -> ApiResult<Json<SendDraftResponse>> {
    let result = ReplyService::send(state.store.as_ref(), state.mail.as_ref(), draft_id).await?;
    Ok(Json(result))
}
