//! Draft generation and sending.

use chrono::{SubsecRound, Utc};
use shared_types::{DraftReplyResponse, ExtractedInterviewInfo, SendDraftResponse, Tone};
use uuid::Uuid;

use super::annotation::annotation_body;
use crate::annotation::AnnotationEngine;
use crate::error::{ApiError, ApiResult};
use crate::gmail::{mime, MailConnector};
use crate::models::NewDraftReply;
use crate::store::Store;

pub struct ReplyService;

impl ReplyService {
    /// Generate and store a reply draft for an email.
    ///
    /// An email without an invitation is classified first; a positive result
    /// is flagged and extracted before the reply is written.
    pub async fn generate(
        store: &dyn Store,
        engine: &AnnotationEngine,
        email_id: Uuid,
        tone: Tone,
    ) -> ApiResult<DraftReplyResponse> {
        let email = store
            .get_email(email_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Email"))?;

        let (invitation, auto_extracted) = match store.get_invitation_by_email(email.id).await? {
            Some(invitation) => (invitation, false),
            None => {
                let body = annotation_body(&email);
                let classification = engine.classify(&email.subject, body).await;
                if !classification.is_interview {
                    store.set_interview_flag(email.id, false).await?;
                    return Err(ApiError::NotInterview);
                }
                store.set_interview_flag(email.id, true).await?;

                let (info, status) = engine
                    .extract_fields(&email.subject, body)
                    .await
                    .into_parts()
                    .ok_or(ApiError::ExtractionFailed)?;
                let invitation = store.upsert_invitation(email.id, &info, status).await?;
                tracing::info!("Extracted invitation {} while drafting reply", invitation.id);
                (invitation, true)
            }
        };

        let info = ExtractedInterviewInfo::from(&invitation);
        let body = engine
            .generate_reply(&info, tone)
            .await
            .ok_or(ApiError::GenerationFailed)?;
        let subject = engine.generate_subject(&email.subject).await;

        let draft = store
            .insert_draft(NewDraftReply {
                interview_invitation_id: invitation.id,
                subject,
                body,
                tone: tone.as_str().to_string(),
            })
            .await?;

        tracing::info!("Created {} draft {} for email {}", tone.as_str(), draft.id, email.id);
        Ok(DraftReplyResponse {
            email_id: email.id,
            draft,
            auto_extracted,
        })
    }

    /// Send a stored draft to the sender of the original email.
    pub async fn send(
        store: &dyn Store,
        connector: &dyn MailConnector,
        draft_id: Uuid,
    ) -> ApiResult<SendDraftResponse> {
        let draft = store
            .get_draft(draft_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Draft"))?;
        if draft.is_sent {
            return Err(ApiError::AlreadySent);
        }

        let invitation = store
            .get_invitation(draft.interview_invitation_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Interview invitation"))?;
        let email = store
            .get_email(invitation.email_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Email"))?;

        let (to, _name) = mime::parse_from_header(&email.sender);
        if !mime::is_valid_address(&to) {
            return Err(ApiError::InvalidRecipient(email.sender));
        }

        let user = store
            .get_user(email.user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("User"))?;

        // Claim the draft before delivery so a concurrent send of it stops here.
        let claimed_at = Utc::now().trunc_subsecs(6);
        let draft = store
            .mark_draft_sent(draft.id, claimed_at)
            .await?
            .ok_or(ApiError::AlreadySent)?;

        let delivered = match connector.connect(&user).await {
            Ok(gateway) => gateway
                .send_message(&to, &draft.subject, &draft.body)
                .await
                .ok_or(ApiError::SendFailed),
            Err(e) => Err(ApiError::from(e)),
        };
        let provider_message_id = match delivered {
            Ok(message_id) => message_id,
            Err(e) => {
                if let Err(release) = store.release_draft(draft.id, claimed_at).await {
                    tracing::error!("Failed to release draft {}: {}", draft.id, release);
                }
                return Err(e);
            }
        };

        tracing::info!("Sent draft {} to {} as {}", draft.id, to, provider_message_id);
        Ok(SendDraftResponse {
            draft,
            provider_message_id,
        })
    }
}
