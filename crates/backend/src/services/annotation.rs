//! Classification and extraction of stored emails.

use shared_types::{AnalyzeResponse, BatchAnnotateResponse, Email, ExtractResponse};
use uuid::Uuid;

use crate::annotation::AnnotationEngine;
use crate::error::{ApiError, ApiResult};
use crate::store::Store;

/// Text handed to the model: the plain body, else the HTML body.
pub fn annotation_body(email: &Email) -> &str {
    email
        .body_text
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .or(email.body_html.as_deref())
        .unwrap_or_default()
}

pub struct AnnotationService;

impl AnnotationService {
    /// Classify one email and record the result on it.
    pub async fn analyze(
        store: &dyn Store,
        engine: &AnnotationEngine,
        email_id: Uuid,
    ) -> ApiResult<AnalyzeResponse> {
        let email = store
            .get_email(email_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Email"))?;

        let classification = engine.classify(&email.subject, annotation_body(&email)).await;
        store
            .set_interview_flag(email.id, classification.is_interview)
            .await?;

        Ok(AnalyzeResponse {
            email_id: email.id,
            subject: email.subject,
            is_interview: classification.is_interview,
            confidence: classification.confidence,
            method: classification.method,
        })
    }

    /// Extract interview details from one email into its invitation.
    pub async fn extract(
        store: &dyn Store,
        engine: &AnnotationEngine,
        email_id: Uuid,
    ) -> ApiResult<ExtractResponse> {
        let email = store
            .get_email(email_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Email"))?;

        let (info, status) = engine
            .extract_fields(&email.subject, annotation_body(&email))
            .await
            .into_parts()
            .ok_or(ApiError::ExtractionFailed)?;

        let invitation = store.upsert_invitation(email.id, &info, status).await?;

        Ok(ExtractResponse {
            email_id: email.id,
            status,
            extracted_info: info,
            invitation,
        })
    }

    /// Classify the user's most recent emails and extract the positives.
    /// Failures are counted per email and never stop the sweep.
    pub async fn annotate_recent(
        store: &dyn Store,
        engine: &AnnotationEngine,
        user_id: Uuid,
        limit: i64,
    ) -> ApiResult<BatchAnnotateResponse> {
        let emails = store.list_recent_emails(user_id, limit).await?;
        let mut result = BatchAnnotateResponse::default();

        for email in emails {
            result.examined += 1;
            let body = annotation_body(&email);
            let classification = engine.classify(&email.subject, body).await;

            if let Err(e) = store
                .set_interview_flag(email.id, classification.is_interview)
                .await
            {
                tracing::warn!("Failed to record classification for {}: {}", email.id, e);
                result.errors += 1;
                continue;
            }

            if !classification.is_interview {
                continue;
            }
            result.interviews += 1;

            let Some((info, status)) = engine
                .extract_fields(&email.subject, body)
                .await
                .into_parts()
            else {
                tracing::warn!("Extraction unavailable for {}", email.id);
                result.errors += 1;
                continue;
            };

            match store.upsert_invitation(email.id, &info, status).await {
                Ok(_) => result.extracted += 1,
                Err(e) => {
                    tracing::warn!("Failed to store invitation for {}: {}", email.id, e);
                    result.errors += 1;
                }
            }
        }

        tracing::info!(
            "Annotated {} emails for {}: {} interviews, {} extracted, {} errors",
            result.examined,
            user_id,
            result.interviews,
            result.extracted,
            result.errors
        );
        Ok(result)
    }
}
