//! Incremental mailbox sync.
//!
//! Picks a search window from the user's watermark, stores every listed
//! message not seen before, then moves the watermark to the sync time.

use anyhow::Result;
use chrono::{DateTime, Utc};
use shared_types::{SyncResponse, SyncType};

use crate::config::SyncConfig;
use crate::gmail::MailGateway;
use crate::models::User;
use crate::store::Store;

/// Gmail search query for the next sync of a user.
///
/// A user who never synced gets the first-sync window; otherwise the query
/// starts on the watermark's calendar day. Day granularity re-lists some
/// already-stored messages, which ingestion skips.
pub fn build_query(last_sync_at: Option<DateTime<Utc>>, first_sync_days: u32) -> (SyncType, String) {
    match last_sync_at {
        None => (SyncType::Initial, format!("newer_than:{}d", first_sync_days)),
        Some(at) => (
            SyncType::Incremental,
            format!("after:{}", at.format("%Y/%m/%d")),
        ),
    }
}

pub struct SyncService;

impl SyncService {
    /// Run one sync for `user`. Per-message failures are counted and logged;
    /// only a failure to record the watermark fails the sync.
    pub async fn sync_user(
        store: &dyn Store,
        gateway: &dyn MailGateway,
        user: &User,
        config: &SyncConfig,
        max_results: Option<u32>,
    ) -> Result<SyncResponse> {
        let max_results = max_results.unwrap_or(config.max_results);
        let (sync_type, query) = build_query(user.last_sync_at, config.first_sync_days);
        tracing::info!("Syncing {} ({:?}): {}", user.email, sync_type, query);

        let ids = gateway.list_messages(&query, max_results).await;

        let mut synced = 0usize;
        let mut skipped = 0usize;
        let mut failed = 0usize;

        for id in &ids {
            match store.find_email_by_provider_id(id).await {
                Ok(Some(_)) => {
                    skipped += 1;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("  Dedupe lookup failed for {}: {}", id, e);
                    failed += 1;
                    continue;
                }
            }

            let Some(message) = gateway.get_message(id).await else {
                failed += 1;
                continue;
            };

            match store.insert_email(message.into_new_email(user.id)).await {
                Ok(Some(email)) => {
                    tracing::debug!("  Stored: {} - {}", email.gmail_id, email.subject);
                    synced += 1;
                }
                Ok(None) => {
                    tracing::trace!("  Skipped (duplicate): {}", id);
                    skipped += 1;
                }
                Err(e) => {
                    tracing::warn!("  Failed to store {}: {}", id, e);
                    failed += 1;
                }
            }
        }

        let now = Utc::now();
        store.advance_watermark(user.id, now).await?;

        tracing::info!(
            "Sync for {} done: {} new, {} skipped, {} failed of {} listed",
            user.email,
            synced,
            skipped,
            failed,
            ids.len()
        );

        Ok(SyncResponse {
            user_id: user.id,
            sync_type,
            query,
            synced_count: synced,
            listed: ids.len(),
            skipped,
            failed,
            last_sync_at: now,
        })
    }
}
