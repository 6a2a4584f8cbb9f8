//! Applies a caption to every photo in an album.
//!
//! The vendor has no caption-update call, so existing captions are deleted
//! and replaced. The optional date suffix comes from each photo's own
//! capture month, e.g. `Summer trip (June 2023)`.

use crate::device::DeviceApi;
use crate::error::{AuraError, BatchOutcome, Result};
use crate::models::Asset;
use crate::pagination;
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct CaptionOptions {
    /// Base caption text applied to every photo.
    pub caption: String,
    /// Append each photo's capture month, e.g. ` (June 2023)`.
    pub include_date: bool,
    /// Concurrent caption replacements.
    pub concurrency: usize,
    /// Delay between listing-page fetches.
    pub page_delay: Duration,
}

/// Per-photo state gathered before captioning starts.
struct PhotoCaptionState {
    taken_at: Option<DateTime<Utc>>,
    /// Ids of existing caption attachments to delete.
    existing_captions: Vec<String>,
}

pub struct CaptionService {
    device: Arc<dyn DeviceApi>,
    retry: RetryPolicy,
}

impl CaptionService {
    pub fn new(device: Arc<dyn DeviceApi>, retry: RetryPolicy) -> Self {
        Self { device, retry }
    }

    /// Replace the caption on every photo of a playlist. Succeeded entries
    /// are asset ids; failures carry the error that stopped that photo.
    #[instrument(skip(self, options, cancel), fields(frame_id = %frame_id, playlist_id = %playlist_id))]
    pub async fn caption_album(
        &self,
        frame_id: &str,
        playlist_id: &str,
        options: &CaptionOptions,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome<String>> {
        if options.caption.trim().is_empty() {
            return Err(AuraError::Validation("caption cannot be empty".to_string()));
        }

        let member_ids = pagination::collect_all(
            |cursor| self.device.playlist_asset_ids(playlist_id, frame_id, cursor),
            &self.retry,
            cancel,
            options.page_delay,
        )
        .await?;
        info!(photos = member_ids.len(), "captioning album");

        // One pass over the frame's assets supplies both capture dates and
        // the existing attachments for every member.
        let states = self
            .collect_states(frame_id, &member_ids, options, cancel)
            .await?;

        let results: Vec<(String, Result<()>)> = stream::iter(member_ids)
            .map(|asset_id| {
                let state = states.get(&asset_id);
                async move {
                    let result = self
                        .caption_one(frame_id, &asset_id, state, options, cancel)
                        .await;
                    (asset_id, result)
                }
            })
            .buffer_unordered(options.concurrency.max(1))
            .collect()
            .await;

        let mut outcome = BatchOutcome::new();
        for (asset_id, result) in results {
            match result {
                Ok(()) => outcome.record_success(asset_id),
                Err(e) => {
                    warn!(asset_id = %asset_id, error = %e, "caption failed");
                    outcome.record_failure(asset_id, e);
                }
            }
        }
        info!(
            captioned = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "album captioning finished"
        );
        Ok(outcome)
    }

    async fn collect_states(
        &self,
        frame_id: &str,
        member_ids: &[String],
        options: &CaptionOptions,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, PhotoCaptionState>> {
        let assets: Vec<Asset> = pagination::collect_all(
            |cursor| self.device.list_assets(frame_id, cursor),
            &self.retry,
            cancel,
            options.page_delay,
        )
        .await?;

        let mut states = HashMap::new();
        for asset in assets {
            let Some(id) = asset.id.clone() else { continue };
            if !member_ids.contains(&id) {
                continue;
            }
            let existing_captions = asset
                .attachments
                .iter()
                .filter(|a| a.is_caption())
                .map(|a| a.id.clone())
                .collect();
            states.insert(
                id,
                PhotoCaptionState {
                    taken_at: asset.taken_at_dt(),
                    existing_captions,
                },
            );
        }
        Ok(states)
    }

    async fn caption_one(
        &self,
        frame_id: &str,
        asset_id: &str,
        state: Option<&PhotoCaptionState>,
        options: &CaptionOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(AuraError::Cancelled);
        }

        // Clear existing captions first. A failed delete leaves a duplicate
        // caption at worst, so it does not stop the replacement.
        if let Some(state) = state {
            for attachment_id in &state.existing_captions {
                if let Err(e) = self
                    .retry
                    .run("delete_caption", cancel, || {
                        self.device.delete_caption(attachment_id)
                    })
                    .await
                {
                    debug!(attachment_id = %attachment_id, error = %e, "could not delete old caption");
                }
            }
        }

        let text = match (
            options.include_date,
            state.and_then(|s| s.taken_at),
        ) {
            (true, Some(taken_at)) => {
                format!("{} ({})", options.caption, taken_at.format("%B %Y"))
            }
            _ => options.caption.clone(),
        };

        self.retry
            .run("create_caption", cancel, || {
                self.device.create_caption(asset_id, frame_id, &text)
            })
            .await?;
        Ok(())
    }
}
