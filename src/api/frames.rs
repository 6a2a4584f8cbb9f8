//! Frame endpoints: metadata, asset/activity listings, asset association.

use crate::api::client::ApiClient;
use crate::error::{AuraError, Result};
use crate::models::{Activity, Asset, AssetRef, AssetUpdate, Frame, Page};
use std::sync::Arc;

pub struct FrameApi {
    client: Arc<ApiClient>,
    page_limit: u32,
}

impl FrameApi {
    pub fn new(client: Arc<ApiClient>, page_limit: u32) -> Self {
        Self { client, page_limit }
    }

    /// Fetch a frame and its total asset count.
    pub async fn get_frame(&self, frame_id: &str) -> Result<(Frame, u64)> {
        let response = self.client.get(&format!("/frames/{frame_id}.json"), &[]).await?;
        let frame: Frame = serde_json::from_value(response["frame"].clone())
            .map_err(|e| AuraError::Api {
                status: 200,
                message: format!("malformed frame payload: {e}"),
            })?;
        let total = response["total_asset_count"].as_u64().unwrap_or(0);
        Ok((frame, total))
    }

    /// One page of the frame's assets.
    pub async fn list_assets(&self, frame_id: &str, cursor: Option<String>) -> Result<Page<Asset>> {
        let response = self
            .client
            .get(
                &format!("/frames/{frame_id}/assets.json"),
                &[
                    ("limit", Some(self.page_limit.to_string())),
                    ("cursor", cursor),
                ],
            )
            .await?;

        // This endpoint reports some failures inside a 200 body.
        if response.get("error").is_some() {
            let message = response
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("error listing assets");
            return Err(AuraError::Api {
                status: 200,
                message: message.to_string(),
            });
        }

        let assets: Vec<Asset> =
            serde_json::from_value(response.get("assets").cloned().unwrap_or_default())
                .unwrap_or_default();
        Ok(Page::new(assets, next_cursor(&response)))
    }

    /// One page of the frame's activity feed.
    pub async fn list_activities(
        &self,
        frame_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<Activity>> {
        let response = self
            .client
            .get(
                &format!("/frames/{frame_id}/activities.json"),
                &[("cursor", cursor)],
            )
            .await?;

        let activities: Vec<Activity> =
            serde_json::from_value(response.get("activities").cloned().unwrap_or_default())
                .unwrap_or_default();
        Ok(Page::new(activities, next_cursor(&response)))
    }

    /// Associate an asset with a frame. Returns the vendor's count of
    /// assets that failed to associate (0 means success; this client sends
    /// one asset per call).
    pub async fn select_asset(&self, frame_id: &str, asset: &AssetRef) -> Result<u32> {
        let response = self
            .client
            .post(
                &format!("/frames/{frame_id}/select_asset.json"),
                serde_json::json!({ "assets": [asset.to_request_value()] }),
            )
            .await?;
        Ok(response["number_failed"].as_u64().unwrap_or(0) as u32)
    }

    /// Record the uploaded object's filename, hash and capture metadata,
    /// making the asset durable on the service side.
    pub async fn batch_update(&self, frame_id: &str, update: AssetUpdate) -> Result<()> {
        let update = serde_json::to_value(update).map_err(|e| AuraError::Api {
            status: 0,
            message: format!("unserializable update payload: {e}"),
        })?;
        self.client
            .post(
                "/assets/batch_update.json",
                serde_json::json!({ "frame_id": frame_id, "assets": [update] }),
            )
            .await?;
        Ok(())
    }
}

fn next_cursor(response: &serde_json::Value) -> Option<String> {
    response
        .get("next_page_cursor")
        .and_then(|c| c.as_str())
        .map(String::from)
}
