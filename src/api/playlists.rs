//! Playlist (album) endpoints.

use crate::api::client::ApiClient;
use crate::error::Result;
use crate::models::Page;
use std::sync::Arc;

pub struct PlaylistApi {
    client: Arc<ApiClient>,
    page_limit: u32,
}

impl PlaylistApi {
    pub fn new(client: Arc<ApiClient>, page_limit: u32) -> Self {
        Self { client, page_limit }
    }

    /// One page of the asset ids belonging to a playlist. The endpoint
    /// returns asset settings, not full assets.
    pub async fn asset_ids(
        &self,
        playlist_id: &str,
        frame_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<String>> {
        let response = self
            .client
            .get(
                &format!("/playlists/{playlist_id}/assets.json"),
                &[
                    ("frame_id", Some(frame_id.to_string())),
                    ("limit", Some(self.page_limit.to_string())),
                    ("cursor", cursor),
                ],
            )
            .await?;

        let ids = response
            .get("asset_settings")
            .and_then(|s| s.as_array())
            .map(|settings| {
                settings
                    .iter()
                    .filter_map(|s| s.get("asset_id").and_then(|id| id.as_str()))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let next = response
            .get("next_page_cursor")
            .and_then(|c| c.as_str())
            .map(String::from);
        Ok(Page::new(ids, next))
    }
}
