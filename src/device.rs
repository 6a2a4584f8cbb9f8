//! The device-API surface the orchestration layers consume.
//!
//! Orchestrators are written against this trait so tests can drive them
//! with mocks; [`AuraDevice`] is the production implementation delegating
//! to the endpoint wrappers in [`crate::api`].

use crate::api::{ApiClient, AttachmentApi, FrameApi, PlaylistApi};
use crate::error::Result;
use crate::models::{Activity, Asset, AssetRef, AssetUpdate, Attachment, Frame, Page};
use async_trait::async_trait;
use std::sync::Arc;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn get_frame(&self, frame_id: &str) -> Result<(Frame, u64)>;
    async fn list_assets(&self, frame_id: &str, cursor: Option<String>) -> Result<Page<Asset>>;
    async fn list_activities(
        &self,
        frame_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<Activity>>;
    /// Returns the vendor's failed-association count; 0 means the asset
    /// was accepted.
    async fn select_asset(&self, frame_id: &str, asset: &AssetRef) -> Result<u32>;
    async fn batch_update(&self, frame_id: &str, update: AssetUpdate) -> Result<()>;
    async fn playlist_asset_ids(
        &self,
        playlist_id: &str,
        frame_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<String>>;
    async fn create_caption(
        &self,
        asset_id: &str,
        frame_id: &str,
        text: &str,
    ) -> Result<Attachment>;
    async fn delete_caption(&self, attachment_id: &str) -> Result<()>;
}

/// Production device API backed by the shared HTTP transport.
pub struct AuraDevice {
    frames: FrameApi,
    playlists: PlaylistApi,
    attachments: AttachmentApi,
}

impl AuraDevice {
    pub fn new(client: Arc<ApiClient>, page_limit: u32) -> Self {
        Self {
            frames: FrameApi::new(client.clone(), page_limit),
            playlists: PlaylistApi::new(client.clone(), page_limit),
            attachments: AttachmentApi::new(client),
        }
    }
}

#[async_trait]
impl DeviceApi for AuraDevice {
    async fn get_frame(&self, frame_id: &str) -> Result<(Frame, u64)> {
        self.frames.get_frame(frame_id).await
    }

    async fn list_assets(&self, frame_id: &str, cursor: Option<String>) -> Result<Page<Asset>> {
        self.frames.list_assets(frame_id, cursor).await
    }

    async fn list_activities(
        &self,
        frame_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<Activity>> {
        self.frames.list_activities(frame_id, cursor).await
    }

    async fn select_asset(&self, frame_id: &str, asset: &AssetRef) -> Result<u32> {
        self.frames.select_asset(frame_id, asset).await
    }

    async fn batch_update(&self, frame_id: &str, update: AssetUpdate) -> Result<()> {
        self.frames.batch_update(frame_id, update).await
    }

    async fn playlist_asset_ids(
        &self,
        playlist_id: &str,
        frame_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<String>> {
        self.playlists.asset_ids(playlist_id, frame_id, cursor).await
    }

    async fn create_caption(
        &self,
        asset_id: &str,
        frame_id: &str,
        text: &str,
    ) -> Result<Attachment> {
        self.attachments.create_caption(asset_id, frame_id, text).await
    }

    async fn delete_caption(&self, attachment_id: &str) -> Result<()> {
        self.attachments.delete_caption(attachment_id).await
    }
}
