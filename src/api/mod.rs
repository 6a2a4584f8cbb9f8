//! Thin wrappers over the vendor's device API endpoints.
//!
//! Each sub-module mirrors one endpoint family. None of these carry retry
//! or pagination logic of their own; the orchestration layers compose them
//! with [`crate::retry`] and [`crate::pagination`].

pub mod account;
pub mod attachments;
pub mod client;
pub mod frames;
pub mod playlists;
pub mod proxy;

pub use account::AccountApi;
pub use attachments::AttachmentApi;
pub use client::ApiClient;
pub use frames::FrameApi;
pub use playlists::PlaylistApi;
pub use proxy::{ImageFetcher, ProxyImageFetcher};
