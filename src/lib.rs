//! Unofficial client for the Aura photo-frame cloud service.
//!
//! Emulates the vendor's mobile app against its device API and AWS
//! transports. The main capabilities:
//!
//! - **Export**: download every photo of a frame through the image proxy,
//!   embedding capture time, GPS position and a reverse-geocoded place name
//!   as EXIF, alongside JSON manifests of the frame and its assets.
//! - **Upload**: replay the mobile client's multi-step upload sequence
//!   (select, queue poll, select, S3 object upload, finalize).
//! - **Caption**: replace the caption on every photo of an album, optionally
//!   suffixed with each photo's capture month.
//!
//! ## Architecture
//!
//! ```text
//! CLI / library caller
//!        │
//!        ▼
//! ┌──────────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Orchestrators    │──▶│ DeviceApi   │──▶│ api::client  │──▶ api.pushd.com
//! │ upload / export  │   │ (trait)     │   │ (reqwest)    │
//! │ / caption        │   └─────────────┘   └──────────────┘
//! └──────────────────┘
//!        │                 ┌──────────────────────────────┐
//!        ├────────────────▶│ aws: Cognito lease → S3, SQS │
//!        │                 └──────────────────────────────┘
//!        │                 ┌──────────────────────────────┐
//!        └────────────────▶│ geocode cache, exif writer   │
//!                          └──────────────────────────────┘
//! ```
//!
//! Every network call goes through [`retry::RetryPolicy`]; listings go
//! through the lazy [`pagination`] stream; batch operations collect
//! per-item failures into [`error::BatchOutcome`] instead of aborting.

pub mod api;
pub mod aws;
pub mod caption;
pub mod config;
pub mod device;
pub mod error;
pub mod exif;
pub mod export;
pub mod geocode;
pub mod models;
pub mod pagination;
pub mod retry;
pub mod upload;

pub use caption::{CaptionOptions, CaptionService};
pub use config::Config;
pub use device::{AuraDevice, DeviceApi};
pub use error::{AuraError, BatchOutcome, Result};
pub use export::{ExportOptions, ExportOrchestrator, ExportReport};
pub use models::{Asset, AssetRef, Attachment, Frame, Page, Playlist, User};
pub use retry::RetryPolicy;
pub use upload::{UploadOrchestrator, UploadPhoto, UploadedAsset};
