//! Bulk export of a frame's photos with their metadata.
//!
//! Writes the frame and asset listings as JSON manifests, then downloads
//! every original through the image proxy with a bounded worker pool. Each
//! photo gets its capture time, coordinates and a reverse-geocoded place
//! name embedded as EXIF before it is persisted. Per-photo failures are
//! collected and never stop the rest of the export.

use crate::api::proxy::ImageFetcher;
use crate::device::DeviceApi;
use crate::error::{AuraError, BatchOutcome, Result};
use crate::exif::{embed_metadata_lossy, ImageMetadata};
use crate::geocode::{GeocodeCache, ReverseGeocoder};
use crate::models::{Asset, Frame};
use crate::pagination;
use crate::retry::RetryPolicy;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Knobs for one export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Directory the frame's export directory is created under.
    pub destination: PathBuf,
    /// Concurrent downloads.
    pub concurrency: usize,
    /// Delay between listing-page fetches.
    pub page_delay: Duration,
    /// Re-download photos that already exist on disk.
    pub force: bool,
}

/// What one export run produced.
#[derive(Debug)]
pub struct ExportReport {
    pub frame: Frame,
    /// Directory the manifests and photos were written to.
    pub directory: PathBuf,
    /// Per-photo results; skipped already-present files count as successes.
    pub outcome: BatchOutcome<PathBuf>,
}

pub struct ExportOrchestrator<G> {
    device: Arc<dyn DeviceApi>,
    fetcher: Arc<dyn ImageFetcher>,
    geocode: GeocodeCache<G>,
    retry: RetryPolicy,
}

impl<G: ReverseGeocoder> ExportOrchestrator<G> {
    pub fn new(
        device: Arc<dyn DeviceApi>,
        fetcher: Arc<dyn ImageFetcher>,
        geocode: GeocodeCache<G>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            device,
            fetcher,
            geocode,
            retry,
        }
    }

    /// Export a frame: manifests first, then the photo pool.
    #[instrument(skip(self, options, cancel), fields(frame_id = %frame_id))]
    pub async fn export_frame(
        &self,
        frame_id: &str,
        options: &ExportOptions,
        cancel: &CancellationToken,
    ) -> Result<ExportReport> {
        let (frame, total_assets) = self
            .retry
            .run("get_frame", cancel, || self.device.get_frame(frame_id))
            .await?;
        info!(name = frame.display_name(), total_assets, "exporting frame");

        let directory = options.destination.join(format!(
            "{}-{}",
            sanitize_component(frame.display_name()),
            frame.id
        ));
        let images_dir = directory.join("asset_images");
        tokio::fs::create_dir_all(&images_dir).await?;

        write_json(&directory.join("frame.json"), &frame).await?;
        self.dump_activities(frame_id, &directory, options, cancel)
            .await;

        let assets = pagination::collect_all(
            |cursor| self.device.list_assets(frame_id, cursor),
            &self.retry,
            cancel,
            options.page_delay,
        )
        .await?;
        write_json(&directory.join("assets.json"), &assets).await?;

        let outcome = self
            .download_pool(assets, &images_dir, options, cancel)
            .await;
        info!(
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "export finished"
        );

        Ok(ExportReport {
            frame,
            directory,
            outcome,
        })
    }

    /// The activity feed is auxiliary; a failure here downgrades to a
    /// warning rather than aborting the export.
    async fn dump_activities(
        &self,
        frame_id: &str,
        directory: &Path,
        options: &ExportOptions,
        cancel: &CancellationToken,
    ) {
        let activities = pagination::collect_all(
            |cursor| self.device.list_activities(frame_id, cursor),
            &self.retry,
            cancel,
            options.page_delay,
        )
        .await;

        match activities {
            Ok(activities) => {
                if let Err(e) = write_json(&directory.join("activities.json"), &activities).await {
                    warn!(error = %e, "could not write activities manifest");
                }
            }
            Err(e) => warn!(error = %e, "could not fetch activities"),
        }
    }

    async fn download_pool(
        &self,
        assets: Vec<Asset>,
        images_dir: &Path,
        options: &ExportOptions,
        cancel: &CancellationToken,
    ) -> BatchOutcome<PathBuf> {
        let results: Vec<(String, Result<PathBuf>)> = stream::iter(assets)
            .map(|asset| {
                let report_id = asset.report_id();
                async move {
                    let result = self.export_one(&asset, images_dir, options, cancel).await;
                    (report_id, result)
                }
            })
            .buffer_unordered(options.concurrency.max(1))
            .collect()
            .await;

        let mut outcome = BatchOutcome::new();
        for (report_id, result) in results {
            match result {
                Ok(path) => outcome.record_success(path),
                Err(e) => outcome.record_failure(report_id, e),
            }
        }
        outcome
    }

    async fn export_one(
        &self,
        asset: &Asset,
        images_dir: &Path,
        options: &ExportOptions,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        if cancel.is_cancelled() {
            return Err(AuraError::Cancelled);
        }

        let file_name = asset
            .file_name
            .as_deref()
            .ok_or_else(|| AuraError::Validation("asset has no file name".to_string()))?;
        let user_id = asset
            .user_id
            .as_deref()
            .ok_or_else(|| AuraError::Validation("asset has no owner".to_string()))?;

        let target = images_dir.join(format!(
            "{}-{}",
            asset.path_safe_taken_at(),
            sanitize_component(file_name)
        ));
        if !options.force && tokio::fs::try_exists(&target).await.unwrap_or(false) {
            debug!(path = %target.display(), "already exported, skipping");
            return Ok(target);
        }

        let data = self
            .retry
            .run("fetch_image", cancel, || {
                self.fetcher.fetch(user_id, file_name)
            })
            .await?;

        let place_name = match asset.lat_lon() {
            Some((lat, lon)) => match self.geocode.resolve(lat, lon).await {
                Ok(place) => place,
                Err(e) => {
                    // Keep the photo even when the geocoder is down.
                    warn!(error = %e, "reverse geocoding failed");
                    None
                }
            },
            None => None,
        };

        let metadata = ImageMetadata {
            taken_at: asset.taken_at_dt(),
            place_name: place_name.or_else(|| asset.location_name.clone()),
            artist: None,
            coordinates: asset.lat_lon(),
        };
        let bytes = embed_metadata_lossy(data.to_vec(), &metadata);

        tokio::fs::write(&target, bytes).await?;
        debug!(path = %target.display(), "photo exported");
        Ok(target)
    }
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| AuraError::Validation(format!("unserializable manifest: {e}")))?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

/// Replace path-hostile characters so names are safe as path components.
fn sanitize_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::proxy::MockImageFetcher;
    use crate::device::MockDeviceApi;
    use crate::exif::{minimal_jpeg_fixture, read_exif_summary};
    use crate::geocode::MockReverseGeocoder;
    use crate::models::Page;
    use bytes::Bytes;

    fn asset(id: &str, file_name: &str, taken_at: &str) -> Asset {
        Asset {
            id: Some(id.to_string()),
            local_identifier: None,
            file_name: Some(file_name.to_string()),
            md5_hash: None,
            taken_at: Some(taken_at.to_string()),
            location: Some(vec![48.8584, 2.2945]),
            location_name: None,
            user_id: Some("u1".to_string()),
            width: None,
            height: None,
            attachments: Vec::new(),
        }
    }

    fn options(destination: &Path) -> ExportOptions {
        ExportOptions {
            destination: destination.to_path_buf(),
            concurrency: 2,
            page_delay: Duration::ZERO,
            force: false,
        }
    }

    fn frame_device(assets_pages: Vec<Page<Asset>>) -> MockDeviceApi {
        let mut device = MockDeviceApi::new();
        device.expect_get_frame().returning(|frame_id| {
            Ok((
                Frame {
                    id: frame_id.to_string(),
                    name: Some("Living Room".to_string()),
                    playlists: Vec::new(),
                },
                3,
            ))
        });
        device.expect_list_activities().returning(|_, _| Ok(Page::last(Vec::new())));

        let pages = std::sync::Mutex::new(assets_pages.into_iter());
        device
            .expect_list_assets()
            .returning(move |_, _| Ok(pages.lock().unwrap().next().unwrap_or_else(|| Page::last(Vec::new()))));
        device
    }

    #[tokio::test]
    async fn test_export_is_fail_soft_and_embeds_capture_time() {
        let tmp = tempfile::tempdir().unwrap();

        let device = frame_device(vec![
            Page::new(
                vec![
                    asset("a1", "one.jpg", "2023-05-01T12:00:00Z"),
                    asset("a2", "two.jpg", "2023-06-02T08:30:00Z"),
                ],
                Some("cursor-2".to_string()),
            ),
            Page::last(vec![asset("a3", "three.jpg", "2024-01-03T20:15:45Z")]),
        ]);

        let mut fetcher = MockImageFetcher::new();
        fetcher.expect_fetch().returning(|_, file_name| {
            if file_name == "two.jpg" {
                Err(AuraError::Transient("proxy 502".to_string()))
            } else {
                Ok(Bytes::from(minimal_jpeg_fixture()))
            }
        });

        let mut geocoder = MockReverseGeocoder::new();
        geocoder
            .expect_reverse()
            .returning(|_, _| Ok(Some("Paris, France".to_string())));

        let orchestrator = ExportOrchestrator::new(
            Arc::new(device),
            Arc::new(fetcher),
            GeocodeCache::new(geocoder, 16),
            RetryPolicy::none(),
        );

        let report = orchestrator
            .export_frame("f1", &options(tmp.path()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome.succeeded.len(), 2);
        assert_eq!(report.outcome.failed.len(), 1);
        assert_eq!(report.outcome.failed[0].item, "a2");
        assert!(matches!(
            report.outcome.failed[0].error,
            AuraError::RetriesExhausted { .. }
        ));

        // Manifests land next to the photos.
        assert!(report.directory.join("frame.json").exists());
        assert!(report.directory.join("assets.json").exists());

        // Capture time from the listing ends up inside the exported file.
        let exported = report
            .directory
            .join("asset_images")
            .join("20230501T120000-one.jpg");
        let bytes = std::fs::read(&exported).unwrap();
        let summary = read_exif_summary(&bytes).unwrap();
        assert_eq!(
            summary.date_time_original.as_deref(),
            Some("2023:05:01 12:00:00")
        );
        assert_eq!(summary.description.as_deref(), Some("Paris, France"));
        assert!((summary.latitude.unwrap() - 48.8584).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_existing_files_are_skipped_unless_forced() {
        let tmp = tempfile::tempdir().unwrap();

        let device = frame_device(vec![Page::last(vec![asset(
            "a1",
            "one.jpg",
            "2023-05-01T12:00:00Z",
        )])]);

        // No fetch expectation: touching the proxy would fail the test.
        let fetcher = MockImageFetcher::new();
        let geocoder = MockReverseGeocoder::new();

        let images_dir = tmp
            .path()
            .join("Living Room-f1")
            .join("asset_images");
        std::fs::create_dir_all(&images_dir).unwrap();
        std::fs::write(images_dir.join("20230501T120000-one.jpg"), b"cached").unwrap();

        let orchestrator = ExportOrchestrator::new(
            Arc::new(device),
            Arc::new(fetcher),
            GeocodeCache::new(geocoder, 16),
            RetryPolicy::none(),
        );

        let report = orchestrator
            .export_frame("f1", &options(tmp.path()), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.outcome.is_complete_success());
        // The placeholder was left untouched.
        let bytes = std::fs::read(images_dir.join("20230501T120000-one.jpg")).unwrap();
        assert_eq!(bytes, b"cached");
    }

    #[tokio::test]
    async fn test_cancelled_export_records_cancelled_photos() {
        let tmp = tempfile::tempdir().unwrap();

        let device = frame_device(vec![Page::last(vec![
            asset("a1", "one.jpg", "2023-05-01T12:00:00Z"),
            asset("a2", "two.jpg", "2023-06-02T08:30:00Z"),
        ])]);
        let fetcher = MockImageFetcher::new();
        let geocoder = MockReverseGeocoder::new();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let orchestrator = ExportOrchestrator::new(
            Arc::new(device),
            Arc::new(fetcher),
            GeocodeCache::new(geocoder, 16),
            RetryPolicy::none(),
        );

        // Listing already fails under a cancelled token.
        let result = orchestrator
            .export_frame("f1", &options(tmp.path()), &cancel)
            .await;
        assert!(matches!(result, Err(AuraError::Cancelled)));
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("Living Room"), "Living Room");
        assert_eq!(sanitize_component("a/b:c"), "a_b_c");
    }
}
