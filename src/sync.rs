//! Incremental reconciliation of the catalog and thumbnail cache against the
//! live playlist.
//!
//! Only identifiers missing from the catalog trigger metadata fetches; known
//! identifiers at most get their thumbnail backfilled. A warm rerun therefore
//! performs membership checks only. The engine assumes it is the single writer
//! of both stores for the duration of a run.

use std::time::Duration;

use log::{debug, info, warn};

use crate::catalog::{normalize_identifier, watch_url_for, CatalogRecord, CatalogStore, MEDIA_TYPE};
use crate::error::ThumbnailError;
use crate::image_pipeline::decode_image_from_memory_with_fallback;
use crate::remote::{thumbnail_url, ImageFetcher, MetadataSource, VideoMetadata};
use crate::tags::TagPolicy;
use crate::thumbnails::{ThumbnailCache, ThumbnailState};

/// Format recorded when the stream descriptor is missing or malformed.
pub const FALLBACK_MIME_TYPE: &str = "video/3gpp";

/// Per-run knobs for the engine.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub thumbnail_url_template: String,
    pub placeholder_max_bytes: u64,
    pub request_delay: Duration,
    pub rights: String,
    pub rights_statement: String,
    /// `YYYY-MM-DD` stamped on records created this run.
    pub addition_date: String,
}

/// Summary of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub playlist_size: usize,
    pub catalog_size: usize,
    pub thumbnail_count: usize,
    pub added: usize,
    pub thumbnails_fetched: usize,
    pub placeholders: usize,
    pub pending_metadata: usize,
    pub pending_thumbnails: usize,
    pub failures: Vec<String>,
}

impl SyncReport {
    pub fn log_summary(&self) {
        info!(
            "Sync finished: playlist={} catalog={} thumbnails={} added={} fetched_thumbnails={} placeholders={}",
            self.playlist_size,
            self.catalog_size,
            self.thumbnail_count,
            self.added,
            self.thumbnails_fetched,
            self.placeholders
        );
        info!(
            "Pending: metadata={} thumbnails={}",
            self.pending_metadata, self.pending_thumbnails
        );
        for failure in &self.failures {
            warn!("Needs follow-up: {failure}");
        }
    }
}

/// Outcome of one thumbnail download attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThumbnailFetch {
    Stored,
    Placeholder,
}

/// Waits between playlist items that hit the network.
pub trait Pacer {
    fn pause(&mut self, delay: Duration);
}

/// Blocks the calling thread for the configured delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepPacer;

impl Pacer for SleepPacer {
    fn pause(&mut self, delay: Duration) {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

impl<P: Pacer + ?Sized> Pacer for &mut P {
    fn pause(&mut self, delay: Duration) {
        (**self).pause(delay);
    }
}

/// `video/mp4; codecs="..."` -> `video/mp4`, or the fallback sentinel.
pub fn derive_mime_type(descriptor: Option<&str>) -> String {
    let resolved = descriptor
        .and_then(|raw| raw.split(';').next())
        .map(str::trim)
        .filter(|essence| {
            essence
                .split_once('/')
                .is_some_and(|(kind, subtype)| !kind.is_empty() && !subtype.is_empty())
        });
    match resolved {
        Some(essence) => essence.to_string(),
        None => {
            debug!(
                "Mime type unresolvable from {:?}; using {}",
                descriptor, FALLBACK_MIME_TYPE
            );
            FALLBACK_MIME_TYPE.to_string()
        }
    }
}

pub struct SyncEngine<'a, S, F, C> {
    source: &'a S,
    fetcher: &'a F,
    thumbnails: &'a mut C,
    tag_policy: &'a TagPolicy,
    options: SyncOptions,
    pacer: Box<dyn Pacer + 'a>,
}

impl<'a, S, F, C> SyncEngine<'a, S, F, C>
where
    S: MetadataSource,
    F: ImageFetcher,
    C: ThumbnailCache,
{
    pub fn new(
        source: &'a S,
        fetcher: &'a F,
        thumbnails: &'a mut C,
        tag_policy: &'a TagPolicy,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            fetcher,
            thumbnails,
            tag_policy,
            options,
            pacer: Box::new(SleepPacer),
        }
    }

    /// Replaces the default thread-sleeping pacer.
    pub fn with_pacer(mut self, pacer: impl Pacer + 'a) -> Self {
        self.pacer = Box::new(pacer);
        self
    }

    fn build_record(&self, metadata: VideoMetadata) -> CatalogRecord {
        let subject_tags = self.tag_policy.sanitize(&metadata.keywords);
        let mime_type = derive_mime_type(metadata.first_stream_mime_type.as_deref());
        CatalogRecord {
            object_id: metadata.video_id.clone(),
            filename: String::new(),
            id: metadata.video_id,
            title: metadata.title,
            creator: metadata.author,
            publish_date: metadata.publish_date,
            description: metadata.description,
            subject_tags,
            location: String::new(),
            latitude: String::new(),
            longitude: String::new(),
            source_channel_url: metadata.channel_url,
            identifier: metadata.watch_url,
            media_type: MEDIA_TYPE.to_string(),
            mime_type,
            language: String::new(),
            rights: self.options.rights.clone(),
            rights_statement: self.options.rights_statement.clone(),
            addition_date: self.options.addition_date.clone(),
        }
    }

    fn fetch_thumbnail(&mut self, video_id: &str) -> Result<ThumbnailFetch, ThumbnailError> {
        let url = thumbnail_url(&self.options.thumbnail_url_template, video_id);
        let unavailable = |reason: String| ThumbnailError::ThumbnailUnavailable {
            video_id: video_id.to_string(),
            reason,
        };

        let response = self
            .fetcher
            .fetch_image_bytes(&url)
            .map_err(|error| unavailable(error.to_string()))?;
        if !response.is_success() {
            if response.effective_length() <= self.options.placeholder_max_bytes {
                debug!(
                    "Placeholder thumbnail for {} (status {}, {} bytes). url={}",
                    video_id,
                    response.status,
                    response.effective_length(),
                    url
                );
                return Ok(ThumbnailFetch::Placeholder);
            }
            return Err(unavailable(format!("HTTP {} from {url}", response.status)));
        }

        let image = decode_image_from_memory_with_fallback(&response.bytes)
            .ok_or_else(|| unavailable(format!("undecodable image from {url}")))?;
        self.thumbnails.store(video_id, &image)?;
        Ok(ThumbnailFetch::Stored)
    }

    /// Fetches a missing thumbnail. Returns whether the network was used.
    /// Only cache write failures are returned as errors.
    fn ensure_thumbnail(
        &mut self,
        video_id: &str,
        report: &mut SyncReport,
    ) -> Result<bool, ThumbnailError> {
        if self.thumbnails.state(video_id) == ThumbnailState::Cached {
            return Ok(false);
        }
        match self.fetch_thumbnail(video_id) {
            Ok(ThumbnailFetch::Stored) => {
                report.thumbnails_fetched += 1;
                debug!("Thumbnail stored for {video_id}");
            }
            Ok(ThumbnailFetch::Placeholder) => report.placeholders += 1,
            Err(error @ ThumbnailError::ThumbnailUnavailable { .. }) => {
                warn!("{error}");
                report.failures.push(error.to_string());
            }
            Err(error) => return Err(error),
        }
        Ok(true)
    }

    /// Reconciles `store` against `playlist_video_ids`, appending new records
    /// and backfilling thumbnails.
    ///
    /// Per-item fetch failures are reported and retried next run. A thumbnail
    /// cache write failure stops the run; records appended before it stay in
    /// `store`.
    pub fn sync(
        &mut self,
        playlist_video_ids: &[String],
        store: &mut CatalogStore,
    ) -> Result<SyncReport, ThumbnailError> {
        let mut report = SyncReport {
            playlist_size: playlist_video_ids.len(),
            ..SyncReport::default()
        };

        for (position, video_id) in playlist_video_ids.iter().enumerate() {
            let identifier = normalize_identifier(&watch_url_for(video_id));
            let touched_network = if store.contains_identifier(&identifier) {
                if self.thumbnails.state(video_id) == ThumbnailState::Cached {
                    debug!("[{position}] {video_id} already present");
                    continue;
                }
                info!("[{position}] {video_id} known; backfilling thumbnail");
                self.ensure_thumbnail(video_id, &mut report)?
            } else {
                // Thumbnail before metadata.
                self.ensure_thumbnail(video_id, &mut report)?;
                match self.source.fetch_video_metadata(video_id) {
                    Ok(metadata) => {
                        let record = self.build_record(metadata);
                        info!("[{position}] {} {}", record.title, record.identifier);
                        if store.append(record) {
                            report.added += 1;
                        }
                    }
                    Err(error) => {
                        warn!("[{position}] {error}; will retry next run");
                        report.failures.push(error.to_string());
                    }
                }
                true
            };

            if touched_network {
                self.pacer.pause(self.options.request_delay);
            }
        }

        report.catalog_size = store.len();
        report.thumbnail_count = self.thumbnails.len();
        for video_id in playlist_video_ids {
            if !store.contains_identifier(&watch_url_for(video_id)) {
                report.pending_metadata += 1;
            }
            if self.thumbnails.state(video_id) == ThumbnailState::Absent {
                report.pending_thumbnails += 1;
            }
        }
        Ok(report)
    }
}
