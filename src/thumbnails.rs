//! Thumbnail cache keyed by video id: one `{id}.jpg` file per video.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use log::{debug, warn};

use crate::error::ThumbnailError;
use crate::image_pipeline::{decode_image_from_path_with_fallback, save_jpeg_atomic};

const THUMBNAIL_EXTENSION: &str = "jpg";

/// Whether a video's thumbnail has been fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailState {
    Absent,
    Cached,
}

/// Membership and write access to cached thumbnails.
pub trait ThumbnailCache {
    fn state(&self, video_id: &str) -> ThumbnailState;
    fn store(&mut self, video_id: &str, image: &DynamicImage) -> Result<(), ThumbnailError>;
    fn len(&self) -> usize;
}

/// Directory-backed cache. The directory is scanned once at open and each
/// entry keeps the path it was found under.
#[derive(Debug)]
pub struct DirThumbnailCache {
    dir: PathBuf,
    cached: HashMap<String, PathBuf>,
}

impl DirThumbnailCache {
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        let mut cached = HashMap::new();
        for entry in fs::read_dir(dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!("Failed to read a directory entry in {}: {}", dir.display(), err);
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_file() || !has_thumbnail_extension(&path) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                cached.insert(stem.to_string(), path.clone());
            }
        }
        debug!(
            "Thumbnail cache opened: {} entries. dir={}",
            cached.len(),
            dir.display()
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            cached,
        })
    }

    /// Where `video_id` lives: its scanned path if cached, else the path a new
    /// entry is written to.
    pub fn path_for(&self, video_id: &str) -> PathBuf {
        match self.cached.get(video_id) {
            Some(path) => path.clone(),
            None => self.dir.join(format!("{video_id}.{THUMBNAIL_EXTENSION}")),
        }
    }

    /// Cached image paths in video id order.
    pub fn cached_paths(&self) -> Vec<PathBuf> {
        let mut entries: Vec<(&String, &PathBuf)> = self.cached.iter().collect();
        entries.sort_unstable_by(|left, right| left.0.cmp(right.0));
        entries.into_iter().map(|(_, path)| path.clone()).collect()
    }

    /// Decodes every cached thumbnail in file-name order, skipping unreadable files.
    pub fn load_images(&self) -> Vec<DynamicImage> {
        self.cached_paths()
            .into_iter()
            .filter_map(|path| {
                let decoded = decode_image_from_path_with_fallback(&path);
                if decoded.is_none() {
                    warn!("Skipping undecodable thumbnail {}", path.display());
                }
                decoded
            })
            .collect()
    }
}

fn has_thumbnail_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(THUMBNAIL_EXTENSION))
}

impl ThumbnailCache for DirThumbnailCache {
    fn state(&self, video_id: &str) -> ThumbnailState {
        if self.cached.contains_key(video_id) {
            ThumbnailState::Cached
        } else {
            ThumbnailState::Absent
        }
    }

    fn store(&mut self, video_id: &str, image: &DynamicImage) -> Result<(), ThumbnailError> {
        let path = self.path_for(video_id);
        if let Err(source) = save_jpeg_atomic(image, &path) {
            return Err(ThumbnailError::Write { path, source });
        }
        self.cached.insert(video_id.to_string(), path);
        Ok(())
    }

    fn len(&self) -> usize {
        self.cached.len()
    }
}
