//! Error types shared by the sync, catalog, and mosaic stages.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by the remote metadata source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The platform could not describe this video (removed, private, unparsable).
    #[error("metadata unavailable for video {video_id}: {reason}")]
    MetadataUnavailable { video_id: String, reason: String },

    /// The playlist page could not be read or parsed.
    #[error("playlist unavailable at {url}: {reason}")]
    PlaylistUnavailable { url: String, reason: String },

    /// Network-level failure before any response arrived.
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
}

/// Thumbnail failures. `ThumbnailUnavailable` is skippable per item; a cache
/// write failure is fatal for the run.
#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("thumbnail unavailable for video {video_id}: {reason}")]
    ThumbnailUnavailable { video_id: String, reason: String },

    #[error("thumbnail cache write failed at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Failures reading or writing the catalog file. Fatal for a run.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog CSV error at {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Another live sync run holds the catalog.
    #[error("catalog is locked by another running sync: {path}")]
    Locked { path: PathBuf },
}

/// Failures writing the banner artifact.
#[derive(Error, Debug)]
pub enum MosaicError {
    #[error("banner I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("banner encode error at {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Failures loading or creating the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("unknown stopword preset {0:?}")]
    UnknownStopwordPreset(String),

    #[error("invalid tag scrub pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("no config directory available; pass --config explicitly")]
    NoConfigDir,
}
