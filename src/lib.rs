//! Playlist catalog curation: incremental metadata sync, a thumbnail cache,
//! and mosaic banner composition.

pub mod catalog;
pub mod config;
pub mod error;
pub mod image_pipeline;
pub mod mosaic;
pub mod remote;
pub mod sync;
pub mod tags;
pub mod thumbnails;
