//! Banner composition: tiles every cached thumbnail into one fixed-size image.

use std::path::Path;

use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use log::{debug, info};

use crate::error::MosaicError;
use crate::image_pipeline::{fit_to_cell, save_image_atomic};

/// Grid dimensions and per-cell size for one composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MosaicLayout {
    pub column_count: u32,
    pub row_count: u32,
    pub cell_width: u32,
    pub cell_height: u32,
}

/// Chooses a column count for a set of image sizes on a fixed canvas.
pub trait GridLayoutStrategy {
    fn column_count(&self, dimensions: &[(u32, u32)], max_width: u32, max_height: u32) -> u32;
}

/// Closed-form column estimate from total pixel area:
/// `ceil(sqrt(total_area / aspect_ratio) / max_height)`, at least 1.
///
/// This is a heuristic. It is deterministic for a given input but makes no
/// claim of producing the best-fitting grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct AreaHeuristicLayout;

impl GridLayoutStrategy for AreaHeuristicLayout {
    fn column_count(&self, dimensions: &[(u32, u32)], max_width: u32, max_height: u32) -> u32 {
        let total_area: f64 = dimensions
            .iter()
            .map(|&(width, height)| f64::from(width) * f64::from(height))
            .sum();
        let aspect_ratio = f64::from(max_width.max(1)) / f64::from(max_height.max(1));
        let columns = ((total_area / aspect_ratio).sqrt() / f64::from(max_height.max(1))).ceil();
        if columns.is_finite() && columns >= 1.0 {
            columns as u32
        } else {
            1
        }
    }
}

/// Derives rows and cell size from the strategy's column count.
pub fn compute_layout(
    strategy: &dyn GridLayoutStrategy,
    dimensions: &[(u32, u32)],
    max_width: u32,
    max_height: u32,
) -> MosaicLayout {
    let image_count = dimensions.len().max(1) as u32;
    let column_count = strategy
        .column_count(dimensions, max_width, max_height)
        .max(1);
    let row_count = image_count.div_ceil(column_count);
    let cell_width = (f64::from(max_width) / f64::from(column_count)).round() as u32;
    let cell_height = (f64::from(max_height) / f64::from(row_count)).round() as u32;
    MosaicLayout {
        column_count,
        row_count,
        cell_width: cell_width.max(1),
        cell_height: cell_height.max(1),
    }
}

/// Tiles `images` in order onto a black `max_width`×`max_height` canvas.
///
/// Cells that start outside the canvas are skipped; cells that straddle an
/// edge are clipped.
pub fn compose_mosaic(
    images: &[DynamicImage],
    max_width: u32,
    max_height: u32,
    strategy: &dyn GridLayoutStrategy,
) -> RgbImage {
    let mut canvas = RgbImage::new(max_width, max_height);
    if images.is_empty() {
        return canvas;
    }

    let dimensions: Vec<(u32, u32)> = images.iter().map(|image| image.dimensions()).collect();
    let layout = compute_layout(strategy, &dimensions, max_width, max_height);
    let square_side = max_width.max(max_height);
    debug!("Mosaic layout for {} images: {:?}", images.len(), layout);

    for (index, image) in images.iter().enumerate() {
        let index = index as u32;
        let row = index / layout.column_count;
        let column = index % layout.column_count;
        let x = u64::from(column) * u64::from(layout.cell_width);
        let y = u64::from(row) * u64::from(layout.cell_height);
        if x >= u64::from(max_width) || y >= u64::from(max_height) {
            debug!("Mosaic cell ({row}, {column}) is outside the canvas; skipped");
            continue;
        }
        let cell = fit_to_cell(image, square_side, layout.cell_width, layout.cell_height);
        image::imageops::replace(&mut canvas, &cell, x as i64, y as i64);
    }
    canvas
}

/// Writes the banner to `path`, format chosen by extension (JPEG when unknown).
pub fn save_banner(banner: &RgbImage, path: &Path) -> Result<(), MosaicError> {
    let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Jpeg);
    save_image_atomic(&DynamicImage::ImageRgb8(banner.clone()), path, format).map_err(|source| {
        match source {
            image::ImageError::IoError(source) => MosaicError::Io {
                path: path.to_path_buf(),
                source,
            },
            source => MosaicError::Encode {
                path: path.to_path_buf(),
                source,
            },
        }
    })?;
    info!(
        "Banner written: {}x{}. path={}",
        banner.width(),
        banner.height(),
        path.display()
    );
    Ok(())
}
