//! Shared image decoding, square-cropping, and atomic JPEG persistence.

use std::fs;
use std::path::{Path, PathBuf};

use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};
use zune_core::{colorspace::ColorSpace, options::DecoderOptions};
use zune_jpeg::JpegDecoder;

const RESIZE_FILTER: FilterType = FilterType::Triangle;

fn looks_like_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xff && bytes[1] == 0xd8
}

fn decode_jpeg_non_strict(bytes: &[u8]) -> Option<DynamicImage> {
    if !looks_like_jpeg(bytes) {
        return None;
    }

    let options = DecoderOptions::new_cmd()
        .set_strict_mode(false)
        .jpeg_set_out_colorspace(ColorSpace::RGB);
    let mut decoder = JpegDecoder::new_with_options(bytes, options);
    let pixels = decoder.decode().ok()?;
    let (width, height) = decoder.dimensions()?;
    let image = image::RgbImage::from_raw(width as u32, height as u32, pixels)?;
    Some(DynamicImage::ImageRgb8(image))
}

/// Decodes any format `image` supports, retrying JPEGs with a lenient decoder.
pub fn decode_image_from_memory_with_fallback(bytes: &[u8]) -> Option<DynamicImage> {
    image::load_from_memory(bytes)
        .ok()
        .or_else(|| decode_jpeg_non_strict(bytes))
}

pub fn decode_image_from_path_with_fallback(path: &Path) -> Option<DynamicImage> {
    image::open(path).ok().or_else(|| {
        let bytes = fs::read(path).ok()?;
        decode_image_from_memory_with_fallback(&bytes)
    })
}

/// Size after scaling so the shorter edge equals `side`, preserving aspect ratio.
pub fn fill_dimensions(width: u32, height: u32, side: u32) -> (u32, u32) {
    let side = side.max(1);
    if width == 0 || height == 0 {
        return (side, side);
    }
    if height > width {
        let scaled_height =
            ((u64::from(height) * u64::from(side)) + (u64::from(width) / 2)) / u64::from(width);
        (side, (scaled_height as u32).max(side))
    } else {
        let scaled_width =
            ((u64::from(width) * u64::from(side)) + (u64::from(height) / 2)) / u64::from(height);
        ((scaled_width as u32).max(side), side)
    }
}

/// Top-left corner of a centered `side`×`side` window inside a scaled image.
pub fn centered_crop_origin(scaled_width: u32, scaled_height: u32, side: u32) -> (u32, u32) {
    (
        scaled_width.saturating_sub(side) / 2,
        scaled_height.saturating_sub(side) / 2,
    )
}

/// Center-crop-to-fill: scale so the shorter edge matches `side`, then trim
/// equal margins off the longer edge.
pub fn square_crop(image: &DynamicImage, side: u32) -> DynamicImage {
    let side = side.max(1);
    let (width, height) = image.dimensions();
    let (scaled_width, scaled_height) = fill_dimensions(width, height, side);
    let scaled = if (scaled_width, scaled_height) == (width, height) {
        image.clone()
    } else {
        image.resize_exact(scaled_width, scaled_height, RESIZE_FILTER)
    };
    let (x, y) = centered_crop_origin(scaled_width, scaled_height, side);
    scaled.crop_imm(x, y, side, side)
}

/// Square-crops to `square_side`, then stretches to the cell size.
pub fn fit_to_cell(
    image: &DynamicImage,
    square_side: u32,
    cell_width: u32,
    cell_height: u32,
) -> image::RgbImage {
    square_crop(image, square_side)
        .resize_exact(cell_width.max(1), cell_height.max(1), RESIZE_FILTER)
        .to_rgb8()
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            fs::create_dir_all(parent)
        }
        _ => Ok(()),
    }
}

fn temp_path_for(target_path: &Path) -> PathBuf {
    let mut temp = target_path.as_os_str().to_owned();
    temp.push(".tmp");
    PathBuf::from(temp)
}

/// Writes `image` in `format` via a temp file and rename. JPEG output is RGB.
pub fn save_image_atomic(
    image: &DynamicImage,
    target_path: &Path,
    format: ImageFormat,
) -> image::ImageResult<()> {
    ensure_parent_dir(target_path)?;
    let temp_path = temp_path_for(target_path);
    if temp_path.exists() {
        let _ = fs::remove_file(&temp_path);
    }
    let saved = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(image.to_rgb8()).save_with_format(&temp_path, format)
    } else {
        image.save_with_format(&temp_path, format)
    };
    if let Err(error) = saved {
        let _ = fs::remove_file(&temp_path);
        return Err(error);
    }
    if let Err(error) = fs::rename(&temp_path, target_path) {
        let _ = fs::remove_file(&temp_path);
        return Err(error.into());
    }
    Ok(())
}

pub fn save_jpeg_atomic(image: &DynamicImage, target_path: &Path) -> image::ImageResult<()> {
    save_image_atomic(image, target_path, ImageFormat::Jpeg)
}

#[cfg(test)]
mod tests {
    use super::{
        centered_crop_origin, decode_image_from_memory_with_fallback, fill_dimensions,
        fit_to_cell, save_jpeg_atomic, square_crop,
    };
    use image::{
        codecs::jpeg::JpegEncoder, DynamicImage, GenericImageView, ImageBuffer, Rgb, RgbImage,
    };

    #[test]
    fn test_fill_dimensions_scales_shorter_edge_to_side() {
        assert_eq!(fill_dimensions(400, 200, 300), (600, 300));
        assert_eq!(fill_dimensions(200, 400, 300), (300, 600));
        assert_eq!(fill_dimensions(50, 50, 300), (300, 300));
    }

    #[test]
    fn test_centered_crop_origin_splits_overflow_evenly() {
        assert_eq!(centered_crop_origin(600, 300, 300), (150, 0));
        assert_eq!(centered_crop_origin(300, 600, 300), (0, 150));
        assert_eq!(centered_crop_origin(300, 300, 300), (0, 0));
    }

    #[test]
    fn test_square_crop_wide_image_discards_equal_side_margins() {
        // Red bands on the outer 60px of each side, white in between.
        let source = DynamicImage::ImageRgb8(ImageBuffer::from_fn(400, 200, |x, _| {
            if x < 60 || x >= 340 {
                Rgb([255, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        }));

        let cropped = square_crop(&source, 300).to_rgb8();
        assert_eq!(cropped.dimensions(), (300, 300));
        for y in [0, 150, 299] {
            assert!(cropped.get_pixel(0, y)[1] > 200, "left margin should be cropped");
            assert!(cropped.get_pixel(299, y)[1] > 200, "right margin should be cropped");
        }
    }

    #[test]
    fn test_square_crop_tall_image_keeps_full_width() {
        let source = DynamicImage::ImageRgb8(ImageBuffer::from_fn(100, 300, |_, y| {
            if y < 50 {
                Rgb([0, 0, 255])
            } else {
                Rgb([0, 255, 0])
            }
        }));
        let cropped = square_crop(&source, 100).to_rgb8();
        assert_eq!(cropped.dimensions(), (100, 100));
        assert!(cropped.get_pixel(50, 0)[2] < 50, "top band should be cropped");
    }

    #[test]
    fn test_fit_to_cell_matches_requested_dimensions() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(640, 360, Rgb([10, 20, 30])));
        let cell = fit_to_cell(&source, 1050, 263, 220);
        assert_eq!(cell.dimensions(), (263, 220));
    }

    #[test]
    fn test_decode_image_from_memory_with_fallback_decodes_jpeg_bytes() {
        let rgb = RgbImage::from_pixel(12, 9, Rgb([90, 140, 210]));
        let mut encoded = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut encoded, 85);
            encoder
                .encode_image(&DynamicImage::ImageRgb8(rgb))
                .expect("jpeg encoding should succeed");
        }
        // Simulate trailing garbage often seen in malformed files.
        encoded.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        let decoded = decode_image_from_memory_with_fallback(&encoded)
            .expect("fallback decoder should decode jpeg bytes");
        assert_eq!(decoded.dimensions(), (12, 9));
    }

    #[test]
    fn test_decode_image_from_memory_with_fallback_rejects_non_image_bytes() {
        assert!(decode_image_from_memory_with_fallback(b"definitely-not-an-image").is_none());
    }

    #[test]
    fn test_save_jpeg_atomic_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let target = dir.path().join("thumbs").join("abc.jpg");
        let image = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(
            8,
            8,
            image::Rgba([1, 2, 3, 255]),
        ));

        save_jpeg_atomic(&image, &target).expect("jpeg should save");
        assert!(target.exists());
        assert!(!target.with_extension("jpg.tmp").exists());
        assert_eq!(
            image::image_dimensions(&target).expect("saved jpeg should be readable"),
            (8, 8)
        );
    }
}
