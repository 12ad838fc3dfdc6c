//! First-paint detection: deciding whether a captured frame shows anything
//! other than a blank white page.
//!
//! The scan excludes a fixed border margin on all sides to keep browser
//! chrome and antialiasing artifacts out of the verdict. Pixel-format
//! handling is behind [`PixelProbe`]: packed formats up to 24 bits get a
//! row-compare fast path, deeper formats fall back to per-pixel comparison.

use image::{DynamicImage, GenericImageView};

/// Minimum color depth a frame needs before we trust a blankness verdict.
const MIN_SCAN_DEPTH: u32 = 15;

/// Bits per pixel of a frame's storage format.
pub(crate) fn bits_per_pixel(image: &DynamicImage) -> u32 {
    match image {
        DynamicImage::ImageLuma8(_) => 8,
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) => 16,
        DynamicImage::ImageRgb8(_) => 24,
        DynamicImage::ImageRgba8(_) | DynamicImage::ImageLumaA16(_) => 32,
        DynamicImage::ImageRgb16(_) => 48,
        DynamicImage::ImageRgba16(_) => 64,
        DynamicImage::ImageRgb32F(_) => 96,
        _ => 128,
    }
}

/// Scans the interior of a frame for non-blank content.
pub trait PixelProbe {
    /// `true` if any pixel inside the margin differs from pure white.
    fn scan(&self, image: &DynamicImage, margin: u32) -> bool;
}

/// Fast path for packed formats (<= 24 bpp): compare each row's interior
/// byte range against an all-0xFF reference. White is all-ones in every
/// channel of these formats, so a single slice compare per row suffices.
#[derive(Debug)]
pub struct RowProbe;

impl PixelProbe for RowProbe {
    fn scan(&self, image: &DynamicImage, margin: u32) -> bool {
        let (width, height) = image.dimensions();
        let bytes_per_px = (bits_per_pixel(image) / 8).max(1) as usize;
        let stride = width as usize * bytes_per_px;
        let start = margin as usize * bytes_per_px;
        let len = (width - 2 * margin) as usize * bytes_per_px;
        let white = vec![0xFFu8; len];
        let data = image.as_bytes();
        for row in margin..height - margin {
            let offset = row as usize * stride + start;
            if data[offset..offset + len] != white[..] {
                return true;
            }
        }
        false
    }
}

/// Per-pixel comparison for deeper formats: any channel deviating from pure
/// white (R=G=B=255, alpha ignored) counts as content.
#[derive(Debug)]
pub struct PixelwiseProbe;

impl PixelProbe for PixelwiseProbe {
    fn scan(&self, image: &DynamicImage, margin: u32) -> bool {
        let (width, height) = image.dimensions();
        for y in margin..height - margin {
            for x in margin..width - margin {
                let px = image.get_pixel(x, y);
                if px[0] != 255 || px[1] != 255 || px[2] != 255 {
                    return true;
                }
            }
        }
        false
    }
}

/// Pick the probe for a frame's color depth.
pub(crate) fn probe_for(bits_per_pixel: u32) -> &'static dyn PixelProbe {
    if bits_per_pixel <= 24 {
        &RowProbe
    } else {
        &PixelwiseProbe
    }
}

/// Decide whether a captured frame shows painted content.
///
/// Frames too small to judge (either dimension <= 2x the margin) and frames
/// shallower than 15 bits are rejected outright.
#[must_use]
pub fn frame_has_paint(image: &DynamicImage, margin: u32) -> bool {
    let (width, height) = image.dimensions();
    if width <= margin * 2 || height <= margin * 2 {
        return false;
    }
    let depth = bits_per_pixel(image);
    if depth < MIN_SCAN_DEPTH {
        return false;
    }
    probe_for(depth).scan(image, margin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    const MARGIN: u32 = 30;

    fn white_rgb(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([255, 255, 255]))
    }

    fn white_rgba(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]))
    }

    #[test]
    fn test_blank_frame_not_found() {
        let img = DynamicImage::ImageRgb8(white_rgb(200, 200));
        assert!(!frame_has_paint(&img, MARGIN));
    }

    #[test]
    fn test_pixel_inside_scan_region_found() {
        let mut img = white_rgb(200, 200);
        img.put_pixel(100, 100, Rgb([200, 255, 255]));
        assert!(frame_has_paint(&DynamicImage::ImageRgb8(img), MARGIN));
    }

    #[test]
    fn test_pixel_inside_border_margin_ignored() {
        let mut img = white_rgb(200, 200);
        img.put_pixel(5, 5, Rgb([0, 0, 0]));
        img.put_pixel(199, 199, Rgb([0, 0, 0]));
        assert!(!frame_has_paint(&DynamicImage::ImageRgb8(img), MARGIN));
    }

    #[test]
    fn test_undersized_frame_rejected() {
        let mut img = white_rgb(60, 60);
        img.put_pixel(30, 30, Rgb([0, 0, 0]));
        // 60 <= 2 * 30: too small to judge.
        assert!(!frame_has_paint(&DynamicImage::ImageRgb8(img), MARGIN));
    }

    #[test]
    fn test_shallow_depth_rejected() {
        let img = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(
            200,
            200,
            image::Luma([0]),
        ));
        assert!(!frame_has_paint(&img, MARGIN));
    }

    #[test]
    fn test_deep_format_uses_pixelwise_probe() {
        let mut img = white_rgba(200, 200);
        img.put_pixel(50, 50, Rgba([255, 254, 255, 255]));
        assert!(frame_has_paint(&DynamicImage::ImageRgba8(img), MARGIN));
    }

    #[test]
    fn test_alpha_deviation_alone_is_not_content() {
        let mut img = white_rgba(200, 200);
        img.put_pixel(50, 50, Rgba([255, 255, 255, 0]));
        assert!(!frame_has_paint(&DynamicImage::ImageRgba8(img), MARGIN));
    }

    #[test]
    fn test_probe_selection_by_depth() {
        assert_eq!(bits_per_pixel(&DynamicImage::ImageRgb8(white_rgb(1, 1))), 24);
        assert_eq!(
            bits_per_pixel(&DynamicImage::ImageRgba8(white_rgba(1, 1))),
            32
        );
    }

    #[test]
    fn test_row_probe_edge_of_margin() {
        // Content exactly at the first scanned coordinate is detected.
        let mut img = white_rgb(100, 100);
        img.put_pixel(MARGIN, MARGIN, Rgb([0, 0, 0]));
        assert!(frame_has_paint(&DynamicImage::ImageRgb8(img), MARGIN));
        // Content at margin-1 is not.
        let mut img = white_rgb(100, 100);
        img.put_pixel(MARGIN - 1, MARGIN - 1, Rgb([0, 0, 0]));
        assert!(!frame_has_paint(&DynamicImage::ImageRgb8(img), MARGIN));
    }
}
