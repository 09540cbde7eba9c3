// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor — rectangular region operations (crop, paste, flip, fill,
// blur, colour sampling) on in-memory page renderings, using the `image`
// and `imageproc` crates.

use folienwerk_core::BBox;
use folienwerk_core::error::{FolienwerkError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage, imageops};
use imageproc::filter::gaussian_blur_f32;
use tracing::{debug, instrument};

/// Slack added before truncating a ratio-derived pixel coordinate, so that
/// ratios like 0.89 land on the pixel their decimal value names.
const RATIO_EPSILON: f32 = 1e-3;

/// An integer pixel rectangle `(x, y, width, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle given as ratios of an image's width and height, each
    /// coordinate truncated to whole pixels.
    pub fn from_ratios(
        image_width: u32,
        image_height: u32,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Self {
        let span = |dim: u32, ratio: f32| ((dim as f32) * ratio + RATIO_EPSILON).floor().max(0.0) as u32;
        Self {
            x: span(image_width, x),
            y: span(image_height, y),
            width: span(image_width, width),
            height: span(image_height, height),
        }
    }

    /// Map a page-point box into pixels, grow it by `padding_pt` on every
    /// side, and clamp it to the image. Returns `None` when nothing of the
    /// box remains inside the image.
    pub fn from_page_box(
        bbox: &BBox,
        scale_x: f32,
        scale_y: f32,
        padding_pt: f32,
        image_width: u32,
        image_height: u32,
    ) -> Option<Self> {
        let pad_x = (padding_pt * scale_x) as i64;
        let pad_y = (padding_pt * scale_y) as i64;
        let x0 = ((bbox.x0 * scale_x) as i64 - pad_x).max(0);
        let y0 = ((bbox.y0 * scale_y) as i64 - pad_y).max(0);
        let x1 = ((bbox.x1 * scale_x) as i64 + pad_x).min(image_width as i64);
        let y1 = ((bbox.y1 * scale_y) as i64 + pad_y).min(image_height as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self::new(
            x0 as u32,
            y0 as u32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// The part of the rectangle inside a `width`x`height` image.
    pub fn clipped(&self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self::new(x, y, self.right().min(width) - x, self.bottom().min(height) - y)
    }
}

/// Region operations on a single RGB page image.
///
/// Every operation touches only the pixels inside its rectangle; whatever
/// part of a rectangle falls outside the image is ignored.
pub struct ImageProcessor {
    /// The current working image.
    image: RgbImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Create a processor from raw encoded bytes (JPEG, PNG, etc.).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(data).map_err(|err| {
            FolienwerkError::ImageError(format!("failed to decode image: {}", err))
        })?;
        debug!(
            width = img.width(),
            height = img.height(),
            "Image decoded from bytes"
        );
        Ok(Self {
            image: img.to_rgb8(),
        })
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_rgb(self) -> RgbImage {
        self.image
    }

    // -- Region operations ----------------------------------------------------

    /// Copy out a region, clipped to the image.
    pub fn crop(&self, rect: PixelRect) -> RgbImage {
        imageops::crop_imm(&self.image, rect.x, rect.y, rect.width, rect.height).to_image()
    }

    /// Paste `patch` with its top-left corner at `(x, y)`, clipped to the
    /// image.
    pub fn paste(&mut self, patch: &RgbImage, x: u32, y: u32) {
        imageops::replace(&mut self.image, patch, x as i64, y as i64);
    }

    /// Paint a region one flat colour.
    pub fn fill(&mut self, rect: PixelRect, color: Rgb<u8>) {
        let rect = rect.clipped(self.width(), self.height());
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                self.image.put_pixel(x, y, color);
            }
        }
    }

    /// Replace a region with a Gaussian-blurred copy of itself.
    pub fn blur(&mut self, rect: PixelRect, sigma: f32) {
        let rect = rect.clipped(self.width(), self.height());
        if rect.is_empty() {
            return;
        }
        let blurred = gaussian_blur_f32(&self.crop(rect), sigma);
        self.paste(&blurred, rect.x, rect.y);
    }

    /// Channel-wise integer mean of the region's four corner pixels.
    pub fn corner_average(&self, rect: PixelRect) -> Option<Rgb<u8>> {
        let rect = rect.clipped(self.width(), self.height());
        if rect.is_empty() {
            return None;
        }
        let (left, top) = (rect.x, rect.y);
        let (right, bottom) = (rect.right() - 1, rect.bottom() - 1);
        let corners = [
            self.image.get_pixel(left, top),
            self.image.get_pixel(right, top),
            self.image.get_pixel(left, bottom),
            self.image.get_pixel(right, bottom),
        ];
        let channel = |i: usize| (corners.iter().map(|p| p.0[i] as u32).sum::<u32>() / 4) as u8;
        Some(Rgb([channel(0), channel(1), channel(2)]))
    }

    /// Channel-wise mean over the whole region, truncated toward zero.
    pub fn mean_color(&self, rect: PixelRect) -> Option<Rgb<u8>> {
        let rect = rect.clipped(self.width(), self.height());
        if rect.is_empty() {
            return None;
        }
        let mut sums = [0u64; 3];
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                let pixel = self.image.get_pixel(x, y);
                for (sum, value) in sums.iter_mut().zip(pixel.0) {
                    *sum += value as u64;
                }
            }
        }
        let count = rect.width as u64 * rect.height as u64;
        Some(Rgb(sums.map(|sum| (sum / count) as u8)))
    }

    /// Flip the whole working image left to right.
    pub fn flip_horizontal(&mut self) {
        imageops::flip_horizontal_in_place(&mut self.image);
    }

    // -- Output ---------------------------------------------------------------

    /// Encode the current image as JPEG bytes with the given quality (1-100).
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        self.image.write_with_encoder(encoder).map_err(|err| {
            FolienwerkError::ImageError(format!("JPEG encoding failed: {}", err))
        })?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 100]))
    }

    #[test]
    fn ratio_rect_truncates_to_decimal_pixel() {
        let rect = PixelRect::from_ratios(1000, 500, 0.89, 0.95, 0.11, 0.04);
        assert_eq!(rect, PixelRect::new(890, 475, 110, 20));
    }

    #[test]
    fn page_box_is_padded_and_clamped() {
        let bbox = BBox::new(1.0, 10.0, 20.0, 20.0);
        let rect = PixelRect::from_page_box(&bbox, 2.0, 2.0, 5.0, 100, 100).unwrap();
        assert_eq!(rect, PixelRect::new(0, 10, 50, 40));

        let outside = BBox::new(200.0, 200.0, 210.0, 210.0);
        assert!(PixelRect::from_page_box(&outside, 1.0, 1.0, 0.0, 100, 100).is_none());
    }

    #[test]
    fn fill_touches_only_its_region() {
        let mut processor = ImageProcessor::new(gradient(10, 10));
        processor.fill(PixelRect::new(2, 2, 3, 3), Rgb([255, 255, 255]));
        let image = processor.as_rgb();
        assert_eq!(image.get_pixel(2, 2).0, [255, 255, 255]);
        assert_eq!(image.get_pixel(4, 4).0, [255, 255, 255]);
        assert_eq!(image.get_pixel(5, 5).0, [5, 5, 100]);
        assert_eq!(image.get_pixel(1, 2).0, [1, 2, 100]);
    }

    #[test]
    fn fill_past_the_edge_is_clipped() {
        let mut processor = ImageProcessor::new(gradient(4, 4));
        processor.fill(PixelRect::new(3, 3, 10, 10), Rgb([0, 0, 0]));
        assert_eq!(processor.as_rgb().get_pixel(3, 3).0, [0, 0, 0]);
    }

    #[test]
    fn corner_average_uses_integer_division() {
        let mut image = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        image.put_pixel(0, 0, Rgb([3, 0, 0]));
        image.put_pixel(3, 0, Rgb([0, 0, 0]));
        image.put_pixel(0, 3, Rgb([0, 0, 0]));
        image.put_pixel(3, 3, Rgb([2, 8, 0]));
        let processor = ImageProcessor::new(image);
        assert_eq!(
            processor.corner_average(PixelRect::new(0, 0, 4, 4)),
            Some(Rgb([1, 2, 0]))
        );
        assert_eq!(processor.corner_average(PixelRect::new(9, 9, 1, 1)), None);
    }

    #[test]
    fn blur_leaves_outside_pixels_untouched() {
        let mut image = RgbImage::from_pixel(40, 40, Rgb([255, 255, 255]));
        for x in 10..30 {
            image.put_pixel(x, 20, Rgb([0, 0, 0]));
        }
        let original = image.clone();
        let mut processor = ImageProcessor::new(image);
        let rect = PixelRect::new(8, 15, 24, 10);
        processor.blur(rect, 20.0);
        let result = processor.as_rgb();
        assert_ne!(result.get_pixel(20, 20), original.get_pixel(20, 20));
        for (x, y, pixel) in result.enumerate_pixels() {
            let inside = x >= rect.x && x < rect.right() && y >= rect.y && y < rect.bottom();
            if !inside {
                assert_eq!(pixel, original.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn mean_color_of_region() {
        let processor = ImageProcessor::new(gradient(4, 1));
        // x channel: 0, 1, 2, 3 -> mean 1.5 truncated to 1
        assert_eq!(
            processor.mean_color(PixelRect::new(0, 0, 4, 1)),
            Some(Rgb([1, 0, 100]))
        );
    }

    #[test]
    fn jpeg_round_trip_keeps_dimensions() {
        let processor = ImageProcessor::new(gradient(16, 8));
        let bytes = processor.to_jpeg_bytes(80).unwrap();
        let decoded = ImageProcessor::from_bytes(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }
}
