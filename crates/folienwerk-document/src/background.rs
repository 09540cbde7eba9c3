// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Background reconstruction — clean page images to draw new text over.

use folienwerk_core::error::Result;
use folienwerk_core::{BBox, BackgroundFill, PageSize, WatermarkConfig};
use image::{Rgb, RgbImage};
use tracing::{debug, instrument};

use crate::image::{ImageProcessor, PixelRect, remove_watermark};
use crate::source::PdfSource;

/// Padding, in points, around each region patched for an edit.
pub const REGION_PADDING_PT: f32 = 5.0;
/// Standard deviation of the blur that hides stale glyphs.
pub const BLUR_SIGMA: f32 = 20.0;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Produces page backgrounds from a source document.
pub struct BackgroundReconstructor<'a> {
    source: &'a dyn PdfSource,
    watermark: &'a WatermarkConfig,
}

impl<'a> BackgroundReconstructor<'a> {
    pub fn new(source: &'a dyn PdfSource, watermark: &'a WatermarkConfig) -> Self {
        Self { source, watermark }
    }

    /// The page with every text block removed and the watermark erased.
    #[instrument(skip(self))]
    pub fn text_free(&self, page: u32, dpi: f32) -> Result<RgbImage> {
        let blocks = self.source.text_blocks(page)?;
        debug!(blocks = blocks.len(), "redacting text blocks");
        let mut image = self.source.render_redacted(page, &blocks, dpi)?;
        remove_watermark(&mut image, self.watermark);
        Ok(image)
    }

    /// The page as rendered, with only the watermark erased.
    #[instrument(skip(self))]
    pub fn watermark_free(&self, page: u32, dpi: f32) -> Result<RgbImage> {
        let mut image = self.source.rasterize(page, dpi)?;
        remove_watermark(&mut image, self.watermark);
        Ok(image)
    }

    /// The unmodified page with each of `regions` (plus padding) overwritten
    /// by `fill`. The watermark is left alone.
    #[instrument(skip(self, regions), fields(regions = regions.len()))]
    pub fn patched(
        &self,
        page: u32,
        regions: &[BBox],
        fill: BackgroundFill,
        dpi: f32,
    ) -> Result<RgbImage> {
        let image = self.source.rasterize(page, dpi)?;
        let size = self.source.page_size(page)?;
        Ok(patch_regions(image, size, regions, fill, REGION_PADDING_PT))
    }

    /// Erase the watermark of an already rendered background.
    pub fn erase_watermark(&self, image: &mut RgbImage) {
        remove_watermark(image, self.watermark);
    }
}

/// Overwrite each page-space region of `image` using `fill`. Pixels outside
/// the padded regions are untouched.
pub fn patch_regions(
    image: RgbImage,
    page: PageSize,
    regions: &[BBox],
    fill: BackgroundFill,
    padding_pt: f32,
) -> RgbImage {
    let (w, h) = image.dimensions();
    let scale_x = w as f32 / page.width;
    let scale_y = h as f32 / page.height;
    let mut processor = ImageProcessor::new(image);

    for region in regions {
        let Some(rect) = PixelRect::from_page_box(region, scale_x, scale_y, padding_pt, w, h)
        else {
            continue;
        };
        match fill {
            BackgroundFill::White => processor.fill(rect, WHITE),
            BackgroundFill::SmartFill => {
                if let Some(color) = processor.corner_average(rect) {
                    processor.fill(rect, color);
                }
            }
            BackgroundFill::Blur => processor.blur(rect, BLUR_SIGMA),
        }
    }
    processor.into_rgb()
}
