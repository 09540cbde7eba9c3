// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Watermark removal — erases the configured rectangle of a page image by
// mirror patch, manual patch, or white fill.

use folienwerk_core::{WatermarkConfig, WatermarkStrategy};
use image::{Rgb, RgbImage, imageops};
use tracing::{debug, instrument};

use super::processor::{ImageProcessor, PixelRect};

/// Erase the watermark rectangle of `image` in place. Does nothing when the
/// configuration is disabled.
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn remove_watermark(image: &mut RgbImage, config: &WatermarkConfig) {
    if !config.enabled {
        return;
    }

    let (w, h) = image.dimensions();
    let target = PixelRect::from_ratios(
        w,
        h,
        config.target_x,
        config.target_y,
        config.target_width,
        config.target_height,
    );
    if target.is_empty() {
        debug!("watermark rectangle is empty");
        return;
    }

    let mut processor = ImageProcessor::new(std::mem::take(image));
    match config.strategy {
        WatermarkStrategy::Mirror => {
            let source_x = w.saturating_sub(target.x + target.width);
            let source = PixelRect::new(source_x, target.y, target.width, target.height);
            let patch = imageops::flip_horizontal(&processor.crop(source));
            debug!(?target, ?source, "mirror patch");
            processor.paste(&patch, target.x, target.y);
        }
        WatermarkStrategy::Manual { source_x, source_y } => {
            let requested = PixelRect::from_ratios(w, h, source_x, source_y, 0.0, 0.0);
            let source = PixelRect::new(
                requested.x.min(w.saturating_sub(target.width)),
                requested.y.min(h.saturating_sub(target.height)),
                target.width,
                target.height,
            );
            let patch = processor.crop(source);
            debug!(?target, ?source, "manual patch");
            processor.paste(&patch, target.x, target.y);
        }
        WatermarkStrategy::White => {
            processor.fill(target, Rgb([255, 255, 255]));
        }
    }
    *image = processor.into_rgb();
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Each pixel encodes its column so patches can be traced to their source.
    fn columns(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| Rgb([(x % 256) as u8, (x / 256) as u8, 7]))
    }

    fn column_at(image: &RgbImage, x: u32, y: u32) -> u32 {
        let p = image.get_pixel(x, y).0;
        p[0] as u32 + 256 * p[1] as u32
    }

    fn config(strategy: WatermarkStrategy) -> WatermarkConfig {
        WatermarkConfig {
            target_x: 0.89,
            target_y: 0.9,
            target_width: 0.11,
            target_height: 0.1,
            strategy,
            ..WatermarkConfig::default()
        }
    }

    #[test]
    fn mirror_patch_at_page_edge_reads_from_zero() {
        let mut image = columns(1000, 100);
        remove_watermark(&mut image, &config(WatermarkStrategy::Mirror));

        // Target x in [890, 1000) now holds source x in [0, 110), flipped.
        assert_eq!(column_at(&image, 890, 95), 109);
        assert_eq!(column_at(&image, 999, 95), 0);
        // Above the target nothing changed.
        assert_eq!(column_at(&image, 950, 10), 950);
        assert_eq!(column_at(&image, 889, 95), 889);
    }

    #[test]
    fn manual_patch_is_clamped_and_unflipped() {
        let mut image = columns(1000, 100);
        let strategy = WatermarkStrategy::Manual {
            source_x: 0.95,
            source_y: 0.0,
        };
        remove_watermark(&mut image, &config(strategy));

        // Source x 950 clamps to 1000 - 110 = 890.
        assert_eq!(column_at(&image, 890, 95), 890);
        assert_eq!(column_at(&image, 999, 95), 999);

        let mut image = columns(1000, 100);
        let strategy = WatermarkStrategy::Manual {
            source_x: 0.5,
            source_y: 0.0,
        };
        remove_watermark(&mut image, &config(strategy));
        assert_eq!(column_at(&image, 890, 95), 500);
        assert_eq!(column_at(&image, 999, 95), 609);
    }

    #[test]
    fn white_fill_paints_target_only() {
        let mut image = columns(1000, 100);
        remove_watermark(&mut image, &config(WatermarkStrategy::White));
        assert_eq!(image.get_pixel(900, 95).0, [255, 255, 255]);
        assert_eq!(image.get_pixel(900, 80).0, [132, 3, 7]);
    }

    #[test]
    fn disabled_config_is_a_no_op() {
        let mut image = columns(100, 100);
        let original = image.clone();
        remove_watermark(&mut image, &WatermarkConfig::disabled());
        assert_eq!(image, original);
    }
}
