// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text element extraction — native spans first, OCR on the rendered page
// when a page has too little native text.

use folienwerk_core::error::Result;
use folienwerk_core::{BBox, ColorHex, PointF, TextElement, TextSource};
use tracing::{debug, info, instrument, warn};

use crate::image::{ImageProcessor, PixelRect};
use crate::scan::{Detection, DetectorHandle};
use crate::source::PdfSource;

/// Pages with fewer native spans than this are sent to OCR.
pub const OCR_FALLBACK_THRESHOLD: usize = 5;
/// Detections scoring below this are dropped.
pub const MIN_OCR_CONFIDENCE: f32 = 0.5;
/// Font size estimate as a fraction of the detection height.
pub const OCR_SIZE_FACTOR: f32 = 0.8;

/// Identifier of the `index`-th element of 1-based `page`.
pub fn element_id(page: u32, index: usize) -> String {
    format!("p{}_e{}", page.saturating_sub(1), index)
}

/// Turns native spans or OCR detections into [`TextElement`]s.
pub struct TextElementExtractor<'a> {
    source: &'a dyn PdfSource,
    detector: &'a DetectorHandle,
    ocr_dpi: f32,
}

impl<'a> TextElementExtractor<'a> {
    pub fn new(source: &'a dyn PdfSource, detector: &'a DetectorHandle, ocr_dpi: f32) -> Self {
        Self {
            source,
            detector,
            ocr_dpi,
        }
    }

    /// Extract the elements of one page in extraction order.
    #[instrument(skip(self))]
    pub fn extract(&self, page: u32, enable_ocr: bool) -> Result<Vec<TextElement>> {
        let mut elements = Vec::new();

        for span in self.source.native_spans(page)? {
            let text = span.text.trim();
            if text.is_empty() {
                continue;
            }
            if !span.bbox.is_valid() || span.font_size <= 0.0 {
                debug!(text, "skipping degenerate span");
                continue;
            }
            elements.push(TextElement::new(
                element_id(page, elements.len()),
                page,
                text,
                span.bbox,
                span.origin,
                span.font_size,
                ColorHex::from_packed(span.color),
                TextSource::Native,
            ));
        }

        if enable_ocr && elements.len() < OCR_FALLBACK_THRESHOLD {
            info!(native = elements.len(), "low text count, attempting OCR");
            self.extract_ocr(page, &mut elements)?;
        }

        debug!(count = elements.len(), "elements extracted");
        Ok(elements)
    }

    fn extract_ocr(&self, page: u32, elements: &mut Vec<TextElement>) -> Result<()> {
        let image = self.source.rasterize(page, self.ocr_dpi)?;
        let Some(detections) = self.detector.detect(&image)? else {
            warn!("OCR unavailable, no fallback text for this page");
            return Ok(());
        };

        let size = self.source.page_size(page)?;
        let scale_x = size.width / image.width() as f32;
        let scale_y = size.height / image.height() as f32;
        let processor = ImageProcessor::new(image);

        for detection in detections {
            if detection.confidence < MIN_OCR_CONFIDENCE {
                continue;
            }
            if let Some(element) = ocr_element(
                &detection,
                page,
                elements.len(),
                scale_x,
                scale_y,
                &processor,
            ) {
                elements.push(element);
            }
        }
        Ok(())
    }
}

/// Build an element from one detection. `None` for blank text or a region
/// without area.
fn ocr_element(
    detection: &Detection,
    page: u32,
    index: usize,
    scale_x: f32,
    scale_y: f32,
    image: &ImageProcessor,
) -> Option<TextElement> {
    let text = detection.text.trim();
    if text.is_empty() {
        return None;
    }
    let pixels = BBox::enclosing(&detection.quad)?;
    let bbox = pixels.scaled(scale_x, scale_y);
    if !bbox.is_valid() {
        return None;
    }

    let color = PixelRect::from_page_box(&pixels, 1.0, 1.0, 0.0, image.width(), image.height())
        .and_then(|rect| image.mean_color(rect))
        .map(|rgb| ColorHex::from_rgb(rgb.0[0], rgb.0[1], rgb.0[2]))
        .unwrap_or_default();

    Some(TextElement::new(
        element_id(page, index),
        page,
        text,
        bbox,
        PointF::new(bbox.x0, bbox.y1),
        bbox.height() * OCR_SIZE_FACTOR,
        color,
        TextSource::Ocr,
    ))
}
