// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Source document capability. The pipeline never touches a PDF library
// directly; it asks a `PdfSource` for page geometry, native text, and page
// images, so tests can drive it with an in-memory fake.

use folienwerk_core::error::{FolienwerkError, Result};
use folienwerk_core::{BBox, PageSize, PointF};
use image::RgbImage;

/// A run of same-styled text reported by the PDF's own text layer.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeSpan {
    pub text: String,
    pub bbox: BBox,
    /// Baseline start point.
    pub origin: PointF,
    pub font_size: f32,
    /// Packed `0xRRGGBB` fill colour.
    pub color: u32,
}

/// Read access to one opened source PDF.
///
/// Page numbers are 1-based. Coordinates are PDF points with the origin at
/// the top-left corner of the page.
pub trait PdfSource: Send + Sync {
    fn page_count(&self) -> u32;

    fn page_size(&self, page: u32) -> Result<PageSize>;

    /// Native text spans in reading order.
    fn native_spans(&self, page: u32) -> Result<Vec<NativeSpan>>;

    /// Bounding boxes of the page's text blocks.
    fn text_blocks(&self, page: u32) -> Result<Vec<BBox>>;

    /// Render the page at `dpi`.
    fn rasterize(&self, page: u32, dpi: f32) -> Result<RgbImage>;

    /// Render the page at `dpi` with the text inside `redactions` removed and
    /// the images, vectors, and backgrounds behind it kept.
    fn render_redacted(&self, page: u32, redactions: &[BBox], dpi: f32) -> Result<RgbImage>;

    /// The parsed document, when the backend has one. Used to copy untouched
    /// pages verbatim into an edited PDF.
    fn document(&self) -> Option<&lopdf::Document> {
        None
    }

    /// Fail with [`FolienwerkError::PageOutOfRange`] unless `page` exists.
    fn check_page(&self, page: u32) -> Result<()> {
        let page_count = self.page_count();
        if page == 0 || page > page_count {
            return Err(FolienwerkError::PageOutOfRange { page, page_count });
        }
        Ok(())
    }
}
