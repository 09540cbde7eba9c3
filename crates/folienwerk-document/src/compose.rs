// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Composition model shared by the PDF and slide backends: a background image
// plus positioned text runs, one per output page.

use folienwerk_core::error::Result;
use folienwerk_core::{BBox, ColorHex, PageSize, PointF, TextElement};
use image::RgbImage;

/// A styled piece of text placed on a composed page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub bbox: BBox,
    /// Baseline start point.
    pub origin: PointF,
    pub size: f32,
    pub color: ColorHex,
    /// Painted text when `true`; present for search and copy only when
    /// `false`.
    pub visible: bool,
    /// Paint an opaque white box (padded by 1pt) behind the text first.
    pub cover: bool,
}

impl TextRun {
    /// A visible run showing the element's current text in its own style.
    pub fn from_element(element: &TextElement) -> Self {
        Self {
            text: element.new_text.clone(),
            bbox: element.bbox,
            origin: element.origin,
            size: element.font_size_pt,
            color: element.color_hex.clone(),
            visible: true,
            cover: false,
        }
    }

    /// An invisible run carrying the element's original text.
    pub fn hidden(element: &TextElement) -> Self {
        Self {
            text: element.original_text.clone(),
            visible: false,
            ..Self::from_element(element)
        }
    }

    pub fn with_color(mut self, color: ColorHex) -> Self {
        self.color = color;
        self
    }

    pub fn with_cover(mut self, cover: bool) -> Self {
        self.cover = cover;
        self
    }
}

/// Everything needed to write one output page or slide.
#[derive(Debug, Clone)]
pub struct ComposedPage {
    /// 1-based number of the source page this was built from.
    pub number: u32,
    pub size: PageSize,
    /// Stretched over the whole page.
    pub background: RgbImage,
    pub runs: Vec<TextRun>,
    /// Speaker notes. Only the slide backend uses them.
    pub notes: Option<String>,
}

impl ComposedPage {
    pub fn new(number: u32, size: PageSize, background: RgbImage) -> Self {
        Self {
            number,
            size,
            background,
            runs: Vec::new(),
            notes: None,
        }
    }

    pub fn with_runs(mut self, runs: Vec<TextRun>) -> Self {
        self.runs = runs;
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }
}

/// Speaker notes for a slide: element texts in extraction order, one per
/// line. `None` when the slide has no text.
pub fn speaker_notes(elements: &[TextElement]) -> Option<String> {
    if elements.is_empty() {
        return None;
    }
    let lines: Vec<&str> = elements.iter().map(|e| e.new_text.as_str()).collect();
    Some(lines.join("\n"))
}

/// Receives composed pages in output order.
///
/// Writers are not thread-safe; callers push pages from one thread, in
/// source-page order.
pub trait PageSink {
    fn push_page(&mut self, page: &ComposedPage) -> Result<()>;
}
