// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// folienwerk-document — Reconstruction pipeline for rasterised slide-deck
// PDFs.
//
// Extracts positioned text (native spans, with OCR fallback), normalises its
// typography, erases the watermark, rebuilds page backgrounds, and composes
// clean PDFs, PPTX slide decks, and edited PDFs.

pub mod background;
pub mod compose;
pub mod edit;
pub mod extract;
pub mod font;
pub mod image;
pub mod normalize;
pub mod pdf;
pub mod pipeline;
pub mod scan;
pub mod slides;
pub mod source;

// Re-export the primary structs so callers can use `folienwerk_document::Reconstructor` etc.
pub use background::BackgroundReconstructor;
pub use compose::{ComposedPage, PageSink, TextRun};
pub use edit::{EditPlan, EditSession, EditedPage, union_target_rect};
pub use extract::TextElementExtractor;
pub use font::{FontSource, TextMeasurer};
pub use self::image::{ImageProcessor, remove_watermark};
pub use pdf::{LopdfSource, PageAssembler, PdfComposer};
pub use pipeline::{Progress, Reconstructor};
pub use scan::{Detection, DetectorHandle, TextDetector};
pub use slides::SlideDeckComposer;
pub use source::{NativeSpan, PdfSource};

#[cfg(feature = "ocr")]
pub use scan::ocr::OcrEngine;
