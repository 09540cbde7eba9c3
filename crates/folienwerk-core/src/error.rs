// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Folienwerk.

use thiserror::Error;

/// Top-level error type for all Folienwerk operations.
#[derive(Debug, Error)]
pub enum FolienwerkError {
    // -- Input errors --
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    // -- Document errors --
    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("OCR failed: {0}")]
    OcrError(String),

    #[error("font error: {0}")]
    FontError(String),

    #[error("document composition failed: {0}")]
    ComposeError(String),

    /// A failure scoped to one source page of a document run.
    #[error("page {page} failed: {source}")]
    Page {
        page: u32,
        #[source]
        source: Box<FolienwerkError>,
    },

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FolienwerkError {
    /// Wrap this error so that the report names the page that failed.
    ///
    /// Already page-scoped errors are returned unchanged.
    pub fn on_page(self, page: u32) -> Self {
        match self {
            already @ Self::Page { .. } => already,
            other => Self::Page {
                page,
                source: Box::new(other),
            },
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FolienwerkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_scope_names_the_page() {
        let err = FolienwerkError::ImageError("bad crop".into()).on_page(3);
        assert_eq!(err.to_string(), "page 3 failed: image processing failed: bad crop");
    }

    #[test]
    fn page_scope_is_not_nested() {
        let err = FolienwerkError::PdfError("x".into()).on_page(2).on_page(7);
        match err {
            FolienwerkError::Page { page, .. } => assert_eq!(page, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
