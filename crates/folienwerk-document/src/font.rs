// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Font loading and text measurement.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use folienwerk_core::error::{FolienwerkError, Result};
use tracing::{debug, info, warn};

/// Locations tried, in order, when no font is configured.
pub const DEFAULT_FONT_CANDIDATES: &[&str] = &[
    "fonts/NotoSansTC-Regular.otf",
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
    "/System/Library/Fonts/PingFang.ttc",
    "C:\\Windows\\Fonts\\msjh.ttc",
];

/// Raw bytes of a font file that parsed successfully.
#[derive(Clone)]
pub struct FontSource {
    path: PathBuf,
    data: Arc<Vec<u8>>,
}

impl std::fmt::Debug for FontSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontSource")
            .field("path", &self.path)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl FontSource {
    /// Read and validate a font file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|err| {
            FolienwerkError::FontError(format!("cannot read {}: {}", path.display(), err))
        })?;
        ttf_parser::Face::parse(&data, 0).map_err(|err| {
            FolienwerkError::FontError(format!("cannot parse {}: {}", path.display(), err))
        })?;
        debug!(path = %path.display(), bytes = data.len(), "font loaded");
        Ok(Self {
            path: path.to_path_buf(),
            data: Arc::new(data),
        })
    }

    /// The configured font if it loads, else the first default candidate that
    /// does. `None` means callers should use a built-in font.
    pub fn resolve(configured: Option<&Path>) -> Option<Self> {
        if let Some(path) = configured {
            match Self::load(path) {
                Ok(font) => return Some(font),
                Err(err) => warn!(%err, "configured font unusable, trying defaults"),
            }
        }
        let found = DEFAULT_FONT_CANDIDATES
            .iter()
            .map(Path::new)
            .filter(|path| path.exists())
            .find_map(|path| Self::load(path).ok());
        match &found {
            Some(font) => info!(path = %font.path.display(), "using font"),
            None => warn!("no usable font found, falling back to built-in Helvetica"),
        }
        found
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Measures rendered text width from a font's horizontal advances.
pub struct TextMeasurer<'a> {
    face: ttf_parser::Face<'a>,
}

impl<'a> TextMeasurer<'a> {
    pub fn new(font: &'a FontSource) -> Option<Self> {
        ttf_parser::Face::parse(font.bytes(), 0)
            .ok()
            .map(|face| Self { face })
    }

    /// Width of `text` at `size` points. `None` when any character has no
    /// glyph in the font.
    pub fn measure(&self, text: &str, size: f32) -> Option<f32> {
        let units_per_em = self.face.units_per_em() as f32;
        if units_per_em <= 0.0 {
            return None;
        }
        let mut advance = 0u32;
        for ch in text.chars() {
            let glyph = self.face.glyph_index(ch)?;
            advance += self.face.glyph_hor_advance(glyph)? as u32;
        }
        Some(advance as f32 / units_per_em * size)
    }
}

/// Width of `text` at `size`, measured with `font` when possible and
/// estimated as one em per character otherwise.
pub fn text_width(font: Option<&FontSource>, text: &str, size: f32) -> f32 {
    font.and_then(TextMeasurer::new)
        .and_then(|measurer| measurer.measure(text, size))
        .unwrap_or_else(|| text.chars().count() as f32 * size)
}
