// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration. Replaces the settings sidebar of the original tool
// with plain serialisable structs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FolienwerkError, Result};

/// How the watermark rectangle is erased.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WatermarkStrategy {
    /// Paste the horizontally flipped mirror region from the other side of
    /// the page.
    Mirror,
    /// Paste an unflipped patch whose top-left corner is given as page
    /// ratios.
    Manual { source_x: f32, source_y: f32 },
    /// Paint the rectangle flat white.
    White,
}

/// The watermark rectangle (as ratios of page width/height) and how to
/// remove it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    pub enabled: bool,
    pub target_x: f32,
    pub target_y: f32,
    pub target_width: f32,
    pub target_height: f32,
    pub strategy: WatermarkStrategy,
    /// Draw an opaque white box behind each re-rendered text element.
    pub cover_old_text_with_white_box: bool,
}

impl Default for WatermarkConfig {
    /// The bottom-right badge position of a typical AI notebook export.
    fn default() -> Self {
        Self {
            enabled: true,
            target_x: 0.89,
            target_y: 0.95,
            target_width: 0.11,
            target_height: 0.04,
            strategy: WatermarkStrategy::Mirror,
            cover_old_text_with_white_box: false,
        }
    }
}

impl WatermarkConfig {
    /// A configuration that leaves every image untouched.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Build the strategy from the two independent UI toggles. Mirror wins
    /// when both are set; neither means white fill.
    pub fn strategy_from_flags(
        use_mirror: bool,
        use_manual: bool,
        source_x: f32,
        source_y: f32,
    ) -> WatermarkStrategy {
        if use_mirror {
            WatermarkStrategy::Mirror
        } else if use_manual {
            WatermarkStrategy::Manual { source_x, source_y }
        } else {
            WatermarkStrategy::White
        }
    }

    /// Check that every ratio lies in `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        let mut ratios = vec![
            ("target_x", self.target_x),
            ("target_y", self.target_y),
            ("target_width", self.target_width),
            ("target_height", self.target_height),
        ];
        if let WatermarkStrategy::Manual { source_x, source_y } = self.strategy {
            ratios.push(("source_x", source_x));
            ratios.push(("source_y", source_y));
        }
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(FolienwerkError::InvalidInput(format!(
                    "watermark {name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// How slide text is styled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextMode {
    /// Visible coloured text over a text-erased background.
    #[default]
    ReRender,
    /// Transparent, selectable text over the original (watermark-cleaned)
    /// background.
    Overlay,
}

/// How the edit session hides stale glyphs under changed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackgroundFill {
    /// Strong Gaussian blur of the region.
    #[default]
    Blur,
    /// Flat fill with the average of the region's corner pixels.
    SmartFill,
    /// Flat white.
    White,
}

/// Which normalisation passes run after extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    pub sizes: bool,
    pub coordinates: bool,
    pub content_fit: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            sizes: true,
            coordinates: true,
            content_fit: true,
        }
    }
}

/// Rendering and extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Background resolution of the enhanced PDF.
    pub pdf_dpi: f32,
    /// Background resolution of slides (kept lower to keep decks light).
    pub slide_dpi: f32,
    /// Background resolution of the edited PDF.
    pub edit_dpi: f32,
    /// Resolution of the image handed to OCR.
    pub ocr_dpi: f32,
    /// JPEG quality of slide backgrounds.
    pub jpeg_quality: u8,
    /// Fall back to OCR on pages with little native text.
    pub enable_ocr: bool,
    /// Draw every re-rendered glyph in red.
    pub debug_mode: bool,
    pub text_mode: TextMode,
    /// 1-based page numbers dropped from every output.
    pub pages_to_remove: Vec<u32>,
    /// Font used to draw text. `None` searches the default locations.
    pub font_path: Option<PathBuf>,
    /// Prepare pages on a worker pool.
    pub parallel: bool,
    pub normalize: NormalizeOptions,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            pdf_dpi: 300.0,
            slide_dpi: 150.0,
            edit_dpi: 300.0,
            ocr_dpi: 150.0,
            jpeg_quality: 80,
            enable_ocr: false,
            debug_mode: false,
            text_mode: TextMode::ReRender,
            pages_to_remove: Vec::new(),
            font_path: None,
            parallel: false,
            normalize: NormalizeOptions::default(),
        }
    }
}

impl RenderConfig {
    pub fn is_excluded(&self, page: u32) -> bool {
        self.pages_to_remove.contains(&page)
    }
}

/// Everything a run needs, loadable from one JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub watermark: WatermarkConfig,
    pub render: RenderConfig,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&json)?;
        config.watermark.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
