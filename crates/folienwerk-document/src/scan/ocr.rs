// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR engine backed by `ocrs`, a pure-Rust OCR engine running neural network
// models via `rten`.
//
// # Feature Gate
//
// This module is only available when the `ocr` feature is enabled:
//
// ```toml
// folienwerk-document = { path = "crates/folienwerk-document", features = ["ocr"] }
// ```
//
// # Model Setup
//
// The engine needs two model files, `text-detection.rten` and
// `text-recognition.rten`. Running `ocrs-cli` once downloads them to
// `$XDG_CACHE_HOME/ocrs` (typically `~/.cache/ocrs`), which is where the
// default configuration looks.

use std::path::{Path, PathBuf};

use folienwerk_core::PointF;
use folienwerk_core::error::{FolienwerkError, Result};
use image::RgbImage;
use ocrs::{ImageSource, OcrEngine as OcrsEngine, OcrEngineParams, TextItem};
use rten::Model;
use tracing::{debug, info, instrument};

use super::detector::{Detection, TextDetector};

/// ocrs does not score its lines; every recognised line counts as certain.
const OCRS_CONFIDENCE: f32 = 1.0;

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// `$XDG_CACHE_HOME/ocrs`, falling back to `~/.cache/ocrs`.
fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Where to find the OCR models.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub detection_model_path: PathBuf,
    pub recognition_model_path: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl OcrConfig {
    /// Expects the directory to contain `text-detection.rten` and
    /// `text-recognition.rten`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
            recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    /// Verify that both model files exist.
    pub fn validate(&self) -> Result<()> {
        for (kind, path) in [
            ("detection", &self.detection_model_path),
            ("recognition", &self.recognition_model_path),
        ] {
            if !path.exists() {
                return Err(FolienwerkError::OcrError(format!(
                    "{} model not found at {}; run `ocrs-cli` once to download models",
                    kind,
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Line-level text detector built on `ocrs`.
pub struct OcrEngine {
    engine: OcrsEngine,
}

impl OcrEngine {
    /// Load both models. This is the expensive step; keep the engine around.
    ///
    /// The `ocrs` and `rten` crates must be optimised even in dev builds or
    /// recognition is 10-100x slower; the workspace profile takes care of it.
    #[instrument(skip_all, fields(
        detection = %config.detection_model_path.display(),
        recognition = %config.recognition_model_path.display(),
    ))]
    pub fn new(config: OcrConfig) -> Result<Self> {
        config.validate()?;

        let load = |path: &Path| {
            Model::load_file(path).map_err(|err| {
                FolienwerkError::OcrError(format!(
                    "failed to load model from {}: {}",
                    path.display(),
                    err
                ))
            })
        };

        info!("Loading OCR models");
        let detection_model = load(&config.detection_model_path)?;
        let recognition_model = load(&config.recognition_model_path)?;

        let engine = OcrsEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| {
            FolienwerkError::OcrError(format!("failed to initialise OCR engine: {}", err))
        })?;

        info!("OCR engine initialised successfully");
        Ok(Self { engine })
    }
}

impl TextDetector for OcrEngine {
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let (width, height) = image.dimensions();
        let source = ImageSource::from_bytes(image.as_raw(), (width, height)).map_err(|err| {
            FolienwerkError::OcrError(format!(
                "failed to create image source ({}x{}): {}",
                width, height, err
            ))
        })?;

        let input = self.engine.prepare_input(source).map_err(|err| {
            FolienwerkError::OcrError(format!("OCR preprocessing failed: {}", err))
        })?;

        let word_rects = self
            .engine
            .detect_words(&input)
            .map_err(|err| FolienwerkError::OcrError(format!("word detection failed: {}", err)))?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let lines = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|err| {
                FolienwerkError::OcrError(format!("line recognition failed: {}", err))
            })?;

        let detections: Vec<Detection> = lines
            .iter()
            .flatten()
            .filter_map(|line| {
                let text = line.to_string();
                let text = text.trim();
                if text.is_empty() {
                    return None;
                }
                let corners = line.rotated_rect().corners();
                Some(Detection {
                    quad: corners.map(|corner| PointF::new(corner.x, corner.y)),
                    text: text.to_string(),
                    confidence: OCRS_CONFIDENCE,
                })
            })
            .collect();

        debug!(
            words = word_rects.len(),
            lines = detections.len(),
            "OCR recognition complete"
        );
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_dir() {
        let config = OcrConfig::from_dir("/tmp/my-models");
        assert_eq!(
            config.detection_model_path,
            PathBuf::from("/tmp/my-models/text-detection.rten")
        );
        assert_eq!(
            config.recognition_model_path,
            PathBuf::from("/tmp/my-models/text-recognition.rten")
        );
    }

    #[test]
    fn default_config_points_to_model_files() {
        let config = OcrConfig::default();
        assert!(config
            .detection_model_path
            .to_string_lossy()
            .ends_with(DETECTION_MODEL_FILENAME));
    }

    #[test]
    fn missing_models_fail_validation_and_construction() {
        let config = OcrConfig::from_dir("/nonexistent/path/ocr-models");
        assert!(config.validate().is_err());
        assert!(OcrEngine::new(config).is_err());
    }
}
