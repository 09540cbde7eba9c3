// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Optical character recognition — the detector capability, its shared
// handle, and the `ocrs` engine behind the `ocr` feature.

pub mod detector;

#[cfg(feature = "ocr")]
pub mod ocr;

pub use detector::{Detection, DetectorHandle, TextDetector};

#[cfg(feature = "ocr")]
pub use ocr::{OcrConfig, OcrEngine};
