// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module — pixel region operations and watermark removal.

pub mod processor;
pub mod watermark;

pub use processor::{ImageProcessor, PixelRect};
pub use watermark::remove_watermark;
