// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Slide deck output (PPTX).

pub mod parts;
pub mod writer;

pub use writer::SlideDeckComposer;
