// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — reading source decks, composing new pages, and stitching
// copied and composed pages together.

pub mod assemble;
mod content;
mod raster;
pub mod reader;
pub mod writer;

pub use assemble::{PageAssembler, PageOrigin};
pub use reader::LopdfSource;
pub use writer::PdfComposer;
