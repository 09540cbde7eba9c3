// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line arguments and how they override the loaded configuration.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use folienwerk_core::{AppConfig, BackgroundFill, TextMode};

/// Rebuild a watermarked slide-deck PDF into a clean PDF and/or an editable
/// PPTX.
#[derive(Parser, Debug)]
#[command(name = "folienwerk")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Source PDF
    pub input: PathBuf,

    /// Which outputs to write
    #[arg(short, long, value_enum, default_value_t = OutputFormat::All)]
    pub format: OutputFormat,

    /// Font used to draw text (TTF/OTF)
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Output directory (default: next to the input)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Fall back to OCR on pages with little native text
    #[arg(long)]
    pub ocr: bool,

    /// Directory holding the OCR model files
    #[arg(long)]
    pub ocr_models: Option<PathBuf>,

    /// 1-based pages to drop from the outputs, e.g. `2,5`
    #[arg(long, value_delimiter = ',')]
    pub remove_pages: Vec<u32>,

    /// How slide text is drawn
    #[arg(long, value_enum)]
    pub text_mode: Option<TextModeArg>,

    /// Leave the watermark in place
    #[arg(long)]
    pub no_watermark: bool,

    /// Draw all re-rendered text in red
    #[arg(long)]
    pub debug_red: bool,

    /// Paint a white box behind each re-rendered text element
    #[arg(long)]
    pub cover_old_text: bool,

    /// Prepare pages in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Write the extracted text elements as an editable JSON batch and exit
    #[arg(long, value_name = "OUT.json", conflicts_with = "apply_edits")]
    pub extract_edits: Option<PathBuf>,

    /// Apply an edited JSON batch and write `<stem>_edited.pdf`
    #[arg(long, value_name = "IN.json")]
    pub apply_edits: Option<PathBuf>,

    /// How the regions under changed text are cleared
    #[arg(long, value_enum, default_value_t = FillArg::Blur)]
    pub fill: FillArg,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Pdf,
    Pptx,
    All,
}

impl OutputFormat {
    pub fn wants_pdf(self) -> bool {
        matches!(self, Self::Pdf | Self::All)
    }

    pub fn wants_slides(self) -> bool {
        matches!(self, Self::Pptx | Self::All)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TextModeArg {
    ReRender,
    Overlay,
}

impl From<TextModeArg> for TextMode {
    fn from(mode: TextModeArg) -> Self {
        match mode {
            TextModeArg::ReRender => TextMode::ReRender,
            TextModeArg::Overlay => TextMode::Overlay,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FillArg {
    Blur,
    SmartFill,
    White,
}

impl From<FillArg> for BackgroundFill {
    fn from(fill: FillArg) -> Self {
        match fill {
            FillArg::Blur => BackgroundFill::Blur,
            FillArg::SmartFill => BackgroundFill::SmartFill,
            FillArg::White => BackgroundFill::White,
        }
    }
}

impl Args {
    /// Apply the flags on top of `config`. Flags only ever switch things on
    /// or replace values; an absent flag keeps the configured value.
    pub fn apply_to(&self, config: &mut AppConfig) {
        let render = &mut config.render;
        if self.ocr {
            render.enable_ocr = true;
        }
        if !self.remove_pages.is_empty() {
            render.pages_to_remove = self.remove_pages.clone();
        }
        if let Some(mode) = self.text_mode {
            render.text_mode = mode.into();
        }
        if self.debug_red {
            render.debug_mode = true;
        }
        if self.parallel {
            render.parallel = true;
        }
        if let Some(font) = &self.font {
            render.font_path = Some(font.clone());
        }
        if self.no_watermark {
            config.watermark.enabled = false;
        }
        if self.cover_old_text {
            config.watermark.cover_old_text_with_white_box = true;
        }
    }
}
