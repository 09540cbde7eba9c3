// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Folienwerk — rebuilds rasterised, watermarked slide-deck PDFs.
//
// Entry point. Initialises logging, loads configuration, opens the source
// deck, and runs the requested operation.

mod args;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use folienwerk_core::{AppConfig, EditBatch};
use folienwerk_document::{DetectorHandle, LopdfSource, PdfSource, Progress, Reconstructor};
use tracing::info;

use args::Args;

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    run(&args)
}

fn run(args: &Args) -> Result<()> {
    if !args.input.is_file() {
        bail!("input file not found: {}", args.input.display());
    }

    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => AppConfig::default(),
    };
    args.apply_to(&mut config);
    config
        .watermark
        .validate()
        .context("invalid watermark configuration")?;

    let out_dir = output_dir(&args.input, args.output_dir.as_deref());
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let stem = args
        .input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("output")
        .to_string();

    let source = LopdfSource::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    info!(pages = source.page_count(), "Folienwerk starting");

    let detector = detector(args, &config);
    let reconstructor = Reconstructor::new(source, config).with_detector(detector);
    let mut progress = Progress::new(|fraction, message| {
        info!(progress = %format!("{:>3.0}%", fraction * 100.0), "{}", message);
    });

    if let Some(path) = &args.extract_edits {
        let batch = reconstructor.extract_text_data(None, &mut progress)?;
        batch
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(rows = batch.len(), path = %path.display(), "edit batch written");
        return Ok(());
    }

    if let Some(path) = &args.apply_edits {
        let batch = EditBatch::load(path)
            .with_context(|| format!("failed to read edit batch {}", path.display()))?;
        let bytes = reconstructor.apply_edits(&batch, args.fill.into(), &mut progress)?;
        write_output(&out_dir.join(format!("{stem}_edited.pdf")), &bytes)?;
        return Ok(());
    }

    if args.format.wants_pdf() {
        let bytes = reconstructor.render_pdf(&mut progress)?;
        write_output(&out_dir.join(format!("{stem}_enhanced.pdf")), &bytes)?;
    }
    if args.format.wants_slides() {
        let mut progress = Progress::new(|fraction, message| {
            info!(progress = %format!("{:>3.0}%", fraction * 100.0), "{}", message);
        });
        let bytes = reconstructor.render_slides(&mut progress)?;
        write_output(&out_dir.join(format!("{stem}.pptx")), &bytes)?;
    }
    Ok(())
}

/// `explicit`, or the directory holding `input`.
fn output_dir(input: &Path, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(dir) => dir.to_path_buf(),
        None => input
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), bytes = bytes.len(), "output written");
    Ok(())
}

#[cfg(feature = "ocr")]
fn detector(args: &Args, config: &AppConfig) -> DetectorHandle {
    use folienwerk_document::scan::{OcrConfig, OcrEngine, TextDetector};

    if !config.render.enable_ocr && args.extract_edits.is_none() {
        return DetectorHandle::unavailable();
    }
    let ocr_config = match &args.ocr_models {
        Some(dir) => OcrConfig::from_dir(dir),
        None => OcrConfig::default(),
    };
    DetectorHandle::lazy(move || {
        OcrEngine::new(ocr_config.clone()).map(|engine| Box::new(engine) as Box<dyn TextDetector>)
    })
}

#[cfg(not(feature = "ocr"))]
fn detector(args: &Args, config: &AppConfig) -> DetectorHandle {
    if config.render.enable_ocr || args.ocr_models.is_some() {
        tracing::warn!("built without the `ocr` feature, OCR fallback disabled");
    }
    DetectorHandle::unavailable()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_dir_defaults_to_input_directory() {
        assert_eq!(
            output_dir(Path::new("/decks/talk.pdf"), None),
            PathBuf::from("/decks")
        );
        assert_eq!(output_dir(Path::new("talk.pdf"), None), PathBuf::from("."));
        assert_eq!(
            output_dir(Path::new("talk.pdf"), Some(Path::new("out"))),
            PathBuf::from("out")
        );
    }

    #[test]
    fn missing_input_fails_before_processing() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args::try_parse_from([
            "folienwerk",
            dir.path().join("absent.pdf").to_str().unwrap(),
        ])
        .unwrap();
        let err = run(&args).unwrap_err();
        assert!(err.to_string().contains("input file not found"));
    }
}
