// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reconstruction orchestrator — the document-level operations: extract an
// edit batch, render the enhanced PDF, convert to a slide deck, and apply
// edits.
//
// Per-page preparation is independent and may run on the rayon pool; pages
// are always handed to the writers one at a time, in source order. Rendering
// streams: at most one page (sequential) or one pool-sized chunk (parallel)
// is held before it reaches the writer.

use folienwerk_core::error::{FolienwerkError, Result};
use folienwerk_core::{
    AppConfig, BackgroundFill, ColorHex, EditBatch, TextElement, TextMode,
};
use image::RgbImage;
use lopdf::Document;
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::background::BackgroundReconstructor;
use crate::compose::{ComposedPage, PageSink, TextRun, speaker_notes};
use crate::edit::{EditSession, EditedPage};
use crate::extract::TextElementExtractor;
use crate::font::FontSource;
use crate::normalize::{normalize, normalize_sizes};
use crate::pdf::{PageAssembler, PageOrigin, PdfComposer};
use crate::scan::DetectorHandle;
use crate::slides::SlideDeckComposer;
use crate::source::PdfSource;

/// Colour of every glyph in debug mode.
pub const DEBUG_TEXT_COLOR: &str = "#ff0000";

/// Fractional progress reporting for long operations.
///
/// Reported fractions never decrease and stay within `[0, 1]`. Purely
/// observational: nothing here can cancel the operation.
pub struct Progress<'p> {
    callback: Option<Box<dyn FnMut(f32, &str) + 'p>>,
    last: f32,
}

impl<'p> Progress<'p> {
    pub fn new(callback: impl FnMut(f32, &str) + 'p) -> Self {
        Self {
            callback: Some(Box::new(callback)),
            last: 0.0,
        }
    }

    /// A reporter that only tracks the fraction.
    pub fn silent() -> Self {
        Self {
            callback: None,
            last: 0.0,
        }
    }

    pub fn report(&mut self, fraction: f32, message: &str) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(self.last, 1.0)
        } else {
            self.last
        };
        self.last = fraction;
        if let Some(callback) = self.callback.as_mut() {
            callback(fraction, message);
        }
    }

    pub fn finish(&mut self, message: &str) {
        self.report(1.0, message);
    }

    /// The most recently reported fraction.
    pub fn fraction(&self) -> f32 {
        self.last
    }
}

impl Default for Progress<'_> {
    fn default() -> Self {
        Self::silent()
    }
}

/// Runs the reconstruction pipeline over one source document.
pub struct Reconstructor<S: PdfSource> {
    source: S,
    config: AppConfig,
    detector: DetectorHandle,
    font: Option<FontSource>,
}

impl<S: PdfSource> Reconstructor<S> {
    /// Use `config` over `source`. The configured font (or the first default
    /// font found) is loaded now; OCR stays unavailable until a detector is
    /// attached with [`Reconstructor::with_detector`].
    pub fn new(source: S, config: AppConfig) -> Self {
        let font = FontSource::resolve(config.render.font_path.as_deref());
        Self {
            source,
            config,
            detector: DetectorHandle::unavailable(),
            font,
        }
    }

    pub fn with_detector(mut self, detector: DetectorHandle) -> Self {
        self.detector = detector;
        self
    }

    /// Replace the font found at construction.
    pub fn with_font(mut self, font: Option<FontSource>) -> Self {
        self.font = font;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Source pages that appear in rendered outputs, in order.
    pub fn output_pages(&self) -> Vec<u32> {
        (1..=self.source.page_count())
            .filter(|page| !self.config.render.is_excluded(*page))
            .collect()
    }

    fn extractor(&self) -> TextElementExtractor<'_> {
        TextElementExtractor::new(&self.source, &self.detector, self.config.render.ocr_dpi)
    }

    fn backgrounds(&self) -> BackgroundReconstructor<'_> {
        BackgroundReconstructor::new(&self.source, &self.config.watermark)
    }

    /// Run `prepare` for every page, on the worker pool when configured.
    /// Results come back in the order of `pages`, each failure naming its
    /// page.
    fn prepare_pages<T, F>(&self, pages: &[u32], prepare: F) -> Vec<Result<T>>
    where
        T: Send,
        F: Fn(u32) -> Result<T> + Send + Sync,
    {
        let scoped = |page: u32| prepare(page).map_err(|err| err.on_page(page));
        if self.config.render.parallel {
            pages.par_iter().map(|page| scoped(*page)).collect()
        } else {
            pages.iter().map(|page| scoped(*page)).collect()
        }
    }

    /// Extract, normalise, and return every text element of `pages`
    /// (1-based; all pages when `None`). Requested pages that do not exist
    /// are skipped. OCR fallback is always enabled here.
    #[instrument(skip(self, progress))]
    pub fn extract_text_data(
        &self,
        pages: Option<&[u32]>,
        progress: &mut Progress<'_>,
    ) -> Result<EditBatch> {
        let count = self.source.page_count();
        let requested: Vec<u32> = match pages {
            Some(pages) => pages.to_vec(),
            None => (1..=count).collect(),
        };
        let valid: Vec<u32> = requested
            .iter()
            .copied()
            .filter(|page| {
                let ok = (1..=count).contains(page);
                if !ok {
                    warn!(page, count, "requested page out of range, skipped");
                }
                ok
            })
            .collect();

        let extractor = self.extractor();
        let mut results = self.prepare_pages(&valid, |page| extractor.extract(page, true));
        let total = valid.len().max(1) as f32;

        let mut rows: Vec<TextElement> = Vec::new();
        for (index, (page, result)) in valid.iter().zip(results.drain(..)).enumerate() {
            progress.report(index as f32 / total, &format!("Analyzing page {}", page));
            rows.extend(result?);
        }
        progress.finish("Analysis complete!");

        normalize(&mut rows, &self.config.render.normalize);
        info!(elements = rows.len(), pages = valid.len(), "text data extracted");
        Ok(EditBatch::new(rows))
    }

    /// Text runs of the enhanced PDF for one page's raw elements.
    fn pdf_runs(&self, elements: &[TextElement]) -> Vec<TextRun> {
        let render = &self.config.render;
        let cover = self.config.watermark.cover_old_text_with_white_box;
        elements
            .iter()
            .map(|element| {
                let run = TextRun::from_element(element).with_cover(cover);
                if render.debug_mode {
                    run.with_color(ColorHex::parse(DEBUG_TEXT_COLOR))
                } else {
                    run
                }
            })
            .collect()
    }

    /// Compose the enhanced PDF: a text-free, watermark-free background per
    /// page with every element redrawn as native text.
    #[instrument(skip(self, progress))]
    pub fn render_pdf(&self, progress: &mut Progress<'_>) -> Result<Vec<u8>> {
        let pages = self.output_pages();
        if pages.is_empty() {
            return Err(FolienwerkError::InvalidInput(
                "every page is excluded, nothing to render".into(),
            ));
        }
        let render = &self.config.render;
        let extractor = self.extractor();
        let backgrounds = self.backgrounds();

        let mut composer = PdfComposer::new("Folienwerk enhanced deck", self.font.as_ref());
        let prepare = |page: u32| -> Result<ComposedPage> {
            let elements = extractor.extract(page, render.enable_ocr)?;
            let background = backgrounds.text_free(page, render.pdf_dpi)?;
            let size = self.source.page_size(page)?;
            Ok(ComposedPage::new(page, size, background).with_runs(self.pdf_runs(&elements)))
        };
        self.stream_pages(&pages, prepare, &mut composer, progress, "Processing page")?;
        progress.finish("PDF generation complete!");
        Ok(composer.finish())
    }

    /// Compose the slide deck. Re-render mode draws coloured text over a
    /// text-free background; overlay mode draws transparent text over the
    /// original page with only the watermark removed.
    #[instrument(skip(self, progress))]
    pub fn render_slides(&self, progress: &mut Progress<'_>) -> Result<Vec<u8>> {
        let pages = self.output_pages();
        if pages.is_empty() {
            return Err(FolienwerkError::InvalidInput(
                "every page is excluded, nothing to convert".into(),
            ));
        }
        let render = &self.config.render;
        let extractor = self.extractor();
        let backgrounds = self.backgrounds();
        let overlay = render.text_mode == TextMode::Overlay;

        let mut deck = SlideDeckComposer::new("Folienwerk slide deck", render.jpeg_quality);
        let prepare = |page: u32| -> Result<ComposedPage> {
            let background = if overlay {
                backgrounds.watermark_free(page, render.slide_dpi)?
            } else {
                backgrounds.text_free(page, render.slide_dpi)?
            };
            let mut elements = extractor.extract(page, render.enable_ocr)?;
            if render.normalize.sizes {
                normalize_sizes(&mut elements);
            }
            if elements.is_empty() {
                warn!(page, "no text found, slide will be image only");
            }
            let runs = elements
                .iter()
                .map(|element| TextRun {
                    visible: !overlay,
                    ..TextRun::from_element(element)
                })
                .collect();
            let size = self.source.page_size(page)?;
            Ok(ComposedPage::new(page, size, background)
                .with_runs(runs)
                .with_notes(speaker_notes(&elements)))
        };
        self.stream_pages(&pages, prepare, &mut deck, progress, "Converting page")?;
        progress.finish("PPTX conversion complete!");
        deck.finish()
    }

    /// Prepare `pages` and hand each to `sink` in order, reporting progress.
    /// Sequential runs prepare one page at a time; parallel runs prepare one
    /// chunk per pool width. The first failure aborts the run.
    fn stream_pages<F>(
        &self,
        pages: &[u32],
        prepare: F,
        sink: &mut dyn PageSink,
        progress: &mut Progress<'_>,
        label: &str,
    ) -> Result<()>
    where
        F: Fn(u32) -> Result<ComposedPage> + Send + Sync,
    {
        let chunk = if self.config.render.parallel {
            rayon::current_num_threads().max(1)
        } else {
            1
        };
        let total = self.source.page_count();
        for batch in pages.chunks(chunk) {
            for result in self.prepare_pages(batch, &prepare) {
                let page = result?;
                progress.report(
                    (page.number - 1) as f32 / total.max(1) as f32,
                    &format!("{} {}/{}", label, page.number, total),
                );
                let number = page.number;
                sink.push_page(&page).map_err(|err| err.on_page(number))?;
                debug!(page = number, "page written");
            }
        }
        Ok(())
    }

    /// Apply an edited batch and return the edited PDF. Pages the batch does
    /// not mention are copied through unchanged; excluded pages are not
    /// dropped here.
    #[instrument(skip(self, batch, progress), fields(rows = batch.len()))]
    pub fn apply_edits(
        &self,
        batch: &EditBatch,
        fill: BackgroundFill,
        progress: &mut Progress<'_>,
    ) -> Result<Vec<u8>> {
        let session = EditSession::new(
            &self.source,
            &self.config.watermark,
            self.font.as_ref(),
            fill,
            self.config.render.edit_dpi,
        );
        progress.report(0.0, "Applying edits");
        let edited = session.run(batch)?;
        let total = edited.len().max(1) as f32;

        let source_doc: Option<&Document> = self.source.document();
        let mut composer = PdfComposer::new("Folienwerk edited deck", self.font.as_ref());
        let mut order = Vec::with_capacity(edited.len());

        for (index, page) in edited.into_iter().enumerate() {
            match page {
                EditedPage::Copied(number) if source_doc.is_some() => {
                    order.push(PageOrigin::Source(number));
                }
                EditedPage::Copied(number) => {
                    // No parsed document to copy from: keep the page as an
                    // untouched image.
                    let size = self.source.page_size(number)?;
                    let image = self.source.rasterize(number, self.config.render.edit_dpi)?;
                    composer.push_page(&ComposedPage::new(number, size, image))?;
                    order.push(PageOrigin::Composed(composer.page_count() as u32));
                }
                EditedPage::Composed(composed) => {
                    let number = composed.number;
                    composer
                        .push_page(&composed)
                        .map_err(|err| err.on_page(number))?;
                    order.push(PageOrigin::Composed(composer.page_count() as u32));
                }
            }
            progress.report(
                (index + 1) as f32 / total,
                &format!("Assembled page {}/{}", index + 1, total as usize),
            );
        }

        let composed_doc = if composer.page_count() > 0 {
            let bytes = composer.finish();
            Some(Document::load_mem(&bytes).map_err(|err| {
                FolienwerkError::PdfError(format!("failed to reload composed pages: {}", err))
            })?)
        } else {
            None
        };

        let mut assembler = PageAssembler::new();
        assembler.interleave(source_doc, composed_doc.as_ref(), &order)?;
        let output = assembler.finish()?;
        progress.finish("Edits applied!");
        Ok(output)
    }

    /// Plain renders of every page, for previews. Excluded pages are
    /// included so a caller can show what it is excluding.
    #[instrument(skip(self))]
    pub fn page_thumbnails(&self, dpi: f32) -> Result<Vec<(u32, RgbImage)>> {
        let pages: Vec<u32> = (1..=self.source.page_count()).collect();
        self.prepare_pages(&pages, |page| {
            self.source
                .rasterize(page, dpi)
                .map(|image| (page, image))
        })
        .into_iter()
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use folienwerk_core::PageSize;

    use crate::pdf::LopdfSource;
    use crate::pdf::reader::tests::sample_pdf;

    /// Records every page it receives into a shared event log.
    struct LoggingSink<'l>(&'l Mutex<Vec<String>>);

    impl PageSink for LoggingSink<'_> {
        fn push_page(&mut self, page: &ComposedPage) -> Result<()> {
            self.0.lock().unwrap().push(format!("push {}", page.number));
            Ok(())
        }
    }

    fn stream_events(parallel: bool) -> Vec<String> {
        let source = LopdfSource::from_bytes(&sample_pdf()).unwrap();
        let mut config = AppConfig::default();
        config.render.parallel = parallel;
        let reconstructor = Reconstructor::new(source, config).with_font(None);

        let log = Mutex::new(Vec::new());
        let prepare = |page: u32| -> Result<ComposedPage> {
            log.lock().unwrap().push(format!("prepare {page}"));
            Ok(ComposedPage::new(page, PageSize::new(4.0, 3.0), RgbImage::new(4, 3)))
        };
        let mut sink = LoggingSink(&log);
        reconstructor
            .stream_pages(&[1, 2, 3, 4, 5], prepare, &mut sink, &mut Progress::silent(), "Page")
            .unwrap();
        log.into_inner().unwrap()
    }

    #[test]
    fn sequential_pages_reach_the_sink_before_the_next_is_prepared() {
        let events = stream_events(false);
        let expected: Vec<String> = (1..=5)
            .flat_map(|page| [format!("prepare {page}"), format!("push {page}")])
            .collect();
        assert_eq!(events, expected);
    }

    #[test]
    fn parallel_pages_reach_the_sink_in_order() {
        let events = stream_events(true);
        let pushes: Vec<&String> = events.iter().filter(|e| e.starts_with("push")).collect();
        let expected: Vec<String> = (1..=5).map(|page| format!("push {page}")).collect();
        assert_eq!(pushes, expected.iter().collect::<Vec<_>>());
        // No page is pushed before it was prepared.
        for page in 1..=5 {
            let prepared = events.iter().position(|e| *e == format!("prepare {page}"));
            let pushed = events.iter().position(|e| *e == format!("push {page}"));
            assert!(prepared < pushed, "page {page}");
        }
    }

    #[test]
    fn progress_is_monotonic_and_clamped() {
        let mut seen = Vec::new();
        {
            let mut progress = Progress::new(|fraction, _| seen.push(fraction));
            progress.report(0.5, "half");
            progress.report(0.2, "back");
            progress.report(f32::NAN, "nan");
            progress.report(3.0, "over");
        }
        assert_eq!(seen, vec![0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn silent_progress_tracks_fraction() {
        let mut progress = Progress::silent();
        progress.report(0.25, "quarter");
        progress.finish("done");
        assert_eq!(progress.fraction(), 1.0);
    }
}
