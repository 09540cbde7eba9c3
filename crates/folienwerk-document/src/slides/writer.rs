// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Slide deck composer — streams composed pages into a PPTX package.

use std::io::{Cursor, Write};

use folienwerk_core::error::{FolienwerkError, Result};
use tracing::{debug, info, instrument};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::parts::{self, EmuRect, RunFill, TextBox};
use crate::compose::{ComposedPage, PageSink};
use crate::image::ImageProcessor;

/// Text boxes narrower or shorter than this many points are dropped.
pub const MIN_BOX_EXTENT_PT: f32 = 1.0;

/// Writes one slide per pushed page. Slide size is fixed by the first page.
pub struct SlideDeckComposer {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    title: String,
    jpeg_quality: u8,
    slide_size: Option<EmuRect>,
    slides: usize,
    notes: Vec<usize>,
}

fn zip_error(err: zip::result::ZipError) -> FolienwerkError {
    FolienwerkError::ComposeError(format!("slide package: {}", err))
}

impl SlideDeckComposer {
    pub fn new(title: impl Into<String>, jpeg_quality: u8) -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            title: title.into(),
            jpeg_quality,
            slide_size: None,
            slides: 0,
            notes: Vec::new(),
        }
    }

    pub fn slide_count(&self) -> usize {
        self.slides
    }

    fn write_part(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip.start_file(name, options).map_err(zip_error)?;
        self.zip.write_all(data)?;
        Ok(())
    }

    /// Write the package-level parts and return the finished archive.
    #[instrument(skip(self), fields(slides = self.slides))]
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if self.slides == 0 {
            return Err(FolienwerkError::ComposeError(
                "slide deck has no slides".into(),
            ));
        }
        let size = self.slide_size.unwrap_or(EmuRect {
            x: 0,
            y: 0,
            cx: 0,
            cy: 0,
        });
        let package = [
            (
                "[Content_Types].xml",
                parts::content_types_xml(self.slides, &self.notes),
            ),
            ("_rels/.rels", parts::root_rels_xml()),
            ("docProps/core.xml", parts::core_props_xml(&self.title)),
            ("docProps/app.xml", parts::app_props_xml(self.slides)),
            (
                "ppt/presentation.xml",
                parts::presentation_xml(self.slides, (size.cx, size.cy)),
            ),
            (
                "ppt/_rels/presentation.xml.rels",
                parts::presentation_rels_xml(self.slides),
            ),
            ("ppt/presProps.xml", parts::pres_props_xml()),
            ("ppt/slideMasters/slideMaster1.xml", parts::slide_master_xml()),
            (
                "ppt/slideMasters/_rels/slideMaster1.xml.rels",
                parts::slide_master_rels_xml(),
            ),
            ("ppt/slideLayouts/slideLayout1.xml", parts::slide_layout_xml()),
            (
                "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
                parts::slide_layout_rels_xml(),
            ),
            ("ppt/notesMasters/notesMaster1.xml", parts::notes_master_xml()),
            (
                "ppt/notesMasters/_rels/notesMaster1.xml.rels",
                parts::notes_master_rels_xml(),
            ),
            ("ppt/theme/theme1.xml", parts::theme_xml("Folienwerk")),
            ("ppt/theme/theme2.xml", parts::theme_xml("Folienwerk Notes")),
        ];
        for (name, xml) in package {
            self.write_part(name, xml.as_bytes())?;
        }

        let bytes = self.zip.finish().map_err(zip_error)?.into_inner();
        info!(bytes = bytes.len(), "slide deck serialised");
        Ok(bytes)
    }
}

impl PageSink for SlideDeckComposer {
    #[instrument(skip_all, fields(page = page.number, runs = page.runs.len()))]
    fn push_page(&mut self, page: &ComposedPage) -> Result<()> {
        let slide_size = *self.slide_size.get_or_insert_with(|| {
            EmuRect::from_points(0.0, 0.0, page.size.width, page.size.height)
        });
        let n = self.slides + 1;

        let jpeg = ImageProcessor::new(page.background.clone()).to_jpeg_bytes(self.jpeg_quality)?;

        let colors: Vec<String> = page
            .runs
            .iter()
            .map(|run| run.color.as_str().trim_start_matches('#').to_string())
            .collect();
        let boxes: Vec<TextBox<'_>> = page
            .runs
            .iter()
            .zip(&colors)
            .filter(|(run, _)| {
                run.bbox.width() >= MIN_BOX_EXTENT_PT && run.bbox.height() >= MIN_BOX_EXTENT_PT
            })
            .map(|(run, hex)| TextBox {
                rect: EmuRect::from_points(
                    run.bbox.x0,
                    run.bbox.y0,
                    run.bbox.width(),
                    run.bbox.height(),
                ),
                text: &run.text,
                size: (run.size * 100.0).round().max(100.0) as u32,
                fill: if run.visible {
                    RunFill::Solid(hex)
                } else {
                    RunFill::None
                },
            })
            .collect();
        debug!(
            boxes = boxes.len(),
            skipped = page.runs.len() - boxes.len(),
            "slide text boxes"
        );

        let notes = page.notes.as_deref().filter(|notes| !notes.is_empty());
        let slide = parts::slide_xml(slide_size, &boxes);
        let rels = parts::slide_rels_xml(n, notes.is_some());

        self.write_part(&format!("ppt/media/image{n}.jpeg"), &jpeg)?;
        self.write_part(&format!("ppt/slides/slide{n}.xml"), slide.as_bytes())?;
        self.write_part(&format!("ppt/slides/_rels/slide{n}.xml.rels"), rels.as_bytes())?;
        if let Some(notes) = notes {
            self.write_part(
                &format!("ppt/notesSlides/notesSlide{n}.xml"),
                parts::notes_slide_xml(notes).as_bytes(),
            )?;
            self.write_part(
                &format!("ppt/notesSlides/_rels/notesSlide{n}.xml.rels"),
                parts::notes_slide_rels_xml(n).as_bytes(),
            )?;
            self.notes.push(n);
        }

        self.slides = n;
        Ok(())
    }
}
