// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — opens a source deck with `lopdf` and answers the page
// questions the pipeline asks: geometry, native text, and page images.

use std::path::Path;
use std::sync::OnceLock;

use folienwerk_core::error::{FolienwerkError, Result};
use folienwerk_core::{BBox, PageSize};
use image::RgbImage;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, info, instrument};

use super::content::{Interpreter, Matrix, PageContent, PageFrame, number, resolve};
use super::raster::{self, Canvas};
use crate::font::FontSource;
use crate::source::{NativeSpan, PdfSource};

/// US Letter, used when a page carries no usable MediaBox.
const FALLBACK_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];
/// Inherited attributes are looked up at most this many levels up the tree.
const MAX_TREE_DEPTH: usize = 64;

/// A source PDF backed by `lopdf`.
pub struct LopdfSource {
    /// The underlying lopdf document.
    document: Document,
    /// Page object ids, index 0 holding page 1.
    pages: Vec<ObjectId>,
    /// Source path, if opened from a file (useful for diagnostics).
    source_path: Option<String>,
    /// Outlines for glyphs of fonts the file does not embed, resolved on
    /// first use.
    fallback_font: OnceLock<Option<FontSource>>,
}

impl LopdfSource {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        info!("Opening PDF: {}", path_ref.display());

        let document = Document::load(path_ref).map_err(|err| {
            FolienwerkError::PdfError(format!("failed to open {}: {}", path_ref.display(), err))
        })?;

        let mut source = Self::from_document(document)?;
        source.source_path = Some(path_ref.display().to_string());
        Ok(source)
    }

    /// Create a source from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            FolienwerkError::PdfError(format!("failed to load PDF from memory: {}", err))
        })?;
        Self::from_document(document)
    }

    fn from_document(document: Document) -> Result<Self> {
        if document.is_encrypted() {
            return Err(FolienwerkError::InvalidInput(
                "encrypted PDFs are not supported".into(),
            ));
        }
        // `get_pages` is keyed by 1-based page number in page-tree order.
        let pages: Vec<ObjectId> = document.get_pages().into_values().collect();
        if pages.is_empty() {
            return Err(FolienwerkError::InvalidInput("PDF has no pages".into()));
        }
        debug!(pages = pages.len(), "PDF loaded");
        Ok(Self {
            document,
            pages,
            source_path: None,
            fallback_font: OnceLock::new(),
        })
    }

    // -- Inspection -----------------------------------------------------------

    /// Return the source path if the source was created via [`LopdfSource::open`].
    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    fn page_id(&self, page: u32) -> Result<ObjectId> {
        self.check_page(page)?;
        Ok(self.pages[page as usize - 1])
    }

    fn page_dict(&self, page_id: ObjectId) -> Result<&Dictionary> {
        self.document
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|err| {
                FolienwerkError::PdfError(format!(
                    "cannot read page object {:?}: {}",
                    page_id, err
                ))
            })
    }

    /// `[llx, lly, urx, ury]` of the page's MediaBox, following inheritance.
    fn media_box(&self, page_id: ObjectId) -> Result<[f32; 4]> {
        let page = self.page_dict(page_id)?;
        let media_box = inherited(&self.document, page, b"MediaBox")
            .and_then(|obj| obj.as_array().ok())
            .and_then(|arr| {
                let values: Vec<f32> = arr
                    .iter()
                    .filter_map(|v| number(resolve(&self.document, v)))
                    .collect();
                <[f32; 4]>::try_from(values).ok()
            })
            .map(|[a, b, c, d]| [a.min(c), b.min(d), a.max(c), b.max(d)])
            .filter(|[llx, lly, urx, ury]| urx > llx && ury > lly);

        Ok(media_box.unwrap_or_else(|| {
            debug!(?page_id, "no usable MediaBox, assuming US Letter");
            FALLBACK_MEDIA_BOX
        }))
    }

    /// Run the content stream interpreter over one page.
    fn interpret(&self, page: u32) -> Result<(PageContent<'_>, [f32; 4])> {
        let page_id = self.page_id(page)?;
        let media_box = self.media_box(page_id)?;
        let page_dict = self.page_dict(page_id)?;
        let resources = inherited(&self.document, page_dict, b"Resources")
            .and_then(|obj| obj.as_dict().ok());

        let bytes = self.document.get_page_content(page_id).map_err(|err| {
            FolienwerkError::PdfError(format!("cannot read content of page {}: {}", page, err))
        })?;

        let frame = PageFrame {
            llx: media_box[0],
            ury: media_box[3],
        };
        let mut interpreter = Interpreter::new(&self.document, frame);
        interpreter.run(&bytes, resources, Matrix::IDENTITY, 0)?;
        Ok((interpreter.finish(), media_box))
    }

    /// Render one page, leaving out glyphs inside `redactions`.
    fn paint(&self, page: u32, dpi: f32, redactions: &[BBox]) -> Result<RgbImage> {
        let (content, media_box) = self.interpret(page)?;
        let size = PageSize::new(media_box[2] - media_box[0], media_box[3] - media_box[1]);
        let (width, height) = size.pixels_at(dpi);
        let canvas = Canvas {
            frame: PageFrame {
                llx: media_box[0],
                ury: media_box[3],
            },
            width,
            height,
            dpi,
        };
        debug!(marks = content.marks.len(), width, height, "painting page");
        let fallback = self
            .fallback_font
            .get_or_init(|| FontSource::resolve(None));
        Ok(raster::render(
            &self.document,
            &content.marks,
            canvas,
            fallback.as_ref(),
            redactions,
        ))
    }
}

impl PdfSource for LopdfSource {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_size(&self, page: u32) -> Result<PageSize> {
        let [llx, lly, urx, ury] = self.media_box(self.page_id(page)?)?;
        Ok(PageSize::new(urx - llx, ury - lly))
    }

    #[instrument(skip(self))]
    fn native_spans(&self, page: u32) -> Result<Vec<NativeSpan>> {
        let (content, _) = self.interpret(page)?;
        debug!(spans = content.spans.len(), "native spans read");
        Ok(content.spans)
    }

    fn text_blocks(&self, page: u32) -> Result<Vec<BBox>> {
        Ok(self.interpret(page)?.0.blocks)
    }

    #[instrument(skip(self))]
    fn rasterize(&self, page: u32, dpi: f32) -> Result<RgbImage> {
        self.paint(page, dpi, &[])
    }

    #[instrument(skip(self, redactions), fields(redactions = redactions.len()))]
    fn render_redacted(&self, page: u32, redactions: &[BBox], dpi: f32) -> Result<RgbImage> {
        self.paint(page, dpi, redactions)
    }

    fn document(&self) -> Option<&Document> {
        Some(&self.document)
    }
}

/// Look up a page attribute, walking `/Parent` links for inheritable keys.
pub(crate) fn inherited<'d>(
    doc: &'d Document,
    page: &'d Dictionary,
    key: &[u8],
) -> Option<&'d Object> {
    let mut node = page;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(resolve(doc, value));
        }
        node = node
            .get(b"Parent")
            .ok()
            .and_then(|parent| resolve(doc, parent).as_dict().ok())?;
    }
    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Stream, dictionary};

    /// A one-page 400x300 PDF with a red full-bleed image and one line of text.
    pub(crate) fn sample_pdf() -> Vec<u8> {
        build_pdf(vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![400.into(), 0.into(), 0.into(), 300.into(), 0.into(), 0.into()],
            ),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![50.into(), 250.into()]),
            Operation::new("Tj", vec![Object::string_literal("Title")]),
            Operation::new("ET", vec![]),
        ])
    }

    /// A 400x300 page with nothing but 72pt text.
    fn text_only_pdf() -> Vec<u8> {
        build_pdf(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 72.into()]),
            Operation::new("Td", vec![20.into(), 100.into()]),
            Operation::new("Tj", vec![Object::string_literal("HHHH")]),
            Operation::new("ET", vec![]),
        ])
    }

    /// One 400x300 page running `operations`, with Helvetica as `F1` and a
    /// red 4x3 image as `Im0` inherited from the page tree.
    fn build_pdf(operations: Vec<Operation>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let pixels: Vec<u8> = (0..4 * 3).flat_map(|_| [220u8, 10, 10]).collect();
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 4,
                "Height" => 3,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            pixels,
        ));
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
            "XObject" => dictionary! { "Im0" => image_id },
        });

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 400.into(), 300.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn reads_inherited_media_box() {
        let source = LopdfSource::from_bytes(&sample_pdf()).unwrap();
        assert_eq!(source.page_count(), 1);
        assert_eq!(source.page_size(1).unwrap(), PageSize::new(400.0, 300.0));
    }

    #[test]
    fn page_zero_and_past_end_are_rejected() {
        let source = LopdfSource::from_bytes(&sample_pdf()).unwrap();
        assert!(matches!(
            source.page_size(0),
            Err(FolienwerkError::PageOutOfRange { page: 0, page_count: 1 })
        ));
        assert!(source.native_spans(2).is_err());
    }

    #[test]
    fn native_spans_use_inherited_resources() {
        let source = LopdfSource::from_bytes(&sample_pdf()).unwrap();
        let spans = source.native_spans(1).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Title");
        assert!((spans[0].origin.y - 50.0).abs() < 1e-3);
        assert_eq!(source.text_blocks(1).unwrap().len(), 1);
    }

    fn dark_pixels(image: &RgbImage) -> usize {
        image.pixels().filter(|px| px.0.iter().all(|c| *c < 96)).count()
    }

    #[test]
    fn rasterize_paints_page_image() {
        let source = LopdfSource::from_bytes(&sample_pdf()).unwrap();
        let image = source.rasterize(1, 36.0).unwrap();
        assert_eq!(image.dimensions(), (200, 150));
        let centre = image.get_pixel(100, 75).0;
        assert!((centre[0] as i16 - 220).abs() <= 2 && centre[1] < 16 && centre[2] < 16);
        // A redaction away from the title changes nothing.
        let redacted = source
            .render_redacted(1, &[BBox::new(0.0, 0.0, 10.0, 10.0)], 36.0)
            .unwrap();
        assert_eq!(redacted, image);
    }

    #[test]
    fn rasterize_paints_native_text() {
        let source = LopdfSource::from_bytes(&text_only_pdf()).unwrap();
        let image = source.rasterize(1, 72.0).unwrap();
        assert!(dark_pixels(&image) > 0, "text-only page rendered blank");
    }

    #[test]
    fn redacted_render_drops_text_and_keeps_images() {
        let source = LopdfSource::from_bytes(&sample_pdf()).unwrap();
        let blocks = source.text_blocks(1).unwrap();
        let plain = source.rasterize(1, 72.0).unwrap();
        let redacted = source.render_redacted(1, &blocks, 72.0).unwrap();
        assert!(dark_pixels(&plain) > 0, "title should be painted");
        assert_eq!(dark_pixels(&redacted), 0);
        // The background image is still there under the removed title.
        let under_title = redacted.get_pixel(60, 40).0;
        assert!((under_title[0] as i16 - 220).abs() <= 2);

        let text_only = LopdfSource::from_bytes(&text_only_pdf()).unwrap();
        let blocks = text_only.text_blocks(1).unwrap();
        let cleared = text_only.render_redacted(1, &blocks, 72.0).unwrap();
        assert!(cleared.pixels().all(|px| px.0 == [255, 255, 255]));
    }

    #[test]
    fn garbage_bytes_fail_to_load() {
        assert!(LopdfSource::from_bytes(b"not a pdf").is_err());
    }
}
