// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF composer — writes composed pages with `printpdf` 0.8.
//
// printpdf 0.8 uses a data-oriented API: documents are built by constructing
// `PdfPage` structs containing `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`. Its coordinate origin is the bottom-left corner, so
// every y coordinate from the top-left page space is flipped on the way in.

use folienwerk_core::PageSize;
use folienwerk_core::error::Result;
use printpdf::{
    BuiltinFont, Color, FontId, LinePoint, Mm, Op, PaintMode, ParsedFont, PdfDocument, PdfPage,
    PdfSaveOptions, PdfWarnMsg, Point, Polygon, PolygonRing, Pt, RawImage, RawImageData,
    RawImageFormat, Rgb, TextItem, TextRenderingMode, WindingOrder, XObjectTransform,
};
use tracing::{debug, info, instrument, warn};

use crate::compose::{ComposedPage, PageSink, TextRun};
use crate::font::FontSource;

/// Padding, in points, of the white box drawn behind covered text.
pub const COVER_PADDING_PT: f32 = 1.0;

/// Millimetres per PDF point.
const MM_PER_PT: f32 = 25.4 / 72.0;

/// The font text runs are drawn with.
#[derive(Debug, Clone)]
enum PageFont {
    Embedded(FontId),
    Builtin(BuiltinFont),
}

/// Accumulates composed pages into one PDF.
pub struct PdfComposer {
    doc: PdfDocument,
    pages: Vec<PdfPage>,
    font: PageFont,
}

impl PdfComposer {
    /// Start a document titled `title`. Text is drawn with `font` when it
    /// parses, else with built-in Helvetica.
    pub fn new(title: &str, font: Option<&FontSource>) -> Self {
        let mut doc = PdfDocument::new(title);
        let font = match font.and_then(|source| parse_font(source)) {
            Some(parsed) => PageFont::Embedded(doc.add_font(&parsed)),
            None => PageFont::Builtin(BuiltinFont::Helvetica),
        };
        Self {
            doc,
            pages: Vec::new(),
            font,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Serialise every pushed page.
    #[instrument(skip(self), fields(pages = self.pages.len()))]
    pub fn finish(mut self) -> Vec<u8> {
        self.doc.with_pages(self.pages);
        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = self.doc.save(&PdfSaveOptions::default(), &mut warnings);
        if !warnings.is_empty() {
            debug!(warnings = warnings.len(), "printpdf reported warnings");
        }
        info!(bytes = output.len(), "PDF serialised");
        output
    }

    fn text_ops(&self, run: &TextRun, page: PageSize, ops: &mut Vec<Op>) {
        let mode = if run.visible {
            TextRenderingMode::Fill
        } else {
            TextRenderingMode::Invisible
        };
        let (r, g, b) = run.color.rgb_unit();
        let cursor = Point {
            x: Pt(run.origin.x),
            y: Pt(page.height - run.origin.y),
        };
        let items = vec![TextItem::Text(run.text.clone())];

        ops.push(Op::SaveGraphicsState);
        ops.push(Op::SetTextRenderingMode { mode });
        ops.push(Op::SetFillColor { col: rgb(r, g, b) });
        ops.push(Op::StartTextSection);
        ops.push(Op::SetTextCursor { pos: cursor });
        match &self.font {
            PageFont::Embedded(font) => {
                ops.push(Op::SetFontSize {
                    size: Pt(run.size),
                    font: font.clone(),
                });
                ops.push(Op::WriteText {
                    items,
                    font: font.clone(),
                });
            }
            PageFont::Builtin(font) => {
                ops.push(Op::SetFontSizeBuiltinFont {
                    size: Pt(run.size),
                    font: *font,
                });
                ops.push(Op::WriteTextBuiltinFont { items, font: *font });
            }
        }
        ops.push(Op::EndTextSection);
        ops.push(Op::RestoreGraphicsState);
    }
}

impl PageSink for PdfComposer {
    #[instrument(skip_all, fields(page = page.number, runs = page.runs.len()))]
    fn push_page(&mut self, page: &ComposedPage) -> Result<()> {
        let (img_w, img_h) = page.background.dimensions();
        let raw = RawImage {
            pixels: RawImageData::U8(page.background.as_raw().clone()),
            width: img_w as usize,
            height: img_h as usize,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        };
        let xobject_id = self.doc.add_image(&raw);

        // At 72 dpi one pixel is one point, so the scale is points per pixel.
        let mut ops = vec![Op::UseXobject {
            id: xobject_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(0.0)),
                translate_y: Some(Pt(0.0)),
                scale_x: Some(page.size.width / img_w.max(1) as f32),
                scale_y: Some(page.size.height / img_h.max(1) as f32),
                dpi: Some(72.0),
                rotate: None,
            },
        }];

        for run in &page.runs {
            if run.text.is_empty() {
                continue;
            }
            if run.cover {
                ops.push(Op::SaveGraphicsState);
                ops.push(Op::SetFillColor {
                    col: rgb(1.0, 1.0, 1.0),
                });
                ops.push(cover_op(run, page.size));
                ops.push(Op::RestoreGraphicsState);
            }
            self.text_ops(run, page.size, &mut ops);
        }

        self.pages.push(PdfPage::new(
            Mm(page.size.width * MM_PER_PT),
            Mm(page.size.height * MM_PER_PT),
            ops,
        ));
        debug!("page composed");
        Ok(())
    }
}

fn parse_font(source: &FontSource) -> Option<ParsedFont> {
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let parsed = ParsedFont::from_bytes(source.bytes(), 0, &mut warnings);
    if parsed.is_none() {
        warn!(path = %source.path().display(), "font not embeddable, using Helvetica");
    }
    parsed
}

fn rgb(r: f32, g: f32, b: f32) -> Color {
    Color::Rgb(Rgb {
        r,
        g,
        b,
        icc_profile: None,
    })
}

/// A filled rectangle covering the run's box plus padding, in the current
/// fill colour.
fn cover_op(run: &TextRun, page: PageSize) -> Op {
    let rect = run.bbox.padded(COVER_PADDING_PT);
    let (top, bottom) = (page.height - rect.y0, page.height - rect.y1);
    let corner = |x: f32, y: f32| LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    };
    Op::DrawPolygon {
        polygon: Polygon {
            rings: vec![PolygonRing {
                points: vec![
                    corner(rect.x0, bottom),
                    corner(rect.x1, bottom),
                    corner(rect.x1, top),
                    corner(rect.x0, top),
                ],
            }],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::reader::LopdfSource;
    use crate::source::PdfSource;
    use folienwerk_core::{BBox, ColorHex, PointF};
    use image::{Rgb as Pixel, RgbImage};

    fn run(text: &str, visible: bool, cover: bool) -> TextRun {
        TextRun {
            text: text.into(),
            bbox: BBox::new(20.0, 20.0, 80.0, 34.0),
            origin: PointF::new(20.0, 32.0),
            size: 12.0,
            color: ColorHex::parse("#204060"),
            visible,
            cover,
        }
    }

    fn page(number: u32, width: f32, height: f32) -> ComposedPage {
        ComposedPage::new(
            number,
            PageSize::new(width, height),
            RgbImage::from_pixel(40, 30, Pixel([200, 200, 200])),
        )
    }

    #[test]
    fn pages_keep_source_geometry() {
        let mut composer = PdfComposer::new("test", None);
        composer
            .push_page(&page(1, 400.0, 300.0).with_runs(vec![run("Title", true, true)]))
            .unwrap();
        composer
            .push_page(&page(2, 200.0, 100.0).with_runs(vec![run("Hidden", false, false)]))
            .unwrap();
        assert_eq!(composer.page_count(), 2);

        let bytes = composer.finish();
        assert!(bytes.starts_with(b"%PDF"));
        let reopened = LopdfSource::from_bytes(&bytes).unwrap();
        assert_eq!(reopened.page_count(), 2);
        let first = reopened.page_size(1).unwrap();
        assert!((first.width - 400.0).abs() < 0.5);
        assert!((first.height - 300.0).abs() < 0.5);
        let second = reopened.page_size(2).unwrap();
        assert!((second.width - 200.0).abs() < 0.5);
    }

    #[test]
    fn cover_box_is_padded_and_flipped() {
        let op = cover_op(&run("x", true, true), PageSize::new(100.0, 100.0));
        let Op::DrawPolygon { polygon } = op else {
            panic!("expected a polygon");
        };
        let ys: Vec<f32> = polygon.rings[0].points.iter().map(|p| p.p.y.0).collect();
        let xs: Vec<f32> = polygon.rings[0].points.iter().map(|p| p.p.x.0).collect();
        assert_eq!(xs, vec![19.0, 81.0, 81.0, 19.0]);
        // y0 = 20 - 1 -> 81 from the bottom; y1 = 34 + 1 -> 65.
        assert_eq!(ys, vec![65.0, 65.0, 81.0, 81.0]);
    }
}
