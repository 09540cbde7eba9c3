// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page rasteriser — paints the interpreter's marks onto a white `tiny-skia`
// pixmap in content order. Images are drawn through their full CTM, paths
// are filled and stroked, and glyphs are filled from the embedded font's
// outlines. Glyphs of unembedded fonts come from the fallback font, and
// when no outline exists at all a solid block stands in for the glyph.

use image::{DynamicImage, GrayImage, ImageFormat, Rgb, RgbImage};
use lopdf::{Document, Object, Stream};
use tiny_skia::{
    Color, FilterQuality, IntSize, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke,
    Transform,
};
use tracing::{debug, warn};
use ttf_parser::{Face, OutlineBuilder};

use folienwerk_core::{BBox, POINTS_PER_INCH};

use super::content::{
    FillRule, FontDecoder, GlyphRun, Mark, Matrix, PageFrame, PaintedPath, PathSegment,
    PlacedGlyph, PlacedImage, resolve,
};
use crate::font::FontSource;

/// Height of a stand-in block glyph, in ems.
const BLOCK_GLYPH_HEIGHT: f32 = 0.7;
/// Point inside a glyph, in ems above the baseline, tested against redactions.
const GLYPH_BODY_HEIGHT: f32 = 0.3;

/// Pixel size of a render and the page area it covers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Canvas {
    pub frame: PageFrame,
    pub width: u32,
    pub height: u32,
    pub dpi: f32,
}

impl Canvas {
    /// User space to pixels: scale by dpi/72 and flip y.
    fn device(&self) -> Matrix {
        let scale = self.dpi / POINTS_PER_INCH;
        Matrix {
            a: scale,
            b: 0.0,
            c: 0.0,
            d: -scale,
            e: -self.frame.llx * scale,
            f: self.frame.ury * scale,
        }
    }
}

/// Paint `marks` onto a white canvas. Glyphs whose body lies inside one of
/// `redactions` (top-left page points) are left out; images and paths under
/// them are still painted.
pub(crate) fn render(
    doc: &Document,
    marks: &[Mark<'_>],
    canvas: Canvas,
    fallback: Option<&FontSource>,
    redactions: &[BBox],
) -> RgbImage {
    let white = || RgbImage::from_pixel(canvas.width, canvas.height, Rgb([255, 255, 255]));
    let Some(mut pixmap) = Pixmap::new(canvas.width, canvas.height) else {
        warn!(width = canvas.width, height = canvas.height, "cannot allocate canvas");
        return white();
    };
    pixmap.fill(Color::WHITE);

    let painter = Painter {
        doc,
        frame: canvas.frame,
        device: canvas.device(),
        fallback: fallback.and_then(|font| Face::parse(font.bytes(), 0).ok()),
        redactions,
    };
    for mark in marks {
        match mark {
            Mark::Image(placed) => painter.image(&mut pixmap, placed),
            Mark::Path(path) => painter.path(&mut pixmap, path),
            Mark::Glyphs(run) => painter.glyphs(&mut pixmap, run),
        }
    }

    // The canvas starts opaque, so premultiplied channels are the colour.
    let rgb: Vec<u8> = pixmap
        .data()
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();
    RgbImage::from_raw(canvas.width, canvas.height, rgb).unwrap_or_else(white)
}

struct Painter<'r> {
    doc: &'r Document,
    frame: PageFrame,
    device: Matrix,
    fallback: Option<Face<'r>>,
    redactions: &'r [BBox],
}

impl Painter<'_> {
    fn image(&self, pixmap: &mut Pixmap, placed: &PlacedImage<'_>) {
        let Some(decoded) = decode_image(self.doc, placed.stream) else {
            return;
        };
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        let Some(image) = IntSize::from_wh(width, height)
            .and_then(|size| Pixmap::from_vec(rgba.into_raw(), size))
        else {
            return;
        };
        // Image row 0 sits at the top of the unit square.
        let unit = Matrix {
            a: 1.0 / width as f32,
            d: -1.0 / height as f32,
            f: 1.0,
            ..Matrix::IDENTITY
        };
        let transform = unit.then(&placed.ctm).then(&self.device);
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        pixmap.draw_pixmap(0, 0, image.as_ref(), &paint, skia(&transform), None);
    }

    fn path(&self, pixmap: &mut Pixmap, painted: &PaintedPath) {
        let Some(path) = build_path(&painted.segments) else {
            return;
        };
        let transform = skia(&self.device);
        if let Some((color, rule)) = painted.fill {
            let rule = match rule {
                FillRule::NonZero => tiny_skia::FillRule::Winding,
                FillRule::EvenOdd => tiny_skia::FillRule::EvenOdd,
            };
            pixmap.fill_path(&path, &solid(color), rule, transform, None);
        }
        if let Some((color, width)) = painted.stroke {
            let stroke = Stroke {
                width,
                ..Stroke::default()
            };
            pixmap.stroke_path(&path, &solid(color), &stroke, transform, None);
        }
    }

    fn glyphs(&self, pixmap: &mut Pixmap, run: &GlyphRun) {
        let embedded = run
            .font
            .program()
            .and_then(|program| Face::parse(&program.data, 0).ok());
        let paint = solid(run.color);

        for glyph in &run.glyphs {
            if self.redacted(glyph) {
                continue;
            }
            let em = glyph.matrix.then(&self.device);
            let outline = match &embedded {
                Some(face) => run.font.glyph_id(face, glyph.code).map(|gid| (face, gid)),
                None => self.fallback.as_ref().and_then(|face| {
                    let gid = face.glyph_index(run.font.unicode(glyph.code)?)?;
                    Some((face, gid))
                }),
            };
            let Some((face, gid)) = outline else {
                block_glyph(pixmap, &run.font, glyph, &em, &paint);
                continue;
            };

            let mut builder = OutlinePath(PathBuilder::new());
            // Blank glyphs such as spaces have no outline.
            if face.outline_glyph(gid, &mut builder).is_none() {
                continue;
            }
            let Some(path) = builder.0.finish() else {
                continue;
            };
            let units = 1.0 / face.units_per_em().max(1) as f32;
            let transform = Matrix::scale(units, units).then(&em);
            pixmap.fill_path(
                &path,
                &paint,
                tiny_skia::FillRule::Winding,
                skia(&transform),
                None,
            );
        }
    }

    fn redacted(&self, glyph: &PlacedGlyph) -> bool {
        if self.redactions.is_empty() {
            return false;
        }
        let (x, y) = self
            .frame
            .to_page(glyph.matrix.apply(glyph.advance / 2.0, GLYPH_BODY_HEIGHT));
        self.redactions
            .iter()
            .any(|bbox| x >= bbox.x0 && x <= bbox.x1 && y >= bbox.y0 && y <= bbox.y1)
    }
}

/// Fill a box over the glyph's advance so text without outlines still
/// shows as ink.
fn block_glyph(
    pixmap: &mut Pixmap,
    font: &FontDecoder,
    glyph: &PlacedGlyph,
    em: &Matrix,
    paint: &Paint<'_>,
) {
    if font.unicode(glyph.code).is_some_and(char::is_whitespace) {
        return;
    }
    if let Some(rect) = Rect::from_ltrb(
        0.1 * glyph.advance,
        0.0,
        0.9 * glyph.advance,
        BLOCK_GLYPH_HEIGHT,
    ) {
        pixmap.fill_rect(rect, paint, skia(em), None);
    }
}

/// Collects a `ttf-parser` outline into a `tiny-skia` path.
struct OutlinePath(PathBuilder);

impl OutlineBuilder for OutlinePath {
    fn move_to(&mut self, x: f32, y: f32) {
        self.0.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.0.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.0.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.0.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.0.close();
    }
}

fn build_path(segments: &[PathSegment]) -> Option<tiny_skia::Path> {
    let mut builder = PathBuilder::new();
    for segment in segments {
        match *segment {
            PathSegment::MoveTo(x, y) => builder.move_to(x, y),
            PathSegment::LineTo(x, y) => builder.line_to(x, y),
            PathSegment::CurveTo(x1, y1, x2, y2, x, y) => builder.cubic_to(x1, y1, x2, y2, x, y),
            PathSegment::Close => builder.close(),
        }
    }
    builder.finish()
}

fn skia(m: &Matrix) -> Transform {
    Transform::from_row(m.a, m.b, m.c, m.d, m.e, m.f)
}

fn solid(color: u32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8((color >> 16) as u8, (color >> 8) as u8, color as u8, 255);
    paint.anti_alias = true;
    paint
}

/// Decode one image XObject. Unsupported encodings are skipped with a log
/// line rather than failing the page.
pub(crate) fn decode_image(doc: &Document, stream: &Stream) -> Option<DynamicImage> {
    let filters = filter_names(doc, stream);

    if filters.iter().any(|f| f == b"DCTDecode") {
        return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
            .map_err(|err| warn!(%err, "failed to decode JPEG image"))
            .ok();
    }
    if filters
        .iter()
        .any(|f| f == b"JPXDecode" || f == b"JBIG2Decode" || f == b"CCITTFaxDecode")
    {
        debug!(filters = ?filters.iter().map(|f| String::from_utf8_lossy(f)).collect::<Vec<_>>(), "unsupported image filter");
        return None;
    }

    let width = dict_u32(doc, stream, b"Width")?;
    let height = dict_u32(doc, stream, b"Height")?;
    let bits = dict_u32(doc, stream, b"BitsPerComponent").unwrap_or(8);
    if bits != 8 {
        debug!(bits, "unsupported bits per component");
        return None;
    }

    let data = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream
            .decompressed_content()
            .map_err(|err| warn!(%err, "failed to decompress image stream"))
            .ok()?
    };

    let components = color_components(doc, stream)?;
    let pixels = (width as usize) * (height as usize);
    if data.len() < pixels * components {
        warn!(
            expected = pixels * components,
            actual = data.len(),
            "image stream shorter than its dimensions"
        );
        return None;
    }

    match components {
        1 => GrayImage::from_raw(width, height, data[..pixels].to_vec())
            .map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, data[..pixels * 3].to_vec())
            .map(DynamicImage::ImageRgb8),
        4 => {
            let rgb: Vec<u8> = data[..pixels * 4]
                .chunks_exact(4)
                .flat_map(|cmyk| {
                    let k = 255 - cmyk[3] as u32;
                    [0, 1, 2].map(|i| ((255 - cmyk[i] as u32) * k / 255) as u8)
                })
                .collect();
            RgbImage::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
        }
        _ => None,
    }
}

fn filter_names(doc: &Document, stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter").map(|obj| resolve(doc, obj)) {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| resolve(doc, item).as_name().ok())
            .map(<[u8]>::to_vec)
            .collect(),
        _ => Vec::new(),
    }
}

fn dict_u32(doc: &Document, stream: &Stream, key: &[u8]) -> Option<u32> {
    stream
        .dict
        .get(key)
        .ok()
        .and_then(|obj| resolve(doc, obj).as_i64().ok())
        .and_then(|value| u32::try_from(value).ok())
}

/// Components per pixel of the image's colour space.
fn color_components(doc: &Document, stream: &Stream) -> Option<usize> {
    let space = match stream.dict.get(b"ColorSpace") {
        Ok(obj) => resolve(doc, obj),
        // Image masks and JPEGs carry no colour space; assume gray.
        Err(_) => return Some(1),
    };
    match space {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" => Some(1),
            b"DeviceRGB" | b"CalRGB" => Some(3),
            b"DeviceCMYK" => Some(4),
            _ => None,
        },
        Object::Array(items) => match items.first().and_then(|i| i.as_name().ok()) {
            Some(b"ICCBased") => items
                .get(1)
                .map(|profile| resolve(doc, profile))
                .and_then(|profile| profile.as_stream().ok())
                .and_then(|profile| profile.dict.get(b"N").ok())
                .and_then(|n| n.as_i64().ok())
                .map(|n| n as usize),
            Some(b"CalRGB") => Some(3),
            Some(b"CalGray") => Some(1),
            _ => {
                debug!("unsupported image colour space");
                None
            }
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use lopdf::dictionary;

    fn raw_rgb(width: i64, height: i64, pixel: [u8; 3]) -> Stream {
        let data: Vec<u8> = (0..width * height).flat_map(|_| pixel).collect();
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            data,
        )
    }

    fn canvas(width: u32, height: u32) -> Canvas {
        Canvas {
            frame: PageFrame {
                llx: 0.0,
                ury: height as f32,
            },
            width,
            height,
            dpi: 72.0,
        }
    }

    fn near(actual: [u8; 3], expected: [u8; 3]) -> bool {
        actual
            .iter()
            .zip(expected)
            .all(|(a, e)| (*a as i16 - e as i16).abs() <= 2)
    }

    fn dark_pixels(image: &RgbImage) -> usize {
        image.pixels().filter(|px| px.0.iter().all(|c| *c < 128)).count()
    }

    /// One run of "HH" at 72pt from (20, 100), with no font program.
    fn glyph_run() -> GlyphRun {
        let glyph = |x: f32| PlacedGlyph {
            code: b'H' as u32,
            matrix: Matrix {
                a: 72.0,
                d: 72.0,
                e: x,
                f: 100.0,
                ..Matrix::IDENTITY
            },
            advance: 0.5,
        };
        GlyphRun {
            font: Rc::new(FontDecoder::default()),
            color: 0x000000,
            glyphs: vec![glyph(20.0), glyph(56.0)],
        }
    }

    #[test]
    fn raw_rgb_image_decodes() {
        let doc = Document::with_version("1.5");
        let stream = raw_rgb(2, 3, [10, 20, 30]);
        let image = decode_image(&doc, &stream).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (2, 3));
        assert_eq!(image.get_pixel(1, 2).0, [10, 20, 30]);
    }

    #[test]
    fn truncated_image_is_skipped() {
        let doc = Document::with_version("1.5");
        let mut stream = raw_rgb(4, 4, [0, 0, 0]);
        stream.set_content(vec![0u8; 5]);
        assert!(decode_image(&doc, &stream).is_none());
    }

    #[test]
    fn full_bleed_image_covers_canvas() {
        let doc = Document::with_version("1.5");
        let stream = raw_rgb(4, 2, [200, 0, 0]);
        let marks = [Mark::Image(PlacedImage {
            stream: &stream,
            ctm: Matrix::scale(144.0, 72.0),
        })];
        let image = render(&doc, &marks, canvas(144, 72), None, &[]);
        assert!(near(image.get_pixel(0, 0).0, [200, 0, 0]));
        assert!(near(image.get_pixel(143, 71).0, [200, 0, 0]));
    }

    #[test]
    fn partial_image_leaves_white_margin() {
        let doc = Document::with_version("1.5");
        let stream = raw_rgb(1, 1, [0, 0, 0]);
        let marks = [Mark::Image(PlacedImage {
            stream: &stream,
            ctm: Matrix::scale(10.0, 10.0),
        })];
        let image = render(&doc, &marks, canvas(100, 100), None, &[]);
        // Bottom-left corner in PDF space is the bottom-left of the canvas.
        assert!(near(image.get_pixel(5, 95).0, [0, 0, 0]));
        assert_eq!(image.get_pixel(5, 5).0, [255, 255, 255]);
    }

    #[test]
    fn filled_rectangle_is_painted() {
        let doc = Document::with_version("1.5");
        let marks = [Mark::Path(PaintedPath {
            segments: vec![
                PathSegment::MoveTo(10.0, 10.0),
                PathSegment::LineTo(50.0, 10.0),
                PathSegment::LineTo(50.0, 30.0),
                PathSegment::LineTo(10.0, 30.0),
                PathSegment::Close,
            ],
            fill: Some((0x0000FF, FillRule::NonZero)),
            stroke: None,
        })];
        let image = render(&doc, &marks, canvas(100, 100), None, &[]);
        // y = 20 in user space is row 80 from the top.
        assert_eq!(image.get_pixel(30, 80).0, [0, 0, 255]);
        assert_eq!(image.get_pixel(30, 50).0, [255, 255, 255]);
    }

    #[test]
    fn glyphs_without_outlines_still_leave_ink() {
        let doc = Document::with_version("1.5");
        let marks = [Mark::Glyphs(glyph_run())];
        let image = render(&doc, &marks, canvas(200, 200), None, &[]);
        assert!(dark_pixels(&image) > 0);
        // Body of the first glyph: x 23.6..52.4, y 49.6..100 from the top.
        assert!(image.get_pixel(36, 80).0.iter().all(|c| *c < 128));
    }

    #[test]
    fn redacted_glyphs_are_left_out() {
        let doc = Document::with_version("1.5");
        let marks = [Mark::Glyphs(glyph_run())];
        // Covers only the first glyph.
        let redaction = BBox::new(15.0, 30.0, 50.0, 110.0);
        let image = render(&doc, &marks, canvas(200, 200), None, &[redaction]);
        assert_eq!(image.get_pixel(36, 80).0, [255, 255, 255]);
        assert!(image.get_pixel(72, 80).0.iter().all(|c| *c < 128));
    }
}
