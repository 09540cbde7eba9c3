// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content stream interpreter — walks a page's operators with a graphics-state
// stack and records positioned text spans (for native extraction) plus the
// page's marks in paint order: image placements, filled or stroked paths, and
// glyph runs (for rasterisation).
//
// Glyph advances come from the font's /Widths, or /W for composite fonts.
// Fonts without either are estimated at half an em per glyph.

use std::collections::HashMap;
use std::rc::Rc;

use folienwerk_core::error::{FolienwerkError, Result};
use folienwerk_core::{BBox, PointF};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, Stream};
use tracing::{debug, warn};

use crate::source::NativeSpan;

/// Estimated advance of one glyph, in text-space ems.
const GLYPH_ADVANCE_EM: f32 = 0.5;
/// Fraction of the font size above the baseline.
const ASCENT: f32 = 0.8;
/// Fraction of the font size below the baseline.
const DESCENT: f32 = 0.2;
/// A `TJ` adjustment wider than this (thousandths of an em) reads as a space.
const TJ_SPACE_THRESHOLD: f32 = 250.0;
/// Nested form XObjects deeper than this are ignored.
const MAX_FORM_DEPTH: u8 = 8;
/// Text render modes that put no ink on the page (invisible, clip only).
const UNPAINTED_RENDER_MODES: [u8; 2] = [3, 7];

/// A PDF transformation matrix `[a b c d e f]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translation(tx: f32, ty: f32) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        if operands.len() != 6 {
            return None;
        }
        let n: Vec<f32> = operands.iter().filter_map(number).collect();
        if n.len() != 6 {
            return None;
        }
        Some(Self {
            a: n[0],
            b: n[1],
            c: n[2],
            d: n[3],
            e: n[4],
            f: n[5],
        })
    }

    /// Apply `self` first, then `other` (PDF's `self × other`).
    pub fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.a + y * self.c + self.e,
            x * self.b + y * self.d + self.f,
        )
    }

    fn vertical_scale(&self) -> f32 {
        (self.c * self.c + self.d * self.d).sqrt()
    }

    /// Geometric mean of the axis scales, used for line widths.
    fn mean_scale(&self) -> f32 {
        (self.a * self.d - self.b * self.c).abs().sqrt()
    }
}

/// An image XObject drawn on the page, with the CTM that maps its unit
/// square into user space.
pub(crate) struct PlacedImage<'a> {
    pub stream: &'a Stream,
    pub ctm: Matrix,
}

/// One path segment in user space, CTM already applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum PathSegment {
    MoveTo(f32, f32),
    LineTo(f32, f32),
    CurveTo(f32, f32, f32, f32, f32, f32),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FillRule {
    NonZero,
    EvenOdd,
}

/// A path painted by `f`, `S`, `B` or one of their variants.
#[derive(Debug, Clone)]
pub(crate) struct PaintedPath {
    pub segments: Vec<PathSegment>,
    pub fill: Option<(u32, FillRule)>,
    /// Stroke colour and line width in user space.
    pub stroke: Option<(u32, f32)>,
}

/// One glyph of a shown string.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PlacedGlyph {
    pub code: u32,
    /// Maps glyph space, one unit per em, into user space.
    pub matrix: Matrix,
    /// Advance width in ems.
    pub advance: f32,
}

/// The glyphs of one text-showing operator, all in one font and colour.
pub(crate) struct GlyphRun {
    pub font: Rc<FontDecoder>,
    pub color: u32,
    pub glyphs: Vec<PlacedGlyph>,
}

/// Something that puts ink on the page.
pub(crate) enum Mark<'a> {
    Image(PlacedImage<'a>),
    Path(PaintedPath),
    Glyphs(GlyphRun),
}

/// Everything the interpreter found on one page.
#[derive(Default)]
pub(crate) struct PageContent<'a> {
    pub spans: Vec<NativeSpan>,
    /// Union of the spans of each text object (`BT … ET`).
    pub blocks: Vec<BBox>,
    /// Marks in content-stream order.
    pub marks: Vec<Mark<'a>>,
}

/// Maps PDF user space into top-left page space.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PageFrame {
    pub llx: f32,
    pub ury: f32,
}

impl PageFrame {
    pub fn to_page(self, (x, y): (f32, f32)) -> (f32, f32) {
        (x - self.llx, self.ury - y)
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: u32,
    stroke: u32,
    line_width: f32,
    font: Option<Vec<u8>>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
    rise: f32,
    render_mode: u8,
}

impl GraphicsState {
    fn new(ctm: Matrix) -> Self {
        Self {
            ctm,
            fill: 0,
            stroke: 0,
            line_width: 1.0,
            font: None,
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            render_mode: 0,
        }
    }
}

/// Collects path construction operators until a painting operator ends them.
#[derive(Default)]
struct PathRecorder {
    segments: Vec<PathSegment>,
    current: (f32, f32),
    subpath_start: (f32, f32),
}

impl PathRecorder {
    fn construct(&mut self, operator: &str, operands: &[Object], ctm: &Matrix) {
        let n: Vec<f32> = operands.iter().filter_map(number).collect();
        match operator {
            "m" => {
                if let [x, y] = n[..] {
                    self.move_to(ctm.apply(x, y));
                }
            }
            "l" => {
                if let [x, y] = n[..] {
                    self.line_to(ctm.apply(x, y));
                }
            }
            "c" => {
                if let [x1, y1, x2, y2, x3, y3] = n[..] {
                    self.curve_to(ctm.apply(x1, y1), ctm.apply(x2, y2), ctm.apply(x3, y3));
                }
            }
            "v" => {
                if let [x2, y2, x3, y3] = n[..] {
                    self.curve_to(self.current, ctm.apply(x2, y2), ctm.apply(x3, y3));
                }
            }
            "y" => {
                if let [x1, y1, x3, y3] = n[..] {
                    let end = ctm.apply(x3, y3);
                    self.curve_to(ctm.apply(x1, y1), end, end);
                }
            }
            "h" => self.close(),
            "re" => {
                if let [x, y, w, h] = n[..] {
                    self.move_to(ctm.apply(x, y));
                    self.line_to(ctm.apply(x + w, y));
                    self.line_to(ctm.apply(x + w, y + h));
                    self.line_to(ctm.apply(x, y + h));
                    self.close();
                }
            }
            _ => {}
        }
    }

    fn move_to(&mut self, (x, y): (f32, f32)) {
        self.segments.push(PathSegment::MoveTo(x, y));
        self.current = (x, y);
        self.subpath_start = (x, y);
    }

    fn line_to(&mut self, (x, y): (f32, f32)) {
        self.segments.push(PathSegment::LineTo(x, y));
        self.current = (x, y);
    }

    fn curve_to(&mut self, (x1, y1): (f32, f32), (x2, y2): (f32, f32), (x, y): (f32, f32)) {
        self.segments
            .push(PathSegment::CurveTo(x1, y1, x2, y2, x, y));
        self.current = (x, y);
    }

    fn close(&mut self) {
        self.segments.push(PathSegment::Close);
        self.current = self.subpath_start;
    }

    fn take(&mut self) -> Vec<PathSegment> {
        std::mem::take(&mut self.segments)
    }
}

/// Interprets content streams of one document.
pub(crate) struct Interpreter<'a> {
    doc: &'a Document,
    frame: PageFrame,
    fonts: HashMap<Vec<u8>, Rc<FontDecoder>>,
    content: PageContent<'a>,
}

impl<'a> Interpreter<'a> {
    pub fn new(doc: &'a Document, frame: PageFrame) -> Self {
        Self {
            doc,
            frame,
            fonts: HashMap::new(),
            content: PageContent::default(),
        }
    }

    pub fn finish(self) -> PageContent<'a> {
        self.content
    }

    /// Interpret one content stream with the given resources and initial CTM.
    pub fn run(
        &mut self,
        bytes: &[u8],
        resources: Option<&'a Dictionary>,
        ctm: Matrix,
        depth: u8,
    ) -> Result<()> {
        let content = Content::decode(bytes).map_err(|err| {
            FolienwerkError::PdfError(format!("failed to decode content stream: {}", err))
        })?;

        let mut state = GraphicsState::new(ctm);
        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut path = PathRecorder::default();
        let mut text_matrix = Matrix::IDENTITY;
        let mut line_matrix = Matrix::IDENTITY;
        let mut block: Option<BBox> = None;

        for op in &content.operations {
            let operands = op.operands.as_slice();
            match op.operator.as_str() {
                "q" => stack.push(state.clone()),
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        state = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        state.ctm = m.then(&state.ctm);
                    }
                }
                "rg" | "sc" | "scn" | "g" | "k" => {
                    if let Some(packed) = packed_color(operands) {
                        state.fill = packed;
                    }
                }
                "RG" | "SC" | "SCN" | "G" | "K" => {
                    if let Some(packed) = packed_color(operands) {
                        state.stroke = packed;
                    }
                }
                "cs" => state.fill = 0,
                "CS" => state.stroke = 0,
                "w" => state.line_width = first_number(operands).unwrap_or(state.line_width),
                operator @ ("m" | "l" | "c" | "v" | "y" | "h" | "re") => {
                    path.construct(operator, operands, &state.ctm);
                }
                operator @ ("f" | "F" | "f*" | "S" | "s" | "B" | "B*" | "b" | "b*" | "n") => {
                    let mut segments = path.take();
                    if operator != "n" && !segments.is_empty() {
                        if matches!(operator, "s" | "b" | "b*") {
                            segments.push(PathSegment::Close);
                        }
                        let rule = if operator.ends_with('*') {
                            FillRule::EvenOdd
                        } else {
                            FillRule::NonZero
                        };
                        let strokes = matches!(operator, "S" | "s" | "B" | "B*" | "b" | "b*");
                        let fills = !matches!(operator, "S" | "s");
                        self.content.marks.push(Mark::Path(PaintedPath {
                            segments,
                            fill: fills.then_some((state.fill, rule)),
                            stroke: strokes
                                .then(|| (state.stroke, state.line_width * state.ctm.mean_scale())),
                        }));
                    }
                }
                "BT" => {
                    text_matrix = Matrix::IDENTITY;
                    line_matrix = Matrix::IDENTITY;
                    block = None;
                }
                "ET" => {
                    if let Some(bbox) = block.take() {
                        self.content.blocks.push(bbox);
                    }
                }
                "Tf" => {
                    if let [Object::Name(name), size] = operands {
                        state.font = Some(name.clone());
                        state.font_size = number(size).unwrap_or(state.font_size);
                    }
                }
                "Tc" => state.char_spacing = first_number(operands).unwrap_or(0.0),
                "Tw" => state.word_spacing = first_number(operands).unwrap_or(0.0),
                "Tz" => state.horizontal_scale = first_number(operands).unwrap_or(100.0) / 100.0,
                "TL" => state.leading = first_number(operands).unwrap_or(0.0),
                "Ts" => state.rise = first_number(operands).unwrap_or(0.0),
                "Tr" => state.render_mode = first_number(operands).unwrap_or(0.0) as u8,
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        text_matrix = m;
                        line_matrix = m;
                    }
                }
                "Td" | "TD" => {
                    let n: Vec<f32> = operands.iter().filter_map(number).collect();
                    if let [tx, ty] = n[..] {
                        if op.operator == "TD" {
                            state.leading = -ty;
                        }
                        line_matrix = Matrix::translation(tx, ty).then(&line_matrix);
                        text_matrix = line_matrix;
                    }
                }
                "T*" => {
                    line_matrix = Matrix::translation(0.0, -state.leading).then(&line_matrix);
                    text_matrix = line_matrix;
                }
                "Tj" | "'" | "\"" | "TJ" => {
                    if op.operator == "\"" {
                        if let [aw, ac, _] = operands {
                            state.word_spacing = number(aw).unwrap_or(state.word_spacing);
                            state.char_spacing = number(ac).unwrap_or(state.char_spacing);
                        }
                    }
                    if op.operator == "'" || op.operator == "\"" {
                        line_matrix = Matrix::translation(0.0, -state.leading).then(&line_matrix);
                        text_matrix = line_matrix;
                    }
                    let pieces = show_pieces(op.operator.as_str(), operands);
                    let decoder = self.font_decoder(resources, state.font.as_deref());
                    let (span, glyphs) = self.show_text(&pieces, &decoder, &state, &mut text_matrix);
                    if !glyphs.is_empty() && !UNPAINTED_RENDER_MODES.contains(&state.render_mode) {
                        self.content.marks.push(Mark::Glyphs(GlyphRun {
                            font: Rc::clone(&decoder),
                            color: state.fill,
                            glyphs,
                        }));
                    }
                    if let Some(span) = span {
                        block = Some(match block {
                            Some(existing) => existing.union(&span.bbox),
                            None => span.bbox,
                        });
                        self.content.spans.push(span);
                    }
                }
                "Do" => {
                    if let [Object::Name(name)] = operands {
                        self.draw_xobject(name, resources, &state, depth)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Advance the text matrix over `pieces`, placing each glyph, and build
    /// the span they form.
    fn show_text(
        &self,
        pieces: &[ShowPiece<'_>],
        decoder: &FontDecoder,
        state: &GraphicsState,
        text_matrix: &mut Matrix,
    ) -> (Option<NativeSpan>, Vec<PlacedGlyph>) {
        let start_matrix = text_matrix.then(&state.ctm);
        let start = start_matrix.apply(0.0, state.rise);
        let glyph_space = Matrix {
            a: state.font_size * state.horizontal_scale,
            d: state.font_size,
            f: state.rise,
            ..Matrix::IDENTITY
        };
        let mut text = String::new();
        let mut glyphs = Vec::new();

        for piece in pieces {
            match piece {
                ShowPiece::Bytes(bytes) => {
                    for code in decoder.codes(bytes) {
                        let width = decoder.width(code);
                        glyphs.push(PlacedGlyph {
                            code,
                            matrix: glyph_space.then(text_matrix).then(&state.ctm),
                            advance: width,
                        });
                        let mut advance = width * state.font_size + state.char_spacing;
                        if code == 32 && !decoder.two_byte {
                            advance += state.word_spacing;
                        }
                        advance *= state.horizontal_scale;
                        *text_matrix = Matrix::translation(advance, 0.0).then(text_matrix);
                    }
                    text.push_str(&decoder.decode(bytes));
                }
                ShowPiece::Adjust(thousandths) => {
                    let advance =
                        -thousandths / 1000.0 * state.font_size * state.horizontal_scale;
                    *text_matrix = Matrix::translation(advance, 0.0).then(text_matrix);
                    if -thousandths > TJ_SPACE_THRESHOLD && !text.ends_with(' ') && !text.is_empty()
                    {
                        text.push(' ');
                    }
                }
            }
        }

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return (None, glyphs);
        }

        let end = text_matrix.then(&state.ctm).apply(0.0, state.rise);
        let size = state.font_size * start_matrix.vertical_scale();
        let (sx, baseline) = self.frame.to_page(start);
        let (ex, _) = self.frame.to_page(end);

        let x0 = sx.min(ex);
        let mut x1 = sx.max(ex);
        if x1 - x0 < f32::EPSILON {
            x1 = x0 + GLYPH_ADVANCE_EM * size;
        }

        let span = NativeSpan {
            text: trimmed.to_string(),
            bbox: BBox::new(x0, baseline - ASCENT * size, x1, baseline + DESCENT * size),
            origin: PointF::new(sx, baseline),
            font_size: size,
            color: state.fill,
        };
        (Some(span), glyphs)
    }

    fn draw_xobject(
        &mut self,
        name: &[u8],
        resources: Option<&'a Dictionary>,
        state: &GraphicsState,
        depth: u8,
    ) -> Result<()> {
        let Some(stream) = resources
            .and_then(|res| lookup_dict(self.doc, res, b"XObject"))
            .and_then(|xobjects| xobjects.get(name).ok())
            .and_then(|obj| resolve(self.doc, obj).as_stream().ok())
        else {
            debug!(name = %String::from_utf8_lossy(name), "XObject not found");
            return Ok(());
        };

        let subtype = stream
            .dict
            .get(b"Subtype")
            .ok()
            .and_then(|obj| obj.as_name().ok());

        match subtype {
            Some(b"Image") => {
                self.content.marks.push(Mark::Image(PlacedImage {
                    stream,
                    ctm: state.ctm,
                }));
            }
            Some(b"Form") => {
                if depth >= MAX_FORM_DEPTH {
                    warn!(depth, "form XObject nesting too deep, skipping");
                    return Ok(());
                }
                let form_matrix = stream
                    .dict
                    .get(b"Matrix")
                    .ok()
                    .and_then(|obj| resolve(self.doc, obj).as_array().ok())
                    .and_then(|arr| Matrix::from_operands(arr))
                    .unwrap_or(Matrix::IDENTITY);
                let form_resources =
                    lookup_dict(self.doc, &stream.dict, b"Resources").or(resources);
                let bytes = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                self.run(&bytes, form_resources, form_matrix.then(&state.ctm), depth + 1)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn font_decoder(
        &mut self,
        resources: Option<&'a Dictionary>,
        font: Option<&[u8]>,
    ) -> Rc<FontDecoder> {
        let Some(name) = font else {
            return Rc::new(FontDecoder::default());
        };
        if let Some(decoder) = self.fonts.get(name) {
            return Rc::clone(decoder);
        }
        let decoder = resources
            .and_then(|res| lookup_dict(self.doc, res, b"Font"))
            .and_then(|fonts| fonts.get(name).ok())
            .and_then(|obj| resolve(self.doc, obj).as_dict().ok())
            .map(|dict| FontDecoder::from_font(self.doc, dict))
            .unwrap_or_default();
        let decoder = Rc::new(decoder);
        self.fonts.insert(name.to_vec(), Rc::clone(&decoder));
        decoder
    }
}

enum ShowPiece<'o> {
    Bytes(&'o [u8]),
    Adjust(f32),
}

fn show_pieces<'o>(operator: &str, operands: &'o [Object]) -> Vec<ShowPiece<'o>> {
    match operator {
        "TJ" => match operands.first() {
            Some(Object::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Object::String(bytes, _) => Some(ShowPiece::Bytes(bytes.as_slice())),
                    other => number(other).map(ShowPiece::Adjust),
                })
                .collect(),
            _ => Vec::new(),
        },
        _ => match operands.last() {
            Some(Object::String(bytes, _)) => vec![ShowPiece::Bytes(bytes.as_slice())],
            _ => Vec::new(),
        },
    }
}

/// An embedded TrueType or OpenType font file that `ttf-parser` accepts.
pub(crate) struct FontProgram {
    pub data: Vec<u8>,
    /// CID to glyph id, for composite fonts with a stream `/CIDToGIDMap`.
    cid_to_gid: Option<Vec<u16>>,
}

impl FontProgram {
    fn embedded(doc: &Document, descriptor: &Dictionary, font: &Dictionary) -> Option<Self> {
        let stream = [b"FontFile2".as_slice(), b"FontFile3".as_slice()]
            .iter()
            .find_map(|key| descriptor.get(key).ok())
            .and_then(|obj| resolve(doc, obj).as_stream().ok())?;
        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        if let Err(err) = ttf_parser::Face::parse(&data, 0) {
            debug!(%err, "embedded font program has no usable outlines");
            return None;
        }
        let cid_to_gid = font
            .get(b"CIDToGIDMap")
            .ok()
            .and_then(|obj| resolve(doc, obj).as_stream().ok())
            .map(|map| {
                map.decompressed_content()
                    .unwrap_or_else(|_| map.content.clone())
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect()
            });
        Some(Self { data, cid_to_gid })
    }
}

/// Turns the bytes of a string operand into codes, text, and glyph metrics
/// for one font.
#[derive(Default)]
pub(crate) struct FontDecoder {
    two_byte: bool,
    to_unicode: HashMap<u32, String>,
    /// Glyph widths in thousandths of an em.
    widths: HashMap<u32, f32>,
    default_width: Option<f32>,
    program: Option<FontProgram>,
}

impl FontDecoder {
    fn from_font<'d>(doc: &'d Document, font: &'d Dictionary) -> Self {
        let two_byte = font
            .get(b"Subtype")
            .ok()
            .and_then(|obj| obj.as_name().ok())
            .is_some_and(|subtype| subtype == b"Type0");

        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|obj| resolve(doc, obj).as_stream().ok())
            .and_then(|stream| {
                stream
                    .decompressed_content()
                    .ok()
                    .or_else(|| Some(stream.content.clone()))
            })
            .map(|bytes| parse_to_unicode(&String::from_utf8_lossy(&bytes)))
            .unwrap_or_default();

        // Composite fonts keep metrics and the font file on the descendant.
        let metrics = if two_byte {
            font.get(b"DescendantFonts")
                .ok()
                .and_then(|obj| resolve(doc, obj).as_array().ok())
                .and_then(|fonts| fonts.first())
                .and_then(|obj| resolve(doc, obj).as_dict().ok())
                .unwrap_or(font)
        } else {
            font
        };
        let (widths, default_width) = if two_byte {
            composite_widths(doc, metrics)
        } else {
            (simple_widths(doc, font), None)
        };
        let program = lookup_dict(doc, metrics, b"FontDescriptor")
            .and_then(|descriptor| FontProgram::embedded(doc, descriptor, metrics));

        Self {
            two_byte,
            to_unicode,
            widths,
            default_width,
            program,
        }
    }

    /// Character codes of a string operand.
    pub fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.two_byte {
            return bytes
                .chunks(2)
                .map(|pair| pair.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32))
                .collect();
        }
        bytes.iter().map(|b| *b as u32).collect()
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        if bytes.starts_with(&[0xFE, 0xFF]) {
            return decode_utf16be(&bytes[2..]);
        }
        self.codes(bytes)
            .into_iter()
            .map(|code| match self.to_unicode.get(&code) {
                Some(text) => text.clone(),
                None if self.two_byte => char::REPLACEMENT_CHARACTER.to_string(),
                None => (code as u8 as char).to_string(),
            })
            .collect()
    }

    /// First character `code` stands for, if known.
    pub fn unicode(&self, code: u32) -> Option<char> {
        match self.to_unicode.get(&code) {
            Some(text) => text.chars().next(),
            None if self.two_byte => None,
            None => Some(code as u8 as char),
        }
    }

    /// Advance of `code`, in ems.
    pub fn width(&self, code: u32) -> f32 {
        self.widths
            .get(&code)
            .copied()
            .or(self.default_width)
            .unwrap_or(GLYPH_ADVANCE_EM * 1000.0)
            / 1000.0
    }

    pub fn program(&self) -> Option<&FontProgram> {
        self.program.as_ref()
    }

    /// Glyph drawn for `code` in this font's embedded program.
    pub fn glyph_id(&self, face: &ttf_parser::Face<'_>, code: u32) -> Option<ttf_parser::GlyphId> {
        if self.two_byte {
            let cid = u16::try_from(code).ok()?;
            let gid = match self.program.as_ref().and_then(|p| p.cid_to_gid.as_ref()) {
                Some(map) => *map.get(cid as usize)?,
                None => cid,
            };
            return Some(ttf_parser::GlyphId(gid));
        }
        if let Some(gid) = self.unicode(code).and_then(|ch| face.glyph_index(ch)) {
            return Some(gid);
        }
        // Symbolic TrueType subsets map codes directly, sometimes offset
        // into the private use area.
        let cmap = face.tables().cmap?;
        cmap.subtables.into_iter().find_map(|subtable| {
            subtable
                .glyph_index(code)
                .or_else(|| subtable.glyph_index(0xF000 | code))
        })
    }
}

/// `/FirstChar` + `/Widths` of a simple font.
fn simple_widths(doc: &Document, font: &Dictionary) -> HashMap<u32, f32> {
    let first = font
        .get(b"FirstChar")
        .ok()
        .and_then(|obj| resolve(doc, obj).as_i64().ok())
        .and_then(|first| u32::try_from(first).ok())
        .unwrap_or(0);
    font.get(b"Widths")
        .ok()
        .and_then(|obj| resolve(doc, obj).as_array().ok())
        .map(|widths| {
            widths
                .iter()
                .enumerate()
                .filter_map(|(i, w)| Some((first + i as u32, number(resolve(doc, w))?)))
                .collect()
        })
        .unwrap_or_default()
}

/// `/W` and `/DW` of a CID font. `/W` mixes `c [w1 w2 …]` and
/// `c_first c_last w` entries.
fn composite_widths(doc: &Document, cid_font: &Dictionary) -> (HashMap<u32, f32>, Option<f32>) {
    let default = cid_font
        .get(b"DW")
        .ok()
        .and_then(|obj| number(resolve(doc, obj)))
        .unwrap_or(1000.0);
    let mut widths = HashMap::new();
    let items = cid_font
        .get(b"W")
        .ok()
        .and_then(|obj| resolve(doc, obj).as_array().ok())
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut i = 0;
    while i < items.len() {
        let Some(first) = number(resolve(doc, &items[i])).map(|n| n as u32) else {
            break;
        };
        match items.get(i + 1).map(|obj| resolve(doc, obj)) {
            Some(Object::Array(list)) => {
                for (offset, w) in list.iter().enumerate() {
                    if let Some(w) = number(resolve(doc, w)) {
                        widths.insert(first + offset as u32, w);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let width = items.get(i + 2).and_then(|obj| number(resolve(doc, obj)));
                let (Some(last), Some(width)) = (number(last), width) else {
                    break;
                };
                for cid in first..=(last as u32).min(first.saturating_add(0xFFFF)) {
                    widths.insert(cid, width);
                }
                i += 3;
            }
            None => break,
        }
    }
    (widths, Some(default))
}


fn decode_utf16be(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Parse the `bfchar` and `bfrange` sections of a ToUnicode CMap.
pub(crate) fn parse_to_unicode(cmap: &str) -> HashMap<u32, String> {
    let mut map = HashMap::new();
    let tokens = cmap_tokens(cmap);
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i].as_str() {
            "beginbfchar" => {
                i += 1;
                while i + 1 < tokens.len() && tokens[i] != "endbfchar" {
                    if let (Some(src), Some(dst)) = (hex_code(&tokens[i]), hex_text(&tokens[i + 1])) {
                        map.insert(src, dst);
                    }
                    i += 2;
                }
            }
            "beginbfrange" => {
                i += 1;
                while i + 2 < tokens.len() && tokens[i] != "endbfrange" {
                    let (Some(lo), Some(hi)) = (hex_code(&tokens[i]), hex_code(&tokens[i + 1]))
                    else {
                        i += 1;
                        continue;
                    };
                    if tokens[i + 2] == "[" {
                        let mut j = i + 3;
                        let mut code = lo;
                        while j < tokens.len() && tokens[j] != "]" {
                            if let Some(dst) = hex_text(&tokens[j]) {
                                map.insert(code, dst);
                            }
                            code += 1;
                            j += 1;
                        }
                        i = j + 1;
                    } else {
                        if let Some(base) = hex_text(&tokens[i + 2]) {
                            let mut units: Vec<u16> = base.encode_utf16().collect();
                            for code in lo..=hi.min(lo.saturating_add(0xFFFF)) {
                                map.insert(code, String::from_utf16_lossy(&units));
                                if let Some(last) = units.last_mut() {
                                    *last = last.wrapping_add(1);
                                }
                            }
                        }
                        i += 3;
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    map
}

/// Split a CMap into hex strings (`<…>`), brackets, and bare words.
fn cmap_tokens(cmap: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = cmap.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '<' => {
                let mut hex = String::from("<");
                for next in chars.by_ref() {
                    hex.push(next);
                    if next == '>' {
                        break;
                    }
                }
                tokens.push(hex);
            }
            '[' | ']' => tokens.push(ch.to_string()),
            c if c.is_whitespace() => {}
            c => {
                let mut word = c.to_string();
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '<' | '[' | ']') {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                tokens.push(word);
            }
        }
    }
    tokens
}

fn hex_bytes(token: &str) -> Option<Vec<u8>> {
    let inner = token.strip_prefix('<')?.strip_suffix('>')?;
    let digits: String = inner.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

fn hex_code(token: &str) -> Option<u32> {
    let bytes = hex_bytes(token)?;
    if bytes.len() > 4 {
        return None;
    }
    Some(bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32))
}

fn hex_text(token: &str) -> Option<String> {
    hex_bytes(token).map(|bytes| decode_utf16be(&bytes))
}

// -- lopdf helpers ------------------------------------------------------------

/// Read an integer or real operand.
pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn first_number(operands: &[Object]) -> Option<f32> {
    operands.first().and_then(number)
}

/// Convert a colour operator's operands to packed `0xRRGGBB`.
fn packed_color(operands: &[Object]) -> Option<u32> {
    let n: Vec<f32> = operands.iter().filter_map(number).collect();
    let (r, g, b) = match n[..] {
        [gray] => (gray, gray, gray),
        [r, g, b] => (r, g, b),
        [c, m, y, k] => ((1.0 - c) * (1.0 - k), (1.0 - m) * (1.0 - k), (1.0 - y) * (1.0 - k)),
        _ => return None,
    };
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
    Some((channel(r) << 16) | (channel(g) << 8) | channel(b))
}

static NULL_OBJECT: Object = Object::Null;

/// Follow references until a direct object is reached.
pub(crate) fn resolve<'d>(doc: &'d Document, obj: &'d Object) -> &'d Object {
    let mut current = obj;
    for _ in 0..32 {
        match current {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(next) => current = next,
                Err(_) => return &NULL_OBJECT,
            },
            _ => return current,
        }
    }
    current
}

/// Look up `key` in `dict` and resolve it to a dictionary.
pub(crate) fn lookup_dict<'d>(
    doc: &'d Document,
    dict: &'d Dictionary,
    key: &[u8],
) -> Option<&'d Dictionary> {
    dict.get(key)
        .ok()
        .and_then(|obj| resolve(doc, obj).as_dict().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::Operation;
    use lopdf::dictionary;

    fn frame() -> PageFrame {
        PageFrame {
            llx: 0.0,
            ury: 400.0,
        }
    }

    fn encode(operations: Vec<Operation>) -> Vec<u8> {
        Content { operations }.encode().unwrap()
    }

    #[test]
    fn matrix_composition_applies_left_first() {
        let scale = Matrix {
            a: 2.0,
            d: 2.0,
            ..Matrix::IDENTITY
        };
        let shift = Matrix::translation(10.0, 5.0);
        assert_eq!(scale.then(&shift).apply(1.0, 1.0), (12.0, 7.0));
        assert_eq!(shift.then(&scale).apply(1.0, 1.0), (22.0, 12.0));
    }

    #[test]
    fn simple_text_span_is_positioned_top_left() {
        let doc = Document::with_version("1.5");
        let bytes = encode(vec![
            Operation::new("rg", vec![1.into(), 0.into(), 0.into()]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 20.into()]),
            Operation::new("Td", vec![100.into(), 300.into()]),
            Operation::new("Tj", vec![Object::string_literal("Hello")]),
            Operation::new("ET", vec![]),
        ]);

        let mut interpreter = Interpreter::new(&doc, frame());
        interpreter.run(&bytes, None, Matrix::IDENTITY, 0).unwrap();
        let content = interpreter.finish();

        assert_eq!(content.spans.len(), 1);
        let span = &content.spans[0];
        assert_eq!(span.text, "Hello");
        assert_eq!(span.color, 0xFF0000);
        assert!((span.font_size - 20.0).abs() < 1e-4);
        assert_eq!(span.origin, PointF::new(100.0, 100.0));
        // Five glyphs at half an em each.
        assert!((span.bbox.x1 - 150.0).abs() < 1e-3);
        assert!((span.bbox.y0 - 84.0).abs() < 1e-3);
        assert!((span.bbox.y1 - 104.0).abs() < 1e-3);
        assert_eq!(content.blocks.len(), 1);
    }

    #[test]
    fn tj_array_merges_into_one_span_with_spacing() {
        let doc = Document::with_version("1.5");
        let bytes = encode(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    Object::string_literal("Hello"),
                    Object::Integer(-400),
                    Object::string_literal("World"),
                ])],
            ),
            Operation::new("ET", vec![]),
        ]);

        let mut interpreter = Interpreter::new(&doc, frame());
        interpreter.run(&bytes, None, Matrix::IDENTITY, 0).unwrap();
        let content = interpreter.finish();
        assert_eq!(content.spans[0].text, "Hello World");
    }

    #[test]
    fn whitespace_only_strings_are_dropped() {
        let doc = Document::with_version("1.5");
        let bytes = encode(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Tj", vec![Object::string_literal("   ")]),
            Operation::new("ET", vec![]),
        ]);
        let mut interpreter = Interpreter::new(&doc, frame());
        interpreter.run(&bytes, None, Matrix::IDENTITY, 0).unwrap();
        let content = interpreter.finish();
        assert!(content.spans.is_empty());
        assert!(content.blocks.is_empty());
    }

    #[test]
    fn image_placement_records_ctm() {
        let mut doc = Document::with_version("1.5");
        let image = lopdf::Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0u8],
        );
        let image_id = doc.add_object(image);
        let resources = dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        };
        let bytes = encode(vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![200.into(), 0.into(), 0.into(), 100.into(), 10.into(), 20.into()],
            ),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
        ]);

        let mut interpreter = Interpreter::new(&doc, frame());
        interpreter
            .run(&bytes, Some(&resources), Matrix::IDENTITY, 0)
            .unwrap();
        let content = interpreter.finish();
        assert_eq!(content.marks.len(), 1);
        let Mark::Image(placed) = &content.marks[0] else {
            panic!("expected an image mark");
        };
        assert_eq!(placed.ctm.apply(1.0, 1.0), (210.0, 120.0));
    }

    #[test]
    fn rectangle_fill_and_stroke_are_recorded_in_order() {
        let doc = Document::with_version("1.5");
        let bytes = encode(vec![
            Operation::new("rg", vec![0.into(), 0.into(), 1.into()]),
            Operation::new("RG", vec![1.into(), 0.into(), 0.into()]),
            Operation::new("w", vec![2.into()]),
            Operation::new("re", vec![10.into(), 20.into(), 30.into(), 40.into()]),
            Operation::new("B", vec![]),
            Operation::new("m", vec![0.into(), 0.into()]),
            Operation::new("l", vec![5.into(), 5.into()]),
            Operation::new("n", vec![]),
            Operation::new("cm", vec![2.into(), 0.into(), 0.into(), 2.into(), 0.into(), 0.into()]),
            Operation::new("m", vec![0.into(), 0.into()]),
            Operation::new("l", vec![5.into(), 5.into()]),
            Operation::new("S", vec![]),
        ]);
        let mut interpreter = Interpreter::new(&doc, frame());
        interpreter.run(&bytes, None, Matrix::IDENTITY, 0).unwrap();
        let content = interpreter.finish();

        assert_eq!(content.marks.len(), 2, "`n` paints nothing");
        let Mark::Path(rect) = &content.marks[0] else {
            panic!("expected a path mark");
        };
        assert_eq!(rect.fill, Some((0x0000FF, FillRule::NonZero)));
        assert_eq!(rect.stroke, Some((0xFF0000, 2.0)));
        assert_eq!(rect.segments[0], PathSegment::MoveTo(10.0, 20.0));
        assert_eq!(rect.segments[2], PathSegment::LineTo(40.0, 60.0));
        assert_eq!(rect.segments.last(), Some(&PathSegment::Close));

        let Mark::Path(line) = &content.marks[1] else {
            panic!("expected a path mark");
        };
        assert_eq!(line.fill, None);
        assert_eq!(line.segments[1], PathSegment::LineTo(10.0, 10.0));
        assert_eq!(line.stroke, Some((0xFF0000, 4.0)));
    }

    #[test]
    fn glyphs_follow_the_text_matrix() {
        let doc = Document::with_version("1.5");
        let bytes = encode(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 20.into()]),
            Operation::new("Td", vec![100.into(), 300.into()]),
            Operation::new("Tj", vec![Object::string_literal("Hi")]),
            Operation::new("ET", vec![]),
        ]);
        let mut interpreter = Interpreter::new(&doc, frame());
        interpreter.run(&bytes, None, Matrix::IDENTITY, 0).unwrap();
        let content = interpreter.finish();

        let Some(Mark::Glyphs(run)) = content.marks.first() else {
            panic!("expected a glyph run");
        };
        assert_eq!(run.glyphs.len(), 2);
        assert_eq!(run.glyphs[0].code, b'H' as u32);
        assert_eq!(run.glyphs[0].matrix.apply(0.0, 0.0), (100.0, 300.0));
        assert_eq!(run.glyphs[0].matrix.apply(1.0, 1.0), (120.0, 320.0));
        // Second glyph starts half an em later.
        assert_eq!(run.glyphs[1].matrix.apply(0.0, 0.0), (110.0, 300.0));
    }

    #[test]
    fn invisible_text_is_extracted_but_not_painted() {
        let doc = Document::with_version("1.5");
        let bytes = encode(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tr", vec![3.into()]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Tj", vec![Object::string_literal("hidden")]),
            Operation::new("ET", vec![]),
        ]);
        let mut interpreter = Interpreter::new(&doc, frame());
        interpreter.run(&bytes, None, Matrix::IDENTITY, 0).unwrap();
        let content = interpreter.finish();
        assert_eq!(content.spans[0].text, "hidden");
        assert!(content.marks.is_empty());
    }

    #[test]
    fn font_widths_drive_advances() {
        let mut doc = Document::with_version("1.5");
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "FirstChar" => 72,
            "Widths" => vec![Object::Integer(722), Object::Integer(278)],
        });
        let resources = dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        };
        let bytes = encode(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Tj", vec![Object::string_literal("HI")]),
            Operation::new("ET", vec![]),
        ]);
        let mut interpreter = Interpreter::new(&doc, frame());
        interpreter
            .run(&bytes, Some(&resources), Matrix::IDENTITY, 0)
            .unwrap();
        let content = interpreter.finish();
        // 7.22pt for 'H' plus 2.78pt for 'I'.
        assert!((content.spans[0].bbox.x1 - 10.0).abs() < 1e-3);
    }

    #[test]
    fn composite_widths_read_both_w_forms() {
        let doc = Document::with_version("1.5");
        let cid_font = dictionary! {
            "DW" => 900,
            "W" => vec![
                Object::Integer(1),
                Object::Array(vec![Object::Integer(500), Object::Integer(600)]),
                Object::Integer(10),
                Object::Integer(12),
                Object::Integer(250),
            ],
        };
        let (widths, default) = composite_widths(&doc, &cid_font);
        assert_eq!(default, Some(900.0));
        assert_eq!(widths.get(&2), Some(&600.0));
        assert_eq!(widths.get(&11), Some(&250.0));
        assert_eq!(widths.get(&13), None);
    }

    #[test]
    fn to_unicode_cmap_ranges_and_chars() {
        let cmap = "begincmap\n2 beginbfchar\n<0003> <0020>\n<0010> <4F60>\nendbfchar\n\
                    1 beginbfrange\n<0020> <0022> <0041>\nendbfrange\n\
                    1 beginbfrange\n<0030> <0031> [<0078> <0079>]\nendbfrange\nendcmap";
        let map = parse_to_unicode(cmap);
        assert_eq!(map.get(&0x03).map(String::as_str), Some(" "));
        assert_eq!(map.get(&0x10).map(String::as_str), Some("你"));
        assert_eq!(map.get(&0x21).map(String::as_str), Some("B"));
        assert_eq!(map.get(&0x22).map(String::as_str), Some("C"));
        assert_eq!(map.get(&0x31).map(String::as_str), Some("y"));
    }

    #[test]
    fn two_byte_font_uses_cmap() {
        let decoder = FontDecoder {
            two_byte: true,
            to_unicode: parse_to_unicode("beginbfchar <0001> <4F60> <0002> <597D> endbfchar"),
            ..FontDecoder::default()
        };
        assert_eq!(decoder.decode(&[0, 1, 0, 2]), "你好");
        assert_eq!(FontDecoder::default().decode(b"caf\xe9"), "café");
        assert_eq!(FontDecoder::default().decode(&[0xFE, 0xFF, 0x4F, 0x60]), "你");
    }

    #[test]
    fn packed_color_from_gray_and_cmyk() {
        assert_eq!(packed_color(&[Object::Real(1.0)]), Some(0xFFFFFF));
        assert_eq!(
            packed_color(&[0.into(), 0.into(), 0.into(), 1.into()]),
            Some(0x000000)
        );
        assert_eq!(packed_color(&[]), None);
    }
}
