// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Folienwerk reconstruction pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Points per inch in PDF user space.
pub const POINTS_PER_INCH: f32 = 72.0;

/// A point in page space (PDF points, origin top-left, y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct PointF {
    pub x: f32,
    pub y: f32,
}

impl PointF {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<[f32; 2]> for PointF {
    fn from([x, y]: [f32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<PointF> for [f32; 2] {
    fn from(point: PointF) -> Self {
        [point.x, point.y]
    }
}

/// Axis-aligned bounding rectangle `(x0, y0, x1, y1)` in page-point units.
///
/// Serialised as a four-element array so edit batches read like the tabular
/// rows they are.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Smallest box containing every point. Returns `None` for an empty slice.
    pub fn enclosing(points: &[PointF]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = Self::new(first.x, first.y, first.x, first.y);
        for point in &points[1..] {
            bbox.x0 = bbox.x0.min(point.x);
            bbox.y0 = bbox.y0.min(point.y);
            bbox.x1 = bbox.x1.max(point.x);
            bbox.y1 = bbox.y1.max(point.y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn center_x(&self) -> f32 {
        (self.x0 + self.x1) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }

    /// Whether the box has positive width and height.
    pub fn is_valid(&self) -> bool {
        self.x1 > self.x0 && self.y1 > self.y0
    }

    /// Grow the box by `padding` on every side.
    pub fn padded(&self, padding: f32) -> Self {
        Self::new(
            self.x0 - padding,
            self.y0 - padding,
            self.x1 + padding,
            self.y1 + padding,
        )
    }

    /// Smallest box covering both `self` and `other`.
    pub fn union(&self, other: &BBox) -> Self {
        Self::new(
            self.x0.min(other.x0),
            self.y0.min(other.y0),
            self.x1.max(other.x1),
            self.y1.max(other.y1),
        )
    }

    /// Multiply every coordinate, e.g. to move from points to pixels.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self::new(self.x0 * sx, self.y0 * sy, self.x1 * sx, self.y1 * sy)
    }
}

impl From<[f32; 4]> for BBox {
    fn from([x0, y0, x1, y1]: [f32; 4]) -> Self {
        Self { x0, y0, x1, y1 }
    }
}

impl From<BBox> for [f32; 4] {
    fn from(bbox: BBox) -> Self {
        [bbox.x0, bbox.y0, bbox.x1, bbox.y1]
    }
}

/// Page dimensions in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Pixel dimensions of a rendering at `dpi`, never smaller than 1x1.
    pub fn pixels_at(&self, dpi: f32) -> (u32, u32) {
        let scale = dpi / POINTS_PER_INCH;
        let width = (self.width * scale).round().max(1.0) as u32;
        let height = (self.height * scale).round().max(1.0) as u32;
        (width, height)
    }
}

/// One page of the source document.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    /// Page rectangle size in points.
    pub size: PageSize,
    /// Excluded pages are dropped from every output.
    pub excluded: bool,
}

/// An RGB colour normalised to lower-case `#rrggbb`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ColorHex(String);

impl ColorHex {
    pub const BLACK: &'static str = "#000000";

    pub fn black() -> Self {
        Self(Self::BLACK.to_string())
    }

    /// Build from individual channels.
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self(format!("#{:02x}{:02x}{:02x}", r, g, b))
    }

    /// Build from a packed `0xRRGGBB` integer as reported by native span
    /// extraction.
    pub fn from_packed(value: u32) -> Self {
        let r = ((value >> 16) & 255) as u8;
        let g = ((value >> 8) & 255) as u8;
        let b = (value & 255) as u8;
        Self::from_rgb(r, g, b)
    }

    /// Strictly parse `#rrggbb` / `rrggbb` (either case).
    pub fn try_parse(raw: &str) -> Option<Self> {
        let digits = raw.trim().strip_prefix('#').unwrap_or(raw.trim());
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(format!("#{}", digits.to_ascii_lowercase())))
    }

    /// Parse leniently: malformed input becomes opaque black.
    pub fn parse(raw: &str) -> Self {
        Self::try_parse(raw).unwrap_or_else(|| {
            warn!(color = raw, "malformed colour hex, using black");
            Self::black()
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Channel values. Always succeeds because the string is normalised on
    /// construction.
    pub fn rgb(&self) -> (u8, u8, u8) {
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&self.0[range], 16).unwrap_or(0)
        };
        (channel(1..3), channel(3..5), channel(5..7))
    }

    /// Channels as fractions in `[0, 1]`, the form PDF colour operators use.
    pub fn rgb_unit(&self) -> (f32, f32, f32) {
        let (r, g, b) = self.rgb();
        (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }
}

impl Default for ColorHex {
    fn default() -> Self {
        Self::black()
    }
}

impl From<String> for ColorHex {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<ColorHex> for String {
    fn from(color: ColorHex) -> Self {
        color.0
    }
}

impl std::fmt::Display for ColorHex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a text element came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextSource {
    /// Reported by the PDF's own text layer.
    #[default]
    Native,
    /// Recognised from the rendered page image.
    Ocr,
}

/// A single span of text positioned on one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextElement {
    /// Stable identifier, unique within a document pass (`p{page-1}_e{n}`).
    pub id: String,
    /// 1-based page number.
    pub page: u32,
    pub original_text: String,
    pub new_text: String,
    pub bbox: BBox,
    /// Baseline insertion point used when the text is redrawn.
    pub origin: PointF,
    pub font_size_pt: f32,
    #[serde(default)]
    pub color_hex: ColorHex,
    #[serde(default)]
    pub source: TextSource,
}

impl TextElement {
    /// Create an element whose `new_text` equals its `original_text`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        page: u32,
        text: impl Into<String>,
        bbox: BBox,
        origin: PointF,
        font_size_pt: f32,
        color_hex: ColorHex,
        source: TextSource,
    ) -> Self {
        let text = text.into();
        Self {
            id: id.into(),
            page,
            new_text: text.clone(),
            original_text: text,
            bbox,
            origin,
            font_size_pt,
            color_hex,
            source,
        }
    }

    /// Whether the user changed the text.
    pub fn is_modified(&self) -> bool {
        self.new_text != self.original_text
    }
}

/// The full set of text elements for the selected pages, as handed to an
/// editor and replayed into an edit session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditBatch {
    pub rows: Vec<TextElement>,
}

impl EditBatch {
    pub fn new(rows: Vec<TextElement>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TextElement> {
        self.rows.iter()
    }

    /// Find a row by id.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut TextElement> {
        self.rows.iter_mut().find(|row| row.id == id)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a batch previously written with [`EditBatch::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_from_packed_int() {
        assert_eq!(ColorHex::from_packed(0x00FF_8001).as_str(), "#ff8001");
        assert_eq!(ColorHex::from_packed(0).as_str(), "#000000");
    }

    #[test]
    fn color_parse_normalises_case_and_prefix() {
        assert_eq!(ColorHex::parse("ABCDEF").as_str(), "#abcdef");
        assert_eq!(ColorHex::parse("#A0b1C2").as_str(), "#a0b1c2");
    }

    #[test]
    fn malformed_color_falls_back_to_black() {
        assert_eq!(ColorHex::parse("#12345").as_str(), "#000000");
        assert_eq!(ColorHex::parse("not a colour").as_str(), "#000000");
        assert_eq!(ColorHex::parse("#gg0000").rgb(), (0, 0, 0));
    }

    #[test]
    fn color_channels() {
        let color = ColorHex::parse("#ff8000");
        assert_eq!(color.rgb(), (255, 128, 0));
        let (r, g, b) = color.rgb_unit();
        assert!((r - 1.0).abs() < 1e-6);
        assert!((g - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(b, 0.0);
    }

    #[test]
    fn bbox_enclosing_quad() {
        let quad = [
            PointF::new(10.0, 5.0),
            PointF::new(30.0, 6.0),
            PointF::new(31.0, 20.0),
            PointF::new(9.0, 19.0),
        ];
        let bbox = BBox::enclosing(&quad).unwrap();
        assert_eq!(bbox, BBox::new(9.0, 5.0, 31.0, 20.0));
        assert!(BBox::enclosing(&[]).is_none());
    }

    #[test]
    fn page_size_pixels() {
        let size = PageSize::new(720.0, 405.0);
        assert_eq!(size.pixels_at(72.0), (720, 405));
        assert_eq!(size.pixels_at(144.0), (1440, 810));
    }

    #[test]
    fn edit_batch_json_round_trip_keeps_rows() {
        let mut element = TextElement::new(
            "p0_e0",
            1,
            "Hi",
            BBox::new(100.0, 100.0, 120.0, 114.0),
            PointF::new(100.0, 112.0),
            12.0,
            ColorHex::parse("#112233"),
            TextSource::Native,
        );
        element.new_text = "Hello".into();
        let batch = EditBatch::new(vec![element]);

        let json = batch.to_json().unwrap();
        assert!(json.contains("\"bbox\": ["));
        let parsed = EditBatch::from_json(&json).unwrap();
        assert_eq!(parsed, batch);
        assert!(parsed.rows[0].is_modified());
    }

    #[test]
    fn edit_batch_colour_is_normalised_on_load() {
        let json = r##"[{"id":"p0_e0","page":1,"original_text":"a","new_text":"a",
            "bbox":[0,0,10,10],"origin":[0,9],"font_size_pt":10,"color_hex":"#ABCDEF"}]"##;
        let batch = EditBatch::from_json(json).unwrap();
        assert_eq!(batch.rows[0].color_hex.as_str(), "#abcdef");
        assert_eq!(batch.rows[0].source, TextSource::Native);
    }

    #[test]
    fn edit_batch_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edits.json");
        let batch = EditBatch::default();
        batch.save(&path).unwrap();
        assert!(EditBatch::load(&path).unwrap().is_empty());
    }
}
