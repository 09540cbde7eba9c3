// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Grows boxes that are too small for their text.

use folienwerk_core::TextElement;
use tracing::debug;

/// Estimated advance of an ASCII glyph, in ems.
const ASCII_WIDTH_EM: f32 = 0.6;
/// Estimated advance of any other glyph (CJK, full-width), in ems.
const WIDE_WIDTH_EM: f32 = 1.0;
const WIDTH_MARGIN: f32 = 1.1;
pub const LINE_HEIGHT: f32 = 1.2;

/// Expected `(width, height)` of `text` rendered at `size` points.
pub fn expected_extent(text: &str, size: f32) -> (f32, f32) {
    let (ascii, wide) = text.chars().fold((0usize, 0usize), |(a, w), ch| {
        if ch.is_ascii() { (a + 1, w) } else { (a, w + 1) }
    });
    let width = (ascii as f32 * ASCII_WIDTH_EM + wide as f32 * WIDE_WIDTH_EM) * size * WIDTH_MARGIN;
    (width, size * LINE_HEIGHT)
}

/// Expand each box symmetrically about its centre, on each axis where it is
/// smaller than its original text needs. Boxes never shrink.
pub fn fit_boxes_to_content(elements: &mut [TextElement]) {
    let mut grown = 0usize;
    for element in elements.iter_mut() {
        let (width, height) = expected_extent(&element.original_text, element.font_size_pt);
        let bbox = &mut element.bbox;
        let mut touched = false;
        if bbox.width() < width {
            let center = bbox.center_x();
            bbox.x0 = center - width / 2.0;
            bbox.x1 = center + width / 2.0;
            touched = true;
        }
        if bbox.height() < height {
            let center = bbox.center_y();
            bbox.y0 = center - height / 2.0;
            bbox.y1 = center + height / 2.0;
            touched = true;
        }
        if touched {
            grown += 1;
        }
    }
    debug!(grown, "boxes fitted to content");
}

#[cfg(test)]
mod tests {
    use super::*;
    use folienwerk_core::{BBox, ColorHex, PointF, TextSource};

    fn element(text: &str, size: f32, bbox: BBox) -> TextElement {
        TextElement::new(
            "p0_e0",
            1,
            text,
            bbox,
            PointF::new(bbox.x0, bbox.y1),
            size,
            ColorHex::black(),
            TextSource::Native,
        )
    }

    #[test]
    fn mixed_script_width_estimate() {
        // 2 ASCII * 0.6 + 2 wide * 1.0 = 3.2 em; * 10pt * 1.1
        let (width, height) = expected_extent("OK好的", 10.0);
        assert!((width - 35.2).abs() < 1e-4);
        assert!((height - 12.0).abs() < 1e-4);
    }

    #[test]
    fn narrow_box_grows_about_its_centre() {
        let mut elements = vec![element("Hello", 10.0, BBox::new(100.0, 100.0, 110.0, 120.0))];
        fit_boxes_to_content(&mut elements);
        let bbox = elements[0].bbox;
        // 5 * 0.6 * 10 * 1.1 = 33
        assert!((bbox.width() - 33.0).abs() < 1e-4);
        assert!((bbox.center_x() - 105.0).abs() < 1e-4);
        // Height 20 already exceeds 12.
        assert_eq!((bbox.y0, bbox.y1), (100.0, 120.0));
    }

    #[test]
    fn boxes_never_shrink() {
        let cases = [
            element("a", 12.0, BBox::new(0.0, 0.0, 500.0, 300.0)),
            element("長い見出しの文字列", 24.0, BBox::new(10.0, 10.0, 20.0, 15.0)),
            element("", 12.0, BBox::new(5.0, 5.0, 6.0, 6.0)),
        ];
        for before in cases {
            let mut after = vec![before.clone()];
            fit_boxes_to_content(&mut after);
            assert!(after[0].bbox.width() >= before.bbox.width());
            assert!(after[0].bbox.height() >= before.bbox.height());
        }
    }

    #[test]
    fn uses_original_text_not_edit() {
        let mut edited = element("Hi", 10.0, BBox::new(0.0, 0.0, 1.0, 12.0));
        edited.new_text = "A much longer replacement".into();
        let mut elements = vec![edited];
        fit_boxes_to_content(&mut elements);
        assert!((elements[0].bbox.width() - 13.2).abs() < 1e-4);
    }
}
