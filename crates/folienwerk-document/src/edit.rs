// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Edit session — replays an edited batch onto the source pages, patching only
// the regions whose text changed.

use std::collections::BTreeMap;

use folienwerk_core::error::Result;
use folienwerk_core::{BBox, BackgroundFill, EditBatch, TextElement, WatermarkConfig};
use tracing::{debug, info, instrument, warn};

use crate::background::BackgroundReconstructor;
use crate::compose::{ComposedPage, TextRun};
use crate::font::{FontSource, text_width};
use crate::normalize::content_fit::LINE_HEIGHT;
use crate::source::PdfSource;

/// The rows of one page, split by whether their text changed. Both halves
/// keep batch order.
#[derive(Debug, Default)]
pub struct PageEdits<'b> {
    pub page: u32,
    pub modified: Vec<&'b TextElement>,
    pub unmodified: Vec<&'b TextElement>,
}

impl PageEdits<'_> {
    pub fn is_modified(&self) -> bool {
        !self.modified.is_empty()
    }
}

/// The batch grouped by page. Pages without an entry are copied unchanged.
#[derive(Debug, Default)]
pub struct EditPlan<'b> {
    pages: BTreeMap<u32, PageEdits<'b>>,
}

impl<'b> EditPlan<'b> {
    /// Group `batch` by page, dropping rows whose page does not exist.
    pub fn new(batch: &'b EditBatch, page_count: u32) -> Self {
        let mut pages: BTreeMap<u32, PageEdits<'b>> = BTreeMap::new();
        for row in batch.iter() {
            if row.page == 0 || row.page > page_count {
                warn!(id = %row.id, page = row.page, page_count, "edit row out of range, skipped");
                continue;
            }
            let entry = pages.entry(row.page).or_insert_with(|| PageEdits {
                page: row.page,
                ..PageEdits::default()
            });
            if row.is_modified() {
                entry.modified.push(row);
            } else {
                entry.unmodified.push(row);
            }
        }
        Self { pages }
    }

    pub fn page(&self, page: u32) -> Option<&PageEdits<'b>> {
        self.pages.get(&page)
    }

    /// Pages present in the batch, ascending.
    pub fn pages(&self) -> impl Iterator<Item = &PageEdits<'b>> {
        self.pages.values()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// The region that must be cleared so an element's new text fits: the old
/// box widened to the measured text, left-aligned at the old `x0`, and made
/// at least one line tall around the old vertical centre.
pub fn union_target_rect(element: &TextElement, font: Option<&FontSource>) -> BBox {
    let size = element.font_size_pt;
    let old = element.bbox;
    let width = old.width().max(text_width(font, &element.new_text, size));
    let height = old.height().max(size * LINE_HEIGHT);
    let center_y = old.center_y();
    BBox::new(
        old.x0,
        center_y - height / 2.0,
        old.x0 + width,
        center_y + height / 2.0,
    )
}

/// One output page of an edit run.
#[derive(Debug)]
pub enum EditedPage {
    /// Source page copied through untouched.
    Copied(u32),
    Composed(ComposedPage),
}

/// Rebuilds edited pages over a shared source document.
pub struct EditSession<'a> {
    source: &'a dyn PdfSource,
    watermark: &'a WatermarkConfig,
    font: Option<&'a FontSource>,
    fill: BackgroundFill,
    dpi: f32,
}

impl<'a> EditSession<'a> {
    pub fn new(
        source: &'a dyn PdfSource,
        watermark: &'a WatermarkConfig,
        font: Option<&'a FontSource>,
        fill: BackgroundFill,
        dpi: f32,
    ) -> Self {
        Self {
            source,
            watermark,
            font,
            fill,
            dpi,
        }
    }

    /// Build the page from its edits: a background with the changed regions
    /// patched (or the plain render if nothing changed), the changed text
    /// drawn visibly, and the unchanged text drawn invisibly.
    #[instrument(skip_all, fields(page = edits.page, modified = edits.modified.len()))]
    pub fn compose(&self, edits: &PageEdits<'_>) -> Result<ComposedPage> {
        let page = edits.page;
        let size = self.source.page_size(page)?;
        let backgrounds = BackgroundReconstructor::new(self.source, self.watermark);

        let mut background = if edits.is_modified() {
            let regions: Vec<BBox> = edits
                .modified
                .iter()
                .map(|element| union_target_rect(element, self.font))
                .collect();
            debug!(regions = regions.len(), fill = ?self.fill, "patching changed regions");
            backgrounds.patched(page, &regions, self.fill, self.dpi)?
        } else {
            self.source.rasterize(page, self.dpi)?
        };
        backgrounds.erase_watermark(&mut background);

        let runs: Vec<TextRun> = edits
            .unmodified
            .iter()
            .map(|element| TextRun::hidden(element))
            .chain(edits.modified.iter().map(|element| TextRun::from_element(element)))
            .collect();

        Ok(ComposedPage::new(page, size, background).with_runs(runs))
    }

    /// Every source page in order: copied when the batch has no rows for it,
    /// rebuilt otherwise.
    pub fn run(&self, batch: &EditBatch) -> Result<Vec<EditedPage>> {
        let plan = EditPlan::new(batch, self.source.page_count());
        info!(edited_pages = plan.pages.len(), "applying edits");
        (1..=self.source.page_count())
            .map(|page| match plan.page(page) {
                Some(edits) => self
                    .compose(edits)
                    .map(EditedPage::Composed)
                    .map_err(|err| err.on_page(page)),
                None => Ok(EditedPage::Copied(page)),
            })
            .collect()
    }
}
