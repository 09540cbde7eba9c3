// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page assembly — stitches pages from several PDFs into one document. The
// edit session uses it to interleave freshly composed pages with untouched
// pages copied verbatim from the source.

use std::collections::HashMap;

use folienwerk_core::error::{FolienwerkError, Result};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, instrument, warn};

use super::reader::inherited;

/// Attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Where a page of an assembled document comes from (1-based page numbers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOrigin {
    /// Copied verbatim from the source document.
    Source(u32),
    /// Taken from the freshly composed document.
    Composed(u32),
}

/// Builds a new PDF page by page.
pub struct PageAssembler {
    target: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
}

impl Default for PageAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl PageAssembler {
    pub fn new() -> Self {
        let mut target = Document::with_version("1.5");
        let pages_id = target.new_object_id();
        Self {
            target,
            pages_id,
            kids: Vec::new(),
        }
    }

    /// Number of pages appended so far.
    pub fn len(&self) -> usize {
        self.kids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kids.is_empty()
    }

    /// Append page `page` (1-based) of `source`.
    pub fn append_page(&mut self, source: &Document, page: u32) -> Result<()> {
        self.append_with(&mut ObjectCloner::new(source), page)
    }

    /// Append pages in `order`, each taken from the source or the composed
    /// document. Objects shared between pages of one document are copied
    /// once.
    #[instrument(skip_all, fields(pages = order.len()))]
    pub fn interleave<'d>(
        &mut self,
        source: Option<&'d Document>,
        composed: Option<&'d Document>,
        order: &[PageOrigin],
    ) -> Result<()> {
        let mut from_source = source.map(ObjectCloner::new);
        let mut from_composed = composed.map(ObjectCloner::new);
        for origin in order {
            let (cloner, page) = match *origin {
                PageOrigin::Source(page) => (from_source.as_mut(), page),
                PageOrigin::Composed(page) => (from_composed.as_mut(), page),
            };
            let cloner = cloner.ok_or_else(|| {
                FolienwerkError::PdfError(format!("no document to take {:?} from", origin))
            })?;
            self.append_with(cloner, page)?;
        }
        Ok(())
    }

    fn append_with(&mut self, cloner: &mut ObjectCloner<'_>, page: u32) -> Result<()> {
        let source = cloner.source;
        let page_id = *source.get_pages().get(&page).ok_or_else(|| {
            FolienwerkError::PdfError(format!("page {} not found in page tree", page))
        })?;
        let page_dict = source
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|err| {
                FolienwerkError::PdfError(format!(
                    "cannot read page object {:?}: {}",
                    page_id, err
                ))
            })?;

        // Resolve inherited attributes onto the page itself, since the
        // source's page tree does not come along.
        let mut flattened = page_dict.clone();
        for key in INHERITABLE {
            if flattened.get(key).is_err() {
                if let Some(value) = inherited(source, page_dict, key) {
                    flattened.set(key.to_vec(), value.clone());
                }
            }
        }

        let before = cloner.copied.len();
        let mut cloned = cloner.clone_dictionary(&mut self.target, &flattened);
        cloned.set("Parent", Object::Reference(self.pages_id));
        let cloned_id = self.target.add_object(cloned);
        self.kids.push(cloned_id);

        debug!(page, copied_objects = cloner.copied.len() - before, "page appended");
        Ok(())
    }

    /// Write the page tree and catalog and serialise the document.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let kids: Vec<Object> = self.kids.iter().map(|id| Object::Reference(*id)).collect();
        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Count", Object::Integer(kids.len() as i64));
        pages.set("Kids", Object::Array(kids));
        self.target
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(self.pages_id));
        let catalog_id = self.target.add_object(catalog);
        self.target.trailer.set("Root", Object::Reference(catalog_id));

        let mut output = Vec::new();
        self.target.save_to(&mut output).map_err(|err| {
            FolienwerkError::PdfError(format!("failed to serialise assembled PDF: {}", err))
        })?;
        Ok(output)
    }
}

/// Deep-copies objects from one document into another, sharing each source
/// object once so fonts and images used by several pages are not duplicated
/// and reference cycles terminate.
struct ObjectCloner<'s> {
    source: &'s Document,
    copied: HashMap<ObjectId, ObjectId>,
}

impl<'s> ObjectCloner<'s> {
    fn new(source: &'s Document) -> Self {
        Self {
            source,
            copied: HashMap::new(),
        }
    }

    fn clone_dictionary(&mut self, target: &mut Document, dict: &Dictionary) -> Dictionary {
        let mut new_dict = Dictionary::new();
        for (key, value) in dict.iter() {
            // The caller re-parents the page; annotations' /P is dropped
            // rather than pulling the source page tree along.
            if key == b"Parent" || key == b"P" {
                continue;
            }
            new_dict.set(key.clone(), self.clone_object(target, value));
        }
        new_dict
    }

    fn clone_object(&mut self, target: &mut Document, object: &Object) -> Object {
        match object {
            Object::Dictionary(dict) => Object::Dictionary(self.clone_dictionary(target, dict)),
            Object::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| self.clone_object(target, item))
                    .collect(),
            ),
            Object::Stream(stream) => {
                let dict = self.clone_dictionary(target, &stream.dict);
                Object::Stream(lopdf::Stream::new(dict, stream.content.clone()))
            }
            Object::Reference(ref_id) => {
                if let Some(existing) = self.copied.get(ref_id) {
                    return Object::Reference(*existing);
                }
                match self.source.get_object(*ref_id) {
                    Ok(referenced) => {
                        let new_id = target.new_object_id();
                        self.copied.insert(*ref_id, new_id);
                        let cloned = self.clone_object(target, referenced);
                        target.objects.insert(new_id, cloned);
                        Object::Reference(new_id)
                    }
                    Err(err) => {
                        warn!(?ref_id, %err, "Cannot resolve reference, using Null");
                        Object::Null
                    }
                }
            }
            other => other.clone(),
        }
    }
}
