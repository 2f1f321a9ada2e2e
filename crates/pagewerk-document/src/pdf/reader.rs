// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — open a source document, report page geometry, and sample the
// first pages for text and embedded raster images using the `lopdf` crate.

use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId};
use pagewerk_core::error::PagewerkError;
use pagewerk_core::types::StructuralProfile;
use tracing::{debug, info, instrument, warn};

/// Number of leading pages the structure analyzer inspects.
pub const ANALYSIS_SAMPLE_PAGES: usize = 3;

/// Page-tree depth limit when resolving inherited attributes.
const MAX_TREE_DEPTH: usize = 32;

/// Form XObject nesting followed when looking for images.
const MAX_FORM_DEPTH: usize = 2;

/// US Letter, used when a page carries no usable /MediaBox.
const FALLBACK_PAGE_PT: (f32, f32) = (612.0, 792.0);

/// Displayed size of one page in PDF points, rotation already applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width_pt: f32,
    pub height_pt: f32,
}

/// An opened source document.
///
/// Wraps `lopdf::Document` together with the byte size of the file it came
/// from. Dropping the reader releases the document.
pub struct PdfReader {
    /// The underlying lopdf document.
    document: Document,
    /// Source path, if opened from a file (useful for diagnostics).
    source_path: Option<String>,
    /// Size of the serialised source in bytes.
    byte_size: u64,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    ///
    /// Failure to read or parse the file is the one fatal error of the
    /// pipeline and is reported as [`PagewerkError::SourceUnreadable`].
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PagewerkError> {
        let path_ref = path.as_ref();
        info!("Opening PDF: {}", path_ref.display());

        let unreadable = |reason: String| PagewerkError::SourceUnreadable {
            path: path_ref.display().to_string(),
            reason,
        };

        let byte_size = std::fs::metadata(path_ref)
            .map_err(|err| unreadable(err.to_string()))?
            .len();
        let document = Document::load(path_ref).map_err(|err| unreadable(err.to_string()))?;

        debug!(pages = document.get_pages().len(), byte_size, "PDF loaded");

        Ok(Self {
            document,
            source_path: Some(path_ref.display().to_string()),
            byte_size,
        })
    }

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, PagewerkError> {
        let document = Document::load_mem(data).map_err(|err| PagewerkError::SourceUnreadable {
            path: "<memory>".into(),
            reason: err.to_string(),
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");

        Ok(Self {
            document,
            source_path: None,
            byte_size: data.len() as u64,
        })
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Displayed size of every page, in page order.
    ///
    /// /MediaBox and /Rotate are inherited through the page tree; a quarter
    /// turn swaps width and height.
    pub fn page_geometry(&self) -> Vec<PageGeometry> {
        self.document
            .get_pages()
            .values()
            .map(|&page_id| self.geometry_of(page_id))
            .collect()
    }

    fn geometry_of(&self, page_id: ObjectId) -> PageGeometry {
        let (width_pt, height_pt) = inherited(&self.document, page_id, b"MediaBox")
            .and_then(|obj| obj.as_array().ok())
            .and_then(|rect| media_box_size(rect))
            .unwrap_or_else(|| {
                warn!(?page_id, "Page has no usable /MediaBox, assuming US Letter");
                FALLBACK_PAGE_PT
            });

        let rotation = inherited(&self.document, page_id, b"Rotate")
            .and_then(number)
            .map(|deg| (deg as i64).rem_euclid(360))
            .unwrap_or(0);

        if rotation == 90 || rotation == 270 {
            PageGeometry {
                width_pt: height_pt,
                height_pt: width_pt,
            }
        } else {
            PageGeometry {
                width_pt,
                height_pt,
            }
        }
    }

    // -- Structure analysis ---------------------------------------------------

    /// Classify the document from its first [`ANALYSIS_SAMPLE_PAGES`] pages.
    ///
    /// `has_text` is set when any sampled page yields non-empty extracted
    /// text, `has_raster_images` when any sampled page references at least
    /// one image XObject. Pages beyond the sample are never inspected.
    #[instrument(skip(self), fields(source = self.source_path.as_deref().unwrap_or("<memory>")))]
    pub fn analyze(&self) -> StructuralProfile {
        let pages = self.document.get_pages();
        let sample: Vec<(u32, ObjectId)> = pages
            .iter()
            .take(ANALYSIS_SAMPLE_PAGES)
            .map(|(&number, &id)| (number, id))
            .collect();

        let mut has_text = false;
        let mut has_raster_images = false;

        for (page_number, page_id) in sample {
            if !has_text {
                has_text = self.page_has_text(page_number);
            }
            if !has_raster_images {
                has_raster_images = self.page_has_images(page_id);
            }
            if has_text && has_raster_images {
                break;
            }
        }

        let profile = StructuralProfile {
            page_count: pages.len(),
            has_text,
            has_raster_images,
            byte_size: self.byte_size,
        };
        info!(
            pages = profile.page_count,
            has_text,
            has_raster_images,
            byte_size = profile.byte_size,
            class = ?profile.class(),
            "Structure analysed"
        );
        profile
    }

    fn page_has_text(&self, page_number: u32) -> bool {
        match self.document.extract_text(&[page_number]) {
            Ok(text) => !text.trim().is_empty(),
            Err(err) => {
                debug!(page_number, %err, "Text extraction failed, treating page as textless");
                false
            }
        }
    }

    fn page_has_images(&self, page_id: ObjectId) -> bool {
        inherited(&self.document, page_id, b"Resources")
            .and_then(|obj| obj.as_dict().ok())
            .map(|resources| resources_have_image(&self.document, resources, 0))
            .unwrap_or(false)
    }
}

// -- Helpers ------------------------------------------------------------------

/// Follow a reference one hop; direct objects are returned as-is.
fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Look up `key` on the page, then on each ancestor in the page tree.
fn inherited<'a>(document: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = document.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return resolve(document, value);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = document.get_dictionary(parent).ok()?;
    }
    None
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

fn media_box_size(rect: &[Object]) -> Option<(f32, f32)> {
    if rect.len() != 4 {
        return None;
    }
    let coords: Vec<f32> = rect.iter().filter_map(number).collect();
    if coords.len() != 4 {
        return None;
    }
    let width = (coords[2] - coords[0]).abs();
    let height = (coords[3] - coords[1]).abs();
    (width > 0.0 && height > 0.0).then_some((width, height))
}

/// Whether a resource dictionary names an image XObject, looking inside Form
/// XObjects up to [`MAX_FORM_DEPTH`] levels deep.
fn resources_have_image(document: &Document, resources: &Dictionary, depth: usize) -> bool {
    let xobjects = match resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| resolve(document, obj))
        .and_then(|obj| obj.as_dict().ok())
    {
        Some(dict) => dict,
        None => return false,
    };

    for (_, entry) in xobjects.iter() {
        let Some(Object::Stream(stream)) = resolve(document, entry) else {
            continue;
        };
        match stream.dict.get(b"Subtype") {
            Ok(Object::Name(subtype)) if subtype.as_slice() == b"Image" => return true,
            Ok(Object::Name(subtype)) if subtype.as_slice() == b"Form" && depth < MAX_FORM_DEPTH => {
                let nested = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|obj| resolve(document, obj))
                    .and_then(|obj| obj.as_dict().ok());
                if nested.is_some_and(|nested| resources_have_image(document, nested, depth + 1)) {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}
