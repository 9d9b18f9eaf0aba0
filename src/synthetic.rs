//! Procedural test-pattern documents
//!
//! Every page is a checkerboard tinted by its page index, which makes tile
//! seams and misplaced regions easy to spot and needs no document format.

use std::collections::HashSet;
use std::sync::Arc;

use rayon::prelude::*;

use crate::document::{Document, DocumentProvider, DocumentSource, PageDecoder};
use crate::error::{DecodeFailure, DocumentOpenFailure};
use crate::geometry::{PagePlacement, Size};
use crate::raster::{PixelFormat, Raster};

const CHECKER_CELLS: f32 = 8.0;
const PAGE_TINTS: [[u8; 3]; 6] = [
    [0xE0, 0x6C, 0x75],
    [0x98, 0xC3, 0x79],
    [0x61, 0xAF, 0xEF],
    [0xE5, 0xC0, 0x7B],
    [0xC6, 0x78, 0xDD],
    [0x56, 0xB6, 0xC2],
];

/// A document of identical procedurally drawn pages.
#[derive(Debug, Clone)]
pub struct SyntheticDocument {
    page_count: usize,
    page_size: Size,
    failing_pages: HashSet<usize>,
}

impl SyntheticDocument {
    #[must_use]
    pub fn new(page_count: usize, page_size: Size) -> Self {
        Self {
            page_count,
            page_size,
            failing_pages: HashSet::new(),
        }
    }

    /// Make every render of `page` fail.
    #[must_use]
    pub fn with_failing_page(mut self, page: usize) -> Self {
        self.failing_pages.insert(page);
        self
    }

    /// Parse `synthetic:<pages>` or `synthetic:<pages>:<width>x<height>`.
    #[must_use]
    pub fn parse(descriptor: &str) -> Option<Self> {
        let mut parts = descriptor.strip_prefix("synthetic:")?.split(':');
        let pages = parts.next()?.parse().ok()?;
        let size = match parts.next() {
            Some(dims) => {
                let (w, h) = dims.split_once('x')?;
                Size::new(w.parse().ok()?, h.parse().ok()?)
            }
            None => Size::new(595.0, 842.0),
        };
        if parts.next().is_some() || size.is_empty() {
            return None;
        }
        Some(Self::new(pages, size))
    }
}

impl Document for SyntheticDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&self, page: usize) -> Option<Size> {
        (page < self.page_count).then_some(self.page_size)
    }

    fn decoder(&self) -> Result<Box<dyn PageDecoder>, DecodeFailure> {
        Ok(Box::new(SyntheticDecoder {
            page_count: self.page_count,
            failing_pages: self.failing_pages.clone(),
        }))
    }
}

struct SyntheticDecoder {
    page_count: usize,
    failing_pages: HashSet<usize>,
}

impl PageDecoder for SyntheticDecoder {
    fn open_page(&mut self, page: usize) -> Result<(), DecodeFailure> {
        if page >= self.page_count {
            return Err(DecodeFailure::Page {
                page,
                detail: "out of range".to_string(),
            });
        }
        Ok(())
    }

    fn render(
        &mut self,
        page: usize,
        placement: &PagePlacement,
        raster: &mut Raster,
        _annotations: bool,
    ) -> Result<(), DecodeFailure> {
        if self.failing_pages.contains(&page) {
            return Err(DecodeFailure::Page {
                page,
                detail: "synthetic failure".to_string(),
            });
        }
        if raster.format() != PixelFormat::Rgba8888 {
            return Err(DecodeFailure::backend("synthetic decoder draws RGBA only"));
        }
        if placement.width <= 0 || placement.height <= 0 {
            return Err(DecodeFailure::InvalidRegion);
        }

        let tint = PAGE_TINTS[page % PAGE_TINTS.len()];
        let stride = raster.stride();
        let (px, py) = (placement.x as f32, placement.y as f32);
        let (pw, ph) = (placement.width as f32, placement.height as f32);

        raster
            .data_mut()
            .par_chunks_exact_mut(stride)
            .enumerate()
            .for_each(|(row, line)| {
                let v = (row as f32 + 0.5 - py) / ph;
                for (col, pixel) in line.chunks_exact_mut(4).enumerate() {
                    let u = (col as f32 + 0.5 - px) / pw;
                    let color = if (0.0..1.0).contains(&u) && (0.0..1.0).contains(&v) {
                        let cell = (u * CHECKER_CELLS) as u32 + (v * CHECKER_CELLS) as u32;
                        if cell % 2 == 0 {
                            [tint[0], tint[1], tint[2], 0xFF]
                        } else {
                            [0xFF, 0xFF, 0xFF, 0xFF]
                        }
                    } else {
                        [0xFF, 0xFF, 0xFF, 0xFF]
                    };
                    pixel.copy_from_slice(&color);
                }
            });
        Ok(())
    }
}

/// Opens `synthetic:` sources; any other source is not found.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticProvider;

impl DocumentProvider for SyntheticProvider {
    fn open(
        &self,
        source: &DocumentSource,
        _password: Option<&str>,
    ) -> Result<Arc<dyn Document>, DocumentOpenFailure> {
        match source {
            DocumentSource::Named(name) => SyntheticDocument::parse(name)
                .map(|doc| Arc::new(doc) as Arc<dyn Document>)
                .ok_or_else(|| DocumentOpenFailure::Corrupt(format!("bad synthetic descriptor {name}"))),
            DocumentSource::Path(path) => Err(DocumentOpenFailure::NotFound(path.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::RelRect;

    #[test]
    fn parses_descriptors() {
        let doc = SyntheticDocument::parse("synthetic:12").unwrap();
        assert_eq!(doc.page_count(), 12);
        assert_eq!(doc.page_size(0), Some(Size::new(595.0, 842.0)));
        assert_eq!(doc.page_size(12), None);

        let doc = SyntheticDocument::parse("synthetic:2:100x50").unwrap();
        assert_eq!(doc.page_size(1), Some(Size::new(100.0, 50.0)));

        assert!(SyntheticDocument::parse("synthetic:x").is_none());
        assert!(SyntheticDocument::parse("synthetic:2:0x50").is_none());
        assert!(SyntheticDocument::parse("file.pdf").is_none());
    }

    #[test]
    fn renders_region_of_page() {
        let doc = SyntheticDocument::new(2, Size::new(100.0, 100.0));
        let mut decoder = doc.decoder().unwrap();
        decoder.open_page(1).unwrap();

        // Top-left eighth of the page: a single tinted checker cell.
        let region = RelRect::new(0.0, 0.0, 0.125, 0.125);
        let placement = PagePlacement::for_region(&region, 16, 16).unwrap();
        let mut raster = Raster::allocate(16, 16, PixelFormat::Rgba8888).unwrap();
        decoder.render(1, &placement, &mut raster, false).unwrap();

        let tint = PAGE_TINTS[1];
        assert_eq!(&raster.data()[..4], &[tint[0], tint[1], tint[2], 0xFF]);
        assert_eq!(&raster.data()[raster.byte_size() - 4..], &[tint[0], tint[1], tint[2], 0xFF]);
    }

    #[test]
    fn failing_page_reports_decode_failure() {
        let doc = SyntheticDocument::new(3, Size::new(10.0, 10.0)).with_failing_page(2);
        let mut decoder = doc.decoder().unwrap();
        let placement = PagePlacement::for_region(&RelRect::FULL, 4, 4).unwrap();
        let mut raster = Raster::allocate(4, 4, PixelFormat::Rgba8888).unwrap();

        assert!(decoder.render(0, &placement, &mut raster, false).is_ok());
        assert!(matches!(
            decoder.render(2, &placement, &mut raster, false),
            Err(DecodeFailure::Page { page: 2, .. })
        ));
        assert!(decoder.open_page(3).is_err());
    }

    #[test]
    fn provider_rejects_paths() {
        let source = DocumentSource::Path("/tmp/a.pdf".into());
        assert!(matches!(
            SyntheticProvider.open(&source, None),
            Err(DocumentOpenFailure::NotFound(_))
        ));
        let source = DocumentSource::Named("synthetic:3".into());
        assert_eq!(SyntheticProvider.open(&source, None).unwrap().page_count(), 3);
    }
}
