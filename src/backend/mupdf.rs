//! PDF decoding through MuPDF

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ::mupdf::{Colorspace, Device, Matrix, Page, Pixmap};
use log::{debug, warn};

use crate::document::{Document, DocumentProvider, DocumentSource, PageDecoder};
use crate::error::{DecodeFailure, DocumentOpenFailure};
use crate::geometry::{PagePlacement, Size};
use crate::raster::{PixelFormat, Raster};

impl From<::mupdf::Error> for DecodeFailure {
    fn from(e: ::mupdf::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

fn open_document(
    path: &Path,
    password: Option<&str>,
) -> Result<::mupdf::Document, DocumentOpenFailure> {
    if !path.exists() {
        return Err(DocumentOpenFailure::NotFound(path.to_path_buf()));
    }

    let mut doc = ::mupdf::Document::open(path.to_string_lossy().as_ref())
        .map_err(|e| DocumentOpenFailure::Corrupt(e.to_string()))?;

    let needs_password = doc
        .needs_password()
        .map_err(|e| DocumentOpenFailure::Corrupt(e.to_string()))?;
    if needs_password {
        let Some(password) = password else {
            return Err(DocumentOpenFailure::AuthRequired);
        };
        let accepted = doc
            .authenticate(password)
            .map_err(|e| DocumentOpenFailure::Corrupt(e.to_string()))?;
        if !accepted {
            return Err(DocumentOpenFailure::AuthRequired);
        }
    }
    Ok(doc)
}

/// PDF (or any MuPDF-supported format) on disk.
///
/// Page sizes are read once at open. Each render worker reopens the file on
/// its own thread since MuPDF handles cannot cross threads.
#[derive(Debug)]
pub struct MupdfDocument {
    path: PathBuf,
    password: Option<String>,
    page_sizes: Vec<Size>,
}

impl MupdfDocument {
    pub fn open(path: &Path, password: Option<&str>) -> Result<Self, DocumentOpenFailure> {
        let doc = open_document(path, password)?;
        let count = doc
            .page_count()
            .map_err(|e| DocumentOpenFailure::Corrupt(e.to_string()))?;

        let mut page_sizes = Vec::with_capacity(count.max(0) as usize);
        for index in 0..count {
            let bounds = doc
                .load_page(index)
                .and_then(|page| page.bounds())
                .map_err(|e| DocumentOpenFailure::Corrupt(e.to_string()))?;
            page_sizes.push(Size::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0));
        }

        Ok(Self {
            path: path.to_path_buf(),
            password: password.map(str::to_string),
            page_sizes,
        })
    }
}

impl Document for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    fn page_size(&self, page: usize) -> Option<Size> {
        self.page_sizes.get(page).copied()
    }

    fn decoder(&self) -> Result<Box<dyn PageDecoder>, DecodeFailure> {
        let doc = open_document(&self.path, self.password.as_deref())
            .map_err(|e| DecodeFailure::backend(e.to_string()))?;
        Ok(Box::new(MupdfDecoder {
            doc,
            pages: HashMap::new(),
        }))
    }
}

struct MupdfDecoder {
    doc: ::mupdf::Document,
    pages: HashMap<usize, Page>,
}

impl PageDecoder for MupdfDecoder {
    fn open_page(&mut self, page: usize) -> Result<(), DecodeFailure> {
        if self.pages.contains_key(&page) {
            return Ok(());
        }
        let loaded = self
            .doc
            .load_page(page as i32)
            .map_err(|e| DecodeFailure::Page {
                page,
                detail: e.to_string(),
            })?;
        debug!("Loaded page {page}");
        self.pages.insert(page, loaded);
        Ok(())
    }

    fn render(
        &mut self,
        page: usize,
        placement: &PagePlacement,
        raster: &mut Raster,
        annotations: bool,
    ) -> Result<(), DecodeFailure> {
        if raster.format() != PixelFormat::Rgba8888 {
            return Err(DecodeFailure::backend("MuPDF renders into RGBA rasters only"));
        }
        self.open_page(page)?;
        let Some(loaded) = self.pages.get(&page) else {
            return Err(DecodeFailure::InvalidRegion);
        };

        let bounds = loaded.bounds()?;
        let page_w = bounds.x1 - bounds.x0;
        let page_h = bounds.y1 - bounds.y0;
        if page_w <= 0.0 || page_h <= 0.0 {
            return Err(DecodeFailure::InvalidRegion);
        }

        let width = raster.width() as i32;
        let height = raster.height() as i32;
        let pixmap = Pixmap::new_with_w_h(&Colorspace::device_rgb(), width, height, false)?;
        pixmap.clear_with(0xFF)?;

        let sx = placement.scale_x(page_w);
        let sy = placement.scale_y(page_h);
        let ctm = Matrix::new(
            sx,
            0.0,
            0.0,
            sy,
            placement.x as f32 - bounds.x0 * sx,
            placement.y as f32 - bounds.y0 * sy,
        );

        let device = Device::from_pixmap(&pixmap)?;
        if annotations {
            loaded.run(&device, &ctm)?;
        } else {
            loaded.run_contents(&device, &ctm)?;
        }
        drop(device);

        copy_rgb_into(&pixmap, raster)
    }
}

fn copy_rgb_into(pixmap: &Pixmap, raster: &mut Raster) -> Result<(), DecodeFailure> {
    let n = pixmap.n() as usize;
    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();

    if n < 3 || width != raster.width() as usize || height != raster.height() as usize {
        return Err(DecodeFailure::backend("pixmap does not match raster"));
    }
    if samples.len() < stride.saturating_mul(height) || width * n > stride {
        return Err(DecodeFailure::backend("pixmap buffer size mismatch"));
    }

    let out_stride = raster.stride();
    let out = raster.data_mut();
    for y in 0..height {
        let src = &samples[y * stride..y * stride + width * n];
        let dst = &mut out[y * out_stride..(y + 1) * out_stride];
        for (px, rgba) in src.chunks_exact(n).zip(dst.chunks_exact_mut(4)) {
            rgba[..3].copy_from_slice(&px[..3]);
            rgba[3] = 0xFF;
        }
    }
    Ok(())
}

/// Opens file sources with MuPDF.
#[derive(Debug, Default, Clone, Copy)]
pub struct MupdfProvider;

impl DocumentProvider for MupdfProvider {
    fn open(
        &self,
        source: &DocumentSource,
        password: Option<&str>,
    ) -> Result<Arc<dyn Document>, DocumentOpenFailure> {
        match source {
            DocumentSource::Path(path) => {
                let doc = MupdfDocument::open(path, password)?;
                Ok(Arc::new(doc))
            }
            DocumentSource::Named(name) => {
                warn!("MuPDF provider cannot open named source {name}");
                Err(DocumentOpenFailure::NotFound(PathBuf::from(name)))
            }
        }
    }
}
