use std::path::Path;

use chosho_core::{DEFAULT_RENDER_DPI, FileKind, PageImage, RasterizeError, Rasterizer};

/// Rasterizer for every supported upload type.
///
/// Dispatches on [`FileKind`]:
/// - PDF → one image per page via MuPDF (requires `pdf` feature)
/// - PNG / JPEG → decoded and re-encoded as a single PNG page
#[derive(Debug, Clone, Copy)]
pub struct DocumentRasterizer {
    dpi: u32,
}

impl Default for DocumentRasterizer {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_RENDER_DPI,
        }
    }
}

impl DocumentRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render resolution for PDF pages. Images keep their native size.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }
}

impl Rasterizer for DocumentRasterizer {
    fn rasterize(&self, path: &Path, kind: FileKind) -> Result<Vec<PageImage>, RasterizeError> {
        match kind {
            FileKind::Pdf => rasterize_pdf(path, self.dpi),
            FileKind::Png | FileKind::Jpeg => rasterize_image(path).map(|page| vec![page]),
        }
    }
}

#[cfg(feature = "pdf")]
fn rasterize_pdf(path: &Path, dpi: u32) -> Result<Vec<PageImage>, RasterizeError> {
    chosho_pdf_mupdf::MupdfRasterizer::new()
        .with_dpi(dpi)
        .rasterize(path, FileKind::Pdf)
}

#[cfg(not(feature = "pdf"))]
fn rasterize_pdf(_path: &Path, _dpi: u32) -> Result<Vec<PageImage>, RasterizeError> {
    Err(RasterizeError::Unsupported(FileKind::Pdf))
}

/// Content sniffing decides the decoder, so a JPEG saved as `.png` still works.
fn rasterize_image(path: &Path) -> Result<PageImage, RasterizeError> {
    let bytes = std::fs::read(path)?;
    let img = image::load_from_memory(&bytes).map_err(|e| RasterizeError::Image(e.to_string()))?;
    tracing::debug!(path = %path.display(), width = img.width(), height = img.height(), "decoded image");
    PageImage::from_image(1, &img)
}
