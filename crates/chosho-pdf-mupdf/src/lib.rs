use std::path::Path;

use mupdf::{Colorspace, Document, Matrix, Pixmap};

use chosho_core::{DEFAULT_RENDER_DPI, FileKind, PageImage, RasterizeError, Rasterizer};

/// MuPDF-based PDF implementation of [`Rasterizer`].
///
/// This crate is the sole AGPL island: it isolates the mupdf dependency
/// (which is AGPL-3.0) so that image-only code paths do not transitively
/// depend on it.
///
/// Pages are rendered in device RGB without alpha at `dpi` (PDF user space
/// is 72 units per inch).
pub struct MupdfRasterizer {
    dpi: u32,
}

impl Default for MupdfRasterizer {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_RENDER_DPI,
        }
    }
}

impl MupdfRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the render resolution. Values below 1 are clamped to 1.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi.max(1);
        self
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    fn scale(&self) -> f32 {
        self.dpi as f32 / 72.0
    }
}

impl Rasterizer for MupdfRasterizer {
    fn rasterize(&self, path: &Path, kind: FileKind) -> Result<Vec<PageImage>, RasterizeError> {
        if kind != FileKind::Pdf {
            return Err(RasterizeError::Unsupported(kind));
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| RasterizeError::Open("invalid path encoding".into()))?;
        let document =
            Document::open(path_str).map_err(|e| RasterizeError::Open(e.to_string()))?;

        let scale = self.scale();
        let matrix = Matrix::new_scale(scale, scale);
        let colorspace = Colorspace::device_rgb();

        let mut images = Vec::new();
        for (index, page_result) in document
            .pages()
            .map_err(|e| RasterizeError::Open(e.to_string()))?
            .enumerate()
        {
            let page_number = index + 1;
            let render_err = |e: mupdf::Error| RasterizeError::Render {
                page: page_number,
                message: e.to_string(),
            };

            let page = page_result.map_err(render_err)?;
            let pixmap = page
                .to_pixmap(&matrix, &colorspace, false, true)
                .map_err(render_err)?;
            let rgb = packed_rgb(&pixmap).ok_or_else(|| RasterizeError::Render {
                page: page_number,
                message: format!("unexpected pixmap layout ({} components)", pixmap.n()),
            })?;

            images.push(PageImage::from_rgb(
                page_number,
                pixmap.width(),
                pixmap.height(),
                rgb,
            )?);
        }

        if images.is_empty() {
            return Err(RasterizeError::Empty);
        }
        tracing::debug!(path = %path.display(), pages = images.len(), dpi = self.dpi, "rendered PDF");
        Ok(images)
    }
}

/// Copy a pixmap's samples into a tightly packed RGB buffer, dropping any
/// alpha channel and row padding.
fn packed_rgb(pixmap: &Pixmap) -> Option<Vec<u8>> {
    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let n = pixmap.n() as usize;
    if n < 3 || height == 0 {
        return None;
    }
    let samples = pixmap.samples();
    let stride = samples.len() / height;
    if stride < width * n {
        return None;
    }

    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in samples.chunks_exact(stride).take(height) {
        for px in row[..width * n].chunks_exact(n) {
            rgb.extend_from_slice(&px[..3]);
        }
    }
    Some(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpi_sets_scale() {
        let r = MupdfRasterizer::new().with_dpi(144);
        assert_eq!(r.dpi(), 144);
        assert!((r.scale() - 2.0).abs() < f32::EPSILON);
        assert_eq!(MupdfRasterizer::default().dpi(), DEFAULT_RENDER_DPI);
        assert_eq!(MupdfRasterizer::new().with_dpi(0).dpi(), 1);
    }

    #[test]
    fn images_are_not_handled_here() {
        let err = MupdfRasterizer::new()
            .rasterize(Path::new("scan.png"), FileKind::Png)
            .unwrap_err();
        assert!(matches!(err, RasterizeError::Unsupported(FileKind::Png)));
    }

    #[test]
    fn garbage_pdf_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        assert!(MupdfRasterizer::new().rasterize(&path, FileKind::Pdf).is_err());
    }
}
