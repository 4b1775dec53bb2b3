use std::path::Path;

use thiserror::Error;

/// Upload types the pipeline knows how to rasterize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Png,
    Jpeg,
}

impl FileKind {
    /// Classify by extension. The name must contain a dot; matching is
    /// case-insensitive. Returns `None` for anything not allowed.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// Suffix used for temp files holding this kind of upload.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Pdf => ".pdf",
            Self::Png => ".png",
            Self::Jpeg => ".jpg",
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pdf => "PDF",
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
        })
    }
}

/// One rendered page, PNG-encoded.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-based position in the source document.
    pub page_number: usize,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PageImage {
    /// Encode a packed 8-bit RGB buffer as PNG.
    pub fn from_rgb(
        page_number: usize,
        width: u32,
        height: u32,
        rgb: Vec<u8>,
    ) -> Result<Self, RasterizeError> {
        let buffer = image::RgbImage::from_raw(width, height, rgb).ok_or_else(|| {
            RasterizeError::Image(format!("pixel buffer does not match {width}x{height}"))
        })?;
        Self::from_image(page_number, &image::DynamicImage::ImageRgb8(buffer))
    }

    /// Re-encode any decoded image as PNG.
    pub fn from_image(
        page_number: usize,
        img: &image::DynamicImage,
    ) -> Result<Self, RasterizeError> {
        let mut png = std::io::Cursor::new(Vec::new());
        img.write_to(&mut png, image::ImageFormat::Png)
            .map_err(|e| RasterizeError::Image(format!("PNG encoding failed: {e}")))?;
        Ok(Self {
            page_number,
            png: png.into_inner(),
            width: img.width(),
            height: img.height(),
        })
    }
}

#[derive(Error, Debug)]
pub enum RasterizeError {
    #[error("failed to open document: {0}")]
    Open(String),
    #[error("failed to render page {page}: {message}")]
    Render { page: usize, message: String },
    #[error("invalid image: {0}")]
    Image(String),
    #[error("document has no pages")]
    Empty,
    #[error("{0} files are not supported by this build")]
    Unsupported(FileKind),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a document on disk into page images.
///
/// Implementations are blocking; async callers should run them on the
/// blocking pool. A non-PDF input yields exactly one page.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, path: &Path, kind: FileKind) -> Result<Vec<PageImage>, RasterizeError>;
}
