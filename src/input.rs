use std::{fmt, str::FromStr, sync::Arc};

use image::RgbImage;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VerifyError};

/// How an uploaded document was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// A raster image (scan or photo).
    Scanned,
    /// A PDF that must be rasterized first.
    Normal,
}

impl FromStr for DocumentKind {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scanned" => Ok(DocumentKind::Scanned),
            "normal" => Ok(DocumentKind::Normal),
            other => Err(VerifyError::Input(format!(
                "unsupported document type '{}', expected 'scanned' or 'normal'",
                other
            ))),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Scanned => f.write_str("scanned"),
            DocumentKind::Normal => f.write_str("normal"),
        }
    }
}

/// Renders PDF bytes into page images. Implemented outside this crate.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, bytes: &[u8]) -> Result<Vec<RgbImage>>;
}

/// Turns uploaded bytes into the page image that gets compared.
#[derive(Clone, Default)]
pub struct DocumentLoader {
    rasterizer: Option<Arc<dyn PageRasterizer>>,
}

impl DocumentLoader {
    pub fn new() -> Self {
        Self { rasterizer: None }
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    /// PDFs are compared on their first page.
    pub fn load(&self, bytes: &[u8], kind: DocumentKind) -> Result<RgbImage> {
        if bytes.is_empty() {
            return Err(VerifyError::Input("document is empty".into()));
        }

        let image = match kind {
            DocumentKind::Scanned => image::load_from_memory(bytes)?.to_rgb8(),
            DocumentKind::Normal => {
                let rasterizer = self.rasterizer.as_ref().ok_or_else(|| {
                    VerifyError::Input("PDF documents require a page rasterizer".into())
                })?;
                rasterizer
                    .rasterize(bytes)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| VerifyError::Input("PDF has no pages".into()))?
            }
        };

        debug!(
            "Loaded {} document as {}x{} image",
            kind,
            image.width(),
            image.height()
        );

        Ok(image)
    }
}
