//! Page rasterizers: poppler's `pdftoppm` and embedded page images.

use std::path::PathBuf;
use std::process::Command;

use image::DynamicImage;
use tracing::debug;

use super::{PageRasterizer, check_tool};
use crate::error::OcrError;
use crate::pdf::PdfExtractor;

/// Renders pages with `pdftoppm -png -r <dpi> -f <first> -l <last>`.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    dpi: u32,
}

impl PdftoppmRasterizer {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }
}

impl PageRasterizer for PdftoppmRasterizer {
    fn rasterize_pages(&self, data: &[u8], first: u32, last: u32) -> Result<Vec<DynamicImage>, OcrError> {
        let temp_dir = tempfile::tempdir()?;
        let input = temp_dir.path().join("input.pdf");
        std::fs::write(&input, data)?;

        let output = Command::new("pdftoppm")
            .args(["-png", "-r", &self.dpi.to_string()])
            .args(["-f", &first.to_string(), "-l", &last.to_string()])
            .arg(&input)
            .arg(temp_dir.path().join("page"))
            .output();
        check_tool(output, "pdftoppm (install poppler-utils)")
            .map_err(|e| match e {
                OcrError::Recognition(msg) => OcrError::Rasterize(msg),
                other => other,
            })?;

        // page-1.png, page-01.png or page-001.png depending on page count;
        // zero padding keeps lexical order equal to page order
        let mut pages: Vec<PathBuf> = std::fs::read_dir(temp_dir.path())?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();
        pages.sort();

        if pages.is_empty() {
            return Err(OcrError::Rasterize(format!(
                "no images generated for pages {}-{}",
                first, last
            )));
        }

        debug!("pdftoppm rendered {} pages at {} dpi", pages.len(), self.dpi);
        pages
            .iter()
            .map(|p| image::open(p).map_err(|e| OcrError::InvalidImage(e.to_string())))
            .collect()
    }
}

/// Uses the first image embedded in each page, for scans stored one image per page.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedImageRasterizer;

impl PageRasterizer for EmbeddedImageRasterizer {
    fn rasterize_pages(&self, data: &[u8], first: u32, last: u32) -> Result<Vec<DynamicImage>, OcrError> {
        let pdf = PdfExtractor::load(data).map_err(|e| OcrError::Rasterize(e.to_string()))?;
        let last = last.min(pdf.page_count());

        let mut images = Vec::new();
        for page in first.max(1)..=last {
            let image = pdf
                .extract_images(page)
                .map_err(|e| OcrError::Rasterize(e.to_string()))?
                .into_iter()
                .next()
                .ok_or_else(|| OcrError::Rasterize(format!("no image on page {}", page)))?;
            images.push(image);
        }
        Ok(images)
    }
}
