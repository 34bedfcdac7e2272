use std::path::Path;

use mupdf::{Document, Page, TextPageFlags};

use hallucitation_core::{BackendError, PdfBackend};

/// Page bands dropped during extraction, as fractions of page height.
///
/// Running headers and footers ("Proceedings of ... Page 12") otherwise end
/// up inside whatever paragraph or reference spans the page break.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: f32,
    pub bottom: f32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: 0.04,
            bottom: 0.05,
        }
    }
}

impl Margins {
    pub const NONE: Margins = Margins {
        top: 0.0,
        bottom: 0.0,
    };

    /// Vertical range `[lo, hi]` of a page spanning `y0..y1` whose blocks are kept.
    fn body_band(&self, y0: f32, y1: f32) -> (f32, f32) {
        let height = y1 - y0;
        (
            y0 + height * self.top.clamp(0.0, 1.0),
            y1 - height * self.bottom.clamp(0.0, 1.0),
        )
    }
}

/// MuPDF implementation of [`PdfBackend`].
///
/// Kept in its own crate so that only binaries that decode PDFs link the
/// AGPL-licensed mupdf library.
#[derive(Debug, Clone, Default)]
pub struct MupdfBackend {
    margins: Margins,
}

impl MupdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    fn page_text(&self, page: &Page) -> Result<String, mupdf::Error> {
        let bounds = page.bounds()?;
        let (top, bottom) = self.margins.body_band(bounds.y0, bounds.y1);
        let text_page = page.to_text_page(TextPageFlags::empty())?;

        let mut out = String::new();
        for block in text_page.blocks() {
            let b = block.bounds();
            // Entirely above the body band, or starting below it.
            if (self.margins.top > 0.0 && b.y1 <= top) || (self.margins.bottom > 0.0 && b.y0 >= bottom)
            {
                continue;
            }
            for line in block.lines() {
                out.extend(line.chars().map(|c| c.char().unwrap_or('\u{FFFD}')));
                out.push('\n');
            }
        }
        Ok(out)
    }
}

impl PdfBackend for MupdfBackend {
    fn extract_text(&self, path: &Path) -> Result<String, BackendError> {
        let path = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("path is not valid UTF-8".into()))?;
        let document = Document::open(path).map_err(|e| BackendError::OpenError(e.to_string()))?;
        let extraction = |e: mupdf::Error| BackendError::ExtractionError(e.to_string());

        let mut pages = Vec::new();
        for page in document.pages().map_err(extraction)? {
            pages.push(self.page_text(&page.map_err(extraction)?).map_err(extraction)?);
        }
        Ok(pages.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_band_trims_header_and_footer() {
        let (lo, hi) = Margins::default().body_band(0.0, 1000.0);
        assert!((lo - 40.0).abs() < 1e-3);
        assert!((hi - 950.0).abs() < 1e-3);
    }

    #[test]
    fn no_margins_keep_whole_page() {
        assert_eq!(Margins::NONE.body_band(10.0, 810.0), (10.0, 810.0));
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.pdf");
        let err = MupdfBackend::new().extract_text(&path).unwrap_err();
        assert!(matches!(err, BackendError::OpenError(_)));
    }
}
