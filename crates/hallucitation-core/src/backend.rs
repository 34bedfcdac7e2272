use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for PDF text extraction backends.
///
/// Implementors return page texts joined with newlines, in page order.
pub trait PdfBackend: Send + Sync {
    /// Extract the full text content of a PDF file.
    fn extract_text(&self, path: &Path) -> Result<String, BackendError>;
}

/// Text of one document plus, when it is empty, the reason why.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub failure: Option<String>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            failure: Some(reason.into()),
        }
    }
}

/// Infallible wrapper around a [`PdfBackend`].
///
/// Missing files, decoding errors and backend panics all become empty text
/// with a failure reason. Decoding runs on the blocking pool.
#[derive(Clone)]
pub struct TextExtractor {
    backend: Arc<dyn PdfBackend>,
}

impl TextExtractor {
    pub fn new(backend: Arc<dyn PdfBackend>) -> Self {
        Self { backend }
    }

    pub async fn extract(&self, path: &Path) -> Extraction {
        if !path.is_file() {
            tracing::warn!(path = %path.display(), "PDF not found");
            return Extraction::failed(format!("file not found: {}", path.display()));
        }

        let backend = Arc::clone(&self.backend);
        let owned = path.to_path_buf();
        let joined = tokio::task::spawn_blocking(move || backend.extract_text(&owned)).await;

        let extraction = match joined {
            Ok(Ok(text)) if text.trim().is_empty() => Extraction::failed("no extractable text"),
            Ok(Ok(text)) => Extraction {
                text,
                failure: None,
            },
            Ok(Err(e)) => Extraction::failed(e.to_string()),
            Err(e) if e.is_panic() => Extraction::failed("PDF backend panicked"),
            Err(e) => Extraction::failed(format!("extraction task failed: {e}")),
        };
        if let Some(reason) = &extraction.failure {
            tracing::warn!(path = %path.display(), reason = %reason, "text extraction failed");
        }
        extraction
    }
}

/// Backend serving canned text per file name. Used by tests and by
/// pipelines fed with pre-extracted text.
#[derive(Debug, Default)]
pub struct StaticBackend {
    texts: HashMap<PathBuf, String>,
    panics: Vec<PathBuf>,
}

impl StaticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `text` for files whose name is `file_name`.
    pub fn with_text(mut self, file_name: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        self.texts.insert(file_name.into(), text.into());
        self
    }

    /// Panic when asked for `file_name`.
    pub fn with_panic(mut self, file_name: impl Into<PathBuf>) -> Self {
        self.panics.push(file_name.into());
        self
    }
}

impl PdfBackend for StaticBackend {
    fn extract_text(&self, path: &Path) -> Result<String, BackendError> {
        let name = path.file_name().map(PathBuf::from).unwrap_or_default();
        if self.panics.contains(&name) {
            panic!("simulated backend crash on {}", path.display());
        }
        self.texts
            .get(&name)
            .cloned()
            .ok_or_else(|| BackendError::OpenError(format!("cannot decode {}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        path
    }

    fn extractor(backend: StaticBackend) -> TextExtractor {
        TextExtractor::new(Arc::new(backend))
    }

    #[tokio::test]
    async fn returns_backend_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "P001.pdf");
        let ex = extractor(StaticBackend::new().with_text("P001.pdf", "page one\npage two"));
        let out = ex.extract(&path).await;
        assert_eq!(out.text, "page one\npage two");
        assert!(out.failure.is_none());
    }

    #[tokio::test]
    async fn missing_file_is_empty_with_reason() {
        let dir = tempfile::tempdir().unwrap();
        let out = extractor(StaticBackend::new())
            .extract(&dir.path().join("nope.pdf"))
            .await;
        assert!(out.is_empty());
        assert!(out.failure.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn decode_error_is_empty_with_reason() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "corrupt.pdf");
        let out = extractor(StaticBackend::new()).extract(&path).await;
        assert!(out.is_empty());
        assert!(out.failure.unwrap().contains("cannot decode"));
    }

    #[tokio::test]
    async fn whitespace_only_text_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "scan.pdf");
        let out = extractor(StaticBackend::new().with_text("scan.pdf", " \n\n "))
            .extract(&path)
            .await;
        assert_eq!(out.failure.as_deref(), Some("no extractable text"));
    }

    #[tokio::test]
    async fn backend_panic_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "boom.pdf");
        let out = extractor(StaticBackend::new().with_panic("boom.pdf"))
            .extract(&path)
            .await;
        assert!(out.is_empty());
        assert_eq!(out.failure.as_deref(), Some("PDF backend panicked"));
    }
}
