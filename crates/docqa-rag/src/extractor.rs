//! Plain-text extraction from uploaded documents.

use crate::error::{RagError, Result};
use lopdf::Document as PdfDocument;
use std::path::Path;
use tracing::{debug, info, warn};

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    PlainText,
}

impl DocumentFormat {
    /// Detect the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(Self::Pdf),
            "txt" | "md" | "markdown" => Ok(Self::PlainText),
            _ => Err(RagError::extraction(format!(
                "unsupported document format: {}",
                path.display()
            ))),
        }
    }
}

/// Read a document from disk and return all recoverable text.
pub async fn extract_file(path: &Path) -> Result<String> {
    let format = DocumentFormat::from_path(path)?;
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        RagError::extraction(format!("failed to open {}: {}", path.display(), e))
    })?;

    debug!("Extracting {:?} document ({} bytes)", format, bytes.len());

    // PDF parsing is CPU-bound.
    let text = tokio::task::spawn_blocking(move || extract_bytes(&bytes, format))
        .await
        .map_err(|e| RagError::extraction(format!("extraction task failed: {}", e)))??;

    info!(
        path = %path.display(),
        chars = text.chars().count(),
        "Document text extracted"
    );
    Ok(text)
}

/// Extract text from an in-memory document of a known format.
pub fn extract_bytes(bytes: &[u8], format: DocumentFormat) -> Result<String> {
    let text = match format {
        DocumentFormat::Pdf => extract_pdf(bytes)?,
        DocumentFormat::PlainText => String::from_utf8_lossy(bytes).into_owned(),
    };

    ensure_text(text)
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    let pdf = PdfDocument::load_mem(bytes)
        .map_err(|e| RagError::extraction(format!("failed to load PDF: {}", e)))?;

    let pages = pdf.get_pages();
    debug!("PDF has {} pages", pages.len());

    let page_texts = pages
        .keys()
        .map(|page_num| (*page_num, pdf.extract_text(&[*page_num])));

    Ok(join_pages(page_texts))
}

/// Join page texts in page order, skipping pages that failed to extract.
fn join_pages<E: std::fmt::Display>(
    pages: impl IntoIterator<Item = (u32, std::result::Result<String, E>)>,
) -> String {
    let mut texts = Vec::new();

    for (page_num, result) in pages {
        match result {
            Ok(text) => texts.push(text),
            Err(e) => warn!(page = page_num, "Skipping page that failed to extract: {}", e),
        }
    }

    texts.join("\n")
}

fn ensure_text(text: String) -> Result<String> {
    if text.trim().is_empty() {
        return Err(RagError::extraction(
            "no text could be extracted from the document",
        ));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            DocumentFormat::from_path(&PathBuf::from("syllabus.PDF")).unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::from_path(&PathBuf::from("notes.md")).unwrap(),
            DocumentFormat::PlainText
        );
        assert!(matches!(
            DocumentFormat::from_path(&PathBuf::from("slides.pptx")),
            Err(RagError::Extraction(_))
        ));
        assert!(DocumentFormat::from_path(&PathBuf::from("README")).is_err());
    }

    #[test]
    fn test_failed_pages_are_skipped() {
        let pages = vec![
            (1, Ok("Week 1: Introduction".to_string())),
            (2, Err("bad content stream")),
            (3, Ok("Week 3: Grading".to_string())),
        ];

        assert_eq!(join_pages(pages), "Week 1: Introduction\nWeek 3: Grading");
    }

    #[test]
    fn test_whitespace_only_text_is_an_error() {
        let result = extract_bytes(b"  \n\t \n", DocumentFormat::PlainText);
        assert!(matches!(result, Err(RagError::Extraction(_))));
    }

    #[test]
    fn test_garbage_pdf_is_an_error() {
        let result = extract_bytes(b"definitely not a pdf", DocumentFormat::Pdf);
        assert!(matches!(result, Err(RagError::Extraction(_))));
    }

    #[tokio::test]
    async fn test_extract_plain_text_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("syllabus.txt");
        tokio::fs::write(&path, "Office hours: Tuesday 2pm\n").await.unwrap();

        let text = extract_file(&path).await.unwrap();
        assert_eq!(text, "Office hours: Tuesday 2pm\n");
    }

    #[tokio::test]
    async fn test_missing_file_is_an_extraction_error() {
        let temp_dir = tempdir().unwrap();
        let result = extract_file(&temp_dir.path().join("missing.pdf")).await;
        assert!(matches!(result, Err(RagError::Extraction(_))));
    }
}
