//! Default document loader: reads a file, extracts its text and chunks it.

use async_trait::async_trait;
use lopdf::Document;
use std::path::Path;

use super::chunking::chunk_text;
use super::types::DocumentError;
use crate::config::Config;

/// Text of a loaded document plus its token-bounded chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceDocument {
    /// Full extracted text.
    pub text: String,
    /// Chunks in document order.
    pub chunks: Vec<String>,
}

/// Turns a document path into text and chunks. Injected into the manager so tests can
/// substitute a deterministic stub.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Read, decode and chunk the document at `path`.
    async fn load_and_chunk(&self, path: &str) -> Result<SourceDocument, DocumentError>;
}

const TEXT_EXTENSIONS: [&str; 5] = ["txt", "md", "markdown", "csv", "json"];
const PDF_EXTENSION: &str = "pdf";

/// File-system loader for PDF and plain-text documents.
#[derive(Debug, Clone)]
pub struct FileService {
    chunk_size: usize,
    chunk_overlap: usize,
    tokenizer_model: String,
}

impl FileService {
    /// Loader with an explicit chunking budget.
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        tokenizer_model: impl Into<String>,
    ) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            tokenizer_model: tokenizer_model.into(),
        }
    }

    /// Loader using the configured chunking budget.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.chunk_size,
            config.chunk_overlap,
            config.tokenizer_model.clone(),
        )
    }

    fn decode(path: &str, bytes: Vec<u8>) -> Result<String, DocumentError> {
        let extension = Path::new(path)
            .extension()
            .and_then(|value| value.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if extension == PDF_EXTENSION {
            return pdf_text(path, &bytes);
        }
        if !TEXT_EXTENSIONS.contains(&extension.as_str()) {
            return Err(DocumentError::UnsupportedFormat(extension));
        }
        String::from_utf8(bytes).map_err(|_| DocumentError::InvalidEncoding(path.to_string()))
    }
}

/// Concatenate the text of every page, in page order.
fn pdf_text(path: &str, bytes: &[u8]) -> Result<String, DocumentError> {
    let pdf_error = |source: lopdf::Error| DocumentError::Pdf {
        path: path.to_string(),
        source,
    };
    let document = Document::load_mem(bytes).map_err(pdf_error)?;
    let pages = document.get_pages();
    let mut text = String::new();
    for page_number in pages.keys() {
        let page_text = document.extract_text(&[*page_number]).map_err(pdf_error)?;
        text.push_str(&page_text);
        if !text.ends_with('\n') {
            text.push('\n');
        }
    }
    tracing::debug!(path, pages = pages.len(), "Extracted PDF text");
    Ok(text)
}

#[async_trait]
impl DocumentLoader for FileService {
    async fn load_and_chunk(&self, path: &str) -> Result<SourceDocument, DocumentError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| DocumentError::Io {
                path: path.to_string(),
                source,
            })?;
        let text = Self::decode(path, bytes)?;
        if text.trim().is_empty() {
            return Err(DocumentError::Empty(path.to_string()));
        }

        let chunks = chunk_text(
            &text,
            self.chunk_size,
            self.chunk_overlap,
            &self.tokenizer_model,
        )?;
        tracing::info!(
            path,
            characters = text.len(),
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            overlap = self.chunk_overlap,
            "Document loaded"
        );
        Ok(SourceDocument { text, chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::chunking::WHITESPACE_TOKENIZER;
    use std::io::Write;

    fn service() -> FileService {
        FileService::new(3, 0, WHITESPACE_TOKENIZER)
    }

    fn write_temp(suffix: &str, contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("temp file");
        file.write_all(contents).expect("write");
        file
    }

    #[tokio::test]
    async fn text_file_is_loaded_and_chunked() {
        let file = write_temp(".txt", b"one two three four five");
        let path = file.path().to_string_lossy().into_owned();
        let document = service().load_and_chunk(&path).await.expect("document");
        assert_eq!(document.text, "one two three four five");
        assert_eq!(document.chunks, vec!["one two three", "four five"]);
    }

    /// Minimal PDF with one `Tj` text run per page.
    fn pdf_fixture(pages: &[&str]) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{Object, Stream, dictionary};

        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let font_id = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = document.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = document.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("encode content"),
            ));
            let page_id = document.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(page_id.into());
        }

        let page_count = i64::try_from(kids.len()).expect("page count");
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        document.save_to(&mut bytes).expect("save pdf");
        bytes
    }

    #[tokio::test]
    async fn pdf_pages_are_extracted_in_order_and_chunked() {
        let file = write_temp(
            ".pdf",
            &pdf_fixture(&["alpha beta gamma", "delta epsilon"]),
        );
        let path = file.path().to_string_lossy().into_owned();
        let document = service().load_and_chunk(&path).await.expect("document");

        let words: Vec<&str> = document.text.split_whitespace().collect();
        assert_eq!(words, vec!["alpha", "beta", "gamma", "delta", "epsilon"]);
        assert!(document.chunks.len() >= 2);
        let chunked: Vec<&str> = document
            .chunks
            .iter()
            .flat_map(|chunk| chunk.split_whitespace())
            .collect();
        assert_eq!(chunked, words);
    }

    #[tokio::test]
    async fn corrupt_pdf_reports_pdf_error() {
        let file = write_temp(".pdf", b"%PDF-1.7 truncated");
        let path = file.path().to_string_lossy().into_owned();
        let error = service().load_and_chunk(&path).await.unwrap_err();
        assert!(matches!(error, DocumentError::Pdf { .. }));
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let file = write_temp(".docx", b"PK");
        let path = file.path().to_string_lossy().into_owned();
        let error = service().load_and_chunk(&path).await.unwrap_err();
        assert!(matches!(error, DocumentError::UnsupportedFormat(ext) if ext == "docx"));
    }

    #[tokio::test]
    async fn blank_document_is_rejected() {
        let file = write_temp(".md", b"  \n\t");
        let path = file.path().to_string_lossy().into_owned();
        let error = service().load_and_chunk(&path).await.unwrap_err();
        assert!(matches!(error, DocumentError::Empty(_)));
    }

    #[tokio::test]
    async fn missing_file_reports_io_error() {
        let error = service()
            .load_and_chunk("/definitely/not/here.txt")
            .await
            .unwrap_err();
        assert!(matches!(error, DocumentError::Io { .. }));
    }

    #[tokio::test]
    async fn non_utf8_text_is_rejected() {
        let file = write_temp(".txt", &[0xff, 0xfe, 0x00]);
        let path = file.path().to_string_lossy().into_owned();
        let error = service().load_and_chunk(&path).await.unwrap_err();
        assert!(matches!(error, DocumentError::InvalidEncoding(_)));
    }
}
