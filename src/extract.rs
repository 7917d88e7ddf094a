//! Document loading for uploaded files.
//!
//! [`FileLoader`] is the production [`DocumentLoader`]: it reads a stored
//! upload and dispatches on its lower-cased extension. PDF text comes from
//! `pdf-extract`; Word documents are OOXML ZIP archives whose
//! `word/document.xml` is scanned for `w:t` runs, one line per paragraph.
//! Legacy `.doc` uploads go through the same OOXML path, so only `.doc`
//! files that are really OOXML load successfully.

use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use quick_xml::events::Event;
use thiserror::Error;

use rag_chat_core::error::RagError;
use rag_chat_core::loader::{file_extension, DocumentLoader};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("Word extraction failed: {0}")]
    Ooxml(String),
}

/// Reads `.pdf`, `.txt`, `.docx` and `.doc` files from disk.
#[derive(Debug, Default, Clone)]
pub struct FileLoader;

impl FileLoader {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Clone, Copy)]
enum Format {
    Pdf,
    Text,
    Word,
}

#[async_trait]
impl DocumentLoader for FileLoader {
    async fn load(&self, path: &Path) -> Result<String, RagError> {
        let ext = file_extension(&path.to_string_lossy());
        let format = match ext.as_str() {
            ".pdf" => Format::Pdf,
            ".txt" => Format::Text,
            ".docx" | ".doc" => Format::Word,
            _ => return Err(RagError::UnsupportedFormat { extension: ext }),
        };

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RagError::Load(format!("{}: {}", path.display(), e)))?;

        // Parsing is CPU-bound; keep it off the async workers.
        tokio::task::spawn_blocking(move || match format {
            Format::Text => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Format::Pdf => extract_pdf(&bytes).map_err(|e| RagError::Load(e.to_string())),
            Format::Word => extract_docx(&bytes).map_err(|e| RagError::Load(e.to_string())),
        })
        .await
        .map_err(|e| RagError::Load(format!("extraction task failed: {}", e)))?
    }
}

pub fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Ooxml("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    extract_paragraphs(&doc_xml)
}

/// Collect `w:t` text, ending each `w:p` paragraph with a newline.
fn extract_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" => out.push('\n'),
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", p))
            .collect();
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let text = extract_docx(&docx_with_paragraphs(&["First line", "Second &amp; last"])).unwrap();
        assert_eq!(text, "First line\nSecond & last");
    }

    #[test]
    fn docx_without_document_xml_is_an_error() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        assert!(matches!(extract_docx(&buf), Err(ExtractError::Ooxml(_))));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_pdf(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_docx(b"not a zip").unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[tokio::test]
    async fn loader_dispatches_on_extension() {
        let dir = TempDir::new().unwrap();
        let txt = dir.path().join("notes.TXT");
        std::fs::write(&txt, "plain text body").unwrap();
        let docx = dir.path().join("report.docx");
        std::fs::write(&docx, docx_with_paragraphs(&["word body"])).unwrap();

        let loader = FileLoader::new();
        assert_eq!(loader.load(&txt).await.unwrap(), "plain text body");
        assert_eq!(loader.load(&docx).await.unwrap(), "word body");
    }

    #[tokio::test]
    async fn loader_rejects_unknown_extension_before_reading() {
        let err = FileLoader::new()
            .load(Path::new("/definitely/missing/tool.exe"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::UnsupportedFormat { ref extension } if extension == ".exe"));
    }

    #[tokio::test]
    async fn corrupt_or_missing_files_are_load_errors() {
        let dir = TempDir::new().unwrap();
        let bad = dir.path().join("broken.pdf");
        std::fs::write(&bad, b"garbage").unwrap();

        let loader = FileLoader::new();
        assert!(matches!(loader.load(&bad).await, Err(RagError::Load(_))));
        assert!(matches!(
            loader.load(&dir.path().join("absent.txt")).await,
            Err(RagError::Load(_))
        ));
    }
}
