//! Text extraction from uploaded documents.
//!
//! Dispatch is by file extension: `.pdf` is read with `lopdf`, `.docx` is
//! opened as the zip container it is and the text runs are pulled out of
//! `word/document.xml`. Anything else, and any document whose content cannot
//! be produced, is rejected as unsupported.

use std::io::Read;

use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;

/// Document formats this service can ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
}

impl DocumentFormat {
    /// Resolves the format from a filename extension, case-insensitively.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, extension) = filename.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    /// Short label used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

/// Extraction failures. All of them mean the document cannot be ingested;
/// none of them is retried.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document type {filename:?}: only .pdf and .docx sources are readable")]
    UnsupportedExtension { filename: String },
    #[error("unreadable {format} document: {message}")]
    Unreadable {
        format: &'static str,
        message: String,
    },
    #[error("document produced no extractable text")]
    EmptyDocument,
}

impl ExtractError {
    fn unreadable(format: DocumentFormat, message: impl ToString) -> Self {
        Self::Unreadable {
            format: format.label(),
            message: message.to_string(),
        }
    }
}

/// Extracts the full text of `bytes`, dispatching on the extension of
/// `filename`. Documents that parse but contain no text at all are rejected,
/// since there is nothing to chunk or retrieve against.
pub fn extract_text(filename: &str, bytes: &[u8]) -> Result<String, ExtractError> {
    let format = DocumentFormat::from_filename(filename).ok_or_else(|| {
        ExtractError::UnsupportedExtension {
            filename: filename.to_string(),
        }
    })?;
    let text = match format {
        DocumentFormat::Pdf => pdf_text(bytes)?,
        DocumentFormat::Docx => docx_text(bytes)?,
    };
    if text.trim().is_empty() {
        return Err(ExtractError::EmptyDocument);
    }
    Ok(text)
}

fn pdf_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let document = lopdf::Document::load_mem(bytes)
        .map_err(|err| ExtractError::unreadable(DocumentFormat::Pdf, err))?;
    let pages: Vec<u32> = document.get_pages().keys().copied().collect();
    document
        .extract_text(&pages)
        .map_err(|err| ExtractError::unreadable(DocumentFormat::Pdf, err))
}

/// A `.docx` file is a zip archive; the document body lives in
/// `word/document.xml`. Text is carried by `<w:t>` runs, paragraphs end at
/// `</w:p>`, and explicit breaks/tabs have their own empty elements.
fn docx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|err| ExtractError::unreadable(DocumentFormat::Docx, err))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|err| ExtractError::unreadable(DocumentFormat::Docx, err))?
        .read_to_string(&mut xml)
        .map_err(|err| ExtractError::unreadable(DocumentFormat::Docx, err))?;

    let mut reader = Reader::from_str(&xml);
    let mut out = String::new();
    let mut in_text_run = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                if element.local_name().as_ref() == b"t" {
                    in_text_run = true;
                }
            }
            Ok(Event::Text(text)) if in_text_run => {
                let unescaped = text
                    .unescape()
                    .map_err(|err| ExtractError::unreadable(DocumentFormat::Docx, err))?;
                out.push_str(&unescaped);
            }
            Ok(Event::End(element)) => match element.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(element)) => match element.local_name().as_ref() {
                b"br" | b"cr" => out.push('\n'),
                b"tab" => out.push('\t'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => return Err(ExtractError::unreadable(DocumentFormat::Docx, err)),
            Ok(_) => {}
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Builds an in-memory `.docx` whose body is the given document XML.
    fn docx_bytes(document_xml: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(document_xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn rejects_unknown_extensions() {
        let err = extract_text("notes.txt", b"plain text").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedExtension { .. }));

        let err = extract_text("no_extension", b"").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedExtension { .. }));
    }

    #[test]
    fn extension_dispatch_is_case_insensitive() {
        assert_eq!(
            DocumentFormat::from_filename("Contract.PDF"),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::from_filename("report.Docx"),
            Some(DocumentFormat::Docx)
        );
        assert_eq!(DocumentFormat::from_filename("notes.txt"), None);
    }

    #[test]
    fn garbage_pdf_bytes_are_unreadable() {
        let err = extract_text("broken.pdf", b"not a pdf at all").unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Unreadable { format: "pdf", .. }
        ));
    }

    #[test]
    fn garbage_docx_bytes_are_unreadable() {
        let err = extract_text("broken.docx", b"not a zip archive").unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Unreadable { format: "docx", .. }
        ));
    }

    #[test]
    fn docx_without_document_xml_is_unreadable() {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file("other.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"<x/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = extract_text("report.docx", &bytes).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Unreadable { format: "docx", .. }
        ));
    }

    #[test]
    fn docx_text_runs_and_paragraphs() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>The effective date is</w:t></w:r><w:r><w:t xml:space="preserve"> March 1.</w:t></w:r></w:p>
    <w:p><w:r><w:t>Termination requires 30 days notice.</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let text = extract_text("contract.docx", &docx_bytes(xml)).unwrap();
        assert_eq!(
            text,
            "The effective date is March 1.\nTermination requires 30 days notice.\n"
        );
    }

    #[test]
    fn docx_breaks_tabs_and_entities() {
        let xml = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Terms &amp; Conditions</w:t><w:br/><w:t>Part</w:t><w:tab/><w:t>Two</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let text = extract_text("contract.docx", &docx_bytes(xml)).unwrap();
        assert_eq!(text, "Terms & Conditions\nPart\tTwo\n");
    }

    #[test]
    fn empty_docx_body_is_rejected() {
        let xml = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body><w:p></w:p></w:body>
</w:document>"#;
        let err = extract_text("blank.docx", &docx_bytes(xml)).unwrap_err();
        assert!(matches!(err, ExtractError::EmptyDocument));
    }
}
