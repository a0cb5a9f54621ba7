//! Blocking document parser: format sniffing by extension, text extraction,
//! and a paragraph-packing chunker. Runs on a blocking thread via the store.

use std::path::Path;

use thiserror::Error;

/// Character budget per chunk. Paragraphs are packed until the budget is
/// exceeded; a single oversize paragraph is split at the budget boundary.
const CHUNK_CHAR_BUDGET: usize = 1200;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("unsupported document format '{0}'")]
    UnsupportedFormat(String),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("pdf extraction failed: {0}")]
    Pdf(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    PlainText,
    Markdown,
    Pdf,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Result<Self, ParseError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "txt" | "text" | "log" => Ok(DocumentFormat::PlainText),
            "md" | "markdown" => Ok(DocumentFormat::Markdown),
            "pdf" => Ok(DocumentFormat::Pdf),
            _ => Err(ParseError::UnsupportedFormat(ext)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::PlainText => "text",
            DocumentFormat::Markdown => "markdown",
            DocumentFormat::Pdf => "pdf",
        }
    }
}

#[derive(Debug)]
pub struct ParsedDocument {
    pub format: DocumentFormat,
    pub chunks: Vec<String>,
}

/// Read and chunk a local document. Empty documents parse to zero chunks.
pub fn parse_file(path: &Path) -> Result<ParsedDocument, ParseError> {
    let format = DocumentFormat::from_path(path)?;

    let text = match format {
        DocumentFormat::Pdf => {
            pdf_extract::extract_text(path).map_err(|e| ParseError::Pdf(e.to_string()))?
        }
        DocumentFormat::PlainText | DocumentFormat::Markdown => {
            std::fs::read_to_string(path).map_err(|source| ParseError::Io {
                path: path.display().to_string(),
                source,
            })?
        }
    };

    Ok(ParsedDocument {
        format,
        chunks: chunk_text(&text, CHUNK_CHAR_BUDGET),
    })
}

/// Pack paragraphs into chunks of at most `budget` characters. Oversize
/// paragraphs are split at character boundaries.
pub fn chunk_text(text: &str, budget: usize) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in normalized.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if paragraph.len() > budget {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.extend(split_oversize(paragraph, budget));
            continue;
        }

        if !current.is_empty() && current.len() + paragraph.len() + 2 > budget {
            chunks.push(std::mem::take(&mut current));
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn split_oversize(paragraph: &str, budget: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();

    for c in paragraph.chars() {
        piece.push(c);
        if piece.len() >= budget {
            pieces.push(std::mem::take(&mut piece));
        }
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }

    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a.txt")).unwrap(),
            DocumentFormat::PlainText
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("README.MD")).unwrap(),
            DocumentFormat::Markdown
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("doc.pdf")).unwrap(),
            DocumentFormat::Pdf
        );
    }

    #[test]
    fn test_unsupported_extension_is_an_error() {
        assert!(matches!(
            DocumentFormat::from_path(Path::new("archive.zip")),
            Err(ParseError::UnsupportedFormat(_))
        ));
        assert!(DocumentFormat::from_path(Path::new("no_extension")).is_err());
    }

    #[test]
    fn test_chunk_text_packs_paragraphs() {
        let text = "first paragraph\n\nsecond paragraph\n\nthird paragraph";
        let chunks = chunk_text(text, 1200);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("first paragraph"));
        assert!(chunks[0].contains("third paragraph"));
    }

    #[test]
    fn test_chunk_text_respects_budget() {
        let text = format!("{}\n\n{}", "a".repeat(30), "b".repeat(30));
        let chunks = chunk_text(&text, 40);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(30));
        assert_eq!(chunks[1], "b".repeat(30));
    }

    #[test]
    fn test_chunk_text_splits_oversize_paragraph() {
        let text = "x".repeat(100);
        let chunks = chunk_text(&text, 40);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 40);
        assert_eq!(chunks[2].len(), 20);
    }

    #[test]
    fn test_chunk_text_empty_input() {
        assert!(chunk_text("", 1200).is_empty());
        assert!(chunk_text("\n\n\n\n", 1200).is_empty());
    }

    #[test]
    fn test_parse_markdown_file() {
        let mut file = tempfile::Builder::new().suffix(".md").tempfile().unwrap();
        writeln!(file, "# Title\n\nSome body text.").unwrap();

        let parsed = parse_file(file.path()).unwrap();
        assert_eq!(parsed.format, DocumentFormat::Markdown);
        assert_eq!(parsed.chunks.len(), 1);
        assert!(parsed.chunks[0].contains("# Title"));
    }

    #[test]
    fn test_parse_empty_file_yields_zero_chunks() {
        let file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        let parsed = parse_file(file.path()).unwrap();
        assert!(parsed.chunks.is_empty());
    }
}
