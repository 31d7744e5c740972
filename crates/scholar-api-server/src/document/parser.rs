use anyhow::{anyhow, Context, Result};
use encoding_rs::UTF_8;
use lopdf::Document as PdfDocument;
use std::io::{Cursor, Read};
use tracing::{debug, warn};

const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Upload kinds the assistant recognizes. Anything else is silently ignored
/// by the upload surface (no context set, no error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    PlainText,
    Jpeg,
    Png,
}

impl DocumentKind {
    /// Detect the kind by content sniffing first, filename extension second.
    /// Plain text has no magic bytes, so it is only ever matched by name.
    pub fn detect(file_name: &str, data: &[u8]) -> Option<Self> {
        if let Some(sniffed) = infer::get(data) {
            match sniffed.mime_type() {
                "application/pdf" => return Some(Self::Pdf),
                DOCX_MIME => return Some(Self::Docx),
                "image/jpeg" => return Some(Self::Jpeg),
                "image/png" => return Some(Self::Png),
                // A bare zip can still be a docx with an unusual layout;
                // fall through to the extension check.
                "application/zip" => {}
                _ => return None,
            }
        }

        let guess = mime_guess::from_path(file_name).first()?;
        if guess == mime_guess::mime::APPLICATION_PDF {
            Some(Self::Pdf)
        } else if guess.essence_str() == DOCX_MIME {
            Some(Self::Docx)
        } else if guess.type_() == mime_guess::mime::TEXT {
            Some(Self::PlainText)
        } else if guess.essence_str() == "image/jpeg" {
            Some(Self::Jpeg)
        } else if guess.essence_str() == "image/png" {
            Some(Self::Png)
        } else {
            None
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Png)
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => DOCX_MIME,
            Self::PlainText => "text/plain",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::PlainText => "text",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }
}

pub struct DocumentParser;

impl DocumentParser {
    /// Extract plain text from an uploaded document. Images are never
    /// text-extracted; they travel as data URIs on the ask request instead.
    pub fn extract(kind: DocumentKind, data: &[u8]) -> Result<String> {
        debug!("Extracting text ({}, {} bytes)", kind.label(), data.len());

        match kind {
            DocumentKind::Pdf => Self::extract_pdf(data),
            DocumentKind::Docx => Self::extract_docx(data),
            DocumentKind::PlainText => Ok(Self::decode_text(data)),
            DocumentKind::Jpeg | DocumentKind::Png => {
                Err(anyhow!("images are not text-extracted"))
            }
        }
    }

    /// Per-page text joined with newlines. A page whose extraction fails
    /// contributes nothing; that is not an error for the document as a whole.
    fn extract_pdf(data: &[u8]) -> Result<String> {
        let doc = PdfDocument::load_mem(data).context("Failed to load PDF")?;
        let pages = doc.get_pages();

        let mut content = String::new();
        for (page_num, _) in pages.iter() {
            match doc.extract_text(&[*page_num]) {
                Ok(text) => {
                    content.push_str(&text);
                    content.push('\n');
                }
                Err(e) => {
                    warn!("Failed to extract text from page {}: {}", page_num, e);
                }
            }
        }

        Ok(content)
    }

    /// A docx is a zip; the paragraph text lives in `word/document.xml`.
    /// Paragraph close tags become newline separators.
    fn extract_docx(data: &[u8]) -> Result<String> {
        let mut archive =
            zip::ZipArchive::new(Cursor::new(data)).context("Failed to open DOCX as archive")?;
        let mut xml_file = archive
            .by_name("word/document.xml")
            .context("DOCX has no word/document.xml")?;

        let mut xml = String::new();
        xml_file
            .read_to_string(&mut xml)
            .context("Failed to read document.xml")?;

        Ok(Self::paragraph_text_from_xml(&xml))
    }

    fn decode_text(bytes: &[u8]) -> String {
        if let Ok(text) = std::str::from_utf8(bytes) {
            return text.to_string();
        }
        let (decoded, _, _) = UTF_8.decode(bytes);
        decoded.into_owned()
    }

    /// Strip tags, turning each `</w:p>` into a paragraph break.
    fn paragraph_text_from_xml(xml: &str) -> String {
        let mut raw = String::new();
        let mut tag = String::new();
        let mut inside_tag = false;

        for c in xml.chars() {
            if c == '<' {
                inside_tag = true;
                tag.clear();
            } else if c == '>' {
                inside_tag = false;
                if tag == "/w:p" {
                    raw.push('\n');
                }
            } else if inside_tag {
                if tag.len() < 8 {
                    tag.push(c);
                }
            } else {
                raw.push(c);
            }
        }

        let cleaned = raw
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Self::unescape_xml_entities(&cleaned)
    }

    /// The predefined XML entities survive tag stripping; decode them so
    /// "A &amp; B" reaches the context blob as "A & B".
    /// `&amp;` goes last so `&amp;lt;` decodes to the literal `&lt;`.
    fn unescape_xml_entities(text: &str) -> String {
        text.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&")
    }
}
