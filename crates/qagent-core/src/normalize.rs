//! Converts heterogeneous input documents into plain UTF-8 text.
//!
//! Structural markup (headings, list bullets, emphasis, tags) collapses into
//! plain lines. A document that only partly parses still yields the text that
//! was recovered, with a note in `Normalized::warnings`.

use pulldown_cmark::{Event, Parser as MdParser, Tag, TagEnd};
use scraper::{ElementRef, Html};
use serde_json::Value;
use std::borrow::Cow;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{Document, DocumentFormat};

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "label",
    "li", "main", "nav", "ol", "option", "p", "pre", "section", "table", "td", "th", "title", "tr",
    "ul", "button",
];

/// One submitted input file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub filename: String,
    pub bytes: Vec<u8>,
    /// Overrides extension-based detection when set.
    pub declared: Option<DocumentFormat>,
}

impl SourceFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { filename: filename.into(), bytes: bytes.into(), declared: None }
    }

    pub fn with_format(mut self, format: DocumentFormat) -> Self {
        self.declared = Some(format);
        self
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self::new(filename, bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub format: DocumentFormat,
    pub text: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalizes `file` and wraps the result into a `Document` keyed by filename.
    pub fn document(&self, file: &SourceFile) -> Result<Document> {
        let normalized = self.normalize(file)?;
        Ok(Document {
            id: file.filename.clone(),
            filename: file.filename.clone(),
            format: normalized.format,
            text: normalized.text,
            content_hash: blake3::hash(&file.bytes).to_hex().to_string(),
            byte_len: file.bytes.len(),
            warnings: normalized.warnings,
        })
    }

    pub fn normalize(&self, file: &SourceFile) -> Result<Normalized> {
        let format = detect_format(&file.filename, &file.bytes, file.declared)?;
        let mut warnings = Vec::new();

        let text = match format {
            DocumentFormat::Pdf => pdf_to_text(&file.filename, &file.bytes, &mut warnings)?,
            _ => {
                let (decoded, lossy) = decode_body(&file.bytes);
                if lossy {
                    warnings.push("input was not valid UTF-8; invalid sequences were replaced".to_string());
                }
                match format {
                    DocumentFormat::Markdown => markdown_to_text(&decoded),
                    DocumentFormat::Html => html_to_text(&decoded, &mut warnings),
                    DocumentFormat::Json => json_to_text(&decoded, &mut warnings),
                    _ => decoded.into_owned(),
                }
            }
        };

        let text = tidy_lines(&text);
        if text.is_empty() {
            warnings.push("no text content was extracted".to_string());
        }
        for w in &warnings {
            tracing::warn!(file = %file.filename, warning = %w, "partial normalization");
        }
        Ok(Normalized { format, text, warnings })
    }
}

/// Declared format wins, then the file extension, then content sniffing for
/// extension-less names.
pub fn detect_format(filename: &str, bytes: &[u8], declared: Option<DocumentFormat>) -> Result<DocumentFormat> {
    if let Some(format) = declared {
        return Ok(format);
    }
    match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some(ext) => DocumentFormat::from_extension(ext)
            .ok_or_else(|| Error::UnsupportedFormat(format!("{filename}: unrecognized extension .{ext}"))),
        None => sniff_format(bytes)
            .ok_or_else(|| Error::UnsupportedFormat(format!("{filename}: cannot determine format"))),
    }
}

fn sniff_format(bytes: &[u8]) -> Option<DocumentFormat> {
    if bytes.starts_with(b"%PDF") {
        return Some(DocumentFormat::Pdf);
    }
    let text = std::str::from_utf8(bytes).ok()?;
    if text.contains('\0') {
        return None;
    }
    let head = text.trim_start();
    if (head.starts_with('{') || head.starts_with('[')) && serde_json::from_str::<Value>(text).is_ok() {
        return Some(DocumentFormat::Json);
    }
    let lower = head.chars().take(512).collect::<String>().to_ascii_lowercase();
    if lower.starts_with("<!doctype html") || lower.contains("<html") {
        return Some(DocumentFormat::Html);
    }
    Some(DocumentFormat::PlainText)
}

fn decode_body(bytes: &[u8]) -> (Cow<'_, str>, bool) {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(s) => (Cow::Borrowed(s), false),
        Cow::Owned(s) => (Cow::Owned(s), true),
    }
}

fn markdown_to_text(src: &str) -> String {
    let mut out = String::new();
    let mut line = String::new();
    for event in MdParser::new(src) {
        match event {
            Event::Text(text) | Event::Code(text) => line.push_str(&text),
            Event::SoftBreak => line.push(' '),
            Event::HardBreak | Event::Rule | Event::Start(Tag::Item) => flush_line(&mut line, &mut out),
            Event::End(
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::CodeBlock | TagEnd::BlockQuote(_),
            ) => flush_line(&mut line, &mut out),
            _ => {}
        }
    }
    flush_line(&mut line, &mut out);
    out
}

fn flush_line(line: &mut String, out: &mut String) {
    let trimmed = line.trim();
    if !trimmed.is_empty() {
        out.push_str(trimmed);
        out.push('\n');
    }
    line.clear();
}

fn html_to_text(src: &str, warnings: &mut Vec<String>) -> String {
    let document = Html::parse_document(src);
    if !document.errors.is_empty() {
        warnings.push(format!("html parser recovered from {} markup error(s)", document.errors.len()));
    }
    let mut out = String::new();
    walk_html(document.root_element(), &mut out);
    out
}

fn walk_html(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_TAGS.contains(&name) {
        return;
    }
    let block = BLOCK_TAGS.contains(&name);
    if block {
        out.push('\n');
    }
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(el) = ElementRef::wrap(child) {
            walk_html(el, out);
        }
    }
    if block {
        out.push('\n');
    }
}

fn json_to_text(src: &str, warnings: &mut Vec<String>) -> String {
    match serde_json::from_str::<Value>(src) {
        Ok(value) => {
            let mut lines = Vec::new();
            flatten_json(&value, &mut lines);
            lines.join("\n")
        }
        Err(e) => {
            warnings.push(format!("malformed JSON ({e}); kept raw text"));
            src.to_string()
        }
    }
}

/// Nested containers become a `key:` header line followed by their members.
fn flatten_json(value: &Value, lines: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                match v {
                    Value::Object(_) | Value::Array(_) => {
                        lines.push(format!("{key}:"));
                        flatten_json(v, lines);
                    }
                    scalar => lines.push(format!("{key}: {}", scalar_text(scalar))),
                }
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Object(_) | Value::Array(_) => {
                        lines.push(format!("Item {}:", i + 1));
                        flatten_json(item, lines);
                    }
                    scalar => lines.push(format!("Item {}: {}", i + 1, scalar_text(scalar))),
                }
            }
        }
        scalar => lines.push(scalar_text(scalar)),
    }
}

fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn pdf_to_text(filename: &str, bytes: &[u8], warnings: &mut Vec<String>) -> Result<String> {
    // The extractor panics on some malformed inputs instead of returning an error.
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| Error::UnsupportedFormat(format!("{filename}: unreadable PDF (extractor aborted)")))?;
    let text = extracted.map_err(|e| Error::UnsupportedFormat(format!("{filename}: unreadable PDF ({e})")))?;
    if text.trim().is_empty() {
        warnings.push("PDF contains no extractable text layer".to_string());
    }
    Ok(text)
}

/// Collapses intra-line whitespace, drops blank lines and normalizes line endings.
fn tidy_lines(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for raw in input.lines() {
        let mut line = String::new();
        for word in raw.split_whitespace() {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        if line.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(name: &str, body: &str) -> Normalized {
        Normalizer::new().normalize(&SourceFile::new(name, body.as_bytes().to_vec())).expect("normalize")
    }

    #[test]
    fn markdown_markers_collapse() {
        let n = normalize("rules.md", "# Discounts\n\n* **SAVE10** provides $10.00 off\n* `FREESHIP` waives shipping\n");
        assert_eq!(n.format, DocumentFormat::Markdown);
        assert_eq!(n.text, "Discounts\nSAVE10 provides $10.00 off\nFREESHIP waives shipping");
        assert!(n.warnings.is_empty());
    }

    #[test]
    fn html_skips_scripts_and_keeps_blocks() {
        let n = normalize(
            "page.html",
            "<!DOCTYPE html><html><head><title>Shop</title><style>p{}</style></head><body><h1>Cart</h1><p>Total   is <b>$5</b></p><script>var x=1;</script></body></html>",
        );
        assert_eq!(n.text, "Shop\nCart\nTotal is $5");
    }

    #[test]
    fn json_flattens_nested_records() {
        let n = normalize("cfg.json", r#"{"shipping": {"express": 10, "standard": 0}, "codes": ["SAVE10", "SAVE20"]}"#);
        assert_eq!(n.text, "codes:\nItem 1: SAVE10\nItem 2: SAVE20\nshipping:\nexpress: 10\nstandard: 0");
    }

    #[test]
    fn malformed_json_keeps_raw_text_with_warning() {
        let n = normalize("broken.json", "{\"a\": 1,");
        assert_eq!(n.text, "{\"a\": 1,");
        assert_eq!(n.warnings.len(), 1);
    }

    #[test]
    fn invalid_utf8_is_lossy_with_warning() {
        let file = SourceFile::new("notes.txt", vec![b'o', b'k', 0xff, b'!']);
        let n = Normalizer::new().normalize(&file).expect("normalize");
        assert_eq!(n.text, "ok\u{fffd}!");
        assert!(n.warnings.iter().any(|w| w.contains("UTF-8")));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = Normalizer::new().normalize(&SourceFile::new("tool.exe", vec![0u8, 1, 2])).expect_err("unsupported");
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn extensionless_input_is_sniffed() {
        assert_eq!(detect_format("README", b"[1,2]", None).expect("json"), DocumentFormat::Json);
        assert_eq!(detect_format("page", b"<!doctype html><p>x</p>", None).expect("html"), DocumentFormat::Html);
        assert_eq!(detect_format("blob", b"%PDF-1.7", None).expect("pdf"), DocumentFormat::Pdf);
        assert!(detect_format("blob", &[0xff, 0xfe, 0x00], None).is_err());
    }

    #[test]
    fn document_id_is_filename_and_hash_is_stable() {
        let file = SourceFile::new("a.txt", b"hello".to_vec());
        let a = Normalizer::new().document(&file).expect("doc");
        let b = Normalizer::new().document(&file).expect("doc");
        assert_eq!(a.id, "a.txt");
        assert_eq!(a, b);
    }
}
