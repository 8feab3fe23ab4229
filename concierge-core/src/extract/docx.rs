//! Word (OOXML) text extraction.
//!
//! A `.docx` file is a zip package; the body lives in `word/document.xml`.
//! Each `<w:p>` paragraph becomes one line of output.

use super::ExtractError;
use regex::Regex;
use std::io::{Cursor, Read};
use std::sync::OnceLock;

const DOCUMENT_PART: &str = "word/document.xml";

/// Paragraph open/close/empty tags plus the run-level pieces that carry text.
fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"<w:p(?:\s[^>]*)?/>|<w:p(?:\s[^>]*)?>|</w:p>|<w:t(?:\s[^>]*)?>([^<]*)</w:t>|<w:tab/>|<w:br(?:\s[^>]*)?/>",
        )
        .expect("token pattern is valid")
    })
}

pub(super) fn extract_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Archive(e.to_string()))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|_| ExtractError::MissingPart(DOCUMENT_PART))?
        .read_to_string(&mut xml)?;

    let mut text = String::new();
    for paragraph in paragraphs(&xml) {
        text.push_str(&paragraph);
        text.push('\n');
    }
    Ok(text)
}

/// Plain text of every paragraph, ordered by where each paragraph opens.
///
/// Paragraphs nest inside text boxes (`w:txbxContent`); a nested paragraph
/// becomes its own line and the enclosing one keeps the runs around it.
fn paragraphs(xml: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    for cap in token_re().captures_iter(xml) {
        let tag = &cap[0];
        let current = open.last().copied();
        if let Some(text) = cap.get(1) {
            if let Some(i) = current {
                out[i].push_str(&unescape_xml(text.as_str()));
            }
        } else if tag == "</w:p>" {
            open.pop();
        } else if tag.starts_with("<w:p") {
            out.push(String::new());
            if !tag.ends_with("/>") {
                open.push(out.len() - 1);
            }
        } else if let Some(i) = current {
            out[i].push(if tag.starts_with("<w:tab") { '\t' } else { '\n' });
        }
    }
    out
}

fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };

        let entity = &tail[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&tail[..=end]),
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}
