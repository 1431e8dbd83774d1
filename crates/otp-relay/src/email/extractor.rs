//! One-time passcode extraction from email bodies.
//!
//! HTML is flattened to text one line per text node, which is what survives
//! best across the table-heavy markup transactional emails use. The first
//! standalone six-digit run is taken as the passcode, and the first table in
//! document order that contains it (the outermost one), or failing that a
//! short div, becomes the context shown to recipients.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use kuchiki::iter::NodeIterator;
use kuchiki::traits::TendrilSink;
use kuchiki::NodeRef;
use log::{debug, error, warn};
use regex::Regex;

/// Characters of surrounding text kept on each side of the code when no
/// enclosing container qualifies.
pub const CONTEXT_RADIUS: usize = 100;

/// Divs at or above this many characters are too broad to serve as context.
pub const MAX_BLOCK_CONTEXT_CHARS: usize = 500;

/// Elements whose text is never part of the rendered page.
const HIDDEN_ELEMENTS: &[&str] = &["head", "script", "style", "title", "noscript"];

/// Outcome of scanning one body for a passcode.
///
/// `otp_code` and `otp_context` are present exactly when a code was found;
/// the constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    full_text: String,
    otp: Option<Otp>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Otp {
    code: String,
    context: String,
}

impl ExtractionResult {
    pub fn found(full_text: String, code: String, context: String) -> Self {
        Self {
            full_text,
            otp: Some(Otp { code, context }),
        }
    }

    pub fn not_found(full_text: String) -> Self {
        Self {
            full_text,
            otp: None,
        }
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn otp_found(&self) -> bool {
        self.otp.is_some()
    }

    pub fn otp_code(&self) -> Option<&str> {
        self.otp.as_ref().map(|o| o.code.as_str())
    }

    pub fn otp_context(&self) -> Option<&str> {
        self.otp.as_ref().map(|o| o.context.as_str())
    }
}

fn otp_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\b[0-9]{6}\b").expect("valid OTP regex"))
}

/// Extracts the passcode from a body of either kind.
pub fn extract(content: &str, is_html: bool) -> ExtractionResult {
    if is_html {
        extract_from_html(content)
    } else {
        extract_from_text(content)
    }
}

/// Extracts the passcode from an HTML body. Never fails: a parser fault
/// yields a result without a code and a diagnostic `full_text`.
pub fn extract_from_html(html: &str) -> ExtractionResult {
    match catch_unwind(AssertUnwindSafe(|| extract_html_inner(html))) {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown parser failure".to_string());
            error!("Error extracting content from HTML: {}", reason);
            ExtractionResult::not_found(format!("Error extracting content: {}", reason))
        }
    }
}

/// Extracts the passcode from a plain-text body.
pub fn extract_from_text(text: &str) -> ExtractionResult {
    let full_text = normalize_lines(text.lines());
    match find_code(&full_text) {
        Some((start, end)) => {
            let code = full_text[start..end].to_string();
            // Window centred on the standalone match, not the first textual
            // occurrence of the digits.
            let context = char_window(&full_text, start, end, CONTEXT_RADIUS).to_string();
            ExtractionResult::found(full_text, code, context)
        }
        None => ExtractionResult::not_found(full_text),
    }
}

fn extract_html_inner(html: &str) -> ExtractionResult {
    let document = kuchiki::parse_html().one(html);
    let full_text = node_text(&document);

    let Some((start, end)) = find_code(&full_text) else {
        debug!("No OTP code found in {} chars of text", full_text.len());
        return ExtractionResult::not_found(full_text);
    };

    let code = full_text[start..end].to_string();
    // Fallback window is centred on the standalone match, not the first
    // textual occurrence of the digits.
    let context = refine_context(&document, &code)
        .unwrap_or_else(|| char_window(&full_text, start, end, CONTEXT_RADIUS).to_string());

    ExtractionResult::found(full_text, code, context)
}

/// Looks for an enclosing container whose text reads better than a raw
/// character window. Tables win over divs; divs must be short.
fn refine_context(document: &NodeRef, code: &str) -> Option<String> {
    let attempt = catch_unwind(AssertUnwindSafe(|| {
        if let Some(text) = first_container_with(document, "table", code, None) {
            return Some(text);
        }
        first_container_with(document, "div", code, Some(MAX_BLOCK_CONTEXT_CHARS))
    }));

    match attempt {
        Ok(context) => context,
        Err(_) => {
            warn!("Context refinement failed, falling back to text window");
            None
        }
    }
}

fn first_container_with(
    document: &NodeRef,
    selector: &str,
    code: &str,
    max_chars: Option<usize>,
) -> Option<String> {
    let containers = document.select(selector).ok()?;
    containers
        .map(|element| node_text(element.as_node()))
        .find(|text| {
            text.contains(code) && max_chars.map_or(true, |max| text.chars().count() < max)
        })
}

/// Visible text of `node`: every non-blank text node trimmed and placed on
/// its own line.
fn node_text(node: &NodeRef) -> String {
    let texts: Vec<String> = node
        .descendants()
        .text_nodes()
        .filter(|text| !is_hidden(text.as_node()))
        .map(|text| text.borrow().clone())
        .collect();
    normalize_lines(texts.iter().map(String::as_str))
}

fn is_hidden(node: &NodeRef) -> bool {
    node.ancestors().any(|ancestor| {
        ancestor
            .as_element()
            .is_some_and(|element| HIDDEN_ELEMENTS.contains(&&*element.name.local))
    })
}

fn normalize_lines<'a>(pieces: impl Iterator<Item = &'a str>) -> String {
    pieces
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Byte range of the first six-digit run not adjacent to other word
/// characters.
fn find_code(text: &str) -> Option<(usize, usize)> {
    otp_regex().find(text).map(|m| (m.start(), m.end()))
}

/// Slice of `text` extending `radius` characters either side of
/// `start..end`, clamped to the text and to char boundaries.
fn char_window(text: &str, start: usize, end: usize, radius: usize) -> &str {
    let before: Vec<usize> = text[..start].char_indices().map(|(i, _)| i).collect();
    let from = if before.len() > radius {
        before[before.len() - radius]
    } else {
        0
    };
    let to = text[end..]
        .char_indices()
        .nth(radius)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());
    &text[from..to]
}
