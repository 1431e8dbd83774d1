//! Flattens a parsed message into the parts the relay cares about.

use encoding_rs::Encoding;
use log::{debug, warn};
use mail_parser::decoders::base64::base64_decode;
use mail_parser::decoders::quoted_printable::quoted_printable_decode;
use mail_parser::{Encoding as TransferEncoding, Message, MessagePart, MimeHeaders, PartType};

/// A leaf of the MIME tree after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimePart {
    Text(String),
    Html(String),
    Attachment { filename: String, data: Vec<u8> },
}

/// Walks every part of `message`, including embedded `message/rfc822`
/// parts, in document order.
///
/// Parts that are neither plain text, HTML nor a named attachment are
/// skipped. A message without any text or HTML part yields a single empty
/// text part so callers always have a body to work with.
pub fn walk(message: &Message<'_>) -> Vec<MimePart> {
    let mut parts = Vec::new();
    collect(message, &mut parts);

    if !parts
        .iter()
        .any(|p| matches!(p, MimePart::Text(_) | MimePart::Html(_)))
    {
        parts.push(MimePart::Text(String::new()));
    }
    parts
}

fn collect(message: &Message<'_>, out: &mut Vec<MimePart>) {
    for part in &message.parts {
        if let PartType::Message(inner) = &part.body {
            collect(inner, out);
            continue;
        }
        if let Some(classified) = classify(message, part) {
            out.push(classified);
        }
    }
}

fn classify(message: &Message<'_>, part: &MessagePart<'_>) -> Option<MimePart> {
    if matches!(part.body, PartType::Multipart(_)) {
        return None;
    }

    let is_attachment = part
        .content_disposition()
        .is_some_and(|d| d.ctype().eq_ignore_ascii_case("attachment"));

    if is_attachment {
        return match part.attachment_name() {
            Some(name) => {
                debug!("Found attachment '{}' ({} bytes)", name, part.contents().len());
                Some(MimePart::Attachment {
                    filename: name.to_string(),
                    data: part.contents().to_vec(),
                })
            }
            None => {
                debug!("Skipping attachment without a filename");
                None
            }
        };
    }

    let (ctype, subtype) = mime_type(part);
    if ctype != "text" {
        return None;
    }
    match subtype.as_str() {
        "plain" => text_of(message, part).map(MimePart::Text),
        "html" => text_of(message, part).map(MimePart::Html),
        _ => None,
    }
}

/// Lowercased `(type, subtype)`; parts without a Content-Type are
/// `text/plain`.
fn mime_type(part: &MessagePart<'_>) -> (String, String) {
    match part.content_type() {
        Some(ct) => (
            ct.ctype().to_ascii_lowercase(),
            ct.subtype().unwrap_or("").to_ascii_lowercase(),
        ),
        None => ("text".to_string(), "plain".to_string()),
    }
}

fn text_of(message: &Message<'_>, part: &MessagePart<'_>) -> Option<String> {
    let charset = part.content_type().and_then(|ct| ct.attribute("charset"));
    match &part.body {
        PartType::Text(text) | PartType::Html(text) => {
            // mail-parser decodes text parts lossily. Redo it from the raw
            // body so bytes outside the declared charset survive.
            if text.contains(char::REPLACEMENT_CHARACTER) || part.is_encoding_problem {
                if let Some(bytes) = raw_body(message, part) {
                    debug!("Re-decoding text part with charset fallbacks");
                    return Some(decode_text_payload(&bytes, charset));
                }
            }
            Some(text.to_string())
        }
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) => {
            Some(decode_text_payload(bytes, charset))
        }
        _ => None,
    }
}

/// Body bytes of `part` with the transfer encoding undone.
fn raw_body(message: &Message<'_>, part: &MessagePart<'_>) -> Option<Vec<u8>> {
    let raw = message
        .raw_message
        .get(part.offset_body as usize..part.offset_end as usize)?;
    match part.encoding {
        TransferEncoding::None => Some(raw.to_vec()),
        TransferEncoding::QuotedPrintable => quoted_printable_decode(raw),
        TransferEncoding::Base64 => base64_decode(raw),
    }
}

/// Decodes a text payload with its declared charset, then UTF-8, then
/// Latin-1. The last step maps every byte to a char so it cannot fail.
pub fn decode_text_payload(bytes: &[u8], charset: Option<&str>) -> String {
    if let Some(encoding) = charset.and_then(|label| Encoding::for_label(label.trim().as_bytes())) {
        let (decoded, had_errors) = encoding.decode_without_bom_handling(bytes);
        if !had_errors {
            return decoded.into_owned();
        }
        warn!(
            "Payload is not valid {}, trying fallbacks",
            encoding.name()
        );
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
