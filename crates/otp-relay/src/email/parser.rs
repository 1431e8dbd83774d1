//! Turns a raw RFC 822 message into a [`ParsedEmail`].

use chrono::{DateTime, Utc};
use log::debug;
use mail_parser::{Addr, Message, MessageParser};

use super::error::{EmailError, Result};
use super::extractor::{self, ExtractionResult};
use super::mime::{self, MimePart};
use super::session::RawMessage;

/// A file attached to a relayed email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

/// The relay's view of one email.
#[derive(Debug, Clone)]
pub struct ParsedEmail {
    /// Mailbox id the message was fetched under.
    pub id: String,
    pub subject: String,
    /// `Name <address>` when a display name is present, else the bare address.
    pub from: String,
    /// Date header, or the time of parsing when the header is missing or
    /// unusable.
    pub date: DateTime<Utc>,
    pub body_text: String,
    pub body_html: String,
    pub attachments: Vec<Attachment>,
    /// Result of OTP extraction over the HTML body, or over the text body
    /// when there is no HTML. `None` when both bodies are empty.
    pub extraction: Option<ExtractionResult>,
}

impl ParsedEmail {
    pub fn otp_code(&self) -> Option<&str> {
        self.extraction.as_ref().and_then(|e| e.otp_code())
    }
}

/// Parses `raw` and runs OTP extraction on its body.
pub fn parse_email(raw: &RawMessage) -> Result<ParsedEmail> {
    let message = MessageParser::default()
        .parse(&raw.bytes)
        .ok_or_else(|| EmailError::ParseError(format!("message {} is not RFC 822", raw.id)))?;

    let mut body_text = String::new();
    let mut body_html = String::new();
    let mut attachments = Vec::new();

    // Later parts win, which keeps the richest alternative in
    // multipart/alternative bodies.
    for part in mime::walk(&message) {
        match part {
            MimePart::Text(text) => body_text = text,
            MimePart::Html(html) => body_html = html,
            MimePart::Attachment { filename, data } => {
                attachments.push(Attachment { filename, data })
            }
        }
    }

    let extraction = if !body_html.trim().is_empty() {
        Some(extractor::extract(&body_html, true))
    } else if !body_text.trim().is_empty() {
        Some(extractor::extract(&body_text, false))
    } else {
        None
    };

    let parsed = ParsedEmail {
        id: raw.id.clone(),
        subject: message.subject().unwrap_or_default().to_string(),
        from: sender_of(&message),
        date: date_of(&message),
        body_text,
        body_html,
        attachments,
        extraction,
    };

    debug!(
        "Parsed message {} from {:?} subject={:?} otp_found={}",
        parsed.id,
        parsed.from,
        parsed.subject,
        parsed.otp_code().is_some()
    );
    Ok(parsed)
}

fn sender_of(message: &Message<'_>) -> String {
    message
        .from()
        .and_then(|address| address.first())
        .map(format_address)
        .unwrap_or_default()
}

fn format_address(addr: &Addr<'_>) -> String {
    let address = addr.address().unwrap_or_default();
    match addr.name() {
        Some(name) if !name.is_empty() => format!("{} <{}>", name, address),
        _ => address.to_string(),
    }
}

fn date_of(message: &Message<'_>) -> DateTime<Utc> {
    message
        .date()
        .filter(|d| d.is_valid())
        .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now)
}
