//! Shared test utilities for otp-relay integration tests.
//!
//! This module provides:
//! - `FakeMailbox`, an in-memory mailbox behind the `MailConnector` seam
//! - `RecordingChannel`, a `ChatChannel` that keeps everything it is asked to send
//! - `raw_email` for building RFC 822 messages

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use otp_relay::dispatch::error::{DispatchError, Result as DispatchResult};
use otp_relay::dispatch::{ChatChannel, ParseMode};
use otp_relay::email::error::Result as EmailResult;
use otp_relay::email::{MailConnector, MailSession, RawMessage};

/// A message stored in the fake mailbox.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub bytes: Vec<u8>,
    pub seen: bool,
}

/// In-memory mailbox. Fetching a message marks it seen, like `RFC822`
/// fetches do on a real server.
#[derive(Clone, Default)]
pub struct FakeMailbox {
    messages: Arc<Mutex<Vec<StoredMessage>>>,
    /// Report every id twice from `search_unseen`.
    duplicate_search: bool,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duplicate_search() -> Self {
        Self {
            duplicate_search: true,
            ..Self::default()
        }
    }

    pub fn deliver(&self, id: &str, bytes: Vec<u8>) {
        self.messages.lock().unwrap().push(StoredMessage {
            id: id.to_string(),
            bytes,
            seen: false,
        });
    }

    pub fn unseen_count(&self) -> usize {
        self.messages.lock().unwrap().iter().filter(|m| !m.seen).count()
    }
}

struct FakeSession {
    mailbox: FakeMailbox,
}

#[async_trait]
impl MailConnector for FakeMailbox {
    async fn connect(&self) -> EmailResult<Box<dyn MailSession>> {
        Ok(Box::new(FakeSession {
            mailbox: self.clone(),
        }))
    }
}

#[async_trait]
impl MailSession for FakeSession {
    async fn search_unseen(&mut self) -> EmailResult<Vec<String>> {
        let messages = self.mailbox.messages.lock().unwrap();
        let mut ids: Vec<String> = messages
            .iter()
            .filter(|m| !m.seen)
            .map(|m| m.id.clone())
            .collect();
        if self.mailbox.duplicate_search {
            ids.extend(ids.clone());
        }
        Ok(ids)
    }

    async fn fetch(&mut self, id: &str) -> EmailResult<RawMessage> {
        let mut messages = self.mailbox.messages.lock().unwrap();
        let message = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| {
                otp_relay::email::EmailError::FetchFailed(id.to_string(), "no such id".to_string())
            })?;
        message.seen = true;
        Ok(RawMessage {
            id: id.to_string(),
            bytes: message.bytes.clone(),
        })
    }

    async fn close(&mut self) -> EmailResult<()> {
        Ok(())
    }
}

/// Something a [`RecordingChannel`] was asked to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        recipient: String,
        text: String,
        mode: ParseMode,
    },
    Document {
        recipient: String,
        filename: String,
        data: Vec<u8>,
    },
}

/// Records sends. Recipients listed in `unreachable` fail every call.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<Sent>>,
    unreachable: BTreeSet<String>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unreachable(ids: &[&str]) -> Self {
        Self {
            unreachable: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_to(&self, recipient: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text {
                    recipient: r, text, ..
                } if r == recipient => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn documents_to(&self, recipient: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Document {
                    recipient: r,
                    filename,
                    ..
                } if r == recipient => Some(filename),
                _ => None,
            })
            .collect()
    }

    fn check(&self, recipient: &str) -> DispatchResult<()> {
        if self.unreachable.contains(recipient) {
            return Err(DispatchError::Api {
                method: "sendMessage",
                description: "Forbidden: bot was blocked by the user".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChatChannel for RecordingChannel {
    async fn send_text(&self, recipient: &str, text: &str, mode: ParseMode) -> DispatchResult<()> {
        self.check(recipient)?;
        self.sent.lock().unwrap().push(Sent::Text {
            recipient: recipient.to_string(),
            text: text.to_string(),
            mode,
        });
        Ok(())
    }

    async fn send_document(
        &self,
        recipient: &str,
        data: &[u8],
        filename: &str,
        _caption: Option<&str>,
    ) -> DispatchResult<()> {
        self.check(recipient)?;
        self.sent.lock().unwrap().push(Sent::Document {
            recipient: recipient.to_string(),
            filename: filename.to_string(),
            data: data.to_vec(),
        });
        Ok(())
    }
}

/// Builds a single-part message.
pub fn raw_email(from: &str, subject: &str, content_type: &str, body: &str) -> Vec<u8> {
    format!(
        "From: {}\r\nTo: otp@example.com\r\nSubject: {}\r\nDate: Mon, 3 Feb 2025 04:05:06 +0000\r\nMIME-Version: 1.0\r\nContent-Type: {}; charset=utf-8\r\n\r\n{}\r\n",
        from, subject, content_type, body
    )
    .into_bytes()
}

/// Builds an HTML message with one base64 attachment.
pub fn raw_email_with_attachment(
    from: &str,
    subject: &str,
    html: &str,
    filename: &str,
    base64_data: &str,
) -> Vec<u8> {
    format!(
        "From: {from}\r\n\
Subject: {subject}\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
{html}\r\n\
--XYZ\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=\"{filename}\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
{base64_data}\r\n\
--XYZ--\r\n"
    )
    .into_bytes()
}
