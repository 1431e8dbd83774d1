//! Email ingestion.
//!
//! This module polls an IMAP folder for unseen messages, flattens their MIME
//! structure, locates the one-time passcode and applies the sender/subject
//! filter. The result of a poll cycle is a list of [`NotificationEvent`]s.

pub mod client;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod mime;
pub mod parser;
pub mod scanner;
pub mod session;
pub mod tracker;

pub use client::{ImapClient, ImapConnector};
pub use error::EmailError;
pub use extractor::{extract, ExtractionResult};
pub use filter::EmailFilter;
pub use parser::{parse_email, Attachment, ParsedEmail};
pub use scanner::{InboxScanner, NotificationEvent};
pub use session::{MailConnector, MailSession, RawMessage};
pub use tracker::EmailTracker;
