//! Mailbox boundary consumed by the ingestion pipeline.
//!
//! The pipeline only needs four things from a mailbox: connect, list unseen
//! ids, fetch one raw message, close. Keeping that behind traits lets the
//! scanner run against the real IMAP client or an in-memory mailbox.

use async_trait::async_trait;

use super::error::Result;

/// A raw message as returned by the mailbox.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Mailbox-assigned identifier (the IMAP UID).
    pub id: String,
    pub bytes: Vec<u8>,
}

/// Opens mailbox sessions. One session is opened per poll cycle.
#[async_trait]
pub trait MailConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn MailSession>>;
}

/// An authenticated session with the configured folder selected.
#[async_trait]
pub trait MailSession: Send {
    /// Ids of unseen messages, in ascending mailbox order.
    async fn search_unseen(&mut self) -> Result<Vec<String>>;

    /// Fetches the full RFC 822 message for `id`.
    async fn fetch(&mut self, id: &str) -> Result<RawMessage>;

    /// Logs out. Errors here are reported but never affect the cycle result.
    async fn close(&mut self) -> Result<()>;
}
