//! Fan-out of notifications to every entitled recipient.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::email::NotificationEvent;
use crate::store::{EntitlementStore, StoreError};

use super::channel::{ChatChannel, ParseMode};
use super::render::{attachment_caption, render_notification};

/// Outcome of relaying one email.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Size of the recipient snapshot.
    pub recipients: usize,
    /// Recipients that received the notification text in either format.
    pub delivered: usize,
    /// True when the HTML rendering reached nobody and plain text was sent.
    pub used_plain_fallback: bool,
    /// Successful document uploads, summed over attachments and recipients.
    pub documents_delivered: usize,
}

/// Sends notifications through a [`ChatChannel`] to the store's active
/// identities. One failing recipient never stops the others.
#[derive(Clone)]
pub struct Dispatcher {
    channel: Arc<dyn ChatChannel>,
    store: EntitlementStore,
}

impl Dispatcher {
    pub fn new(channel: Arc<dyn ChatChannel>, store: EntitlementStore) -> Self {
        Self { channel, store }
    }

    pub fn channel(&self) -> &Arc<dyn ChatChannel> {
        &self.channel
    }

    /// Relays one email. The recipient set is fixed before the first send.
    pub async fn dispatch_event(&self, event: &NotificationEvent) -> Result<DispatchReport, StoreError> {
        let recipients = self.store.active_identities()?;
        if recipients.is_empty() {
            warn!("No active recipients for email '{}'", event.email.subject);
            return Ok(DispatchReport::default());
        }

        let email = &event.email;
        let mut report = DispatchReport {
            recipients: recipients.len(),
            ..Default::default()
        };

        let html = render_notification(email, ParseMode::Html);
        report.delivered = self.send_to_all(&recipients, &html, ParseMode::Html).await;

        if report.delivered == 0 {
            info!("HTML notification reached nobody, retrying as plain text");
            let plain = render_notification(email, ParseMode::Plain);
            report.delivered = self.send_to_all(&recipients, &plain, ParseMode::Plain).await;
            report.used_plain_fallback = true;
        }

        let caption = attachment_caption(email);
        for attachment in &email.attachments {
            report.documents_delivered += self
                .send_document_to_all(&recipients, &attachment.data, &attachment.filename, &caption)
                .await;
        }

        info!(
            "Email '{}' relayed to {}/{} recipients",
            email.subject, report.delivered, report.recipients
        );
        Ok(report)
    }

    /// Sends `text` to every recipient concurrently. Returns how many
    /// succeeded.
    pub async fn send_to_all(&self, recipients: &BTreeSet<String>, text: &str, mode: ParseMode) -> usize {
        let sends = recipients.iter().map(|recipient| async move {
            match self.channel.send_text(recipient, text, mode).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to send message to {}: {}", recipient, e);
                    false
                }
            }
        });
        join_all(sends).await.into_iter().filter(|ok| *ok).count()
    }

    /// Uploads one document to every recipient concurrently. Returns how
    /// many succeeded.
    pub async fn send_document_to_all(
        &self,
        recipients: &BTreeSet<String>,
        data: &[u8],
        filename: &str,
        caption: &str,
    ) -> usize {
        let sends = recipients.iter().map(|recipient| async move {
            match self
                .channel
                .send_document(recipient, data, filename, Some(caption))
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to send '{}' to {}: {}", filename, recipient, e);
                    false
                }
            }
        });
        let delivered = join_all(sends).await.into_iter().filter(|ok| *ok).count();
        debug!("Document '{}' delivered to {}", filename, delivered);
        delivered
    }

    /// Sends an HTML message to every active identity. Returns
    /// `(delivered, recipients)`.
    pub async fn broadcast(&self, html: &str) -> Result<(usize, usize), StoreError> {
        let recipients = self.store.active_identities()?;
        let delivered = self.send_to_all(&recipients, html, ParseMode::Html).await;
        info!("Broadcast delivered to {}/{}", delivered, recipients.len());
        Ok((delivered, recipients.len()))
    }

    /// Sends an HTML message to a single recipient, logging failures.
    pub async fn notify(&self, recipient: &str, html: &str) -> bool {
        match self.channel.send_text(recipient, html, ParseMode::Html).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to notify {}: {}", recipient, e);
                false
            }
        }
    }
}
