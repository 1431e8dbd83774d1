//! Inbox scanner that turns unseen messages into notification events.

use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::FilterCriteria;

use super::filter::EmailFilter;
use super::parser::{parse_email, ParsedEmail};
use super::session::{MailConnector, MailSession};
use super::tracker::EmailTracker;

/// An email that passed the filter and should be relayed.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub email: ParsedEmail,
}

/// Polls one mailbox folder. Holds the processed-id set across cycles.
pub struct InboxScanner {
    connector: Arc<dyn MailConnector>,
    tracker: EmailTracker,
    batch_size: usize,
}

impl InboxScanner {
    pub fn new(connector: Arc<dyn MailConnector>, batch_size: usize) -> Self {
        Self {
            connector,
            tracker: EmailTracker::new(),
            batch_size: batch_size.max(1),
        }
    }

    /// Runs one poll cycle.
    ///
    /// Never fails: a connection or search failure is logged and yields an
    /// empty list. A timeout or lost connection during a fetch ends the cycle
    /// with the events gathered so far; any other fetch failure or an
    /// unparsable message skips that message.
    /// At most `batch_size` new messages are handled; the rest stay unseen
    /// on the server and are picked up by the next cycle.
    pub async fn scan(&mut self, criteria: &FilterCriteria) -> Vec<NotificationEvent> {
        let span = info_span!(
            "email_scan",
            sender = %criteria.sender,
            subject = %criteria.subject
        );
        self.scan_cycle(criteria).instrument(span).await
    }

    async fn scan_cycle(&mut self, criteria: &FilterCriteria) -> Vec<NotificationEvent> {
        let filter = EmailFilter::new(criteria);
        if filter.is_pass_through() {
            debug!("No sender or subject filter set, relaying every unseen message");
        }

        let mut session = match self.connector.connect().await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to open mailbox session: {}", e);
                return Vec::new();
            }
        };

        let events = self.process_unseen(session.as_mut(), &filter).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close mailbox session: {}", e);
        }

        info!("Scan complete: {} notification(s)", events.len());
        events
    }

    async fn process_unseen(
        &mut self,
        session: &mut dyn MailSession,
        filter: &EmailFilter,
    ) -> Vec<NotificationEvent> {
        let ids = match session.search_unseen().await {
            Ok(ids) => ids,
            Err(e) => {
                error!("Failed to search for unseen messages: {}", e);
                return Vec::new();
            }
        };

        let pending = self.tracker.filter_unprocessed(ids);
        if pending.is_empty() {
            debug!("No new messages");
            return Vec::new();
        }
        if pending.len() > self.batch_size {
            info!(
                "{} new messages, handling {} this cycle",
                pending.len(),
                self.batch_size
            );
        }

        let mut events = Vec::new();
        for id in pending.into_iter().take(self.batch_size) {
            let raw = match session.fetch(&id).await {
                Ok(raw) => raw,
                Err(e) if e.is_session_fatal() => {
                    error!("Abandoning cycle at message {}: {}", id, e);
                    break;
                }
                Err(e) => {
                    warn!("Skipping message {}: {}", id, e);
                    continue;
                }
            };
            self.tracker.mark_processed(&id);

            let email = match parse_email(&raw) {
                Ok(email) => email,
                Err(e) => {
                    warn!("Skipping message {}: {}", id, e);
                    continue;
                }
            };

            if filter.matches(&email.from, &email.subject) {
                info!(
                    "Email from {} with subject '{}' matches the filter",
                    email.from, email.subject
                );
                events.push(NotificationEvent { email });
            } else {
                info!(
                    "Email from {} with subject '{}' does not match the filter, ignored",
                    email.from, email.subject
                );
            }
        }
        events
    }

    /// Number of ids handled since the process started.
    pub fn processed_count(&self) -> usize {
        self.tracker.len()
    }
}
