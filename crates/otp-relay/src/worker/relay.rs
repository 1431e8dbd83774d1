//! The relay loop: poll the mailbox, relay matching emails, announce expired
//! access, and answer bot commands between cycles.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::bot::{Action, Command, CommandHandler, Sender};
use crate::config::SettingsSource;
use crate::dispatch::telegram::Update;
use crate::dispatch::{DispatchError, Dispatcher, TelegramClient};
use crate::email::InboxScanner;
use crate::store::EntitlementStore;

/// Pause after a failed `getUpdates` before polling again.
const UPDATE_RETRY_DELAY: Duration = Duration::from_secs(5);

const EXPIRED_NOTICE: &str = "⏰ <b>Your access has ended</b>\n\n\
    You will no longer receive email notifications from this bot.\n\
    Ask the owner for more time, or use <code>/redeem &lt;code&gt;</code> with a new code.";

/// What one poll cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Identities that were sent an expiry notice.
    pub expired_notified: usize,
    /// Emails that passed the filter.
    pub emails: usize,
    /// Notification texts delivered, summed over emails.
    pub deliveries: usize,
}

enum LoopEvent {
    Shutdown,
    Tick,
    Updates(Result<Vec<Update>, DispatchError>),
}

/// Drives poll cycles and bot commands on one task. A cycle never overlaps
/// another, and commands are only handled between cycles.
pub struct RelayWorker {
    scanner: InboxScanner,
    settings: SettingsSource,
    store: EntitlementStore,
    dispatcher: Dispatcher,
    handler: CommandHandler,
    owner_id: String,
    interval: Duration,
    updates: Option<Arc<TelegramClient>>,
    poll_timeout_secs: u64,
    offset: Option<i64>,
    cycles: u64,
}

impl RelayWorker {
    pub fn new(
        scanner: InboxScanner,
        settings: SettingsSource,
        store: EntitlementStore,
        dispatcher: Dispatcher,
        handler: CommandHandler,
        owner_id: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            scanner,
            settings,
            store,
            dispatcher,
            handler,
            owner_id: owner_id.into(),
            interval,
            updates: None,
            poll_timeout_secs: 0,
            offset: None,
            cycles: 0,
        }
    }

    /// Long-polls `client` for bot commands between cycles.
    pub fn with_updates(mut self, client: Arc<TelegramClient>, poll_timeout_secs: u64) -> Self {
        self.updates = Some(client);
        self.poll_timeout_secs = poll_timeout_secs;
        self
    }

    /// Runs until `shutdown` turns true or its sender goes away. The first
    /// cycle starts immediately. A cycle in progress always completes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Relay worker started, checking mail every {:?}",
            self.interval
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let updates = self.updates.clone();
            let offset = self.offset;
            let poll_timeout = self.poll_timeout_secs;

            let event = tokio::select! {
                biased;
                changed = shutdown.changed() => match changed {
                    Ok(()) if !*shutdown.borrow() => continue,
                    _ => LoopEvent::Shutdown,
                },
                _ = ticker.tick() => LoopEvent::Tick,
                result = poll_updates(updates, offset, poll_timeout) => LoopEvent::Updates(result),
            };

            match event {
                LoopEvent::Shutdown => break,
                LoopEvent::Tick => {
                    self.run_cycle().await;
                }
                LoopEvent::Updates(Ok(updates)) => {
                    for update in updates {
                        self.offset = Some(update.update_id + 1);
                        self.handle_update(update).await;
                    }
                }
                LoopEvent::Updates(Err(e)) => {
                    warn!("Failed to fetch bot updates: {}", e);
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(UPDATE_RETRY_DELAY) => {}
                    }
                }
            }
        }

        info!("Relay worker stopped after {} cycle(s)", self.cycles);
    }

    /// Runs one poll cycle: refresh settings, announce expired access, scan,
    /// then relay every matching email.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycles += 1;
        let span = info_span!("relay_cycle", cycle = self.cycles);
        async {
            let criteria = self.settings.refresh();
            let mut report = CycleReport {
                expired_notified: self.announce_expirations().await,
                ..Default::default()
            };

            let events = self.scanner.scan(&criteria).await;
            report.emails = events.len();

            for event in &events {
                match self.dispatcher.dispatch_event(event).await {
                    Ok(dispatched) => report.deliveries += dispatched.delivered,
                    Err(e) => error!(
                        "Could not relay email '{}': {}",
                        event.email.subject, e
                    ),
                }
            }

            debug!("Cycle finished: {:?}", report);
            report
        }
        .instrument(span)
        .await
    }

    async fn announce_expirations(&self) -> usize {
        let expired = match self.store.sweep_expirations() {
            Ok(expired) => expired,
            Err(e) => {
                error!("Expiry sweep failed: {}", e);
                return 0;
            }
        };

        for identity in &expired {
            self.dispatcher.notify(identity, EXPIRED_NOTICE).await;
            if *identity != self.owner_id {
                let text = format!(
                    "ℹ️ <b>Access expired</b>\n\nUser <code>{}</code> no longer has access.",
                    crate::dispatch::escape_html(identity)
                );
                self.dispatcher.notify(&self.owner_id, &text).await;
            }
        }
        expired.len()
    }

    /// Handles one bot update. Updates without a command are ignored.
    pub async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let Some(command) = message.text.as_deref().and_then(Command::parse) else {
            return;
        };

        let chat_id = message.chat.id.to_string();
        let sender = Sender {
            id: message
                .from
                .as_ref()
                .map(|user| user.id.to_string())
                .unwrap_or_else(|| chat_id.clone()),
            username: message.from.and_then(|user| user.username),
        };
        debug!("Command {:?} from {}", command, sender.id);

        for action in self.handler.handle(&sender, command) {
            self.perform(&chat_id, action).await;
        }
    }

    async fn perform(&self, chat_id: &str, action: Action) {
        match action {
            Action::Reply(text) => {
                self.dispatcher.notify(chat_id, &text).await;
            }
            Action::Notify { recipient, text } => {
                self.dispatcher.notify(&recipient, &text).await;
            }
            Action::Broadcast(text) => {
                let summary = match self.dispatcher.broadcast(&text).await {
                    Ok((delivered, total)) => format!(
                        "✅ Broadcast delivered to {}/{} users.",
                        delivered, total
                    ),
                    Err(e) => {
                        error!("Broadcast failed: {}", e);
                        "⚠️ Broadcast failed. Please try again later.".to_string()
                    }
                };
                self.dispatcher.notify(chat_id, &summary).await;
            }
        }
    }
}

async fn poll_updates(
    client: Option<Arc<TelegramClient>>,
    offset: Option<i64>,
    poll_timeout_secs: u64,
) -> Result<Vec<Update>, DispatchError> {
    match client {
        Some(client) => client.get_updates(offset, poll_timeout_secs).await,
        None => std::future::pending().await,
    }
}
