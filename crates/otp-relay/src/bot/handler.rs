//! Bot command handling.
//!
//! The handler only touches the entitlement store. Anything that has to go
//! over the network comes back as an [`Action`] for the caller to perform,
//! so no store lock is ever held across a send.

use chrono::{DateTime, Utc};
use log::{error, info};

use crate::dispatch::escape_html;
use crate::store::{AccessStatus, EntitlementStore, StoreError};

use super::commands::Command;

/// How many used codes `/listcodes` shows.
const USED_CODES_SHOWN: usize = 10;

/// Who sent a command.
#[derive(Debug, Clone)]
pub struct Sender {
    /// Chat identity, used as the entitlement key.
    pub id: String,
    pub username: Option<String>,
}

/// Something the caller must send after a command was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// HTML reply to the sender.
    Reply(String),
    /// HTML message to another identity.
    Notify { recipient: String, text: String },
    /// HTML message to every active identity. The caller reports the
    /// delivery count back to the sender.
    Broadcast(String),
}

/// Facts shown by `/status`.
#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub check_interval_secs: u64,
    pub mail_host: String,
    pub folder: String,
}

pub struct CommandHandler {
    store: EntitlementStore,
    owner_id: String,
    status: StatusInfo,
}

impl CommandHandler {
    pub fn new(store: EntitlementStore, owner_id: impl Into<String>, status: StatusInfo) -> Self {
        Self {
            store,
            owner_id: owner_id.into(),
            status,
        }
    }

    pub fn is_owner(&self, identity: &str) -> bool {
        identity == self.owner_id
    }

    /// Handles one command and returns what to send.
    pub fn handle(&self, sender: &Sender, command: Command) -> Vec<Action> {
        if command.is_owner_only() && !self.is_owner(&sender.id) {
            info!("Rejected owner-only command {:?} from {}", command, sender.id);
            return reply("❌ Only the owner can use this command.");
        }

        let result = match command {
            Command::Start => self.start(sender),
            Command::MyId => self.my_id(sender),
            Command::Help => Ok(reply(&self.help(sender))),
            Command::Status => self.status(sender),
            Command::Redeem { code } => self.redeem(sender, code),
            Command::AddUser { identity } => self.add_user(identity),
            Command::AddAccess { identity, days } => self.add_access(identity, days),
            Command::RemoveUser { identity } => self.remove_user(identity),
            Command::ListUsers => self.list_users(),
            Command::NewCode { days } => self.new_code(days),
            Command::ListCodes => self.list_codes(),
            Command::DelCode { code } => self.delete_code(code),
            Command::Broadcast { text } => Ok(broadcast(&text)),
            Command::Unknown(name) => Ok(reply(&format!(
                "Unknown command /{}. Send /help for the list of commands.",
                escape_html(&name)
            ))),
        };

        result.unwrap_or_else(|e| {
            if e.is_rejection() {
                info!("Command from {} rejected: {}", sender.id, e);
            } else {
                error!("Command from {} failed: {}", sender.id, e);
            }
            reply("⚠️ Something went wrong. Please try again later.")
        })
    }

    fn start(&self, sender: &Sender) -> Result<Vec<Action>, StoreError> {
        let name = display_name(sender);
        let id = escape_html(&sender.id);
        let text = if self.store.is_entitled(&sender.id)? {
            format!(
                "✅ Hello {}!\n\nYou are registered to receive email notifications.\nYour ID: <code>{}</code>",
                name, id
            )
        } else {
            format!(
                "👋 Hello {}!\n\nYou are not registered to receive notifications yet.\nYour ID: <code>{}</code>\n\nAsk the owner to add your ID, or use <code>/redeem &lt;code&gt;</code>.",
                name, id
            )
        };
        Ok(reply(&text))
    }

    fn my_id(&self, sender: &Sender) -> Result<Vec<Action>, StoreError> {
        let status = self.store.check(&sender.id)?;
        let label = if status == AccessStatus::NotEntitled {
            "❌ Not approved"
        } else {
            "✅ Approved"
        };
        Ok(reply(&format!(
            "👤 <b>User info</b>\n\nUsername: {}\nID: <code>{}</code>\nStatus: {}\nAccess: {}",
            display_name(sender),
            escape_html(&sender.id),
            label,
            describe_access(status, self.store.now())
        )))
    }

    fn help(&self, sender: &Sender) -> String {
        let mut text = String::from(
            "📖 <b>Commands</b>\n\n\
             /start - Start the bot\n\
             /myid - Show your Telegram ID\n\
             /redeem &lt;code&gt; - Redeem an access code\n\
             /status - Show bot status\n\
             /help - Show this help\n",
        );
        if self.is_owner(&sender.id) {
            text.push_str(
                "\n<b>🔐 Owner commands:</b>\n\
                 /adduser &lt;id&gt; - Add a user (permanent)\n\
                 /addaccess &lt;id&gt; &lt;days&gt; - Add a user for a number of days\n\
                 /removeuser &lt;id&gt; - Remove a user\n\
                 /listusers - List approved users\n\
                 /newcode &lt;days&gt; - Create a redeem code\n\
                 /listcodes - List redeem codes\n\
                 /delcode &lt;code&gt; - Delete an unused code\n\
                 /broadcast &lt;message&gt; - Message every user\n",
            );
        }
        text
    }

    fn status(&self, sender: &Sender) -> Result<Vec<Action>, StoreError> {
        if !self.store.is_entitled(&sender.id)? {
            return Ok(reply("❌ You do not have access to this command."));
        }
        let users = self.store.active_identities()?.len();
        Ok(reply(&format!(
            "📊 <b>Bot status</b>\n\n✅ Running\n⏱ Check interval: {} seconds\n👥 Approved users: {}\n📧 Mail host: {}\n📬 Folder: {}",
            self.status.check_interval_secs,
            users,
            escape_html(&self.status.mail_host),
            escape_html(&self.status.folder)
        )))
    }

    fn redeem(&self, sender: &Sender, code: Option<String>) -> Result<Vec<Action>, StoreError> {
        let Some(code) = code else {
            return Ok(reply(
                "📝 <b>Usage:</b>\n<code>/redeem &lt;code&gt;</code>\n\nExample: <code>/redeem ABC123</code>",
            ));
        };

        let redemption = match self.store.redeem_and_grant(&code, &sender.id) {
            Ok(redemption) => redemption,
            Err(StoreError::NotFound(_)) => return Ok(reply("❌ Code not found.")),
            Err(StoreError::AlreadyUsed(_)) => {
                return Ok(reply("❌ This code has already been used."))
            }
            Err(StoreError::AlreadyPermanent(_)) => {
                return Ok(reply("✅ You already have permanent access!"))
            }
            Err(e) => return Err(e),
        };

        let mut actions = reply(&format!(
            "🎉 <b>Code redeemed!</b>\n\n✅ You now have access for <b>{} days</b>.\n📅 Valid until: {}\n\nYou will receive email notifications from this bot.",
            redemption.days,
            format_date(redemption.expires_at)
        ));
        if !self.is_owner(&sender.id) {
            actions.push(Action::Notify {
                recipient: self.owner_id.clone(),
                text: format!(
                    "📢 <b>Code redeemed!</b>\n\n👤 User: <code>{}</code>\n🎫 Code: <code>{}</code>\n⏱ Duration: {} days",
                    escape_html(&sender.id),
                    redemption.code,
                    redemption.days
                ),
            });
        }
        Ok(actions)
    }

    fn add_user(&self, identity: Option<String>) -> Result<Vec<Action>, StoreError> {
        let Some(identity) = identity else {
            return Ok(reply(
                "📝 <b>Usage:</b>\n<code>/adduser &lt;telegram_id&gt;</code>\n\nExample: <code>/adduser 123456789</code>\n\n💡 For time-limited access use:\n<code>/addaccess &lt;telegram_id&gt; &lt;days&gt;</code>",
            ));
        };

        let status = self.store.check(&identity)?;
        if status != AccessStatus::NotEntitled {
            return Ok(reply(&format!(
                "⚠️ User {} is already registered (access: {}).",
                escape_html(&identity),
                describe_access(status, self.store.now())
            )));
        }

        self.store.grant(&identity, None)?;
        Ok(reply(&format!(
            "✅ User <code>{}</code> added with <b>permanent</b> access.",
            escape_html(&identity)
        )))
    }

    fn add_access(
        &self,
        identity: Option<String>,
        days: Option<String>,
    ) -> Result<Vec<Action>, StoreError> {
        let (Some(identity), Some(days)) = (identity, days) else {
            return Ok(reply(
                "📝 <b>Usage:</b>\n<code>/addaccess &lt;telegram_id&gt; &lt;days&gt;</code>\n\nExamples:\n• <code>/addaccess 123456789 7</code> → 7 days\n• <code>/addaccess 123456789 30</code> → 30 days\n\n💡 For permanent access use:\n<code>/adduser &lt;telegram_id&gt;</code>",
            ));
        };
        let days = match parse_days(&days) {
            Ok(days) => days,
            Err(message) => return Ok(reply(message)),
        };

        let expires_at = match self.store.grant(&identity, Some(days)) {
            Ok(Some(at)) => at,
            Ok(None) => return Err(StoreError::InvalidDays(days)),
            Err(StoreError::InvalidDays(_)) => return Ok(reply("⚠️ That number of days is too large.")),
            Err(e) => return Err(e),
        };
        Ok(reply(&format!(
            "✅ User <code>{}</code> added.\n\n⏱ <b>Duration:</b> {} days\n📅 <b>Valid until:</b> {}",
            escape_html(&identity),
            days,
            format_date(expires_at)
        )))
    }

    fn remove_user(&self, identity: Option<String>) -> Result<Vec<Action>, StoreError> {
        let Some(identity) = identity else {
            return Ok(reply(
                "📝 <b>Usage:</b>\n<code>/removeuser &lt;telegram_id&gt;</code>\n\nExample: <code>/removeuser 123456789</code>",
            ));
        };
        if self.is_owner(&identity) {
            return Ok(reply("⚠️ The owner cannot be removed."));
        }

        let text = if self.store.revoke(&identity)? {
            format!("✅ User <code>{}</code> removed.", escape_html(&identity))
        } else {
            format!("⚠️ User {} not found.", escape_html(&identity))
        };
        Ok(reply(&text))
    }

    fn list_users(&self) -> Result<Vec<Action>, StoreError> {
        let entries = self.store.list_entitlements()?;
        if entries.is_empty() {
            return Ok(reply("📋 No approved users."));
        }

        let now = self.store.now();
        let lines: Vec<String> = entries
            .iter()
            .map(|(id, expires_at)| {
                let status = match expires_at {
                    Some(at) => AccessStatus::Until(*at),
                    None => AccessStatus::Permanent,
                };
                let crown = if self.is_owner(id) { " 👑" } else { "" };
                format!(
                    "• <code>{}</code>{}\n   ⏱ {}",
                    escape_html(id),
                    crown,
                    describe_access(status, now)
                )
            })
            .collect();

        Ok(reply(&format!(
            "📋 <b>Approved users ({}):</b>\n\n{}\n\n👑 = Owner",
            entries.len(),
            lines.join("\n")
        )))
    }

    fn new_code(&self, days: Option<String>) -> Result<Vec<Action>, StoreError> {
        let Some(days) = days else {
            return Ok(reply(
                "📝 <b>Usage:</b>\n<code>/newcode &lt;days&gt;</code>\n\nExample: <code>/newcode 7</code> creates a code worth 7 days of access",
            ));
        };
        let days = match parse_days(&days) {
            Ok(days) => days,
            Err(message) => return Ok(reply(message)),
        };

        let code = match self.store.create_redeem_code(days, Some(&self.owner_id)) {
            Ok(code) => code,
            Err(StoreError::InvalidDays(_)) => return Ok(reply("⚠️ That number of days is too large.")),
            Err(e) => return Err(e),
        };
        Ok(reply(&format!(
            "🎫 <b>Redeem code created!</b>\n\n📋 Code: <code>{}</code>\n⏱ Duration: {} days\n\nShare this code with a user. They can run:\n<code>/redeem {}</code>",
            code, days, code
        )))
    }

    fn list_codes(&self) -> Result<Vec<Action>, StoreError> {
        let codes = self.store.list_codes()?;
        if codes.is_empty() {
            return Ok(reply("📋 No redeem codes."));
        }

        let (used, unused): (Vec<_>, Vec<_>) = codes.iter().partition(|(_, record)| record.used);
        let mut text = String::from("🎫 <b>Redeem codes</b>\n\n");

        if !unused.is_empty() {
            let lines: Vec<String> = unused
                .iter()
                .map(|(code, record)| format!("• <code>{}</code> ({} days) - 🟢 Active", code, record.days))
                .collect();
            text.push_str(&format!(
                "<b>🟢 Active codes ({}):</b>\n{}\n\n",
                unused.len(),
                lines.join("\n")
            ));
        }

        if !used.is_empty() {
            let shown = used.len().saturating_sub(USED_CODES_SHOWN);
            let lines: Vec<String> = used[shown..]
                .iter()
                .map(|(code, record)| {
                    format!(
                        "• <code>{}</code> ({} days) - ✅ Used by {}",
                        code,
                        record.days,
                        escape_html(record.used_by.as_deref().unwrap_or("unknown"))
                    )
                })
                .collect();
            text.push_str(&format!(
                "<b>✅ Used codes ({}):</b>\n{}",
                used.len(),
                lines.join("\n")
            ));
            if shown > 0 {
                text.push_str(&format!("\n... and {} more", shown));
            }
        }

        Ok(reply(text.trim_end()))
    }

    fn delete_code(&self, code: Option<String>) -> Result<Vec<Action>, StoreError> {
        let Some(code) = code else {
            return Ok(reply(
                "📝 <b>Usage:</b>\n<code>/delcode &lt;code&gt;</code>\n\nOnly unused codes can be deleted.",
            ));
        };

        let text = match self.store.delete_unused_code(&code) {
            Ok(()) => format!(
                "🗑 Code <code>{}</code> deleted.",
                escape_html(&code.to_uppercase())
            ),
            Err(StoreError::NotFound(_)) => "❌ Code not found.".to_string(),
            Err(StoreError::CodeInUse(_)) => {
                "⚠️ This code has been used and cannot be deleted.".to_string()
            }
            Err(e) => return Err(e),
        };
        Ok(reply(&text))
    }
}

fn reply(text: &str) -> Vec<Action> {
    vec![Action::Reply(text.to_string())]
}

fn broadcast(text: &str) -> Vec<Action> {
    if text.trim().is_empty() {
        return reply(
            "📝 <b>Usage:</b>\n<code>/broadcast &lt;message&gt;</code>\n\nExample: <code>/broadcast Hello everyone! Important update.</code>",
        );
    }
    vec![
        Action::Reply("📤 Sending broadcast...".to_string()),
        Action::Broadcast(format!(
            "📢 <b>BROADCAST from Admin</b>\n\n{}",
            escape_html(text)
        )),
    ]
}

fn display_name(sender: &Sender) -> String {
    match &sender.username {
        Some(username) => format!("@{}", escape_html(username)),
        None => "there".to_string(),
    }
}

fn parse_days(raw: &str) -> Result<i64, &'static str> {
    match raw.parse::<i64>() {
        Ok(days) if days > 0 => Ok(days),
        Ok(_) => Err("⚠️ Number of days must be greater than 0."),
        Err(_) => Err("⚠️ Number of days must be a number."),
    }
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format("%d %B %Y, %H:%M UTC").to_string()
}

/// Human description of an access status, e.g. `3 days 4 hours left`.
pub fn describe_access(status: AccessStatus, now: DateTime<Utc>) -> String {
    match status {
        AccessStatus::Permanent => "Permanent".to_string(),
        AccessStatus::NotEntitled => "None".to_string(),
        AccessStatus::Until(at) => {
            let remaining = at - now;
            if remaining <= chrono::TimeDelta::zero() {
                return "Expired".to_string();
            }
            let days = remaining.num_days();
            let hours = remaining.num_hours() - days * 24;
            if days > 0 {
                format!("{} days {} hours left", days, hours)
            } else {
                format!("{} hours left", hours)
            }
        }
    }
}
