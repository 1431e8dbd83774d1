use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::secrets::SecretRef;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub filter: FilterCriteria,
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Seconds between two poll cycles.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_check_interval() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub use_tls: bool,
    pub username: String,
    pub password: SecretRef,
    #[serde(default = "default_folder")]
    pub folder: String,
    /// Upper bound on messages fetched in one cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Timeout applied to connect, search and each fetch.
    #[serde(default = "default_mailbox_timeout")]
    pub timeout_secs: u64,
}

fn default_imap_port() -> u16 {
    993
}

fn default_true() -> bool {
    true
}

fn default_folder() -> String {
    "INBOX".to_string()
}

fn default_batch_size() -> u32 {
    50
}

fn default_mailbox_timeout() -> u64 {
    30
}

/// Sender/subject criteria an email must satisfy to be forwarded.
///
/// Both fields are case-insensitive substrings. Leaving both empty forwards
/// every unseen message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub subject: String,
}

impl FilterCriteria {
    pub fn new(sender: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            subject: subject.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: SecretRef,
    /// Chat id of the bot owner. The owner always holds permanent access and
    /// is the only one allowed to run administrative commands.
    pub owner_id: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Timeout for a single outbound API call.
    #[serde(default = "default_send_timeout")]
    pub timeout_secs: u64,
    /// Long-poll timeout used when waiting for commands.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_send_timeout() -> u64 {
    30
}

fn default_poll_timeout() -> u64 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding `entitlements.json`, `redeem_codes.json` and
    /// `notified_expiry.json`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".otp-relay").join("data"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// Returns the canonical config path: `~/.otp-relay/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".otp-relay").join("config.json"))
}
