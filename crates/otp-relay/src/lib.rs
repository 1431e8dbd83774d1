//! Relays one-time-passcode emails from an IMAP mailbox to the Telegram
//! chats that currently hold access.
//!
//! The moving parts:
//!
//! - [`email`] polls the mailbox and extracts the passcode from each message
//! - [`store`] keeps entitlements and redeem codes in JSON files
//! - [`dispatch`] renders notifications and fans them out over Telegram
//! - [`bot`] handles the owner's and users' chat commands
//! - [`worker`] ties them together in one loop

pub mod bot;
pub mod config;
pub mod dispatch;
pub mod email;
pub mod error;
pub mod sanitize;
pub mod secrets;
pub mod store;
pub mod telemetry;
pub mod worker;

pub use bot::{Command, CommandHandler};
pub use config::{load_config, Config, FilterCriteria, SettingsSource};
pub use dispatch::{ChatChannel, Dispatcher, ParseMode, TelegramClient};
pub use email::{InboxScanner, NotificationEvent, ParsedEmail};
pub use error::{ConfigError, RelayError, Result};
pub use secrets::{resolve_secret, SecretError, SecretRef};
pub use store::{AccessStatus, EntitlementStore, StoreError};
pub use worker::RelayWorker;
