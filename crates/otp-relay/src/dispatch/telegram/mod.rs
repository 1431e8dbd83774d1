//! Telegram Bot API transport.

pub mod client;
pub mod types;

pub use client::TelegramClient;
pub use types::{Chat, Message, TelegramResponse, Update, User};
