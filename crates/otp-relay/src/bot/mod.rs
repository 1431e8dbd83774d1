//! Telegram command layer.
//!
//! [`Command::parse`] turns message text into a [`Command`];
//! [`CommandHandler`] applies it to the entitlement store and returns the
//! [`Action`]s the worker should send.

pub mod commands;
pub mod handler;

pub use commands::Command;
pub use handler::{describe_access, Action, CommandHandler, Sender, StatusInfo};
