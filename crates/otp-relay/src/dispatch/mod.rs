//! Delivery of relayed emails and bot replies.
//!
//! [`ChatChannel`] is the seam between the relay and the chat transport;
//! [`TelegramClient`] implements it over the Bot HTTP API and [`Dispatcher`]
//! fans notifications out over it.

pub mod channel;
pub mod error;
pub mod fanout;
pub mod render;
pub mod telegram;

pub use channel::{ChatChannel, ParseMode};
pub use error::DispatchError;
pub use fanout::{DispatchReport, Dispatcher};
pub use render::{escape_html, render_notification};
pub use telegram::TelegramClient;
