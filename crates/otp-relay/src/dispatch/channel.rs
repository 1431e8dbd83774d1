//! Outbound chat channel boundary.

use async_trait::async_trait;

use super::error::Result;

/// How the receiving client should interpret message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Telegram's HTML subset. Text must escape `&`, `<` and `>`.
    Html,
    Plain,
}

impl ParseMode {
    /// Value for the Bot API `parse_mode` field.
    pub fn as_api_value(self) -> Option<&'static str> {
        match self {
            ParseMode::Html => Some("HTML"),
            ParseMode::Plain => None,
        }
    }
}

/// Something that can deliver messages to a recipient identity.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    async fn send_text(&self, recipient: &str, text: &str, mode: ParseMode) -> Result<()>;

    /// Uploads `data` as a file named `filename`. The caption is plain text.
    async fn send_document(
        &self,
        recipient: &str,
        data: &[u8],
        filename: &str,
        caption: Option<&str>,
    ) -> Result<()>;
}
