//! HTTP client for the Telegram Bot API.
//!
//! Covers the methods the relay needs: `getMe`, `getUpdates`, `sendMessage`
//! and `sendDocument`. Every error string passes through
//! [`redact_bot_token`] because request URLs embed the token.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::config::TelegramConfig;
use crate::dispatch::channel::{ChatChannel, ParseMode};
use crate::dispatch::error::{DispatchError, Result};
use crate::sanitize::redact_bot_token;

use super::types::{Message, SendMessageRequest, TelegramResponse, Update, User};

/// Bot API client. The base URL carries the token, so this type is
/// deliberately not `Debug`.
pub struct TelegramClient {
    http: Client,
    base_url: String,
    request_timeout: Duration,
}

impl TelegramClient {
    /// Creates a client against `api_base_url` (for example
    /// `https://api.telegram.org`).
    pub fn new(api_base_url: &str, token: &SecretString, request_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(http_error)?;
        let base_url = format!(
            "{}/bot{}",
            api_base_url.trim_end_matches('/'),
            token.expose_secret()
        );
        Ok(Self {
            http,
            base_url,
            request_timeout,
        })
    }

    pub fn from_config(config: &TelegramConfig, token: &SecretString) -> Result<Self> {
        Self::new(
            &config.api_base_url,
            token,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &'static str, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(http_error)?;

        // Error responses still carry the JSON envelope, so the status code
        // is not checked separately.
        let body: TelegramResponse<T> =
            response
                .json()
                .await
                .map_err(|e| DispatchError::InvalidResponse {
                    method,
                    reason: redact_bot_token(&e.to_string()),
                })?;

        if !body.ok {
            return Err(DispatchError::Api {
                method,
                description: body
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        body.result.ok_or_else(|| DispatchError::InvalidResponse {
            method,
            reason: "missing result".to_string(),
        })
    }

    /// Verifies the token and returns the bot account.
    pub async fn get_me(&self) -> Result<User> {
        debug!("Verifying bot token");
        self.call("getMe", self.http.get(self.url("getMe"))).await
    }

    /// Long-polls for updates starting at `offset`. The request is allowed
    /// to run `poll_timeout_secs` past the normal request timeout.
    pub async fn get_updates(&self, offset: Option<i64>, poll_timeout_secs: u64) -> Result<Vec<Update>> {
        let mut query: Vec<(&str, String)> = vec![
            ("timeout", poll_timeout_secs.to_string()),
            ("allowed_updates", r#"["message"]"#.to_string()),
        ];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        trace!(?offset, "Polling for updates");
        let request = self
            .http
            .get(self.url("getUpdates"))
            .query(&query)
            .timeout(self.request_timeout + Duration::from_secs(poll_timeout_secs));

        let updates: Vec<Update> = self.call("getUpdates", request).await?;
        if !updates.is_empty() {
            debug!(count = updates.len(), "Received updates");
        }
        Ok(updates)
    }

    pub async fn send_message(&self, chat_id: &str, text: &str, mode: ParseMode) -> Result<Message> {
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: mode.as_api_value(),
            disable_web_page_preview: true,
        };
        debug!(chat_id, ?mode, "Sending message");
        self.call(
            "sendMessage",
            self.http.post(self.url("sendMessage")).json(&request),
        )
        .await
    }

    /// Uploads the file at `path` under the name `filename`.
    pub async fn send_document(
        &self,
        chat_id: &str,
        path: &Path,
        filename: &str,
        caption: Option<&str>,
    ) -> Result<Message> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| DispatchError::Staging {
                filename: filename.to_string(),
                source,
            })?;

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", Part::bytes(data).file_name(filename.to_string()));
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }

        debug!(chat_id, filename, "Sending document");
        self.call(
            "sendDocument",
            self.http.post(self.url("sendDocument")).multipart(form),
        )
        .await
    }
}

#[async_trait]
impl ChatChannel for TelegramClient {
    async fn send_text(&self, recipient: &str, text: &str, mode: ParseMode) -> Result<()> {
        self.send_message(recipient, text, mode).await.map(|_| ())
    }

    async fn send_document(
        &self,
        recipient: &str,
        data: &[u8],
        filename: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        let staging_error = |source| DispatchError::Staging {
            filename: filename.to_string(),
            source,
        };
        let mut staged = NamedTempFile::new().map_err(staging_error)?;
        staged.write_all(data).map_err(staging_error)?;

        let result = TelegramClient::send_document(self, recipient, staged.path(), filename, caption).await;
        // The staged copy is removed whether or not the upload succeeded.
        drop(staged);
        result.map(|_| ())
    }
}

fn http_error(e: reqwest::Error) -> DispatchError {
    DispatchError::Http(redact_bot_token(&e.to_string()))
}
