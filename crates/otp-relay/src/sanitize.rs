//! Helpers for scrubbing credentials out of log lines.
//!
//! The Telegram bot token is part of every API URL, and HTTP client errors
//! echo the URL back. These functions make such strings safe to log.

use std::sync::OnceLock;

use regex::Regex;

fn bot_token_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"bot[0-9]+:[A-Za-z0-9_-]+").expect("valid bot token regex")
    })
}

/// Replaces every `bot<id>:<secret>` token in `text`.
///
/// - `https://api.telegram.org/bot123:ABC/getMe` → `https://api.telegram.org/bot****/getMe`
/// - `connection refused` → `connection refused` (no change)
pub fn redact_bot_token(text: &str) -> String {
    bot_token_regex().replace_all(text, "bot****").into_owned()
}

/// Masks the local part of an email address, keeping its first character.
///
/// - `alice@example.com` → `a****@example.com`
/// - `not-an-address` → `****`
pub fn redact_address(address: &str) -> String {
    match address.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{}****@{}", first, domain)
        }
        None => "****".to_string(),
    }
}
