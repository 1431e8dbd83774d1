//! Text of the messages sent to recipients.

use crate::email::ParsedEmail;

use super::channel::ParseMode;

/// Longest email body, in characters, included in a notification.
pub const MAX_BODY_CHARS: usize = 3800;

const TRUNCATION_NOTICE: &str = "...\n[Message truncated because it is too long]";

/// Escapes the characters Telegram's HTML mode treats as markup.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn truncate_body(text: &str) -> String {
    match text.char_indices().nth(MAX_BODY_CHARS) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_NOTICE),
        None => text.to_string(),
    }
}

/// Renders the notification for one relayed email.
///
/// The extracted text is preferred over the raw text body. In HTML mode
/// every value taken from the email is escaped.
pub fn render_notification(email: &ParsedEmail, mode: ParseMode) -> String {
    let (bold_open, bold_close) = match mode {
        ParseMode::Html => ("<b>", "</b>"),
        ParseMode::Plain => ("", ""),
    };
    let field = |value: &str| match mode {
        ParseMode::Html => escape_html(value),
        ParseMode::Plain => value.to_string(),
    };
    let b = |label: &str| format!("{}{}{}", bold_open, label, bold_close);

    let mut message = format!("{}\n\n", b("📧 New Email"));
    message.push_str(&format!("{} {}\n", b("From:"), field(&email.from)));
    message.push_str(&format!("{} {}\n", b("Subject:"), field(&email.subject)));
    message.push_str(&format!(
        "{} {}\n\n",
        b("Date:"),
        email.date.format("%Y-%m-%d %H:%M:%S")
    ));

    if let Some(code) = email.otp_code() {
        let code = match mode {
            ParseMode::Html => format!("<code>{}</code>", code),
            ParseMode::Plain => code.to_string(),
        };
        message.push_str(&format!("{} {}\n\n", b("🔑 OTP CODE:"), code));
    }

    let full_text = email
        .extraction
        .as_ref()
        .map(|e| e.full_text())
        .filter(|t| !t.is_empty());
    if let Some(text) = full_text {
        message.push_str(&format!(
            "{}\n\n{}\n\n",
            b("Full email content:"),
            field(&truncate_body(text))
        ));
    } else if !email.body_text.is_empty() {
        message.push_str(&format!(
            "{}\n\n{}\n\n",
            b("Email body:"),
            field(&truncate_body(&email.body_text))
        ));
    }

    if !email.attachments.is_empty() {
        message.push_str(&format!(
            "{} {} file(s)\n",
            b("Attachments:"),
            email.attachments.len()
        ));
    }

    message
}

/// Caption sent with each forwarded attachment.
pub fn attachment_caption(email: &ParsedEmail) -> String {
    format!("Attachment from email: {}", email.subject)
}
