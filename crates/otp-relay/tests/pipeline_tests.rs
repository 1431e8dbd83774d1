//! End-to-end tests: fake mailbox in, recorded chat messages out.

mod common;

use std::sync::Arc;

use otp_relay::config::FilterCriteria;
use otp_relay::dispatch::{Dispatcher, ParseMode};
use otp_relay::email::{extract, InboxScanner};
use otp_relay::store::EntitlementStore;

use common::{raw_email, raw_email_with_attachment, FakeMailbox, RecordingChannel, Sent};

struct Relay {
    mailbox: FakeMailbox,
    scanner: InboxScanner,
    store: EntitlementStore,
    channel: Arc<RecordingChannel>,
    dispatcher: Dispatcher,
    _dir: tempfile::TempDir,
}

fn relay_with(mailbox: FakeMailbox, channel: RecordingChannel) -> Relay {
    let dir = tempfile::tempdir().unwrap();
    let store = EntitlementStore::open(dir.path()).unwrap();
    let channel = Arc::new(channel);
    let dispatcher = Dispatcher::new(channel.clone(), store.clone());
    Relay {
        scanner: InboxScanner::new(Arc::new(mailbox.clone()), 50),
        mailbox,
        store,
        channel,
        dispatcher,
        _dir: dir,
    }
}

fn relay() -> Relay {
    relay_with(FakeMailbox::new(), RecordingChannel::new())
}

#[test]
fn table_scenario_extracts_code_and_cell_text() {
    let result = extract("<table><td>Your code: 482913</td></table>", true);
    assert_eq!(result.otp_code(), Some("482913"));
    assert!(result.otp_context().unwrap().contains("Your code: 482913"));
}

#[tokio::test]
async fn otp_email_reaches_every_entitled_recipient() {
    let mut relay = relay();
    relay.store.grant("100", None).unwrap();
    relay.store.grant("200", Some(7)).unwrap();
    relay.mailbox.deliver(
        "1",
        raw_email(
            "Bank <otp@bank.test>",
            "Your login code",
            "text/html",
            "<table><td>Your code: 482913</td></table>",
        ),
    );

    let events = relay.scanner.scan(&FilterCriteria::default()).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].email.otp_code(), Some("482913"));

    let report = relay.dispatcher.dispatch_event(&events[0]).await.unwrap();
    assert_eq!(report.recipients, 2);
    assert_eq!(report.delivered, 2);

    for recipient in ["100", "200"] {
        let texts = relay.channel.texts_to(recipient);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("<code>482913</code>"));
        assert!(texts[0].contains("Bank &lt;otp@bank.test&gt;"));
    }
    assert_eq!(relay.mailbox.unseen_count(), 0);
}

#[tokio::test]
async fn filtered_out_email_is_consumed_but_not_relayed() {
    let mut relay = relay();
    relay.store.grant("100", None).unwrap();
    relay.mailbox.deliver(
        "1",
        raw_email("news@shop.test", "Weekly deals", "text/plain", "Save 123456 today"),
    );

    let criteria = FilterCriteria::new("bank.test", "");
    let events = relay.scanner.scan(&criteria).await;
    assert!(events.is_empty());
    assert_eq!(relay.scanner.processed_count(), 1);
    assert!(relay.channel.sent().is_empty());
}

#[tokio::test]
async fn subject_only_filter_ignores_sender() {
    let mut relay = relay();
    relay.mailbox.deliver(
        "1",
        raw_email("anyone@x.test", "Verification CODE", "text/plain", "999999"),
    );
    relay.mailbox.deliver(
        "2",
        raw_email("anyone@x.test", "Newsletter", "text/plain", "888888"),
    );

    let events = relay
        .scanner
        .scan(&FilterCriteria::new("", "verification code"))
        .await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].email.otp_code(), Some("999999"));
}

#[tokio::test]
async fn duplicate_ids_in_one_session_yield_one_event() {
    let mut relay = relay_with(FakeMailbox::with_duplicate_search(), RecordingChannel::new());
    relay
        .mailbox
        .deliver("7", raw_email("a@b.test", "Code", "text/plain", "123456"));

    let events = relay.scanner.scan(&FilterCriteria::default()).await;
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn attachments_are_forwarded_as_documents() {
    let mut relay = relay();
    relay.store.grant("100", None).unwrap();
    relay.mailbox.deliver(
        "1",
        raw_email_with_attachment(
            "billing@acme.test",
            "Invoice",
            "<p>Code 246810</p>",
            "invoice.pdf",
            "JVBERi0=",
        ),
    );

    let events = relay.scanner.scan(&FilterCriteria::default()).await;
    let report = relay.dispatcher.dispatch_event(&events[0]).await.unwrap();
    assert_eq!(report.documents_delivered, 1);
    assert_eq!(relay.channel.documents_to("100"), vec!["invoice.pdf"]);

    let data = relay.channel.sent().into_iter().find_map(|s| match s {
        Sent::Document { data, .. } => Some(data),
        _ => None,
    });
    assert_eq!(data.as_deref(), Some(&b"%PDF-"[..]));
    assert!(relay.channel.texts_to("100")[0].contains("Attachments:</b> 1 file(s)"));
}

#[tokio::test]
async fn unreachable_recipient_does_not_block_others() {
    let mut relay = relay_with(
        FakeMailbox::new(),
        RecordingChannel::with_unreachable(&["200"]),
    );
    for id in ["100", "200", "300"] {
        relay.store.grant(id, None).unwrap();
    }
    relay
        .mailbox
        .deliver("1", raw_email("a@b.test", "Code", "text/plain", "Code 123456"));

    let events = relay.scanner.scan(&FilterCriteria::default()).await;
    let report = relay.dispatcher.dispatch_event(&events[0]).await.unwrap();
    assert_eq!(report.recipients, 3);
    assert_eq!(report.delivered, 2);
    assert!(!report.used_plain_fallback);
    assert!(relay
        .channel
        .sent()
        .iter()
        .all(|s| matches!(s, Sent::Text { mode: ParseMode::Html, .. })));
}

#[tokio::test]
async fn email_without_code_is_still_relayed() {
    let mut relay = relay();
    relay.store.grant("100", None).unwrap();
    relay.mailbox.deliver(
        "1",
        raw_email("a@b.test", "Hello", "text/plain", "No digits here"),
    );

    let events = relay.scanner.scan(&FilterCriteria::default()).await;
    assert_eq!(events[0].email.otp_code(), None);
    relay.dispatcher.dispatch_event(&events[0]).await.unwrap();

    let text = &relay.channel.texts_to("100")[0];
    assert!(!text.contains("OTP CODE"));
    assert!(text.contains("No digits here"));
}

#[tokio::test]
async fn latin1_body_labelled_utf8_is_relayed_intact() {
    let mut relay = relay();
    relay.store.grant("100", None).unwrap();
    // 0xFC is "ü" in Latin-1 and invalid on its own in UTF-8.
    let bytes: Vec<u8> = raw_email("a@b.test", "Code", "text/plain", "F#r Sie: 271828")
        .into_iter()
        .map(|b| if b == b'#' { 0xfc } else { b })
        .collect();
    relay.mailbox.deliver("1", bytes);

    let events = relay.scanner.scan(&FilterCriteria::default()).await;
    assert_eq!(events.len(), 1);
    assert!(events[0].email.body_text.contains("Für Sie: 271828"));
    assert_eq!(events[0].email.otp_code(), Some("271828"));

    relay.dispatcher.dispatch_event(&events[0]).await.unwrap();
    let text = &relay.channel.texts_to("100")[0];
    assert!(text.contains("Für Sie"));
    assert!(!text.contains('\u{FFFD}'));
}
