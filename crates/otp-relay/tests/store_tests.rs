//! Entitlement store behaviour across handles, threads and restarts.

use std::sync::Arc;

use chrono::{TimeDelta, TimeZone, Utc};

use otp_relay::store::{AccessStatus, EntitlementStore, ManualClock, StoreError};

fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap())
}

#[test]
fn timed_grant_lapses_after_its_window() {
    let dir = tempfile::tempdir().unwrap();
    let clock = clock();
    let store = EntitlementStore::open_with_clock(dir.path(), Arc::new(clock.clone())).unwrap();

    store.grant("user1", Some(7)).unwrap();
    assert!(store.is_entitled("user1").unwrap());

    clock.advance(TimeDelta::days(8));
    assert!(!store.active_identities().unwrap().contains("user1"));
    assert!(!store.is_entitled("user1").unwrap());
}

#[test]
fn permanent_grant_never_lapses() {
    let dir = tempfile::tempdir().unwrap();
    let clock = clock();
    let store = EntitlementStore::open_with_clock(dir.path(), Arc::new(clock.clone())).unwrap();

    store.grant("user1", None).unwrap();
    clock.advance(TimeDelta::days(365 * 50));
    assert_eq!(store.check("user1").unwrap(), AccessStatus::Permanent);
}

#[test]
fn code_redeems_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = EntitlementStore::open(dir.path()).unwrap();

    let code = store.create_redeem_code(30, None).unwrap();
    assert_eq!(store.redeem(&code, "user1").unwrap(), 30);
    assert!(matches!(
        store.redeem(&code, "user2"),
        Err(StoreError::AlreadyUsed(_))
    ));
    assert!(matches!(
        store.redeem("ZZZZZZ", "user2"),
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_redemptions_have_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let store = EntitlementStore::open(dir.path()).unwrap();
    let code = store.create_redeem_code(5, None).unwrap();

    let tasks: Vec<_> = (0..2)
        .map(|i| {
            let store = store.clone();
            let code = code.clone();
            tokio::task::spawn_blocking(move || store.redeem_and_grant(&code, &format!("user{}", i)))
        })
        .collect();

    let mut successes = 0;
    let mut already_used = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(redemption) => {
                assert_eq!(redemption.days, 5);
                successes += 1;
            }
            Err(StoreError::AlreadyUsed(_)) => already_used += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!((successes, already_used), (1, 1));
    assert_eq!(store.active_identities().unwrap().len(), 1);
}

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let code = {
        let store = EntitlementStore::open(dir.path()).unwrap();
        store.grant("user1", Some(3)).unwrap();
        store.grant("user2", None).unwrap();
        store.create_redeem_code(10, Some("owner")).unwrap()
    };

    let store = EntitlementStore::open(dir.path()).unwrap();
    assert!(store.is_entitled("user1").unwrap());
    assert_eq!(store.check("user2").unwrap(), AccessStatus::Permanent);

    let codes = store.list_codes().unwrap();
    assert_eq!(codes.len(), 1);
    assert_eq!(codes[0].0, code);
    assert_eq!(codes[0].1.created_by.as_deref(), Some("owner"));
}

#[test]
fn legacy_identity_list_is_migrated() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("entitlements.json"), r#"["111", "222"]"#).unwrap();

    let store = EntitlementStore::open(dir.path()).unwrap();
    assert_eq!(store.check("111").unwrap(), AccessStatus::Permanent);
    assert_eq!(store.check("222").unwrap(), AccessStatus::Permanent);

    let migrated: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("entitlements.json")).unwrap())
            .unwrap();
    assert!(migrated.is_object());
    assert!(migrated["111"]["expires_at"].is_null());
}

#[test]
fn expiry_is_reported_once_per_lapse() {
    let dir = tempfile::tempdir().unwrap();
    let clock = clock();
    let store = EntitlementStore::open_with_clock(dir.path(), Arc::new(clock.clone())).unwrap();

    store.grant("user1", Some(1)).unwrap();
    store.grant("user2", None).unwrap();
    clock.advance(TimeDelta::days(2));

    assert_eq!(store.sweep_expirations().unwrap(), vec!["user1".to_string()]);
    assert!(store.sweep_expirations().unwrap().is_empty());

    // A renewed grant that lapses again is reported again.
    store.grant("user1", Some(1)).unwrap();
    clock.advance(TimeDelta::days(2));
    assert_eq!(store.sweep_expirations().unwrap(), vec!["user1".to_string()]);
}
