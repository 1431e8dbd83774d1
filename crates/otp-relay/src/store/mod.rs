//! Entitlement store.
//!
//! Tracks who may receive relayed emails and until when, the redeem codes
//! that grant timed access, and which expired identities have already been
//! told about it. Each of the three maps lives in its own JSON document in
//! the data directory.
//!
//! All access goes through one `Mutex`, held for a whole logical operation
//! including the write to disk. No method awaits, so the lock is never held
//! across network I/O.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};

pub mod clock;
pub mod codes;
pub mod document;
pub mod error;
pub mod records;

pub use clock::{Clock, ManualClock, SystemClock};
pub use document::JsonDocument;
pub use error::StoreError;
pub use records::{Entitlement, RedeemCode};

use error::Result;
use records::{CodeMap, EntitlementMap, EntitlementsFile, NotifiedMap};

pub const ENTITLEMENTS_FILE: &str = "entitlements.json";
pub const REDEEM_CODES_FILE: &str = "redeem_codes.json";
pub const NOTIFIED_FILE: &str = "notified_expiry.json";

/// What an identity currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    Permanent,
    Until(DateTime<Utc>),
    NotEntitled,
}

/// Result of a successful code redemption through [`EntitlementStore::redeem_and_grant`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub code: String,
    pub days: i64,
    pub expires_at: DateTime<Utc>,
}

struct Documents {
    entitlements: JsonDocument<EntitlementMap>,
    codes: JsonDocument<CodeMap>,
    notified: JsonDocument<NotifiedMap>,
}

struct State {
    entitlements: EntitlementMap,
    codes: CodeMap,
    notified: NotifiedMap,
    docs: Documents,
    /// No entitlements document existed when the store was opened.
    fresh: bool,
}

impl State {
    fn save_entitlements(&self) -> Result<()> {
        self.docs.entitlements.save(&self.entitlements)
    }

    fn save_codes(&self) -> Result<()> {
        self.docs.codes.save(&self.codes)
    }

    fn save_notified(&self) -> Result<()> {
        self.docs.notified.save(&self.notified)
    }

    /// Drops `identity` if its access has run out. Nothing is written.
    ///
    /// Returns `None` if nothing was dropped, otherwise whether an expiry
    /// notice marker was cleared along with it.
    fn purge_if_expired(&mut self, identity: &str, now: DateTime<Utc>) -> Option<bool> {
        let expired = self
            .entitlements
            .get(identity)
            .is_some_and(|e| e.is_expired(now));
        if !expired {
            return None;
        }
        self.entitlements.remove(identity);
        info!("Access for {} expired, removed", identity);
        Some(self.notified.remove(identity).is_some())
    }

    /// Drops every expired identity and persists once if anything changed.
    fn purge_all_expired(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let expired: Vec<String> = self
            .entitlements
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();

        let mut notified_changed = false;
        for id in &expired {
            self.entitlements.remove(id);
            notified_changed |= self.notified.remove(id).is_some();
            info!("Access for {} expired, removed", id);
        }

        if !expired.is_empty() {
            self.save_entitlements()?;
            if notified_changed {
                self.save_notified()?;
            }
        }
        Ok(expired.len())
    }

    fn status_of(&self, identity: &str) -> AccessStatus {
        match self.entitlements.get(identity) {
            None => AccessStatus::NotEntitled,
            Some(Entitlement { expires_at: None }) => AccessStatus::Permanent,
            Some(Entitlement {
                expires_at: Some(at),
            }) => AccessStatus::Until(*at),
        }
    }

    /// Marks `code` used by `identity`. Check and mark happen under the
    /// caller's lock, so only one redemption of a code can succeed.
    fn use_code(&mut self, code: &str, identity: &str, now: DateTime<Utc>) -> Result<(String, i64)> {
        let key = codes::normalize_code(code);
        let record = self
            .codes
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        if record.used {
            return Err(StoreError::AlreadyUsed(key));
        }

        record.used = true;
        record.used_by = Some(identity.to_string());
        record.used_at = Some(now);
        let days = record.days;
        self.save_codes()?;

        info!("Redeem code {} used by {} ({} days)", key, identity, days);
        Ok((key, days))
    }

    fn grant(&mut self, identity: &str, expires_at: Option<DateTime<Utc>>) -> Result<()> {
        self.entitlements
            .insert(identity.to_string(), Entitlement { expires_at });
        let cleared = self.notified.remove(identity).is_some();

        self.save_entitlements()?;
        if cleared {
            self.save_notified()?;
        }
        Ok(())
    }
}

/// Shared handle to the entitlement store. Clones refer to the same state.
#[derive(Clone)]
pub struct EntitlementStore {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
    dir: PathBuf,
}

impl EntitlementStore {
    /// Opens (or creates) the store in `dir` using wall-clock time.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_clock(dir, Arc::new(SystemClock))
    }

    /// Opens the store with an explicit time source.
    ///
    /// A legacy entitlements file (a plain list of identities) is rewritten
    /// in place as a map of permanent entitlements.
    pub fn open_with_clock(dir: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Persistence {
            path: dir.clone(),
            source,
        })?;

        let entitlements_path = dir.join(ENTITLEMENTS_FILE);
        let legacy: JsonDocument<EntitlementsFile> = JsonDocument::new(&entitlements_path);
        let fresh = !legacy.exists();
        let (entitlements, migrated) = legacy.load()?.into_current();

        let docs = Documents {
            entitlements: JsonDocument::new(entitlements_path),
            codes: JsonDocument::new(dir.join(REDEEM_CODES_FILE)),
            notified: JsonDocument::new(dir.join(NOTIFIED_FILE)),
        };

        if migrated {
            docs.entitlements.save(&entitlements)?;
            info!(
                "Migrated {} entitlements from the legacy list format",
                entitlements.len()
            );
        }

        let codes = docs.codes.load()?;
        let notified = docs.notified.load()?;

        info!(
            "Entitlement store opened at {} ({} entitlements, {} redeem codes)",
            dir.display(),
            entitlements.len(),
            codes.len()
        );

        Ok(Self {
            state: Arc::new(Mutex::new(State {
                entitlements,
                codes,
                notified,
                docs,
                fresh,
            })),
            clock,
            dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.dir
    }

    /// Current time as seen by the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State, DateTime<Utc>) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock().map_err(|_| StoreError::LockPoisoned)?;
        let now = self.clock.now();
        f(&mut state, now)
    }

    /// Seeds `owner` with permanent access when the store was created empty.
    /// Returns true if the owner was added.
    pub fn ensure_owner(&self, owner: &str) -> Result<bool> {
        self.with_state(|state, _| {
            if !state.fresh || state.entitlements.contains_key(owner) {
                return Ok(false);
            }
            state.grant(owner, None)?;
            state.fresh = false;
            info!("Seeded owner {} with permanent access", owner);
            Ok(true)
        })
    }

    /// Grants access to `identity`, replacing any previous expiry.
    ///
    /// `None` or a non-positive number of days grants permanent access.
    /// Returns the new expiry.
    pub fn grant(&self, identity: &str, days: Option<i64>) -> Result<Option<DateTime<Utc>>> {
        self.with_state(|state, now| {
            let expires_at = match days {
                Some(d) if d > 0 => Some(add_days(now, d)?),
                _ => None,
            };
            state.grant(identity, expires_at)?;
            match expires_at {
                Some(at) => info!("Granted {} access until {}", identity, at),
                None => info!("Granted {} permanent access", identity),
            }
            Ok(expires_at)
        })
    }

    /// Removes `identity`. Returns false if it held no entitlement.
    pub fn revoke(&self, identity: &str) -> Result<bool> {
        self.with_state(|state, _| {
            if state.entitlements.remove(identity).is_none() {
                return Ok(false);
            }
            let cleared = state.notified.remove(identity).is_some();
            state.save_entitlements()?;
            if cleared {
                state.save_notified()?;
            }
            info!("Revoked access for {}", identity);
            Ok(true)
        })
    }

    /// True if `identity` currently holds access. An expired record is
    /// purged on the spot.
    pub fn is_entitled(&self, identity: &str) -> Result<bool> {
        Ok(self.check(identity)? != AccessStatus::NotEntitled)
    }

    /// Current access of `identity`, purging it first if expired.
    pub fn check(&self, identity: &str) -> Result<AccessStatus> {
        self.with_state(|state, now| {
            if let Some(marker_cleared) = state.purge_if_expired(identity, now) {
                state.save_entitlements()?;
                if marker_cleared {
                    state.save_notified()?;
                }
            }
            Ok(state.status_of(identity))
        })
    }

    /// Every identity with access right now. Expired records found along the
    /// way are purged with a single write.
    pub fn active_identities(&self) -> Result<BTreeSet<String>> {
        self.with_state(|state, now| {
            state.purge_all_expired(now)?;
            Ok(state.entitlements.keys().cloned().collect())
        })
    }

    /// Identities with access and their expiry, after purging expired ones.
    pub fn list_entitlements(&self) -> Result<Vec<(String, Option<DateTime<Utc>>)>> {
        self.with_state(|state, now| {
            state.purge_all_expired(now)?;
            Ok(state
                .entitlements
                .iter()
                .map(|(id, e)| (id.clone(), e.expires_at))
                .collect())
        })
    }

    /// Creates a new unused code worth `days` of access.
    pub fn create_redeem_code(&self, days: i64, created_by: Option<&str>) -> Result<String> {
        if days <= 0 {
            return Err(StoreError::InvalidDays(days));
        }
        self.with_state(|state, now| {
            add_days(now, days)?;
            let code = codes::generate_unique_code(|c| state.codes.contains_key(c))?;
            state.codes.insert(
                code.clone(),
                RedeemCode {
                    days,
                    created_at: now,
                    created_by: created_by.map(str::to_string),
                    used: false,
                    used_by: None,
                    used_at: None,
                },
            );
            state.save_codes()?;
            info!("Created redeem code {} ({} days)", code, days);
            Ok(code)
        })
    }

    /// Marks `code` as used by `identity` and returns its number of days.
    /// The lookup ignores case and surrounding whitespace.
    pub fn redeem(&self, code: &str, identity: &str) -> Result<i64> {
        self.with_state(|state, now| state.use_code(code, identity, now).map(|(_, days)| days))
    }

    /// Redeems `code` and grants the resulting access in one step.
    ///
    /// Fails with [`StoreError::AlreadyPermanent`] without touching the code
    /// when `identity` already has permanent access.
    pub fn redeem_and_grant(&self, code: &str, identity: &str) -> Result<Redemption> {
        self.with_state(|state, now| {
            let marker_cleared = state.purge_if_expired(identity, now) == Some(true);
            if state.status_of(identity) == AccessStatus::Permanent {
                return Err(StoreError::AlreadyPermanent(identity.to_string()));
            }

            let (code, days) = state.use_code(code, identity, now)?;
            let expires_at = add_days(now, days)?;
            state.grant(identity, Some(expires_at))?;
            if marker_cleared {
                state.save_notified()?;
            }
            Ok(Redemption {
                code,
                days,
                expires_at,
            })
        })
    }

    /// All codes, oldest first.
    pub fn list_codes(&self) -> Result<Vec<(String, RedeemCode)>> {
        self.with_state(|state, _| {
            let mut codes: Vec<(String, RedeemCode)> = state
                .codes
                .iter()
                .map(|(code, record)| (code.clone(), record.clone()))
                .collect();
            codes.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at).then(a.0.cmp(&b.0)));
            Ok(codes)
        })
    }

    /// Deletes a code that has not been used.
    pub fn delete_unused_code(&self, code: &str) -> Result<()> {
        self.with_state(|state, _| {
            let key = codes::normalize_code(code);
            match state.codes.get(&key) {
                None => return Err(StoreError::NotFound(key)),
                Some(record) if record.used => return Err(StoreError::CodeInUse(key)),
                Some(_) => {}
            }
            state.codes.remove(&key);
            state.save_codes()?;
            info!("Deleted redeem code {}", key);
            Ok(())
        })
    }

    /// Finds identities whose access has run out, purges them, and returns
    /// the ones that have not been sent an expiry notice yet.
    ///
    /// The notice marker is written before the purge. If the purge cannot be
    /// persisted the records stay, and the next sweep purges them without
    /// reporting them again.
    pub fn sweep_expirations(&self) -> Result<Vec<String>> {
        self.with_state(|state, now| {
            let expired: Vec<String> = state
                .entitlements
                .iter()
                .filter(|(_, e)| e.is_expired(now))
                .map(|(id, _)| id.clone())
                .collect();
            if expired.is_empty() {
                return Ok(Vec::new());
            }

            let mut to_notify = Vec::new();
            for id in &expired {
                if !state.notified.contains_key(id) {
                    state.notified.insert(id.clone(), now);
                    to_notify.push(id.clone());
                }
            }
            if !to_notify.is_empty() {
                state.save_notified()?;
            }

            let removed: Vec<(String, Entitlement)> = expired
                .iter()
                .filter_map(|id| state.entitlements.remove_entry(id))
                .collect();
            if let Err(e) = state.save_entitlements() {
                warn!("Failed to persist expiry purge, will retry next sweep: {}", e);
                state.entitlements.extend(removed);
                return Ok(to_notify);
            }

            for id in &expired {
                state.notified.remove(id);
            }
            if let Err(e) = state.save_notified() {
                warn!("Failed to clear expiry notice markers: {}", e);
            }

            info!(
                "Expiry sweep removed {} identities, {} to notify",
                expired.len(),
                to_notify.len()
            );
            debug!("Expired identities: {:?}", expired);
            Ok(to_notify)
        })
    }
}

fn add_days(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    TimeDelta::try_days(days)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or(StoreError::InvalidDays(days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    fn open_store() -> (EntitlementStore, ManualClock, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(start());
        let store = EntitlementStore::open_with_clock(dir.path(), Arc::new(clock.clone())).unwrap();
        (store, clock, dir)
    }

    fn reopen(dir: &TempDir, clock: &ManualClock) -> EntitlementStore {
        EntitlementStore::open_with_clock(dir.path(), Arc::new(clock.clone())).unwrap()
    }

    #[test]
    fn test_timed_grant_expires() {
        let (store, clock, _dir) = open_store();
        let expires = store.grant("alice", Some(7)).unwrap();
        assert_eq!(expires, Some(start() + TimeDelta::days(7)));
        assert!(store.is_entitled("alice").unwrap());

        clock.advance(TimeDelta::days(8));
        assert!(!store.is_entitled("alice").unwrap());
        assert!(!store.active_identities().unwrap().contains("alice"));
    }

    #[test]
    fn test_permanent_grant_never_expires() {
        let (store, clock, _dir) = open_store();
        assert_eq!(store.grant("bob", None).unwrap(), None);
        assert_eq!(store.grant("carol", Some(0)).unwrap(), None);
        assert_eq!(store.grant("dave", Some(-3)).unwrap(), None);

        clock.advance(TimeDelta::days(365 * 50));
        for id in ["bob", "carol", "dave"] {
            assert!(store.is_entitled(id).unwrap());
            assert_eq!(store.check(id).unwrap(), AccessStatus::Permanent);
        }
    }

    #[test]
    fn test_regrant_replaces_expiry() {
        let (store, _clock, _dir) = open_store();
        store.grant("erin", None).unwrap();
        store.grant("erin", Some(3)).unwrap();
        assert_eq!(
            store.check("erin").unwrap(),
            AccessStatus::Until(start() + TimeDelta::days(3))
        );
    }

    #[test]
    fn test_revoke() {
        let (store, _clock, _dir) = open_store();
        store.grant("frank", None).unwrap();
        assert!(store.revoke("frank").unwrap());
        assert!(!store.revoke("frank").unwrap());
        assert!(!store.is_entitled("frank").unwrap());
    }

    #[test]
    fn test_lazy_purge_is_persisted() {
        let (store, clock, dir) = open_store();
        store.grant("gina", Some(1)).unwrap();
        clock.advance(TimeDelta::days(2));
        assert_eq!(store.check("gina").unwrap(), AccessStatus::NotEntitled);

        clock.set(start());
        let reopened = reopen(&dir, &clock);
        assert!(!reopened.is_entitled("gina").unwrap());
    }

    #[test]
    fn test_redeem_code_once() {
        let (store, _clock, _dir) = open_store();
        let code = store.create_redeem_code(30, Some("owner")).unwrap();

        assert_eq!(store.redeem(&code, "user1").unwrap(), 30);
        assert!(matches!(
            store.redeem(&code, "user2"),
            Err(StoreError::AlreadyUsed(_))
        ));

        let codes = store.list_codes().unwrap();
        let (_, record) = codes.iter().find(|(c, _)| c == &code).unwrap();
        assert!(record.used);
        assert_eq!(record.used_by.as_deref(), Some("user1"));
        assert_eq!(record.used_at, Some(start()));
        assert_eq!(record.created_by.as_deref(), Some("owner"));
    }

    #[test]
    fn test_redeem_is_case_insensitive() {
        let (store, _clock, _dir) = open_store();
        let code = store.create_redeem_code(5, None).unwrap();
        assert_eq!(store.redeem(&format!(" {} ", code.to_lowercase()), "u").unwrap(), 5);
    }

    #[test]
    fn test_redeem_unknown_code() {
        let (store, _clock, _dir) = open_store();
        assert!(matches!(
            store.redeem("NOPE42", "u"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_create_code_rejects_non_positive_days() {
        let (store, _clock, _dir) = open_store();
        assert!(matches!(
            store.create_redeem_code(0, None),
            Err(StoreError::InvalidDays(0))
        ));
        assert!(matches!(
            store.create_redeem_code(i64::MAX, None),
            Err(StoreError::InvalidDays(_))
        ));
    }

    #[test]
    fn test_concurrent_redeem_single_winner() {
        let (store, _clock, _dir) = open_store();
        let code = store.create_redeem_code(14, None).unwrap();
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let code = code.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    store.redeem(&code, &format!("user{}", i))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| matches!(r, Ok(14))).count();
        let used = results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::AlreadyUsed(_))))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(used, 7);
    }

    #[test]
    fn test_redeem_and_grant() {
        let (store, _clock, _dir) = open_store();
        let code = store.create_redeem_code(10, None).unwrap();

        let redemption = store.redeem_and_grant(&code, "hank").unwrap();
        assert_eq!(redemption.days, 10);
        assert_eq!(redemption.expires_at, start() + TimeDelta::days(10));
        assert_eq!(
            store.check("hank").unwrap(),
            AccessStatus::Until(redemption.expires_at)
        );
    }

    #[test]
    fn test_redeem_and_grant_keeps_code_for_permanent_holder() {
        let (store, _clock, _dir) = open_store();
        store.grant("ivy", None).unwrap();
        let code = store.create_redeem_code(10, None).unwrap();

        assert!(matches!(
            store.redeem_and_grant(&code, "ivy"),
            Err(StoreError::AlreadyPermanent(_))
        ));
        assert_eq!(store.redeem(&code, "jack").unwrap(), 10);
    }

    #[test]
    fn test_delete_unused_code() {
        let (store, _clock, _dir) = open_store();
        let unused = store.create_redeem_code(1, None).unwrap();
        let used = store.create_redeem_code(1, None).unwrap();
        store.redeem(&used, "kim").unwrap();

        store.delete_unused_code(&unused.to_lowercase()).unwrap();
        assert!(matches!(
            store.delete_unused_code(&unused),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_unused_code(&used),
            Err(StoreError::CodeInUse(_))
        ));
        assert_eq!(store.list_codes().unwrap().len(), 1);
    }

    #[test]
    fn test_sweep_reports_each_identity_once() {
        let (store, clock, _dir) = open_store();
        store.grant("lee", Some(1)).unwrap();
        store.grant("max", Some(5)).unwrap();
        store.grant("ned", None).unwrap();

        clock.advance(TimeDelta::days(2));
        assert_eq!(store.sweep_expirations().unwrap(), vec!["lee".to_string()]);
        assert!(store.sweep_expirations().unwrap().is_empty());

        clock.advance(TimeDelta::days(10));
        assert_eq!(store.sweep_expirations().unwrap(), vec!["max".to_string()]);
        assert_eq!(
            store.active_identities().unwrap(),
            BTreeSet::from(["ned".to_string()])
        );
    }

    #[test]
    fn test_sweep_skips_already_notified() {
        let (store, clock, dir) = open_store();
        store.grant("olga", Some(1)).unwrap();

        // A marker left behind by an interrupted sweep.
        let notified: JsonDocument<NotifiedMap> = JsonDocument::new(dir.path().join(NOTIFIED_FILE));
        let mut map = NotifiedMap::new();
        map.insert("olga".to_string(), start());
        notified.save(&map).unwrap();
        let store = {
            drop(store);
            reopen(&dir, &clock)
        };

        clock.advance(TimeDelta::days(2));
        assert!(store.sweep_expirations().unwrap().is_empty());
        assert!(!store.is_entitled("olga").unwrap());
        assert!(notified.load().unwrap().is_empty());
    }

    #[test]
    fn test_check_leaves_notice_file_alone_without_marker() {
        let (store, clock, dir) = open_store();
        store.grant("quinn", Some(1)).unwrap();
        assert!(!dir.path().join(NOTIFIED_FILE).exists());

        clock.advance(TimeDelta::days(2));
        assert_eq!(store.check("quinn").unwrap(), AccessStatus::NotEntitled);
        assert!(!dir.path().join(NOTIFIED_FILE).exists());
    }

    #[test]
    fn test_redeem_after_lapse_clears_stale_marker() {
        let (store, clock, dir) = open_store();
        store.grant("rita", Some(1)).unwrap();
        let code = store.create_redeem_code(3, None).unwrap();

        let notified: JsonDocument<NotifiedMap> = JsonDocument::new(dir.path().join(NOTIFIED_FILE));
        let mut map = NotifiedMap::new();
        map.insert("rita".to_string(), start());
        notified.save(&map).unwrap();
        let store = {
            drop(store);
            reopen(&dir, &clock)
        };

        clock.advance(TimeDelta::days(2));
        store.redeem_and_grant(&code, "rita").unwrap();
        assert!(notified.load().unwrap().is_empty());
    }

    #[test]
    fn test_grant_clears_notice_marker() {
        let (store, clock, dir) = open_store();
        store.grant("pat", Some(1)).unwrap();

        let notified: JsonDocument<NotifiedMap> = JsonDocument::new(dir.path().join(NOTIFIED_FILE));
        let mut map = NotifiedMap::new();
        map.insert("pat".to_string(), start());
        notified.save(&map).unwrap();
        let store = {
            drop(store);
            reopen(&dir, &clock)
        };

        store.grant("pat", Some(1)).unwrap();
        assert!(notified.load().unwrap().is_empty());

        clock.advance(TimeDelta::days(2));
        assert_eq!(store.sweep_expirations().unwrap(), vec!["pat".to_string()]);
    }

    #[test]
    fn test_state_survives_reopen() {
        let (store, clock, dir) = open_store();
        store.grant("quinn", Some(3)).unwrap();
        let code = store.create_redeem_code(2, None).unwrap();
        drop(store);

        let store = reopen(&dir, &clock);
        assert_eq!(
            store.check("quinn").unwrap(),
            AccessStatus::Until(start() + TimeDelta::days(3))
        );
        assert_eq!(store.redeem(&code, "rita").unwrap(), 2);
    }

    #[test]
    fn test_legacy_list_migrated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ENTITLEMENTS_FILE);
        std::fs::write(&path, r#"["100", 200]"#).unwrap();

        let store = EntitlementStore::open(dir.path()).unwrap();
        assert_eq!(store.check("100").unwrap(), AccessStatus::Permanent);
        assert_eq!(store.check("200").unwrap(), AccessStatus::Permanent);

        let rewritten: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(rewritten.is_object());
        assert!(rewritten["100"]["expires_at"].is_null());
    }

    #[test]
    fn test_ensure_owner_only_on_fresh_store() {
        let (store, clock, dir) = open_store();
        assert!(store.ensure_owner("999").unwrap());
        assert!(!store.ensure_owner("999").unwrap());
        assert_eq!(store.check("999").unwrap(), AccessStatus::Permanent);

        store.revoke("999").unwrap();
        drop(store);
        let store = reopen(&dir, &clock);
        assert!(!store.ensure_owner("999").unwrap());
        assert!(!store.is_entitled("999").unwrap());
    }

    #[test]
    fn test_list_entitlements_purges_expired() {
        let (store, clock, _dir) = open_store();
        store.grant("sam", Some(1)).unwrap();
        store.grant("tia", None).unwrap();
        clock.advance(TimeDelta::days(2));

        let listed = store.list_entitlements().unwrap();
        assert_eq!(listed, vec![("tia".to_string(), None)]);
    }
}
