//! In-memory cookie store: entries and the registrable-domain bucket map.
//!
//! Entries are keyed twice: the outer key is the registrable-domain bucket
//! from [`crate::policy::jar_key`], the inner key a stable fingerprint of
//! `(domain, path, name)`. Re-setting the same triple therefore mutates in
//! place instead of allocating a second entry.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::canon::has_dot_suffix;

/// In-memory expiry sentinel for session cookies (9999-12-31T23:59:59Z).
/// Session entries are never persisted, so the sentinel never hits disk.
pub(crate) const END_OF_TIME: i64 = 253_402_300_799;

/// Tombstone expiry stamped on explicit deletions.
pub(crate) const EPOCH: i64 = 0;

/// How long an expired entry is retained as a tombstone before the reaper
/// frees it. Long enough for peer processes sharing the file to observe
/// the deletion through a merge.
pub(crate) const EXPIRY_GRACE_SECS: i64 = 24 * 60 * 60;

/// One logical cookie in the store.
///
/// Timestamps are Unix seconds. `seq` is a per-jar insertion sequence used
/// only to make retrieval order deterministic; it is not persisted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Entry {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub persistent: bool,
    pub host_only: bool,
    pub expires: i64,
    pub creation: i64,
    pub last_access: i64,
    pub updated: i64,
    pub can_delete: bool,
    #[serde(skip)]
    pub seq: u64,
}

impl Entry {
    /// Returns the stable fingerprint of this entry's `(domain, path, name)`.
    pub fn id(&self) -> String {
        entry_id(&self.domain, &self.path, &self.name)
    }

    /// Reports whether the entry has expired at `now`.
    pub fn expired(&self, now: i64) -> bool {
        self.expires <= now
    }

    /// Reports whether the entry should be sent for a request to
    /// `(host, path)` over a connection that is `https` or not.
    pub fn should_send(&self, https: bool, host: &str, path: &str) -> bool {
        self.domain_match(host) && self.path_match(path) && (https || !self.secure)
    }

    /// Domain match per RFC 6265 §5.1.3: exact for host-only entries,
    /// exact or dot-suffix otherwise.
    pub fn domain_match(&self, host: &str) -> bool {
        if self.domain == host {
            return true;
        }
        !self.host_only && has_dot_suffix(host, &self.domain)
    }

    /// Path match per RFC 6265 §5.1.4.
    pub fn path_match(&self, request_path: &str) -> bool {
        if request_path == self.path {
            return true;
        }
        if let Some(rest) = request_path.strip_prefix(self.path.as_str()) {
            return self.path.ends_with('/') || rest.starts_with('/');
        }
        false
    }

    /// Retrieval and enumeration order: longer paths first, then earlier
    /// creation, then insertion sequence, finally the id. Total and
    /// deterministic in every store state.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        other
            .path
            .len()
            .cmp(&self.path.len())
            .then(self.creation.cmp(&other.creation))
            .then(self.seq.cmp(&other.seq))
            .then_with(|| self.id().cmp(&other.id()))
    }
}

// Cookie values are sensitive; keep them out of log output.
impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .field("persistent", &self.persistent)
            .field("host_only", &self.host_only)
            .field("expires", &self.expires)
            .field("creation", &self.creation)
            .field("last_access", &self.last_access)
            .field("updated", &self.updated)
            .field("can_delete", &self.can_delete)
            .finish()
    }
}

/// Computes the entry fingerprint for a `(domain, path, name)` triple.
pub(crate) fn entry_id(domain: &str, path: &str, name: &str) -> String {
    format!("{domain};{path};{name}")
}

/// The two-level entry map.
#[derive(Debug, Default)]
pub(crate) struct Store {
    buckets: HashMap<String, HashMap<String, Entry>>,
}

impl Store {
    /// Looks up the bucket for a registrable-domain key.
    pub fn bucket(&self, key: &str) -> Option<&HashMap<String, Entry>> {
        self.buckets.get(key)
    }

    /// Looks up the bucket for a registrable-domain key, mutably.
    pub fn bucket_mut(&mut self, key: &str) -> Option<&mut HashMap<String, Entry>> {
        self.buckets.get_mut(key)
    }

    /// Looks up one entry by bucket key and id.
    pub fn get(&self, key: &str, id: &str) -> Option<&Entry> {
        self.buckets.get(key)?.get(id)
    }

    /// Inserts or replaces an entry under `key`, keyed by its own id.
    pub fn insert(&mut self, key: &str, entry: Entry) {
        self.buckets
            .entry(key.to_string())
            .or_default()
            .insert(entry.id(), entry);
    }

    /// Iterates every entry in the store.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.buckets.values().flat_map(HashMap::values)
    }

    /// Iterates every entry in the store, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.buckets.values_mut().flat_map(HashMap::values_mut)
    }

    /// Number of entries, expired ones included.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.buckets.values().map(HashMap::len).sum()
    }

    /// Marks every expired entry deletable and removes those whose grace
    /// window has fully elapsed.
    ///
    /// The window is measured from the entry's last update, not its expiry:
    /// an explicit deletion stamps `expires` at the epoch, and it must still
    /// linger a full window as a tombstone so peers merging against the
    /// persisted store observe the deletion.
    pub fn reap(&mut self, now: i64) {
        for submap in self.buckets.values_mut() {
            submap.retain(|_, e| {
                !e.expired(now) || now < e.updated.saturating_add(EXPIRY_GRACE_SECS)
            });
            for e in submap.values_mut() {
                if e.expired(now) {
                    e.can_delete = true;
                }
            }
        }
        self.buckets.retain(|_, submap| !submap.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(domain: &str, path: &str, host_only: bool) -> Entry {
        Entry {
            name: "n".to_string(),
            value: "v".to_string(),
            domain: domain.to_string(),
            path: path.to_string(),
            secure: false,
            http_only: false,
            persistent: true,
            host_only,
            expires: END_OF_TIME,
            creation: 0,
            last_access: 0,
            updated: 0,
            can_delete: false,
            seq: 0,
        }
    }

    #[test]
    fn test_host_only_entry_matches_exact_host_only() {
        let e = entry("www.example.com", "/", true);
        assert!(e.domain_match("www.example.com"));
        assert!(!e.domain_match("foo.www.example.com"));
        assert!(!e.domain_match("example.com"));
    }

    #[test]
    fn test_domain_entry_matches_subdomains() {
        let e = entry("example.com", "/", false);
        assert!(e.domain_match("example.com"));
        assert!(e.domain_match("www.example.com"));
        assert!(e.domain_match("deep.www.example.com"));
        assert!(!e.domain_match("wwwexample.com"));
        assert!(!e.domain_match("other.com"));
    }

    #[test]
    fn test_path_match_rules() {
        let e = entry("example.com", "/some/path", true);
        assert!(e.path_match("/some/path"));
        assert!(e.path_match("/some/path/foo"));
        assert!(!e.path_match("/some/paths"));
        assert!(!e.path_match("/some"));

        let slash = entry("example.com", "/some/", true);
        assert!(slash.path_match("/some/"));
        assert!(slash.path_match("/some/path"));
        assert!(!slash.path_match("/some"));
    }

    #[test]
    fn test_secure_entry_needs_https() {
        let mut e = entry("example.com", "/", true);
        e.secure = true;
        assert!(e.should_send(true, "example.com", "/"));
        assert!(!e.should_send(false, "example.com", "/"));
    }

    #[test]
    fn test_sort_prefers_long_paths_then_age() {
        let mut a = entry("example.com", "/foo", true);
        a.creation = 5;
        let mut b = entry("example.com", "/foo/bar", true);
        b.creation = 9;
        let mut c = entry("example.com", "/foo", true);
        c.name = "other".to_string();
        c.creation = 2;

        let mut v = vec![a.clone(), b.clone(), c.clone()];
        v.sort_by(Entry::sort_cmp);
        assert_eq!(v[0].path, "/foo/bar");
        assert_eq!(v[1].name, "other");
        assert_eq!(v[2].name, "n");
    }

    #[test]
    fn test_sort_breaks_creation_ties_by_sequence() {
        let mut first = entry("example.com", "/", true);
        first.name = "a".to_string();
        first.seq = 7;
        let mut second = entry("example.com", "/", true);
        second.name = "b".to_string();
        second.seq = 3;

        let mut v = vec![first, second];
        v.sort_by(Entry::sort_cmp);
        assert_eq!(v[0].name, "b");
        assert_eq!(v[1].name, "a");
    }

    #[test]
    fn test_insert_same_triple_replaces() {
        let mut store = Store::default();
        let mut e = entry("example.com", "/", true);
        store.insert("example.com", e.clone());
        e.value = "updated".to_string();
        store.insert("example.com", e.clone());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("example.com", &e.id()).unwrap().value, "updated");
    }

    #[test]
    fn test_reap_removes_after_grace_window() {
        let mut store = Store::default();
        let mut e = entry("example.com", "/", true);
        e.expires = 100;
        e.updated = 100;
        store.insert("example.com", e.clone());

        // Expired but still inside the grace window: kept, marked.
        store.reap(100 + EXPIRY_GRACE_SECS - 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("example.com", &e.id()).unwrap().can_delete);

        // Window elapsed: gone, bucket cleaned up with it.
        store.reap(100 + EXPIRY_GRACE_SECS);
        assert_eq!(store.len(), 0);
        assert!(store.bucket("example.com").is_none());
    }

    #[test]
    fn test_reap_keeps_fresh_tombstones_despite_epoch_expiry() {
        let mut store = Store::default();
        let mut e = entry("example.com", "/", true);
        e.value = String::new();
        e.expires = EPOCH;
        e.updated = 5_000;
        store.insert("example.com", e.clone());

        // An explicit deletion is expired on arrival, but it must survive
        // a full window from the deletion itself.
        store.reap(5_000 + EXPIRY_GRACE_SECS - 1);
        assert_eq!(store.len(), 1);
        store.reap(5_000 + EXPIRY_GRACE_SECS);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_reap_keeps_live_entries_untouched() {
        let mut store = Store::default();
        let mut e = entry("example.com", "/", true);
        e.expires = 1_000;
        store.insert("example.com", e.clone());
        store.reap(500);
        let kept = store.get("example.com", &e.id()).unwrap();
        assert!(!kept.can_delete);
        assert_eq!(kept.value, "v");
    }
}
