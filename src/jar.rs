//! The cookie jar: ingestion, retrieval, enumeration, and persistence.
//!
//! A [`Jar`] is in-process shared mutable state guarded by one mutex; all
//! methods take `&self` and are safe to call from multiple threads. File
//! persistence synchronizes with other processes through an advisory file
//! lock and a read-merge-write save protocol, so cooperating jars converge
//! on the union of their writes with later updates winning.

use std::fmt;
use std::fs;
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, instrument};
use url::Url;

use crate::canon::{canonical_host, default_path};
use crate::cookie::Cookie;
use crate::persist::lock::LockFile;
use crate::persist::{self, StoreError};
use crate::policy::{domain_and_type, jar_key, PolicyError};
use crate::psl::PublicSuffixList;
use crate::store::{entry_id, Entry, Store, END_OF_TIME, EPOCH};

/// Configuration for [`Jar::new`].
#[derive(Default)]
pub struct JarOptions {
    /// Public-suffix capability consulted by the scoping policy. Without
    /// one, the policy treats the last label of a domain as its suffix.
    pub public_suffix_list: Option<Arc<dyn PublicSuffixList>>,
    /// Backing file for persistence. `None` (or an empty path) means a
    /// memory-only jar.
    pub filename: Option<PathBuf>,
    /// Keep the filename but skip both the initial load and every save.
    /// Useful for dry runs against a real cookie file.
    pub no_persist: bool,
}

impl fmt::Debug for JarOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JarOptions")
            .field(
                "public_suffix_list",
                &self.public_suffix_list.as_ref().map(|l| l.description()),
            )
            .field("filename", &self.filename)
            .field("no_persist", &self.no_persist)
            .finish()
    }
}

#[derive(Default)]
struct Inner {
    store: Store,
    next_seq: u64,
}

/// A persistent RFC 6265 cookie store.
pub struct Jar {
    psl: Option<Arc<dyn PublicSuffixList>>,
    filename: Option<PathBuf>,
    no_persist: bool,
    inner: Mutex<Inner>,
}

impl Jar {
    /// Creates a jar, loading the backing file when one is configured.
    ///
    /// The initial load takes the file lock, merges the file's entries
    /// into the fresh store, and releases the lock without writing back.
    /// A missing file is fine; parent directories are created on demand.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backing file exists but cannot be
    /// read, decoded, or locked.
    pub fn new(options: JarOptions) -> Result<Self, StoreError> {
        let jar = Self {
            psl: options.public_suffix_list,
            filename: options.filename.filter(|p| !p.as_os_str().is_empty()),
            no_persist: options.no_persist,
            inner: Mutex::new(Inner::default()),
        };
        if !jar.no_persist {
            if let Some(path) = jar.filename.clone() {
                jar.load(&path)?;
            }
        }
        Ok(jar)
    }

    /// Stores the cookies of an HTTP response received from `url`.
    ///
    /// This is the HTTP-aware assignment path: it may overwrite and delete
    /// entries whose `HttpOnly` flag is set. Cookies refused by policy are
    /// skipped individually; the call itself never fails.
    pub fn set_cookies(&self, url: &Url, cookies: &[Cookie]) {
        self.set_cookies_at(url, cookies, unix_now());
    }

    /// Deterministic variant of [`Jar::set_cookies`] with an explicit
    /// current time in Unix seconds.
    pub fn set_cookies_at(&self, url: &Url, cookies: &[Cookie], now: i64) {
        self.set_cookies_impl(url, cookies, now, true);
    }

    /// Stores cookies assigned through a non-HTTP interface (scripts).
    ///
    /// Unlike [`Jar::set_cookies`] this path may not create, overwrite, or
    /// delete `HttpOnly` entries, and it refuses cookies that themselves
    /// carry `HttpOnly`.
    pub fn set_nonhttp_cookies(&self, url: &Url, cookies: &[Cookie]) {
        self.set_nonhttp_cookies_at(url, cookies, unix_now());
    }

    /// Deterministic variant of [`Jar::set_nonhttp_cookies`].
    pub fn set_nonhttp_cookies_at(&self, url: &Url, cookies: &[Cookie], now: i64) {
        self.set_cookies_impl(url, cookies, now, false);
    }

    fn set_cookies_impl(&self, url: &Url, cookies: &[Cookie], now: i64, http_api: bool) {
        if cookies.is_empty() {
            return;
        }
        if !is_http_scheme(url.scheme()) {
            debug!(scheme = url.scheme(), "ignoring cookies from non-http scheme");
            return;
        }
        let host = match canonical_host(url.host_str().unwrap_or("")) {
            Ok(host) => host,
            Err(err) => {
                debug!(url = %url, error = %err, "ignoring cookies from malformed host");
                return;
            }
        };
        let key = jar_key(&host, self.psl.as_deref());
        let def_path = default_path(url.path());

        let mut inner = self.lock_inner();
        for cookie in cookies {
            let mut entry = match self.build_entry(cookie, &host, def_path, now) {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(host = %host, name = %cookie.name, error = %err, "rejecting cookie");
                    continue;
                }
            };
            let id = entry.id();
            if let Some(old) = inner.store.get(&key, &id) {
                if old.http_only && !http_api {
                    debug!(host = %host, name = %cookie.name, "non-http interface may not touch http-only entry");
                    continue;
                }
                entry.creation = old.creation;
                entry.seq = old.seq;
            } else {
                if entry.http_only && !http_api {
                    debug!(host = %host, name = %cookie.name, "non-http interface may not create http-only entry");
                    continue;
                }
                entry.creation = now;
                entry.seq = inner.next_seq;
                inner.next_seq += 1;
            }
            entry.last_access = now;
            entry.updated = now;
            inner.store.insert(&key, entry);
        }
    }

    /// Translates one header cookie into a store entry scoped to `host`.
    fn build_entry(
        &self,
        cookie: &Cookie,
        host: &str,
        def_path: &str,
        now: i64,
    ) -> Result<Entry, PolicyError> {
        let attr = cookie.domain.as_deref().unwrap_or("");
        let (domain, host_only) = domain_and_type(host, attr, self.psl.as_deref())?;

        let path = match cookie.path.as_deref() {
            Some(p) if p.starts_with('/') => p.to_string(),
            _ => def_path.to_string(),
        };

        // Max-Age has precedence over Expires; either makes the cookie
        // persistent even when it expires it on the spot.
        let (expires, persistent, deletion) = match cookie.max_age {
            Some(secs) if secs <= 0 => (EPOCH, true, true),
            Some(secs) => (now.saturating_add(secs), true, false),
            None => match cookie.expires {
                Some(instant) => (instant, true, instant <= now),
                None => (END_OF_TIME, false, false),
            },
        };

        Ok(Entry {
            name: cookie.name.clone(),
            value: if deletion { String::new() } else { cookie.value.clone() },
            domain,
            path,
            secure: cookie.secure,
            http_only: cookie.http_only,
            persistent,
            host_only,
            expires,
            creation: now,
            last_access: now,
            updated: now,
            can_delete: false,
            seq: 0,
        })
    }

    /// Returns the cookies to send with a request to `url`.
    ///
    /// Matching follows RFC 6265 §5.4: domain, path, scheme, and expiry
    /// all gate an entry, secure entries need an https-family scheme, and
    /// the result is ordered by path length descending with creation time
    /// breaking ties. Non-http schemes and malformed hosts yield an empty
    /// list. Only `name` and `value` are populated.
    #[must_use]
    pub fn cookies(&self, url: &Url) -> Vec<Cookie> {
        self.cookies_at(url, unix_now())
    }

    /// Deterministic variant of [`Jar::cookies`].
    #[must_use]
    pub fn cookies_at(&self, url: &Url, now: i64) -> Vec<Cookie> {
        let scheme = url.scheme();
        if !is_http_scheme(scheme) {
            return Vec::new();
        }
        let Ok(host) = canonical_host(url.host_str().unwrap_or("")) else {
            return Vec::new();
        };
        let key = jar_key(&host, self.psl.as_deref());
        let https = is_secure_scheme(scheme);
        let path = if url.path().is_empty() { "/" } else { url.path() };

        let mut inner = self.lock_inner();
        let Some(bucket) = inner.store.bucket_mut(&key) else {
            return Vec::new();
        };
        let mut selected: Vec<Entry> = Vec::new();
        for entry in bucket.values_mut() {
            if entry.expired(now) || !entry.should_send(https, &host, path) {
                continue;
            }
            entry.last_access = now;
            selected.push(entry.clone());
        }
        selected.sort_by(Entry::sort_cmp);
        selected
            .into_iter()
            .map(|e| Cookie::new(e.name, e.value))
            .collect()
    }

    /// Enumerates every non-expired entry in wire form.
    ///
    /// Unlike [`Jar::cookies`] the scoping fields (`domain`, `path`,
    /// `expires` for persistent entries, `secure`, `http_only`) are
    /// populated, so the result can be fed back to
    /// [`Jar::remove_cookie`]. Ordered by path length descending, stable.
    #[must_use]
    pub fn all_cookies(&self) -> Vec<Cookie> {
        self.all_cookies_at(unix_now())
    }

    /// Deterministic variant of [`Jar::all_cookies`].
    #[must_use]
    pub fn all_cookies_at(&self, now: i64) -> Vec<Cookie> {
        let inner = self.lock_inner();
        let mut selected: Vec<&Entry> =
            inner.store.iter().filter(|e| !e.expired(now)).collect();
        selected.sort_by(|a, b| a.sort_cmp(b));
        selected
            .into_iter()
            .map(|e| Cookie {
                name: e.name.clone(),
                value: e.value.clone(),
                path: Some(e.path.clone()),
                domain: Some(e.domain.clone()),
                expires: e.persistent.then_some(e.expires),
                max_age: None,
                secure: e.secure,
                http_only: e.http_only,
            })
            .collect()
    }

    /// Removes the single entry matching the cookie's domain, path, and
    /// name, leaving a tombstone so the deletion survives a merge.
    pub fn remove_cookie(&self, cookie: &Cookie) {
        let domain = cookie.domain.as_deref().unwrap_or("");
        if domain.is_empty() {
            return;
        }
        let path = cookie.path.as_deref().unwrap_or("");
        let key = jar_key(domain, self.psl.as_deref());
        let id = entry_id(domain, path, &cookie.name);
        let now = unix_now();
        let mut inner = self.lock_inner();
        if let Some(bucket) = inner.store.bucket_mut(&key) {
            if let Some(entry) = bucket.get_mut(&id) {
                tombstone(entry, now);
            }
        }
    }

    /// Removes every cookie whose effective domain equals `host`.
    ///
    /// The host is canonicalized and its port stripped first. Equality is
    /// exact (IP or DNS); this is not a subdomain sweep.
    pub fn remove_all_host(&self, host: &str) {
        let Ok(host) = canonical_host(host) else {
            return;
        };
        let key = jar_key(&host, self.psl.as_deref());
        let now = unix_now();
        let mut inner = self.lock_inner();
        if let Some(bucket) = inner.store.bucket_mut(&key) {
            for entry in bucket.values_mut() {
                if entry.domain == host {
                    tombstone(entry, now);
                }
            }
        }
    }

    /// Removes every cookie in the jar, leaving tombstones.
    pub fn remove_all(&self) {
        let now = unix_now();
        let mut inner = self.lock_inner();
        for entry in inner.store.iter_mut() {
            tombstone(entry, now);
        }
    }

    /// Frees entries whose tombstone grace window has fully elapsed.
    ///
    /// Runs automatically during [`Jar::save`]; calling it directly only
    /// matters for long-lived memory-only jars.
    pub fn remove_expired(&self) {
        self.remove_expired_at(unix_now());
    }

    /// Deterministic variant of [`Jar::remove_expired`].
    pub fn remove_expired_at(&self, now: i64) {
        self.lock_inner().store.reap(now);
    }

    /// Persists the jar: lock, read, merge, reap, rewrite.
    ///
    /// The on-disk entries are merged into the in-memory store first (per
    /// entry id, later `updated` wins, ties to this jar), so after a save
    /// this jar also observes its peers' writes. With `no_persist` set
    /// this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SaveWithoutLoad`] when the jar has no backing
    /// file, and otherwise surfaces lock, decode, and I/O failures. The
    /// file lock is released on every path.
    pub fn save(&self) -> Result<(), StoreError> {
        self.save_at(unix_now())
    }

    /// Deterministic variant of [`Jar::save`].
    #[instrument(level = "debug", skip(self))]
    pub fn save_at(&self, now: i64) -> Result<(), StoreError> {
        if self.no_persist {
            return Ok(());
        }
        let Some(path) = self.filename.as_deref() else {
            return Err(StoreError::SaveWithoutLoad);
        };

        // Lock order: jar mutex, then file lock. Load uses the same order.
        let mut inner = self.lock_inner();
        ensure_parent(path)?;
        let _lock = LockFile::acquire(path)?;
        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        let disk = persist::decode(&data)?;
        Self::merge(&mut inner, disk, self.psl.as_deref());
        inner.store.reap(now);
        file.set_len(0)?;
        file.seek(io::SeekFrom::Start(0))?;
        persist::encode(&mut file, inner.store.iter())
    }

    #[instrument(level = "debug", skip(self, path), fields(path = %path.display()))]
    fn load(&self, path: &Path) -> Result<(), StoreError> {
        // Same lock order as save: jar mutex, then file lock.
        let mut inner = self.lock_inner();
        ensure_parent(path)?;
        let _lock = LockFile::acquire(path)?;
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let disk = persist::decode(&data)?;
        let adopted = disk.len();
        Self::merge(&mut inner, disk, self.psl.as_deref());
        debug!(entries = adopted, "loaded cookie file");
        Ok(())
    }

    /// Merges decoded entries into the store: for each id, the side with
    /// the later `updated` wins and ties go to the in-memory receiver.
    fn merge(inner: &mut Inner, entries: Vec<Entry>, psl: Option<&dyn PublicSuffixList>) {
        for mut entry in entries {
            if entry.domain.is_empty() {
                continue;
            }
            let key = jar_key(&entry.domain, psl);
            let id = entry.id();
            if let Some(current) = inner.store.get(&key, &id) {
                if current.updated >= entry.updated {
                    continue;
                }
                entry.seq = current.seq;
            } else {
                entry.seq = inner.next_seq;
                inner.next_seq += 1;
            }
            inner.store.insert(&key, entry);
        }
    }

    /// Writes the persistent entries to `writer` in the codec format.
    ///
    /// A codec pass-through for caller-managed persistence: no file lock,
    /// no merge.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when writing fails.
    pub fn write_to<W: io::Write>(&self, writer: &mut W) -> Result<(), StoreError> {
        let inner = self.lock_inner();
        persist::encode(writer, inner.store.iter())
    }

    /// Reads entries in the codec format from `reader` into the jar,
    /// replacing entries with matching ids. No merging.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] on a malformed stream and
    /// [`StoreError::Io`] when reading fails.
    pub fn read_from<R: io::Read>(&self, reader: &mut R) -> Result<(), StoreError> {
        let mut data = String::new();
        reader.read_to_string(&mut data)?;
        self.adopt(persist::decode(&data)?);
        Ok(())
    }

    /// Returns a textual snapshot of the persistent entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when encoding fails.
    pub fn marshal(&self) -> Result<String, StoreError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(String::from_utf8(buf).map_err(io::Error::other)?)
    }

    /// Restores entries from a [`Jar::marshal`] snapshot, replacing
    /// entries with matching ids.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] when the snapshot is malformed.
    pub fn unmarshal(&self, data: &str) -> Result<(), StoreError> {
        self.adopt(persist::decode(data)?);
        Ok(())
    }

    fn adopt(&self, entries: Vec<Entry>) {
        let mut inner = self.lock_inner();
        for mut entry in entries {
            if entry.domain.is_empty() {
                continue;
            }
            let key = jar_key(&entry.domain, self.psl.as_deref());
            entry.seq = inner.next_seq;
            inner.next_seq += 1;
            inner.store.insert(&key, entry);
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Jar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jar")
            .field("filename", &self.filename)
            .field("no_persist", &self.no_persist)
            .finish_non_exhaustive()
    }
}

/// Marks an entry as an explicit deletion: blank value, epoch expiry,
/// refreshed `updated` so the tombstone wins merges against older writes.
fn tombstone(entry: &mut Entry, now: i64) {
    entry.value.clear();
    entry.expires = EPOCH;
    entry.updated = now;
}

fn is_http_scheme(scheme: &str) -> bool {
    matches!(scheme, "http" | "https" | "ws" | "wss")
}

fn is_secure_scheme(scheme: &str) -> bool {
    matches!(scheme, "https" | "wss")
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
