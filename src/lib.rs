//! Persistent RFC 6265 cookie store.
//!
//! A [`Jar`] accepts the cookies of HTTP responses, answers which cookies
//! belong on a request, and persists its state to a file that cooperating
//! processes share through an advisory file lock and a read-merge-write
//! save protocol. Deletions survive the handoff as tombstones that peers
//! pick up before the expiry reaper finally frees them.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`canon`] - host/path canonicalization per RFC 6265 §5.1
//! - [`psl`] - the injected public-suffix capability
//! - [`policy`] - domain attribute validation and registrable-domain keys
//! - [`cookie`] - the wire-level cookie record
//! - [`jar`] - the jar itself: ingestion, retrieval, bulk removal, save
//! - [`persist`] - the record codec and the advisory file lock
//!
//! # Example
//!
//! ```no_run
//! use cookiejar::{Cookie, Jar, JarOptions};
//! use url::Url;
//!
//! # fn example() -> Result<(), cookiejar::StoreError> {
//! let jar = Jar::new(JarOptions {
//!     filename: Some("cookies.json".into()),
//!     ..JarOptions::default()
//! })?;
//!
//! let url = Url::parse("https://www.example.com/").expect("static url");
//! jar.set_cookies(&url, &[Cookie::new("session", "opaque")]);
//! let outgoing = jar.cookies(&url);
//! jar.save()?;
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod canon;
pub mod cookie;
pub mod jar;
pub mod persist;
pub mod policy;
pub mod psl;
pub(crate) mod store;

// Re-export commonly used types
pub use cookie::Cookie;
pub use jar::{Jar, JarOptions};
pub use persist::StoreError;
pub use policy::PolicyError;
pub use psl::PublicSuffixList;
