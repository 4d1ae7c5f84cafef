//! Cookie scoping policy: domain attribute validation and bucket keys.
//!
//! Implements the RFC 6265 §5.3 decisions that turn a request host and a
//! `Domain` attribute into the effective cookie domain, and derives the
//! registrable-domain key under which entries are partitioned.

use thiserror::Error;

use crate::canon::{has_dot_suffix, is_ip};
use crate::psl::PublicSuffixList;

/// Reasons a cookie assignment is refused by the scoping policy.
///
/// These are per-cookie failures: ingestion logs them and moves on to the
/// next cookie rather than failing the whole call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// The request host fails canonicalization (empty, unmatched IPv6
    /// bracket, or a label that cannot be ASCII-encoded).
    #[error("malformed request host")]
    MalformedHost,

    /// The `Domain` attribute is syntactically invalid (only dots, empty
    /// after stripping the leading dot, or a trailing dot).
    #[error("malformed domain attribute")]
    MalformedDomain,

    /// The `Domain` attribute is not authoritative for the request host,
    /// or it targets a public suffix.
    #[error("domain attribute is not authoritative for the request host")]
    IllegalDomain,

    /// The request host is an IP literal and the `Domain` attribute names
    /// anything other than that exact address.
    #[error("no usable hostname for domain attribute on an IP host")]
    NoHostname,
}

/// Derives the effective cookie domain and host-only flag for a cookie
/// received from `host` carrying the `Domain` attribute `attr`.
///
/// `host` must already be canonical (see [`crate::canon::canonical_host`]);
/// `attr` is the raw attribute value, possibly empty. Returns the stored
/// domain (lowercase, no leading dot) and whether the cookie is host-only.
///
/// # Errors
///
/// Returns a [`PolicyError`] when the attribute is malformed, targets a
/// public suffix, is not a dot-parent of the host, or domain-scopes an IP.
pub fn domain_and_type(
    host: &str,
    attr: &str,
    psl: Option<&dyn PublicSuffixList>,
) -> Result<(String, bool), PolicyError> {
    if attr.is_empty() {
        // No Domain attribute means a host cookie.
        return Ok((host.to_string(), true));
    }

    let attr = attr.strip_prefix('.').unwrap_or(attr);
    if attr.is_empty() || attr.starts_with('.') {
        // Received either "Domain=." or "Domain=..some.thing".
        return Err(PolicyError::MalformedDomain);
    }
    let attr = attr.to_lowercase();
    if attr.ends_with('.') {
        // Received something like "Domain=www.example.com.".
        return Err(PolicyError::MalformedDomain);
    }

    if is_ip(host) {
        if attr == host {
            // A Domain attribute naming the exact address collapses to a
            // host cookie; IP cookies are never domain-scoped.
            return Ok((host.to_string(), true));
        }
        return Err(PolicyError::NoHostname);
    }

    // See RFC 6265 section 5.3 #5: no domain cookies on public suffixes.
    if let Some(list) = psl {
        let ps = list.public_suffix(&attr);
        if !ps.is_empty() && !has_dot_suffix(&attr, &ps) {
            if host == attr {
                return Ok((attr, true));
            }
            return Err(PolicyError::IllegalDomain);
        }
    }

    // The domain must domain-match the host: www.mycompany.com cannot set
    // cookies for .ourcompetitors.com.
    if host != attr && !has_dot_suffix(host, &attr) {
        return Err(PolicyError::IllegalDomain);
    }
    Ok((attr, false))
}

/// Derives the registrable-domain bucket key for a canonical host.
///
/// IP literals map to themselves. With a public-suffix list the key is the
/// label one below the suffix (`www.bbc.co.uk` → `bbc.co.uk`); a host that
/// is itself a suffix maps to itself. Without a list the last label is
/// treated as the suffix, so the key is the final two labels.
#[must_use]
pub fn jar_key(host: &str, psl: Option<&dyn PublicSuffixList>) -> String {
    if is_ip(host) {
        return host.to_string();
    }
    let i = match psl {
        None => match host.rfind('.') {
            None | Some(0) => return host.to_string(),
            Some(i) => i,
        },
        Some(list) => {
            let suffix = list.public_suffix(host);
            if suffix == host || suffix.len() >= host.len() {
                return host.to_string();
            }
            let i = host.len() - suffix.len();
            if host.as_bytes()[i - 1] != b'.' {
                // A broken suffix list; storing under the full host is a
                // safe stopgap.
                return host.to_string();
            }
            i
        }
    };
    match host[..i - 1].rfind('.') {
        None => host.to_string(),
        Some(prev_dot) => host[prev_dot + 1..].to_string(),
    }
}
