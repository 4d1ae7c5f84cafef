//! Host and path canonicalization per RFC 6265 §5.1.
//!
//! Request hosts are lowercased, stripped of ports and trailing dots, and
//! ASCII-encoded before any policy decision looks at them. The default-path
//! computation and the dot-suffix test live here because every domain and
//! path match in the crate is phrased in terms of them.

use crate::policy::PolicyError;

/// Canonicalizes a request host per RFC 6265 §5.1.2.
///
/// Lowercases the host, removes a `:port` suffix (IPv6 bracket aware),
/// strips one trailing dot, and ASCII-encodes non-ASCII labels. IP literals
/// pass through unchanged apart from losing their brackets.
///
/// # Errors
///
/// Returns [`PolicyError::MalformedHost`] for an empty host, an unmatched
/// IPv6 bracket, or a label that cannot be ASCII-encoded.
pub fn canonical_host(host: &str) -> Result<String, PolicyError> {
    let mut host = host.to_lowercase();
    if has_port(&host) {
        host = strip_port(&host)?.to_string();
    } else if host.starts_with('[') {
        // Bracketed IPv6 literal without a port.
        host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .ok_or(PolicyError::MalformedHost)?
            .to_string();
    }
    if host.ends_with('.') {
        host.pop();
    }
    to_ascii(&host)
}

/// Reports whether `host` carries a port suffix.
///
/// A bare IPv6 literal contains colons but no port; only a bracketed
/// literal followed by `]:` counts.
#[must_use]
pub fn has_port(host: &str) -> bool {
    match host.bytes().filter(|&b| b == b':').count() {
        0 => false,
        1 => true,
        _ => host.starts_with('[') && host.contains("]:"),
    }
}

/// Removes the `:port` suffix from `host`.
fn strip_port(host: &str) -> Result<&str, PolicyError> {
    if let Some(rest) = host.strip_prefix('[') {
        let end = rest.find(']').ok_or(PolicyError::MalformedHost)?;
        return Ok(&rest[..end]);
    }
    match host.rfind(':') {
        Some(i) => Ok(&host[..i]),
        None => Ok(host),
    }
}

/// ASCII-encodes a DNS name, leaving already-ASCII input untouched.
fn to_ascii(host: &str) -> Result<String, PolicyError> {
    if host.is_empty() {
        return Err(PolicyError::MalformedHost);
    }
    if host.is_ascii() {
        return Ok(host.to_string());
    }
    idna::domain_to_ascii(host).map_err(|_| PolicyError::MalformedHost)
}

/// Reports whether `host` is an IPv4 or IPv6 literal (without brackets).
#[must_use]
pub fn is_ip(host: &str) -> bool {
    host.parse::<std::net::IpAddr>().is_ok()
}

/// Computes the default cookie path for a request path per RFC 6265 §5.1.4.
///
/// An empty or non-absolute path yields `/`; otherwise the path up to but
/// not including its final `/`, with `/` when that prefix would be empty.
#[must_use]
pub fn default_path(path: &str) -> &str {
    if path.is_empty() || !path.starts_with('/') {
        return "/";
    }
    match path.rfind('/') {
        Some(0) => "/",
        Some(i) => &path[..i],
        None => "/",
    }
}

/// Reports whether `s` ends with `"." + suffix`.
///
/// `suffix` must not itself start with a dot; callers strip leading dots
/// before matching.
#[must_use]
pub fn has_dot_suffix(s: &str, suffix: &str) -> bool {
    s.len() > suffix.len()
        && s.as_bytes()[s.len() - suffix.len() - 1] == b'.'
        && s.ends_with(suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_host_table() {
        let cases = [
            ("www.example.com", "www.example.com"),
            ("WWW.EXAMPLE.COM", "www.example.com"),
            ("wWw.eXAmple.CoM", "www.example.com"),
            ("www.example.com:80", "www.example.com"),
            ("192.168.0.10", "192.168.0.10"),
            ("192.168.0.5:8080", "192.168.0.5"),
            ("2001:4860:0:2001::68", "2001:4860:0:2001::68"),
            ("[2001:4860:0:2001::68]:8080", "2001:4860:0:2001::68"),
            ("[2001:4860:0:2001::68]", "2001:4860:0:2001::68"),
            ("www.bücher.de", "www.xn--bcher-kva.de"),
            ("www.example.com.", "www.example.com"),
            ("com.", "com"),
        ];
        for (host, want) in cases {
            let got = canonical_host(host).unwrap();
            assert_eq!(got, want, "canonical_host({host:?})");
        }
    }

    #[test]
    fn test_canonical_host_rejects_unmatched_bracket() {
        assert!(canonical_host("[bad.unmatched.bracket:").is_err());
        assert!(canonical_host("[half.open").is_err());
    }

    #[test]
    fn test_canonical_host_rejects_empty() {
        assert!(canonical_host("").is_err());
        assert!(canonical_host(".").is_err());
    }

    #[test]
    fn test_has_port_table() {
        let cases = [
            ("www.example.com", false),
            ("www.example.com:80", true),
            ("127.0.0.1", false),
            ("127.0.0.1:8080", true),
            ("2001:4860:0:2001::68", false),
            ("[2001::0:12::68]:80", true),
        ];
        for (host, want) in cases {
            assert_eq!(has_port(host), want, "has_port({host:?})");
        }
    }

    #[test]
    fn test_is_ip_table() {
        let cases = [
            ("127.0.0.1", true),
            ("1.2.3.4", true),
            ("2001:4860:0:2001::68", true),
            ("example.com", false),
            ("1.1.1.300", false),
            ("www.foo.bar.net", false),
            ("123.foo.bar.net", false),
        ];
        for (host, want) in cases {
            assert_eq!(is_ip(host), want, "is_ip({host:?})");
        }
    }

    #[test]
    fn test_default_path_table() {
        let cases = [
            ("/", "/"),
            ("/abc", "/"),
            ("/abc/", "/abc"),
            ("/abc/xyz", "/abc"),
            ("/abc/xyz/", "/abc/xyz"),
            ("/a/b/c.html", "/a/b"),
            ("", "/"),
            ("strange", "/"),
            ("//", "/"),
            ("/a//b", "/a/"),
            ("/a/./b", "/a/."),
            ("/a/../b", "/a/.."),
        ];
        for (path, want) in cases {
            assert_eq!(default_path(path), want, "default_path({path:?})");
        }
    }

    // Behavioral equivalence with "ends with '.' + suffix" over a grid of
    // short inputs, including empty strings and bare dots.
    #[test]
    fn test_has_dot_suffix_matches_reference() {
        let values = [
            "", ".", "x", ".x", "x.", "com", "foo.com", "o.com", ".com", "org",
            "foo.org", "xfoo.com", "x.foo.com",
        ];
        for s in values {
            for suffix in values {
                let want = s.ends_with(&format!(".{suffix}"));
                assert_eq!(
                    has_dot_suffix(s, suffix),
                    want,
                    "has_dot_suffix({s:?}, {suffix:?})"
                );
            }
        }
    }
}
