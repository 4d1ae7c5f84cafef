//! Shared fixtures for the integration tests.

use std::path::Path;
use std::sync::Arc;

use cookiejar::{Cookie, Jar, JarOptions, PublicSuffixList};

/// Synthetic current time used by deterministic tests: 2013-01-01T12:00:00Z.
pub const T_NOW: i64 = 1_357_041_600;

/// Two-rule public-suffix list: "co.uk" plus the default rule "*".
pub struct TestPsl;

impl PublicSuffixList for TestPsl {
    fn public_suffix(&self, domain: &str) -> String {
        if domain == "co.uk" || domain.ends_with(".co.uk") {
            return "co.uk".to_string();
        }
        domain[domain.rfind('.').map_or(0, |i| i + 1)..].to_string()
    }

    fn description(&self) -> String {
        "test psl".to_string()
    }
}

/// Creates a jar with the test suffix list, optionally backed by a file.
pub fn new_test_jar(path: Option<&Path>) -> Jar {
    Jar::new(JarOptions {
        public_suffix_list: Some(Arc::new(TestPsl)),
        filename: path.map(Path::to_path_buf),
        no_persist: false,
    })
    .expect("test jar")
}

/// Builds a [`Cookie`] from a compact `"name=value; attr; attr=val"` spec.
///
/// Supported attributes: `path`, `domain`, `max-age`, `expires-at` (absolute
/// Unix seconds; the header parser that turns an `Expires` date into an
/// instant is outside the crate), `secure`, `httponly`.
pub fn cookie(spec: &str) -> Cookie {
    let mut parts = spec.split(';');
    let name_value = parts.next().expect("cookie spec");
    let (name, value) = name_value.split_once('=').expect("name=value");
    let mut cookie = Cookie::new(name.trim(), value.trim());
    for attr in parts {
        let attr = attr.trim();
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim().to_ascii_lowercase(), v.trim()),
            None => (attr.to_ascii_lowercase(), ""),
        };
        match key.as_str() {
            "path" => cookie.path = Some(val.to_string()),
            "domain" => cookie.domain = Some(val.to_string()),
            "max-age" => cookie.max_age = Some(val.parse().expect("max-age")),
            "expires-at" => cookie.expires = Some(val.parse().expect("expires-at")),
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            other => panic!("unsupported attribute {other:?} in {spec:?}"),
        }
    }
    cookie
}
