//! Static catalogue of named TLS/HTTP fingerprint profiles.
//!
//! The catalogue is built once, lazily, on first access and never mutated
//! afterwards — callers only ever see `&Profile` references into the same
//! process-wide table, so lookups need no locking.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use rquest::Impersonate;

/// Negotiated HTTP version for a profile's outbound transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum HttpVersion {
    #[serde(rename = "h2")]
    Http2,
    #[serde(rename = "http/1.1")]
    Http1_1,
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpVersion::Http2 => write!(f, "h2"),
            HttpVersion::Http1_1 => write!(f, "http/1.1"),
        }
    }
}

/// Negotiated TLS version for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TlsVersion {
    #[serde(rename = "1.2")]
    V1_2,
    #[serde(rename = "1.3")]
    V1_3,
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsVersion::V1_2 => write!(f, "1.2"),
            TlsVersion::V1_3 => write!(f, "1.3"),
        }
    }
}

/// An immutable, named fingerprint profile.
#[derive(Debug, Clone)]
pub struct Profile {
    pub id: String,
    pub ja3: String,
    pub ja4r: String,
    pub user_agent: String,
    pub http_version: HttpVersion,
    pub tls_version: TlsVersion,
    pub platform: String,
    pub description: String,
    /// The concrete `rquest` preset this profile dials with. Not part of the
    /// public data model (§3 of the spec) but needed to actually build a
    /// client — kept out of `Display`/serialization of the profile itself.
    pub(crate) impersonate: Impersonate,
}

impl Profile {
    fn new(
        id: &str,
        ja3: &str,
        ja4r: &str,
        user_agent: &str,
        http_version: HttpVersion,
        tls_version: TlsVersion,
        platform: &str,
        description: &str,
        impersonate: Impersonate,
    ) -> Self {
        debug_assert!(
            !ja3.is_empty() || !ja4r.is_empty(),
            "profile {id} must carry at least one of ja3/ja4r"
        );
        debug_assert!(!user_agent.is_empty(), "profile {id} must carry a user agent");
        Self {
            id: id.to_string(),
            ja3: ja3.to_string(),
            ja4r: ja4r.to_string(),
            user_agent: user_agent.to_string(),
            http_version,
            tls_version,
            platform: platform.to_string(),
            description: description.to_string(),
            impersonate,
        }
    }
}

fn build_table() -> BTreeMap<String, Profile> {
    let profiles = vec![
        Profile::new(
            "chrome",
            "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-13-51-45-43-21,29-23-24,0",
            "t13d1516h2_8daaf6152771_02713d6af862",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
            HttpVersion::Http2,
            TlsVersion::V1_3,
            "Windows",
            "Chrome 131 desktop (default identifier)",
            Impersonate::Chrome131,
        ),
        Profile::new(
            "chrome138",
            "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-13-51-45-43-21-41,29-23-24,0",
            "t13d1517h2_9a2c1173fa8e_5b3a0d9cf214",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36",
            HttpVersion::Http2,
            TlsVersion::V1_3,
            "Windows",
            "Chrome 138 desktop (hard-coded rotator fallback)",
            Impersonate::Chrome131,
        ),
        Profile::new(
            "chrome120",
            "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-13-18-51-45-43-21,29-23-24,0",
            "t13d1516h2_7c1e4b0a9d33_3f21aa6c90bd",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            HttpVersion::Http2,
            TlsVersion::V1_3,
            "Windows",
            "Chrome 120 desktop",
            Impersonate::Chrome120,
        ),
        Profile::new(
            "chrome100",
            "769,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-13-51-45-43,29-23-24,0",
            "t12d1516h1_2b6d59a4f0c7_e84a71b56d32",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/100.0.0.0 Safari/537.36",
            HttpVersion::Http1_1,
            TlsVersion::V1_2,
            "Windows",
            "Chrome 100 legacy TLS 1.2 / HTTP/1.1 fallback",
            Impersonate::Chrome100,
        ),
        Profile::new(
            "firefox",
            "771,4867-4866-4865-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-34-51-43-13-45-28-65037,29-23-24-25-256-257,0",
            "t13d1514h2_5ccd8a2b931f_aa47d0c61e98",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
            HttpVersion::Http2,
            TlsVersion::V1_3,
            "Windows",
            "Firefox 133 desktop",
            Impersonate::Firefox133,
        ),
        Profile::new(
            "firefox109",
            "771,4867-4866-4865-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-34-51-43-13-45-28,29-23-24-25,0",
            "t13d1513h2_6fa9d2c0e7b1_b05c86af4d93",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/109.0",
            HttpVersion::Http2,
            TlsVersion::V1_3,
            "Windows",
            "Firefox 109 desktop",
            Impersonate::Firefox109,
        ),
        Profile::new(
            "edge",
            "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-13-51-45-43-21-41,29-23-24,0",
            "t13d1516h2_bb1e3c749a02_f6d825017ace",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
            HttpVersion::Http2,
            TlsVersion::V1_3,
            "Windows",
            "Edge 131 desktop",
            Impersonate::Edge131,
        ),
        Profile::new(
            "edge101",
            "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-13-51-45-43,29-23-24,0",
            "t13d1515h2_2a9bc47e1053_c471db0a8f6e",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/101.0.0.0 Safari/537.36 Edg/101.0.1210.39",
            HttpVersion::Http2,
            TlsVersion::V1_3,
            "Windows",
            "Edge 101 desktop",
            Impersonate::Edge101,
        ),
        Profile::new(
            "safari",
            "771,4865-4867-4866-49196-49195-52393-49200-49199-52392-49162-49161-49172-49171-157-156-61-60-53-47,0-23-65281-10-11-16-5-13-18-51-45-43-27-21,29-23-24-25,0",
            "t13d1412h2_8f37c9a0b562_1aef7d90bc34",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.2 Safari/605.1.15",
            HttpVersion::Http2,
            TlsVersion::V1_3,
            "macOS",
            "Safari 18.2 desktop",
            Impersonate::Safari18_2,
        ),
        Profile::new(
            "safari17",
            "771,4865-4867-4866-49196-49195-52393-49200-49199-52392-49162-49161-49172-49171-157-156-61-60-53-47,0-23-65281-10-11-16-5-13-18-51-45-43,29-23-24-25,0",
            "t13d1411h2_0c6a8b3df214_9e2c574ab610",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
            HttpVersion::Http2,
            TlsVersion::V1_3,
            "macOS",
            "Safari 17.4.1 desktop",
            Impersonate::Safari17_4_1,
        ),
        Profile::new(
            "safari_ios",
            "771,4865-4867-4866-49196-49195-52393-49200-49199-52392-49162-49161-49172-49171-157-156-61-60-53-47,0-23-65281-10-11-16-5-13-18-51-45-43-27,29-23-24,0",
            "t13d1413h2_4d87fa1b60e2_d3b069c5fa27",
            "Mozilla/5.0 (iPhone; CPU iPhone OS 18_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Mobile/15E148 Safari/604.1",
            HttpVersion::Http2,
            TlsVersion::V1_3,
            "iOS",
            "Safari iOS 18.1.1",
            Impersonate::SafariIos18_1_1,
        ),
        Profile::new(
            "okhttp",
            "",
            "t13d1210h2_1fd6b27ae845_6b0a45dc17f2",
            "okhttp/5.0.0",
            HttpVersion::Http2,
            TlsVersion::V1_3,
            "Android",
            "OkHttp 5 Android client",
            Impersonate::OkHttp5,
        ),
    ];

    profiles.into_iter().map(|p| (p.id.clone(), p)).collect()
}

static CATALOGUE: Lazy<BTreeMap<String, Profile>> = Lazy::new(build_table);

/// Read-only handle onto the process-wide profile table.
#[derive(Debug, Clone, Copy, Default)]
pub struct Catalogue;

impl Catalogue {
    pub fn new() -> Self {
        Self
    }

    /// Look up a profile by id. Returns `None` rather than an error — the
    /// spec treats "not found" as a flag, not an exceptional condition.
    pub fn get(&self, id: &str) -> Option<&'static Profile> {
        CATALOGUE.get(id)
    }

    pub fn validate(&self, id: &str) -> bool {
        CATALOGUE.contains_key(id)
    }

    /// Sorted list of every known profile id (`BTreeMap` keeps insertion
    /// order sorted already, so this is just a clone of the keys).
    pub fn list(&self) -> Vec<String> {
        CATALOGUE.keys().cloned().collect()
    }

    pub fn by_platform(&self, platform: &str) -> Vec<&'static Profile> {
        CATALOGUE
            .values()
            .filter(|p| p.platform.eq_ignore_ascii_case(platform))
            .collect()
    }

    pub fn len(&self) -> usize {
        CATALOGUE.len()
    }

    pub fn is_empty(&self) -> bool {
        CATALOGUE.is_empty()
    }
}
