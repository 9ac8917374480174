//! Header-driven per-request configuration extraction and validation.
//!
//! Everything here is a pure function over a `HeaderMap` so it can be unit
//! tested without spinning up a server.

use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::error::ProxyError;

pub const HEADER_URL: &str = "x-url";
pub const HEADER_IDENTIFIER: &str = "x-identifier";
pub const HEADER_SESSION_ID: &str = "x-session-id";
pub const HEADER_PROXY: &str = "x-proxy";
pub const HEADER_TIMEOUT: &str = "x-timeout";
pub const HEADER_JA3: &str = "x-ja3";
pub const HEADER_JA4R: &str = "x-ja4r";
pub const HEADER_HTTP2_FINGERPRINT: &str = "x-http2-fingerprint";
pub const HEADER_USER_AGENT: &str = "x-user-agent";
pub const HEADER_HEADER_ORDER: &str = "x-header-order";
pub const HEADER_INSECURE: &str = "x-insecure";
pub const HEADER_FORCE_HTTP1: &str = "x-force-http1";
pub const HEADER_FORCE_HTTP3: &str = "x-force-http3";
pub const HEADER_ENABLE_CONNECTION_REUSE: &str = "x-enable-connection-reuse";

pub const DEFAULT_IDENTIFIER: &str = "chrome";
pub const DEFAULT_TIMEOUT_SECS: u32 = 30;
const MIN_TIMEOUT_SECS: u32 = 1;
const MAX_TIMEOUT_SECS: u32 = 300;

/// Everything the handler needs to know about one inbound request, derived
/// from its headers.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub target_url: Url,
    pub identifier: String,
    pub session_id: String,
    pub upstream_proxy: Option<String>,
    pub timeout_secs: u32,
    pub ja3: Option<String>,
    pub ja4r: Option<String>,
    pub http2_fingerprint: Option<String>,
    pub user_agent: Option<String>,
    pub header_order: Vec<String>,
    pub insecure: bool,
    pub force_http1: bool,
    pub force_http3: bool,
    pub enable_connection_reuse: bool,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ProxyError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| ProxyError::InvalidHeader {
                name: static_name(name),
                reason: "not valid UTF-8/ASCII".to_string(),
            }),
    }
}

/// Headers are looked up by a fixed, known set of lowercase names; this maps
/// a runtime `&str` back to the `'static` constant for error messages.
fn static_name(name: &str) -> &'static str {
    match name {
        HEADER_URL => "X-URL",
        HEADER_IDENTIFIER => "X-IDENTIFIER",
        HEADER_SESSION_ID => "X-SESSION-ID",
        HEADER_PROXY => "X-PROXY",
        HEADER_TIMEOUT => "X-TIMEOUT",
        HEADER_JA3 => "X-JA3",
        HEADER_JA4R => "X-JA4R",
        HEADER_HTTP2_FINGERPRINT => "X-HTTP2-FINGERPRINT",
        HEADER_USER_AGENT => "X-USER-AGENT",
        HEADER_HEADER_ORDER => "X-HEADER-ORDER",
        HEADER_INSECURE => "X-INSECURE",
        HEADER_FORCE_HTTP1 => "X-FORCE-HTTP1",
        HEADER_FORCE_HTTP3 => "X-FORCE-HTTP3",
        HEADER_ENABLE_CONNECTION_REUSE => "X-ENABLE-CONNECTION-REUSE",
        _ => "X-HEADER",
    }
}

fn parse_bool_flag(value: Option<&str>) -> bool {
    value
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn parse_timeout(value: Option<&str>) -> Result<u32, ProxyError> {
    let Some(raw) = value else {
        return Ok(DEFAULT_TIMEOUT_SECS);
    };
    let parsed: u32 = raw.parse().map_err(|_| ProxyError::InvalidHeader {
        name: "X-TIMEOUT",
        reason: format!("{raw:?} is not an integer number of seconds"),
    })?;
    if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&parsed) {
        return Err(ProxyError::InvalidHeader {
            name: "X-TIMEOUT",
            reason: format!(
                "{parsed} is out of range ({MIN_TIMEOUT_SECS}-{MAX_TIMEOUT_SECS})"
            ),
        });
    }
    Ok(parsed)
}

fn validate_url(raw: &str) -> Result<Url, ProxyError> {
    let url = Url::parse(raw).map_err(|e| ProxyError::InvalidUrl(format!("{raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ProxyError::InvalidUrl(format!(
                "unsupported scheme {other:?} in {raw:?}"
            )))
        }
    }
    if url.host_str().unwrap_or("").is_empty() {
        return Err(ProxyError::InvalidUrl(format!("{raw:?} has no host")));
    }
    Ok(url)
}

impl RequestConfig {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ProxyError> {
        let raw_url = header_str(headers, HEADER_URL)?
            .ok_or(ProxyError::MissingHeader("X-URL"))?;
        let target_url = validate_url(raw_url)?;

        let identifier = header_str(headers, HEADER_IDENTIFIER)?
            .unwrap_or(DEFAULT_IDENTIFIER)
            .to_string();
        let session_id = header_str(headers, HEADER_SESSION_ID)?
            .unwrap_or("")
            .to_string();
        let upstream_proxy = header_str(headers, HEADER_PROXY)?.map(str::to_string);
        let timeout_secs = parse_timeout(header_str(headers, HEADER_TIMEOUT)?)?;

        let ja3 = header_str(headers, HEADER_JA3)?.map(str::to_string);
        let ja4r = header_str(headers, HEADER_JA4R)?.map(str::to_string);
        let http2_fingerprint =
            header_str(headers, HEADER_HTTP2_FINGERPRINT)?.map(str::to_string);
        let user_agent = header_str(headers, HEADER_USER_AGENT)?.map(str::to_string);
        let header_order = header_str(headers, HEADER_HEADER_ORDER)?
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        let insecure = parse_bool_flag(header_str(headers, HEADER_INSECURE)?);
        let force_http1 = parse_bool_flag(header_str(headers, HEADER_FORCE_HTTP1)?);
        let force_http3 = parse_bool_flag(header_str(headers, HEADER_FORCE_HTTP3)?);
        let enable_connection_reuse =
            parse_bool_flag(header_str(headers, HEADER_ENABLE_CONNECTION_REUSE)?);

        if force_http1 && force_http3 {
            return Err(ProxyError::MutuallyExclusiveFlags);
        }

        Ok(Self {
            target_url,
            identifier,
            session_id,
            upstream_proxy,
            timeout_secs,
            ja3,
            ja4r,
            http2_fingerprint,
            user_agent,
            header_order,
            insecure,
            force_http1,
            force_http3,
            enable_connection_reuse,
        })
    }
}

/// Returns true for any header name that should be stripped before
/// forwarding (every `X-*` header, case-insensitively).
pub fn is_stripped_header(name: &HeaderName) -> bool {
    name.as_str().len() >= 2 && name.as_str()[..2].eq_ignore_ascii_case("x-")
}

/// Headers hop-by-hop to the *serving* transport that must never be copied
/// verbatim from the upstream response (the server's own transport manages
/// these for the connection back to the caller).
pub fn is_hop_by_hop_response_header(name: &HeaderName) -> bool {
    matches!(
        name.as_str().to_ascii_lowercase().as_str(),
        "content-length" | "transfer-encoding" | "connection" | "keep-alive"
    )
}

/// Build the set of headers to forward upstream: every inbound header not
/// named `X-*`, plus the resolved `User-Agent` (which always wins over any
/// inbound `User-Agent`, whether it came from the caller or the profile).
pub fn forwarded_request_headers(
    inbound: &HeaderMap,
    resolved_user_agent: &str,
) -> Vec<(HeaderName, HeaderValue)> {
    let mut out: Vec<(HeaderName, HeaderValue)> = inbound
        .iter()
        .filter(|(name, _)| !is_stripped_header(name) && *name != hyper::header::USER_AGENT)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    if let Ok(ua) = HeaderValue::from_str(resolved_user_agent) {
        out.push((hyper::header::USER_AGENT, ua));
    }
    out
}

/// Resolve the effective User-Agent per the precedence rule: `X-USER-AGENT`
/// always wins; otherwise the profile's own UA is used, and any inbound
/// `User-Agent` header is discarded.
pub fn resolve_user_agent(config_override: Option<&str>, profile_user_agent: &str) -> String {
    config_override
        .map(str::to_string)
        .unwrap_or_else(|| profile_user_agent.to_string())
}
