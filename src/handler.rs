//! HTTP entry point: parse headers, validate, resolve a profile, forward
//! the request through an impersonating client, and stream the response
//! back to the caller. Implements the `/health` short-circuit too.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::{Method, Request, Response, StatusCode};
use rquest::Method as RqMethod;
use serde::Serialize;

use crate::config::ServerConfig;
use crate::error::ProxyError;
use crate::metrics::{LogEntry, ServerMetrics};
use crate::profiles::{Catalogue, Profile};
use crate::request::{self, RequestConfig};
use crate::rotator::Rotator;
use crate::session_manager::{ClientOverrides, SessionManager};
use crate::types::{self, ResponseBody};

pub struct AppState {
    pub catalogue: Catalogue,
    pub rotator: Rotator,
    pub sessions: SessionManager,
    pub metrics: Arc<ServerMetrics>,
    pub config: ServerConfig,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, metrics: Arc<ServerMetrics>) -> Self {
        let catalogue = Catalogue::new();
        Self {
            rotator: Rotator::new(catalogue),
            catalogue,
            sessions: SessionManager::new(),
            metrics,
            config,
            started_at: Instant::now(),
        }
    }
}

#[derive(Serialize)]
struct HealthProxyInfo {
    profiles_available: usize,
    active_sessions: usize,
    default_timeout: u32,
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    timestamp: String,
    version: &'static str,
    proxy: HealthProxyInfo,
}

fn health_response(state: &AppState) -> Response<ResponseBody> {
    let body = HealthBody {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
        proxy: HealthProxyInfo {
            profiles_available: state.catalogue.len(),
            active_sessions: state.sessions.session_count(),
            default_timeout: request::DEFAULT_TIMEOUT_SECS,
        },
    };
    let json = serde_json::to_vec(&body).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(StatusCode::OK)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(types::full(json))
        .expect("static health response is always well-formed")
}

fn error_response(err: &ProxyError) -> Response<ResponseBody> {
    Response::builder()
        .status(err.status())
        .header(hyper::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(types::full(err.body_text()))
        .expect("static error response is always well-formed")
}

fn to_rquest_method(method: &Method) -> RqMethod {
    match *method {
        Method::GET => RqMethod::GET,
        Method::POST => RqMethod::POST,
        Method::PUT => RqMethod::PUT,
        Method::DELETE => RqMethod::DELETE,
        Method::PATCH => RqMethod::PATCH,
        Method::HEAD => RqMethod::HEAD,
        Method::OPTIONS => RqMethod::OPTIONS,
        _ => RqMethod::GET,
    }
}

fn has_body(method: &Method) -> bool {
    matches!(method, &Method::POST | &Method::PUT | &Method::PATCH)
}

pub async fn handle(
    state: Arc<AppState>,
    req: Request<Incoming>,
    remote_addr: SocketAddr,
) -> Response<ResponseBody> {
    if req.uri().path() == "/health" {
        return health_response(&state);
    }

    match process(&state, req, remote_addr).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(status = %err.status(), error = %err, "request failed");
            error_response(&err)
        }
    }
}

/// Accumulated along the pipeline so a `LogEntry` can be emitted whether the
/// request ultimately succeeds or fails partway through.
struct LogContext {
    started: Instant,
    method: String,
    url: String,
    profile: String,
    session_id: String,
    remote_addr: String,
}

impl LogContext {
    fn entry(&self, status: u16) -> LogEntry {
        LogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            method: self.method.clone(),
            url: self.url.clone(),
            profile: self.profile.clone(),
            status,
            duration_ms: self.started.elapsed().as_millis() as u64,
            session_id: self.session_id.clone(),
            remote_addr: self.remote_addr.clone(),
        }
    }
}

/// Runs the full pipeline and unconditionally records metrics/log/monitor
/// events on the way out, whichever branch produced the outcome.
async fn process(
    state: &Arc<AppState>,
    req: Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<Response<ResponseBody>, ProxyError> {
    let started = Instant::now();
    let mut log_ctx = LogContext {
        started,
        method: req.method().to_string(),
        url: String::new(),
        profile: String::new(),
        session_id: String::new(),
        remote_addr: remote_addr.to_string(),
    };

    let result = run_pipeline(state, req, &mut log_ctx).await;

    let status = match &result {
        Ok(response) => response.status().as_u16(),
        Err(err) => err.status().as_u16(),
    };
    let entry = log_ctx.entry(status);
    state.metrics.record(status, started.elapsed(), 0);
    state.metrics.emit_log(entry.clone());
    state.metrics.emit_request_event(entry, result.is_err());

    result
}

async fn run_pipeline(
    state: &Arc<AppState>,
    req: Request<Incoming>,
    log_ctx: &mut LogContext,
) -> Result<Response<ResponseBody>, ProxyError> {
    let method = req.method().clone();
    let inbound_headers = req.headers().clone();

    let config = RequestConfig::from_headers(&inbound_headers)?;
    log_ctx.url = config.target_url.to_string();
    log_ctx.session_id = config.session_id.clone();

    let (profile, _) = state
        .rotator
        .resolve_identifier(&config.identifier, &config.session_id)
        .ok_or_else(|| ProxyError::UnknownProfile {
            available: state.catalogue.list().join(", "),
        })?;

    let profile = resolve_fingerprint_override(
        &state.catalogue,
        profile,
        config.ja3.as_deref(),
        config.ja4r.as_deref(),
    );
    log_ctx.profile = profile.id.clone();

    let overrides = ClientOverrides {
        upstream_proxy: config.upstream_proxy.clone(),
        insecure: config.insecure,
        force_http1: config.force_http1,
        force_http3: config.force_http3,
    };

    let client = state
        .sessions
        .client_for(&config.session_id, profile, &overrides)
        .map_err(|e| ProxyError::Upstream(e.to_string()))?;

    let user_agent = request::resolve_user_agent(config.user_agent.as_deref(), &profile.user_agent);

    let body_bytes = if has_body(&method) {
        req.into_body().collect().await.map_err(ProxyError::from)?.to_bytes()
    } else {
        Bytes::new()
    };

    let mut builder = client
        .client
        .request(to_rquest_method(&method), config.target_url.as_str())
        .timeout(std::time::Duration::from_secs(config.timeout_secs as u64));

    for (name, value) in ordered_forward_headers(&inbound_headers, &user_agent, &config.header_order) {
        builder = builder.header(name, value);
    }

    if config.http2_fingerprint.is_some() {
        tracing::debug!("X-HTTP2-FINGERPRINT accepted but not wired into the TLS stack in this build");
    }
    if config.enable_connection_reuse && config.session_id.is_empty() {
        tracing::debug!(
            "X-ENABLE-CONNECTION-REUSE requested on an anonymous request; reuse requires X-SESSION-ID"
        );
    }

    if !body_bytes.is_empty() {
        builder = builder.body(body_bytes);
    }

    let upstream_response = builder.send().await.map_err(ProxyError::from)?;

    let status = upstream_response.status();
    let mut response_builder = Response::builder().status(status.as_u16());
    for (name, value) in upstream_response.headers() {
        if request::is_hop_by_hop_response_header(name) {
            continue;
        }
        response_builder = response_builder.header(name, value);
    }

    let byte_stream = upstream_response.bytes_stream();
    let frame_stream = futures_util::StreamExt::map(byte_stream, |chunk| {
        chunk
            .map(Frame::data)
            .map_err(|e| ProxyError::Upstream(e.to_string()))
    });
    let body: ResponseBody = types_box_body(StreamBody::new(frame_stream));

    response_builder
        .body(body)
        .map_err(|e| ProxyError::Upstream(e.to_string()))
}

fn types_box_body<B>(body: B) -> ResponseBody
where
    B: hyper::body::Body<Data = Bytes, Error = ProxyError> + Send + Sync + 'static,
{
    http_body_util::combinators::BoxBody::new(body)
}

/// Apply `X-HEADER-ORDER` on a best-effort basis: headers named in the
/// order are emitted first (if present inbound), then every remaining
/// forwardable header in its original order, then the resolved
/// `User-Agent` last if it wasn't already covered.
fn ordered_forward_headers(
    inbound: &hyper::HeaderMap,
    user_agent: &str,
    header_order: &[String],
) -> Vec<(hyper::header::HeaderName, hyper::header::HeaderValue)> {
    let mut forwardable = request::forwarded_request_headers(inbound, user_agent);

    if header_order.is_empty() {
        return forwardable;
    }

    let mut ordered = Vec::with_capacity(forwardable.len());
    for wanted in header_order {
        if let Ok(name) = hyper::header::HeaderName::from_bytes(wanted.as_bytes()) {
            let mut i = 0;
            while i < forwardable.len() {
                if forwardable[i].0 == name {
                    ordered.push(forwardable.remove(i));
                } else {
                    i += 1;
                }
            }
        }
    }
    ordered.append(&mut forwardable);
    ordered
}

/// Resolve §9's JA3/JA4R-override design decision: if an override string
/// matches a *different* catalogue profile's own `ja3`/`ja4r`, substitute
/// that profile wholesale (its `Impersonate` preset, UA, everything) in
/// place of the one the rotator chose. `X-JA3` is tried first; `X-JA4R`
/// only applies if `X-JA3` didn't already resolve a substitution. An
/// override matching no catalogue profile is a no-op, logged at debug.
fn resolve_fingerprint_override(
    catalogue: &Catalogue,
    base: &'static Profile,
    ja3_override: Option<&str>,
    ja4r_override: Option<&str>,
) -> &'static Profile {
    if let Some(wanted) = ja3_override {
        if wanted != base.ja3 {
            if let Some(p) = find_by_ja3(catalogue, wanted) {
                tracing::debug!(profile = %p.id, "substituted profile via X-JA3 override");
                return p;
            }
            tracing::debug!(value = %wanted, "X-JA3 override matches no catalogue profile, ignoring");
        }
    }

    if let Some(wanted) = ja4r_override {
        if wanted != base.ja4r {
            if let Some(p) = find_by_ja4r(catalogue, wanted) {
                tracing::debug!(profile = %p.id, "substituted profile via X-JA4R override");
                return p;
            }
            tracing::debug!(value = %wanted, "X-JA4R override matches no catalogue profile, ignoring");
        }
    }

    base
}

fn find_by_ja3(catalogue: &Catalogue, wanted: &str) -> Option<&'static Profile> {
    catalogue
        .list()
        .iter()
        .filter_map(|id| catalogue.get(id))
        .find(|p| p.ja3 == wanted)
}

fn find_by_ja4r(catalogue: &Catalogue, wanted: &str) -> Option<&'static Profile> {
    catalogue
        .list()
        .iter()
        .filter_map(|id| catalogue.get(id))
        .find(|p| p.ja4r == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::{HeaderMap, HeaderName, HeaderValue};

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn ordered_headers_respects_requested_order_then_appends_rest() {
        let inbound = headers(&[
            ("accept", "text/html"),
            ("accept-language", "en"),
            ("cookie", "a=b"),
            ("x-url", "https://example.com"),
        ]);
        let order = vec!["Cookie".to_string(), "Accept".to_string()];
        let ordered = ordered_forward_headers(&inbound, "UA/1.0", &order);
        let names: Vec<_> = ordered.iter().map(|(n, _)| n.as_str().to_string()).collect();
        assert_eq!(names[0], "cookie");
        assert_eq!(names[1], "accept");
        assert!(names.contains(&"accept-language".to_string()));
        assert!(names.contains(&"user-agent".to_string()));
        assert!(!names.iter().any(|n| n.starts_with("x-")));
    }

    #[test]
    fn no_header_order_falls_back_to_plain_forwarding() {
        let inbound = headers(&[("accept", "text/html"), ("x-url", "https://example.com")]);
        let ordered = ordered_forward_headers(&inbound, "UA/1.0", &[]);
        assert!(!ordered.iter().any(|(n, _)| n.as_str().starts_with("x-")));
    }

    #[test]
    fn ja3_override_matching_another_profile_substitutes_it() {
        let catalogue = Catalogue::new();
        let firefox = catalogue.get("firefox").unwrap();
        let chrome = catalogue.get("chrome").unwrap();
        let resolved =
            resolve_fingerprint_override(&catalogue, chrome, Some(firefox.ja3.as_str()), None);
        assert_eq!(resolved.id, "firefox");
    }

    #[test]
    fn ja3_override_matching_current_profile_is_noop() {
        let catalogue = Catalogue::new();
        let chrome = catalogue.get("chrome").unwrap();
        let resolved =
            resolve_fingerprint_override(&catalogue, chrome, Some(chrome.ja3.as_str()), None);
        assert_eq!(resolved.id, "chrome");
    }

    #[test]
    fn unknown_ja3_override_is_noop() {
        let catalogue = Catalogue::new();
        let chrome = catalogue.get("chrome").unwrap();
        let resolved =
            resolve_fingerprint_override(&catalogue, chrome, Some("not-a-real-fingerprint"), None);
        assert_eq!(resolved.id, "chrome");
    }

    #[test]
    fn ja4r_override_matching_another_profile_substitutes_it_when_ja3_is_absent() {
        let catalogue = Catalogue::new();
        let safari = catalogue.get("safari").unwrap();
        let chrome = catalogue.get("chrome").unwrap();
        let resolved = resolve_fingerprint_override(&catalogue, chrome, None, Some(&safari.ja4r));
        assert_eq!(resolved.id, "safari");
    }

    #[test]
    fn ja3_override_takes_precedence_over_ja4r_override() {
        let catalogue = Catalogue::new();
        let firefox = catalogue.get("firefox").unwrap();
        let safari = catalogue.get("safari").unwrap();
        let chrome = catalogue.get("chrome").unwrap();
        let resolved = resolve_fingerprint_override(
            &catalogue,
            chrome,
            Some(firefox.ja3.as_str()),
            Some(&safari.ja4r),
        );
        assert_eq!(resolved.id, "firefox");
    }
}
