use hyper::StatusCode;

/// Errors surfaced to the inbound caller. Every variant knows its own HTTP
/// status and renders as a single plain-text line, per the error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: &'static str, reason: String },

    #[error("invalid target URL: {0}")]
    InvalidUrl(String),

    #[error("unknown profile identifier. Available profiles: {available}")]
    UnknownProfile { available: String },

    #[error("X-FORCE-HTTP1 and X-FORCE-HTTP3 are mutually exclusive")]
    MutuallyExclusiveFlags,

    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingHeader(_)
            | ProxyError::InvalidHeader { .. }
            | ProxyError::InvalidUrl(_)
            | ProxyError::UnknownProfile { .. }
            | ProxyError::MutuallyExclusiveFlags => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Single-line, curl-safe plain text body.
    pub fn body_text(&self) -> String {
        self.to_string().replace('\n', " ")
    }
}

impl From<rquest::Error> for ProxyError {
    fn from(e: rquest::Error) -> Self {
        ProxyError::Upstream(e.to_string())
    }
}

impl From<hyper::Error> for ProxyError {
    fn from(e: hyper::Error) -> Self {
        ProxyError::Upstream(e.to_string())
    }
}

/// Internal, never-user-facing failures (e.g. building the static catalogue
/// or constructing a fresh client). Kept as a boxed error, matching the
/// teacher's original alias, since these never need per-variant status codes.
pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
