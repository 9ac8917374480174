use crate::error::ProxyError;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;

/// Response body type used across the handler: a boxed, streaming body whose
/// frame errors are our own error type rather than `Infallible`, so upstream
/// transport failures mid-stream can still be represented.
pub type ResponseBody = BoxBody<Bytes, ProxyError>;

pub fn full<T: Into<Bytes>>(data: T) -> ResponseBody {
    use http_body_util::{BodyExt, Full};
    BoxBody::new(Full::new(data.into()).map_err(|never| match never {}))
}
