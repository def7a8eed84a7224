//! Conversion of pipeline responses into hyper responses.

use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;

use crate::ingress::OutboundResponse;

/// Build the hyper response written back on the connection.
pub fn into_http(response: OutboundResponse) -> Response<Full<Bytes>> {
    let OutboundResponse {
        status,
        headers,
        body,
    } = response;

    let mut http = Response::new(Full::new(body));
    *http.status_mut() = status;
    *http.headers_mut() = headers;
    http
}
