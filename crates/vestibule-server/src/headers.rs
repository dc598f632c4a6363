use axum::{extract::Request, middleware::Next, response::Response};
use http::{header, HeaderMap, HeaderValue};

/// Fixed security headers attached to every response.
pub const SECURITY_HEADERS: [(header::HeaderName, &str); 3] = [
    (header::X_FRAME_OPTIONS, "SAMEORIGIN"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
];

/// Overwrite the security headers on `headers`.
pub fn harden(headers: &mut HeaderMap) {
    for (name, value) in SECURITY_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
}

/// Axum middleware applying [`harden`] to every response, including
/// redirects and errors produced further in.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    harden(response.headers_mut());
    response
}
