//! Fixed responses written by the server itself.
//!
//! Handlers own the bytes of their responses; these are only used when the
//! pipeline fails before or around a handler. Every one of them closes the
//! connection.

use http::StatusCode;
use std::io::{self, Write};

/// JSON body shared by the 404, 500 and 503 responses.
pub const JSON_ERROR_BODY: &str = r#"{"status": "error"}"#;
pub const MALFORMED_HTML_BODY: &str = "<h1>Malformed request</h1>";
pub const TOO_LARGE_HTML_BODY: &str = "<h1>Request body too large</h1>";

const JSON: &str = "application/json";
const HTML: &str = "text/html; charset=UTF-8";

/// Render a complete `Connection: close` response.
#[must_use]
pub fn render(status: StatusCode, content_type: &str, body: &str) -> Vec<u8> {
    let reason = status.canonical_reason().unwrap_or("Unknown");
    format!(
        "HTTP/1.1 {} {reason}\r\nContent-Length: {}\r\nContent-Type: {content_type}\r\nConnection: close\r\n\r\n{body}",
        status.as_u16(),
        body.len(),
    )
    .into_bytes()
}

#[must_use]
pub fn not_found() -> Vec<u8> {
    render(StatusCode::NOT_FOUND, JSON, JSON_ERROR_BODY)
}

#[must_use]
pub fn internal_error() -> Vec<u8> {
    render(StatusCode::INTERNAL_SERVER_ERROR, JSON, JSON_ERROR_BODY)
}

#[must_use]
pub fn service_unavailable() -> Vec<u8> {
    render(StatusCode::SERVICE_UNAVAILABLE, JSON, JSON_ERROR_BODY)
}

#[must_use]
pub fn bad_request() -> Vec<u8> {
    render(StatusCode::BAD_REQUEST, HTML, MALFORMED_HTML_BODY)
}

#[must_use]
pub fn payload_too_large() -> Vec<u8> {
    render(StatusCode::PAYLOAD_TOO_LARGE, HTML, TOO_LARGE_HTML_BODY)
}

/// Write one of the fixed responses.
pub fn write_fixed<W: Write + ?Sized>(out: &mut W, bytes: &[u8]) -> io::Result<()> {
    out.write_all(bytes)
}
