use bytes::Bytes;
use http::Method;
use std::collections::HashMap;
use std::io::Read;
use tracing::debug;

use super::frame::{self, Frame};
use crate::error::RequestError;

/// Multi-valued parameter map: key → values in wire order.
pub type ParamMap = HashMap<String, Vec<String>>;

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// A parsed HTTP request.
///
/// Built once per connection and never mutated afterwards; handlers receive
/// it behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// HTTP method (GET, POST, or any extension token)
    pub method: Method,
    /// Raw URI path, everything before the first `?`
    pub path: String,
    /// Protocol version token from the request line (e.g. `HTTP/1.1`)
    pub version: String,
    /// Headers keyed exactly as received; the last occurrence of a name wins
    pub headers: HashMap<String, String>,
    /// URL-decoded query string parameters
    pub query: ParamMap,
    /// URL-decoded form fields, only for `application/x-www-form-urlencoded` bodies
    pub form: ParamMap,
    /// Raw body, exactly `Content-Length` bytes
    pub body: Bytes,
}

impl Request {
    /// Get a header by name, ignoring ASCII case (RFC 7230).
    ///
    /// Use `headers.get` for a lookup with the exact casing sent by the client.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_ignore_case(&self.headers, name)
    }

    /// First value of a query parameter
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        first(&self.query, name)
    }

    /// All values of a query parameter, in wire order
    #[must_use]
    pub fn query_values(&self, name: &str) -> &[String] {
        self.query.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First value of a form field
    #[must_use]
    pub fn form_param(&self, name: &str) -> Option<&str> {
        first(&self.form, name)
    }

    /// All values of a form field, in wire order
    #[must_use]
    pub fn form_values(&self, name: &str) -> &[String] {
        self.form.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Body as UTF-8 text
    pub fn body_text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.body)
    }
}

/// Request line and headers, before the body has been read.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestHead {
    pub method: Method,
    pub path: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub query: ParamMap,
}

impl RequestHead {
    /// Declared body length; a missing header means no body.
    pub fn content_length(&self) -> Result<u64, RequestError> {
        match header_ignore_case(&self.headers, "Content-Length") {
            None => Ok(0),
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                RequestError::malformed(format!("invalid Content-Length: {raw}"))
            }),
        }
    }

    /// Attach the body and decode form fields when the content type asks for it.
    #[must_use]
    pub fn with_body(self, body: Bytes) -> Request {
        let is_form = header_ignore_case(&self.headers, "Content-Type")
            .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(FORM_URLENCODED));

        let form = if is_form {
            match std::str::from_utf8(&body) {
                Ok(text) => parse_pairs(text),
                Err(_) => {
                    debug!(body_len = body.len(), "Form body is not valid UTF-8, skipping decode");
                    ParamMap::new()
                }
            }
        } else {
            ParamMap::new()
        };

        Request {
            method: self.method,
            path: self.path,
            version: self.version,
            headers: self.headers,
            query: self.query,
            form,
            body,
        }
    }
}

/// Decode `key=value&key=value` pairs with form-urlencoded rules.
///
/// Both keys and values are percent-decoded (`+` is a space). A repeated key
/// keeps its first slot and collects later values after the earlier ones.
/// Pairs without `=` get an empty value; empty segments are skipped.
#[must_use]
pub fn parse_pairs(input: &str) -> ParamMap {
    let mut map = ParamMap::new();
    for (key, value) in url::form_urlencoded::parse(input.as_bytes()) {
        map.entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    map
}

/// Parse the request line and header block of a framed request.
pub fn parse_head(frame: &Frame) -> Result<RequestHead, RequestError> {
    let request_line = std::str::from_utf8(frame.request_line())
        .map_err(|_| RequestError::malformed("request line is not valid UTF-8"))?;

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    let [method, uri, version] = parts.as_slice() else {
        return Err(RequestError::malformed(format!(
            "request line must contain 3 parts, got {}",
            parts.len()
        )));
    };

    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| RequestError::malformed(format!("invalid method: {method}")))?;

    let (path, query) = match uri.split_once('?') {
        Some((path, query)) => (path, parse_pairs(query)),
        None => (*uri, ParamMap::new()),
    };

    let headers = parse_headers(frame.header_block())?;

    debug!(
        method = %method,
        path = %path,
        http_version = %version,
        headers_count = headers.len(),
        query_count = query.len(),
        "HTTP request head parsed"
    );

    Ok(RequestHead {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        query,
    })
}

fn parse_headers(block: &[u8]) -> Result<HashMap<String, String>, RequestError> {
    let mut headers = HashMap::new();
    if block.is_empty() {
        return Ok(headers);
    }

    let block = std::str::from_utf8(block)
        .map_err(|_| RequestError::malformed("headers are not valid UTF-8"))?;

    for line in block.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            return Err(RequestError::malformed(format!("invalid header: {line}")));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(RequestError::malformed(format!("invalid header: {line}")));
        }
        headers.insert(name.to_string(), value.trim().to_string());
    }
    Ok(headers)
}

/// Frame, parse and read the body of one request from `source`.
pub fn read_request<R: Read>(
    source: &mut R,
    header_limit: usize,
    body_limit: u64,
) -> Result<Request, RequestError> {
    let frame = frame::read_head(source, header_limit)?;
    let head = parse_head(&frame)?;
    let content_length = head.content_length()?;
    let body = frame::read_body(&frame, source, content_length, body_limit)?;
    Ok(head.with_body(body))
}

fn header_ignore_case<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .or_else(|| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
        .map(String::as_str)
}

fn first<'a>(map: &'a ParamMap, name: &str) -> Option<&'a str> {
    map.get(name)
        .and_then(|values| values.first())
        .map(String::as_str)
}
