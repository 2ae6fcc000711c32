//! HTTP/1.1 response builder.
//!
//! Besides the fluent builder, this module has constructors for the three
//! terminal responses the dispatch layer produces on its own: redirects,
//! structured JSON errors, and the not-found page.

use bytes::{BufMut, BytesMut};
use serde::Serialize;

use super::{Headers, StatusCode};

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use routegate::http::{Response, StatusCode};
///
/// let response = Response::redirect("/access-denied");
/// assert_eq!(response.status(), StatusCode::Found);
/// assert_eq!(response.headers().get("location"), Some("/access-denied"));
///
/// let bytes = Response::new(StatusCode::Ok).body("ok").into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            keep_alive: true,
        }
    }

    /// `302 Found` pointing at `location`.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::new(StatusCode::Found).header("Location", location)
    }

    /// A response whose body is `value` encoded as JSON.
    ///
    /// Encoding failures degrade to a `500` with an empty JSON object so the
    /// client still receives well-formed JSON.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status)
                .header("Content-Type", "application/json")
                .body_bytes(body),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode JSON response body");
                Self::new(StatusCode::InternalServerError)
                    .header("Content-Type", "application/json")
                    .body("{}")
            }
        }
    }

    /// Structured API error: `{"status": <code>, "error": <message>}`.
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        #[derive(Serialize)]
        struct ApiError {
            status: u16,
            error: String,
        }

        Self::json(
            status,
            &ApiError {
                status: status.as_u16(),
                error: message.into(),
            },
        )
    }

    /// Minimal HTML page for unmatched routes.
    pub fn not_found_page(path: &str) -> Self {
        let escaped = path
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;");
        Self::new(StatusCode::NotFound)
            .header("Content-Type", "text/html; charset=utf-8")
            .body(format!(
                "<!doctype html><title>404 Not Found</title><h1>Page not found</h1><p>{escaped}</p>"
            ))
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Appends a header in-place, for callers that only hold `&mut Response`.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.append(name, value);
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Controls whether the `Connection: keep-alive` or `Connection: close` header is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8 text, lossily decoded.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// `Content-Type: text/plain` is added for non-empty bodies without one;
    /// `Connection` and `Content-Length` are always written.
    pub fn into_bytes(mut self) -> BytesMut {
        let content_length = self.body.len();

        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .append("Content-Type", "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.set("Connection", connection);

        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64 + content_length);

        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );
        buf.put(self.headers.to_string().as_bytes());
        buf.put(format!("Content-Length: {content_length}\r\n\r\n").as_bytes());
        buf.put(self.body.as_slice());

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}
