//! Transport abstraction for the vault API client
//!
//! Defines the `Transport` trait that decouples request dispatch from the HTTP
//! stack. The client builds a fully-formed `TransportRequest` (method, URL,
//! headers, encoded body, credentials mode) and gets back the status, headers
//! and raw body. TLS, DNS, proxying and timeouts all live behind this seam.
//!
//! `ReqwestTransport` is the production implementation. Tests can swap in any
//! other implementation through `Arc<dyn Transport>`.

pub mod http;

pub use http::ReqwestTransport;
pub use reqwest::Method;
pub use reqwest::header;
pub use reqwest::multipart::Form;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;

/// Whether ambient credentials (cookies) ride along with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialsMode {
    Omit,
    Include,
}

impl CredentialsMode {
    pub fn label(&self) -> &'static str {
        match self {
            CredentialsMode::Omit => "omit",
            CredentialsMode::Include => "include",
        }
    }
}

/// Encoded request payload.
///
/// `Bytes` is sent as-is with whatever Content-Type the caller set.
/// `Multipart` is handed to the HTTP stack, which sets its own boundary header.
#[derive(Debug)]
pub enum TransportBody {
    Bytes(Bytes),
    Multipart(Form),
}

/// A single outbound request.
#[derive(Debug)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<TransportBody>,
    pub credentials: CredentialsMode,
}

/// A fully-read response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    /// Raw Content-Type header, if present and valid ASCII.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Whether the server labelled the body as JSON.
    pub fn is_json(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.contains("application/json"))
    }

    /// Body as UTF-8 text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON regardless of the Content-Type header.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::Body(format!("invalid JSON body: {e}")))
    }
}

/// Errors from the transport layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("reading response body failed: {0}")]
    Body(String),

    #[error("transport setup failed: {0}")]
    Setup(String),
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Request/response primitive used by the client.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Transport>`).
/// Implementations perform exactly one network exchange per call and never retry.
pub trait Transport: Send + Sync {
    fn execute(
        &self,
        request: TransportRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{CONTENT_TYPE, HeaderValue};

    fn response(content_type: Option<&'static str>, body: &'static str) -> TransportResponse {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
        }
        TransportResponse {
            status: 200,
            headers,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn json_content_type_detection() {
        assert!(response(Some("application/json; charset=utf-8"), "{}").is_json());
        assert!(response(Some("application/json"), "{}").is_json());
        assert!(!response(Some("text/html"), "<html>").is_json());
        assert!(!response(None, "{}").is_json());
    }

    #[test]
    fn json_decodes_body() {
        let r = response(Some("application/json"), r#"{"Message":"nope"}"#);
        let value: serde_json::Value = r.json().unwrap();
        assert_eq!(value["Message"], "nope");
    }

    #[test]
    fn json_reports_invalid_body() {
        let r = response(Some("application/json"), "not json");
        let err = r.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, Error::Body(_)), "got: {err:?}");
    }

    #[test]
    fn credentials_labels() {
        assert_eq!(CredentialsMode::Omit.label(), "omit");
        assert_eq!(CredentialsMode::Include.label(), "include");
    }
}
