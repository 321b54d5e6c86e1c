//! Outgoing request model and body encoding

use bytes::Bytes;
use serde::Serialize;
use transport::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use transport::{Form, Method, TransportBody};

use crate::error::{Error, Result};

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Request payload as supplied by a call site.
#[derive(Debug, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Pre-encoded form string
    Text(String),
    /// Multipart upload; the transport picks the boundary and Content-Type
    Multipart(Form),
    Json(serde_json::Value),
}

impl RequestBody {
    /// Serialize any request model to a JSON body.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(RequestBody::Json)
            .map_err(|e| Error::Encode(format!("serializing request body: {e}")))
    }

    /// Form-encode key/value pairs into a text body.
    pub fn form(fields: &[(&str, String)]) -> Self {
        RequestBody::Text(vault_auth::encode_form(fields))
    }

    /// Encode for the transport, setting Content-Type where the body dictates one.
    pub(crate) fn into_transport(self, headers: &mut HeaderMap) -> Result<Option<TransportBody>> {
        match self {
            RequestBody::Empty => Ok(None),
            RequestBody::Text(text) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
                Ok(Some(TransportBody::Bytes(Bytes::from(text))))
            }
            RequestBody::Multipart(form) => Ok(Some(TransportBody::Multipart(form))),
            RequestBody::Json(value) => {
                let bytes = serde_json::to_vec(&value)
                    .map_err(|e| Error::Encode(format!("serializing request body: {e}")))?;
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
                Ok(Some(TransportBody::Bytes(Bytes::from(bytes))))
            }
        }
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<Form> for RequestBody {
    fn from(form: Form) -> Self {
        RequestBody::Multipart(form)
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        RequestBody::Json(value)
    }
}

/// One call against the resource API.
#[derive(Debug)]
pub struct OutgoingRequest {
    pub method: Method,
    /// Path relative to the API base, starting with `/`
    pub path: String,
    pub body: RequestBody,
    pub requires_auth: bool,
    pub expects_response: bool,
}

impl OutgoingRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::Empty,
            requires_auth: true,
            expects_response: false,
        }
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    pub fn expect_response(mut self) -> Self {
        self.expects_response = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(body: RequestBody) -> (HeaderMap, Option<TransportBody>) {
        let mut headers = HeaderMap::new();
        let encoded = body.into_transport(&mut headers).unwrap();
        (headers, encoded)
    }

    #[test]
    fn text_bodies_are_form_encoded() {
        let (headers, body) = encode(RequestBody::Text("a=1&b=2".into()));
        assert_eq!(headers[CONTENT_TYPE], FORM_CONTENT_TYPE);
        match body {
            Some(TransportBody::Bytes(bytes)) => assert_eq!(&bytes[..], b"a=1&b=2"),
            other => panic!("expected bytes body, got {other:?}"),
        }
    }

    #[test]
    fn json_bodies_are_serialized() {
        let (headers, body) = encode(RequestBody::Json(serde_json::json!({"name": "Work"})));
        assert_eq!(headers[CONTENT_TYPE], JSON_CONTENT_TYPE);
        match body {
            Some(TransportBody::Bytes(bytes)) => assert_eq!(&bytes[..], br#"{"name":"Work"}"#),
            other => panic!("expected bytes body, got {other:?}"),
        }
    }

    #[test]
    fn multipart_leaves_content_type_to_transport() {
        let (headers, body) = encode(RequestBody::Multipart(Form::new().text("license", "{}")));
        assert!(headers.get(CONTENT_TYPE).is_none());
        assert!(matches!(body, Some(TransportBody::Multipart(_))));
    }

    #[test]
    fn empty_body_sets_nothing() {
        let (headers, body) = encode(RequestBody::Empty);
        assert!(headers.is_empty());
        assert!(body.is_none());
    }

    #[test]
    fn json_helper_serializes_models() {
        #[derive(Serialize)]
        struct FolderRequest {
            name: String,
        }
        let body = RequestBody::json(&FolderRequest {
            name: "Personal".into(),
        })
        .unwrap();
        match body {
            RequestBody::Json(v) => assert_eq!(v["name"], "Personal"),
            other => panic!("expected json body, got {other:?}"),
        }
    }

    #[test]
    fn form_helper_percent_encodes() {
        match RequestBody::form(&[("email", "a+b@x.test".to_string())]) {
            RequestBody::Text(t) => assert_eq!(t, "email=a%2Bb%40x.test"),
            other => panic!("expected text body, got {other:?}"),
        }
    }

    #[test]
    fn builder_defaults() {
        let request = OutgoingRequest::new(Method::GET, "/sync");
        assert!(request.requires_auth);
        assert!(!request.expects_response);

        let request = OutgoingRequest::new(Method::POST, "/accounts/password-hint")
            .anonymous()
            .expect_response();
        assert!(!request.requires_auth);
        assert!(request.expects_response);
    }
}
