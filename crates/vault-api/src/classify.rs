//! Response classification
//!
//! Turns a raw transport response into one of a fixed set of outcomes instead
//! of poking at untyped payloads at each call site:
//!
//! - `Success`: 200 with the decoded JSON (if any)
//! - `TwoFactorChallenge`: identity 400 naming second-factor providers
//! - `Failure::AuthenticationFailure`: 401/403, or 400 on a refresh grant
//! - `Failure::Api`: everything else, with the server's error model
//!
//! Classification is pure. `ResponseClassifier` adds the side effect: an
//! authentication failure runs the logout handler exactly once and the caller
//! only sees `Error::LoggedOut`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use transport::TransportResponse;
use vault_auth::IdentityTwoFactorResponse;

use crate::error::Error;
use crate::logout::LogoutHandler;

/// Structured error body returned by the API.
///
/// Identity responses nest the model under `ErrorModel`; resource API
/// responses carry it at the top level.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub status: u16,
    pub message: Option<String>,
    pub validation_errors: BTreeMap<String, Vec<String>>,
    /// Whether the response came from a token grant
    pub token_error: bool,
    /// Raw JSON body, when the server sent one
    pub body: Option<Value>,
}

impl ErrorResponse {
    pub fn new(body: Option<Value>, status: u16, token_error: bool) -> Self {
        let model = body.as_ref().map(|b| {
            if token_error {
                b.get("ErrorModel").filter(|m| m.is_object()).unwrap_or(b)
            } else {
                b
            }
        });

        let message = model
            .and_then(|m| m.get("Message").or_else(|| m.get("message")))
            .and_then(Value::as_str)
            .or_else(|| {
                body.as_ref()
                    .and_then(|b| b.get("error_description"))
                    .and_then(Value::as_str)
            })
            .map(str::to_string);

        let validation_errors = model
            .and_then(|m| m.get("ValidationErrors").or_else(|| m.get("validationErrors")))
            .and_then(Value::as_object)
            .map(|errors| {
                errors
                    .iter()
                    .map(|(field, msgs)| {
                        let msgs = msgs
                            .as_array()
                            .map(|a| {
                                a.iter()
                                    .filter_map(Value::as_str)
                                    .map(str::to_string)
                                    .collect()
                            })
                            .unwrap_or_default();
                        (field.clone(), msgs)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            status,
            message,
            validation_errors,
            token_error,
            body,
        }
    }

    /// The most specific single message: the first validation error if any,
    /// otherwise the top-level message.
    pub fn single_message(&self) -> Option<&str> {
        self.validation_errors
            .values()
            .flat_map(|msgs| msgs.iter())
            .next()
            .map(String::as_str)
            .or(self.message.as_deref())
    }

    pub(crate) fn display_message(&self) -> &str {
        self.single_message().unwrap_or("unexpected server response")
    }
}

/// Non-success outcome of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    AuthenticationFailure,
    Api(ErrorResponse),
}

/// Outcome of a response after classification.
#[derive(Debug, Clone)]
pub enum ClassifiedResult {
    Success(Option<Value>),
    TwoFactorChallenge(IdentityTwoFactorResponse),
    Failure(Failure),
}

/// Whether a status ends the session.
pub fn is_authentication_failure(status: u16, token_error: bool) -> bool {
    (token_error && status == 400) || status == 401 || status == 403
}

/// Body as JSON, only when the server labelled it JSON.
fn json_body(response: &TransportResponse) -> Option<Value> {
    if !response.is_json() {
        if !response.body.is_empty() {
            debug!(status = response.status, body = %response.text(), "ignoring non-JSON body");
        }
        return None;
    }
    match response.json::<Value>() {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(status = response.status, error = %e, "JSON-labelled body did not parse");
            None
        }
    }
}

/// Classify a non-200 response.
pub fn classify_error(response: &TransportResponse, token_error: bool) -> Failure {
    if is_authentication_failure(response.status, token_error) {
        return Failure::AuthenticationFailure;
    }
    Failure::Api(ErrorResponse::new(
        json_body(response),
        response.status,
        token_error,
    ))
}

/// Classify a response from the identity token endpoint.
///
/// A 400 naming second-factor providers is a challenge, not a failure. Any
/// other non-200 is a hard error; a login attempt never forces a logout.
pub fn classify_identity_token_response(response: &TransportResponse) -> ClassifiedResult {
    let body = json_body(response);

    if let Some(json) = body.as_ref() {
        if response.status == 200 {
            return ClassifiedResult::Success(body);
        }
        if response.status == 400
            && let Ok(challenge) = serde_json::from_value::<IdentityTwoFactorResponse>(json.clone())
            && challenge.has_providers()
        {
            return ClassifiedResult::TwoFactorChallenge(challenge);
        }
    }

    ClassifiedResult::Failure(Failure::Api(ErrorResponse::new(
        body,
        response.status,
        true,
    )))
}

/// Applies the logout side effect of a classification.
#[derive(Clone)]
pub struct ResponseClassifier {
    logout: Arc<dyn LogoutHandler>,
}

impl ResponseClassifier {
    pub fn new(logout: Arc<dyn LogoutHandler>) -> Self {
        Self { logout }
    }

    /// Convert a non-200 response into the error returned to the caller.
    pub async fn handle_error(&self, response: &TransportResponse, token_error: bool) -> Error {
        match classify_error(response, token_error) {
            Failure::AuthenticationFailure => {
                warn!(
                    status = response.status,
                    token_error, "authentication rejected, forcing logout"
                );
                crate::metrics::record_forced_logout();
                self.logout.logout(true).await;
                Error::LoggedOut
            }
            Failure::Api(error) => {
                debug!(
                    status = error.status,
                    token_error,
                    message = error.display_message(),
                    "API error response"
                );
                Error::Api(Box::new(error))
            }
        }
    }
}
