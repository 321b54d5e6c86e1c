//! Resource endpoints
//!
//! Each method is a single dispatcher call. Payloads are returned as raw JSON
//! where the resource layout is owned by the caller.

use serde::Serialize;
use serde_json::Value;
use transport::{Form, Method};

use crate::client::ApiClient;
use crate::error::Result;
use crate::request::RequestBody;

#[derive(Debug, Clone, Serialize)]
pub struct PasswordHintRequest {
    pub email: String,
}

impl ApiClient {
    pub async fn get_profile(&self) -> Result<Value> {
        self.send_decoded(Method::GET, "/accounts/profile", RequestBody::Empty, true)
            .await
    }

    /// Last vault revision as unix milliseconds.
    pub async fn get_account_revision_date(&self) -> Result<i64> {
        self.send_decoded(
            Method::GET,
            "/accounts/revision-date",
            RequestBody::Empty,
            true,
        )
        .await
    }

    /// Full vault sync. Web and desktop clients skip the equivalent-domains table.
    pub async fn get_sync(&self) -> Result<Value> {
        let device = self.device();
        let path = if device.is_web() || device.is_desktop() {
            "/sync?excludeDomains=true"
        } else {
            "/sync"
        };
        self.send_decoded(Method::GET, path, RequestBody::Empty, true)
            .await
    }

    pub async fn delete_folder(&self, id: &str) -> Result<()> {
        self.send(
            Method::DELETE,
            &format!("/folders/{id}"),
            RequestBody::Empty,
            true,
            false,
        )
        .await
        .map(|_| ())
    }

    /// Ask the server to e-mail the master password hint. Needs no session.
    pub async fn post_password_hint(&self, request: &PasswordHintRequest) -> Result<()> {
        self.send(
            Method::POST,
            "/accounts/password-hint",
            RequestBody::json(request)?,
            false,
            false,
        )
        .await
        .map(|_| ())
    }

    /// Upgrade to premium. `form` carries the license file or payment token.
    pub async fn post_premium(&self, form: Form) -> Result<()> {
        self.send(
            Method::POST,
            "/accounts/premium",
            RequestBody::Multipart(form),
            true,
            false,
        )
        .await
        .map(|_| ())
    }
}
