//! Request dispatcher and token lifecycle entry points
//!
//! `ApiClient` is cheap to clone and safe to share across tasks. All clones
//! share the endpoint configuration, the token store and the single pending
//! refresh slot.

use std::sync::Arc;

use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use transport::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use transport::{CredentialsMode, Method, Transport, TransportBody, TransportRequest};
use vault_auth::{
    IdentityTokenResponse, IdentityTwoFactorResponse, TokenRequest, TokenStore, encode_form,
};

use crate::classify::{ClassifiedResult, Failure, ResponseClassifier, classify_identity_token_response};
use crate::device::{DeviceType, credentials_mode};
use crate::endpoint::{EndpointConfig, EnvironmentUrls};
use crate::error::{Error, Result};
use crate::logout::LogoutHandler;
use crate::refresh::{SingleFlight, exchange_refresh_token};
use crate::request::{FORM_CONTENT_TYPE, OutgoingRequest, RequestBody};

pub(crate) const DEVICE_TYPE: HeaderName = HeaderName::from_static("device-type");

/// Collaborators shared by the dispatcher and the refresh exchange.
#[derive(Clone)]
pub(crate) struct Context {
    pub(crate) device: DeviceType,
    pub(crate) store: Arc<dyn TokenStore>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) classifier: ResponseClassifier,
}

struct Inner {
    endpoints: RwLock<Arc<EndpointConfig>>,
    ctx: Context,
    refresh: SingleFlight<Result<IdentityTokenResponse>>,
}

/// Result of a password grant.
#[derive(Debug, Clone)]
pub enum IdentityOutcome {
    Token(IdentityTokenResponse),
    TwoFactor(IdentityTwoFactorResponse),
}

#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    pub fn new(
        urls: &EnvironmentUrls,
        device: DeviceType,
        store: Arc<dyn TokenStore>,
        transport: Arc<dyn Transport>,
        logout: Arc<dyn LogoutHandler>,
    ) -> Self {
        let endpoints = EndpointConfig::from_urls(urls);
        debug!(
            api = %endpoints.api_base_url,
            identity = %endpoints.identity_base_url,
            device = device.label(),
            "api client configured"
        );
        Self {
            inner: Arc::new(Inner {
                endpoints: RwLock::new(Arc::new(endpoints)),
                ctx: Context {
                    device,
                    store,
                    transport,
                    classifier: ResponseClassifier::new(logout),
                },
                refresh: SingleFlight::new(),
            }),
        }
    }

    /// Point the client at a different environment. Requests already in
    /// flight keep the configuration they started with.
    pub async fn set_urls(&self, urls: &EnvironmentUrls) {
        let endpoints = EndpointConfig::from_urls(urls);
        debug!(
            api = %endpoints.api_base_url,
            identity = %endpoints.identity_base_url,
            "api client reconfigured"
        );
        *self.inner.endpoints.write().await = Arc::new(endpoints);
    }

    pub async fn endpoints(&self) -> Arc<EndpointConfig> {
        self.inner.endpoints.read().await.clone()
    }

    pub fn device(&self) -> DeviceType {
        self.inner.ctx.device
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.inner.ctx.store
    }

    pub async fn credentials_mode(&self) -> CredentialsMode {
        credentials_mode(self.device(), self.endpoints().await.uses_single_base)
    }

    /// Issue one resource API call.
    ///
    /// Returns `Some(json)` for a 200 when a body was expected, `None` for a
    /// 200 otherwise. Any other status goes through the classifier.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        requires_auth: bool,
        expects_response: bool,
    ) -> Result<Option<Value>> {
        self.execute(OutgoingRequest {
            method,
            path: path.to_string(),
            body,
            requires_auth,
            expects_response,
        })
        .await
    }

    /// Issue a call and decode the JSON payload into `T`.
    pub async fn send_decoded<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        requires_auth: bool,
    ) -> Result<T> {
        let value = self
            .send(method, path, body, requires_auth, true)
            .await?
            .ok_or_else(|| Error::Decode(format!("{path}: empty response body")))?;
        serde_json::from_value(value).map_err(|e| Error::Decode(format!("{path}: {e}")))
    }

    pub async fn execute(&self, request: OutgoingRequest) -> Result<Option<Value>> {
        let ctx = &self.inner.ctx;
        let endpoints = self.endpoints().await;

        let mut headers = HeaderMap::new();
        headers.insert(DEVICE_TYPE, HeaderValue::from_static(ctx.device.label()));

        if request.requires_auth {
            let bearer = self.auth_header().await?;
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&bearer)
                    .map_err(|e| Error::Encode(format!("invalid authorization value: {e}")))?,
            );
        }

        let body = request.body.into_transport(&mut headers)?;

        if request.expects_response {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        }

        let method = request.method;
        let response = ctx
            .transport
            .execute(TransportRequest {
                method: method.clone(),
                url: endpoints.api_url(&request.path),
                headers,
                body,
                credentials: credentials_mode(ctx.device, endpoints.uses_single_base),
            })
            .await?;

        crate::metrics::record_request(method.as_str(), response.status);
        debug!(%method, path = %request.path, status = response.status, "api call completed");

        if response.status != 200 {
            return Err(ctx.classifier.handle_error(&response, false).await);
        }

        if !request.expects_response {
            return Ok(None);
        }

        response
            .json::<Value>()
            .map(Some)
            .map_err(|e| Error::Decode(format!("{}: {e}", request.path)))
    }

    /// `Authorization` header value for the current session.
    ///
    /// Staleness is checked before the token is read. Tokens only move
    /// forward, so a token read after a passing check is at least as fresh as
    /// the one the check saw. A stale token is renewed first; callers that
    /// lose the race to a refresh that already finished reuse its result
    /// instead of spending the refresh token again.
    pub async fn auth_header(&self) -> Result<String> {
        let ctx = &self.inner.ctx;

        if ctx.store.needs_refresh().await {
            let refresh_ctx = ctx.clone();
            let endpoints = self.endpoints().await;
            let renewed = self
                .inner
                .refresh
                .run_unless(
                    async { !ctx.store.needs_refresh().await },
                    move || exchange_refresh_token(refresh_ctx, endpoints).boxed(),
                )
                .await;
            if let Some(tokens) = renewed {
                return Ok(format!("Bearer {}", tokens?.access_token));
            }
        }

        let access = ctx
            .store
            .access_token()
            .await
            .ok_or_else(|| Error::TokenDecode("no access token stored".into()))?;
        Ok(format!("Bearer {access}"))
    }

    /// Exchange the refresh token for a new pair and persist it.
    ///
    /// Concurrent callers share one exchange. After a forced logout the
    /// error is `Error::LoggedOut`; it is returned, not swallowed.
    pub async fn refresh_tokens(&self) -> Result<IdentityTokenResponse> {
        let ctx = self.inner.ctx.clone();
        let endpoints = self.endpoints().await;
        self.inner
            .refresh
            .run(move || exchange_refresh_token(ctx, endpoints).boxed())
            .await
    }

    /// Password grant against the identity endpoint.
    ///
    /// A two-factor challenge clears any remember token stored for the
    /// e-mail, since the server just declined it.
    pub async fn post_identity_token(&self, request: &TokenRequest) -> Result<IdentityOutcome> {
        let ctx = &self.inner.ctx;
        let endpoints = self.endpoints().await;
        let body = encode_form(&request.to_identity_form(ctx.device.identity_client_id()));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(DEVICE_TYPE, HeaderValue::from_static(ctx.device.label()));

        let response = ctx
            .transport
            .execute(TransportRequest {
                method: Method::POST,
                url: endpoints.token_url(),
                headers,
                body: Some(TransportBody::Bytes(body.into())),
                credentials: credentials_mode(ctx.device, endpoints.uses_single_base),
            })
            .await?;

        match classify_identity_token_response(&response) {
            ClassifiedResult::Success(Some(json)) => serde_json::from_value(json)
                .map(IdentityOutcome::Token)
                .map_err(|e| Error::Decode(format!("token response: {e}"))),
            ClassifiedResult::Success(None) => {
                Err(Error::Decode("token response: empty body".into()))
            }
            ClassifiedResult::TwoFactorChallenge(challenge) => {
                debug!(providers = ?challenge.providers(), "second factor required");
                ctx.store.clear_two_factor_token(&request.email).await?;
                Ok(IdentityOutcome::TwoFactor(challenge))
            }
            ClassifiedResult::Failure(Failure::Api(error)) => Err(Error::Api(Box::new(error))),
            ClassifiedResult::Failure(Failure::AuthenticationFailure) => Err(Error::LoggedOut),
        }
    }
}
