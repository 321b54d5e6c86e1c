//! Token refresh with single-flight coordination
//!
//! Any authenticated call may find the access token stale. Without
//! coordination, N concurrent calls would each spend the same refresh token,
//! and the identity server rotates refresh tokens, so all but one would fail.
//! `SingleFlight` keeps one pending refresh per client: the first caller
//! starts it, later callers await the same shared future and observe the
//! same result, and the slot is cleared once it resolves.

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use transport::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use transport::{Method, TransportBody, TransportRequest};
use vault_auth::{IdentityTokenResponse, encode_form, refresh_form};

use crate::client::{Context, DEVICE_TYPE};
use crate::device::credentials_mode;
use crate::endpoint::EndpointConfig;
use crate::error::{Error, Result};
use crate::request::FORM_CONTENT_TYPE;

type Slot<T> = Arc<Mutex<Option<Shared<BoxFuture<'static, T>>>>>;

/// At most one in-flight execution; concurrent callers share its output.
pub struct SingleFlight<T: Clone> {
    slot: Slot<T>,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Join the pending operation, or start one with `start` if none is pending.
    pub async fn run<F>(&self, start: F) -> T
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let flight = {
            let mut slot = self.slot.lock().await;
            self.join_or_start(&mut slot, start)
        };
        flight.await
    }

    /// Like [`run`](Self::run), but when nothing is pending `skip` is awaited
    /// under the slot lock first. If it yields true no operation starts and
    /// `None` is returned.
    ///
    /// A previous flight clears the slot only after its work is done, so a
    /// `skip` check made here observes everything that flight persisted.
    pub async fn run_unless<S, F>(&self, skip: S, start: F) -> Option<T>
    where
        S: Future<Output = bool>,
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let flight = {
            let mut slot = self.slot.lock().await;
            if slot.is_none() && skip.await {
                debug!("operation no longer needed");
                return None;
            }
            self.join_or_start(&mut slot, start)
        };
        Some(flight.await)
    }

    fn join_or_start<F>(
        &self,
        slot: &mut Option<Shared<BoxFuture<'static, T>>>,
        start: F,
    ) -> Shared<BoxFuture<'static, T>>
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        if let Some(pending) = slot.as_ref() {
            debug!("joining in-flight operation");
            return pending.clone();
        }

        // The flight empties the slot itself once its work resolves, so a
        // caller dropped while waiting cannot leave a finished flight behind.
        let operation = start();
        let owner = Arc::downgrade(&self.slot);
        let pending = async move {
            let output = operation.await;
            if let Some(owner) = owner.upgrade() {
                owner.lock().await.take();
            }
            output
        }
        .boxed()
        .shared();
        *slot = Some(pending.clone());
        pending
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Exchange the stored refresh token for a new token pair and persist it.
///
/// Fails fast with `RefreshUnavailable` when there is no refresh token. The
/// `client_id` for the grant is read from the current access token's claims.
pub(crate) async fn exchange_refresh_token(
    ctx: Context,
    endpoints: Arc<EndpointConfig>,
) -> Result<IdentityTokenResponse> {
    let Some(refresh_token) = ctx.store.refresh_token().await.filter(|t| !t.is_empty()) else {
        warn!("refresh requested but no refresh token is stored");
        crate::metrics::record_refresh("unavailable");
        return Err(Error::RefreshUnavailable);
    };

    let claims = ctx.store.decode_access_token().await?;
    let body = encode_form(&refresh_form(&claims.client_id, &refresh_token));

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(DEVICE_TYPE, HeaderValue::from_static(ctx.device.label()));

    let url = endpoints.token_url();
    debug!(%url, client_id = %claims.client_id, "refreshing access token");

    let response = ctx
        .transport
        .execute(TransportRequest {
            method: Method::POST,
            url,
            headers,
            body: Some(TransportBody::Bytes(body.into())),
            credentials: credentials_mode(ctx.device, endpoints.uses_single_base),
        })
        .await?;

    if response.status != 200 {
        crate::metrics::record_refresh("failure");
        return Err(ctx.classifier.handle_error(&response, true).await);
    }

    let tokens: IdentityTokenResponse = response.json().map_err(|e| {
        crate::metrics::record_refresh("failure");
        Error::Decode(format!("token response: {e}"))
    })?;
    ctx.store
        .set_tokens(tokens.access_token.clone(), tokens.refresh_token.clone())
        .await?;

    crate::metrics::record_refresh("success");
    info!(expires_in = tokens.expires_in, "access token refreshed");
    Ok(tokens)
}
