//! reqwest-backed transport
//!
//! Holds two clients built from the same settings: one with a cookie jar for
//! `CredentialsMode::Include`, one without for `CredentialsMode::Omit`. Both
//! pool connections independently.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::{
    CredentialsMode, Error, Result, Transport, TransportBody, TransportRequest, TransportResponse,
};

pub struct ReqwestTransport {
    with_cookies: reqwest::Client,
    without_cookies: reqwest::Client,
}

impl ReqwestTransport {
    /// Build both clients with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let with_cookies = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| Error::Setup(format!("building cookie client: {e}")))?;
        let without_cookies = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Setup(format!("building client: {e}")))?;
        Ok(Self {
            with_cookies,
            without_cookies,
        })
    }

    fn client_for(&self, mode: CredentialsMode) -> &reqwest::Client {
        match mode {
            CredentialsMode::Include => &self.with_cookies,
            CredentialsMode::Omit => &self.without_cookies,
        }
    }
}

impl Transport for ReqwestTransport {
    fn execute(
        &self,
        request: TransportRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse>> + Send + '_>> {
        Box::pin(async move {
            let TransportRequest {
                method,
                url,
                headers,
                body,
                credentials,
            } = request;

            debug!(%method, %url, credentials = credentials.label(), "sending request");

            let mut builder = self
                .client_for(credentials)
                .request(method, url.as_str())
                .headers(headers);
            builder = match body {
                Some(TransportBody::Bytes(bytes)) => builder.body(bytes),
                Some(TransportBody::Multipart(form)) => builder.multipart(form),
                None => builder,
            };

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("{url}: {e}"))
                } else {
                    Error::Request(format!("{url}: {e}"))
                }
            })?;

            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| Error::Body(format!("{url}: {e}")))?;

            debug!(%url, status, bytes = body.len(), "received response");
            Ok(TransportResponse {
                status,
                headers,
                body,
            })
        })
    }
}
