//! Authenticated client for the vault resource and identity APIs
//!
//! Every call goes through `ApiClient::send`: it attaches the device header,
//! a bearer token when the call is authenticated, encodes the body, and
//! classifies the response. The token lifecycle lives underneath:
//!
//! 1. `auth_header()` asks the `TokenStore` whether the access token is stale
//! 2. Stale tokens are exchanged at `/connect/token` by a single-flight refresh,
//!    so concurrent callers share one network exchange
//! 3. New tokens are persisted before any header is built from them
//! 4. 401/403 (or 400 from a refresh grant) fires the injected logout handler
//!    and surfaces `Error::LoggedOut`
//!
//! Endpoint methods in `endpoints` are thin call sites over `send`.

pub mod classify;
pub mod client;
pub mod device;
pub mod endpoint;
pub mod endpoints;
pub mod error;
pub mod logout;
pub mod metrics;
pub mod refresh;
pub mod request;

pub use classify::{ClassifiedResult, ErrorResponse, Failure, ResponseClassifier};
pub use client::{ApiClient, IdentityOutcome};
pub use device::{DeviceType, credentials_mode};
pub use endpoint::{EndpointConfig, EnvironmentUrls};
pub use endpoints::PasswordHintRequest;
pub use error::{Error, Result};
pub use logout::{LogoutEvent, LogoutHandler};
pub use refresh::SingleFlight;
pub use request::{OutgoingRequest, RequestBody};
