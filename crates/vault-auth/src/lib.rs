//! Identity token handling for the vault API client
//!
//! Provides the identity-endpoint wire models, access-token claim decoding,
//! form encoding for the `/connect/token` grants, and token persistence behind
//! the `TokenStore` trait. This crate performs no network I/O: the API client
//! owns the exchanges and uses this crate to build and interpret them.
//!
//! Token flow:
//! 1. Caller logs in with a `TokenRequest` (password grant)
//! 2. Tokens persisted via `TokenStore::set_tokens()`
//! 3. Before each authenticated call, `TokenStore::needs_refresh()` is checked
//! 4. Refresh grant built with `refresh_form()` using the `client_id` claim
//!    recovered by `decode_access_token()`
//! 5. New tokens persisted via `TokenStore::set_tokens()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod store;
pub mod token;

pub use constants::*;
pub use credentials::FileTokenStore;
pub use error::{Error, Result};
pub use store::{MemoryTokenStore, TokenState, TokenStore};
pub use token::{
    DecodedAccessToken, DeviceInfo, IdentityTokenResponse, IdentityTwoFactorResponse,
    TokenRequest, TwoFactorProviderType, decode_access_token, encode_form, refresh_form,
};
