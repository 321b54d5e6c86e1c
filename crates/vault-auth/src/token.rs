//! Identity endpoint wire models and access token decoding
//!
//! Both grants (`password` and `refresh_token`) POST a form-encoded body to
//! `TOKEN_PATH` on the identity host. A 200 carries an `IdentityTokenResponse`;
//! a 400 carrying a non-empty `TwoFactorProviders2` map is a two-factor
//! challenge rather than a failure.
//!
//! Access tokens are JWTs. The client never verifies signatures; it only reads
//! the payload to recover `client_id` for the refresh grant and `exp` for the
//! staleness check.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::constants::IDENTITY_SCOPE;
use crate::error::{Error, Result};

/// Successful response from the token endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(rename = "PrivateKey", default)]
    pub private_key: Option<String>,
    #[serde(rename = "Key", default)]
    pub key: Option<String>,
    /// Remember-me token, present when the login asked to remember the second factor
    #[serde(rename = "TwoFactorToken", default)]
    pub two_factor_token: Option<String>,
}

/// Second-factor providers understood by the identity server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TwoFactorProviderType {
    Authenticator,
    Email,
    Duo,
    Yubikey,
    U2f,
    Remember,
    OrganizationDuo,
}

impl TwoFactorProviderType {
    /// Numeric wire identifier.
    pub fn id(&self) -> u8 {
        match self {
            TwoFactorProviderType::Authenticator => 0,
            TwoFactorProviderType::Email => 1,
            TwoFactorProviderType::Duo => 2,
            TwoFactorProviderType::Yubikey => 3,
            TwoFactorProviderType::U2f => 4,
            TwoFactorProviderType::Remember => 5,
            TwoFactorProviderType::OrganizationDuo => 6,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0 => TwoFactorProviderType::Authenticator,
            1 => TwoFactorProviderType::Email,
            2 => TwoFactorProviderType::Duo,
            3 => TwoFactorProviderType::Yubikey,
            4 => TwoFactorProviderType::U2f,
            5 => TwoFactorProviderType::Remember,
            6 => TwoFactorProviderType::OrganizationDuo,
            _ => return None,
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            TwoFactorProviderType::Authenticator => "authenticator",
            TwoFactorProviderType::Email => "email",
            TwoFactorProviderType::Duo => "duo",
            TwoFactorProviderType::Yubikey => "yubikey",
            TwoFactorProviderType::U2f => "u2f",
            TwoFactorProviderType::Remember => "remember",
            TwoFactorProviderType::OrganizationDuo => "organization_duo",
        }
    }
}

/// Two-factor challenge returned by the token endpoint with status 400.
///
/// `two_factor_providers2` maps the provider id (as a string) to
/// provider-specific parameters, e.g. the masked e-mail address or the Duo host.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IdentityTwoFactorResponse {
    #[serde(rename = "TwoFactorProviders", default)]
    pub two_factor_providers: Vec<u8>,
    #[serde(rename = "TwoFactorProviders2", default)]
    pub two_factor_providers2: HashMap<String, serde_json::Value>,
}

impl IdentityTwoFactorResponse {
    /// Whether the challenge names at least one provider.
    pub fn has_providers(&self) -> bool {
        !self.two_factor_providers2.is_empty()
    }

    /// Providers offered by the server, sorted by id. Unknown ids are skipped.
    pub fn providers(&self) -> Vec<TwoFactorProviderType> {
        let mut providers: Vec<_> = self
            .two_factor_providers2
            .keys()
            .filter_map(|k| k.parse::<u8>().ok())
            .filter_map(TwoFactorProviderType::from_id)
            .collect();
        providers.sort();
        providers
    }

    /// Parameters for one provider, if offered.
    pub fn params(&self, provider: TwoFactorProviderType) -> Option<&serde_json::Value> {
        self.two_factor_providers2.get(&provider.id().to_string())
    }
}

/// Claims read from an access token payload.
#[derive(Debug, Clone, Deserialize)]
pub struct DecodedAccessToken {
    pub client_id: String,
    /// Expiry as unix seconds
    #[serde(default)]
    pub exp: Option<u64>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub premium: Option<bool>,
}

impl DecodedAccessToken {
    /// Whether the token expires within `window_secs` of `now_secs`.
    ///
    /// A token without an `exp` claim is always treated as expiring.
    pub fn expires_within(&self, now_secs: u64, window_secs: u64) -> bool {
        match self.exp {
            Some(exp) => exp < now_secs.saturating_add(window_secs),
            None => true,
        }
    }
}

/// Decode the payload segment of a JWT access token.
pub fn decode_access_token(token: &str) -> Result<DecodedAccessToken> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::TokenDecode("token must have three segments".into()));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::TokenDecode(format!("payload is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::TokenDecode(format!("payload is not valid claims JSON: {e}")))
}

/// Device fields sent with a password grant.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub device_type: String,
    pub identifier: String,
    pub name: String,
}

/// Password grant request.
///
/// `master_password_hash` is the already-derived hash; key derivation happens
/// outside the client.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub email: String,
    pub master_password_hash: String,
    pub provider: Option<TwoFactorProviderType>,
    pub token: Option<String>,
    pub remember: bool,
    pub device: Option<DeviceInfo>,
}

impl TokenRequest {
    pub fn new(email: impl Into<String>, master_password_hash: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            master_password_hash: master_password_hash.into(),
            provider: None,
            token: None,
            remember: false,
            device: None,
        }
    }

    /// Attach a second-factor answer.
    pub fn with_two_factor(
        mut self,
        provider: TwoFactorProviderType,
        token: impl Into<String>,
        remember: bool,
    ) -> Self {
        self.provider = Some(provider);
        self.token = Some(token.into());
        self.remember = remember;
        self
    }

    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = Some(device);
        self
    }

    /// Form fields for the `password` grant.
    pub fn to_identity_form(&self, client_id: &str) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("grant_type", "password".to_string()),
            ("username", self.email.clone()),
            ("password", self.master_password_hash.clone()),
            ("scope", IDENTITY_SCOPE.to_string()),
            ("client_id", client_id.to_string()),
        ];

        if let Some(device) = &self.device {
            fields.push(("deviceType", device.device_type.clone()));
            fields.push(("deviceIdentifier", device.identifier.clone()));
            fields.push(("deviceName", device.name.clone()));
        }

        if let (Some(token), Some(provider)) = (&self.token, self.provider) {
            fields.push(("twoFactorToken", token.clone()));
            fields.push(("twoFactorProvider", provider.id().to_string()));
            fields.push((
                "twoFactorRemember",
                if self.remember { "1" } else { "0" }.to_string(),
            ));
        }

        fields
    }
}

/// Form fields for the `refresh_token` grant.
pub fn refresh_form(client_id: &str, refresh_token: &str) -> Vec<(&'static str, String)> {
    vec![
        ("grant_type", "refresh_token".to_string()),
        ("client_id", client_id.to_string()),
        ("refresh_token", refresh_token.to_string()),
    ]
}

/// Percent-encode fields as `application/x-www-form-urlencoded`.
pub fn encode_form(fields: &[(&str, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields.iter().map(|(k, v)| (*k, v.as_str())))
        .finish()
}
