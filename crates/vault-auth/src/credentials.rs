//! File-backed token store
//!
//! Persists the session tokens and two-factor remember tokens as a JSON file.
//! All writes use atomic temp-file + rename to prevent corruption on crash. A
//! tokio Mutex serializes concurrent writes, so a refresh racing a logout
//! never interleaves partial state.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::store::{TokenState, TokenStore, identity_key};
use crate::token::DecodedAccessToken;

/// On-disk layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default)]
    two_factor_tokens: HashMap<String, String>,
}

impl From<TokenFile> for TokenState {
    fn from(file: TokenFile) -> Self {
        TokenState {
            access: file.access_token.map(Secret::new),
            refresh: file.refresh_token.map(Secret::new),
            two_factor: file
                .two_factor_tokens
                .into_iter()
                .map(|(k, v)| (k, Secret::new(v)))
                .collect(),
        }
    }
}

impl From<&TokenState> for TokenFile {
    fn from(state: &TokenState) -> Self {
        TokenFile {
            access_token: state.access.as_ref().map(|t| t.expose().clone()),
            refresh_token: state.refresh.as_ref().map(|t| t.expose().clone()),
            two_factor_tokens: state
                .two_factor
                .iter()
                .map(|(k, v)| (k.clone(), v.expose().clone()))
                .collect(),
        }
    }
}

/// Token store persisted to a JSON file.
///
/// Reads are served from memory; every mutation is written through to disk
/// before the lock is released.
pub struct FileTokenStore {
    path: PathBuf,
    state: Mutex<TokenState>,
}

impl FileTokenStore {
    /// Load tokens from the given file path.
    ///
    /// If the file doesn't exist, creates it empty (no session yet).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading token file: {e}")))?;
            let file: TokenFile = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing token file: {e}")))?;
            info!(
                path = %path.display(),
                has_session = file.access_token.is_some(),
                remembered = file.two_factor_tokens.len(),
                "loaded token file"
            );
            TokenState::from(file)
        } else {
            info!(path = %path.display(), "token file not found, starting without a session");
            let state = TokenState::default();
            write_atomic(&path, &state).await?;
            state
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remember a second factor for `identity` and persist.
    pub async fn set_two_factor_token(&self, identity: &str, token: String) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .two_factor
            .insert(identity_key(identity), Secret::new(token));
        write_atomic(&self.path, &state).await
    }

    pub async fn two_factor_token(&self, identity: &str) -> Option<String> {
        let state = self.state.lock().await;
        state
            .two_factor
            .get(&identity_key(identity))
            .map(|t| t.expose().clone())
    }

    /// Drop the session tokens and persist. Remember tokens survive a logout.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.access = None;
        state.refresh = None;
        debug!(path = %self.path.display(), "cleared session tokens");
        write_atomic(&self.path, &state).await
    }
}

impl TokenStore for FileTokenStore {
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            state.access.as_ref().map(|t| t.expose().clone())
        })
    }

    fn refresh_token(&self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            state.refresh.as_ref().map(|t| t.expose().clone())
        })
    }

    fn needs_refresh(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move { self.state.lock().await.needs_refresh() })
    }

    fn decode_access_token(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<DecodedAccessToken>> + Send + '_>> {
        Box::pin(async move { self.state.lock().await.decode() })
    }

    fn set_tokens(
        &self,
        access: String,
        refresh: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.access = Some(Secret::new(access));
            state.refresh = Some(Secret::new(refresh));
            debug!(path = %self.path.display(), "updated session tokens");
            write_atomic(&self.path, &state).await
        })
    }

    fn clear_two_factor_token<'a>(
        &'a self,
        identity: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.two_factor.remove(&identity_key(identity)).is_some() {
                debug!("cleared two-factor remember token");
                write_atomic(&self.path, &state).await?;
            }
            Ok(())
        })
    }
}

/// Write tokens to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains bearer and refresh tokens.
async fn write_atomic(path: &Path, state: &TokenState) -> Result<()> {
    let json = serde_json::to_string_pretty(&TokenFile::from(state))
        .map_err(|e| Error::CredentialParse(format!("serializing tokens: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".tokens.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token file: {e}")))?;

    debug!(path = %path.display(), "persisted tokens");
    Ok(())
}
