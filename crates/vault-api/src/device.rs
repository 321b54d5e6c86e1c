//! Client device classification
//!
//! The device kind is sent on every request and decides two things: which
//! identity `client_id` a password grant uses, and whether ambient cookies are
//! included. Only the hosted web vault talking to its own origin leaves them out.

use serde::Deserialize;
use transport::CredentialsMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Chrome,
    Firefox,
    Opera,
    Edge,
    Vivaldi,
    Safari,
    Web,
    Windows,
    #[serde(rename = "macos")]
    MacOs,
    Linux,
    Cli,
}

impl DeviceType {
    /// Value of the `Device-Type` header.
    pub fn label(&self) -> &'static str {
        match self {
            DeviceType::Chrome => "chrome",
            DeviceType::Firefox => "firefox",
            DeviceType::Opera => "opera",
            DeviceType::Edge => "edge",
            DeviceType::Vivaldi => "vivaldi",
            DeviceType::Safari => "safari",
            DeviceType::Web => "web",
            DeviceType::Windows => "windows",
            DeviceType::MacOs => "macos",
            DeviceType::Linux => "linux",
            DeviceType::Cli => "cli",
        }
    }

    /// Browser-hosted web vault.
    pub fn is_web(&self) -> bool {
        matches!(self, DeviceType::Web)
    }

    /// Native desktop application.
    pub fn is_desktop(&self) -> bool {
        matches!(
            self,
            DeviceType::Windows | DeviceType::MacOs | DeviceType::Linux
        )
    }

    pub fn is_browser_extension(&self) -> bool {
        matches!(
            self,
            DeviceType::Chrome
                | DeviceType::Firefox
                | DeviceType::Opera
                | DeviceType::Edge
                | DeviceType::Vivaldi
                | DeviceType::Safari
        )
    }

    /// OAuth client id registered with the identity server for this kind of device.
    pub fn identity_client_id(&self) -> &'static str {
        if self.is_web() {
            "web"
        } else if self.is_desktop() {
            "desktop"
        } else if self.is_browser_extension() {
            "browser"
        } else {
            "cli"
        }
    }
}

impl std::str::FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "chrome" => DeviceType::Chrome,
            "firefox" => DeviceType::Firefox,
            "opera" => DeviceType::Opera,
            "edge" => DeviceType::Edge,
            "vivaldi" => DeviceType::Vivaldi,
            "safari" => DeviceType::Safari,
            "web" => DeviceType::Web,
            "windows" => DeviceType::Windows,
            "macos" => DeviceType::MacOs,
            "linux" => DeviceType::Linux,
            "cli" => DeviceType::Cli,
            other => return Err(format!("unknown device type: {other}")),
        })
    }
}

/// Credentials policy for a request.
///
/// Anything other than the web vault includes credentials, and so does the
/// web vault once it is pointed at a custom base URL.
pub fn credentials_mode(device: DeviceType, uses_single_base: bool) -> CredentialsMode {
    if !device.is_web() || uses_single_base {
        CredentialsMode::Include
    } else {
        CredentialsMode::Omit
    }
}
