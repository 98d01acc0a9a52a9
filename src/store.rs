//! Persisted browser session state
//!
//! One JSON artifact per integration (marketplace, payment platform)
//! holding the cookie jar plus whatever storage fields a previous tool
//! wrote. Cookies round-trip losslessly; every other field is carried
//! through opaquely so the artifact stays compatible with the
//! Playwright `storage_state` files it originated from.
//!
//! Loading fails soft: a missing or malformed artifact yields an empty
//! state, never an error - losing a session just means logging in
//! again. Saving replaces the cookie list and preserves the rest, and
//! logs instead of raising on disk failures.

use std::path::{Path, PathBuf};

use chromiumoxide::cdp::browser_protocol::network::{
    Cookie, CookieParam, CookieSameSite, TimeSinceEpoch,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;

/// One cookie in the persisted artifact (Playwright storage_state shape)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Seconds since epoch; -1 marks a session cookie
    #[serde(default = "default_expires")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default = "default_secure")]
    pub secure: bool,
    #[serde(default = "default_same_site")]
    pub same_site: String,
}

fn default_path() -> String {
    "/".to_string()
}

fn default_expires() -> f64 {
    -1.0
}

fn default_secure() -> bool {
    true
}

fn default_same_site() -> String {
    "Lax".to_string()
}

impl PersistedCookie {
    /// Minimal cookie (name/value pair on a domain)
    pub fn new(name: &str, value: &str, domain: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            domain: domain.to_string(),
            path: default_path(),
            expires: default_expires(),
            http_only: false,
            secure: default_secure(),
            same_site: default_same_site(),
        }
    }

    /// Capture a CDP cookie
    pub fn from_cdp(cookie: &Cookie) -> Self {
        let same_site = match cookie.same_site {
            Some(CookieSameSite::Strict) => "Strict",
            Some(CookieSameSite::None) => "None",
            _ => "Lax",
        };

        Self {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            expires: cookie.expires,
            http_only: cookie.http_only,
            secure: cookie.secure,
            same_site: same_site.to_string(),
        }
    }

    /// Build the CDP parameter to re-install this cookie.
    /// Returns None when the cookie cannot be expressed (no domain).
    pub fn to_cookie_param(&self) -> Option<CookieParam> {
        if self.domain.is_empty() {
            return None;
        }

        let same_site = match self.same_site.as_str() {
            "Strict" => CookieSameSite::Strict,
            "None" => CookieSameSite::None,
            _ => CookieSameSite::Lax,
        };

        let mut builder = CookieParam::builder()
            .name(self.name.clone())
            .value(self.value.clone())
            .domain(self.domain.clone())
            .path(self.path.clone())
            .secure(self.secure)
            .http_only(self.http_only)
            .same_site(same_site);

        if self.expires > 0.0 {
            builder = builder.expires(TimeSinceEpoch::new(self.expires));
        }

        builder.build().ok()
    }
}

/// The on-disk session artifact
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(default)]
    pub cookies: Vec<PersistedCookie>,
    /// Everything else in the artifact (localStorage origins etc.) -
    /// passed through untouched
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl PersistedSession {
    /// Whether the artifact carries any cookies worth restoring
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// CDP parameters for every restorable cookie
    pub fn cookie_params(&self) -> Vec<CookieParam> {
        self.cookies
            .iter()
            .filter_map(PersistedCookie::to_cookie_param)
            .collect()
    }
}

/// Loads and saves one session artifact
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store backed by an explicit file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the app config directory, falling back to the
    /// working directory when no config dir exists
    pub fn at_default(file_name: &str) -> Self {
        let path = crate::app_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(file_name);
        Self { path }
    }

    /// Artifact location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the artifact. Missing or malformed files yield an empty
    /// state - re-login recovers either case.
    pub fn load(&self) -> PersistedSession {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => {
                    debug!("Loaded session state from {:?}", self.path);
                    state
                }
                Err(e) => {
                    warn!("Malformed session state at {:?}: {}", self.path, e);
                    PersistedSession::default()
                }
            },
            Err(_) => PersistedSession::default(),
        }
    }

    /// Overwrite the cookie list, preserving every other field already
    /// in the artifact. Disk failures are logged, not raised - a lost
    /// session is recoverable by logging in again.
    pub fn save(&self, cookies: Vec<PersistedCookie>) {
        let mut state = self.load();
        state.cookies = cookies;

        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("Failed to create session state directory: {}", e);
                return;
            }
        }

        match serde_json::to_string_pretty(&state) {
            Ok(content) => {
                if let Err(e) = std::fs::write(&self.path, content) {
                    warn!("Failed to save session state to {:?}: {}", self.path, e);
                } else {
                    info!(
                        "Session state saved to {:?} ({} cookies)",
                        self.path,
                        state.cookies.len()
                    );
                }
            }
            Err(e) => warn!("Failed to serialize session state: {}", e),
        }
    }

    /// Snapshot the session's cookies into the artifact
    pub async fn save_from_session(&self, session: &BrowserSession) {
        match session.get_cookies().await {
            Ok(cookies) => {
                let persisted: Vec<PersistedCookie> =
                    cookies.iter().map(PersistedCookie::from_cdp).collect();
                self.save(persisted);
            }
            Err(e) => warn!("Could not read cookies for session save: {}", e),
        }
    }

    /// Install the persisted cookies into a session. Returns how many
    /// cookies were restored (0 when the artifact is empty).
    pub async fn restore_into_session(&self, session: &BrowserSession) -> usize {
        let state = self.load();
        if state.is_empty() {
            return 0;
        }

        let params = state.cookie_params();
        let count = params.len();
        if let Err(e) = session.set_cookies(params).await {
            warn!("Could not restore cookies into session: {}", e);
            return 0;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_artifact_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("does-not-exist.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn load_malformed_artifact_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(SessionStore::new(path).load().is_empty());
    }

    #[test]
    fn cookies_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("state.json"));

        let cookies = vec![
            PersistedCookie::new("a", "1", ".example.com"),
            PersistedCookie::new("b", "2", ".example.com"),
        ];
        store.save(cookies.clone());

        let loaded = store.load();
        assert_eq!(loaded.cookies, cookies);
    }

    #[test]
    fn save_preserves_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"cookies": [{"name": "old", "value": "x"}], "origins": [{"origin": "https://example.com"}]}"#,
        )
        .unwrap();

        let store = SessionStore::new(&path);
        store.save(vec![PersistedCookie::new("fresh", "y", ".example.com")]);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["cookies"][0]["name"], "fresh");
        assert_eq!(raw["origins"][0]["origin"], "https://example.com");
    }

    #[test]
    fn session_cookie_has_no_expiry_param() {
        let cookie = PersistedCookie::new("sid", "abc", ".example.com");
        let param = cookie.to_cookie_param().unwrap();
        assert!(param.expires.is_none());
        assert_eq!(param.name, "sid");
    }

    #[test]
    fn cookie_without_domain_is_skipped() {
        let cookie = PersistedCookie::new("sid", "abc", "");
        assert!(cookie.to_cookie_param().is_none());
    }
}
