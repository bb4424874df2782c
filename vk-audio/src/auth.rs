//! Session management: persists the web cookies and user id to disk.
//!
//! The session file is stored at `~/.config/vk-audio/session.json` and
//! contains:
//!
//! ```json
//! { "user_id": 1234567, "cookies": { "remixsid": "1_AbCd..." } }
//! ```
//!
//! `remixsid` is the cookie VK sets after a browser login. It can be copied
//! from developer tools → Application → Cookies on `vk.com`. The ajax
//! endpoints need it; `user_id` is needed to decode obfuscated track URLs.

use crate::error::{Result, VkAudioError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// Cookies VK expects before the first audio request. Without
/// `remixaudio_show_alert_today` the first ajax call fails, and
/// `remixmdevice` makes the mobile site render audio attached to posts.
pub const DEFAULT_COOKIES: &[(&str, &str)] = &[
    ("remixaudio_show_alert_today", "0"),
    ("remixmdevice", "1920/1080/2/!!-!!!!"),
];

/// Persistent login session backed by a JSON file on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Session {
    /// ID of the logged-in account.
    pub user_id: Option<i64>,
    /// Extra cookies sent with every request (`remixsid`, ...).
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
}

impl Session {
    /// Session for `user_id` authenticated by a `remixsid` cookie.
    pub fn new(user_id: i64, remixsid: impl Into<String>) -> Self {
        let mut cookies = BTreeMap::new();
        cookies.insert("remixsid".to_owned(), remixsid.into());
        Self {
            user_id: Some(user_id),
            cookies,
        }
    }

    /// Load session from `~/.config/vk-audio/session.json`.
    ///
    /// Returns a default (empty) session if the file does not exist.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Save session to disk, creating parent directories if needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(&path, data)?;
        Ok(())
    }

    /// Delete the session file from disk.
    pub fn clear() -> Result<()> {
        let path = Self::path()?;
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Check whether a user id is present (does not validate the cookies).
    pub fn is_logged_in(&self) -> bool {
        self.user_id.is_some()
    }

    /// All cookies to install: the defaults, overridden by the stored ones.
    pub fn cookie_pairs(&self) -> Vec<(String, String)> {
        let mut all: BTreeMap<String, String> = DEFAULT_COOKIES
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        all.extend(self.cookies.clone());
        all.into_iter().collect()
    }

    fn path() -> Result<PathBuf> {
        let config = dirs::config_dir()
            .ok_or_else(|| VkAudioError::Other("cannot determine config directory".into()))?;
        Ok(config.join("vk-audio").join("session.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_cookies_override_defaults() {
        let mut session = Session::new(42, "sid");
        session
            .cookies
            .insert("remixaudio_show_alert_today".into(), "1".into());
        let pairs = session.cookie_pairs();
        assert!(pairs.contains(&("remixsid".into(), "sid".into())));
        assert!(pairs.contains(&("remixaudio_show_alert_today".into(), "1".into())));
        assert!(pairs.contains(&("remixmdevice".into(), "1920/1080/2/!!-!!!!".into())));
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn session_json_shape() {
        let session: Session = serde_json::from_str(r#"{"user_id": 7}"#).unwrap();
        assert!(session.is_logged_in());
        assert!(session.cookies.is_empty());
        assert!(!Session::default().is_logged_in());
    }
}
