//! Persistent session identity.
//!
//! The identifier lives in a small JSON map on disk so that restarting the
//! client resumes the same backend conversation.

use crate::error::SessionError;
use log::{debug, warn};
use parlor_config::{SessionConfig, default_config_dir};
use parlor_protocol::SessionId;
use rand::Rng;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File name used when no explicit session path is configured.
pub const DEFAULT_SESSION_FILE: &str = "session.json";

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

/// Reads and persists the session identifier.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    path: Option<PathBuf>,
    key: String,
}

impl SessionIdentity {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            key: key.into(),
        }
    }

    /// Identity without backing storage; every call yields a fresh id.
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            key: String::new(),
        }
    }

    /// Build from config, defaulting to `session.json` in the config dir.
    pub fn from_config(config: &SessionConfig) -> Self {
        let path = config
            .path
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| default_config_dir().map(|dir| dir.join(DEFAULT_SESSION_FILE)));
        Self {
            path,
            key: config.key.clone(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Return the stored id, creating and persisting one on first use.
    ///
    /// Never fails: unreadable storage counts as empty and unwritable storage
    /// yields an id that only lives for this run.
    pub fn get_or_create_session_id(&self) -> SessionId {
        let mut entries = self.read_entries();
        if let Some(existing) = entries.get(&self.key).filter(|id| !id.is_empty()) {
            debug!("resumed session (session_id={existing})");
            return existing.clone();
        }

        let session_id = generate_session_id();
        entries.insert(self.key.clone(), session_id.clone());
        match self.write_entries(&entries) {
            Ok(()) => debug!("created session (session_id={session_id})"),
            Err(SessionError::NoStorage) => {
                debug!("session storage unavailable, using ephemeral id (session_id={session_id})")
            }
            Err(err) => warn!(
                "failed to persist session id, using ephemeral id (session_id={session_id}, error={err})"
            ),
        }
        session_id
    }

    /// Drop the stored id so the next lookup starts a new session.
    pub fn forget(&self) -> Result<(), SessionError> {
        let mut entries = self.read_entries();
        if entries.remove(&self.key).is_none() {
            return Ok(());
        }
        self.write_entries(&entries)
    }

    fn read_entries(&self) -> BTreeMap<String, String> {
        let Some(path) = self.path.as_ref() else {
            return BTreeMap::new();
        };
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(err) => {
                warn!(
                    "failed to read session storage (path={}, error={err})",
                    path.display()
                );
                return BTreeMap::new();
            }
        };
        serde_json::from_str(&contents).unwrap_or_else(|err| {
            warn!(
                "ignoring corrupt session storage (path={}, error={err})",
                path.display()
            );
            BTreeMap::new()
        })
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), SessionError> {
        let path = self.path.as_ref().ok_or(SessionError::NoStorage)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_string_pretty(entries)?;
        fs::write(path, payload)?;
        Ok(())
    }
}

/// Generate `session_<unix millis>_<9 base36 chars>`.
pub fn generate_session_id() -> SessionId {
    let millis = chrono::Utc::now().timestamp_millis();
    let mut rng = rand::rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("session_{millis}_{suffix}")
}
