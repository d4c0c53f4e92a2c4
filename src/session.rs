use crate::sync::{AuthUser, CredentialsProvider};
use serde_json::Value;
use std::path::PathBuf;

/// The last-authenticated user, persisted as one JSON file. Written by
/// login, cleared by logout, and read fresh (never cached in memory) by the
/// sync client so credential changes take effect on the next call.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        SessionStore { path }
    }

    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("schoold")
            .join("user.json")
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// A missing or corrupt file reads as "not signed in".
    pub fn load(&self) -> Option<Value> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn save(&self, user: &Value) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(user)?)?;
        Ok(())
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl CredentialsProvider for SessionStore {
    fn credentials(&self) -> Option<AuthUser> {
        serde_json::from_value(self.load()?).ok()
    }
}
