use crate::atomic_file;
use crate::pool::credentials_path;
use esprit_core::Credential;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;

/// Single-credential storage for providers that don't need account
/// rotation: one credential per provider name, keyed by provider, at
/// `~/.esprit/credentials.json`.
pub struct CredentialStore {
    path: PathBuf,
    credentials: Mutex<HashMap<String, Credential>>,
}

impl CredentialStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let credentials: HashMap<String, Credential> = atomic_file::read_json(&path);
        Self { path, credentials: Mutex::new(credentials) }
    }

    pub fn load_default() -> Self {
        Self::load(credentials_path())
    }

    pub fn get(&self, provider: &str) -> Option<Credential> {
        self.credentials.lock().get(provider).cloned()
    }

    pub fn has_credentials(&self, provider: &str) -> bool {
        self.credentials.lock().contains_key(provider)
    }

    pub fn set(&self, provider: impl Into<String>, credential: Credential) -> std::io::Result<()> {
        let mut credentials = self.credentials.lock();
        credentials.insert(provider.into(), credential);
        let json = serde_json::to_string_pretty(&*credentials)?;
        atomic_file::write(&self.path, &json)
    }

    pub fn remove(&self, provider: &str) -> std::io::Result<bool> {
        let mut credentials = self.credentials.lock();
        let removed = credentials.remove(provider).is_some();
        if removed {
            let json = serde_json::to_string_pretty(&*credentials)?;
            atomic_file::write(&self.path, &json)?;
        }
        Ok(removed)
    }
}
