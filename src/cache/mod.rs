// Persistent cache of identity tokens and AWS credentials
use crate::error::{OidcError, Result};
use crate::models::{CloudCredential, IdentityToken};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Everything the cache holds. Always read and written as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntrySet {
    /// Identity tokens keyed by [`identity_token_key`]
    #[serde(default, rename = "oidc")]
    pub identity_tokens: BTreeMap<String, IdentityToken>,

    /// AWS credentials keyed by role ARN
    #[serde(default, rename = "aws")]
    pub credentials: BTreeMap<String, CloudCredential>,
}

/// Cache key for the identity token used to assume `role_arn` through `provider`
pub fn identity_token_key(provider: &str, role_arn: &str) -> String {
    format!("{}|{}", provider, role_arn)
}

/// File-backed cache store.
///
/// Every mutation rewrites the whole file through a temporary file that is
/// renamed over the old one, so a failed write never leaves a truncated cache.
/// The in-process lock serializes read-modify-write cycles; separate processes
/// sharing the file are not coordinated and the last writer wins.
pub struct CacheStore {
    path: PathBuf,
    entries: Mutex<CacheEntrySet>,
}

impl CacheStore {
    /// Open the cache at `path`. An unreadable or corrupt cache is treated as
    /// empty so the caller simply falls back to logging in again.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match Self::load(&path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Ignoring unreadable cache at {}: {}", path.display(), e);
                CacheEntrySet::default()
            }
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole entry set. A missing file is an empty set.
    pub fn load(path: &Path) -> Result<CacheEntrySet> {
        if !path.exists() {
            return Ok(CacheEntrySet::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| OidcError::Cache(format!("Failed to read cache file: {}", e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| OidcError::Cache(format!("Failed to decode cache file: {}", e)))
    }

    /// Write the whole entry set atomically
    pub fn save(path: &Path, entries: &CacheEntrySet) -> Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)
            .map_err(|e| OidcError::Cache(format!("Failed to create cache directory: {}", e)))?;

        let json = serde_json::to_vec_pretty(entries)?;

        // NamedTempFile is created with 0600 permissions on Unix
        let mut file = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| OidcError::Cache(format!("Failed to create temporary file: {}", e)))?;
        file.write_all(&json)
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| OidcError::Cache(format!("Failed to write cache file: {}", e)))?;
        file.persist(path)
            .map_err(|e| OidcError::Cache(format!("Failed to replace cache file: {}", e.error)))?;

        tracing::debug!("Saved cache to {}", path.display());
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheEntrySet>> {
        self.entries
            .lock()
            .map_err(|_| OidcError::Cache("Cache lock poisoned".to_string()))
    }

    /// Apply `change` to a copy of the entries, persist it, and only then make
    /// it visible in memory.
    fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut CacheEntrySet),
    {
        let mut guard = self.lock()?;
        let mut next = guard.clone();
        change(&mut next);
        Self::save(&self.path, &next)?;
        *guard = next;
        Ok(())
    }

    pub fn snapshot(&self) -> Result<CacheEntrySet> {
        Ok(self.lock()?.clone())
    }

    pub fn get_identity_token(&self, key: &str) -> Result<Option<IdentityToken>> {
        Ok(self.lock()?.identity_tokens.get(key).cloned())
    }

    pub fn put_identity_token(&self, key: &str, token: IdentityToken) -> Result<()> {
        self.update(|entries| {
            entries.identity_tokens.insert(key.to_string(), token);
        })
    }

    pub fn get_credential(&self, role_arn: &str) -> Result<Option<CloudCredential>> {
        Ok(self.lock()?.credentials.get(role_arn).cloned())
    }

    pub fn put_credential(&self, role_arn: &str, creds: CloudCredential) -> Result<()> {
        self.update(|entries| {
            entries.credentials.insert(role_arn.to_string(), creds);
        })
    }

    /// Remove every cached token and credential
    pub fn clear(&self) -> Result<()> {
        self.update(|entries| *entries = CacheEntrySet::default())
    }
}
