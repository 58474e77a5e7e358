//! API credential loading.
//!
//! Credentials come from exactly one source: inline pairs (config file,
//! `--keys`, or `RELAY_KEYS`) take precedence over a key file. A key file
//! must not be accessible to "others" and holds a flat TOML table of
//! `key = "secret"` entries.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use subtle::ConstantTimeEq;

use crate::node::random_base62;

/// Secrets shorter than this are accepted but reported.
pub const MIN_SECRET_LEN: usize = 32;

const API_KEY_PREFIX: &str = "API";
const API_KEY_LEN: usize = 12;
const API_SECRET_LEN: usize = 43;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("key file {} does not exist", .path.display())]
    KeyFileMissing { path: PathBuf },

    #[error("key file others permissions must be set to 0 (mode {mode:o})")]
    InsecurePermissions { mode: u32 },

    #[error("could not read key file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not parse keys from {origin}: {reason}")]
    Parse { origin: String, reason: String },

    #[error("one of key-file or keys must be provided in order to support a secure installation")]
    NoKeys,
}

/// Immutable set of API key/secret pairs. Never empty.
#[derive(Clone)]
pub struct CredentialSet {
    keys: Arc<BTreeMap<String, String>>,
}

impl CredentialSet {
    pub fn new(keys: BTreeMap<String, String>) -> Result<Self, CredentialError> {
        if keys.is_empty() {
            return Err(CredentialError::NoKeys);
        }
        Ok(Self {
            keys: Arc::new(keys),
        })
    }

    pub fn secret(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }

    /// Check a key/secret pair, comparing secrets in constant time.
    pub fn verify(&self, key: &str, secret: &str) -> bool {
        match self.keys.get(key) {
            Some(expected) => expected.as_bytes().ct_eq(secret.as_bytes()).into(),
            None => false,
        }
    }

    /// The lexicographically first pair.
    pub fn first(&self) -> Option<(&str, &str)> {
        self.keys
            .iter()
            .next()
            .map(|(k, s)| (k.as_str(), s.as_str()))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("keys", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Produce the credential set for this process.
pub fn load_credentials(
    inline: &BTreeMap<String, String>,
    key_file: Option<&Path>,
    development: bool,
) -> Result<CredentialSet, CredentialError> {
    let keys = if !inline.is_empty() {
        inline.clone()
    } else if let Some(path) = key_file.filter(|p| !p.as_os_str().is_empty()) {
        read_key_file(path)?
    } else {
        BTreeMap::new()
    };

    let credentials = CredentialSet::new(keys)?;

    if !development {
        for (key, secret) in credentials.keys.iter() {
            if secret.len() < MIN_SECRET_LEN {
                tracing::warn!(
                    api_key = %key,
                    min_len = MIN_SECRET_LEN,
                    "Secret is too short, should be at least 32 characters for security"
                );
            }
        }
    }

    tracing::debug!(count = credentials.len(), "Loaded API credentials");
    Ok(credentials)
}

fn read_key_file(path: &Path) -> Result<BTreeMap<String, String>, CredentialError> {
    let metadata = fs::metadata(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => CredentialError::KeyFileMissing {
            path: path.to_path_buf(),
        },
        _ => CredentialError::Read {
            path: path.to_path_buf(),
            source,
        },
    })?;

    check_permissions(&metadata)?;

    let content = fs::read_to_string(path).map_err(|source| CredentialError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|e| CredentialError::Parse {
        origin: path.display().to_string(),
        reason: e.to_string(),
    })
}

#[cfg(unix)]
fn check_permissions(metadata: &fs::Metadata) -> Result<(), CredentialError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = metadata.permissions().mode() & 0o777;
    if mode & 0o007 != 0 {
        return Err(CredentialError::InsecurePermissions { mode });
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(_metadata: &fs::Metadata) -> Result<(), CredentialError> {
    Ok(())
}

/// Parse `key: secret` lines as given by `--keys` or `RELAY_KEYS`.
pub fn parse_inline_keys(text: &str) -> Result<BTreeMap<String, String>, CredentialError> {
    let mut keys = BTreeMap::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, secret) = line
            .split_once(':')
            .map(|(k, s)| (k.trim(), s.trim()))
            .filter(|(k, s)| !k.is_empty() && !s.is_empty())
            .ok_or_else(|| CredentialError::Parse {
                origin: "inline keys".to_string(),
                reason: format!("line {} is not in 'key: secret' form", idx + 1),
            })?;
        keys.insert(key.to_string(), secret.to_string());
    }
    Ok(keys)
}

/// Generate a fresh API key and secret.
pub fn generate_key_pair<R: Rng + ?Sized>(rng: &mut R) -> (String, String) {
    let key = format!("{API_KEY_PREFIX}{}", random_base62(rng, API_KEY_LEN));
    let secret = random_base62(rng, API_SECRET_LEN);
    (key, secret)
}
