//! Credentials for object storage.
//!
//! Secrets are looked up by name through a [`SecretProvider`] and translated
//! into `object_store` configuration keys for the bucket's provider.

use crate::utils::errors::{AgentError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use url::Url;

/// Source of named secrets.
pub trait SecretProvider: Send + Sync {
    /// Return every key of the secret `name` with its raw value.
    fn secret_data(&self, name: &str) -> Result<HashMap<String, Vec<u8>>>;
}

/// Secrets mounted as directories of files, one file per key
/// (`<dir>/<secret-name>/<key>`), the way Kubernetes projects secret volumes.
#[derive(Debug, Clone)]
pub struct MountedSecrets {
    dir: PathBuf,
}

impl MountedSecrets {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SecretProvider for MountedSecrets {
    fn secret_data(&self, name: &str) -> Result<HashMap<String, Vec<u8>>> {
        if name.is_empty() || name.contains('/') || name.starts_with('.') {
            return Err(AgentError::Secret(format!("invalid secret name '{}'", name)));
        }

        let secret_dir = self.dir.join(name);
        let entries = std::fs::read_dir(&secret_dir).map_err(|e| {
            AgentError::Secret(format!("cannot read secret '{}' at {}: {}", name, secret_dir.display(), e))
        })?;

        let mut data = HashMap::new();
        for entry in entries {
            let entry = entry?;
            let Some(key) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            // Projected volumes keep their bookkeeping in `..data` style entries
            if key.starts_with('.') {
                continue;
            }
            let path = entry.path();
            if path.is_file() {
                data.insert(key, std::fs::read(&path)?);
            }
        }

        Ok(data)
    }
}

/// Translate a secret into `object_store` options for the provider behind `bucket_url`.
///
/// Secret keys already spelled as `object_store` keys (`aws_*`, `google_*`,
/// `azure_*`) pass through unchanged.
pub fn bucket_options(
    bucket_url: &str,
    secret: &HashMap<String, Vec<u8>>,
) -> Result<Vec<(String, String)>> {
    let url = Url::parse(bucket_url)?;
    let aliases: &[(&str, &str)] = match url.scheme() {
        "s3" | "s3a" => &[
            ("access-key-id", "aws_access_key_id"),
            ("secret-access-key", "aws_secret_access_key"),
            ("session-token", "aws_session_token"),
            ("region", "aws_region"),
            ("endpoint", "aws_endpoint"),
        ],
        "gs" => &[
            ("google-credentials-path", "google_service_account_key"),
            ("service-account-key", "google_service_account_key"),
        ],
        "az" | "adl" | "azure" | "abfs" | "abfss" => &[
            ("storage-account", "azure_storage_account_name"),
            ("storage-key", "azure_storage_account_key"),
        ],
        _ => &[],
    };

    let mut options = Vec::new();
    for (key, value) in secret {
        let value = String::from_utf8(value.clone())
            .map_err(|_| AgentError::Secret(format!("secret key '{}' is not valid UTF-8", key)))?;
        let value = value.trim().to_string();

        if let Some((_, option)) = aliases.iter().find(|(alias, _)| *alias == key.as_str()) {
            options.push((option.to_string(), value));
        } else if ["aws_", "google_", "azure_"].iter().any(|p| key.starts_with(*p)) {
            options.push((key.clone(), value));
        }
    }

    options.sort();
    Ok(options)
}
