//! Configuration management for the hot backup agent.
//!
//! Built-in defaults, then an optional TOML file, then environment variables
//! named `HOTBACKUP_<SECTION>__<KEY>` (e.g. `HOTBACKUP_RESTORE__BUCKET_URL`).

use crate::executor::restore::RestoreRequest;
use crate::utils::errors::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "HOTBACKUP";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub agent: AgentConfig,
    pub restore: RestoreConfig,
    pub secrets: SecretsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Pod hostname; its trailing ordinal is the member index
    #[serde(default = "default_hostname")]
    pub hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// Bucket holding the archives, e.g. `s3://backups/hazelcast`
    #[serde(default)]
    pub bucket_url: Option<String>,

    /// Secret with the bucket credentials
    #[serde(default)]
    pub secret_name: Option<String>,

    /// Folder inside the bucket to restore from
    #[serde(default)]
    pub list_prefix: String,

    /// Parent directory of the hot-restart folders
    #[serde(default = "default_dest_dir")]
    pub dest_dir: PathBuf,

    /// Identifier of the restore attempt
    #[serde(default)]
    pub restore_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Directory secrets are mounted under, one subdirectory per secret
    #[serde(default = "default_secrets_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Colored output
    #[serde(default)]
    pub ansi: bool,
}

/// `HOTBACKUP_RESTORE__BUCKET_URL` -> `restore.bucket_url`
fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

// Default values
fn default_port() -> u16 {
    8080
}

fn default_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_default()
}

fn default_dest_dir() -> PathBuf {
    PathBuf::from("/data/persistence")
}

fn default_secrets_dir() -> PathBuf {
    PathBuf::from("/etc/hotbackup/secrets")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            agent: AgentConfig {
                port: default_port(),
                hostname: default_hostname(),
            },
            restore: RestoreConfig {
                bucket_url: None,
                secret_name: None,
                list_prefix: String::new(),
                dest_dir: default_dest_dir(),
                restore_id: None,
            },
            secrets: SecretsConfig {
                dir: default_secrets_dir(),
            },
            log: LogConfig {
                level: default_log_level(),
                ansi: false,
            },
        }
    }
}

impl Config {
    /// Load configuration: defaults, then `path` if given, then environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with_env(path, environment())
    }

    fn load_with_env(path: Option<&Path>, env: config::Environment) -> anyhow::Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::new(
                &path.to_string_lossy(),
                config::FileFormat::Toml,
            ));
        }

        let config = builder.add_source(env).build()?.try_deserialize()?;
        Ok(config)
    }

    /// Restore parameters, failing if the bucket or restore id is missing.
    pub fn restore_request(&self) -> Result<RestoreRequest> {
        let bucket_url = self
            .restore
            .bucket_url
            .clone()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| AgentError::Config("restore.bucket_url is required".to_string()))?;
        let restore_id = self
            .restore
            .restore_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AgentError::Config("restore.restore_id is required".to_string()))?;

        Ok(RestoreRequest {
            bucket_url,
            secret_name: self.restore.secret_name.clone(),
            list_prefix: self.restore.list_prefix.clone(),
            dest_dir: self.restore.dest_dir.clone(),
            restore_id,
            hostname: self.agent.hostname.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env_of(vars: &[(&str, &str)]) -> config::Environment {
        let map: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.agent.port, 8080);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.restore.dest_dir, PathBuf::from("/data/persistence"));
        assert!(config.restore_request().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[agent]
port = 9000
hostname = "hazelcast-2"

[restore]
bucket_url = "s3://backups/cluster"
secret_name = "s3-creds"
restore_id = "r-7"

[log]
level = "debug"
"#
        )
        .unwrap();

        let config = Config::load_with_env(Some(file.path()), env_of(&[])).unwrap();
        assert_eq!(config.agent.port, 9000);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.secrets.dir, PathBuf::from("/etc/hotbackup/secrets"));

        let request = config.restore_request().unwrap();
        assert_eq!(request.bucket_url, "s3://backups/cluster");
        assert_eq!(request.secret_name.as_deref(), Some("s3-creds"));
        assert_eq!(request.hostname, "hazelcast-2");
        assert_eq!(request.dest_dir, PathBuf::from("/data/persistence"));
    }

    #[test]
    fn test_environment_overrides() {
        let env = env_of(&[
            ("HOTBACKUP_SECRETS__DIR", "/run/secrets/hotbackup"),
            ("HOTBACKUP_RESTORE__BUCKET_URL", "s3://b/c"),
            ("HOTBACKUP_RESTORE__RESTORE_ID", "r1"),
            ("HOTBACKUP_AGENT__HOSTNAME", "hazelcast-0"),
            ("HOTBACKUP_AGENT__PORT", "9100"),
            ("OTHER_AGENT__PORT", "1"),
        ]);
        let config = Config::load_with_env(None, env).unwrap();

        assert_eq!(config.secrets.dir, PathBuf::from("/run/secrets/hotbackup"));
        assert_eq!(config.agent.port, 9100);

        let request = config.restore_request().unwrap();
        assert_eq!(request.bucket_url, "s3://b/c");
        assert_eq!(request.restore_id, "r1");
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[log]\nlevel = \"debug\"\n\n[agent]\nport = 9000").unwrap();

        let env = env_of(&[("HOTBACKUP_AGENT__PORT", "9200")]);
        let config = Config::load_with_env(Some(file.path()), env).unwrap();

        assert_eq!(config.agent.port, 9200);
        assert_eq!(config.log.level, "debug");
    }
}
