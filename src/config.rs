use anyhow::{Context, Result, anyhow, bail};
use dotenvy::dotenv;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};
use url::Url;

use crate::planner::{MAX_PART_SIZE_BYTES, MIN_PART_SIZE_BYTES};
use crate::serde_utils;

pub const KEYRING_SERVICE: &str = "mpup-api-key";
pub const KEYRING_USER: &str = "mpup";

const ENV_PREFIX: &str = "MPUP_";
const MEGABYTE: u64 = 1024 * 1024;
pub const DEFAULT_PART_SIZE_MIB: u64 = MIN_PART_SIZE_BYTES / MEGABYTE;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_url: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_size_mib: Option<u64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "serde_utils::deserialize_duration",
        serialize_with = "serde_utils::serialize_duration"
    )]
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigEnv {
    store_url: Option<Url>,
    part_size_mib: Option<u64>,
    #[serde(default, deserialize_with = "serde_utils::deserialize_duration")]
    request_timeout: Option<Duration>,
    api_key: Option<String>,
}

#[derive(Debug)]
pub struct Config {
    pub store_url: Url,
    pub api_key: String,
    pub part_size_mib: u64,
    pub request_timeout: Duration,
}

impl Config {
    /// Part size in bytes, preferring `override_mib` over the configured value.
    pub fn part_size(&self, override_mib: Option<u64>) -> Result<u64> {
        part_size_bytes(override_mib.unwrap_or(self.part_size_mib))
    }
}

pub fn part_size_bytes(mib: u64) -> Result<u64> {
    let bytes = mib
        .checked_mul(MEGABYTE)
        .ok_or(anyhow!("Part size of {} MiB is too large", mib))?;
    if bytes < MIN_PART_SIZE_BYTES {
        bail!(
            "Part size must be at least {} MiB, got {} MiB",
            MIN_PART_SIZE_BYTES / MEGABYTE,
            mib
        );
    }
    if bytes > MAX_PART_SIZE_BYTES {
        bail!(
            "Part size must be at most {} MiB, got {} MiB",
            MAX_PART_SIZE_BYTES / MEGABYTE,
            mib
        );
    }
    Ok(bytes)
}

fn merge_config(
    base: ConfigFile,
    override_config: ConfigEnv,
    keyring_api_key: impl FnOnce() -> Result<String>,
) -> Result<Config> {
    let store_url = override_config
        .store_url
        .or(base.store_url)
        .ok_or(anyhow!(
            "No store URL provided, set MPUP_STORE_URL or run `mpup config`"
        ))?;

    let api_key = match override_config.api_key {
        Some(api_key) => api_key,
        None => keyring_api_key()?,
    };

    Ok(Config {
        store_url,
        api_key,
        part_size_mib: override_config
            .part_size_mib
            .or(base.part_size_mib)
            .unwrap_or(DEFAULT_PART_SIZE_MIB),
        request_timeout: override_config
            .request_timeout
            .or(base.request_timeout)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
    })
}

fn read_api_key_keyring() -> Result<String> {
    let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
    let api_key = entry
        .get_secret()
        .context("API key not specified via environment variable nor present in OS keyring")?;
    Ok(String::from_utf8(api_key)?)
}

fn config_file_path() -> Result<PathBuf> {
    let project_dirs = directories::ProjectDirs::from("com", "mpup", "mpup")
        .ok_or(anyhow!("Unable to determine home directory"))?;
    Ok(project_dirs.config_dir().join("config.toml"))
}

pub fn read_config() -> Result<Config> {
    let _ = dotenv();
    let env_config = envy::prefixed(ENV_PREFIX)
        .from_env::<ConfigEnv>()
        .context("Invalid MPUP_* environment variable")?;

    let config_file = config_file_path()?;
    let file_config = if let Ok(config) = fs::read_to_string(&config_file) {
        toml::from_str(&config)
            .with_context(|| format!("Failed to parse {}", config_file.display()))?
    } else {
        ConfigFile::default()
    };

    merge_config(file_config, env_config, read_api_key_keyring)
}

pub fn write_config(config: ConfigFile) -> Result<()> {
    let config_file = config_file_path()?;
    if let Some(parent) = config_file.parent() {
        fs::create_dir_all(parent).context("Failed to create configuration directory")?;
    }
    fs::write(&config_file, toml::to_string_pretty(&config)?)
        .with_context(|| format!("Failed to write {}", config_file.display()))?;
    Ok(())
}

pub fn set_api_key_keyring(api_key: String) -> Result<()> {
    let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
    entry.set_secret(api_key.as_bytes())?;
    println!("API key set for use with mpup");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_keyring() -> Result<String> {
        Err(anyhow!("keyring unavailable"))
    }

    #[test]
    fn test_env_overrides_file() {
        let file: ConfigFile = toml::from_str(
            r#"
            store_url = "https://file.example/"
            part_size_mib = 8
            request_timeout = "30s"
            "#,
        )
        .unwrap();
        let env = ConfigEnv {
            store_url: Some(Url::parse("https://env.example/").unwrap()),
            api_key: Some("from-env".to_string()),
            ..Default::default()
        };

        let config = merge_config(file, env, no_keyring).unwrap();

        assert_eq!(config.store_url.as_str(), "https://env.example/");
        assert_eq!(config.api_key, "from-env");
        assert_eq!(config.part_size_mib, 8);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_defaults_and_keyring_fallback() {
        let file = ConfigFile {
            store_url: Some(Url::parse("https://file.example/").unwrap()),
            ..Default::default()
        };

        let config =
            merge_config(file, ConfigEnv::default(), || Ok("from-keyring".to_string())).unwrap();

        assert_eq!(config.api_key, "from-keyring");
        assert_eq!(config.part_size_mib, DEFAULT_PART_SIZE_MIB);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.part_size(None).unwrap(), 5 * MEGABYTE);
        assert_eq!(config.part_size(Some(64)).unwrap(), 64 * MEGABYTE);
    }

    #[test]
    fn test_missing_store_url() {
        let env = ConfigEnv {
            api_key: Some("key".to_string()),
            ..Default::default()
        };
        assert!(merge_config(ConfigFile::default(), env, no_keyring).is_err());
    }

    #[test]
    fn test_missing_api_key() {
        let file = ConfigFile {
            store_url: Some(Url::parse("https://file.example/").unwrap()),
            ..Default::default()
        };
        assert!(merge_config(file, ConfigEnv::default(), no_keyring).is_err());
    }

    #[test]
    fn test_part_size_bounds() {
        assert!(part_size_bytes(4).is_err());
        assert_eq!(part_size_bytes(5).unwrap(), MIN_PART_SIZE_BYTES);
        assert_eq!(part_size_bytes(5 * 1024).unwrap(), MAX_PART_SIZE_BYTES);
        assert!(part_size_bytes(5 * 1024 + 1).is_err());
        assert!(part_size_bytes(u64::MAX).is_err());
    }

    #[test]
    fn test_config_file_round_trip_omits_unset_fields() {
        let file = ConfigFile {
            store_url: Some(Url::parse("https://store.example/").unwrap()),
            ..Default::default()
        };
        let text = toml::to_string_pretty(&file).unwrap();
        assert_eq!(text.trim(), r#"store_url = "https://store.example/""#);
    }
}
