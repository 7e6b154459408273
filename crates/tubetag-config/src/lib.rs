// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::Path;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Structured release source (Discogs) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscogsConfig {
    pub token: Option<String>,
    pub base_url: Option<String>,
    /// Remaining-quota floor below which the next request waits out the cooldown.
    pub quota_floor: u32,
    pub quota_cooldown_secs: u64,
    pub timeout_secs: u64,
}

impl Default for DiscogsConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: None,
            quota_floor: 2,
            quota_cooldown_secs: 90,
            timeout_secs: 30,
        }
    }
}

/// Settings shared by the keyed song-search sources (Shazam, Vagalume).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongSearchConfig {
    /// Ordered key list; a single newline-separated string is accepted too.
    #[serde(default, deserialize_with = "deserialize_keys")]
    pub api_keys: Vec<String>,
    pub base_url: Option<String>,
    /// Time box applied to each individual key attempt.
    pub timeout_secs: u64,
}

impl Default for SongSearchConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            base_url: None,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggingConfig {
    pub inject_tags: bool,
    pub auto_rename: bool,
    /// Carried through for the confirmation dialog; not acted on here.
    pub manual_confirmation: bool,
    pub rename_template: String,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            inject_tags: true,
            auto_rename: true,
            manual_confirmation: false,
            rename_template: "$title".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub max_concurrent_files: usize,
}

impl QueueConfig {
    pub const MIN_CONCURRENT_FILES: usize = 1;
    pub const MAX_CONCURRENT_FILES: usize = 10;

    /// Concurrency actually used, clamped to the supported range.
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrent_files
            .clamp(Self::MIN_CONCURRENT_FILES, Self::MAX_CONCURRENT_FILES)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_files: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub telemetry: TelemetryConfig,
    pub discogs: DiscogsConfig,
    pub shazam: SongSearchConfig,
    pub vagalume: SongSearchConfig,
    pub tagging: TaggingConfig,
    pub queue: QueueConfig,
}

/// Load configuration from defaults, optional TOML file, and environment overrides (prefix: TUBETAG_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("TUBETAG_").split("__"));

    let config: AppConfig = figment.extract()?;
    info!(
        target: "config",
        shazam_keys = config.shazam.api_keys.len(),
        vagalume_keys = config.vagalume.api_keys.len(),
        "configuration loaded"
    );
    Ok(config)
}

/// Split a newline-separated key list as stored by the settings dialog.
pub fn split_keys(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeyList {
    Joined(String),
    Listed(Vec<String>),
}

fn deserialize_keys<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match KeyList::deserialize(deserializer)? {
        KeyList::Joined(raw) => split_keys(&raw),
        KeyList::Listed(keys) => keys.iter().flat_map(|key| split_keys(key)).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_settings_dialog() {
        let config = AppConfig::default();
        assert_eq!(config.discogs.quota_floor, 2);
        assert_eq!(config.discogs.quota_cooldown_secs, 90);
        assert!(config.tagging.auto_rename);
        assert!(!config.tagging.manual_confirmation);
        assert_eq!(config.queue.effective_concurrency(), 2);
    }

    #[test]
    fn concurrency_is_clamped() {
        let zero = QueueConfig {
            max_concurrent_files: 0,
        };
        let many = QueueConfig {
            max_concurrent_files: 64,
        };
        assert_eq!(zero.effective_concurrency(), 1);
        assert_eq!(many.effective_concurrency(), 10);
    }

    #[test]
    fn split_keys_drops_blank_lines() {
        let keys = split_keys("  first \n\n second\r\n   \nthird");
        assert_eq!(keys, vec!["first", "second", "third"]);
    }

    #[test]
    fn toml_and_env_overrides_are_merged() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "tubetag.toml",
                r#"
                [shazam]
                api_keys = ["key-a", "key-b"]

                [tagging]
                auto_rename = false
                "#,
            )?;
            jail.set_env("TUBETAG_DISCOGS__TOKEN", "secret");
            jail.set_env("TUBETAG_QUEUE__MAX_CONCURRENT_FILES", "4");

            let config = load(Some(Path::new("tubetag.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.shazam.api_keys, vec!["key-a", "key-b"]);
            assert!(!config.tagging.auto_rename);
            assert_eq!(config.discogs.token.as_deref(), Some("secret"));
            assert_eq!(config.queue.max_concurrent_files, 4);
            assert!(config.vagalume.api_keys.is_empty());
            Ok(())
        });
    }

    #[test]
    fn newline_separated_keys_are_split() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "tubetag.toml",
                r#"
                [vagalume]
                api_keys = "  vg-1\n\nvg-2  "
                "#,
            )?;
            jail.set_env("TUBETAG_SHAZAM__API_KEYS", "key-a\nkey-b\n");

            let config = load(Some(Path::new("tubetag.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.shazam.api_keys, vec!["key-a", "key-b"]);
            assert_eq!(config.vagalume.api_keys, vec!["vg-1", "vg-2"]);
            Ok(())
        });
    }
}
