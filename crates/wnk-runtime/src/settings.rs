use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use wnk_plugins::{BuiltinConfig, FilesConfig, WeatherConfig};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RuntimeSettings {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub plugins_dir: Option<PathBuf>,
    #[serde(default)]
    pub enabled_plugins: Vec<String>,
    #[serde(default)]
    pub files: FilesSettings,
    #[serde(default)]
    pub weather: WeatherSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilesSettings {
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_dirs_visited")]
    pub max_dirs_visited: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WeatherSettings {
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
    #[serde(default = "default_city")]
    pub city: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for FilesSettings {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            max_results: default_max_results(),
            max_depth: default_max_depth(),
            max_dirs_visited: default_max_dirs_visited(),
        }
    }
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            latitude: default_latitude(),
            longitude: default_longitude(),
            city: default_city(),
            timezone: default_timezone(),
            cache_ttl_secs: default_cache_ttl_secs(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            plugins_dir: None,
            enabled_plugins: Vec::new(),
            files: FilesSettings::default(),
            weather: WeatherSettings::default(),
        }
    }
}

impl RuntimeSettings {
    /// Plugin configuration with numeric limits clamped to usable values.
    pub fn to_builtin_config(&self) -> BuiltinConfig {
        let weather_city = if self.weather.city.trim().is_empty() {
            default_city()
        } else {
            self.weather.city.trim().to_string()
        };
        let weather_timezone = if self.weather.timezone.trim().is_empty() {
            default_timezone()
        } else {
            self.weather.timezone.trim().to_string()
        };

        BuiltinConfig {
            files: FilesConfig {
                roots: self.files.roots.clone(),
                max_results: self.files.max_results.clamp(1, 500),
                max_depth: self.files.max_depth.clamp(1, 32),
                max_dirs_visited: self.files.max_dirs_visited.max(1),
            },
            weather: WeatherConfig {
                latitude: self.weather.latitude.clamp(-90.0, 90.0),
                longitude: self.weather.longitude.clamp(-180.0, 180.0),
                city: weather_city,
                timezone: weather_timezone,
                cache_ttl_secs: self.weather.cache_ttl_secs.max(1),
                timeout_ms: self.weather.timeout_ms.max(1_000),
            },
        }
    }

    /// Empty allow-list enables everything.
    pub fn is_enabled(&self, plugin_id: &str) -> bool {
        self.enabled_plugins.is_empty() || self.enabled_plugins.iter().any(|id| id == plugin_id)
    }
}

/// A missing file yields defaults; an unreadable or invalid one is an error.
pub fn load_settings(path: &Path) -> Result<RuntimeSettings> {
    if !path.exists() {
        return Ok(RuntimeSettings::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("read settings file: {}", path.display()))?;
    let settings: RuntimeSettings = serde_json::from_str(&raw)
        .with_context(|| format!("parse settings file: {}", path.display()))?;
    Ok(settings)
}

const fn default_schema_version() -> u32 {
    1
}

const fn default_max_results() -> usize {
    30
}

const fn default_max_depth() -> usize {
    6
}

const fn default_max_dirs_visited() -> usize {
    2500
}

const fn default_latitude() -> f64 {
    25.0330
}

const fn default_longitude() -> f64 {
    121.5654
}

fn default_city() -> String {
    "Taipei".to_string()
}

fn default_timezone() -> String {
    "Asia/Taipei".to_string()
}

const fn default_cache_ttl_secs() -> u64 {
    600
}

const fn default_timeout_ms() -> u64 {
    8_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn load_defaults_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = load_settings(&dir.path().join("settings.json")).expect("load defaults");
        assert_eq!(settings, RuntimeSettings::default());
        assert_eq!(settings.files.max_results, 30);
        assert_eq!(settings.weather.cache_ttl_secs, 600);
    }

    #[test]
    fn partial_file_keeps_field_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"enabled_plugins":["calculator"],"files":{"max_depth":2},"weather":{"city":"Oslo"}}"#,
        )
        .expect("write settings");

        let settings = load_settings(&path).expect("load");
        assert_eq!(settings.schema_version, 1);
        assert_eq!(settings.files.max_depth, 2);
        assert_eq!(settings.files.max_results, 30);
        assert_eq!(settings.weather.city, "Oslo");
        assert_eq!(settings.weather.timezone, "Asia/Taipei");
        assert!(settings.is_enabled("calculator"));
        assert!(!settings.is_enabled("todo"));
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").expect("write settings");

        let err = load_settings(&path).expect_err("invalid settings");
        assert!(format!("{err:#}").contains("parse settings file"));
    }

    #[test]
    fn builtin_config_clamps_limits() {
        let settings = RuntimeSettings {
            files: FilesSettings {
                max_results: 0,
                max_depth: 1000,
                max_dirs_visited: 0,
                ..FilesSettings::default()
            },
            weather: WeatherSettings {
                latitude: 123.0,
                city: "  ".to_string(),
                cache_ttl_secs: 0,
                timeout_ms: 5,
                ..WeatherSettings::default()
            },
            ..RuntimeSettings::default()
        };

        let config = settings.to_builtin_config();
        assert_eq!(config.files.max_results, 1);
        assert_eq!(config.files.max_depth, 32);
        assert_eq!(config.files.max_dirs_visited, 1);
        assert_eq!(config.weather.latitude, 90.0);
        assert_eq!(config.weather.city, "Taipei");
        assert_eq!(config.weather.cache_ttl_secs, 1);
        assert_eq!(config.weather.timeout_ms, 1_000);
        assert!(settings.is_enabled("anything"));
    }
}
