use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::ServiceScope;

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub frpc: FrpcSettings,
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub docker: DockerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct FrpcSettings {
    /// Explicit frpc binary; when unset the binary is searched for
    #[serde(default)]
    pub binary_path: Option<PathBuf>,
    #[serde(default)]
    pub config_path: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServiceSettings {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default)]
    pub scope: ServiceScope,
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
    #[serde(default = "default_service_description")]
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DockerSettings {
    #[serde(default = "default_docker_image")]
    pub image: String,
    #[serde(default = "default_container_name")]
    pub container_name: String,
    /// Where docker-compose.yml is written; defaults to the settings directory
    #[serde(default)]
    pub compose_dir: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Defaults for ServiceSettings
fn default_service_name() -> String {
    "frpc".to_string()
}

fn default_auto_start() -> bool {
    true
}

fn default_service_description() -> String {
    "frp reverse proxy client".to_string()
}

// Defaults for DockerSettings
fn default_docker_image() -> String {
    "snowdreamtech/frpc:latest".to_string()
}

fn default_container_name() -> String {
    "frpc".to_string()
}

// Defaults for LoggingSettings
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            scope: ServiceScope::default(),
            auto_start: default_auto_start(),
            description: default_service_description(),
        }
    }
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            image: default_docker_image(),
            container_name: default_container_name(),
            compose_dir: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Settings {
    /// Checks the values a hand-edited settings file is most likely to get wrong.
    pub fn validate(&self) -> crate::Result<()> {
        let name = self.service.name.trim();
        if name.is_empty() {
            return Err(crate::Error::Settings(
                "service.name must not be empty".to_string(),
            ));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(crate::Error::Settings(format!(
                "service.name `{}` may only contain letters, digits, '-', '_' and '.'",
                name
            )));
        }
        if self.docker.container_name.trim().is_empty() {
            return Err(crate::Error::Settings(
                "docker.container_name must not be empty".to_string(),
            ));
        }
        if !matches!(
            self.logging.level.to_ascii_lowercase().as_str(),
            "off" | "error" | "warn" | "info" | "debug" | "trace"
        ) {
            return Err(crate::Error::Settings(format!(
                "logging.level `{}` is not a log level",
                self.logging.level
            )));
        }
        Ok(())
    }

    /// Directory holding docker-compose.yml.
    pub fn compose_dir(&self) -> PathBuf {
        self.docker.compose_dir.clone().unwrap_or_else(|| {
            get_settings_path()
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".frpdeck")
        })
    }
}

pub fn get_settings_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".frpdeck.json")
}

pub fn load_or_create_settings() -> Result<Settings> {
    let path = get_settings_path();

    if path.exists() {
        load_settings_from(&path)
    } else {
        let settings = Settings::default();
        save_settings_to(&settings, &path)?;
        Ok(settings)
    }
}

pub fn load_and_validate_settings() -> Result<Settings> {
    let settings = load_or_create_settings()?;
    settings.validate().context("invalid settings")?;
    Ok(settings)
}

pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path).context("failed to read settings file")?;
    serde_json::from_str::<Settings>(&content).context("failed to parse settings file")
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(settings, &get_settings_path())
}

pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<()> {
    let content =
        serde_json::to_string_pretty(settings).context("failed to serialize settings")?;
    fs::write(path, content).context("failed to write settings file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_takes_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.service.name, "frpc");
        assert_eq!(settings.service.scope, ServiceScope::User);
        assert!(settings.service.auto_start);
        assert!(settings.frpc.binary_path.is_none());
        assert_eq!(settings.logging.level, "info");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"service": {"scope": "system", "auto_start": false}}"#)
                .unwrap();
        assert_eq!(settings.service.scope, ServiceScope::System);
        assert!(!settings.service.auto_start);
        assert_eq!(settings.service.name, "frpc");
        assert_eq!(settings.docker.container_name, "frpc");
    }

    #[test]
    fn rejects_bad_service_names_and_levels() {
        let mut settings = Settings::default();
        settings.service.name = "frp client".into();
        assert!(settings.validate().is_err());

        settings.service.name = "frpc-home".into();
        settings.logging.level = "loud".into();
        assert!(settings.validate().is_err());

        settings.logging.level = "DEBUG".into();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn save_then_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = Settings::default();
        settings.frpc.config_path = Some(PathBuf::from("/etc/frp/frpc.toml"));
        save_settings_to(&settings, &path).unwrap();

        let loaded = load_settings_from(&path).unwrap();
        assert_eq!(
            loaded.frpc.config_path.as_deref(),
            Some(Path::new("/etc/frp/frpc.toml"))
        );
    }
}
