use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    calendar::Calendar,
    constants::{DOCUMENT_KEYS, TIME_SETTINGS},
    error::ConfigError,
    logging::{default_log_level, parse_level},
    storage::{get_config_dir, get_data_dir, get_log_dir},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub refresh_interval_ms: u64,
    /// Fixed offset for day boundaries; `None` follows the system time zone.
    pub utc_offset_seconds: Option<i32>,
}

/// On-disk form of `config.json`. Every key is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub data_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub refresh_interval_ms: Option<u64>,
    pub utc_offset_seconds: Option<i32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            log_dir: get_log_dir(),
            log_level: default_log_level().to_string(),
            refresh_interval_ms: TIME_SETTINGS.refresh_interval_ms,
            utc_offset_seconds: None,
        }
    }
}

impl Settings {
    pub fn default_path() -> PathBuf {
        get_config_dir().join(DOCUMENT_KEYS.config)
    }

    /// Defaults overlaid with `path` when that file exists.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = match fs::read(path) {
            Ok(bytes) => serde_json::from_slice::<ConfigFile>(&bytes).map_err(|source| {
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(
                    "event=config_load module=config status=absent path={}",
                    path.display()
                );
                ConfigFile::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut settings = Self::default();
        settings.apply(file);
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply(&mut self, file: ConfigFile) {
        if let Some(data_dir) = file.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(log_dir) = file.log_dir {
            self.log_dir = log_dir;
        }
        if let Some(log_level) = file.log_level {
            self.log_level = log_level;
        }
        if let Some(refresh_interval_ms) = file.refresh_interval_ms {
            self.refresh_interval_ms = refresh_interval_ms;
        }
        if file.utc_offset_seconds.is_some() {
            self.utc_offset_seconds = file.utc_offset_seconds;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if parse_level(&self.log_level).is_none() {
            return Err(ConfigError::InvalidLogLevel(self.log_level.clone()));
        }
        if self.refresh_interval_ms == 0 {
            return Err(ConfigError::InvalidRefreshInterval);
        }
        self.calendar()?;
        Ok(())
    }

    pub fn calendar(&self) -> Result<Calendar, ConfigError> {
        match self.utc_offset_seconds {
            Some(seconds) => {
                Calendar::from_offset_seconds(seconds).ok_or(ConfigError::InvalidOffset(seconds))
            }
            None => Ok(Calendar::Local),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("config.json")).unwrap();

        assert_eq!(settings.refresh_interval_ms, 1000);
        assert_eq!(settings.utc_offset_seconds, None);
        assert_eq!(settings.calendar().unwrap(), Calendar::Local);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "data_dir": "/tmp/daytally", "log_level": "warn", "utc_offset_seconds": 3600 }"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/daytally"));
        assert_eq!(settings.log_level, "warn");
        assert_eq!(
            settings.calendar().unwrap(),
            Calendar::from_offset_seconds(3600).unwrap()
        );
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "theme": "dark" }"#).unwrap();

        assert!(matches!(
            Settings::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let mut settings = Settings::default();
        settings.log_level = "chatty".to_string();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidLogLevel(_))
        ));

        let mut settings = Settings::default();
        settings.refresh_interval_ms = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidRefreshInterval)
        ));

        let mut settings = Settings::default();
        settings.utc_offset_seconds = Some(90_000);
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidOffset(90_000))
        ));
    }
}
