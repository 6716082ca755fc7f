//! `mvnbind.toml` configuration.
//!
//! ```toml
//! cache-dir = "/var/cache/mvnbind"
//!
//! [download]
//! max-concurrent = 8
//! warning-threshold = 16
//! timeout-secs = 100
//!
//! [logging]
//! level = "info"
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{ArtifactCache, CacheError};
use crate::registry::DEFAULT_TIMEOUT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("設定ファイル {path:?} を読み込めませんでした: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("設定ファイル {path:?} の解析に失敗しました: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error(
        "未対応のログレベル: {invalid}. 利用可能候補: {choices}",
        choices = .available.join(", ")
    )]
    UnknownLogLevel {
        invalid: String,
        available: &'static [&'static str],
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BindingConfig {
    /// 未指定なら `~/.mvnbind/cache`。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    pub download: DownloadConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DownloadConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning_threshold: Option<usize>,
    /// 1 リクエストあたりのタイムアウト秒数。
    pub timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: None,
            warning_threshold: None,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

impl BindingConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// パス未指定なら既定値。指定されたファイルが読めなければエラー。
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn cache_dir(&self) -> Result<PathBuf, CacheError> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => ArtifactCache::default_root(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.download.timeout_secs.max(1))
    }
}

/// ログレベル。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub const fn variants() -> &'static [&'static str] {
        &["trace", "debug", "info", "warn", "error"]
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_ascii_lowercase();
        match normalised.as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::UnknownLogLevel {
                invalid: other.to_string(),
                available: LogLevel::variants(),
            }),
        }
    }
}

impl Serialize for LogLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        LogLevel::from_str(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_file_uses_defaults() {
        let config: BindingConfig = toml::from_str("").expect("empty config");
        assert_eq!(config, BindingConfig::default());
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn parses_every_section() {
        let config: BindingConfig = toml::from_str(
            r#"
            cache-dir = "/tmp/mvnbind"

            [download]
            max-concurrent = 4
            warning-threshold = 6
            timeout-secs = 30

            [logging]
            level = "WARNING"
            "#,
        )
        .expect("config");

        assert_eq!(config.cache_dir().expect("dir"), PathBuf::from("/tmp/mvnbind"));
        assert_eq!(config.download.max_concurrent, Some(4));
        assert_eq!(config.download.warning_threshold, Some(6));
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.logging.level, LogLevel::Warn);
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let error = toml::from_str::<BindingConfig>("[logging]\nlevel = \"loud\"")
            .expect_err("invalid level");
        assert!(error.to_string().contains("loud"));
        assert!(matches!(
            "verbose".parse::<LogLevel>(),
            Err(ConfigError::UnknownLogLevel { .. })
        ));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let temp = tempdir().expect("一時ディレクトリ作成に失敗");
        let missing = temp.path().join("mvnbind.toml");
        assert!(matches!(
            BindingConfig::load_or_default(Some(&missing)),
            Err(ConfigError::Io { .. })
        ));
        assert!(BindingConfig::load_or_default(None).is_ok());

        fs::write(&missing, "[download]\nmax-concurrent = 2\n").expect("write");
        let loaded = BindingConfig::load(&missing).expect("load");
        assert_eq!(loaded.download.max_concurrent, Some(2));
    }
}
