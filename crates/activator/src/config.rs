//! Конфигурация активатора
//!
//! Источники (по возрастанию приоритета): preset, файл (TOML/JSON/YAML),
//! переменные окружения `ACTIVATOR_*`.

use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};
use tracing::warn;

use crate::errors::{ActivationError, ActivationResult};

const MAX_DEPTH_LIMIT: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivatorConfig {
    /// Максимальная глубина вложенных producer'ов в registry
    pub max_resolution_depth: usize,
    /// Логировать каждый успешный resolve (debug)
    pub log_resolutions: bool,
    /// Порог числа фабрик в кэше, после которого пишется warning
    pub factory_cache_warn_threshold: usize,
}

impl Default for ActivatorConfig {
    fn default() -> Self {
        Self {
            max_resolution_depth: 32,
            log_resolutions: false,
            factory_cache_warn_threshold: 1024,
        }
    }
}

impl ActivatorConfig {
    pub fn production() -> Self {
        Self {
            max_resolution_depth: 32,
            log_resolutions: false,
            factory_cache_warn_threshold: 4096,
        }
    }

    pub fn development() -> Self {
        Self {
            max_resolution_depth: 64,
            log_resolutions: true,
            factory_cache_warn_threshold: 256,
        }
    }

    /// Minimal конфигурация для тестов
    pub fn minimal() -> Self {
        Self {
            max_resolution_depth: 8,
            log_resolutions: false,
            factory_cache_warn_threshold: 64,
        }
    }

    pub fn from_preset_name(name: &str) -> ActivationResult<Self> {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::production()),
            "development" | "dev" => Ok(Self::development()),
            "minimal" | "test" => Ok(Self::minimal()),
            other => Err(ActivationError::configuration(
                "preset",
                format!("unknown preset '{other}'"),
            )),
        }
    }

    /// Default конфигурация с переопределениями из окружения
    pub fn from_environment() -> ActivationResult<Self> {
        let mut config = Self::default();
        config.apply_environment()?;
        Ok(config)
    }

    /// Применить `ACTIVATOR_*` переменные поверх текущих значений
    pub fn apply_environment(&mut self) -> ActivationResult<()> {
        if let Some(depth) = read_env("ACTIVATOR_MAX_RESOLUTION_DEPTH")? {
            self.max_resolution_depth = depth;
        }
        if let Some(enabled) = read_env("ACTIVATOR_LOG_RESOLUTIONS")? {
            self.log_resolutions = enabled;
        }
        if let Some(threshold) = read_env("ACTIVATOR_FACTORY_CACHE_WARN_THRESHOLD")? {
            self.factory_cache_warn_threshold = threshold;
        }
        self.validate()
    }

    /// Загрузить конфигурацию из файла, формат по расширению
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ActivationResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|err| {
            ActivationError::configuration("file", format!("{}: {}", path.display(), err))
        })?;

        let config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content).map_err(|err| parse_error(path, err))?,
            Some("json") => serde_json::from_str(&content).map_err(|err| parse_error(path, err))?,
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|err| parse_error(path, err))?
            }
            other => {
                return Err(ActivationError::configuration(
                    "file",
                    format!("unsupported configuration format: {other:?}"),
                ))
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ActivationResult<()> {
        if self.max_resolution_depth == 0 {
            return Err(ActivationError::configuration(
                "max_resolution_depth",
                "must be greater than 0",
            ));
        }

        if self.max_resolution_depth > MAX_DEPTH_LIMIT {
            return Err(ActivationError::configuration(
                "max_resolution_depth",
                format!("must not exceed {MAX_DEPTH_LIMIT}"),
            ));
        }

        if self.factory_cache_warn_threshold == 0 {
            return Err(ActivationError::configuration(
                "factory_cache_warn_threshold",
                "must be greater than 0",
            ));
        }

        if self.log_resolutions && self.max_resolution_depth > 128 {
            warn!("log_resolutions with deep resolution chains produces a lot of output");
        }

        Ok(())
    }
}

fn read_env<V: std::str::FromStr>(name: &str) -> ActivationResult<Option<V>> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<V>().map(Some).map_err(|_| {
            ActivationError::configuration(name, format!("cannot parse value '{raw}'"))
        }),
        Err(_) => Ok(None),
    }
}

fn parse_error(path: &Path, err: impl std::fmt::Display) -> ActivationError {
    ActivationError::configuration("file", format!("{}: {}", path.display(), err))
}
