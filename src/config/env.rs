//! Environment access for module configuration.
//!
//! [`EnvSource`] abstracts where variables come from so that tests can feed
//! a fixed map instead of mutating the process environment. [`ModuleEnv`]
//! scopes lookups to one module: a key `KEY` read by module `db` resolves
//! `DB_KEY` first and falls back to plain `KEY`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::ConfigError;
use super::duration::parse_duration;

/// A read-only source of environment variables.
pub trait EnvSource: fmt::Debug + Send + Sync {
    /// Returns the value of `key`, or `None` when it is not set.
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// A fixed set of variables, used by tests and tooling.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the map with `key` set to `value`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl EnvSource for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// Environment lookups scoped to a single module.
///
/// Blank values are treated as unset.
#[derive(Debug)]
pub struct ModuleEnv<'a> {
    module: &'static str,
    prefix: String,
    source: &'a dyn EnvSource,
}

impl<'a> ModuleEnv<'a> {
    /// Creates a reader for `module` over `source`.
    #[must_use]
    pub fn new(module: &'static str, source: &'a dyn EnvSource) -> Self {
        Self {
            module,
            prefix: module.to_ascii_uppercase(),
            source,
        }
    }

    /// Name of the module being read.
    #[must_use]
    pub const fn module(&self) -> &'static str {
        self.module
    }

    /// Returns the raw value of `key`, if set.
    #[must_use]
    pub fn optional(&self, key: &str) -> Option<String> {
        self.source
            .var(&format!("{}_{key}", self.prefix))
            .or_else(|| self.source.var(key))
            .filter(|value| !value.trim().is_empty())
    }

    /// Returns the raw value of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when the key is unset.
    pub fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing {
            module: self.module,
            key,
        })
    }

    /// Parses `key` with [`FromStr`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when unset and
    /// [`ConfigError::Invalid`] when the value does not parse.
    pub fn parsed<T>(&self, key: &'static str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let raw = self.required(key)?;
        self.parse_value(key, &raw)
    }

    /// Parses `key` with [`FromStr`], returning `default` when unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the value does not parse.
    pub fn parsed_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => self.parse_value(key, &raw),
            None => Ok(default),
        }
    }

    /// Parses `key` as a boolean, returning `default` when unset.
    ///
    /// Accepts `1`, `t`, `true`, `0`, `f`, `false` in any letter case.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for any other value.
    pub fn bool_or(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        let Some(raw) = self.optional(key) else {
            return Ok(default);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" => Ok(true),
            "0" | "f" | "false" => Ok(false),
            _ => Err(self.invalid(key, &raw, "expected a boolean")),
        }
    }

    /// Parses `key` as a duration such as `5s` or `1m30s`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when unset and
    /// [`ConfigError::Invalid`] when the value is not a duration.
    pub fn duration(&self, key: &'static str) -> Result<Duration, ConfigError> {
        let raw = self.required(key)?;
        parse_duration(&raw).map_err(|e| self.invalid(key, &raw, e))
    }

    /// Parses `key` as a duration, returning `default` when unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the value is not a duration.
    pub fn duration_or(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        match self.optional(key) {
            Some(raw) => parse_duration(&raw).map_err(|e| self.invalid(key, &raw, e)),
            None => Ok(default),
        }
    }

    /// Builds a [`ConfigError::Invalid`] for this module.
    #[must_use]
    pub fn invalid(&self, key: &'static str, value: &str, reason: impl fmt::Display) -> ConfigError {
        ConfigError::Invalid {
            module: self.module,
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn parse_value<T>(&self, key: &'static str, raw: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        raw.trim().parse().map_err(|e| self.invalid(key, raw, e))
    }
}
