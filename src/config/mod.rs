//! Module configuration loaded from environment variables.
//!
//! Every module of the process (`logger`, `db`, `healthcheck`, `images`,
//! `server`) reads its own namespaced settings. [`ConfigLoader`] guards each
//! module with a one-time barrier: the first [`ConfigLoader::initialize`]
//! call parses and validates, concurrent callers wait for it, and all of
//! them get the same `Arc`. A failure is remembered as well, so a module is
//! either uninitialized or fully initialized, never half-built.
//!
//! Settings may also come from a `.env` file loaded with `dotenvy` before
//! the loader runs.

pub mod duration;
pub mod env;
pub mod modules;

use std::fmt;
use std::sync::{Arc, OnceLock};

pub use env::{EnvSource, MapEnv, ModuleEnv, ProcessEnv};
pub use modules::{
    DatabaseConfig, HealthcheckConfig, ImagesConfig, LogLevel, LoggerConfig, ServerConfig,
};

/// Configuration failure for a named module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset.
    #[error("unable to process environment for module {module}: {key} is not set")]
    Missing {
        /// Module being initialized.
        module: &'static str,
        /// Variable that was looked up.
        key: &'static str,
    },

    /// A variable is set but malformed.
    #[error("unable to process environment for module {module}: invalid {key}={value:?}: {reason}")]
    Invalid {
        /// Module being initialized.
        module: &'static str,
        /// Offending variable.
        key: &'static str,
        /// Raw value as read.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// A validated configuration snapshot for one module.
pub trait ModuleConfig: fmt::Debug + Sized + Send + Sync + 'static {
    /// Module name, also the prefix for namespaced variables.
    const MODULE: &'static str;

    /// Reads and validates the module's settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or any
    /// variable fails to parse.
    fn from_env(env: &ModuleEnv<'_>) -> Result<Self, ConfigError>;
}

/// Modules whose barrier lives inside [`ConfigLoader`].
pub trait LoaderModule: ModuleConfig {
    /// The loader's cell for this module.
    fn cell(loader: &ConfigLoader) -> &ConfigCell<Self>;
}

/// One-time initialization barrier for a module configuration.
#[derive(Debug)]
pub struct ConfigCell<T> {
    cell: OnceLock<Result<Arc<T>, ConfigError>>,
}

impl<T: ModuleConfig> ConfigCell<T> {
    /// Creates an uninitialized cell.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Returns the cached configuration, parsing it from `source` on the
    /// first call. Callers racing the first call block until it finishes.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] of the first (and only) parse attempt.
    pub fn get_or_init(&self, source: &dyn EnvSource) -> Result<Arc<T>, ConfigError> {
        self.cell
            .get_or_init(|| {
                let result = T::from_env(&ModuleEnv::new(T::MODULE, source)).map(Arc::new);
                match &result {
                    Ok(_) => tracing::debug!(module = T::MODULE, "module configuration loaded"),
                    Err(e) => tracing::error!(module = T::MODULE, error = %e, "module configuration rejected"),
                }
                result
            })
            .clone()
    }

    /// Returns the configuration if it was initialized successfully.
    #[must_use]
    pub fn get(&self) -> Option<Arc<T>> {
        self.cell.get().and_then(|result| result.as_ref().ok().cloned())
    }
}

impl<T: ModuleConfig> Default for ConfigCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// All module configurations of the process.
#[derive(Debug, Clone)]
pub struct Modules {
    /// `logger` module.
    pub logger: Arc<LoggerConfig>,
    /// `db` module.
    pub database: Arc<DatabaseConfig>,
    /// `healthcheck` module.
    pub healthcheck: Arc<HealthcheckConfig>,
    /// `images` module.
    pub images: Arc<ImagesConfig>,
    /// `server` module.
    pub server: Arc<ServerConfig>,
}

/// Owns the per-module barriers and the environment they read.
#[derive(Debug)]
pub struct ConfigLoader {
    source: Arc<dyn EnvSource>,
    logger: ConfigCell<LoggerConfig>,
    database: ConfigCell<DatabaseConfig>,
    healthcheck: ConfigCell<HealthcheckConfig>,
    images: ConfigCell<ImagesConfig>,
    server: ConfigCell<ServerConfig>,
}

impl ConfigLoader {
    /// Creates a loader reading from `source`.
    #[must_use]
    pub fn new(source: impl EnvSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
            logger: ConfigCell::new(),
            database: ConfigCell::new(),
            healthcheck: ConfigCell::new(),
            images: ConfigCell::new(),
            server: ConfigCell::new(),
        }
    }

    /// Creates a loader reading the process environment.
    #[must_use]
    pub fn from_process_env() -> Self {
        Self::new(ProcessEnv)
    }

    /// Initializes module `T` exactly once and returns its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the module's settings are missing or
    /// malformed; every later call returns the same error.
    pub fn initialize<T: LoaderModule>(&self) -> Result<Arc<T>, ConfigError> {
        T::cell(self).get_or_init(self.source.as_ref())
    }

    /// Initializes every module, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first module's [`ConfigError`].
    pub fn initialize_all(&self) -> Result<Modules, ConfigError> {
        Ok(Modules {
            logger: self.initialize()?,
            database: self.initialize()?,
            healthcheck: self.initialize()?,
            images: self.initialize()?,
            server: self.initialize()?,
        })
    }
}
