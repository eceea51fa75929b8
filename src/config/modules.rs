//! Per-module configuration snapshots.
//!
//! Each struct is built once by the [`ConfigLoader`](super::ConfigLoader)
//! and shared as an `Arc` afterwards.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::env::ModuleEnv;
use super::{ConfigCell, ConfigError, ConfigLoader, LoaderModule, ModuleConfig};
use crate::lifecycle::ServerTimeouts;

/// Default table recording applied migrations.
pub const DEFAULT_MIGRATIONS_TABLE: &str = "schema_migrations";

/// Default time allowed to establish a database connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Log verbosity accepted by `LOG_LEVEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Everything.
    Trace,
    /// Debug and above.
    Debug,
    /// Info and above.
    Info,
    /// Warnings and errors.
    #[default]
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// The directive understood by `tracing_subscriber::EnvFilter`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            // Levels above error have no tracing counterpart.
            "error" | "fatal" | "panic" => Ok(Self::Error),
            other => Err(format!("not a valid log level: {other:?}")),
        }
    }
}

/// `logger` module: process-wide log verbosity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    /// Minimum level written to stderr.
    pub level: LogLevel,
}

impl ModuleConfig for LoggerConfig {
    const MODULE: &'static str = "logger";

    fn from_env(env: &ModuleEnv<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            level: env.parsed_or("LOG_LEVEL", LogLevel::default())?,
        })
    }
}

impl LoaderModule for LoggerConfig {
    fn cell(loader: &ConfigLoader) -> &ConfigCell<Self> {
        &loader.logger
    }
}

/// `db` module: PostgreSQL connection, pool bounds and migrations.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database name.
    pub name: String,
    /// Login role.
    pub user: String,
    /// Login password; may be empty.
    pub password: String,
    /// Require TLS (`sslmode=require`) instead of disabling it.
    pub ssl_enabled: bool,
    /// Upper bound on concurrently open connections.
    pub max_open_conns: u32,
    /// Connections kept open while idle.
    pub max_idle_conns: u32,
    /// Time allowed to obtain a connection.
    pub connect_timeout: Duration,
    /// Apply pending migrations at startup.
    pub migrations_run: bool,
    /// Directory holding migration scripts.
    pub migrations_dir: Option<PathBuf>,
    /// Table recording applied migrations.
    pub migrations_table: String,
}

impl DatabaseConfig {
    /// Idle connections to keep, never above the open limit.
    #[must_use]
    pub fn min_connections(&self) -> u32 {
        self.max_idle_conns.min(self.max_open_conns)
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("ssl_enabled", &self.ssl_enabled)
            .field("max_open_conns", &self.max_open_conns)
            .field("max_idle_conns", &self.max_idle_conns)
            .field("connect_timeout", &self.connect_timeout)
            .field("migrations_run", &self.migrations_run)
            .field("migrations_dir", &self.migrations_dir)
            .field("migrations_table", &self.migrations_table)
            .finish()
    }
}

impl ModuleConfig for DatabaseConfig {
    const MODULE: &'static str = "db";

    fn from_env(env: &ModuleEnv<'_>) -> Result<Self, ConfigError> {
        let max_open_conns: u32 = env.parsed("DB_MAX_OPEN_CONNS")?;
        if max_open_conns == 0 {
            return Err(env.invalid("DB_MAX_OPEN_CONNS", "0", "must be at least 1"));
        }

        let migrations_run = env.bool_or("DB_MIGRATIONS_RUN", false)?;
        let migrations_dir = env.optional("DB_MIGRATIONS_DIR").map(PathBuf::from);
        if migrations_run && migrations_dir.is_none() {
            return Err(ConfigError::Missing {
                module: Self::MODULE,
                key: "DB_MIGRATIONS_DIR",
            });
        }

        let migrations_table = env
            .optional("DB_MIGRATIONS_TABLE")
            .unwrap_or_else(|| DEFAULT_MIGRATIONS_TABLE.to_string());
        if !is_sql_identifier(&migrations_table) {
            return Err(env.invalid(
                "DB_MIGRATIONS_TABLE",
                &migrations_table,
                "must be a plain SQL identifier",
            ));
        }

        Ok(Self {
            host: env.required("DB_HOST")?,
            port: env.parsed("DB_PORT")?,
            name: env.required("DB_NAME")?,
            user: env.required("DB_USER")?,
            password: env.optional("DB_PASS").unwrap_or_default(),
            ssl_enabled: env.bool_or("DB_SSL_ENABLED", false)?,
            max_open_conns,
            max_idle_conns: env.parsed_or("DB_MAX_IDLE_CONNS", 0)?,
            connect_timeout: env.duration_or("DB_CONNECT_TIMEOUT", DEFAULT_CONNECT_TIMEOUT)?,
            migrations_run,
            migrations_dir,
            migrations_table,
        })
    }
}

impl LoaderModule for DatabaseConfig {
    fn cell(loader: &ConfigLoader) -> &ConfigCell<Self> {
        &loader.database
    }
}

/// `healthcheck` module: where the liveness endpoint is mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthcheckConfig {
    /// Request path, e.g. `/healthz`.
    pub path: String,
}

impl ModuleConfig for HealthcheckConfig {
    const MODULE: &'static str = "healthcheck";

    fn from_env(env: &ModuleEnv<'_>) -> Result<Self, ConfigError> {
        let path = env.required("HEALTHCHECK_PATH")?;
        if !path.starts_with('/') {
            return Err(env.invalid("HEALTHCHECK_PATH", &path, "must start with '/'"));
        }
        Ok(Self { path })
    }
}

impl LoaderModule for HealthcheckConfig {
    fn cell(loader: &ConfigLoader) -> &ConfigCell<Self> {
        &loader.healthcheck
    }
}

/// `images` module: limits for the RPC service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagesConfig {
    /// Deadline for a single RPC call.
    pub timeout: Duration,
}

impl ModuleConfig for ImagesConfig {
    const MODULE: &'static str = "images";

    fn from_env(env: &ModuleEnv<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            timeout: positive_duration(env, "SERVER_TIMEOUT")?,
        })
    }
}

impl LoaderModule for ImagesConfig {
    fn cell(loader: &ConfigLoader) -> &ConfigCell<Self> {
        &loader.images
    }
}

/// `server` module: listener port and connection timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// TCP port bound on all interfaces.
    pub port: u16,
    /// Read, write and shutdown deadline.
    pub timeout: Duration,
}

impl ServerConfig {
    /// The address the listener binds to (`0.0.0.0:<port>`).
    #[must_use]
    pub fn address(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    /// Connection timeouts derived from `SERVER_TIMEOUT`.
    #[must_use]
    pub const fn timeouts(&self) -> ServerTimeouts {
        ServerTimeouts::uniform(self.timeout)
    }
}

impl ModuleConfig for ServerConfig {
    const MODULE: &'static str = "server";

    fn from_env(env: &ModuleEnv<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            port: env.parsed("SERVER_PORT")?,
            timeout: positive_duration(env, "SERVER_TIMEOUT")?,
        })
    }
}

impl LoaderModule for ServerConfig {
    fn cell(loader: &ConfigLoader) -> &ConfigCell<Self> {
        &loader.server
    }
}

fn positive_duration(env: &ModuleEnv<'_>, key: &'static str) -> Result<Duration, ConfigError> {
    let duration = env.duration(key)?;
    if duration.is_zero() {
        return Err(env.invalid(key, "0", "must be greater than zero"));
    }
    Ok(duration)
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::config::MapEnv;

    fn db_env() -> MapEnv {
        MapEnv::new()
            .with("DB_HOST", "localhost")
            .with("DB_NAME", "images")
            .with("DB_USER", "images")
            .with("DB_PASS", "notArealPa55word")
            .with("DB_PORT", "5432")
            .with("DB_MAX_OPEN_CONNS", "10")
            .with("DB_MAX_IDLE_CONNS", "2")
    }

    fn load<T: ModuleConfig>(env: &MapEnv) -> Result<T, ConfigError> {
        T::from_env(&ModuleEnv::new(T::MODULE, env))
    }

    #[test]
    fn database_config_reads_all_fields() {
        let env = db_env()
            .with("DB_SSL_ENABLED", "true")
            .with("DB_MIGRATIONS_RUN", "true")
            .with("DB_MIGRATIONS_DIR", "./migrations")
            .with("DB_MIGRATIONS_TABLE", "images_migrations");
        let Ok(cfg) = load::<DatabaseConfig>(&env) else {
            panic!("valid database config");
        };
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.port, 5432);
        assert!(cfg.ssl_enabled);
        assert_eq!(cfg.max_open_conns, 10);
        assert_eq!(cfg.min_connections(), 2);
        assert_eq!(cfg.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert!(cfg.migrations_run);
        assert_eq!(cfg.migrations_dir, Some(PathBuf::from("./migrations")));
        assert_eq!(cfg.migrations_table, "images_migrations");
    }

    #[test]
    fn database_config_defaults() {
        let Ok(cfg) = load::<DatabaseConfig>(&db_env()) else {
            panic!("valid database config");
        };
        assert!(!cfg.ssl_enabled);
        assert!(!cfg.migrations_run);
        assert_eq!(cfg.migrations_dir, None);
        assert_eq!(cfg.migrations_table, DEFAULT_MIGRATIONS_TABLE);
    }

    #[test]
    fn idle_connections_are_clamped_to_open_limit() {
        let env = db_env().with("DB_MAX_IDLE_CONNS", "50");
        let Ok(cfg) = load::<DatabaseConfig>(&env) else {
            panic!("valid database config");
        };
        assert_eq!(cfg.min_connections(), 10);
    }

    #[test]
    fn database_debug_redacts_password() {
        let Ok(cfg) = load::<DatabaseConfig>(&db_env()) else {
            panic!("valid database config");
        };
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("notArealPa55word"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn migrations_dir_required_when_running_migrations() {
        let env = db_env().with("DB_MIGRATIONS_RUN", "1");
        assert_eq!(
            load::<DatabaseConfig>(&env),
            Err(ConfigError::Missing {
                module: "db",
                key: "DB_MIGRATIONS_DIR",
            })
        );
    }

    #[test]
    fn migrations_table_must_be_an_identifier() {
        let env = db_env().with("DB_MIGRATIONS_TABLE", "users; DROP TABLE users");
        assert!(matches!(
            load::<DatabaseConfig>(&env),
            Err(ConfigError::Invalid {
                key: "DB_MIGRATIONS_TABLE",
                ..
            })
        ));
    }

    #[test]
    fn zero_open_connections_rejected() {
        let env = db_env().with("DB_MAX_OPEN_CONNS", "0");
        assert!(load::<DatabaseConfig>(&env).is_err());
    }

    #[test]
    fn logger_defaults_to_warn() {
        assert_eq!(
            load::<LoggerConfig>(&MapEnv::new()),
            Ok(LoggerConfig {
                level: LogLevel::Warn
            })
        );
        let env = MapEnv::new().with("LOG_LEVEL", "DEBUG");
        assert_eq!(
            load::<LoggerConfig>(&env).map(|c| c.level),
            Ok(LogLevel::Debug)
        );
        let env = MapEnv::new().with("LOG_LEVEL", "verbose");
        assert!(load::<LoggerConfig>(&env).is_err());
    }

    #[test]
    fn fatal_and_panic_levels_log_errors_only() {
        for level in ["fatal", "PANIC"] {
            let env = MapEnv::new().with("LOG_LEVEL", level);
            assert_eq!(
                load::<LoggerConfig>(&env).map(|c| c.level),
                Ok(LogLevel::Error),
                "{level}"
            );
        }
    }

    #[test]
    fn healthcheck_path_must_be_absolute() {
        let env = MapEnv::new().with("HEALTHCHECK_PATH", "healthz");
        assert!(load::<HealthcheckConfig>(&env).is_err());
        let env = MapEnv::new().with("HEALTHCHECK_PATH", "/healthz");
        assert_eq!(
            load::<HealthcheckConfig>(&env).map(|c| c.path),
            Ok("/healthz".to_string())
        );
    }

    #[test]
    fn healthcheck_path_is_kept_verbatim() {
        for path in ["/:health", "/health{", "/a/*x"] {
            let env = MapEnv::new().with("HEALTHCHECK_PATH", path);
            assert_eq!(
                load::<HealthcheckConfig>(&env).map(|c| c.path),
                Ok(path.to_string())
            );
        }
    }

    #[test]
    fn server_config_derives_address_and_timeouts() {
        let env = MapEnv::new()
            .with("SERVER_PORT", "8080")
            .with("SERVER_TIMEOUT", "15s");
        let Ok(cfg) = load::<ServerConfig>(&env) else {
            panic!("valid server config");
        };
        assert_eq!(cfg.address().to_string(), "0.0.0.0:8080");
        assert_eq!(cfg.timeouts().grace, Duration::from_secs(15));
    }

    #[test]
    fn server_timeout_must_be_positive() {
        let env = MapEnv::new()
            .with("SERVER_PORT", "8080")
            .with("SERVER_TIMEOUT", "0");
        assert!(load::<ServerConfig>(&env).is_err());
    }

    #[test]
    fn images_timeout_can_be_overridden_per_module() {
        let env = MapEnv::new()
            .with("SERVER_TIMEOUT", "15s")
            .with("IMAGES_SERVER_TIMEOUT", "3s");
        assert_eq!(
            load::<ImagesConfig>(&env).map(|c| c.timeout),
            Ok(Duration::from_secs(3))
        );
    }
}
