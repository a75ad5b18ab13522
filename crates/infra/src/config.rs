//! Database configuration.
//!
//! Loaded from `CATALOG_DB_*` environment variables. Loading goes through a
//! lookup function so tests can supply values without touching the process
//! environment.

use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::time::Duration;

use sqlx::postgres::PgConnectOptions;
use thiserror::Error;

pub const ENV_ENDPOINT: &str = "CATALOG_DB_ENDPOINT";
pub const ENV_READ_ENDPOINT: &str = "CATALOG_DB_READ_ENDPOINT";
pub const ENV_USER: &str = "CATALOG_DB_USER";
pub const ENV_PASSWORD: &str = "CATALOG_DB_PASSWORD";
pub const ENV_NAME: &str = "CATALOG_DB_NAME";
pub const ENV_CONNECT_TIMEOUT: &str = "CATALOG_DB_CONNECT_TIMEOUT";
pub const ENV_MAX_CONNECTIONS: &str = "CATALOG_DB_MAX_CONNECTIONS";
pub const ENV_MIGRATE: &str = "CATALOG_DB_MIGRATE";
pub const ENV_MIGRATIONS_PATH: &str = "CATALOG_DB_MIGRATIONS_PATH";

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIGRATIONS_PATH: &str = "migrations";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// `host` or `host:port` of a Postgres server. IPv6 hosts are written bare
/// (`::1`) or bracketed (`[::1]:5432`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn parse(key: &'static str, value: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let value = value.trim();
        let (host, port) = if let Some(rest) = value.strip_prefix('[') {
            let (host, rest) = rest
                .split_once(']')
                .ok_or_else(|| invalid("missing ']' after IPv6 host"))?;
            if host.parse::<Ipv6Addr>().is_err() {
                return Err(invalid("bracketed host is not an IPv6 address"));
            }
            let port = match rest {
                "" => None,
                rest => Some(
                    rest.strip_prefix(':')
                        .ok_or_else(|| invalid("expected ':' after ']'"))?,
                ),
            };
            (host, port)
        } else if value.matches(':').count() > 1 {
            // Bare IPv6 literal; a port needs the bracketed form.
            if value.parse::<Ipv6Addr>().is_err() {
                return Err(invalid("IPv6 host with a port must be written [host]:port"));
            }
            (value, None)
        } else {
            match value.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (value, None),
            }
        };

        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid("port is not a number"))?,
            None => DEFAULT_PORT,
        };
        if host.is_empty() {
            return Err(invalid("host is empty"));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl core::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Connection and startup settings for the catalog database.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub endpoint: Endpoint,
    /// Read replica; when absent reader traffic goes to `endpoint`.
    pub read_endpoint: Option<Endpoint>,
    pub user: String,
    pub password: String,
    pub name: String,
    pub connect_timeout: Duration,
    pub max_connections: u32,
    pub migrate: bool,
    pub migrations_path: PathBuf,
}

impl core::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("endpoint", &self.endpoint)
            .field("read_endpoint", &self.read_endpoint)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_connections", &self.max_connections)
            .field("migrate", &self.migrate)
            .field("migrations_path", &self.migrations_path)
            .finish()
    }
}

impl DatabaseConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve each `CATALOG_DB_*` key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let endpoint = Endpoint::parse(ENV_ENDPOINT, &require(ENV_ENDPOINT)?)?;
        let read_endpoint = get(ENV_READ_ENDPOINT)
            .map(|v| Endpoint::parse(ENV_READ_ENDPOINT, &v))
            .transpose()?;

        let connect_timeout = match get(ENV_CONNECT_TIMEOUT) {
            Some(v) => Duration::from_secs(parse_number(ENV_CONNECT_TIMEOUT, &v)?),
            None => Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let max_connections = match get(ENV_MAX_CONNECTIONS) {
            Some(v) => parse_number::<u32>(ENV_MAX_CONNECTIONS, &v)?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_MAX_CONNECTIONS,
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let migrate = match get(ENV_MIGRATE) {
            Some(v) => parse_bool(ENV_MIGRATE, &v)?,
            None => false,
        };

        Ok(Self {
            endpoint,
            read_endpoint,
            user: require(ENV_USER)?,
            password: lookup(ENV_PASSWORD).unwrap_or_default(),
            name: require(ENV_NAME)?,
            connect_timeout,
            max_connections,
            migrate,
            migrations_path: get(ENV_MIGRATIONS_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MIGRATIONS_PATH)),
        })
    }

    /// Connect options for `endpoint` using this config's credentials and database.
    pub fn connect_options(&self, endpoint: &Endpoint) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&endpoint.host)
            .port(endpoint.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
    }
}

fn parse_number<T: core::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: "expected a non-negative integer".to_string(),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            (ENV_ENDPOINT, "db.internal:5433"),
            (ENV_USER, "catalog"),
            (ENV_PASSWORD, "s3cret"),
            (ENV_NAME, "catalog"),
        ]
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let cfg = DatabaseConfig::from_lookup(lookup(&minimal())).unwrap();
        assert_eq!(
            cfg.endpoint,
            Endpoint {
                host: "db.internal".to_string(),
                port: 5433
            }
        );
        assert_eq!(cfg.read_endpoint, None);
        assert_eq!(cfg.connect_timeout, Duration::from_secs(5));
        assert_eq!(cfg.max_connections, 10);
        assert!(!cfg.migrate);
        assert_eq!(cfg.migrations_path, PathBuf::from("migrations"));
    }

    #[test]
    fn loads_reader_and_migration_settings() {
        let mut pairs = minimal();
        pairs.extend([
            (ENV_READ_ENDPOINT, "replica.internal"),
            (ENV_CONNECT_TIMEOUT, "30"),
            (ENV_MIGRATE, "true"),
            (ENV_MIGRATIONS_PATH, "/srv/catalog/migrations"),
            (ENV_MAX_CONNECTIONS, "4"),
        ]);
        let cfg = DatabaseConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(
            cfg.read_endpoint,
            Some(Endpoint {
                host: "replica.internal".to_string(),
                port: 5432
            })
        );
        assert_eq!(cfg.connect_timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_connections, 4);
        assert!(cfg.migrate);
        assert_eq!(cfg.migrations_path, PathBuf::from("/srv/catalog/migrations"));
    }

    #[test]
    fn blank_read_endpoint_means_no_replica() {
        let mut pairs = minimal();
        pairs.push((ENV_READ_ENDPOINT, "  "));
        let cfg = DatabaseConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(cfg.read_endpoint, None);
    }

    #[test]
    fn missing_required_setting_is_reported() {
        let pairs: Vec<_> = minimal()
            .into_iter()
            .filter(|(k, _)| *k != ENV_NAME)
            .collect();
        let err = DatabaseConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Missing(ENV_NAME));
    }

    #[test]
    fn invalid_values_are_rejected() {
        for (key, value) in [
            (ENV_CONNECT_TIMEOUT, "soon"),
            (ENV_MIGRATE, "maybe"),
            (ENV_MAX_CONNECTIONS, "0"),
            (ENV_ENDPOINT, "db:notaport"),
            (ENV_ENDPOINT, ":5432"),
        ] {
            let mut pairs: Vec<_> = minimal().into_iter().filter(|(k, _)| *k != key).collect();
            pairs.push((key, value));
            match DatabaseConfig::from_lookup(lookup(&pairs)) {
                Err(ConfigError::Invalid { key: k, .. }) => assert_eq!(k, key),
                other => panic!("expected invalid {key}, got {other:?}"),
            }
        }
    }

    fn endpoint(value: &str) -> Result<Endpoint, ConfigError> {
        Endpoint::parse(ENV_ENDPOINT, value)
    }

    fn at(host: &str, port: u16) -> Endpoint {
        Endpoint {
            host: host.to_string(),
            port,
        }
    }

    #[test]
    fn ipv6_endpoints_are_parsed() {
        assert_eq!(endpoint("[::1]:5433"), Ok(at("::1", 5433)));
        assert_eq!(endpoint("[::1]"), Ok(at("::1", 5432)));
        assert_eq!(endpoint("::1"), Ok(at("::1", 5432)));
        assert_eq!(endpoint("fe80::2"), Ok(at("fe80::2", 5432)));
        assert_eq!(endpoint(" 10.0.0.7:6432 "), Ok(at("10.0.0.7", 6432)));
    }

    #[test]
    fn malformed_ipv6_endpoints_are_rejected() {
        for value in ["[::1", "[::1]5432", "[::1]:port", "[db.internal]:5432", "[]:5432", "db:5432:1"] {
            match endpoint(value) {
                Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, ENV_ENDPOINT),
                other => panic!("expected {value} to be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn ipv6_endpoint_displays_bracketed() {
        assert_eq!(at("::1", 5433).to_string(), "[::1]:5433");
        assert_eq!(at("db.internal", 5432).to_string(), "db.internal:5432");
        assert_eq!(endpoint(&at("::1", 5433).to_string()), Ok(at("::1", 5433)));
    }

    #[test]
    fn debug_redacts_password() {
        let cfg = DatabaseConfig::from_lookup(lookup(&minimal())).unwrap();
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<redacted>"));
    }
}
