use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{env, time::Duration};

const DEFAULT_DATABASE_URL: &str = "sqlite://./data/object_store.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Connection settings for the backing database.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// How long SQLite waits on a locked database before giving up.
    pub busy_timeout: Duration,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Relational object store administration")]
pub struct Args {
    /// Database URL (overrides OBJECT_STORE_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Pool size (overrides OBJECT_STORE_MAX_CONNECTIONS)
    #[arg(long, global = true)]
    pub max_connections: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the object table and its indexes, then exit
    Migrate,
    /// Count live objects in a collection
    Count {
        collection: String,
        /// Only count objects carrying this property, as `key=value`
        /// (value parsed as JSON, otherwise taken as a string)
        #[arg(long = "property", value_name = "KEY=VALUE")]
        properties: Vec<String>,
    },
    /// Delete objects whose expiration time has passed
    PurgeExpired { collection: String },
    /// Delete every object of a collection, expired or not
    DeleteCollection { collection: String },
}

impl StoreConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read settings through `lookup`, falling back to defaults for unset names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url =
            lookup("OBJECT_STORE_DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into());

        let max_connections = match lookup("OBJECT_STORE_MAX_CONNECTIONS") {
            Some(value) => value.parse::<u32>().with_context(|| {
                format!("parsing OBJECT_STORE_MAX_CONNECTIONS value `{}`", value)
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        if max_connections == 0 {
            anyhow::bail!("OBJECT_STORE_MAX_CONNECTIONS must be at least 1");
        }

        let busy_timeout_ms = match lookup("OBJECT_STORE_BUSY_TIMEOUT_MS") {
            Some(value) => value.parse::<u64>().with_context(|| {
                format!("parsing OBJECT_STORE_BUSY_TIMEOUT_MS value `{}`", value)
            })?,
            None => DEFAULT_BUSY_TIMEOUT_MS,
        };

        Ok(Self {
            database_url,
            max_connections,
            busy_timeout: Duration::from_millis(busy_timeout_ms),
        })
    }

    /// Parse environment variables + CLI args into a config and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        let args = Args::parse();
        let cfg = Self::from_env()?.merge(&args);
        Ok((cfg, args.command))
    }

    /// CLI flags win over the environment.
    pub fn merge(mut self, args: &Args) -> Self {
        if let Some(url) = &args.database_url {
            self.database_url = url.clone();
        }
        if let Some(max) = args.max_connections {
            self.max_connections = max.max(1);
        }
        self
    }

    /// An in-memory database lives and dies with its connection.
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, StoreConfig::default());
        assert!(!cfg.is_in_memory());
    }

    #[test]
    fn reads_environment() {
        let cfg = StoreConfig::from_lookup(lookup(&[
            ("OBJECT_STORE_DATABASE_URL", "sqlite::memory:"),
            ("OBJECT_STORE_MAX_CONNECTIONS", "2"),
            ("OBJECT_STORE_BUSY_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(cfg.database_url, "sqlite::memory:");
        assert_eq!(cfg.max_connections, 2);
        assert_eq!(cfg.busy_timeout, Duration::from_millis(250));
        assert!(cfg.is_in_memory());
    }

    #[test]
    fn reports_bad_numbers_with_context() {
        let err =
            StoreConfig::from_lookup(lookup(&[("OBJECT_STORE_MAX_CONNECTIONS", "many")]))
                .unwrap_err();
        assert!(err.to_string().contains("OBJECT_STORE_MAX_CONNECTIONS"));

        assert!(StoreConfig::from_lookup(lookup(&[("OBJECT_STORE_MAX_CONNECTIONS", "0")])).is_err());
    }

    #[test]
    fn cli_flags_override_environment() {
        let args = Args::try_parse_from([
            "objstore",
            "--database-url",
            "sqlite://./other.db",
            "count",
            "orders",
            "--property",
            "status=\"paid\"",
        ])
        .unwrap();
        let cfg = StoreConfig::default().merge(&args);
        assert_eq!(cfg.database_url, "sqlite://./other.db");
        assert_eq!(cfg.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(
            args.command,
            Command::Count {
                collection: "orders".into(),
                properties: vec!["status=\"paid\"".into()],
            }
        );
    }
}
