//! Configuration (spec §6 "Configuration").
//!
//! Loaded from TOML with environment overrides, the way server-shaped
//! examples in the pack key connection and limits state (e.g.
//! `MrDadone-panel`'s `server_database.rs`). The teacher has no
//! configuration layer of its own (it takes a bare connection string on the
//! CLI), so this is grounded on the wider pack rather than the teacher.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl DatabaseConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablesConfig {
    pub global_prefix: String,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            global_prefix: "qs".to_string(),
        }
    }
}

/// `limits.*` (spec §6). Defaults are deliberately conservative; they are
/// the ones enforced by C6 (`QueryTooComplex`, `max_path_depth`) and C7
/// (`query_timeout_ms`, `max_rows`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_term_cache_size")]
    pub term_cache_size: usize,
    #[serde(default = "default_graph_cache_size")]
    pub graph_cache_size: usize,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default = "default_max_path_depth")]
    pub max_path_depth: u32,
    #[serde(default = "default_max_algebra_nodes")]
    pub max_algebra_nodes: usize,
}

fn default_term_cache_size() -> usize {
    100_000
}
fn default_graph_cache_size() -> usize {
    10_000
}
fn default_query_timeout_ms() -> u64 {
    30_000
}
fn default_max_rows() -> usize {
    100_000
}
fn default_max_path_depth() -> u32 {
    50
}
fn default_max_algebra_nodes() -> usize {
    10_000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            term_cache_size: default_term_cache_size(),
            graph_cache_size: default_graph_cache_size(),
            query_timeout_ms: default_query_timeout_ms(),
            max_rows: default_max_rows(),
            max_path_depth: default_max_path_depth(),
            max_algebra_nodes: default_max_algebra_nodes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tables: TablesConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Applies `QUADSTORE_DATABASE_URL`-style environment overrides on top
    /// of a parsed file, the common pattern for twelve-factor deployment of
    /// the pack's server examples.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("QUADSTORE_DATABASE_HOST") {
            self.database.host = host;
        }
        if let Ok(port) = std::env::var("QUADSTORE_DATABASE_PORT") {
            if let Ok(port) = port.parse() {
                self.database.port = port;
            }
        }
        if let Ok(db) = std::env::var("QUADSTORE_DATABASE_NAME") {
            self.database.database = db;
        }
        if let Ok(user) = std::env::var("QUADSTORE_DATABASE_USER") {
            self.database.user = user;
        }
        if let Ok(password) = std::env::var("QUADSTORE_DATABASE_PASSWORD") {
            self.database.password = password;
        }
        if let Ok(prefix) = std::env::var("QUADSTORE_GLOBAL_PREFIX") {
            self.tables.global_prefix = prefix;
        }
    }
}
