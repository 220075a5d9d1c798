//! Server configuration.
//!
//! Every flag can also be set through its environment variable; a flag on
//! the command line wins over the environment.

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "tidekv", version, about = "Key-value store with per-key TTL over HTTP")]
pub struct Config {
    /// Host to bind to
    #[arg(short = 'H', long, env = "TIDEKV_HOST", default_value = crate::DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "TIDEKV_PORT", default_value_t = crate::DEFAULT_PORT)]
    pub port: u16,

    /// redb database file. Without it every store lives in memory.
    #[arg(long, env = "TIDEKV_DB")]
    pub db: Option<PathBuf>,

    /// Most stores that requests may create
    #[arg(long, env = "TIDEKV_MAX_STORES", default_value_t = crate::storage::DEFAULT_MAX_STORES)]
    pub max_stores: usize,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, env = "TIDEKV_LOG", default_value = "info")]
    pub log_level: String,

    /// Do not print the startup banner
    #[arg(long)]
    pub quiet: bool,
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["tidekv"]).unwrap();
        assert_eq!(config.port, crate::DEFAULT_PORT);
        assert!(config.db.is_none());
        assert_eq!(config.max_stores, crate::storage::DEFAULT_MAX_STORES);
        assert!(!config.quiet);
    }

    #[test]
    fn test_flags() {
        let config = Config::try_parse_from([
            "tidekv", "-H", "0.0.0.0", "-p", "9000", "--db", "/tmp/kv.redb",
            "--max-stores", "8",
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:9000");
        assert_eq!(config.db, Some(PathBuf::from("/tmp/kv.redb")));
        assert_eq!(config.max_stores, 8);
    }

    #[test]
    fn test_invalid_port() {
        assert!(Config::try_parse_from(["tidekv", "--port", "http"]).is_err());
    }
}
