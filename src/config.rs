//! Environment-driven configuration for the in-process deployment.

use anyhow::{Context, Result};

use crate::store::DbKind;

#[derive(Debug, Clone)]
pub struct Config {
    pub worker_host: String,
    pub worker_port: u16,
    pub manager_host: String,
    pub manager_port: u16,
    /// Static worker list handed to the manager at construction.
    pub workers: Vec<String>,
    pub scheduler: String,
    pub db_kind: DbKind,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let worker_host =
            std::env::var("WORKER_HOST").unwrap_or_else(|_| "localhost".to_string());
        let worker_port = port_from_env("WORKER_PORT", 5556)?;
        let manager_host =
            std::env::var("MANAGER_HOST").unwrap_or_else(|_| "localhost".to_string());
        let manager_port = port_from_env("MANAGER_PORT", 5555)?;

        let workers = match std::env::var("WORKERS") {
            Ok(list) => list
                .split(',')
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty())
                .collect(),
            Err(_) => vec![format!("{worker_host}:{worker_port}")],
        };

        let scheduler =
            std::env::var("SCHEDULER").unwrap_or_else(|_| "roundrobin".to_string());
        let db_kind = DbKind::from_name(
            &std::env::var("DB_TYPE").unwrap_or_else(|_| "memory".to_string()),
        );

        Ok(Config {
            worker_host,
            worker_port,
            manager_host,
            manager_port,
            workers,
            scheduler,
            db_kind,
        })
    }
}

fn port_from_env(name: &str, default: u16) -> Result<u16> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{name} is not a valid port: {value}")),
        Err(_) => Ok(default),
    }
}
