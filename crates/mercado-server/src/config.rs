use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Duration;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub token_ttl: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("MERCADO_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MERCADO_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let db_path = lookup("MERCADO_DB_PATH")
            .unwrap_or_else(|| "mercado.db".into())
            .into();
        let host = lookup("MERCADO_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("MERCADO_PORT")
            .unwrap_or_else(|| "4000".into())
            .parse()
            .context("MERCADO_PORT must be a port number")?;
        let ttl_secs: i64 = lookup("MERCADO_TOKEN_TTL_SECS")
            .unwrap_or_else(|| "3600".into())
            .parse()
            .context("MERCADO_TOKEN_TTL_SECS must be a number of seconds")?;
        if ttl_secs <= 0 {
            bail!("MERCADO_TOKEN_TTL_SECS must be positive");
        }

        Ok(Self {
            jwt_secret,
            db_path,
            host,
            port,
            token_ttl: Duration::seconds(ttl_secs),
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let cfg = config(&[("MERCADO_JWT_SECRET", "s3cr3t")]).unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("mercado.db"));
        assert_eq!(cfg.addr().unwrap().to_string(), "0.0.0.0:4000");
        assert_eq!(cfg.token_ttl, Duration::hours(1));
    }

    #[test]
    fn missing_or_placeholder_secret_is_fatal() {
        assert!(config(&[]).is_err());
        assert!(config(&[("MERCADO_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn bad_numbers_are_reported() {
        assert!(config(&[("MERCADO_JWT_SECRET", "k"), ("MERCADO_PORT", "http")]).is_err());
        assert!(config(&[("MERCADO_JWT_SECRET", "k"), ("MERCADO_TOKEN_TTL_SECS", "0")]).is_err());
    }
}
