use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context};

use crate::rate_limit::RateLimitConfig;

pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Process configuration gathered from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    /// Directory for the in-memory store's JSON snapshot; no persistence when unset.
    pub data_dir: Option<PathBuf>,
    pub media_dir: PathBuf,
    pub frontend_url: Option<String>,
    pub enable_hsts: bool,
    pub bootstrap_admins: Vec<String>,
    pub rate_limit: RateLimitConfig,
}

fn flag(name: &str) -> bool {
    env::var(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Comma separated list, blanks dropped.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if secret.len() < MIN_JWT_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters long");
        }
        Ok(Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url: env::var("DATABASE_URL").ok(),
            data_dir: env::var("BLOG_DATA_DIR").ok().map(PathBuf::from),
            media_dir: env::var("BLOG_MEDIA_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("media")),
            frontend_url: env::var("FRONTEND_URL").ok(),
            enable_hsts: flag("ENABLE_HSTS"),
            bootstrap_admins: env::var("BOOTSTRAP_ADMIN_USERNAMES").map(|v| parse_list(&v)).unwrap_or_default(),
            rate_limit: RateLimitConfig::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_parsing_skips_blanks() {
        assert_eq!(parse_list(" anna, ,boris,"), vec!["anna".to_string(), "boris".to_string()]);
        assert!(parse_list("").is_empty());
    }
}
