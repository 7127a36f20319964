use std::{env, path::PathBuf, str::FromStr};

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub media: MediaConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub root: PathBuf,
    pub base_url: String,
}

/// Reads the service configuration from the process environment.
///
/// `init_env` should have run first so values from `.env` are visible.
pub fn load() -> Result<AppConfig> {
    Ok(AppConfig {
        server: ServerConfig {
            host: optional("SERVER_HOST", "0.0.0.0".to_string())?,
            port: optional("SERVER_PORT", 8000)?,
        },
        database: DatabaseConfig {
            url: required("DATABASE_URL")?,
            max_connections: optional("DATABASE_MAX_CONNECTIONS", 10)?,
        },
        auth: AuthConfig {
            jwt_secret: required("JWT_SECRET")?,
            access_ttl_minutes: optional("JWT_ACCESS_TTL_MINUTES", 60)?,
            refresh_ttl_days: optional("JWT_REFRESH_TTL_DAYS", 1)?,
        },
        media: MediaConfig {
            root: optional("MEDIA_ROOT", PathBuf::from("./media"))?,
            base_url: optional("MEDIA_URL", "/media".to_string())?,
        },
    })
}

fn required(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{name} must be set"))
}

fn optional<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}
