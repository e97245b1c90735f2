use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Account created on startup when no user with `username` exists.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub admin: AdminConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).with_context(|| format!("{key} must be set"));
        let or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: or("JWT_ISSUER", "userdir"),
            audience: or("JWT_AUDIENCE", "userdir-users"),
            ttl_minutes: lookup("JWT_TTL_MINUTES")
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(8 * 60),
        };
        let admin = AdminConfig {
            username: or("ADMIN_USERNAME", "admin"),
            password: or("ADMIN_PASSWORD", "admin123"),
            email: or("ADMIN_EMAIL", "admin@system.com"),
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections: lookup("DB_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            host: or("APP_HOST", "0.0.0.0"),
            port: lookup("APP_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(4000),
            jwt,
            admin,
        })
    }
}
