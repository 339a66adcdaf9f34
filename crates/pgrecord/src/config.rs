//! Connection configuration.

use crate::error::{DbError, DbResult};

/// Database connection settings.
///
/// Assemble programmatically with the builder setters, or read the
/// conventional `DB_*` environment keys with [`DbConfig::from_env`].
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub pool_size: usize,
}

impl DbConfig {
    pub fn new(user: &str, dbname: &str) -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: user.to_string(),
            password: String::new(),
            dbname: dbname.to_string(),
            pool_size: 16,
        }
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Read settings from the environment.
    ///
    /// `DB_USER` and `DB_NAME` are required; `DB_HOST`, `DB_PORT`, `DB_PASS`
    /// and `DB_POOL_SIZE` override the defaults when present. Missing
    /// required keys and unparsable numbers are [`DbError::Config`].
    pub fn from_env() -> DbResult<Self> {
        let user = require_env("DB_USER")?;
        let dbname = require_env("DB_NAME")?;
        let mut config = Self::new(&user, &dbname);

        if let Ok(host) = std::env::var("DB_HOST") {
            config.host = host;
        }
        if let Ok(password) = std::env::var("DB_PASS") {
            config.password = password;
        }
        if let Ok(port) = std::env::var("DB_PORT") {
            config.port = port
                .parse()
                .map_err(|_| DbError::config(format!("DB_PORT is not a port number: {port}")))?;
        }
        if let Ok(size) = std::env::var("DB_POOL_SIZE") {
            config.pool_size = size
                .parse()
                .map_err(|_| DbError::config(format!("DB_POOL_SIZE is not a number: {size}")))?;
        }
        Ok(config)
    }

    /// Assemble the driver configuration.
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.host)
            .port(self.port)
            .user(&self.user)
            .dbname(&self.dbname);
        if !self.password.is_empty() {
            pg.password(&self.password);
        }
        pg
    }

    /// Build a connection pool from these settings.
    #[cfg(feature = "pool")]
    pub fn create_pool(&self) -> DbResult<deadpool_postgres::Pool> {
        crate::pool::build_pool(self.pg_config(), self.pool_size)
    }
}

/// Build a pool from the environment.
///
/// Prefers `DATABASE_URL` when set, otherwise falls back to the `DB_*` keys
/// via [`DbConfig::from_env`].
#[cfg(feature = "pool")]
pub fn pool_from_env() -> DbResult<deadpool_postgres::Pool> {
    if let Ok(url) = std::env::var("DATABASE_URL") {
        return crate::pool::create_pool(&url);
    }
    DbConfig::from_env()?.create_pool()
}

fn require_env(key: &str) -> DbResult<String> {
    std::env::var(key).map_err(|_| DbError::config(format!("missing environment variable {key}")))
}
