// src/config.rs

use std::{env, fmt, net::SocketAddr};

use dotenvy::dotenv;

use crate::exam::DEFAULT_PASSING_SCORE;

#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string. `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub rust_log: String,
    pub listen_addr: SocketAddr,
    pub log_dir: String,
    /// Pass mark for certifications that do not set their own.
    pub default_passing_score: i32,
    /// Optional JSON question bank loaded at startup.
    pub seed_bank_path: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} must be set", key),
            ConfigError::Invalid(key, value) => write!(f, "{} has an invalid value: '{}'", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let listen_addr = match env::var("LISTEN_ADDR") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("LISTEN_ADDR", raw))?,
            Err(_) => SocketAddr::from(([0, 0, 0, 0], 3000)),
        };

        let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());

        let default_passing_score = match env::var("DEFAULT_PASSING_SCORE") {
            Ok(raw) => match raw.parse::<i32>() {
                Ok(score) if (0..=100).contains(&score) => score,
                _ => return Err(ConfigError::Invalid("DEFAULT_PASSING_SCORE", raw)),
            },
            Err(_) => DEFAULT_PASSING_SCORE,
        };

        let seed_bank_path = env::var("SEED_BANK_PATH").ok().filter(|v| !v.is_empty());

        Ok(Self {
            database_url,
            jwt_secret,
            rust_log,
            listen_addr,
            log_dir,
            default_passing_score,
            seed_bank_path,
        })
    }
}
