//! Configuration for the taskview server

use anyhow::{Context, Result, bail};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::engine::MissingDueDate;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

/// How task views bucket dates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Offset of the calendar day used for today/overdue, in minutes east of UTC
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Length of the "upcoming" window after today
    #[serde(default = "default_upcoming_days")]
    pub upcoming_days: u32,

    #[serde(default)]
    pub missing_due_date: MissingDueDate,
}

/// Validated form of `ViewConfig`
#[derive(Debug, Clone, Copy)]
pub struct ViewSettings {
    pub offset: FixedOffset,
    pub upcoming_days: u32,
    pub missing_due_date: MissingDueDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Human-readable name for the token
    pub name: String,
    /// The hashed API token (argon2 hash, or plain text for backwards compat)
    pub token_hash: String,
    /// Member the token acts as
    pub member_id: String,
    /// Tenant the member belongs to
    pub company_id: String,
}

/// Who a request acts as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub member_id: String,
    pub company_id: String,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3030
}

fn default_db_path() -> PathBuf {
    PathBuf::from("taskview.sqlite")
}

/// Longest "upcoming" horizon accepted from config (about ten years)
pub const MAX_UPCOMING_DAYS: u32 = 3650;

fn default_upcoming_days() -> u32 {
    7
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            upcoming_days: default_upcoming_days(),
            missing_due_date: MissingDueDate::default(),
        }
    }
}

impl ViewConfig {
    pub fn settings(&self) -> Result<ViewSettings> {
        let offset = self
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .with_context(|| format!("Invalid utc_offset_minutes: {}", self.utc_offset_minutes))?;

        if self.upcoming_days == 0 {
            bail!("upcoming_days must be at least 1");
        }
        if self.upcoming_days > MAX_UPCOMING_DAYS {
            bail!(
                "upcoming_days must be at most {MAX_UPCOMING_DAYS}, got {}",
                self.upcoming_days
            );
        }

        Ok(ViewSettings {
            offset,
            upcoming_days: self.upcoming_days,
            missing_due_date: self.missing_due_date,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind: default_bind(),
                port: default_port(),
            },
            database: DatabaseConfig {
                path: default_db_path(),
            },
            view: ViewConfig::default(),
            tokens: Vec::new(),
        }
    }
}

impl Config {
    /// Default config path
    pub fn default_path() -> Result<PathBuf> {
        // Check environment variable first
        if let Ok(env_path) = std::env::var("TASKVIEW_CONFIG") {
            return Ok(PathBuf::from(env_path));
        }

        let local = PathBuf::from("config.toml");
        if local.exists() {
            return Ok(local);
        }

        // Docker default
        let data_config = PathBuf::from("/data/config.toml");
        if data_config.exists() {
            return Ok(data_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("taskview");

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from default path
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.view.settings()?;
        Ok(config)
    }

    /// Save config to specific path
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let with_comments = format!(
            "# taskview configuration\n\n\
             {}\n\n\
             # Add tokens with: taskview token --name <label> --member <id> --company <id>\n",
            content
        );

        std::fs::write(path, with_comments).context("Failed to write config file")?;

        Ok(())
    }

    /// Resolve a bearer token to the identity it was issued for
    pub fn identify(&self, token: &str) -> Option<Identity> {
        let argon2 = Argon2::default();

        self.tokens
            .iter()
            .find(|t| match PasswordHash::new(&t.token_hash) {
                Ok(parsed_hash) => argon2
                    .verify_password(token.as_bytes(), &parsed_hash)
                    .is_ok(),
                // Legacy plain-text token
                Err(_) => t.token_hash == token,
            })
            .map(|t| Identity {
                member_id: t.member_id.clone(),
                company_id: t.company_id.clone(),
            })
    }
}

/// Hash a token using argon2
pub fn hash_token(token: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(token.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash token: {}", e))?;
    Ok(hash.to_string())
}
