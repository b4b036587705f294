//! Service configuration for `rcaflow serve`.
//!
//! # Example
//!
//! ```toml
//! [server]
//! port = 8080
//!
//! [logging]
//! level = "info"
//! json = false
//!
//! [analysis]
//! provider = "anthropic"
//! model = "claude-sonnet-4-5"
//! max_tokens = 2048
//!
//! [[users]]
//! id = "0b6f4c1e-7a43-4d8e-9f65-2f1f3c9d2a10"
//! display_name = "Priya Natarajan"
//! role = "admin"
//! ```
//!
//! `RCAFLOW_PORT` and `RCAFLOW_LOG` override the file. The Anthropic key is
//! only ever read from `ANTHROPIC_API_KEY`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rcaflow_model::{AppUser, Role, UserId, UserStatus};
use serde::{Deserialize, Serialize};

/// File read when `--config` is not given. Absent means defaults.
pub const DEFAULT_CONFIG_FILE: &str = "rcaflow.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid {var}: '{value}'")]
    Env { var: &'static str, value: String },
}

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub analysis: AnalysisConfig,
    /// Seed directory. The auth collaborator owns identities; this only
    /// tells the engine who exists and who may own records.
    pub users: Vec<UserSeed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisProvider {
    #[default]
    Disabled,
    Anthropic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub provider: AnalysisProvider,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: AnalysisProvider::Disabled,
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 2048,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSeed {
    pub id: UserId,
    pub display_name: String,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default = "default_status")]
    pub status: UserStatus,
}

fn default_role() -> Role {
    Role::User
}

fn default_status() -> UserStatus {
    UserStatus::Active
}

impl From<&UserSeed> for AppUser {
    fn from(seed: &UserSeed) -> Self {
        AppUser {
            id: seed.id,
            display_name: seed.display_name.clone(),
            role: seed.role,
            status: seed.status,
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl Config {
    /// Load from `path`, or from [`DEFAULT_CONFIG_FILE`] if it exists, then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::read(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(
        &mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup("RCAFLOW_PORT") {
            self.server.port = value.parse().map_err(|_| ConfigError::Env {
                var: "RCAFLOW_PORT",
                value,
            })?;
        }
        if let Some(level) = lookup("RCAFLOW_LOG").filter(|l| !l.trim().is_empty()) {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Every problem with the configuration, or `Ok` if there are none.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be non-zero".to_string());
        }
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            errors.push(format!(
                "logging.level '{}' is not a valid filter directive",
                self.logging.level
            ));
        }
        if self.analysis.provider == AnalysisProvider::Anthropic {
            if self.analysis.model.trim().is_empty() {
                errors.push("analysis.model is required for the anthropic provider".to_string());
            }
            if self.analysis.max_tokens == 0 {
                errors.push("analysis.max_tokens must be non-zero".to_string());
            }
        }

        let mut seen = HashSet::new();
        for user in &self.users {
            if !seen.insert(user.id) {
                errors.push(format!("user {} is listed more than once", user.id));
            }
            if user.display_name.trim().is_empty() {
                errors.push(format!("user {} has a blank display_name", user.id));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn seed_users(&self) -> Vec<AppUser> {
        self.users.iter().map(AppUser::from).collect()
    }
}
