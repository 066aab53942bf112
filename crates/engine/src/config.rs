use std::env;
use std::path::PathBuf;

use thiserror::Error;

/// Tunables for the orchestration core. Every limit here exists to bound
/// what a single turn may consume: skills exposed to the model, parallel
/// tool executions, and planning iterations.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_skills_per_turn: usize,
    pub max_parallel_tools: usize,
    pub max_planning_steps: usize,
    pub dispatch_max_retries: u32,
    pub dispatch_backoff_base_ms: u64,
    pub dispatch_backoff_max_ms: u64,
    pub min_sample_conversions: u64,
    pub significance_alpha: f64,
    pub stream_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_skills_per_turn: 3,
            max_parallel_tools: 3,
            max_planning_steps: 10,
            dispatch_max_retries: 3,
            dispatch_backoff_base_ms: 250,
            dispatch_backoff_max_ms: 10_000,
            min_sample_conversions: 100,
            significance_alpha: 0.05,
            stream_channel_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_skills_per_turn: parse_usize_env(
                "ENGINE_MAX_SKILLS_PER_TURN",
                defaults.max_skills_per_turn,
            )?,
            max_parallel_tools: parse_usize_env(
                "ENGINE_MAX_PARALLEL_TOOLS",
                defaults.max_parallel_tools,
            )?,
            max_planning_steps: parse_usize_env(
                "ENGINE_MAX_PLANNING_STEPS",
                defaults.max_planning_steps,
            )?,
            dispatch_max_retries: parse_u32_env(
                "ENGINE_DISPATCH_MAX_RETRIES",
                defaults.dispatch_max_retries,
            )?,
            dispatch_backoff_base_ms: parse_u64_env(
                "ENGINE_DISPATCH_BACKOFF_BASE_MS",
                defaults.dispatch_backoff_base_ms,
            )?,
            dispatch_backoff_max_ms: parse_u64_env(
                "ENGINE_DISPATCH_BACKOFF_MAX_MS",
                defaults.dispatch_backoff_max_ms,
            )?,
            min_sample_conversions: parse_u64_env(
                "ENGINE_MIN_SAMPLE_CONVERSIONS",
                defaults.min_sample_conversions,
            )?,
            significance_alpha: parse_f64_env(
                "ENGINE_SIGNIFICANCE_ALPHA",
                defaults.significance_alpha,
            )?,
            stream_channel_capacity: parse_usize_env(
                "ENGINE_STREAM_CHANNEL_CAPACITY",
                defaults.stream_channel_capacity,
            )?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub migrations_dir: PathBuf,
    pub platform_rpc_base_url: String,
    pub platform_rpc_timeout_ms: u64,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: env::var("API_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            database_url: require_env("DATABASE_URL")?,
            database_max_connections: parse_u32_env("DATABASE_MAX_CONNECTIONS", 10)?,
            migrations_dir: env::var("MIGRATIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../db/migrations")
                }),
            platform_rpc_base_url: require_env("PLATFORM_RPC_BASE_URL")?,
            platform_rpc_timeout_ms: parse_u64_env("PLATFORM_RPC_TIMEOUT_MS", 10_000)?,
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid float in env var {0}")]
    ParseFloat(String),
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
}

fn parse_u32_env(key: &str, default: u32) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u32>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_u64_env(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_usize_env(key: &str, default: usize) -> Result<usize, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<usize>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_f64_env(key: &str, default: f64) -> Result<f64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<f64>()
            .map_err(|_| ConfigError::ParseFloat(key.to_string())),
        Err(_) => Ok(default),
    }
}
