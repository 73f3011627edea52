use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ai::AiSettings;
use crate::services::auth_service::MAX_TOKEN_TTL_HOURS;

/// Only for local development; startup logs a warning when it is in use.
const DEV_JWT_SECRET: &str = "photovault-development-secret-do-not-deploy";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub database_url: String,
    pub jwt_secret: String,
    /// True when no secret was configured and [`DEV_JWT_SECRET`] is in use.
    pub jwt_secret_is_default: bool,
    pub token_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub upload_dir: PathBuf,
    pub max_upload_mb: usize,
    pub log_dir: PathBuf,
    pub ai_api_key: Option<String>,
    pub ai_base_url: String,
    pub ai_model: String,
    pub ai_fallback_models: Vec<String>,
    pub ai_timeout_secs: u64,
    pub ai_proxy_url: Option<String>,
    pub auto_tag_on_upload: bool,
    pub tagging_queue_capacity: usize,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
pub struct PartialServerConfig {
    listen_addr: Option<String>,
    database_url: Option<String>,
    db_host: Option<String>,
    db_port: Option<u16>,
    db_user: Option<String>,
    db_password: Option<String>,
    db_name: Option<String>,
    jwt_secret: Option<String>,
    token_ttl_hours: Option<i64>,
    bcrypt_cost: Option<u32>,
    upload_dir: Option<String>,
    max_upload_mb: Option<usize>,
    log_dir: Option<String>,
    ai_api_key: Option<String>,
    ai_base_url: Option<String>,
    ai_model: Option<String>,
    /// Comma-separated model names.
    ai_fallback_models: Option<String>,
    ai_timeout_secs: Option<u64>,
    ai_proxy_url: Option<String>,
    auto_tag_on_upload: Option<bool>,
    tagging_queue_capacity: Option<usize>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_ai_base_url() -> String {
    "https://api-inference.modelscope.cn/v1".to_string()
}

fn default_ai_model() -> String {
    "Qwen/QVQ-72B-Preview".to_string()
}

fn default_fallback_models() -> Vec<String> {
    [
        "Qwen/Qwen2.5-7B-Instruct",
        "Qwen/Qwen2.5-Coder-32B-Instruct",
        "Qwen/Qwen2.5-14B-Instruct",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config: PartialServerConfig = if let Some(path_str) = config_path {
            let path = Path::new(path_str);
            if path.exists() {
                let contents = fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
                toml::from_str(&contents).map_err(|e| {
                    format!("Failed to parse TOML from config file at {path:?}: {e}")
                })?
            } else {
                PartialServerConfig::default()
            }
        } else {
            PartialServerConfig::default()
        };

        // 2. Load from environment variables
        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        // 3. Merge: environment overrides file
        Self::merge(file_config, env_config)
    }

    pub fn merge(file: PartialServerConfig, env: PartialServerConfig) -> Result<Self, String> {
        let database_url = match non_blank(env.database_url.or(file.database_url)) {
            Some(url) => url,
            None => {
                let host = env.db_host.or(file.db_host).unwrap_or_else(|| "localhost".into());
                let port = env.db_port.or(file.db_port).unwrap_or(5432);
                let user = env.db_user.or(file.db_user).unwrap_or_else(|| "postgres".into());
                let password = env.db_password.or(file.db_password).unwrap_or_default();
                let name = env.db_name.or(file.db_name).unwrap_or_else(|| "photovault".into());
                format!("postgres://{user}:{password}@{host}:{port}/{name}")
            }
        };

        let (jwt_secret, jwt_secret_is_default) =
            match non_blank(env.jwt_secret.or(file.jwt_secret)) {
                Some(secret) => (secret, false),
                None => (DEV_JWT_SECRET.to_string(), true),
            };

        let token_ttl_hours = env.token_ttl_hours.or(file.token_ttl_hours).unwrap_or(24);
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&token_ttl_hours) {
            return Err(format!(
                "TOKEN_TTL_HOURS must be between 1 and {MAX_TOKEN_TTL_HOURS}, got {token_ttl_hours}"
            ));
        }

        let ai_timeout_secs = env.ai_timeout_secs.or(file.ai_timeout_secs).unwrap_or(60);
        if ai_timeout_secs == 0 {
            return Err("AI_TIMEOUT_SECS must be at least 1".to_string());
        }

        let bcrypt_cost = env
            .bcrypt_cost
            .or(file.bcrypt_cost)
            .unwrap_or(bcrypt::DEFAULT_COST);
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(format!("BCRYPT_COST must be between 4 and 31, got {bcrypt_cost}"));
        }

        let ai_fallback_models = match env.ai_fallback_models.or(file.ai_fallback_models) {
            Some(list) => split_list(&list),
            None => default_fallback_models(),
        };

        Ok(ServerConfig {
            listen_addr: env
                .listen_addr
                .or(file.listen_addr)
                .unwrap_or_else(default_listen_addr),
            database_url,
            jwt_secret,
            jwt_secret_is_default,
            token_ttl_hours,
            bcrypt_cost,
            upload_dir: env
                .upload_dir
                .or(file.upload_dir)
                .unwrap_or_else(|| "uploads".into())
                .into(),
            max_upload_mb: env.max_upload_mb.or(file.max_upload_mb).unwrap_or(50),
            log_dir: env
                .log_dir
                .or(file.log_dir)
                .unwrap_or_else(|| "logs".into())
                .into(),
            ai_api_key: non_blank(env.ai_api_key.or(file.ai_api_key)),
            ai_base_url: non_blank(env.ai_base_url.or(file.ai_base_url))
                .unwrap_or_else(default_ai_base_url),
            ai_model: non_blank(env.ai_model.or(file.ai_model)).unwrap_or_else(default_ai_model),
            ai_fallback_models,
            ai_timeout_secs,
            ai_proxy_url: non_blank(env.ai_proxy_url.or(file.ai_proxy_url)),
            auto_tag_on_upload: env
                .auto_tag_on_upload
                .or(file.auto_tag_on_upload)
                .unwrap_or(false),
            tagging_queue_capacity: env
                .tagging_queue_capacity
                .or(file.tagging_queue_capacity)
                .unwrap_or(100),
        })
    }

    /// Model API settings, or `None` when no API key is configured.
    pub fn ai_settings(&self) -> Option<AiSettings> {
        let api_key = self.ai_api_key.clone()?;
        Some(AiSettings {
            api_key,
            base_url: self.ai_base_url.trim_end_matches('/').to_string(),
            model: self.ai_model.clone(),
            fallback_models: self.ai_fallback_models.clone(),
            timeout: Duration::from_secs(self.ai_timeout_secs),
            proxy_url: self.ai_proxy_url.clone(),
        })
    }
}
