//! Application configuration

use std::env;

use crate::provider::ModelMap;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Authentication
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,

    // LLM gateway
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    pub model_map: ModelMap,
    /// Lowercase substrings that mark a model name as reasoning-capable
    pub reasoning_model_keywords: Vec<String>,

    // Usage accounting
    pub free_daily_limit: i32,
    pub token_cost_per_1k: f64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),

            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),

            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            jwt_expiry_hours: env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .unwrap_or(24),

            openrouter_api_key: env::var("OPENROUTER_API_KEY")
                .map_err(|_| ConfigError::Missing("OPENROUTER_API_KEY"))?,
            openrouter_base_url: env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string()),
            model_map: ModelMap::from_env_string(env::var("OPENROUTER_MODEL").ok().as_deref()),
            reasoning_model_keywords: env::var("REASONING_MODEL_KEYWORDS")
                .unwrap_or_else(|_| "reason,thinking,deepseek-r1".to_string())
                .split(',')
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),

            free_daily_limit: env::var("FREE_DAILY_LIMIT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            token_cost_per_1k: env::var("TOKEN_COST_PER_1K")
                .unwrap_or_else(|_| "0.002".to_string())
                .parse()
                .unwrap_or(0.002),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Config tests run serially (they modify shared env vars)
    static CONFIG_TEST_MUTEX: Mutex<()> = Mutex::new(());

    fn setup_minimal_config() {
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
        env::set_var("OPENROUTER_API_KEY", "sk-or-test");
    }

    fn cleanup_config() {
        env::remove_var("DATABASE_URL");
        env::remove_var("JWT_SECRET");
        env::remove_var("OPENROUTER_API_KEY");
        env::remove_var("REASONING_MODEL_KEYWORDS");
    }

    #[test]
    fn test_config_validation() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

        // Missing DATABASE_URL
        cleanup_config();
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));

        // Short JWT secret rejected
        setup_minimal_config();
        env::set_var("JWT_SECRET", "too-short");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::WeakSecret(_))
        ));

        // Valid config, defaults applied
        setup_minimal_config();
        let config = Config::from_env().unwrap_or_else(|e| panic!("config should load: {}", e));
        assert_eq!(config.free_daily_limit, 10);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(
            config.reasoning_model_keywords,
            vec!["reason", "thinking", "deepseek-r1"]
        );

        // Custom keyword list
        env::set_var("REASONING_MODEL_KEYWORDS", "R1, Chain ,,");
        let config = Config::from_env().unwrap_or_else(|e| panic!("config should load: {}", e));
        assert_eq!(config.reasoning_model_keywords, vec!["r1", "chain"]);

        cleanup_config();
    }
}
