use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub wix: WixConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WixConfig {
    /// App id assigned by the Wix dev center.
    pub app_id: String,
    /// Shared secret used to verify instance tokens. Empty means
    /// verification always fails and all traffic is treated as anonymous.
    pub app_secret: String,
    /// Lets strict endpoints through without a credential. Ignored in
    /// production regardless of the env override.
    pub allow_unauthenticated: bool,
    /// How long a verified token stays in the verification cache.
    pub token_cache_ttl_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            self.database.acquire_timeout_secs =
                v.parse().unwrap_or(self.database.acquire_timeout_secs);
        }

        // Wix app overrides
        if let Ok(v) = env::var("WIX_APP_ID") {
            self.wix.app_id = v;
        }
        if let Ok(v) = env::var("WIX_APP_SECRET") {
            self.wix.app_secret = v;
        }
        if let Ok(v) = env::var("WIX_ALLOW_UNAUTHENTICATED") {
            self.wix.allow_unauthenticated = v.parse().unwrap_or(self.wix.allow_unauthenticated);
        }
        if let Ok(v) = env::var("WIX_TOKEN_CACHE_TTL_SECS") {
            self.wix.token_cache_ttl_secs =
                v.parse().unwrap_or(self.wix.token_cache_ttl_secs);
        }

        self
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                acquire_timeout_secs: 30,
            },
            wix: WixConfig {
                app_id: String::new(),
                app_secret: String::new(),
                allow_unauthenticated: true,
                token_cache_ttl_secs: 300,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                acquire_timeout_secs: 10,
            },
            wix: WixConfig {
                app_id: String::new(),
                app_secret: String::new(),
                allow_unauthenticated: false,
                token_cache_ttl_secs: 300,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                acquire_timeout_secs: 5,
            },
            wix: WixConfig {
                app_id: String::new(),
                app_secret: String::new(),
                allow_unauthenticated: false,
                token_cache_ttl_secs: 300,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(config.wix.allow_unauthenticated);
        assert!(!config.is_production());
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(!config.wix.allow_unauthenticated);
        assert!(config.is_production());
        assert_eq!(config.database.max_connections, 50);
    }
}
