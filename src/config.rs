use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // API configuration
    pub api_base_url: String,
    pub site_base_url: String,
    pub environment: String,
    pub log_level: String,

    // Durable storage
    pub token_store_path: PathBuf,
    pub token_key: String,
    pub widget_token_key: String,

    // Timeouts (0 = no timeout)
    pub request_timeout_secs: u64,
    pub upload_timeout_secs: u64,

    // Pagination
    pub default_page_size: u32,
    pub comments_page_size: u32,

    // Presentation
    pub app_title: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            api_base_url: env::var("API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080/api".to_string()),
            site_base_url: env::var("SITE_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "dataelf_client=debug,reqwest=info".to_string()),

            token_store_path: env::var("TOKEN_STORE_PATH")
                .unwrap_or_else(|_| ".dataelf/storage.json".to_string())
                .into(),
            token_key: env::var("TOKEN_KEY").unwrap_or_else(|_| "token".to_string()),
            widget_token_key: env::var("WIDGET_TOKEN_KEY")
                .unwrap_or_else(|_| "jwt_token".to_string()),

            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()?,
            upload_timeout_secs: env::var("UPLOAD_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,

            default_page_size: env::var("DEFAULT_PAGE_SIZE")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            comments_page_size: env::var("COMMENTS_PAGE_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            app_title: env::var("APP_TITLE").unwrap_or_else(|_| "数流精灵".to_string()),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    /// 测试用：指向给定 API 根地址的默认配置
    pub fn with_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            site_base_url: "http://localhost:8080".to_string(),
            environment: "development".to_string(),
            log_level: "dataelf_client=debug,reqwest=info".to_string(),
            token_store_path: PathBuf::from(".dataelf/storage.json"),
            token_key: "token".to_string(),
            widget_token_key: "jwt_token".to_string(),
            request_timeout_secs: 0,
            upload_timeout_secs: 300,
            default_page_size: 20,
            comments_page_size: 10,
            app_title: "数流精灵".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let config = Config::default();
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.upload_timeout(), Duration::from_secs(300));
        assert!(config.is_development());
        assert!(!config.is_production());
    }

    #[test]
    fn test_with_base_url() {
        let config = Config::with_base_url("http://127.0.0.1:9999/api");
        assert_eq!(config.api_base_url, "http://127.0.0.1:9999/api");
        assert_eq!(config.token_key, "token");
    }
}
