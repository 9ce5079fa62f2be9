//! 控制台配置
//!
//! 依次叠加可选的配置文件和 `REVIEW_` 前缀的环境变量，
//! 例如 `REVIEW_API__ROOT_URL`、`REVIEW_LOGGING__LEVEL`。

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use review_client::ClientConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 控制台完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// 远端服务配置
    #[serde(default)]
    pub api: ApiConfig,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 远端服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// 根资源地址
    #[serde(default = "default_root_url")]
    pub root_url: String,
    /// 请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 固定的 CSRF 令牌
    #[serde(default)]
    pub csrf_token: Option<String>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_root_url() -> String {
    "http://localhost:8000/api/".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            root_url: default_root_url(),
            timeout_secs: default_timeout_secs(),
            csrf_token: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ConsoleConfig {
    /// 加载配置，指定的文件必须存在
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("REVIEW")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: ConsoleConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.client_config()
            .validate()
            .context("Invalid api configuration")?;
        if self.logging.level.trim().is_empty() {
            anyhow::bail!("Log level cannot be empty");
        }
        Ok(())
    }

    /// 构造客户端配置
    pub fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new(self.api.root_url.clone())
            .with_timeout(Duration::from_secs(self.api.timeout_secs));
        if let Some(token) = &self.api.csrf_token {
            client = client.with_csrf_token(token.clone());
        }
        client
    }
}
