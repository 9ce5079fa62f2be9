//! 错误定义模块

use thiserror::Error;

/// 审阅系统统一错误类型
#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("请求超时: {0}")]
    Timeout(String),

    #[error("非预期的响应状态: {method} {url} 期望 {expected}, 实际 {actual}")]
    UnexpectedStatus {
        method: String,
        url: String,
        expected: u16,
        actual: u16,
    },

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl ReviewError {
    /// 端点未发现或配置缺失
    pub fn is_config(&self) -> bool {
        matches!(self, ReviewError::Config(_))
    }

    /// 需要向用户展示的远端故障（网络、超时、状态码）
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            ReviewError::Network(_) | ReviewError::Timeout(_) | ReviewError::UnexpectedStatus { .. }
        )
    }
}

/// 审阅系统统一结果类型
pub type Result<T> = std::result::Result<T, ReviewError>;
