use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::models::content::ContentStatus;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    /// 登录接口返回 401：账号或密码错误，不代表会话过期
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid content transition: {from} -> {to}")]
    InvalidTransition {
        from: ContentStatus,
        to: ContentStatus,
    },

    #[error("Route resolution error: {0}")]
    RouteResolution(String),

    #[error("Token store error: {0}")]
    TokenStore(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Render error: {0}")]
    Render(#[from] handlebars::RenderError),

    #[error("Validation error: {0}")]
    ValidatorError(#[from] validator::ValidationErrors),
}

/// 错误分类，决定调用方如何处理
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 401：由网关统一处理，清空会话并跳转登录
    Authorization,
    /// 业务/校验失败：交给调用的视图展示
    Business,
    /// 网络/传输失败：与业务失败同样向上传递
    Transport,
    /// 响应结构不符合预期
    MalformedResponse,
}

impl AppError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::Authentication(_) => ErrorCategory::Authorization,
            AppError::Request(_) | AppError::Io(_) => ErrorCategory::Transport,
            AppError::MalformedResponse(_) | AppError::Serialization(_) => {
                ErrorCategory::MalformedResponse
            }
            _ => ErrorCategory::Business,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AppError::Authentication(_))
    }

    /// 面向用户的提示文本
    pub fn user_message(&self) -> String {
        match self {
            AppError::Authentication(_) => "登录已过期，请重新登录".to_string(),
            AppError::Request(_) | AppError::Io(_) => "网络错误，请稍后重试".to_string(),
            AppError::Authorization(msg)
            | AppError::InvalidCredentials(msg)
            | AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::BadRequest(msg) => msg.clone(),
            AppError::Api { message, .. } => message.clone(),
            AppError::InvalidTransition { from, to } => {
                format!("当前状态 {} 不能变更为 {}", from, to)
            }
            AppError::ValidatorError(errors) => errors
                .field_errors()
                .values()
                .flat_map(|errs| errs.iter())
                .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| "输入内容不符合要求".to_string()),
            _ => "操作失败，请重试".to_string(),
        }
    }

    /// 将非 2xx 响应映射为错误，消息优先取响应体中的 error.message / message
    pub fn from_status(status: StatusCode, body: Option<&Value>) -> Self {
        let code = body
            .and_then(|b| b.get("error"))
            .and_then(|e| e.get("code"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let message = body
            .and_then(|b| {
                b.get("error")
                    .and_then(|e| e.get("message"))
                    .or_else(|| b.get("message"))
            })
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string()
            });

        match status {
            StatusCode::UNAUTHORIZED => AppError::Authentication(message),
            StatusCode::FORBIDDEN => AppError::Authorization(message),
            StatusCode::NOT_FOUND => AppError::NotFound(message),
            StatusCode::CONFLICT => AppError::Conflict(message),
            s if s.is_client_error() => AppError::BadRequest(message),
            s => AppError::Api {
                status: s.as_u16(),
                code,
                message,
            },
        }
    }
}

// 便利函数，用于创建常见错误
impl AppError {
    pub fn not_found(resource: &str) -> Self {
        Self::NotFound(format!("{} not found", resource))
    }

    pub fn unauthorized(msg: &str) -> Self {
        Self::Authentication(msg.to_string())
    }

    pub fn forbidden(msg: &str) -> Self {
        Self::Authorization(msg.to_string())
    }

    pub fn bad_request(msg: &str) -> Self {
        Self::BadRequest(msg.to_string())
    }

    pub fn internal(msg: &str) -> Self {
        Self::Internal(msg.to_string())
    }

    pub fn validation(msg: &str) -> Self {
        Self::Validation(msg.to_string())
    }

    pub fn malformed(msg: &str) -> Self {
        Self::MalformedResponse(msg.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
