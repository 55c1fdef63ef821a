//! DataElf 内容平台客户端
//!
//! 会话与令牌持久化、带 401 处理的请求网关、路由守卫、内容审核流程、
//! 通知轮询以及文章页的延迟互动组件。

pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
