use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::response::decode;
use crate::models::user::{remaining_days, LoginRequest, RegisterRequest, User};
use crate::services::gateway::ApiClient;
use crate::services::session::{Session, SessionSnapshot};

/// 登录响应中令牌可能出现的位置，按顺序尝试
const TOKEN_POINTERS: [&str; 4] = ["/accessToken", "/token", "/data/accessToken", "/data/token"];
const USER_POINTERS: [&str; 2] = ["/user", "/data/user"];

/// 会话操作：登录、注册、登出、恢复与刷新
#[derive(Clone)]
pub struct AuthService {
    client: ApiClient,
    session: Session,
    init_lock: Arc<Mutex<()>>,
}

impl AuthService {
    pub fn new(client: ApiClient) -> Self {
        let session = client.session().clone();
        Self {
            client,
            session,
            init_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot().await
    }

    /// 从持久化令牌恢复会话，已初始化时直接返回
    pub async fn initialize_auth(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        if self.session.is_initialized().await {
            return Ok(());
        }

        let (token, _) = self.session.bearer().await;
        if token.is_none() {
            self.session.mark_initialized().await;
            return Ok(());
        }

        let epoch = self.session.begin_hydration().await;
        debug!("Hydrating session from persisted token");
        match self.client.get::<User>("/auth/me").await {
            Ok(user) => {
                let user_id = user.id;
                if self.session.finish_hydration(user, epoch).await {
                    info!("Session restored for user {}", user_id);
                }
                Ok(())
            }
            Err(e) => {
                warn!("Failed to restore session: {}", e);
                self.session.fail_hydration(epoch).await;
                Err(e)
            }
        }
    }

    pub async fn login(&self, request: LoginRequest) -> Result<User> {
        request.validate()?;

        let body: Value = self.client.post("/auth/login", &request).await.map_err(|e| {
            error!("Login failed: {}", e);
            e
        })?;
        let (token, user) = extract_login(&body)?;

        self.session.set_auth(user.clone(), token).await?;
        info!("User {} logged in", user.id);
        Ok(user)
    }

    /// 注册后账号处于待审核状态，不会建立会话
    pub async fn register(&self, request: RegisterRequest) -> Result<User> {
        request.validate()?;

        let body: Value = self.client.post("/auth/register", &request).await?;
        let user = match body.get("user") {
            Some(user) => user.clone(),
            None => body,
        };
        let user: User = decode(user)?;
        info!("Registered user {} ({})", user.id, user.status);
        Ok(user)
    }

    /// 远端登出失败不影响本地登出
    pub async fn logout(&self) {
        if let Err(e) = self.client.post_empty::<Value>("/auth/logout").await {
            warn!("Remote logout failed: {}", e);
        }
        self.session.clear().await;
        info!("User logged out");
    }

    /// 重新获取当前用户；失败时清空会话
    pub async fn refresh_user(&self) -> Option<User> {
        let (token, epoch) = self.session.bearer().await;
        token.as_ref()?;

        match self.client.get::<User>("/auth/me").await {
            Ok(user) => {
                if self.session.replace_user(user.clone(), epoch).await {
                    debug!("User {} refreshed", user.id);
                }
                Some(user)
            }
            Err(e) => {
                warn!("Failed to refresh user: {}", e);
                self.session.clear_at(epoch).await;
                None
            }
        }
    }

    pub async fn has_permission(&self, permission: &str) -> bool {
        self.session.snapshot().await.has_permission(permission)
    }

    pub async fn remaining_days(&self) -> i64 {
        remaining_days(self.session.snapshot().await.vip_expire_at(), Utc::now())
    }
}

// 权限检查的辅助宏，失败时在发出请求前返回
#[macro_export]
macro_rules! require_permission {
    ($auth_service:expr, $permission:expr) => {
        if !$auth_service.has_permission($permission).await {
            tracing::warn!("Permission '{}' denied", $permission);
            return Err($crate::error::AppError::Authorization(format!(
                "Permission '{}' required",
                $permission
            )));
        }
    };
}

fn extract_login(body: &Value) -> Result<(String, User)> {
    let token = TOKEN_POINTERS.iter().find_map(|pointer| {
        body.pointer(pointer)
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
    });
    let user = USER_POINTERS
        .iter()
        .find_map(|pointer| body.pointer(pointer).filter(|user| user.is_object()));

    match (token, user) {
        (Some(token), Some(user)) => Ok((token.to_string(), decode(user.clone())?)),
        (None, _) => Err(AppError::malformed("login response carries no token")),
        (Some(_), None) => Err(AppError::malformed("login response carries no user")),
    }
}
