//! 会话状态
//!
//! `Session` 是一个可克隆的句柄，内部是 `(token, user)` 对和初始化标记。
//! 只有两条修改路径：`AuthService` 的登录/登出/恢复，以及网关在收到 401
//! 时调用的 [`Session::expire`]。每次修改都会递增 `epoch`，网关只在
//! epoch 与发出请求时一致时才清空会话，因此一个后完成的登录不会被先前
//! 请求的 401 覆盖。

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::user::{User, UserStatus};
use crate::utils::token_store::TokenStore;

#[derive(Debug, Clone, Default)]
struct SessionState {
    token: Option<String>,
    user: Option<User>,
    initialized: bool,
    hydrating: bool,
    expired_by_server: bool,
    epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Anonymous,
    Hydrating,
    Authenticated,
    /// 服务端返回 401 后被清空
    ExpiredSession,
}

/// 某一时刻的会话快照，派生标记在生成快照时计算
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub token: Option<String>,
    pub user: Option<User>,
    pub initialized: bool,
    pub phase: SessionPhase,
    pub epoch: u64,
    pub is_authenticated: bool,
    pub is_admin: bool,
    pub is_main_admin: bool,
    pub is_normal_admin: bool,
    pub is_pending: bool,
    pub is_expired: bool,
    pub is_vip_valid: bool,
    pub admin_permissions: BTreeSet<String>,
}

impl SessionSnapshot {
    fn from_state(state: &SessionState, now: DateTime<Utc>) -> Self {
        let user = state.user.as_ref();
        let is_authenticated = state.token.is_some() && user.is_some();
        let phase = if state.hydrating {
            SessionPhase::Hydrating
        } else if is_authenticated {
            SessionPhase::Authenticated
        } else if state.expired_by_server {
            SessionPhase::ExpiredSession
        } else {
            SessionPhase::Anonymous
        };

        Self {
            token: state.token.clone(),
            user: state.user.clone(),
            initialized: state.initialized,
            phase,
            epoch: state.epoch,
            is_authenticated,
            is_admin: user.map_or(false, User::is_admin),
            is_main_admin: user.map_or(false, User::is_main_admin),
            is_normal_admin: user.map_or(false, User::is_normal_admin),
            is_pending: user.map_or(false, |u| u.status == UserStatus::Pending),
            is_expired: user.map_or(false, |u| u.status == UserStatus::Expired),
            is_vip_valid: user.map_or(false, |u| u.is_vip_valid_at(now)),
            admin_permissions: user.map(User::effective_permissions).unwrap_or_default(),
        }
    }

    /// 主管理员无条件拥有任意权限
    pub fn has_permission(&self, permission: &str) -> bool {
        if self.is_main_admin {
            return true;
        }
        self.admin_permissions.contains(permission)
    }

    pub fn user_status(&self) -> Option<UserStatus> {
        self.user.as_ref().map(|u| u.status)
    }

    pub fn vip_expire_at(&self) -> Option<DateTime<Utc>> {
        self.user.as_ref().and_then(|u| u.expires_at)
    }
}

#[derive(Clone)]
pub struct Session {
    state: Arc<RwLock<SessionState>>,
    store: Arc<dyn TokenStore>,
    token_key: String,
}

impl Session {
    /// 从持久化存储恢复令牌；用户信息从不持久化，需要重新获取
    pub fn new(store: Arc<dyn TokenStore>, token_key: impl Into<String>) -> Self {
        let token_key = token_key.into();
        let token = match store.get(&token_key) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!("Failed to read persisted token: {}", e);
                None
            }
        };

        Self {
            state: Arc::new(RwLock::new(SessionState {
                token,
                ..SessionState::default()
            })),
            store,
            token_key,
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_at(Utc::now()).await
    }

    pub async fn snapshot_at(&self, now: DateTime<Utc>) -> SessionSnapshot {
        let state = self.state.read().await;
        SessionSnapshot::from_state(&state, now)
    }

    /// 当前令牌及其所属的 epoch
    pub async fn bearer(&self) -> (Option<String>, u64) {
        let state = self.state.read().await;
        (state.token.clone(), state.epoch)
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.read().await.initialized
    }

    /// 登录成功：先持久化令牌，失败时不修改内存状态
    pub async fn set_auth(&self, user: User, token: String) -> Result<()> {
        let mut state = self.state.write().await;
        self.store.set(&self.token_key, &token)?;
        state.token = Some(token);
        state.user = Some(user);
        state.initialized = true;
        state.hydrating = false;
        state.expired_by_server = false;
        state.epoch += 1;
        debug!("Session authenticated (epoch {})", state.epoch);
        Ok(())
    }

    /// 进入恢复阶段，返回当前 epoch
    pub(crate) async fn begin_hydration(&self) -> u64 {
        let mut state = self.state.write().await;
        state.hydrating = true;
        state.epoch
    }

    /// 恢复成功；若期间会话已被其他操作修改则丢弃结果
    pub(crate) async fn finish_hydration(&self, user: User, epoch: u64) -> bool {
        let mut state = self.state.write().await;
        state.hydrating = false;
        state.initialized = true;
        if state.epoch != epoch {
            debug!("Discarding stale hydration result (epoch {} != {})", epoch, state.epoch);
            return false;
        }
        state.user = Some(user);
        state.epoch += 1;
        true
    }

    /// 恢复失败：清空会话并标记为已初始化的匿名状态
    pub(crate) async fn fail_hydration(&self, epoch: u64) {
        let mut state = self.state.write().await;
        if state.epoch == epoch {
            self.clear_locked(&mut state);
        }
        state.hydrating = false;
        state.initialized = true;
    }

    /// 刷新失败时清空；epoch 已变化则保留当前会话
    pub(crate) async fn clear_at(&self, epoch: u64) -> bool {
        let mut state = self.state.write().await;
        if state.epoch != epoch {
            return false;
        }
        self.clear_locked(&mut state);
        true
    }

    pub(crate) async fn mark_initialized(&self) {
        self.state.write().await.initialized = true;
    }

    /// 刷新用户信息
    pub(crate) async fn replace_user(&self, user: User, epoch: u64) -> bool {
        let mut state = self.state.write().await;
        if state.epoch != epoch || state.token.is_none() {
            return false;
        }
        state.user = Some(user);
        state.epoch += 1;
        true
    }

    /// 同时清空令牌和用户
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        self.clear_locked(&mut state);
        info!("Session cleared");
    }

    /// 401 处理：仅当 epoch 未变化时清空，返回是否清空
    pub async fn expire(&self, epoch: u64) -> bool {
        let mut state = self.state.write().await;
        if state.epoch != epoch {
            debug!(
                "Ignoring 401 from epoch {}, session already at epoch {}",
                epoch, state.epoch
            );
            return false;
        }
        self.clear_locked(&mut state);
        state.expired_by_server = true;
        warn!("Session expired by server");
        true
    }

    fn clear_locked(&self, state: &mut SessionState) {
        if let Err(e) = self.store.remove(&self.token_key) {
            warn!("Failed to remove persisted token: {}", e);
        }
        state.token = None;
        state.user = None;
        state.initialized = false;
        state.hydrating = false;
        state.expired_by_server = false;
        state.epoch += 1;
    }
}
