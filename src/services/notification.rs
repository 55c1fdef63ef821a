//! 通知列表与未读数
//!
//! 未读数以服务端为准，本地只做乐观翻转。被本地标记为已读、但服务端
//! 列表尚未反映的 id 记录在 `locally_read` 中，直到服务端确认为止，
//! 因此一次过期的列表响应不会把已读通知恢复成未读。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::models::notification::{Notification, UnreadCount};
use crate::models::response::ListShape;
use crate::services::gateway::ApiClient;

#[derive(Debug, Default)]
struct NotificationState {
    notifications: Vec<Notification>,
    unread_count: u64,
    loading: bool,
    locally_read: HashSet<i64>,
}

impl NotificationState {
    /// 用本地已读记录修正服务端列表，服务端已确认的 id 不再跟踪
    fn reconcile(&mut self, notifications: &mut [Notification]) {
        for notification in notifications.iter_mut() {
            if !self.locally_read.contains(&notification.id) {
                continue;
            }
            if notification.is_read {
                self.locally_read.remove(&notification.id);
            } else {
                notification.is_read = true;
            }
        }
    }

    /// 完整列表中已不存在的 id 不会再被服务端确认，停止跟踪
    fn forget_missing(&mut self, notifications: &[Notification]) {
        let present: HashSet<i64> = notifications.iter().map(|n| n.id).collect();
        self.locally_read.retain(|id| present.contains(id));
    }

    fn local_unread(&self) -> u64 {
        self.notifications.iter().filter(|n| !n.is_read).count() as u64
    }
}

#[derive(Clone)]
pub struct NotificationStore {
    client: ApiClient,
    state: Arc<RwLock<NotificationState>>,
}

impl NotificationStore {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            state: Arc::new(RwLock::new(NotificationState::default())),
        }
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.read().await.notifications.clone()
    }

    pub async fn unread_notifications(&self) -> Vec<Notification> {
        self.state
            .read()
            .await
            .notifications
            .iter()
            .filter(|n| !n.is_read)
            .cloned()
            .collect()
    }

    pub async fn unread_count(&self) -> u64 {
        self.state.read().await.unread_count
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }

    async fn fetch(&self, path: &str) -> Result<Vec<Notification>> {
        let body = self.client.get(path).await?;
        Ok(ListShape::<Notification>::from_value(body)?.into_items())
    }

    /// 用服务端列表替换整个序列
    pub async fn load_notifications(&self) -> Result<()> {
        self.state.write().await.loading = true;
        let result = self.fetch("/notifications").await;
        let mut state = self.state.write().await;
        state.loading = false;

        let mut notifications = result.map_err(|e| {
            error!("加载通知失败: {}", e);
            e
        })?;
        state.reconcile(&mut notifications);
        state.forget_missing(&notifications);
        debug!("Loaded {} notifications", notifications.len());
        state.notifications = notifications;
        drop(state);

        self.update_unread_count().await;
        Ok(())
    }

    /// 合并未读通知：只插入新的 id，按服务端顺序放到最前面
    pub async fn load_unread_notifications(&self) -> Result<()> {
        let mut unread = self.fetch("/notifications/unread").await.map_err(|e| {
            error!("加载未读通知失败: {}", e);
            e
        })?;

        let mut state = self.state.write().await;
        state.reconcile(&mut unread);
        let known: HashSet<i64> = state.notifications.iter().map(|n| n.id).collect();
        let mut seen = HashSet::new();
        let fresh: Vec<Notification> = unread
            .into_iter()
            .filter(|n| !known.contains(&n.id) && seen.insert(n.id))
            .collect();
        if !fresh.is_empty() {
            debug!("Merged {} new notifications", fresh.len());
            state.notifications.splice(0..0, fresh);
        }
        drop(state);

        self.update_unread_count().await;
        Ok(())
    }

    /// 从服务端刷新未读数，失败时只记录日志
    pub async fn update_unread_count(&self) {
        let count = match self.client.get::<UnreadCount>("/notifications/unread/count").await {
            Ok(body) => body.count,
            Err(e) => {
                warn!("更新未读数量失败: {}", e);
                return;
            }
        };

        let mut state = self.state.write().await;
        state.unread_count = if state.locally_read.is_empty() {
            count
        } else {
            // 服务端尚未反映本地已读时，不让计数回升
            count.min(state.local_unread())
        };
    }

    pub async fn mark_as_read(&self, notification_id: i64) -> Result<()> {
        let _: serde_json::Value = self
            .client
            .put_empty(&format!("/notifications/{}/read", notification_id))
            .await
            .map_err(|e| {
                error!("标记已读失败: {}", e);
                e
            })?;

        {
            let mut state = self.state.write().await;
            // 只跟踪本地列表里真正翻转过的通知
            let flipped = match state.notifications.iter_mut().find(|n| n.id == notification_id) {
                Some(n) if !n.is_read => {
                    n.is_read = true;
                    true
                }
                _ => false,
            };
            if flipped {
                state.locally_read.insert(notification_id);
            }
        }

        self.update_unread_count().await;
        Ok(())
    }

    /// 乐观更新：先本地全部置为已读并清零计数，失败时回滚
    pub async fn mark_all_as_read(&self) -> Result<()> {
        let (previous, previous_count, newly_read) = {
            let mut state = self.state.write().await;
            let previous = state.notifications.clone();
            let previous_count = state.unread_count;
            let mut newly_read = Vec::new();
            for n in state.notifications.iter_mut().filter(|n| !n.is_read) {
                n.is_read = true;
                newly_read.push(n.id);
            }
            state.locally_read.extend(newly_read.iter().copied());
            state.unread_count = 0;
            (previous, previous_count, newly_read)
        };

        if let Err(e) = self.client.put_empty::<serde_json::Value>("/notifications/read-all").await {
            error!("标记所有已读失败: {}", e);
            let mut state = self.state.write().await;
            state.notifications = previous;
            state.unread_count = previous_count;
            for id in &newly_read {
                state.locally_read.remove(id);
            }
            return Err(e);
        }

        info!("Marked {} notifications as read", newly_read.len());
        Ok(())
    }

    pub async fn clear_notifications(&self) {
        let mut state = self.state.write().await;
        state.notifications.clear();
        state.unread_count = 0;
        state.locally_read.clear();
    }

    /// 定时拉取未读通知，失败不会中断轮询
    pub fn spawn_polling(&self, period: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = store.load_unread_notifications().await {
                    debug!("Notification poll failed: {}", e);
                }
            }
        })
    }
}
