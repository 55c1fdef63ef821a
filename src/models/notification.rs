use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use super::user::deserialize_timestamp;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    #[serde(default, rename = "type")]
    pub notification_type: NotificationType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub related_content_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    AccountApproved,
    AccountExpiring,
    AccountExtended,
    ContentApproved,
    ContentRejected,
    #[default]
    #[serde(other)]
    Other,
}

/// `/notifications/unread/count` 返回 `{success, count}`，没有 data 包装
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct UnreadCount {
    #[serde(default)]
    pub count: u64,
}
