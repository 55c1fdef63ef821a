use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;
use validator::Validate;

use super::user::deserialize_timestamp;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    pub content_id: i64,
    pub comment_text: String,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub content_id: i64,
    #[validate(length(min = 1, max = 10000, message = "评论内容不能超过10000字"))]
    pub comment_text: String,
}

/// 可切换的交互类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionAction {
    Like,
    Favorite,
}

impl InteractionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            InteractionAction::Like => "like",
            InteractionAction::Favorite => "favorite",
        }
    }
}

impl fmt::Display for InteractionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InteractionStatus {
    #[serde(default)]
    pub has_liked: bool,
    #[serde(default)]
    pub has_favorited: bool,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub favorite_count: i64,
    #[serde(default)]
    pub comment_count: i64,
}

/// 分享链接，htmlLink 带 rel="nofollow"
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    pub share_url: String,
    pub html_link: String,
    #[serde(default)]
    pub content_id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
}

impl ShareLink {
    pub fn is_nofollow(&self) -> bool {
        self.html_link.contains("rel=\"nofollow\"")
    }
}
