use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use validator::Validate;

use super::user::deserialize_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentStatus {
    #[default]
    Draft,
    PendingReview,
    Approved,
    Rejected,
    Published,
}

impl ContentStatus {
    /// 审核流转表：
    /// DRAFT -> PENDING_REVIEW
    /// PENDING_REVIEW -> APPROVED | REJECTED | PUBLISHED
    /// APPROVED -> PUBLISHED
    pub fn can_transition_to(self, next: ContentStatus) -> bool {
        use ContentStatus::*;
        matches!(
            (self, next),
            (Draft, PendingReview)
                | (PendingReview, Approved)
                | (PendingReview, Rejected)
                | (PendingReview, Published)
                | (Approved, Published)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ContentStatus::Rejected | ContentStatus::Published)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentStatus::Draft => "DRAFT",
            ContentStatus::PendingReview => "PENDING_REVIEW",
            ContentStatus::Approved => "APPROVED",
            ContentStatus::Rejected => "REJECTED",
            ContentStatus::Published => "PUBLISHED",
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub template_id: Option<i64>,
    #[serde(default)]
    pub template_name: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub structured_data: Map<String, Value>,
    #[serde(default)]
    pub status: ContentStatus,
    #[serde(flatten)]
    pub copyright: CopyrightInfo,
    #[serde(default)]
    pub json_ld: Option<String>,
    #[serde(default)]
    pub reject_reason: Option<String>,
    #[serde(default)]
    pub like_count: Option<i64>,
    #[serde(default)]
    pub favorite_count: Option<i64>,
    #[serde(default)]
    pub comment_count: Option<i64>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
    #[serde(default)]
    pub tag_names: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub published_at: Option<DateTime<Utc>>,
}

/// 版权信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CopyrightInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright_notice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_original: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    pub template_id: i64,

    #[validate(length(min = 1, message = "标题不能为空"))]
    pub title: String,

    pub structured_data: Map<String, Value>,

    #[serde(flatten)]
    pub copyright: CopyrightInfo,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category_ids: Vec<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_names: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_order: Vec<String>,
}

/// 多格式输出
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MultiFormatOutput {
    #[serde(default)]
    pub json_ld: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub markdown: Option<String>,
}

/// 分页参数（页码从 0 开始）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageQuery {
    pub page: u32,
    pub size: u32,
}

impl PageQuery {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub size: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 0,
            size: 20,
            total: 0,
            total_pages: 0,
        }
    }
}
