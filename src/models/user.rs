use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminType {
    MainAdmin,
    NormalAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UserStatus::Pending => "待审核",
            UserStatus::Approved => "已批准",
            UserStatus::Rejected => "已拒绝",
            UserStatus::Expired => "已过期",
        };
        f.write_str(text)
    }
}

/// 管理员权限标识
pub mod permissions {
    pub const USER_APPROVE: &str = "user_approve";
    pub const USER_DELETE: &str = "user_delete";
    pub const CONTENT_REVIEW: &str = "content_review";
    pub const CONTENT_DELETE: &str = "content_delete";
    pub const CONTENT_VIEW_OWN: &str = "content_view_own";
    pub const CONTENT_UNPUBLISH_OWN: &str = "content_unpublish_own";
    pub const TEMPLATE_MANAGE: &str = "template_manage";
    pub const TAG_MANAGE: &str = "tag_manage";
    pub const CATEGORY_MANAGE: &str = "category_manage";
    pub const DATA_SOURCE_MANAGE: &str = "data_source_manage";
    pub const SYSTEM_SETTINGS: &str = "system_settings";

    /// 主管理员拥有的全部权限
    pub const ALL: [&str; 11] = [
        USER_APPROVE,
        USER_DELETE,
        CONTENT_REVIEW,
        CONTENT_DELETE,
        CONTENT_VIEW_OWN,
        CONTENT_UNPUBLISH_OWN,
        TEMPLATE_MANAGE,
        TAG_MANAGE,
        CATEGORY_MANAGE,
        DATA_SOURCE_MANAGE,
        SYSTEM_SETTINGS,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub admin_type: Option<AdminType>,
    #[serde(default, deserialize_with = "deserialize_permissions")]
    pub admin_permissions: Vec<String>,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub approved_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    // 旧数据中主管理员的 adminType 可能为空
    pub fn is_main_admin(&self) -> bool {
        self.is_admin() && matches!(self.admin_type, Some(AdminType::MainAdmin) | None)
    }

    pub fn is_normal_admin(&self) -> bool {
        self.is_admin() && self.admin_type == Some(AdminType::NormalAdmin)
    }

    /// VIP 是否有效：已批准且未过期，没有过期时间表示永久
    pub fn is_vip_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.status != UserStatus::Approved {
            return false;
        }
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at > now,
        }
    }

    /// 有效权限集合
    pub fn effective_permissions(&self) -> BTreeSet<String> {
        if self.is_main_admin() {
            return permissions::ALL.iter().map(|p| p.to_string()).collect();
        }
        if self.is_normal_admin() {
            return self.admin_permissions.iter().cloned().collect();
        }
        BTreeSet::new()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        if self.is_main_admin() {
            return true;
        }
        self.effective_permissions().contains(permission)
    }

    pub fn remaining_days_at(&self, now: DateTime<Utc>) -> i64 {
        remaining_days(self.expires_at, now)
    }
}

/// 剩余天数（向上取整），没有过期时间或已过期时返回 0
pub fn remaining_days(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    let Some(expires_at) = expires_at else {
        return 0;
    };
    let millis = (expires_at - now).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;
    (millis + DAY_MS - 1) / DAY_MS
}

// adminPermissions 可能是 JSON 字符串，也可能是原生数组
fn deserialize_permissions<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        List(Vec<String>),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Raw::List(list)) => list,
        Some(Raw::Text(text)) if text.trim().is_empty() => Vec::new(),
        Some(Raw::Text(text)) => match serde_json::from_str::<Vec<String>>(&text) {
            Ok(list) => list,
            Err(e) => {
                tracing::error!("解析权限失败: {}", e);
                Vec::new()
            }
        },
    })
}

// 后端返回不带时区的 LocalDateTime，按 UTC 解释
pub(crate) fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(text) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^1[3-9]\d{9}$").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "邮箱格式无效"))]
    pub email: String,

    #[validate(length(min = 1, message = "密码不能为空"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "邮箱格式无效"))]
    pub email: String,

    #[validate(regex(path = "PHONE_REGEX", message = "手机号格式无效"))]
    pub phone: String,

    #[validate(
        length(min = 8, message = "密码强度不足，需要至少8个字符"),
        custom = "validate_password_strength"
    )]
    pub password: String,
}

fn validate_password_strength(password: &str) -> Result<(), validator::ValidationError> {
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if has_lower && has_upper && has_digit {
        Ok(())
    } else {
        let mut err = validator::ValidationError::new("password_strength");
        err.message = Some("密码强度不足，需要包含大小写字母和数字".into());
        Err(err)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveUserRequest {
    pub user_id: i64,
    pub valid_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendAccountRequest {
    pub user_id: i64,
    pub days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdminRequest {
    pub email: String,
    pub phone: String,
    pub password: String,
    pub permissions: Vec<String>,
}
