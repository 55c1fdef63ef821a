use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use validator::Validate;

use super::user::deserialize_timestamp;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub usage_count: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTagRequest {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub level: Option<i32>,
    #[serde(default)]
    pub sort_order: Option<i32>,
    #[serde(default)]
    pub content_count: Option<i64>,
    #[serde(default)]
    pub children: Vec<Category>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    #[validate(length(max = 500))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i32>,
}

/// 内容模板
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: i64,
    pub name: String,
    #[serde(default, rename = "type")]
    pub template_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub schema_definition: Option<String>,
    #[serde(default)]
    pub schema_org_type: Option<String>,
    #[serde(default)]
    pub is_system: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRequest {
    #[validate(length(min = 1, max = 100, message = "模板名称不能为空"))]
    pub name: String,
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "模板类型不能为空"))]
    pub template_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[validate(length(min = 1, message = "Schema定义不能为空"))]
    pub schema_definition: String,
    #[validate(length(min = 1, message = "Schema.org类型不能为空"))]
    pub schema_org_type: String,
}

/// 只发送需要修改的字段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub template_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_definition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_org_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateImport<'a> {
    pub json_content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaValidationRequest<'a> {
    pub schema_definition: &'a str,
    pub schema_org_type: &'a str,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaValidation {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceType {
    Rss,
    Html,
    Api,
    Json,
    Xml,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub id: i64,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub fetch_interval: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub last_fetch_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub next_fetch_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fetch_count: Option<i64>,
    #[serde(default)]
    pub success_count: Option<i64>,
    #[serde(default)]
    pub error_count: Option<i64>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub selector_config: Option<String>,
    #[serde(default)]
    pub cleaning_rules: Option<String>,
    #[serde(default)]
    pub template_mapping: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceRequest {
    #[validate(length(min = 1, max = 100, message = "数据源名称不能为空"))]
    pub name: String,
    #[validate(url(message = "数据源URL格式不正确"))]
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub source_type: SourceType,
    /// 抓取间隔，单位分钟
    #[validate(range(min = 1, message = "抓取间隔至少为1分钟"))]
    pub fetch_interval: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector_config: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleaning_rules: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_mapping: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_interval: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector_config: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleaning_rules: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_mapping: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfigEntry {
    pub config_key: String,
    #[serde(default)]
    pub config_value: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
