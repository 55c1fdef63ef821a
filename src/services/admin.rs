//! 管理后台：用户审核、内容审核、分类/标签/模板/数据源/系统配置
//!
//! 每个操作先在本地做权限判定，未授权时直接返回错误，不发请求。

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::content::{Content, ContentStatus, PageQuery};
use crate::models::response::{ListShape, Listing};
use crate::models::tag::{
    Category, CategoryRequest, CreateTagRequest, DataSource, DataSourceRequest, DataSourceUpdate,
    SchemaValidation, SchemaValidationRequest, SystemConfigEntry, Tag, Template, TemplateImport,
    TemplateRequest, TemplateUpdate,
};
use crate::models::user::{permissions, ApproveUserRequest, CreateAdminRequest, ExtendAccountRequest, User};
use crate::require_permission;
use crate::services::auth::AuthService;
use crate::services::content::ContentStore;
use crate::services::gateway::ApiClient;
use crate::utils::validation::{validate_days, validate_reject_reason};

#[derive(Serialize)]
struct RejectRequest<'a> {
    reason: &'a str,
}

#[derive(Serialize)]
struct UnpublishRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

#[derive(Serialize)]
struct PermissionsUpdate<'a> {
    permissions: &'a [String],
}

#[derive(Clone)]
pub struct AdminService {
    client: ApiClient,
    auth: AuthService,
    contents: ContentStore,
}

impl AdminService {
    pub fn new(client: ApiClient, auth: AuthService, contents: ContentStore) -> Self {
        Self { client, auth, contents }
    }

    async fn require_main_admin(&self) -> Result<()> {
        if !self.auth.snapshot().await.is_main_admin {
            warn!("Main admin required");
            return Err(AppError::forbidden("仅主管理员可执行此操作"));
        }
        Ok(())
    }

    async fn fetch_listing<T>(&self, path: &str, query: PageQuery) -> Result<Listing<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let body: Value = self.client.get_query(path, &query).await?;
        Ok(ListShape::from_value(body)?.into_listing(query.page, query.size))
    }

    // ==================== 用户管理 ====================

    pub async fn list_users(&self, query: PageQuery) -> Result<Listing<User>> {
        require_permission!(self.auth, permissions::USER_APPROVE);
        self.fetch_listing("/admin/users", query).await
    }

    pub async fn pending_users(&self) -> Result<Vec<User>> {
        require_permission!(self.auth, permissions::USER_APPROVE);
        let body: Value = self.client.get("/admin/users/pending").await?;
        Ok(ListShape::from_value(body)?.into_items())
    }

    pub async fn expiring_users(&self) -> Result<Vec<User>> {
        require_permission!(self.auth, permissions::USER_APPROVE);
        let body: Value = self.client.get("/admin/users/expiring").await?;
        Ok(ListShape::from_value(body)?.into_items())
    }

    pub async fn user_detail(&self, user_id: i64) -> Result<User> {
        require_permission!(self.auth, permissions::USER_APPROVE);
        self.client.get(&format!("/admin/users/{}", user_id)).await
    }

    pub async fn approve_user(&self, user_id: i64, valid_days: u32) -> Result<()> {
        require_permission!(self.auth, permissions::USER_APPROVE);
        validate_days(valid_days)?;
        let _: Value = self
            .client
            .post("/admin/users/approve", &ApproveUserRequest { user_id, valid_days })
            .await?;
        info!("User {} approved for {} days", user_id, valid_days);
        Ok(())
    }

    pub async fn extend_account(&self, user_id: i64, days: u32) -> Result<()> {
        require_permission!(self.auth, permissions::USER_APPROVE);
        validate_days(days)?;
        let _: Value = self
            .client
            .post("/admin/users/extend", &ExtendAccountRequest { user_id, days })
            .await?;
        info!("User {} extended by {} days", user_id, days);
        Ok(())
    }

    pub async fn delete_user(&self, user_id: i64) -> Result<()> {
        require_permission!(self.auth, permissions::USER_DELETE);
        let _: Value = self.client.delete(&format!("/admin/users/{}", user_id)).await?;
        info!("User {} deleted", user_id);
        Ok(())
    }

    pub async fn update_admin_permissions(&self, user_id: i64, granted: &[String]) -> Result<()> {
        self.require_main_admin().await?;
        if let Some(unknown) = granted.iter().find(|p| !permissions::ALL.contains(&p.as_str())) {
            return Err(AppError::validation(&format!("未知权限: {}", unknown)));
        }
        let _: Value = self
            .client
            .put(
                &format!("/admin/users/{}/permissions", user_id),
                &PermissionsUpdate { permissions: granted },
            )
            .await?;
        info!("Permissions of admin {} updated", user_id);
        Ok(())
    }

    pub async fn create_admin(&self, request: &CreateAdminRequest) -> Result<User> {
        self.require_main_admin().await?;
        self.client.post("/admin/users/create-admin", request).await
    }

    // ==================== 内容审核 ====================

    pub async fn review_queue(&self, query: PageQuery) -> Result<Listing<Content>> {
        require_permission!(self.auth, permissions::CONTENT_REVIEW);
        self.fetch_listing("/admin/content/review-queue", query).await
    }

    pub async fn all_contents(&self, query: PageQuery) -> Result<Listing<Content>> {
        require_permission!(self.auth, permissions::CONTENT_REVIEW);
        self.fetch_listing("/admin/content/all", query).await
    }

    pub async fn approve_content(&self, content_id: i64) -> Result<()> {
        require_permission!(self.auth, permissions::CONTENT_REVIEW);
        self.review(content_id, "approve", ContentStatus::Approved, None).await
    }

    pub async fn reject_content(&self, content_id: i64, reason: &str) -> Result<()> {
        require_permission!(self.auth, permissions::CONTENT_REVIEW);
        let reason = validate_reject_reason(reason)?;
        self.review(content_id, "reject", ContentStatus::Rejected, Some(reason))
            .await
    }

    /// 审核中的内容直接发布
    pub async fn direct_publish(&self, content_id: i64) -> Result<()> {
        require_permission!(self.auth, permissions::CONTENT_REVIEW);
        self.review(content_id, "publish", ContentStatus::Published, None).await
    }

    async fn review(
        &self,
        content_id: i64,
        action: &str,
        next: ContentStatus,
        reason: Option<&str>,
    ) -> Result<()> {
        self.contents.guard_transition(content_id, next).await?;
        let path = format!("/admin/content/{}/{}", content_id, action);
        let _: Value = match reason {
            Some(reason) => self.client.post(&path, &RejectRequest { reason }).await?,
            None => self.client.post_empty(&path).await?,
        };
        self.contents.apply_status(content_id, next).await;
        info!("Content {} -> {}", content_id, next);
        Ok(())
    }

    pub async fn unpublish_content(&self, content_id: i64, reason: Option<&str>) -> Result<()> {
        let snapshot = self.auth.snapshot().await;
        if !snapshot.has_permission(permissions::CONTENT_REVIEW)
            && !snapshot.has_permission(permissions::CONTENT_UNPUBLISH_OWN)
        {
            return Err(AppError::Authorization(format!(
                "Permission '{}' required",
                permissions::CONTENT_UNPUBLISH_OWN
            )));
        }
        let _: Value = self
            .client
            .post(
                &format!("/admin/content/{}/unpublish", content_id),
                &UnpublishRequest { reason },
            )
            .await?;
        self.contents.forget(content_id).await;
        info!("Content {} unpublished", content_id);
        Ok(())
    }

    pub async fn delete_content(&self, content_id: i64) -> Result<()> {
        require_permission!(self.auth, permissions::CONTENT_DELETE);
        let _: Value = self
            .client
            .delete(&format!("/admin/content/{}", content_id))
            .await?;
        self.contents.forget(content_id).await;
        Ok(())
    }

    pub async fn check_integrity(&self, content_id: i64) -> Result<Value> {
        require_permission!(self.auth, permissions::CONTENT_REVIEW);
        self.client
            .get(&format!("/admin/content/{}/integrity", content_id))
            .await
    }

    pub async fn review_statistics(&self) -> Result<Value> {
        require_permission!(self.auth, permissions::CONTENT_REVIEW);
        self.client.get("/admin/content/review-statistics").await
    }

    // ==================== 分类 ====================

    pub async fn categories(&self) -> Result<Vec<Category>> {
        self.client.get("/public/categories").await
    }

    pub async fn category_tree(&self) -> Result<Vec<Category>> {
        self.client.get("/public/categories/tree").await
    }

    pub async fn create_category(&self, request: &CategoryRequest) -> Result<Category> {
        require_permission!(self.auth, permissions::CATEGORY_MANAGE);
        request.validate()?;
        self.client.post("/admin/categories", request).await
    }

    pub async fn update_category(&self, category_id: i64, request: &CategoryRequest) -> Result<Category> {
        require_permission!(self.auth, permissions::CATEGORY_MANAGE);
        request.validate()?;
        self.client
            .put(&format!("/admin/categories/{}", category_id), request)
            .await
    }

    pub async fn delete_category(&self, category_id: i64) -> Result<()> {
        require_permission!(self.auth, permissions::CATEGORY_MANAGE);
        let _: Value = self
            .client
            .delete(&format!("/admin/categories/{}", category_id))
            .await?;
        Ok(())
    }

    // ==================== 标签 ====================

    pub async fn tags(&self) -> Result<Vec<Tag>> {
        self.client.get("/tags").await
    }

    pub async fn popular_tags(&self) -> Result<Vec<Tag>> {
        self.client.get("/tags/popular").await
    }

    pub async fn tag(&self, tag_id: i64) -> Result<Tag> {
        self.client.get(&format!("/tags/{}", tag_id)).await
    }

    pub async fn search_tags(&self, keyword: &str) -> Result<Vec<Tag>> {
        self.client.get_query("/tags/search", &[("keyword", keyword)]).await
    }

    // 后端没有标签更新接口，改名只能删除后重建
    pub async fn create_tag(&self, request: &CreateTagRequest) -> Result<Tag> {
        require_permission!(self.auth, permissions::TAG_MANAGE);
        request.validate()?;
        self.client.post("/tags", request).await
    }

    pub async fn delete_tag(&self, tag_id: i64) -> Result<()> {
        require_permission!(self.auth, permissions::TAG_MANAGE);
        let _: Value = self.client.delete(&format!("/tags/{}", tag_id)).await?;
        Ok(())
    }

    // ==================== 模板 ====================

    pub async fn templates(&self) -> Result<Vec<Template>> {
        self.client.get("/templates").await
    }

    pub async fn template(&self, template_id: i64) -> Result<Template> {
        self.client.get(&format!("/templates/{}", template_id)).await
    }

    pub async fn create_template(&self, request: &TemplateRequest) -> Result<Template> {
        require_permission!(self.auth, permissions::TEMPLATE_MANAGE);
        request.validate()?;
        let template: Template = self.client.post("/templates", request).await?;
        info!("Template {} created", template.id);
        Ok(template)
    }

    pub async fn update_template(&self, template_id: i64, update: &TemplateUpdate) -> Result<Template> {
        require_permission!(self.auth, permissions::TEMPLATE_MANAGE);
        self.client
            .put(&format!("/templates/{}", template_id), update)
            .await
    }

    /// 导出为 JSON 文本，可直接交给 `import_template`
    pub async fn export_template(&self, template_id: i64) -> Result<String> {
        require_permission!(self.auth, permissions::TEMPLATE_MANAGE);
        self.client
            .get(&format!("/templates/{}/export", template_id))
            .await
    }

    pub async fn import_template(&self, json_content: &str) -> Result<Template> {
        require_permission!(self.auth, permissions::TEMPLATE_MANAGE);
        if json_content.trim().is_empty() {
            return Err(AppError::validation("导入内容不能为空"));
        }
        self.client
            .post("/templates/import", &TemplateImport { json_content })
            .await
    }

    pub async fn validate_template_schema(
        &self,
        schema_definition: &str,
        schema_org_type: &str,
    ) -> Result<SchemaValidation> {
        require_permission!(self.auth, permissions::TEMPLATE_MANAGE);
        let result: SchemaValidation = self
            .client
            .post(
                "/templates/validate",
                &SchemaValidationRequest { schema_definition, schema_org_type },
            )
            .await?;
        if !result.valid {
            warn!("Schema validation failed: {:?}", result.errors);
        }
        Ok(result)
    }

    pub async fn delete_template(&self, template_id: i64) -> Result<()> {
        require_permission!(self.auth, permissions::TEMPLATE_MANAGE);
        let _: Value = self
            .client
            .delete(&format!("/templates/{}", template_id))
            .await?;
        Ok(())
    }

    // ==================== 数据源 ====================

    pub async fn data_sources(&self) -> Result<Vec<DataSource>> {
        require_permission!(self.auth, permissions::DATA_SOURCE_MANAGE);
        self.client.get("/admin/data-sources").await
    }

    pub async fn enabled_data_sources(&self) -> Result<Vec<DataSource>> {
        require_permission!(self.auth, permissions::DATA_SOURCE_MANAGE);
        self.client.get("/admin/data-sources/enabled").await
    }

    pub async fn data_source(&self, data_source_id: i64) -> Result<DataSource> {
        require_permission!(self.auth, permissions::DATA_SOURCE_MANAGE);
        self.client
            .get(&format!("/admin/data-sources/{}", data_source_id))
            .await
    }

    pub async fn create_data_source(&self, request: &DataSourceRequest) -> Result<DataSource> {
        require_permission!(self.auth, permissions::DATA_SOURCE_MANAGE);
        request.validate()?;
        let source: DataSource = self.client.post("/admin/data-sources", request).await?;
        info!("Data source {} created", source.id);
        Ok(source)
    }

    pub async fn update_data_source(
        &self,
        data_source_id: i64,
        update: &DataSourceUpdate,
    ) -> Result<DataSource> {
        require_permission!(self.auth, permissions::DATA_SOURCE_MANAGE);
        if matches!(update.fetch_interval, Some(interval) if interval < 1) {
            return Err(AppError::validation("抓取间隔至少为1分钟"));
        }
        self.client
            .put(&format!("/admin/data-sources/{}", data_source_id), update)
            .await
    }

    pub async fn toggle_data_source(&self, data_source_id: i64, enabled: bool) -> Result<DataSource> {
        require_permission!(self.auth, permissions::DATA_SOURCE_MANAGE);
        let source: DataSource = self
            .client
            .patch_query(
                &format!("/admin/data-sources/{}/toggle", data_source_id),
                &[("enabled", enabled)],
            )
            .await?;
        info!("Data source {} enabled={}", data_source_id, enabled);
        Ok(source)
    }

    /// 立即触发一次抓取，抓取本身在服务端异步执行
    pub async fn trigger_fetch(&self, data_source_id: i64) -> Result<()> {
        require_permission!(self.auth, permissions::DATA_SOURCE_MANAGE);
        let _: Value = self
            .client
            .post_empty(&format!("/admin/data-sources/{}/fetch", data_source_id))
            .await?;
        info!("Fetch triggered for data source {}", data_source_id);
        Ok(())
    }

    pub async fn delete_data_source(&self, data_source_id: i64) -> Result<()> {
        require_permission!(self.auth, permissions::DATA_SOURCE_MANAGE);
        let _: Value = self
            .client
            .delete(&format!("/admin/data-sources/{}", data_source_id))
            .await?;
        Ok(())
    }

    // ==================== 系统配置 ====================

    pub async fn system_config(&self) -> Result<Vec<SystemConfigEntry>> {
        require_permission!(self.auth, permissions::SYSTEM_SETTINGS);
        self.client.get("/admin/config").await
    }

    pub async fn update_system_config(&self, entries: &[SystemConfigEntry]) -> Result<()> {
        require_permission!(self.auth, permissions::SYSTEM_SETTINGS);
        let _: Value = self.client.put("/admin/config", entries).await?;
        info!("Updated {} system config entries", entries.len());
        Ok(())
    }
}
