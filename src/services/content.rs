//! 内容缓存与创作流程
//!
//! 所有本地状态变更都在对应的接口调用成功之后才生效。

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::content::{
    Content, ContentRequest, ContentStatus, CopyrightInfo, MultiFormatOutput, PageQuery, Pagination,
};
use crate::models::response::{ListShape, Listing};
use crate::services::gateway::ApiClient;

pub type ContentList = Listing<Content>;

#[derive(Debug, Default)]
struct ContentState {
    contents: Vec<Content>,
    current: Option<Content>,
    pagination: Pagination,
    loading: bool,
}

#[derive(Clone)]
pub struct ContentStore {
    client: ApiClient,
    state: Arc<RwLock<ContentState>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldOrder<'a> {
    field_order: &'a [String],
}

#[derive(Serialize)]
struct SearchQuery<'a> {
    keyword: &'a str,
    page: u32,
    size: u32,
}

impl ContentStore {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            state: Arc::new(RwLock::new(ContentState::default())),
        }
    }

    // ---- 访问器 ----

    pub async fn contents(&self) -> Vec<Content> {
        self.state.read().await.contents.clone()
    }

    pub async fn current_content(&self) -> Option<Content> {
        self.state.read().await.current.clone()
    }

    pub async fn pagination(&self) -> Pagination {
        self.state.read().await.pagination
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }

    async fn set_loading(&self, loading: bool) {
        self.state.write().await.loading = loading;
    }

    // ---- 列表与详情 ----

    /// 加载已发布内容的一页（页码从 0 开始）
    pub async fn load_contents(&self, query: PageQuery) -> Result<Vec<Content>> {
        debug!("Loading contents page {} (size {})", query.page, query.size);
        self.set_loading(true).await;
        let result = self.client.get_query::<Value, _>("/public/contents", &query).await;
        self.set_loading(false).await;

        let body = result.map_err(|e| {
            error!("加载内容列表失败: {}", e);
            e
        })?;

        let shape = ListShape::<Content>::from_value(body)?;
        let mut state = self.state.write().await;
        match shape {
            ListShape::Paged(page) => {
                state.pagination = page.pagination(query.page, query.size);
                state.contents = page.content;
            }
            ListShape::Flat(items) => {
                warn!("Content list returned a flat array, keeping previous pagination");
                state.contents = items;
            }
        }
        Ok(state.contents.clone())
    }

    pub async fn load_content(&self, content_id: i64) -> Result<Content> {
        self.set_loading(true).await;
        let result = self.client.get::<Content>(&format!("/content/{}", content_id)).await;
        self.set_loading(false).await;

        let content = result.map_err(|e| {
            error!("加载内容详情失败: {}", e);
            e
        })?;
        self.state.write().await.current = Some(content.clone());
        Ok(content)
    }

    // ---- 创作 ----

    pub async fn create_content(&self, request: &ContentRequest) -> Result<Content> {
        request.validate()?;
        let content: Content = self.client.post("/content", request).await.map_err(|e| {
            error!("创建内容失败: {}", e);
            e
        })?;
        info!("Content {} created", content.id);
        Ok(content)
    }

    pub async fn update_content(&self, content_id: i64, request: &ContentRequest) -> Result<Content> {
        request.validate()?;
        let content: Content = self
            .client
            .put(&format!("/content/{}", content_id), request)
            .await
            .map_err(|e| {
                error!("更新内容失败: {}", e);
                e
            })?;

        let mut state = self.state.write().await;
        if state.current.as_ref().map(|c| c.id) == Some(content_id) {
            state.current = Some(content.clone());
        }
        Ok(content)
    }

    pub async fn submit_for_review(&self, content_id: i64) -> Result<()> {
        self.guard_transition(content_id, ContentStatus::PendingReview).await?;
        let _: Value = self
            .client
            .post_empty(&format!("/content/{}/submit", content_id))
            .await
            .map_err(|e| {
                error!("提交审核失败: {}", e);
                e
            })?;
        self.apply_status(content_id, ContentStatus::PendingReview).await;
        info!("Content {} submitted for review", content_id);
        Ok(())
    }

    pub async fn publish_content(&self, content_id: i64) -> Result<()> {
        self.guard_transition(content_id, ContentStatus::Published).await?;
        let _: Value = self
            .client
            .post_empty(&format!("/content/{}/publish", content_id))
            .await
            .map_err(|e| {
                error!("发布内容失败: {}", e);
                e
            })?;
        self.apply_status(content_id, ContentStatus::Published).await;
        info!("Content {} published", content_id);
        Ok(())
    }

    pub async fn delete_content(&self, content_id: i64) -> Result<()> {
        let _: Value = self.client.delete(&format!("/content/{}", content_id)).await?;

        let mut state = self.state.write().await;
        state.contents.retain(|c| c.id != content_id);
        if state.current.as_ref().map(|c| c.id) == Some(content_id) {
            state.current = None;
        }
        info!("Content {} deleted", content_id);
        Ok(())
    }

    pub async fn content_output(&self, content_id: i64) -> Result<MultiFormatOutput> {
        self.client.get(&format!("/content/{}/output", content_id)).await
    }

    pub async fn update_copyright(&self, content_id: i64, copyright: &CopyrightInfo) -> Result<()> {
        let _: Value = self
            .client
            .put(&format!("/content/{}/copyright", content_id), copyright)
            .await?;

        let mut state = self.state.write().await;
        if let Some(current) = state.current.as_mut().filter(|c| c.id == content_id) {
            current.copyright = copyright.clone();
        }
        Ok(())
    }

    pub async fn reorder_fields(&self, content_id: i64, field_order: &[String]) -> Result<()> {
        let _: Value = self
            .client
            .put(&format!("/content/{}/reorder", content_id), &FieldOrder { field_order })
            .await?;
        Ok(())
    }

    // ---- 我的内容 ----

    pub async fn my_contents(&self, query: PageQuery) -> Result<ContentList> {
        self.fetch_list("/content/my", &query, query).await
    }

    pub async fn my_drafts(&self, query: PageQuery) -> Result<ContentList> {
        self.fetch_list("/content/my/drafts", &query, query).await
    }

    pub async fn my_published(&self, query: PageQuery) -> Result<ContentList> {
        self.fetch_list("/content/my/published", &query, query).await
    }

    pub async fn my_pending(&self, query: PageQuery) -> Result<ContentList> {
        self.fetch_list("/content/my/pending", &query, query).await
    }

    pub async fn contents_by_category(&self, category_id: i64, query: PageQuery) -> Result<ContentList> {
        self.fetch_list(&format!("/public/contents/category/{}", category_id), &query, query)
            .await
    }

    pub async fn search_contents(&self, keyword: &str, query: PageQuery) -> Result<ContentList> {
        let params = SearchQuery {
            keyword,
            page: query.page,
            size: query.size,
        };
        self.fetch_list("/public/contents/search", &params, query).await
    }

    async fn fetch_list<Q: Serialize + ?Sized>(
        &self,
        path: &str,
        params: &Q,
        query: PageQuery,
    ) -> Result<ContentList> {
        let body: Value = self.client.get_query(path, params).await?;
        let listing = ListShape::from_value(body)?.into_listing(query.page, query.size);
        if listing.pagination.is_none() {
            warn!("{} returned a flat array", path);
        }
        Ok(listing)
    }

    // ---- 审核流转 ----

    /// 缓存中的详情与目标 id 相同时，按流转表校验
    pub(crate) async fn guard_transition(&self, content_id: i64, next: ContentStatus) -> Result<()> {
        let state = self.state.read().await;
        match state.current.as_ref() {
            Some(current) if current.id == content_id && !current.status.can_transition_to(next) => {
                warn!(
                    "Rejected transition {} -> {} for content {}",
                    current.status, next, content_id
                );
                Err(AppError::InvalidTransition {
                    from: current.status,
                    to: next,
                })
            }
            _ => Ok(()),
        }
    }

    pub(crate) async fn apply_status(&self, content_id: i64, status: ContentStatus) {
        let mut state = self.state.write().await;
        if let Some(current) = state.current.as_mut().filter(|c| c.id == content_id) {
            current.status = status;
        }
    }

    /// 下架不在流转表内，直接丢弃缓存的详情，下次重新加载
    pub(crate) async fn forget(&self, content_id: i64) {
        let mut state = self.state.write().await;
        if state.current.as_ref().map(|c| c.id) == Some(content_id) {
            state.current = None;
        }
    }

    pub async fn clear_current_content(&self) {
        self.state.write().await.current = None;
    }

    pub async fn clear_contents(&self) {
        let mut state = self.state.write().await;
        state.contents.clear();
        state.current = None;
        state.pagination = Pagination::default();
    }
}
