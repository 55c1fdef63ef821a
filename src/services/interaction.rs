//! 延迟加载的互动组件
//!
//! 独立于主应用运行：自带 HTTP 客户端，从持久化存储的 `jwt_token` 键
//! 读取令牌，不参与会话管理，也不做 401 跳转。正文渲染完成后才挂载，
//! 所以爬虫只能看到结构化内容本身。

use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};
use validator::Validate;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::comment::{Comment, CreateCommentRequest, InteractionAction, InteractionStatus, ShareLink};
use crate::models::response::{decode, unwrap_envelope, ListShape};
use crate::routes::LOGIN_PATH;
use crate::utils::notice::Notifier;
use crate::utils::token_store::TokenStore;
use crate::utils::validation::validate_comment_text;

const LOGIN_PROMPT_TEMPLATE: &str = r#"<div class="interaction-login-prompt">
    <p>请登录后进行互动操作</p>
    <a href="{{login_url}}" class="btn-login">登录</a>
</div>"#;

const PANEL_TEMPLATE: &str = r#"<div class="interaction-panel">
    <div class="interaction-buttons">
        <button class="btn-interaction{{#if status.hasLiked}} active{{/if}}" data-action="like" data-content-id="{{content_id}}">
            <span class="icon">👍</span><span class="label">点赞</span><span class="count">{{status.likeCount}}</span>
        </button>
        <button class="btn-interaction{{#if status.hasFavorited}} active{{/if}}" data-action="favorite" data-content-id="{{content_id}}">
            <span class="icon">⭐</span><span class="label">收藏</span><span class="count">{{status.favoriteCount}}</span>
        </button>
        <button class="btn-interaction" data-action="share" data-content-id="{{content_id}}">
            <span class="icon">🔗</span><span class="label">分享</span>
        </button>
        <button class="btn-interaction" data-action="comment" data-content-id="{{content_id}}">
            <span class="icon">💬</span><span class="label">评论</span><span class="count">{{status.commentCount}}</span>
        </button>
    </div>
    {{#if share}}
    <div class="share-result">
        <p>分享链接已生成：</p>
        <input type="text" value="{{share.url}}" readonly id="share-url-input">
        <p class="share-html-note">HTML代码（带nofollow）：</p>
        <code>{{{share.html}}}</code>
    </div>
    {{/if}}
    {{#if comments_visible}}
    <div class="comment-section">
        <div class="comment-form">
            <textarea id="comment-input" placeholder="发表你的评论..." rows="3"></textarea>
            <button id="submit-comment" class="btn-submit-comment">发表评论</button>
        </div>
        <div class="comments-list">
        {{#each comments}}
            <div class="comment-item">
                <div class="comment-header">
                    <span class="comment-user">{{user}}</span>
                    <span class="comment-time">{{time}}</span>
                </div>
                <div class="comment-text">{{text}}</div>
            </div>
        {{else}}
            <p class="no-comments">暂无评论</p>
        {{/each}}
        </div>
    </div>
    {{/if}}
</div>"#;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelState {
    pub status: InteractionStatus,
    pub comments: Vec<Comment>,
    pub comments_visible: bool,
    pub share: Option<ShareLink>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WidgetState {
    Unmounted,
    /// 没有令牌
    LoginPrompt,
    Panel(PanelState),
    /// 状态加载失败，不显示任何控件
    Unavailable,
}

#[derive(Serialize)]
struct ContentIdQuery {
    #[serde(rename = "contentId")]
    content_id: i64,
}

#[derive(Serialize)]
struct CommentsQuery {
    #[serde(rename = "contentId")]
    content_id: i64,
    page: u32,
    size: u32,
}

pub struct InteractionWidget {
    http: Client,
    api_base_url: String,
    token: Option<String>,
    content_id: i64,
    comments_page_size: u32,
    notifier: Arc<dyn Notifier>,
    templates: Handlebars<'static>,
    state: WidgetState,
}

impl InteractionWidget {
    pub fn new(
        config: &Config,
        token_store: &dyn TokenStore,
        content_id: i64,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let token = token_store
            .get(&config.widget_token_key)?
            .filter(|token| !token.is_empty());

        let mut templates = Handlebars::new();
        templates.set_strict_mode(false);
        templates
            .register_template_string("login_prompt", LOGIN_PROMPT_TEMPLATE)
            .map_err(|e| AppError::Internal(format!("Invalid widget template: {}", e)))?;
        templates
            .register_template_string("panel", PANEL_TEMPLATE)
            .map_err(|e| AppError::Internal(format!("Invalid widget template: {}", e)))?;

        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token,
            content_id,
            comments_page_size: config.comments_page_size,
            notifier,
            templates,
            state: WidgetState::Unmounted,
        })
    }

    pub fn state(&self) -> &WidgetState {
        &self.state
    }

    pub fn content_id(&self) -> i64 {
        self.content_id
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn panel_mut(&mut self) -> Result<&mut PanelState> {
        match &mut self.state {
            WidgetState::Panel(panel) => Ok(panel),
            _ => Err(AppError::bad_request("interaction panel is not mounted")),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.api_base_url, path));
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(AppError::from_status(status, Some(&body)));
        }
        if body.get("success").and_then(Value::as_bool) == Some(false) {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request was not successful");
            return Err(AppError::bad_request(message));
        }
        decode(unwrap_envelope(body))
    }

    /// 挂载：无令牌显示登录提示，否则加载互动状态和评论
    pub async fn mount(&mut self) -> &WidgetState {
        if self.token.is_none() {
            debug!("No widget token, showing login prompt");
            self.state = WidgetState::LoginPrompt;
            return &self.state;
        }

        let query = ContentIdQuery { content_id: self.content_id };
        let builder = self.request(Method::GET, "/user/interact/status").query(&query);
        match self.send::<InteractionStatus>(builder).await {
            Ok(status) => {
                self.state = WidgetState::Panel(PanelState {
                    status,
                    ..PanelState::default()
                });
                self.load_comments().await;
            }
            Err(e) => {
                error!("Error loading interaction status: {}", e);
                self.state = WidgetState::Unavailable;
            }
        }
        &self.state
    }

    /// 点赞/收藏切换：未激活时 POST，激活时 DELETE；成功后本地计数 ±1
    pub async fn toggle(&mut self, action: InteractionAction) -> Result<bool> {
        let active = {
            let panel = self.panel_mut()?;
            match action {
                InteractionAction::Like => panel.status.has_liked,
                InteractionAction::Favorite => panel.status.has_favorited,
            }
        };

        let method = if active { Method::DELETE } else { Method::POST };
        let query = ContentIdQuery { content_id: self.content_id };
        let builder = self
            .request(method, &format!("/user/interact/{}", action))
            .query(&query);
        if let Err(e) = self.send::<Value>(builder).await {
            error!("Error performing interaction {}: {}", action, e);
            self.notifier.error("操作失败，请重试");
            return Err(e);
        }

        let panel = self.panel_mut()?;
        let (flag, count) = match action {
            InteractionAction::Like => (&mut panel.status.has_liked, &mut panel.status.like_count),
            InteractionAction::Favorite => {
                (&mut panel.status.has_favorited, &mut panel.status.favorite_count)
            }
        };
        *flag = !active;
        *count = if active { (*count - 1).max(0) } else { *count + 1 };
        Ok(!active)
    }

    /// 生成分享链接，HTML 片段带 rel="nofollow"
    pub async fn share(&mut self) -> Result<ShareLink> {
        self.panel_mut()?;
        let query = ContentIdQuery { content_id: self.content_id };
        let builder = self.request(Method::POST, "/user/share").query(&query);
        let link: ShareLink = match self.send(builder).await {
            Ok(link) => link,
            Err(e) => {
                error!("Error generating share link: {}", e);
                self.notifier.error("生成分享链接失败，请重试");
                return Err(e);
            }
        };
        if !link.is_nofollow() {
            warn!("Share snippet for content {} lacks rel=nofollow", self.content_id);
        }
        self.panel_mut()?.share = Some(link.clone());
        Ok(link)
    }

    pub fn toggle_comments(&mut self) -> Result<bool> {
        let panel = self.panel_mut()?;
        panel.comments_visible = !panel.comments_visible;
        Ok(panel.comments_visible)
    }

    /// 发表评论；内容为空时不发请求
    pub async fn submit_comment(&mut self, text: &str) -> Result<()> {
        self.panel_mut()?;
        let comment_text = match validate_comment_text(text) {
            Ok(text) => text,
            Err(e) => {
                self.notifier.warning(&e.user_message());
                return Err(e);
            }
        };

        let request = CreateCommentRequest {
            content_id: self.content_id,
            comment_text: comment_text.to_string(),
        };
        if let Err(e) = request.validate() {
            let e = AppError::from(e);
            self.notifier.warning(&e.user_message());
            return Err(e);
        }
        let builder = self.request(Method::POST, "/user/comments").json(&request);
        if let Err(e) = self.send::<Value>(builder).await {
            error!("Error submitting comment: {}", e);
            self.notifier.error("评论发表失败，请重试");
            return Err(e);
        }

        self.load_comments().await;
        self.panel_mut()?.status.comment_count += 1;
        self.notifier.success("评论发表成功");
        Ok(())
    }

    /// 重新加载第一页评论，失败只记录日志
    pub async fn load_comments(&mut self) {
        let query = CommentsQuery {
            content_id: self.content_id,
            page: 0,
            size: self.comments_page_size,
        };
        let builder = self.request(Method::GET, "/user/comments").query(&query);
        let comments = match self.send::<Value>(builder).await {
            Ok(body) => ListShape::<Comment>::from_value(body).map(ListShape::into_items),
            Err(e) => Err(e),
        };
        match comments {
            Ok(comments) => {
                if let WidgetState::Panel(panel) = &mut self.state {
                    panel.comments = comments;
                }
            }
            Err(e) => error!("Error loading comments: {}", e),
        }
    }

    pub fn render(&self) -> Result<String> {
        self.render_at(Utc::now())
    }

    pub fn render_at(&self, now: DateTime<Utc>) -> Result<String> {
        match &self.state {
            WidgetState::Unmounted | WidgetState::Unavailable => Ok(String::new()),
            WidgetState::LoginPrompt => Ok(self
                .templates
                .render("login_prompt", &json!({ "login_url": LOGIN_PATH }))?),
            WidgetState::Panel(panel) => {
                let comments: Vec<Value> = panel
                    .comments
                    .iter()
                    .map(|c| {
                        json!({
                            "user": c.user_email.as_deref().unwrap_or("用户"),
                            "time": c.created_at.map(|t| format_relative(t, now)).unwrap_or_default(),
                            "text": c.comment_text,
                        })
                    })
                    .collect();
                let share = panel.share.as_ref().map(|s| {
                    json!({
                        "url": s.share_url,
                        "html": ammonia::clean_text(&s.html_link),
                    })
                });
                let data = json!({
                    "content_id": self.content_id,
                    "status": panel.status,
                    "share": share,
                    "comments_visible": panel.comments_visible,
                    "comments": comments,
                });
                Ok(self.templates.render("panel", &data)?)
            }
        }
    }
}

/// 评论时间：刚刚 / N分钟前 / N小时前 / N天前 / 日期
pub fn format_relative(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now - at;
    let minutes = diff.num_minutes();
    let hours = diff.num_hours();
    let days = diff.num_days();
    if minutes < 1 {
        "刚刚".to_string()
    } else if minutes < 60 {
        format!("{}分钟前", minutes)
    } else if hours < 24 {
        format!("{}小时前", hours)
    } else if days < 7 {
        format!("{}天前", days)
    } else {
        at.format("%Y/%-m/%-d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::notice::{MemoryNotifier, NoticeLevel};
    use crate::utils::token_store::MemoryTokenStore;
    use chrono::{Duration, TimeZone};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn widget(server: &MockServer, token: Option<&str>) -> (InteractionWidget, Arc<MemoryNotifier>) {
        let store = match token {
            Some(token) => MemoryTokenStore::with_entry("jwt_token", token),
            None => MemoryTokenStore::new(),
        };
        let notifier = Arc::new(MemoryNotifier::new());
        let widget =
            InteractionWidget::new(&Config::with_base_url(server.uri()), &store, 42, notifier.clone())
                .unwrap();
        (widget, notifier)
    }

    async fn mount_status(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/user/interact/status"))
            .and(query_param("contentId", "42"))
            .and(header("Authorization", "Bearer jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"hasLiked": false, "hasFavorited": true, "likeCount": 3, "favoriteCount": 1, "commentCount": 0}
            })))
            .mount(server)
            .await;
    }

    async fn mount_comments(server: &MockServer, comments: Value) {
        Mock::given(method("GET"))
            .and(path("/user/comments"))
            .and(query_param("page", "0"))
            .and(query_param("size", "10"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": comments})),
            )
            .mount(server)
            .await;
    }

    fn panel(widget: &InteractionWidget) -> &PanelState {
        match widget.state() {
            WidgetState::Panel(panel) => panel,
            other => panic!("expected panel, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_without_token_shows_login_prompt() {
        let server = MockServer::start().await;
        let (mut widget, _) = widget(&server, None);
        assert_eq!(widget.mount().await, &WidgetState::LoginPrompt);

        let html = widget.render().unwrap();
        assert!(html.contains("请登录后进行互动操作"));
        assert!(html.contains("href=\"/login\""));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_like_post_then_delete() {
        let server = MockServer::start().await;
        mount_status(&server).await;
        mount_comments(&server, json!([])).await;
        Mock::given(method("POST"))
            .and(path("/user/interact/like"))
            .and(query_param("contentId", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/user/interact/like"))
            .and(query_param("contentId", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let (mut widget, _) = widget(&server, Some("jwt"));
        widget.mount().await;

        assert!(widget.toggle(InteractionAction::Like).await.unwrap());
        assert!(panel(&widget).status.has_liked);
        assert_eq!(panel(&widget).status.like_count, 4);

        assert!(!widget.toggle(InteractionAction::Like).await.unwrap());
        assert!(!panel(&widget).status.has_liked);
        assert_eq!(panel(&widget).status.like_count, 3);
    }

    #[tokio::test]
    async fn test_failed_toggle_keeps_state_and_notifies() {
        let server = MockServer::start().await;
        mount_status(&server).await;
        mount_comments(&server, json!([])).await;
        Mock::given(method("DELETE"))
            .and(path("/user/interact/favorite"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (mut widget, notifier) = widget(&server, Some("jwt"));
        widget.mount().await;
        assert!(widget.toggle(InteractionAction::Favorite).await.is_err());
        assert!(panel(&widget).status.has_favorited);
        assert_eq!(panel(&widget).status.favorite_count, 1);
        assert!(notifier.contains(NoticeLevel::Error, "操作失败，请重试"));
    }

    #[tokio::test]
    async fn test_empty_comment_makes_no_request() {
        let server = MockServer::start().await;
        mount_status(&server).await;
        mount_comments(&server, json!([])).await;
        Mock::given(method("POST"))
            .and(path("/user/comments"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (mut widget, notifier) = widget(&server, Some("jwt"));
        widget.mount().await;
        assert!(widget.submit_comment("   \n").await.is_err());
        assert!(notifier.contains(NoticeLevel::Warning, "请输入评论内容"));
    }

    #[tokio::test]
    async fn test_overlong_comment_makes_no_request() {
        let server = MockServer::start().await;
        mount_status(&server).await;
        mount_comments(&server, json!([])).await;
        Mock::given(method("POST"))
            .and(path("/user/comments"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (mut widget, notifier) = widget(&server, Some("jwt"));
        widget.mount().await;
        let err = widget.submit_comment(&"评".repeat(10_001)).await.unwrap_err();
        assert!(matches!(err, AppError::ValidatorError(_)));
        assert!(notifier.contains(NoticeLevel::Warning, "评论内容不能超过10000字"));
        assert_eq!(panel(&widget).status.comment_count, 0);
    }

    #[tokio::test]
    async fn test_submit_comment_reloads_and_increments() {
        let server = MockServer::start().await;
        mount_status(&server).await;
        mount_comments(
            &server,
            json!([{"id": 1, "contentId": 42, "commentText": "<b>不错</b>", "userEmail": "a@b.c"}]),
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/user/comments"))
            .and(body_json(json!({"contentId": 42, "commentText": "写得好"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let (mut widget, notifier) = widget(&server, Some("jwt"));
        widget.mount().await;
        widget.submit_comment("  写得好  ").await.unwrap();

        assert_eq!(panel(&widget).status.comment_count, 1);
        assert_eq!(panel(&widget).comments.len(), 1);
        assert!(notifier.contains(NoticeLevel::Success, "评论发表成功"));

        widget.toggle_comments().unwrap();
        let html = widget.render().unwrap();
        assert!(html.contains("&lt;b&gt;不错"));
        assert!(!html.contains("<b>"));
        assert!(html.contains("a@b.c"));
    }

    #[tokio::test]
    async fn test_share_snippet_is_escaped() {
        let server = MockServer::start().await;
        mount_status(&server).await;
        mount_comments(&server, json!([])).await;
        Mock::given(method("POST"))
            .and(path("/user/share"))
            .and(query_param("contentId", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "shareUrl": "http://localhost:8080/s/abc",
                    "htmlLink": "<a href=\"http://localhost:8080/s/abc\" rel=\"nofollow\">报告</a>"
                }
            })))
            .mount(&server)
            .await;

        let (mut widget, _) = widget(&server, Some("jwt"));
        widget.mount().await;
        let link = widget.share().await.unwrap();
        assert!(link.is_nofollow());

        let html = widget.render().unwrap();
        assert!(html.contains("http://localhost:8080/s/abc"));
        assert!(html.contains("rel&#61;&quot;nofollow&quot;"));
        assert!(!html.contains("<a href=\"http://localhost:8080/s/abc\""));
    }

    #[tokio::test]
    async fn test_status_failure_renders_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/interact/status"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (mut widget, notifier) = widget(&server, Some("jwt"));
        assert_eq!(widget.mount().await, &WidgetState::Unavailable);
        assert_eq!(widget.render().unwrap(), "");
        assert!(notifier.notices().is_empty());
        assert!(widget.toggle_comments().is_err());
    }

    #[test]
    fn test_format_relative() {
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
        assert_eq!(format_relative(now - Duration::seconds(30), now), "刚刚");
        assert_eq!(format_relative(now - Duration::minutes(5), now), "5分钟前");
        assert_eq!(format_relative(now - Duration::hours(3), now), "3小时前");
        assert_eq!(format_relative(now - Duration::days(2), now), "2天前");
        assert_eq!(format_relative(now - Duration::days(19), now), "2024/5/1");
    }
}
