//! REST 网关
//!
//! 所有请求都经过 [`ApiClient::dispatch`]：附加 Bearer 令牌，解包
//! `{success, data}` 信封，并在 401 时清空会话、跳转登录页。
//! 除 401 外不做任何全局处理，也不重试。

use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::response::{decode, unwrap_envelope};
use crate::routes::{Location, Navigator, LOGIN_PATH};
use crate::services::session::Session;
use crate::utils::notice::Notifier;

const LOGIN_ENDPOINT: &str = "/auth/login";

/// 上传类型，对应 `/upload/{kind}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Image,
    Video,
    File,
}

impl UploadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadKind::Image => "image",
            UploadKind::Video => "video",
            UploadKind::File => "file",
        }
    }
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub url: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// 二进制响应
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: Session,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    upload_timeout: Duration,
}

impl ApiClient {
    pub fn new(
        config: &Config,
        session: Session,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            session,
            navigator,
            notifier,
            upload_timeout: config.upload_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.http.request(method, url)
    }

    /// 发送请求；非 2xx 映射为错误，401 额外触发会话过期处理
    async fn dispatch(&self, builder: RequestBuilder) -> Result<Response> {
        let (token, epoch) = self.session.bearer().await;
        let builder = match token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            error!("Request failed: {}", e);
            AppError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let is_login = response.url().path().ends_with(LOGIN_ENDPOINT);
        let body = response.json::<Value>().await.ok();
        let err = AppError::from_status(status, body.as_ref());
        match err {
            // 登录失败不是会话过期，保留服务端的提示
            AppError::Authentication(message) if is_login => {
                debug!("Login rejected: {}", message);
                Err(AppError::InvalidCredentials(message))
            }
            AppError::Authentication(_) => {
                self.handle_unauthorized(epoch).await;
                Err(err)
            }
            err => {
                debug!("API returned {}", status);
                Err(err)
            }
        }
    }

    async fn handle_unauthorized(&self, epoch: u64) {
        if !self.session.expire(epoch).await {
            return;
        }
        // 避免重复跳转
        if self.navigator.current_path() != LOGIN_PATH {
            self.notifier.error("登录已过期，请重新登录");
            self.navigator.navigate_to(&Location::new(LOGIN_PATH));
        }
    }

    /// 发送请求并解包信封；空响应体视为 null
    async fn send_json(&self, builder: RequestBuilder) -> Result<Value> {
        let response = self.dispatch(builder).await?;
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::MalformedResponse(format!("invalid JSON body: {}", e)))?;
        Ok(unwrap_envelope(body))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        decode(self.send_json(self.request(Method::GET, path)).await?)
    }

    pub async fn get_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        decode(self.send_json(self.request(Method::GET, path).query(query)).await?)
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        decode(self.send_json(self.request(Method::POST, path).json(body)).await?)
    }

    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        decode(self.send_json(self.request(Method::POST, path)).await?)
    }

    pub async fn post_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        decode(self.send_json(self.request(Method::POST, path).query(query)).await?)
    }

    pub async fn patch_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        decode(self.send_json(self.request(Method::PATCH, path).query(query)).await?)
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        decode(self.send_json(self.request(Method::PUT, path).json(body)).await?)
    }

    pub async fn put_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        decode(self.send_json(self.request(Method::PUT, path)).await?)
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        decode(self.send_json(self.request(Method::DELETE, path)).await?)
    }

    pub async fn delete_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        decode(self.send_json(self.request(Method::DELETE, path).query(query)).await?)
    }

    /// 下载文件，保留服务端给出的类型和文件名
    pub async fn download(&self, path: &str) -> Result<Download> {
        let response = self.dispatch(self.request(Method::GET, path)).await?;
        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let file_name = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_file_name);
        let bytes = response.bytes().await?.to_vec();
        debug!("Downloaded {} bytes from {}", bytes.len(), path);

        Ok(Download {
            bytes,
            content_type,
            file_name,
        })
    }

    /// 以 multipart 上传文件，使用较长的上传超时
    pub async fn upload(&self, kind: UploadKind, file: &Path) -> Result<UploadedFile> {
        let bytes = tokio::fs::read(file).await?;
        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        debug!("Uploading {} ({} bytes) as {}", file_name, bytes.len(), kind);

        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));
        let builder = self
            .request(Method::POST, &format!("/upload/{}", kind))
            .timeout(self.upload_timeout)
            .multipart(form);
        decode(self.send_json(builder).await?)
    }

    pub async fn delete_upload(&self, url: &str) -> Result<()> {
        let _: Value = self.delete_query("/upload", &[("url", url)]).await?;
        Ok(())
    }
}

// attachment; filename="content-1.csv"
fn disposition_file_name(header: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|part| {
        let value = part.strip_prefix("filename=")?;
        let value = value.trim_matches('"');
        if value.is_empty() {
            warn!("Empty filename in Content-Disposition");
            return None;
        }
        Some(value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::User;
    use crate::routes::HistoryNavigator;
    use crate::utils::notice::{MemoryNotifier, NoticeLevel};
    use crate::utils::token_store::{MemoryTokenStore, TokenStore};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        client: ApiClient,
        session: Session,
        store: Arc<MemoryTokenStore>,
        navigator: Arc<HistoryNavigator>,
        notifier: Arc<MemoryNotifier>,
    }

    fn fixture(server: &MockServer, token: Option<&str>, current_path: &str) -> Fixture {
        let store = Arc::new(match token {
            Some(token) => MemoryTokenStore::with_entry("token", token),
            None => MemoryTokenStore::new(),
        });
        let session = Session::new(store.clone(), "token");
        let navigator = Arc::new(HistoryNavigator::new(current_path));
        let notifier = Arc::new(MemoryNotifier::new());
        let client = ApiClient::new(
            &Config::with_base_url(server.uri()),
            session.clone(),
            navigator.clone(),
            notifier.clone(),
        )
        .unwrap();
        Fixture { client, session, store, navigator, notifier }
    }

    #[tokio::test]
    async fn test_attaches_bearer_and_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .and(header("Authorization", "Bearer t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"id": 7, "status": "APPROVED"}
            })))
            .mount(&server)
            .await;

        let f = fixture(&server, Some("t1"), "/");
        let user: User = f.client.get("/auth/me").await.unwrap();
        assert_eq!(user.id, 7);
    }

    #[tokio::test]
    async fn test_body_without_data_is_returned_whole() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notifications/unread/count"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": true, "count": 3})),
            )
            .mount(&server)
            .await;

        let f = fixture(&server, None, "/");
        let body: Value = f.client.get("/notifications/unread/count").await.unwrap();
        assert_eq!(body["count"], 3);
    }

    #[tokio::test]
    async fn test_empty_body_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/notifications/read-all"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let f = fixture(&server, None, "/");
        let body: Value = f.client.put_empty("/notifications/read-all").await.unwrap();
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn test_unauthorized_clears_session_and_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/content/my"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let f = fixture(&server, Some("stale"), "/my-content");
        let err = f.client.get::<Value>("/content/my").await.unwrap_err();
        assert!(err.is_unauthorized());

        let snap = f.session.snapshot().await;
        assert!(snap.token.is_none());
        assert_eq!(f.store.get("token").unwrap(), None);
        assert_eq!(f.navigator.current_path(), LOGIN_PATH);
        assert!(f.notifier.contains(NoticeLevel::Error, "登录已过期，请重新登录"));
    }

    #[tokio::test]
    async fn test_unauthorized_on_login_page_does_not_navigate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notifications"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let f = fixture(&server, Some("t1"), LOGIN_PATH);
        let err = f.client.get::<Value>("/notifications").await.unwrap_err();
        assert_eq!(err.user_message(), "登录已过期，请重新登录");
        assert_eq!(f.session.snapshot().await.token, None);
        assert_eq!(f.navigator.history(), vec![LOGIN_PATH.to_string()]);
        assert!(f.notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_login_keeps_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "success": false,
                "message": "邮箱或密码错误"
            })))
            .mount(&server)
            .await;

        let f = fixture(&server, Some("t1"), "/");
        let err = f
            .client
            .post::<Value, _>("/auth/login", &json!({"email": "a@b.c", "password": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials(_)));
        assert_eq!(err.user_message(), "邮箱或密码错误");
        assert_eq!(f.session.snapshot().await.token.as_deref(), Some("t1"));
        assert_eq!(f.navigator.history(), vec!["/".to_string()]);
        assert!(f.notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_late_unauthorized_does_not_undo_newer_login() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/content/1"))
            .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;

        let f = fixture(&server, Some("old"), "/content/1");
        let fresh: User = serde_json::from_value(json!({"id": 1, "status": "APPROVED"})).unwrap();

        let (result, _) = tokio::join!(f.client.get::<Value>("/content/1"), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            f.session.set_auth(fresh, "new".into()).await.unwrap();
        });

        assert!(result.is_err());
        let snap = f.session.snapshot().await;
        assert!(snap.is_authenticated);
        assert_eq!(snap.token.as_deref(), Some("new"));
        assert_eq!(f.navigator.current_path(), "/content/1");
    }

    #[tokio::test]
    async fn test_other_errors_propagate_without_side_effects() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/content/9"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "success": false,
                "error": {"code": "FORBIDDEN", "message": "无权删除"}
            })))
            .mount(&server)
            .await;

        let f = fixture(&server, Some("t1"), "/my-content");
        let err = f.client.delete::<Value>("/content/9").await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(ref m) if m == "无权删除"));
        assert_eq!(f.session.snapshot().await.token.as_deref(), Some("t1"));
        assert!(f.notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_query_and_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/export/5/csv"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/csv")
                    .insert_header("Content-Disposition", "attachment; filename=\"content-5.csv\"")
                    .set_body_bytes(b"title\nhello\n".to_vec()),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/user/share"))
            .and(query_param("contentId", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"shareUrl": "http://x/s/5"}
            })))
            .mount(&server)
            .await;

        let f = fixture(&server, None, "/");
        let file = f.client.download("/export/5/csv").await.unwrap();
        assert_eq!(file.content_type.as_deref(), Some("text/csv"));
        assert_eq!(file.file_name.as_deref(), Some("content-5.csv"));
        assert_eq!(file.bytes, b"title\nhello\n");

        let share: Value = f.client.post_query("/user/share", &[("contentId", 5)]).await.unwrap();
        assert_eq!(share["shareUrl"], "http://x/s/5");
    }

    #[tokio::test]
    async fn test_upload_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/image"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"url": "/files/a.png", "fileName": "a.png", "size": 4}
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, b"\x89PNG").unwrap();

        let f = fixture(&server, Some("t1"), "/admin/editor");
        let uploaded = f.client.upload(UploadKind::Image, &file).await.unwrap();
        assert_eq!(uploaded.url, "/files/a.png");
    }

    #[test]
    fn test_disposition_file_name() {
        assert_eq!(
            disposition_file_name("attachment; filename=\"content-1.md\"").as_deref(),
            Some("content-1.md")
        );
        assert_eq!(disposition_file_name("inline"), None);
    }
}
