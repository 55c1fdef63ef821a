use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dataelf_client::{
    config::Config,
    error::AppError,
    models::{comment::InteractionAction, user::LoginRequest},
    routes::{HistoryNavigator, NavigationOutcome},
    services::WidgetState,
    state::AppState,
    utils::{
        notice::{MemoryNotifier, NoticeLevel},
        token_store::{MemoryTokenStore, TokenStore},
    },
};

struct Harness {
    state: AppState,
    store: Arc<MemoryTokenStore>,
    navigator: Arc<HistoryNavigator>,
    notifier: Arc<MemoryNotifier>,
}

fn harness(server: &MockServer, store: MemoryTokenStore, start: &str) -> Harness {
    let store = Arc::new(store);
    let navigator = Arc::new(HistoryNavigator::new(start));
    let notifier = Arc::new(MemoryNotifier::new());
    let state = AppState::new(
        Config::with_base_url(server.uri()),
        store.clone(),
        navigator.clone(),
        notifier.clone(),
    )
    .unwrap();
    Harness {
        state,
        store,
        navigator,
        notifier,
    }
}

async fn mount_me(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"id": 9, "email": "bob@example.com", "status": "APPROVED"}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn login_persists_token_and_authenticates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "fresh-token",
            "user": {"id": 9, "status": "APPROVED"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, MemoryTokenStore::new(), "/login");
    let user = h
        .state
        .auth
        .login(LoginRequest {
            email: "bob@example.com".into(),
            password: "secret".into(),
        })
        .await
        .unwrap();

    assert_eq!(user.id, 9);
    assert_eq!(h.store.get("token").unwrap().as_deref(), Some("fresh-token"));
    let session = h.state.auth.snapshot().await;
    assert!(session.initialized && session.is_authenticated);
}

#[tokio::test]
async fn unauthorized_response_clears_session_and_goes_to_login() {
    let server = MockServer::start().await;
    mount_me(&server).await;
    Mock::given(method("GET"))
        .and(path("/notifications"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "token expired"})))
        .mount(&server)
        .await;

    let h = harness(&server, MemoryTokenStore::with_entry("token", "stale"), "/notifications");
    h.state.auth.initialize_auth().await.unwrap();
    assert!(h.state.auth.snapshot().await.is_authenticated);

    let err = h.state.notifications.load_notifications().await.unwrap_err();
    assert!(matches!(err, AppError::Authentication(_)));

    assert!(!h.state.auth.snapshot().await.is_authenticated);
    assert_eq!(h.store.get("token").unwrap(), None);
    assert_eq!(h.navigator.history().last().map(String::as_str), Some("/login"));
    assert!(h.notifier.contains(NoticeLevel::Error, "登录已过期，请重新登录"));
}

#[tokio::test]
async fn anonymous_user_is_sent_to_login_with_redirect() {
    let server = MockServer::start().await;
    let h = harness(&server, MemoryTokenStore::new(), "/");

    let outcome = h.state.router.navigate("/my-content").await;
    match outcome {
        NavigationOutcome::Redirected { from, to } => {
            assert_eq!(from, "/my-content");
            assert_eq!(to.path, "/login");
            assert_eq!(to.query_value("redirect"), Some("/my-content"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(h.notifier.contains(NoticeLevel::Warning, "请先登录"));
}

#[tokio::test]
async fn redirected_navigation_still_sets_requested_title() {
    let server = MockServer::start().await;
    let h = harness(&server, MemoryTokenStore::new(), "/");

    let outcome = h.state.router.navigate("/my-content").await;
    assert!(matches!(outcome, NavigationOutcome::Redirected { .. }));
    assert_eq!(h.navigator.title(), "我的内容 - 数流精灵");
    assert_eq!(h.navigator.history().last().map(String::as_str), Some("/login?redirect=%2Fmy-content"));
}

#[tokio::test]
async fn authenticated_user_reaches_protected_page() {
    let server = MockServer::start().await;
    mount_me(&server).await;

    let h = harness(&server, MemoryTokenStore::with_entry("token", "valid"), "/");
    let outcome = h.state.router.navigate("/my-content").await;
    assert!(matches!(
        outcome,
        NavigationOutcome::Arrived { route: "my-content", .. }
    ));
    assert_eq!(h.navigator.title(), "我的内容 - 数流精灵");
}

#[tokio::test]
async fn widget_like_toggle_uses_widget_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/interact/status"))
        .and(query_param("contentId", "42"))
        .and(header("Authorization", "Bearer widget-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hasLiked": false, "hasFavorited": false,
            "likeCount": 3, "favoriteCount": 1, "commentCount": 0
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/user/interact/like"))
        .and(query_param("contentId", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(
        &server,
        MemoryTokenStore::with_entry("jwt_token", "widget-token"),
        "/content/42",
    );
    let mut widget = h.state.interaction_widget(42).unwrap();
    widget.mount().await;

    assert!(widget.toggle(InteractionAction::Like).await.unwrap());
    match widget.state() {
        WidgetState::Panel(panel) => {
            assert!(panel.status.has_liked);
            assert_eq!(panel.status.like_count, 4);
        }
        other => panic!("unexpected widget state: {:?}", other),
    }
}

#[tokio::test]
async fn blank_comment_never_reaches_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/interact/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"likeCount": 0})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/user/comments"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, MemoryTokenStore::with_entry("jwt_token", "w"), "/content/42");
    let mut widget = h.state.interaction_widget(42).unwrap();
    widget.mount().await;

    let err = widget.submit_comment("   \n").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(h.notifier.contains(NoticeLevel::Warning, "请输入评论内容"));
}

#[tokio::test]
async fn stale_reload_after_mark_all_keeps_items_read() {
    let server = MockServer::start().await;
    mount_me(&server).await;
    Mock::given(method("GET"))
        .and(path("/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": [
            {"id": 1, "title": "审核通过", "isRead": false},
            {"id": 2, "title": "即将过期", "isRead": false}
        ]})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notifications/unread/count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "count": 2})))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/notifications/read-all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, MemoryTokenStore::with_entry("token", "t"), "/notifications");
    let notifications = &h.state.notifications;
    notifications.load_notifications().await.unwrap();
    assert_eq!(notifications.unread_count().await, 2);

    notifications.mark_all_as_read().await.unwrap();
    assert_eq!(notifications.unread_count().await, 0);

    notifications.load_notifications().await.unwrap();
    assert!(notifications.unread_notifications().await.is_empty());
    assert_eq!(notifications.unread_count().await, 0);
}

#[tokio::test]
async fn published_content_cannot_be_resubmitted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/content/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"id": 7, "title": "年度报告", "status": "PUBLISHED"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/content/7/submit"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, MemoryTokenStore::with_entry("token", "t"), "/my-content");
    h.state.contents.load_content(7).await.unwrap();

    let err = h.state.contents.submit_for_review(7).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));
}

#[tokio::test]
async fn sign_out_drops_cached_state() {
    let server = MockServer::start().await;
    mount_me(&server).await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let h = harness(&server, MemoryTokenStore::with_entry("token", "t"), "/");
    h.state.auth.initialize_auth().await.unwrap();
    h.state.sign_out().await;

    assert!(!h.state.auth.snapshot().await.is_authenticated);
    assert_eq!(h.store.get("token").unwrap(), None);
    assert!(h.state.contents.current_content().await.is_none());
    assert_eq!(h.state.notifications.unread_count().await, 0);
}
