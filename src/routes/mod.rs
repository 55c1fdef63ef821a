pub mod guard;
pub mod navigator;

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};
use url::Url;

use crate::error::{AppError, Result};
use crate::services::auth::AuthService;
use crate::utils::notice::Notifier;

pub use guard::{authorize, Decision};
pub use navigator::{HistoryNavigator, Navigator};

pub const HOME_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/login";
pub const ADMIN_LANDING_PATH: &str = "/admin/profile";

/// 导航目标（路径 + 查询参数）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn full_path(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }

    /// 解析站内地址，只接受以 `/` 开头的路径
    pub fn parse(target: &str) -> Result<Self> {
        if !target.starts_with('/') || target.starts_with("//") {
            return Err(AppError::RouteResolution(format!(
                "not an in-app path: {}",
                target
            )));
        }
        let url = Url::parse("http://app.local")?.join(target)?;
        Ok(Self {
            path: url.path().to_string(),
            query: url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteMeta {
    pub title: Option<&'static str>,
    pub guest: bool,
    pub requires_auth: bool,
    pub requires_admin: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RouteDef {
    pub name: &'static str,
    pub path: &'static str,
    pub meta: RouteMeta,
    pub redirect: Option<&'static str>,
}

const fn route(name: &'static str, path: &'static str, title: &'static str) -> RouteDef {
    RouteDef {
        name,
        path,
        meta: RouteMeta {
            title: Some(title),
            guest: false,
            requires_auth: false,
            requires_admin: false,
        },
        redirect: None,
    }
}

const fn guest(mut def: RouteDef) -> RouteDef {
    def.meta.guest = true;
    def
}

const fn auth(mut def: RouteDef) -> RouteDef {
    def.meta.requires_auth = true;
    def
}

const fn admin(mut def: RouteDef) -> RouteDef {
    def.meta.requires_auth = true;
    def.meta.requires_admin = true;
    def
}

/// 路由表；后台子路由继承 requires_auth
pub static ROUTES: Lazy<Vec<RouteDef>> = Lazy::new(|| {
    let mut admin_root = auth(route("admin", "/admin", "管理后台"));
    admin_root.redirect = Some(ADMIN_LANDING_PATH);

    vec![
        route("home", "/", "首页"),
        guest(route("login", LOGIN_PATH, "登录")),
        guest(route("register", "/register", "注册")),
        route("content-detail", "/content/:id", "内容详情"),
        auth(route("favorites", "/favorites", "我的收藏")),
        auth(route("my-content", "/my-content", "我的内容")),
        auth(route("notifications", "/notifications", "通知中心")),
        auth(route("editor", "/editor", "内容编辑器")),
        auth(route("editor-edit", "/editor/:id", "编辑内容")),
        admin_root,
        auth(route("admin-profile", ADMIN_LANDING_PATH, "个人信息")),
        auth(route("admin-my-contents", "/admin/my-contents", "内容管理")),
        admin(route("admin-users", "/admin/users", "用户管理")),
        auth(route("admin-editor", "/admin/editor", "写文章")),
        admin(route("admin-templates", "/admin/templates", "模板管理")),
        admin(route("admin-review", "/admin/review", "内容审核")),
        admin(route("admin-settings", "/admin/settings", "系统设置")),
        admin(route("admin-categories", "/admin/categories", "分类管理")),
        admin(route("admin-tags", "/admin/tags", "标签管理")),
        admin(route("admin-data-sources", "/admin/data-sources", "数据源管理")),
    ]
});

static NOT_FOUND: RouteDef = route("not-found", "/:pathMatch(.*)*", "页面未找到");

#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub def: RouteDef,
    pub location: Location,
    pub params: HashMap<String, String>,
}

fn match_pattern(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if pattern_segments.len() != path_segments.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (expected, actual) in pattern_segments.iter().zip(path_segments.iter()) {
        if let Some(name) = expected.strip_prefix(':') {
            params.insert(name.to_string(), actual.to_string());
        } else if expected != actual {
            return None;
        }
    }
    Some(params)
}

/// 解析目标地址，未匹配时落到 not-found；跟随路由自身的 redirect
pub fn resolve(target: &str) -> Result<ResolvedRoute> {
    let mut location = Location::parse(target)?;
    for _ in 0..4 {
        let found = ROUTES
            .iter()
            .find_map(|def| match_pattern(def.path, &location.path).map(|params| (*def, params)));
        match found {
            Some((def, params)) => match def.redirect {
                Some(next) => {
                    debug!("Route {} redirects to {}", def.name, next);
                    location = Location::parse(next)?;
                }
                None => return Ok(ResolvedRoute { def, location, params }),
            },
            None => {
                return Ok(ResolvedRoute {
                    def: NOT_FOUND,
                    location,
                    params: HashMap::new(),
                })
            }
        }
    }
    Err(AppError::RouteResolution(format!("redirect loop at {}", target)))
}

pub fn path_for(name: &str) -> Option<&'static str> {
    ROUTES.iter().find(|def| def.name == name).map(|def| def.path)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Arrived { route: &'static str, location: Location },
    Redirected { from: String, to: Location },
    Aborted { reason: String },
}

/// 导航分发：确保会话已恢复，解析路由，执行授权判定
#[derive(Clone)]
pub struct Router {
    auth: AuthService,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    app_title: String,
}

impl Router {
    pub fn new(
        auth: AuthService,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
        app_title: impl Into<String>,
    ) -> Self {
        Self {
            auth,
            navigator,
            notifier,
            app_title: app_title.into(),
        }
    }

    pub async fn navigate(&self, target: &str) -> NavigationOutcome {
        if let Err(e) = self.auth.initialize_auth().await {
            warn!("Session initialization failed before navigation: {}", e);
        }

        let resolved = match resolve(target) {
            Ok(resolved) => resolved,
            Err(e) => {
                error!("路由错误: {}", e);
                self.notifier.error("页面加载失败，请刷新重试");
                return NavigationOutcome::Aborted { reason: e.to_string() };
            }
        };

        // 标题在守卫之前设置，被重定向时也会先更新
        let title = match resolved.def.meta.title {
            Some(title) => format!("{} - {}", title, self.app_title),
            None => self.app_title.clone(),
        };
        self.navigator.set_title(&title);

        let session = self.auth.snapshot().await;
        let full_path = resolved.location.full_path();

        match authorize(&resolved.def.meta, &session, &full_path) {
            Decision::Proceed => {
                self.navigator.navigate_to(&resolved.location);
                NavigationOutcome::Arrived {
                    route: resolved.def.name,
                    location: resolved.location,
                }
            }
            Decision::Redirect { to, notice } => {
                if let Some(notice) = notice {
                    self.notifier.notify(notice);
                }
                debug!("Navigation to {} redirected to {}", full_path, to.full_path());
                self.navigator.navigate_to(&to);
                NavigationOutcome::Redirected { from: full_path, to }
            }
        }
    }
}
