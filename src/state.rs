use std::sync::Arc;

use crate::{
    config::Config,
    error::Result,
    routes::{Navigator, Router},
    services::{
        admin::AdminService,
        auth::AuthService,
        content::ContentStore,
        export::ExportService,
        gateway::ApiClient,
        interaction::InteractionWidget,
        notification::NotificationStore,
        session::Session,
    },
    utils::{notice::Notifier, token_store::TokenStore},
};

/// 应用程序的共享状态
/// 所有服务共用同一个会话与请求网关
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Config,

    /// 令牌持久化存储
    pub token_store: Arc<dyn TokenStore>,

    /// 会话
    pub session: Session,

    /// 请求网关
    pub client: ApiClient,

    /// 认证服务
    pub auth: AuthService,

    /// 内容
    pub contents: ContentStore,

    /// 通知
    pub notifications: NotificationStore,

    pub admin: AdminService,

    pub export: ExportService,

    /// 路由
    pub router: Router,

    pub notifier: Arc<dyn Notifier>,
    pub navigator: Arc<dyn Navigator>,
}

impl AppState {
    pub fn new(
        config: Config,
        token_store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let session = Session::new(token_store.clone(), config.token_key.clone());
        let client = ApiClient::new(&config, session.clone(), navigator.clone(), notifier.clone())?;

        let auth = AuthService::new(client.clone());
        let contents = ContentStore::new(client.clone());
        let notifications = NotificationStore::new(client.clone());
        let admin = AdminService::new(client.clone(), auth.clone(), contents.clone());
        let export = ExportService::new(client.clone());
        let router = Router::new(
            auth.clone(),
            navigator.clone(),
            notifier.clone(),
            config.app_title.clone(),
        );

        Ok(Self {
            config,
            token_store,
            session,
            client,
            auth,
            contents,
            notifications,
            admin,
            export,
            router,
            notifier,
            navigator,
        })
    }

    /// 文章页互动组件，每次挂载时读取最新的 `jwt_token`
    pub fn interaction_widget(&self, content_id: i64) -> Result<InteractionWidget> {
        InteractionWidget::new(
            &self.config,
            self.token_store.as_ref(),
            content_id,
            self.notifier.clone(),
        )
    }

    /// 检查是否为生产环境
    pub fn is_production(&self) -> bool {
        self.config.is_production()
    }

    /// 退出登录并清空本地缓存的内容与通知
    pub async fn sign_out(&self) {
        self.auth.logout().await;
        self.contents.clear_contents().await;
        self.contents.clear_current_content().await;
        self.notifications.clear_notifications().await;
    }
}
