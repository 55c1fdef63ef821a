use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dataelf_client::{
    config::Config,
    models::{content::PageQuery, user::LoginRequest},
    routes::{HistoryNavigator, NavigationOutcome, LOGIN_PATH},
    services::export::ExportFormat,
    state::AppState,
    utils::{
        notice::TracingNotifier,
        token_store::FileTokenStore,
        validation::validate_email_format,
    },
};

const USAGE: &str = "用法: dataelf-client <command>

  status                          查看当前会话
  login <email> <password>        登录并保存令牌
  logout                          退出登录
  navigate <path>                 按路由守卫解析并跳转
  notifications [--watch <secs>]  查看通知（可持续轮询）
  contents [page]                 公开内容列表
  export <id> <format> [dir]      导出内容 (jsonld|html|markdown|csv|word)
  widget <id>                     渲染文章页互动组件";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // 初始化日志，LOG_FORMAT=json 时输出结构化日志
    let json_logs = std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("LOG_LEVEL").unwrap_or_else(|_| "dataelf_client=debug,reqwest=info".into()),
        ))
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    // 加载配置
    let config = Config::from_env()?;
    info!("DataElf client ({}) -> {}", config.environment, config.api_base_url);

    let token_store = Arc::new(FileTokenStore::new(config.token_store_path.clone()));
    let state = AppState::new(
        config,
        token_store,
        Arc::new(HistoryNavigator::default()),
        Arc::new(TracingNotifier),
    )?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    match command.as_str() {
        "status" => status(&state).await,
        "login" => {
            let (email, password) = match (args.get(1), args.get(2)) {
                (Some(email), Some(password)) => (email.clone(), password.clone()),
                _ => bail!("login 需要 <email> <password>"),
            };
            validate_email_format(&email)?;
            let user = state.auth.login(LoginRequest { email, password }).await?;
            println!("登录成功: #{} ({})", user.id, user.status);
            Ok(())
        }
        "logout" => {
            state.sign_out().await;
            println!("已退出登录");
            Ok(())
        }
        "navigate" => {
            let target = args.get(1).map(String::as_str).unwrap_or("/");
            match state.router.navigate(target).await {
                NavigationOutcome::Arrived { route, location } => {
                    println!("{} -> {}", route, location.full_path());
                }
                NavigationOutcome::Redirected { from, to } => {
                    println!("{} 重定向到 {}", from, to.full_path());
                }
                NavigationOutcome::Aborted { reason } => bail!("导航失败: {}", reason),
            }
            Ok(())
        }
        "notifications" => notifications(&state, &args[1..]).await,
        "contents" => {
            let page = match args.get(1) {
                Some(page) => page.parse().context("页码必须是数字")?,
                None => 0,
            };
            let contents = state
                .contents
                .load_contents(PageQuery::new(page, state.config.default_page_size))
                .await?;
            let pagination = state.contents.pagination().await;
            for content in &contents {
                println!("#{:<6} [{}] {}", content.id, content.status, content.title);
            }
            println!(
                "第 {}/{} 页，共 {} 条",
                pagination.page + 1,
                pagination.total_pages.max(1),
                pagination.total
            );
            Ok(())
        }
        "export" => {
            let (id, format) = match (args.get(1), args.get(2)) {
                (Some(id), Some(format)) => (
                    id.parse::<i64>().context("内容ID必须是数字")?,
                    format.parse::<ExportFormat>()?,
                ),
                _ => bail!("export 需要 <id> <format>"),
            };
            let dir = args.get(3).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
            if let Err(e) = state.auth.initialize_auth().await {
                warn!("Exporting without a session: {}", e);
            }
            let file = state.export.download(id, format).await?;
            let saved = file.save_to(&dir).await?;
            println!("已导出 {}", saved.display());
            Ok(())
        }
        "widget" => {
            let id = args
                .get(1)
                .ok_or_else(|| anyhow!("widget 需要 <id>"))?
                .parse::<i64>()
                .context("内容ID必须是数字")?;
            let mut widget = state.interaction_widget(id)?;
            widget.mount().await;
            println!("{}", widget.render()?);
            Ok(())
        }
        other => {
            error!("Unknown command: {}", other);
            println!("{}", USAGE);
            bail!("未知命令: {}", other)
        }
    }
}

async fn status(state: &AppState) -> anyhow::Result<()> {
    state.auth.initialize_auth().await?;
    let session = state.auth.snapshot().await;
    match &session.user {
        Some(user) if session.is_authenticated => {
            println!(
                "已登录: #{} {} [{}]",
                user.id,
                user.nickname.as_deref().or(user.email.as_deref()).unwrap_or("-"),
                user.status
            );
            if session.is_admin {
                println!(
                    "管理员 ({}): {}",
                    if session.is_main_admin { "主管理员" } else { "普通管理员" },
                    session.admin_permissions.iter().cloned().collect::<Vec<_>>().join(", ")
                );
            }
            println!("剩余天数: {}", state.auth.remaining_days().await);
        }
        _ => println!("未登录，请访问 {}", LOGIN_PATH),
    }
    Ok(())
}

async fn notifications(state: &AppState, args: &[String]) -> anyhow::Result<()> {
    state.auth.initialize_auth().await?;
    state.notifications.load_notifications().await?;
    for notification in state.notifications.notifications().await {
        println!(
            "{} #{} {} {}",
            if notification.is_read { " " } else { "*" },
            notification.id,
            notification.title,
            notification.message
        );
    }
    println!("未读: {}", state.notifications.unread_count().await);

    if args.first().map(String::as_str) == Some("--watch") {
        let secs = match args.get(1) {
            Some(secs) => secs.parse().context("轮询间隔必须是秒数")?,
            None => 30,
        };
        let handle = state.notifications.spawn_polling(Duration::from_secs(secs));
        info!("Polling unread notifications every {}s, Ctrl-C to stop", secs);
        tokio::signal::ctrl_c().await?;
        handle.abort();
    }
    Ok(())
}
