pub mod admin;
pub mod auth;
pub mod content;
pub mod export;
pub mod gateway;
pub mod interaction;
pub mod notification;
pub mod session;

// 重新导出常用类型
pub use admin::AdminService;
pub use auth::AuthService;
pub use content::ContentStore;
pub use export::{ExportFile, ExportFormat, ExportService};
pub use gateway::{ApiClient, UploadKind, UploadedFile};
pub use interaction::{InteractionWidget, WidgetState};
pub use notification::NotificationStore;
pub use session::{Session, SessionPhase, SessionSnapshot};
