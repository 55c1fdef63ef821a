pub mod user;
pub mod content;
pub mod notification;
pub mod comment;
pub mod tag;
pub mod response;

// 重新导出常用类型
pub use user::{User, UserRole, AdminType, UserStatus, LoginRequest, RegisterRequest};
pub use content::{Content, ContentStatus, ContentRequest, CopyrightInfo, PageQuery, Pagination};
pub use notification::{Notification, NotificationType};
pub use comment::{Comment, InteractionAction, InteractionStatus, ShareLink};
pub use response::{ListShape, Listing, Page};
