pub mod notice;
pub mod token_store;
pub mod validation;

pub use notice::{MemoryNotifier, Notice, NoticeLevel, Notifier, TracingNotifier};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
