//! 面向用户的提示消息（对应前端的消息弹窗）

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);

    fn info(&self, message: &str) {
        self.notify(Notice { level: NoticeLevel::Info, message: message.to_string() });
    }

    fn success(&self, message: &str) {
        self.notify(Notice { level: NoticeLevel::Success, message: message.to_string() });
    }

    fn warning(&self, message: &str) {
        self.notify(Notice { level: NoticeLevel::Warning, message: message.to_string() });
    }

    fn error(&self, message: &str) {
        self.notify(Notice { level: NoticeLevel::Error, message: message.to_string() });
    }
}

/// 把提示写入日志
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info | NoticeLevel::Success => info!(target: "notice", "{}", notice.message),
            NoticeLevel::Warning => warn!(target: "notice", "{}", notice.message),
            NoticeLevel::Error => error!(target: "notice", "{}", notice.message),
        }
    }
}

/// 记录所有提示，供界面轮询或测试断言
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock())
    }

    pub fn contains(&self, level: NoticeLevel, message: &str) -> bool {
        self.notices
            .lock()
            .iter()
            .any(|n| n.level == level && n.message == message)
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}
