//! 浏览器地址栏的抽象

use parking_lot::Mutex;
use std::collections::VecDeque;

use super::Location;

/// 保留的历史记录条数，超出后丢弃最早的
pub const MAX_HISTORY: usize = 50;

pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;

    fn navigate_to(&self, location: &Location);

    fn set_title(&self, title: &str);
}

/// 内存中的历史记录
#[derive(Debug)]
pub struct HistoryNavigator {
    entries: Mutex<VecDeque<String>>,
    title: Mutex<String>,
}

impl HistoryNavigator {
    pub fn new(initial_path: &str) -> Self {
        Self {
            entries: Mutex::new(VecDeque::from([initial_path.to_string()])),
            title: Mutex::new(String::new()),
        }
    }

    pub fn history(&self) -> Vec<String> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn title(&self) -> String {
        self.title.lock().clone()
    }
}

impl Default for HistoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for HistoryNavigator {
    fn current_path(&self) -> String {
        let entries = self.entries.lock();
        let full = entries.back().map(String::as_str).unwrap_or("/");
        full.split('?').next().unwrap_or("/").to_string()
    }

    fn navigate_to(&self, location: &Location) {
        let mut entries = self.entries.lock();
        if entries.len() == MAX_HISTORY {
            entries.pop_front();
        }
        entries.push_back(location.full_path());
    }

    fn set_title(&self, title: &str) {
        *self.title.lock() = title.to_string();
    }
}
