//! 导航授权判定
//!
//! 纯函数：给定目标路由的元信息和会话快照，返回放行或重定向。
//! 判定顺序即优先级，第一条命中的规则生效。

use crate::services::session::SessionSnapshot;
use crate::utils::notice::{Notice, NoticeLevel};

use super::{Location, RouteMeta, ADMIN_LANDING_PATH, HOME_PATH, LOGIN_PATH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Redirect {
        to: Location,
        notice: Option<Notice>,
    },
}

fn redirect(path: &str, level: NoticeLevel, message: &str) -> Decision {
    Decision::Redirect {
        to: Location::new(path),
        notice: Some(Notice {
            level,
            message: message.to_string(),
        }),
    }
}

pub fn authorize(meta: &RouteMeta, session: &SessionSnapshot, full_path: &str) -> Decision {
    // 已登录用户访问登录/注册页面
    if meta.guest && session.is_authenticated {
        return Decision::Redirect {
            to: Location::new(HOME_PATH),
            notice: None,
        };
    }

    if meta.requires_auth {
        if !session.is_authenticated {
            return Decision::Redirect {
                to: Location::new(LOGIN_PATH).with_query("redirect", full_path),
                notice: Some(Notice {
                    level: NoticeLevel::Warning,
                    message: "请先登录".to_string(),
                }),
            };
        }
        if session.is_pending {
            return redirect(HOME_PATH, NoticeLevel::Warning, "您的账号正在审核中，请耐心等待");
        }
        if session.is_expired {
            return redirect(HOME_PATH, NoticeLevel::Error, "您的账号已过期，请联系管理员");
        }
    }

    if meta.requires_admin && !session.is_admin {
        return redirect(ADMIN_LANDING_PATH, NoticeLevel::Error, "您没有权限访问此页面");
    }

    Decision::Proceed
}
