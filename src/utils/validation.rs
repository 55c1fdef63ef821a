use crate::error::{AppError, Result};

const MAX_VALID_DAYS: u32 = 3650;

/// 验证邮箱并返回详细错误信息
pub fn validate_email_format(email: &str) -> Result<()> {
    if email.trim().is_empty() {
        return Err(AppError::Validation("邮箱不能为空".to_string()));
    }

    if !validator::validate_email(email) {
        return Err(AppError::Validation("邮箱格式不正确".to_string()));
    }

    if email.len() > 254 {
        return Err(AppError::Validation("邮箱地址过长".to_string()));
    }

    Ok(())
}

/// 评论内容去掉首尾空白后不能为空，长度由 `CreateCommentRequest` 校验
pub fn validate_comment_text(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("请输入评论内容".to_string()));
    }
    Ok(trimmed)
}

/// 审核通过或延期的天数
pub fn validate_days(days: u32) -> Result<()> {
    if days == 0 {
        return Err(AppError::Validation("天数必须大于0".to_string()));
    }
    if days > MAX_VALID_DAYS {
        return Err(AppError::Validation("天数不能超过3650".to_string()));
    }
    Ok(())
}

pub fn validate_reject_reason(reason: &str) -> Result<&str> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("请输入拒绝原因".to_string()));
    }
    Ok(trimmed)
}
