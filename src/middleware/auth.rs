use crate::error::AppError;
use crate::utils::{Claims, Role, TokenService};

/// 校验请求携带的令牌；缺失与无效一律视为未认证
pub fn authenticate(tokens: &TokenService, token: Option<&str>) -> Result<Claims, AppError> {
    match token {
        Some(token) if !token.is_empty() => tokens.validate(token),
        _ => Err(AppError::Unauthenticated),
    }
}

pub fn require_admin(tokens: &TokenService, token: Option<&str>) -> Result<Claims, AppError> {
    let claims = authenticate(tokens, token)?;
    if claims.role != Role::Admin {
        return Err(AppError::Forbidden);
    }
    Ok(claims)
}
