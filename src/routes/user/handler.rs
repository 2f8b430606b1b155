use serde_json::{Value, json};

use crate::{
    AppState,
    common::{Payload, required_int, required_object, required_str},
    error::AppError,
    middleware::{authenticate, require_admin},
    result::{ApiResponse, Status},
    utils::{Role, hash_password},
    validation::{validate_credentials, validate_password},
};

use super::model::User;

const OPERATION_OK: &str = "Sucesso: operação realizada com sucesso";

pub async fn login(state: &AppState, payload: &Payload) -> Result<ApiResponse, AppError> {
    let username = required_str(payload, "usuario")?;
    let password = required_str(payload, "senha")?;

    let user = match User::find_by_username(&state.pool, username).await? {
        Some(user) => user,
        None => return Err(AppError::Forbidden),
    };

    // 验证密码
    if !user.verify_login(password)? {
        return Err(AppError::Forbidden);
    }

    // 生成 token
    let token = state.tokens.issue(user.id, &user.username, user.role())?;
    Ok(ApiResponse::success(Status::OK, OPERATION_OK).with("token", Value::String(token)))
}

pub async fn create_user(state: &AppState, payload: &Payload) -> Result<ApiResponse, AppError> {
    let user = required_object(payload, "usuario")?;
    let username = required_str(user, "nome")?;
    let password = required_str(user, "senha")?;
    validate_credentials(username, password)?;

    let password_hash = hash_password(password, state.config.bcrypt_cost)?;
    User::create(&state.pool, username, &password_hash, Role::User).await?;
    Ok(ApiResponse::success(
        Status::CREATED,
        "Sucesso: Recurso cadastrado",
    ))
}

/// 令牌无效时返回 401，连接保持打开
pub async fn logout(state: &AppState, token: Option<&str>) -> Result<ApiResponse, AppError> {
    let claims = authenticate(&state.tokens, token)?;
    tracing::debug!("User {} logged out", claims.id);
    Ok(ApiResponse::success(Status::OK, OPERATION_OK))
}

pub async fn get_own_profile(
    state: &AppState,
    token: Option<&str>,
) -> Result<ApiResponse, AppError> {
    let claims = authenticate(&state.tokens, token)?;
    // 账户已被删除的令牌不再有效
    let user = User::find_by_id(&state.pool, claims.id)
        .await?
        .ok_or(AppError::Unauthenticated)?;
    Ok(ApiResponse::success(Status::OK, OPERATION_OK).with("usuario", json!(user.username)))
}

pub async fn edit_own_profile(
    state: &AppState,
    token: Option<&str>,
    payload: &Payload,
) -> Result<ApiResponse, AppError> {
    let claims = authenticate(&state.tokens, token)?;
    let password = required_str(required_object(payload, "usuario")?, "senha")?;
    validate_password(password)?;

    let password_hash = hash_password(password, state.config.bcrypt_cost)?;
    if !User::update_password(&state.pool, claims.id, &password_hash).await? {
        return Err(AppError::Unauthenticated);
    }
    Ok(ApiResponse::success(Status::OK, OPERATION_OK))
}

pub async fn delete_own_account(
    state: &AppState,
    token: Option<&str>,
) -> Result<ApiResponse, AppError> {
    let claims = authenticate(&state.tokens, token)?;
    if claims.role == Role::Admin {
        return Err(AppError::Forbidden);
    }
    if !User::delete(&state.pool, claims.id).await? {
        return Err(AppError::Unauthenticated);
    }
    Ok(ApiResponse::success(Status::OK, OPERATION_OK))
}

pub async fn list_users(state: &AppState, token: Option<&str>) -> Result<ApiResponse, AppError> {
    require_admin(&state.tokens, token)?;
    let users: Vec<Value> = User::list(&state.pool)
        .await?
        .iter()
        .map(User::to_json)
        .collect();
    Ok(ApiResponse::success(Status::OK, OPERATION_OK).with("usuarios", Value::Array(users)))
}

pub async fn admin_edit_user(
    state: &AppState,
    token: Option<&str>,
    payload: &Payload,
) -> Result<ApiResponse, AppError> {
    require_admin(&state.tokens, token)?;
    let id = required_int(payload, "id")?;
    let password = required_str(required_object(payload, "usuario")?, "senha")?;
    validate_password(password)?;

    let password_hash = hash_password(password, state.config.bcrypt_cost)?;
    if !User::update_password(&state.pool, id, &password_hash).await? {
        return Err(AppError::NotFound("Usuário não encontrado"));
    }
    Ok(ApiResponse::success(Status::OK, OPERATION_OK))
}

/// 删除后强制断开该用户的在线连接
pub async fn admin_delete_user(
    state: &AppState,
    token: Option<&str>,
    payload: &Payload,
) -> Result<ApiResponse, AppError> {
    let claims = require_admin(&state.tokens, token)?;
    let id = required_int(payload, "id")?;
    if id == claims.id {
        return Err(AppError::Forbidden);
    }
    if !User::delete(&state.pool, id).await? {
        return Err(AppError::NotFound("Usuário não encontrado"));
    }
    state.sessions.evict(id);
    Ok(ApiResponse::success(Status::OK, OPERATION_OK))
}
