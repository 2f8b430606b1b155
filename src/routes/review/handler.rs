use serde_json::Value;

use crate::{
    AppState,
    common::{Payload, required_int, required_object, required_str},
    error::AppError,
    middleware::authenticate,
    result::{ApiResponse, Status},
    utils::Role,
    validation::validate_review,
};

use super::model::{Review, ReviewInput};

fn review_input(review: &Payload) -> Result<ReviewInput<'_>, AppError> {
    let nota = required_int(review, "nota")?;
    let titulo = required_str(review, "titulo")?;
    let descricao = review.get("descricao").and_then(Value::as_str).unwrap_or("");
    validate_review(nota, titulo, descricao)?;
    Ok(ReviewInput {
        nota,
        titulo,
        descricao,
    })
}

pub async fn create_review(
    state: &AppState,
    token: Option<&str>,
    payload: &Payload,
) -> Result<ApiResponse, AppError> {
    let claims = authenticate(&state.tokens, token)?;
    let review = required_object(payload, "review")?;
    let movie_id = required_int(review, "id_filme")?;
    let input = review_input(review)?;

    Review::create(&state.pool, claims.id, movie_id, &input).await?;
    Ok(ApiResponse::success(
        Status::CREATED,
        "Sucesso: Recurso cadastrado",
    ))
}

pub async fn list_user_reviews(
    state: &AppState,
    token: Option<&str>,
) -> Result<ApiResponse, AppError> {
    let claims = authenticate(&state.tokens, token)?;
    let reviews: Vec<Value> = Review::list_by_user(&state.pool, claims.id)
        .await?
        .iter()
        .map(Review::to_json)
        .collect();
    Ok(
        ApiResponse::success(Status::OK, "Sucesso: operação realizada com sucesso")
            .with("reviews", Value::Array(reviews)),
    )
}

/// 只有作者本人可以编辑
pub async fn edit_review(
    state: &AppState,
    token: Option<&str>,
    payload: &Payload,
) -> Result<ApiResponse, AppError> {
    let claims = authenticate(&state.tokens, token)?;
    let review = required_object(payload, "review")?;
    let id = required_int(review, "id")?;
    let input = review_input(review)?;

    let current = Review::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound("Review não encontrada"))?;
    if current.id_usuario != claims.id {
        return Err(AppError::Forbidden);
    }

    current.update(&state.pool, &input).await?;
    Ok(ApiResponse::success(
        Status::OK,
        "Sucesso: operação realizada com sucesso",
    ))
}

/// 作者本人或管理员可以删除
pub async fn delete_review(
    state: &AppState,
    token: Option<&str>,
    payload: &Payload,
) -> Result<ApiResponse, AppError> {
    let claims = authenticate(&state.tokens, token)?;
    let id = required_int(payload, "id")?;

    let current = Review::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound("Review não encontrada"))?;
    if current.id_usuario != claims.id && claims.role != Role::Admin {
        return Err(AppError::Forbidden);
    }

    current.delete(&state.pool).await?;
    Ok(ApiResponse::success(
        Status::OK,
        "Sucesso: operação realizada com sucesso",
    ))
}
