use serde_json::Value;

use crate::{
    AppState,
    common::{Payload, required_int, required_object},
    error::AppError,
    middleware::{authenticate, require_admin},
    result::{ApiResponse, Status},
    routes::review::Review,
};

use super::model::{Movie, MovieInput};

const OPERATION_OK: &str = "Sucesso: operação realizada com sucesso";

pub async fn create_movie(
    state: &AppState,
    token: Option<&str>,
    payload: &Payload,
) -> Result<ApiResponse, AppError> {
    require_admin(&state.tokens, token)?;
    let input = MovieInput::from_payload(required_object(payload, "filme")?)?;
    let id = Movie::create(&state.pool, &input).await?;
    tracing::info!("Created movie {} ({})", id, input.titulo);
    Ok(ApiResponse::success(
        Status::CREATED,
        "Sucesso: Recurso cadastrado",
    ))
}

pub async fn edit_movie(
    state: &AppState,
    token: Option<&str>,
    payload: &Payload,
) -> Result<ApiResponse, AppError> {
    require_admin(&state.tokens, token)?;
    let movie = required_object(payload, "filme")?;
    let id = required_int(movie, "id")?;
    let input = MovieInput::from_payload(movie)?;
    if !Movie::update(&state.pool, id, &input).await? {
        return Err(AppError::NotFound("Filme não encontrado"));
    }
    Ok(ApiResponse::success(Status::OK, OPERATION_OK))
}

pub async fn delete_movie(
    state: &AppState,
    token: Option<&str>,
    payload: &Payload,
) -> Result<ApiResponse, AppError> {
    require_admin(&state.tokens, token)?;
    let id = required_int(payload, "id")?;
    if !Movie::delete(&state.pool, id).await? {
        return Err(AppError::NotFound("Filme não encontrado"));
    }
    Ok(ApiResponse::success(Status::OK, OPERATION_OK))
}

pub async fn list_movies(state: &AppState, token: Option<&str>) -> Result<ApiResponse, AppError> {
    authenticate(&state.tokens, token)?;
    let movies: Vec<Value> = Movie::list(&state.pool)
        .await?
        .iter()
        .map(Movie::to_json)
        .collect();
    Ok(ApiResponse::success(Status::OK, OPERATION_OK).with("filmes", Value::Array(movies)))
}

pub async fn get_movie_by_id(
    state: &AppState,
    token: Option<&str>,
    payload: &Payload,
) -> Result<ApiResponse, AppError> {
    authenticate(&state.tokens, token)?;
    let id = required_int(payload, "id_filme")?;
    let movie = Movie::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound("Filme não encontrado"))?;
    let reviews: Vec<Value> = Review::list_by_movie(&state.pool, id)
        .await?
        .iter()
        .map(Review::to_json)
        .collect();
    Ok(ApiResponse::success(Status::OK, OPERATION_OK)
        .with("filme", movie.to_json())
        .with("reviews", Value::Array(reviews)))
}
