use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    response::Response,
};
use tracing::info;

use crate::{
    codec::{Envelope, StrictJson, write_json},
    error::{AppError, AppResult},
    models::{CreateMovieRequest, HealthStatus, UpdateMovieRequest},
    state::AppState,
    store::StoreError,
};

/// Lets a client pin the version it last read when updating.
pub const EXPECTED_VERSION_HEADER: HeaderName = HeaderName::from_static("x-expected-version");

pub async fn healthcheck(State(state): State<AppState>) -> AppResult<Response> {
    state
        .movies
        .health()
        .await
        .map_err(AppError::Unavailable)?;

    let health = HealthStatus {
        status: "available",
        store: "up",
        version: env!("CARGO_PKG_VERSION"),
    };

    Ok(write_json(
        StatusCode::OK,
        &Envelope::new("health", &health),
        None,
    )?)
}

pub async fn create_movie(
    State(state): State<AppState>,
    StrictJson(input): StrictJson<CreateMovieRequest>,
) -> AppResult<Response> {
    let mut movie = input.into_movie();
    state.movies.insert(&mut movie).await?;

    info!(movie_id = movie.id, "movie created");

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::try_from(format!("/v1/movies/{}", movie.id)) {
        headers.insert(header::LOCATION, location);
    }

    Ok(write_json(
        StatusCode::CREATED,
        &Envelope::new("movie", &movie),
        Some(headers),
    )?)
}

pub async fn show_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id = parse_id(&id)?;
    let movie = state.movies.get(id).await?;

    Ok(write_json(
        StatusCode::OK,
        &Envelope::new("movie", &movie),
        None,
    )?)
}

pub async fn update_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    StrictJson(input): StrictJson<UpdateMovieRequest>,
) -> AppResult<Response> {
    let id = parse_id(&id)?;
    let mut movie = state.movies.get(id).await?;

    if let Some(expected) = parse_expected_version(&headers)?
        && expected != movie.version
    {
        return Err(StoreError::EditConflict.into());
    }

    input.apply_to(&mut movie);
    state.movies.update(&mut movie).await?;

    info!(movie_id = movie.id, version = movie.version, "movie updated");

    Ok(write_json(
        StatusCode::OK,
        &Envelope::new("movie", &movie),
        None,
    )?)
}

pub async fn delete_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id = parse_id(&id)?;
    state.movies.delete(id).await?;

    info!(movie_id = id, "movie deleted");

    Ok(write_json(
        StatusCode::OK,
        &Envelope::new("message", "movie successfully deleted"),
        None,
    )?)
}

pub async fn not_found() -> AppError {
    AppError::NotFound
}

pub async fn method_not_allowed(method: Method) -> AppError {
    AppError::MethodNotAllowed(method)
}

/// Path ids arrive as strings; anything that is not an integer names no
/// resource at all. Range checks are the store's job.
fn parse_id(raw: &str) -> AppResult<i64> {
    raw.parse::<i64>().map_err(|_| AppError::NotFound)
}

fn parse_expected_version(headers: &HeaderMap) -> AppResult<Option<i32>> {
    let Some(raw) = headers.get(&EXPECTED_VERSION_HEADER) else {
        return Ok(None);
    };

    raw.to_str()
        .ok()
        .and_then(|value| value.trim().trim_matches('"').parse::<i32>().ok())
        .map(Some)
        .ok_or_else(|| {
            AppError::bad_request("X-Expected-Version header must be an integer version")
        })
}
