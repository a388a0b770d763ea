use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use server_api::Caller;
use shared::{
    domain::{DayOfWeek, Principal, Schedule, ScheduleId, Show, ShowId, UserProfile, UserRole},
    error::{ApiError, ErrorCode},
    protocol::{
        AddShowRequest, AssignRoleRequest, BlobUploadResponse, EditShowRequest, LoginRequest,
        LoginResponse, SaveProfileRequest, ScheduleRequest, UpcomingQuery,
    },
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::error;

use crate::app_state::AppState;

type Rejection = (StatusCode, Json<ApiError>);
type ApiResult<T> = Result<T, Rejection>;

/// Slack on top of the blob cap so JSON bodies and multipart framing fit.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

pub(crate) fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.api.max_blob_bytes + BODY_LIMIT_SLACK;
    Router::new()
        .route("/healthz", get(healthz))
        .route("/session", post(create_session))
        .route("/shows", get(list_shows).post(add_show))
        .route(
            "/shows/:show_id",
            get(get_show).put(edit_show).delete(delete_show),
        )
        .route("/schedules", get(list_schedules).post(add_schedule))
        .route("/schedules/upcoming", get(upcoming_schedules))
        .route("/schedules/day/:day", get(schedules_by_day))
        .route("/schedules/show/:show_id", get(schedules_by_show))
        .route(
            "/schedules/:schedule_id",
            put(edit_schedule).delete(delete_schedule),
        )
        .route("/me/profile", get(caller_profile).put(save_caller_profile))
        .route("/me/role", get(caller_role))
        .route("/me/is_admin", get(is_caller_admin))
        .route("/users/:principal/profile", get(user_profile))
        .route("/users/:principal/role", put(assign_role))
        .route("/blobs", post(upload_blob))
        .route("/blobs/:blob_id", get(download_blob))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}

fn reject(err: ApiError) -> Rejection {
    let status = match err.code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => {
            error!(message = %err.message, "internal error while serving request");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(err))
}

fn caller(state: &AppState, headers: &HeaderMap) -> ApiResult<Caller> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(auth::bearer_token);
    server_api::resolve_caller(&state.api, bearer).map_err(reject)
}

async fn healthz(State(state): State<Arc<AppState>>) -> ApiResult<&'static str> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|e| reject(ApiError::new(ErrorCode::Internal, e.to_string())))?;
    Ok("ok")
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    server_api::login(&state.api, &req.principal)
        .await
        .map(Json)
        .map_err(reject)
}

async fn list_shows(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Show>>> {
    server_api::list_shows(&state.api)
        .await
        .map(Json)
        .map_err(reject)
}

async fn get_show(
    State(state): State<Arc<AppState>>,
    Path(show_id): Path<String>,
) -> ApiResult<Json<Show>> {
    server_api::get_show(&state.api, &ShowId::new(show_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn add_show(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AddShowRequest>,
) -> ApiResult<(StatusCode, Json<Show>)> {
    let caller = caller(&state, &headers)?;
    let show = server_api::add_show(&state.api, &caller, req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(show)))
}

async fn edit_show(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(show_id): Path<String>,
    Json(req): Json<EditShowRequest>,
) -> ApiResult<Json<Show>> {
    let caller = caller(&state, &headers)?;
    server_api::edit_show(&state.api, &caller, &ShowId::new(show_id), req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn delete_show(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(show_id): Path<String>,
) -> ApiResult<StatusCode> {
    let caller = caller(&state, &headers)?;
    server_api::delete_show(&state.api, &caller, &ShowId::new(show_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_schedules(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Schedule>>> {
    server_api::list_schedules(&state.api)
        .await
        .map(Json)
        .map_err(reject)
}

async fn schedules_by_day(
    State(state): State<Arc<AppState>>,
    Path(day): Path<String>,
) -> ApiResult<Json<Vec<Schedule>>> {
    let day: DayOfWeek = day
        .parse()
        .map_err(|e: shared::domain::UnknownLabel| reject(ApiError::validation(e.to_string())))?;
    server_api::schedules_by_day(&state.api, day)
        .await
        .map(Json)
        .map_err(reject)
}

async fn schedules_by_show(
    State(state): State<Arc<AppState>>,
    Path(show_id): Path<String>,
) -> ApiResult<Json<Vec<Schedule>>> {
    server_api::schedules_by_show(&state.api, &ShowId::new(show_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn upcoming_schedules(
    State(state): State<Arc<AppState>>,
    Query(q): Query<UpcomingQuery>,
) -> ApiResult<Json<Vec<Schedule>>> {
    server_api::upcoming_schedules(&state.api, q.current_time)
        .await
        .map(Json)
        .map_err(reject)
}

async fn add_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ScheduleRequest>,
) -> ApiResult<(StatusCode, Json<Schedule>)> {
    let caller = caller(&state, &headers)?;
    let schedule = server_api::add_schedule(&state.api, &caller, req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

async fn edit_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(schedule_id): Path<i64>,
    Json(req): Json<ScheduleRequest>,
) -> ApiResult<Json<Schedule>> {
    let caller = caller(&state, &headers)?;
    server_api::edit_schedule(&state.api, &caller, ScheduleId(schedule_id), req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(schedule_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let caller = caller(&state, &headers)?;
    server_api::delete_schedule(&state.api, &caller, ScheduleId(schedule_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn caller_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Option<UserProfile>>> {
    let caller = caller(&state, &headers)?;
    server_api::caller_profile(&state.api, &caller)
        .await
        .map(Json)
        .map_err(reject)
}

async fn save_caller_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SaveProfileRequest>,
) -> ApiResult<StatusCode> {
    let caller = caller(&state, &headers)?;
    server_api::save_caller_profile(&state.api, &caller, req.profile)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn caller_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<UserRole>> {
    let caller = caller(&state, &headers)?;
    server_api::caller_role(&state.api, &caller)
        .await
        .map(Json)
        .map_err(reject)
}

async fn is_caller_admin(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<bool>> {
    let caller = caller(&state, &headers)?;
    server_api::is_caller_admin(&state.api, &caller)
        .await
        .map(Json)
        .map_err(reject)
}

async fn user_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(principal): Path<String>,
) -> ApiResult<Json<Option<UserProfile>>> {
    let caller = caller(&state, &headers)?;
    server_api::user_profile(&state.api, &caller, &Principal::new(principal))
        .await
        .map(Json)
        .map_err(reject)
}

async fn assign_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(principal): Path<String>,
    Json(req): Json<AssignRoleRequest>,
) -> ApiResult<StatusCode> {
    let caller = caller(&state, &headers)?;
    server_api::assign_role(&state.api, &caller, &Principal::new(principal), req.role)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_blob(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<BlobUploadResponse>)> {
    let caller = caller(&state, &headers)?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let stored = server_api::store_blob(&state.api, &caller, content_type, &body)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn download_blob(
    State(state): State<Arc<AppState>>,
    Path(blob_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let blob = server_api::load_blob(&state.api, &blob_id)
        .await
        .map_err(reject)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&blob.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    Ok((StatusCode::OK, headers, blob.bytes))
}

#[cfg(test)]
#[path = "tests/routes_tests.rs"]
mod tests;
