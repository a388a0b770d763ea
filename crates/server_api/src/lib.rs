use auth::{mint_session_token, verify_session_token, SessionConfig};
use sha2::{Digest, Sha256};
use shared::{
    domain::{DayOfWeek, ImageRef, Principal, Schedule, ScheduleId, Show, ShowId, UserProfile, UserRole},
    error::{ApiError, ErrorCode},
    protocol::{
        blob_route, AddShowRequest, BlobUploadResponse, EditShowRequest, LoginResponse,
        ScheduleRequest,
    },
    schedule_time::{validate_range, RangeError, TimeOfDay},
};
use storage::{NewSchedule, Storage, StoredBlob};
use tracing::{info, warn};

const MAX_PRINCIPAL_BYTES: usize = 128;
const MAX_SHOW_ID_BYTES: usize = 120;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub session: SessionConfig,
    /// Prefix for blob URLs handed back to clients. Relative URLs are
    /// returned when unset.
    pub public_url: Option<String>,
    pub max_blob_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    Authenticated(Principal),
}

impl Caller {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Caller::Anonymous => None,
            Caller::Authenticated(principal) => Some(principal),
        }
    }
}

pub async fn login(ctx: &ApiContext, principal: &Principal) -> Result<LoginResponse, ApiError> {
    let name = principal.as_str().trim();
    if name.is_empty() {
        return Err(ApiError::validation("principal cannot be empty"));
    }
    if name.len() > MAX_PRINCIPAL_BYTES {
        return Err(ApiError::validation("principal is too long"));
    }
    let principal = Principal::new(name);

    let role = ctx
        .storage
        .register_principal(&principal)
        .await
        .map_err(internal)?;
    let token = mint_session_token(&ctx.session, &principal)
        .map_err(|e| ApiError::new(ErrorCode::Internal, format!("token mint failed: {e}")))?;
    info!(principal = %principal, role = %role, "session issued");
    Ok(LoginResponse { token, role })
}

/// Maps an optional bearer token to a caller. Requests without a token are
/// anonymous; requests with a bad token are rejected outright.
pub fn resolve_caller(ctx: &ApiContext, bearer: Option<&str>) -> Result<Caller, ApiError> {
    let Some(token) = bearer else {
        return Ok(Caller::Anonymous);
    };
    verify_session_token(&ctx.session, token)
        .map(Caller::Authenticated)
        .map_err(|e| {
            warn!(error = %e, "rejected session token");
            ApiError::new(ErrorCode::Unauthorized, "invalid or expired session")
        })
}

pub async fn caller_role(ctx: &ApiContext, caller: &Caller) -> Result<UserRole, ApiError> {
    let Some(principal) = caller.principal() else {
        return Ok(UserRole::Guest);
    };
    Ok(ctx
        .storage
        .role_for(principal)
        .await
        .map_err(internal)?
        .unwrap_or(UserRole::Guest))
}

pub async fn is_caller_admin(ctx: &ApiContext, caller: &Caller) -> Result<bool, ApiError> {
    Ok(caller_role(ctx, caller).await?.is_admin())
}

pub async fn assign_role(
    ctx: &ApiContext,
    caller: &Caller,
    target: &Principal,
    role: UserRole,
) -> Result<(), ApiError> {
    ensure_admin(ctx, caller, "assign roles").await?;
    if target.as_str().trim().is_empty() {
        return Err(ApiError::validation("principal cannot be empty"));
    }
    ctx.storage
        .assign_role(target, role)
        .await
        .map_err(internal)?;
    info!(target = %target, role = %role, "role assigned");
    Ok(())
}

pub async fn caller_profile(
    ctx: &ApiContext,
    caller: &Caller,
) -> Result<Option<UserProfile>, ApiError> {
    let principal = ensure_authenticated(caller, "view profiles")?;
    ctx.storage.load_profile(principal).await.map_err(internal)
}

pub async fn save_caller_profile(
    ctx: &ApiContext,
    caller: &Caller,
    profile: UserProfile,
) -> Result<(), ApiError> {
    let principal = ensure_authenticated(caller, "save profiles")?;
    let name = profile.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("profile name cannot be empty"));
    }
    ctx.storage
        .save_profile(
            principal,
            &UserProfile {
                name: name.to_string(),
            },
        )
        .await
        .map_err(internal)
}

pub async fn user_profile(
    ctx: &ApiContext,
    caller: &Caller,
    target: &Principal,
) -> Result<Option<UserProfile>, ApiError> {
    let principal = ensure_authenticated(caller, "view profiles")?;
    if principal != target && !is_caller_admin(ctx, caller).await? {
        return Err(ApiError::forbidden("can only view your own profile"));
    }
    ctx.storage.load_profile(target).await.map_err(internal)
}

pub async fn list_shows(ctx: &ApiContext) -> Result<Vec<Show>, ApiError> {
    ctx.storage.list_shows().await.map_err(internal)
}

pub async fn get_show(ctx: &ApiContext, id: &ShowId) -> Result<Show, ApiError> {
    ctx.storage
        .load_show(id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("show not found"))
}

pub async fn add_show(
    ctx: &ApiContext,
    caller: &Caller,
    req: AddShowRequest,
) -> Result<Show, ApiError> {
    ensure_admin(ctx, caller, "add shows").await?;
    let id = req.id.as_str().trim();
    if id.is_empty() {
        return Err(ApiError::validation("show id cannot be empty"));
    }
    if id.len() > MAX_SHOW_ID_BYTES {
        return Err(ApiError::validation("show id is too long"));
    }
    let show = checked_show(ShowId::new(id), req.title, req.description, req.image)?;

    let inserted = ctx.storage.insert_show(&show).await.map_err(internal)?;
    if !inserted {
        return Err(ApiError::validation(format!(
            "show '{}' already exists",
            show.id
        )));
    }
    info!(show_id = %show.id, "show added");
    Ok(show)
}

pub async fn edit_show(
    ctx: &ApiContext,
    caller: &Caller,
    id: &ShowId,
    req: EditShowRequest,
) -> Result<Show, ApiError> {
    ensure_admin(ctx, caller, "edit shows").await?;
    let show = checked_show(id.clone(), req.title, req.description, req.image)?;
    let updated = ctx.storage.update_show(&show).await.map_err(internal)?;
    if !updated {
        return Err(ApiError::not_found("show not found"));
    }
    info!(show_id = %show.id, "show edited");
    Ok(show)
}

pub async fn delete_show(ctx: &ApiContext, caller: &Caller, id: &ShowId) -> Result<(), ApiError> {
    ensure_admin(ctx, caller, "delete shows").await?;
    let deleted = ctx.storage.delete_show(id).await.map_err(internal)?;
    if !deleted {
        return Err(ApiError::not_found("show not found"));
    }
    info!(show_id = %id, "show deleted with its schedules");
    Ok(())
}

pub async fn list_schedules(ctx: &ApiContext) -> Result<Vec<Schedule>, ApiError> {
    ctx.storage.list_schedules().await.map_err(internal)
}

pub async fn schedules_by_day(ctx: &ApiContext, day: DayOfWeek) -> Result<Vec<Schedule>, ApiError> {
    ctx.storage
        .list_schedules_for_day(day)
        .await
        .map_err(internal)
}

pub async fn schedules_by_show(
    ctx: &ApiContext,
    show_id: &ShowId,
) -> Result<Vec<Schedule>, ApiError> {
    ctx.storage
        .list_schedules_for_show(show_id)
        .await
        .map_err(internal)
}

pub async fn upcoming_schedules(
    ctx: &ApiContext,
    current_time: u32,
) -> Result<Vec<Schedule>, ApiError> {
    TimeOfDay::decode(current_time)
        .map_err(|e| ApiError::validation(format!("invalid current time: {e}")))?;
    ctx.storage
        .list_schedules_starting_from(current_time)
        .await
        .map_err(internal)
}

pub async fn add_schedule(
    ctx: &ApiContext,
    caller: &Caller,
    req: ScheduleRequest,
) -> Result<Schedule, ApiError> {
    ensure_admin(ctx, caller, "add schedules").await?;
    let slot = checked_slot(ctx, req).await?;
    let id = ctx
        .storage
        .insert_schedule(&slot)
        .await
        .map_err(internal)?;
    info!(schedule_id = id.0, show_id = %slot.show_id, "schedule added");
    Ok(schedule_from_slot(id, slot))
}

pub async fn edit_schedule(
    ctx: &ApiContext,
    caller: &Caller,
    id: ScheduleId,
    req: ScheduleRequest,
) -> Result<Schedule, ApiError> {
    ensure_admin(ctx, caller, "edit schedules").await?;
    let slot = checked_slot(ctx, req).await?;
    let updated = ctx
        .storage
        .update_schedule(id, &slot)
        .await
        .map_err(internal)?;
    if !updated {
        return Err(ApiError::not_found("schedule not found"));
    }
    Ok(schedule_from_slot(id, slot))
}

pub async fn delete_schedule(
    ctx: &ApiContext,
    caller: &Caller,
    id: ScheduleId,
) -> Result<(), ApiError> {
    ensure_admin(ctx, caller, "delete schedules").await?;
    let deleted = ctx.storage.delete_schedule(id).await.map_err(internal)?;
    if !deleted {
        return Err(ApiError::not_found("schedule not found"));
    }
    Ok(())
}

pub async fn store_blob(
    ctx: &ApiContext,
    caller: &Caller,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<BlobUploadResponse, ApiError> {
    ensure_admin(ctx, caller, "upload images").await?;
    if bytes.is_empty() {
        return Err(ApiError::validation("blob body cannot be empty"));
    }
    if bytes.len() > ctx.max_blob_bytes {
        return Err(ApiError::validation(format!(
            "blob exceeds {} bytes",
            ctx.max_blob_bytes
        )));
    }

    let blob_id = content_address(bytes);
    let content_type = content_type
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("application/octet-stream");
    ctx.storage
        .store_blob(&blob_id, content_type, bytes)
        .await
        .map_err(internal)?;

    let route = blob_route(&blob_id);
    let url = match &ctx.public_url {
        Some(base) => format!("{}{route}", base.trim_end_matches('/')),
        None => route,
    };
    Ok(BlobUploadResponse {
        blob_id,
        url,
        size_bytes: bytes.len() as u64,
    })
}

pub async fn load_blob(ctx: &ApiContext, blob_id: &str) -> Result<StoredBlob, ApiError> {
    ctx.storage
        .load_blob(blob_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("blob not found"))
}

/// Lowercase hex SHA-256 of the blob bytes.
pub fn content_address(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn checked_show(
    id: ShowId,
    title: String,
    description: String,
    image: ImageRef,
) -> Result<Show, ApiError> {
    let title = title.trim();
    let description = description.trim();
    if title.is_empty() || description.is_empty() {
        return Err(ApiError::validation("title and description are required"));
    }
    if image.as_str().trim().is_empty() {
        return Err(ApiError::validation("image is required"));
    }
    Ok(Show {
        id,
        title: title.to_string(),
        description: description.to_string(),
        image,
    })
}

async fn checked_slot(ctx: &ApiContext, req: ScheduleRequest) -> Result<NewSchedule, ApiError> {
    validate_range(req.start_time, req.end_time).map_err(|e| match e {
        RangeError::NotIncreasing { .. } => {
            ApiError::validation("end time must be after start time")
        }
        other => ApiError::validation(other.to_string()),
    })?;
    if ctx
        .storage
        .load_show(&req.show_id)
        .await
        .map_err(internal)?
        .is_none()
    {
        return Err(ApiError::not_found("show not found"));
    }
    Ok(NewSchedule {
        show_id: req.show_id,
        start_time: req.start_time,
        end_time: req.end_time,
        day_of_week: req.day_of_week,
    })
}

fn schedule_from_slot(id: ScheduleId, slot: NewSchedule) -> Schedule {
    Schedule {
        id,
        show_id: slot.show_id,
        start_time: slot.start_time,
        end_time: slot.end_time,
        day_of_week: slot.day_of_week,
    }
}

fn ensure_authenticated<'a>(caller: &'a Caller, action: &str) -> Result<&'a Principal, ApiError> {
    caller.principal().ok_or_else(|| {
        ApiError::new(
            ErrorCode::Unauthorized,
            format!("sign in to {action}"),
        )
    })
}

async fn ensure_admin(ctx: &ApiContext, caller: &Caller, action: &str) -> Result<(), ApiError> {
    ensure_authenticated(caller, action)?;
    if !is_caller_admin(ctx, caller).await? {
        return Err(ApiError::forbidden(format!("only admins can {action}")));
    }
    Ok(())
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
