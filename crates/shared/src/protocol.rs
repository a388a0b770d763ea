use serde::{Deserialize, Serialize};

use crate::domain::{DayOfWeek, ImageRef, Principal, ShowId, UserProfile, UserRole};

pub const SESSION_ROUTE: &str = "/session";
pub const SHOWS_ROUTE: &str = "/shows";
pub const SCHEDULES_ROUTE: &str = "/schedules";
pub const UPCOMING_SCHEDULES_ROUTE: &str = "/schedules/upcoming";
pub const CALLER_PROFILE_ROUTE: &str = "/me/profile";
pub const CALLER_ROLE_ROUTE: &str = "/me/role";
pub const CALLER_IS_ADMIN_ROUTE: &str = "/me/is_admin";
pub const BLOBS_ROUTE: &str = "/blobs";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub principal: Principal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddShowRequest {
    pub id: ShowId,
    pub title: String,
    pub description: String,
    pub image: ImageRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditShowRequest {
    pub title: String,
    pub description: String,
    pub image: ImageRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub show_id: ShowId,
    pub start_time: u32,
    pub end_time: u32,
    pub day_of_week: DayOfWeek,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpcomingQuery {
    pub current_time: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveProfileRequest {
    pub profile: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRoleRequest {
    pub role: UserRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobUploadResponse {
    pub blob_id: String,
    /// Absolute when the server knows its public URL, otherwise relative to
    /// the server root.
    pub url: String,
    pub size_bytes: u64,
}

pub fn blob_route(blob_id: &str) -> String {
    format!("{BLOBS_ROUTE}/{blob_id}")
}
