use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{
        DayOfWeek, ImageRef, Principal, Schedule, ScheduleId, Show, ShowId, UserProfile, UserRole,
    },
    protocol::{AddShowRequest, EditShowRequest, ScheduleRequest},
};

use crate::blob::ExternalBlob;

/// Remote catalog operations as seen by the signed-in (or anonymous) caller.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn get_all_shows(&self) -> Result<Vec<Show>>;
    async fn get_show(&self, id: &ShowId) -> Result<Show>;
    async fn add_show(&self, req: AddShowRequest) -> Result<Show>;
    async fn edit_show(&self, id: &ShowId, req: EditShowRequest) -> Result<Show>;
    async fn delete_show(&self, id: &ShowId) -> Result<()>;

    async fn get_all_schedules(&self) -> Result<Vec<Schedule>>;
    async fn get_schedules_by_day(&self, day: DayOfWeek) -> Result<Vec<Schedule>>;
    async fn get_schedules_by_show(&self, show_id: &ShowId) -> Result<Vec<Schedule>>;
    async fn get_upcoming_schedules(&self, current_time: u32) -> Result<Vec<Schedule>>;
    async fn add_schedule(&self, req: ScheduleRequest) -> Result<Schedule>;
    async fn edit_schedule(&self, id: ScheduleId, req: ScheduleRequest) -> Result<Schedule>;
    async fn delete_schedule(&self, id: ScheduleId) -> Result<()>;

    async fn get_caller_user_profile(&self) -> Result<Option<UserProfile>>;
    async fn save_caller_user_profile(&self, profile: UserProfile) -> Result<()>;
    async fn get_user_profile(&self, principal: &Principal) -> Result<Option<UserProfile>>;

    async fn get_caller_user_role(&self) -> Result<UserRole>;
    async fn is_caller_admin(&self) -> Result<bool>;
    async fn assign_caller_user_role(&self, principal: &Principal, role: UserRole) -> Result<()>;

    /// Resolves a blob to a stored image reference, uploading its bytes
    /// when it is not already remote.
    async fn upload_blob(&self, blob: &ExternalBlob) -> Result<ImageRef>;
}
