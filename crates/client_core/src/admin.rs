use std::sync::Arc;

use shared::domain::{Schedule, ScheduleId, Show, ShowId};
use thiserror::Error;
use tracing::warn;

use crate::{
    blob::UploadProgress,
    cache::QueryRoot,
    error::SyncError,
    forms::{FormError, ScheduleDraft, ShowDraft, ShowEditDraft},
    sync::SyncClient,
    views::{ShowCard, WeeklySchedule},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    #[error("only admins can manage shows and schedules")]
    NotAdmin,
    #[error(transparent)]
    Form(#[from] FormError),
    #[error(transparent)]
    Remote(#[from] SyncError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    AddShow,
    EditShow,
    DeleteShow,
    AddSchedule,
    EditSchedule,
    DeleteSchedule,
}

impl AdminAction {
    fn success_message(self) -> &'static str {
        match self {
            AdminAction::AddShow => "Show added successfully!",
            AdminAction::EditShow => "Show updated successfully!",
            AdminAction::DeleteShow => "Show deleted successfully",
            AdminAction::AddSchedule => "Schedule added successfully!",
            AdminAction::EditSchedule => "Schedule updated successfully!",
            AdminAction::DeleteSchedule => "Schedule deleted successfully",
        }
    }

    fn failure_message(self) -> &'static str {
        match self {
            AdminAction::AddShow => "Failed to add show",
            AdminAction::EditShow => "Failed to update show",
            AdminAction::DeleteShow => "Failed to delete show",
            AdminAction::AddSchedule => "Failed to add schedule",
            AdminAction::EditSchedule => "Failed to update schedule",
            AdminAction::DeleteSchedule => "Failed to delete schedule",
        }
    }
}

/// Transient notification for the outcome of an admin action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

impl Notice {
    /// Validation problems keep their inline message; remote failures
    /// collapse to the action's generic failure text.
    pub fn for_outcome<T>(action: AdminAction, outcome: &Result<T, AdminError>) -> Self {
        match outcome {
            Ok(_) => Notice::Success(action.success_message().to_string()),
            Err(AdminError::Form(err)) => Notice::Error(err.to_string()),
            Err(AdminError::NotAdmin) => Notice::Error(AdminError::NotAdmin.to_string()),
            Err(AdminError::Remote(_)) => Notice::Error(action.failure_message().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionTarget {
    Show(ShowId),
    Schedule(ScheduleId),
}

/// A pending delete. Nothing is removed until it is passed to
/// [`AdminConsole::confirm_deletion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRequest {
    pub target: DeletionTarget,
    pub prompt: String,
}

impl DeletionRequest {
    pub fn show(show: &Show) -> Self {
        Self {
            target: DeletionTarget::Show(show.id.clone()),
            prompt: format!(
                "Are you sure you want to delete \"{}\"? This action cannot be undone and will also remove all associated schedules.",
                show.title
            ),
        }
    }

    pub fn schedule(schedule: &Schedule) -> Self {
        Self {
            target: DeletionTarget::Schedule(schedule.id),
            prompt: "Are you sure you want to delete this schedule? This action cannot be undone."
                .to_string(),
        }
    }

    pub fn action(&self) -> AdminAction {
        match self.target {
            DeletionTarget::Show(_) => AdminAction::DeleteShow,
            DeletionTarget::Schedule(_) => AdminAction::DeleteSchedule,
        }
    }
}

/// Show and schedule management, only reachable by admins. The role is
/// checked when the console opens and again before every write.
pub struct AdminConsole {
    sync: Arc<SyncClient>,
}

impl AdminConsole {
    pub async fn open(sync: Arc<SyncClient>) -> Result<Self, AdminError> {
        let console = Self { sync };
        console.ensure_admin().await?;
        Ok(console)
    }

    /// Drops the cached admin flag so a role revoked since the last read
    /// is seen before the next write.
    async fn ensure_admin(&self) -> Result<(), AdminError> {
        self.sync.cache().invalidate(&[QueryRoot::IsAdmin]).await;
        if self.sync.is_caller_admin().await? {
            Ok(())
        } else {
            warn!("admin action attempted by a non-admin caller");
            Err(AdminError::NotAdmin)
        }
    }

    pub async fn shows(&self) -> Result<Vec<ShowCard>, AdminError> {
        let shows = self.sync.shows().await?;
        Ok(shows.iter().map(ShowCard::from_show).collect())
    }

    pub async fn weekly_schedule(&self) -> Result<WeeklySchedule, AdminError> {
        let schedules = self.sync.schedules().await?;
        let shows = self.sync.shows().await?;
        Ok(WeeklySchedule::build(&schedules, &shows))
    }

    pub async fn add_show(
        &self,
        draft: ShowDraft,
        progress: Option<UploadProgress>,
    ) -> Result<Show, AdminError> {
        let (id, mut input) = draft.validate()?;
        self.ensure_admin().await?;
        if let Some(report) = progress {
            input.image = input.image.with_upload_progress(move |pct| report(pct));
        }
        Ok(self.sync.add_show(id, input).await?)
    }

    pub async fn edit_show(
        &self,
        draft: ShowEditDraft,
        progress: Option<UploadProgress>,
    ) -> Result<Show, AdminError> {
        let (id, mut input) = draft.validate()?;
        self.ensure_admin().await?;
        if let Some(report) = progress {
            input.image = input.image.with_upload_progress(move |pct| report(pct));
        }
        Ok(self.sync.edit_show(&id, input).await?)
    }

    pub async fn add_schedule(&self, draft: &ScheduleDraft) -> Result<Schedule, AdminError> {
        let req = draft.validate()?;
        self.ensure_admin().await?;
        Ok(self.sync.add_schedule(req).await?)
    }

    pub async fn edit_schedule(
        &self,
        id: ScheduleId,
        draft: &ScheduleDraft,
    ) -> Result<Schedule, AdminError> {
        let req = draft.validate()?;
        self.ensure_admin().await?;
        Ok(self.sync.edit_schedule(id, req).await?)
    }

    pub async fn confirm_deletion(&self, request: DeletionRequest) -> Result<(), AdminError> {
        self.ensure_admin().await?;
        match request.target {
            DeletionTarget::Show(id) => self.sync.delete_show(&id).await?,
            DeletionTarget::Schedule(id) => self.sync.delete_schedule(id).await?,
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/admin_tests.rs"]
mod tests;
