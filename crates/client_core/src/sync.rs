use std::{collections::HashMap, future::Future, sync::Arc};

use shared::{
    domain::{
        DayOfWeek, Principal, Schedule, ScheduleId, Show, ShowId, UserProfile, UserRole,
    },
    protocol::{AddShowRequest, EditShowRequest, ScheduleRequest},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::{
    api::BackendApi,
    blob::ExternalBlob,
    cache::{QueryCache, QueryKey, QueryRoot, QueryStatus},
    error::SyncError,
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    QueryFetched(QueryKey),
    QueryFailed { key: QueryKey, message: String },
    Invalidated(Vec<QueryRoot>),
    Cleared,
    MutationStarted(MutationKind),
    MutationSucceeded(MutationKind),
    MutationFailed { kind: MutationKind, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    SaveProfile,
    AddShow,
    EditShow,
    DeleteShow,
    AddSchedule,
    EditSchedule,
    DeleteSchedule,
    AssignRole,
}

impl MutationKind {
    /// Roots dropped from the cache once this mutation succeeds.
    pub fn invalidates(self) -> &'static [QueryRoot] {
        match self {
            MutationKind::SaveProfile => &[QueryRoot::CurrentUserProfile],
            MutationKind::AddShow | MutationKind::EditShow => &[QueryRoot::Shows],
            MutationKind::DeleteShow => &[QueryRoot::Shows, QueryRoot::Schedules],
            MutationKind::AddSchedule
            | MutationKind::EditSchedule
            | MutationKind::DeleteSchedule => &[QueryRoot::Schedules],
            MutationKind::AssignRole => &[QueryRoot::CallerRole, QueryRoot::IsAdmin],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MutationStatus {
    #[default]
    Idle,
    Pending,
    Success,
    Error(String),
}

/// Status of the most recently started call of one mutation kind.
#[derive(Debug, Default)]
struct MutationSlot {
    latest: u64,
    status: MutationStatus,
}

/// Show fields as submitted by a form, before the image is resolved.
#[derive(Debug, Clone)]
pub struct ShowInput {
    pub title: String,
    pub description: String,
    pub image: ExternalBlob,
}

/// Cached reads and invalidating writes over a [`BackendApi`].
pub struct SyncClient {
    api: Arc<dyn BackendApi>,
    cache: QueryCache,
    mutations: Mutex<HashMap<MutationKind, MutationSlot>>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncClient {
    pub fn new(api: Arc<dyn BackendApi>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self::with_events(api, events)
    }

    /// Shares an existing event channel so subscribers outlive a client
    /// rebuilt on login or logout.
    pub fn with_events(api: Arc<dyn BackendApi>, events: broadcast::Sender<SyncEvent>) -> Self {
        Self {
            api,
            cache: QueryCache::new(events.clone()),
            mutations: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub async fn query_status(&self, key: &QueryKey) -> QueryStatus {
        self.cache.status(key).await
    }

    /// Status of the latest call of `kind`. An older call that settles after
    /// a newer one started reports only through its own result and events.
    pub async fn mutation_status(&self, kind: MutationKind) -> MutationStatus {
        self.mutations
            .lock()
            .await
            .get(&kind)
            .map(|slot| slot.status.clone())
            .unwrap_or_default()
    }

    pub async fn shows(&self) -> Result<Vec<Show>, SyncError> {
        let api = Arc::clone(&self.api);
        self.cache
            .fetch(QueryKey::Shows, move || async move { api.get_all_shows().await })
            .await
    }

    pub async fn show(&self, id: &ShowId) -> Result<Show, SyncError> {
        let api = Arc::clone(&self.api);
        let owned = id.clone();
        self.cache
            .fetch(QueryKey::Show(id.clone()), move || async move {
                api.get_show(&owned).await
            })
            .await
    }

    pub async fn schedules(&self) -> Result<Vec<Schedule>, SyncError> {
        let api = Arc::clone(&self.api);
        self.cache
            .fetch(QueryKey::Schedules, move || async move {
                api.get_all_schedules().await
            })
            .await
    }

    pub async fn schedules_by_day(&self, day: DayOfWeek) -> Result<Vec<Schedule>, SyncError> {
        let api = Arc::clone(&self.api);
        self.cache
            .fetch(QueryKey::SchedulesByDay(day), move || async move {
                api.get_schedules_by_day(day).await
            })
            .await
    }

    pub async fn schedules_by_show(&self, show_id: &ShowId) -> Result<Vec<Schedule>, SyncError> {
        let api = Arc::clone(&self.api);
        let owned = show_id.clone();
        self.cache
            .fetch(QueryKey::SchedulesByShow(show_id.clone()), move || async move {
                api.get_schedules_by_show(&owned).await
            })
            .await
    }

    pub async fn upcoming_schedules(&self, current_time: u32) -> Result<Vec<Schedule>, SyncError> {
        let api = Arc::clone(&self.api);
        self.cache
            .fetch(QueryKey::UpcomingSchedules(current_time), move || async move {
                api.get_upcoming_schedules(current_time).await
            })
            .await
    }

    pub async fn caller_profile(&self) -> Result<Option<UserProfile>, SyncError> {
        let api = Arc::clone(&self.api);
        self.cache
            .fetch(QueryKey::CurrentUserProfile, move || async move {
                api.get_caller_user_profile().await
            })
            .await
    }

    pub async fn caller_role(&self) -> Result<UserRole, SyncError> {
        let api = Arc::clone(&self.api);
        self.cache
            .fetch(QueryKey::CallerRole, move || async move {
                api.get_caller_user_role().await
            })
            .await
    }

    pub async fn is_caller_admin(&self) -> Result<bool, SyncError> {
        let api = Arc::clone(&self.api);
        self.cache
            .fetch(QueryKey::IsAdmin, move || async move { api.is_caller_admin().await })
            .await
    }

    /// Uncached; another user's profile is only looked at on demand.
    pub async fn user_profile(&self, principal: &Principal) -> Result<Option<UserProfile>, SyncError> {
        self.api
            .get_user_profile(principal)
            .await
            .map_err(|err| SyncError::remote(&err))
    }

    pub async fn save_profile(&self, profile: UserProfile) -> Result<(), SyncError> {
        self.mutate(MutationKind::SaveProfile, self.api.save_caller_user_profile(profile))
            .await
    }

    pub async fn add_show(&self, id: ShowId, input: ShowInput) -> Result<Show, SyncError> {
        let api = &self.api;
        self.mutate(MutationKind::AddShow, async move {
            let image = api.upload_blob(&input.image).await?;
            api.add_show(AddShowRequest {
                id,
                title: input.title,
                description: input.description,
                image,
            })
            .await
        })
        .await
    }

    pub async fn edit_show(&self, id: &ShowId, input: ShowInput) -> Result<Show, SyncError> {
        let api = &self.api;
        self.mutate(MutationKind::EditShow, async move {
            let image = api.upload_blob(&input.image).await?;
            api.edit_show(
                id,
                EditShowRequest {
                    title: input.title,
                    description: input.description,
                    image,
                },
            )
            .await
        })
        .await
    }

    pub async fn delete_show(&self, id: &ShowId) -> Result<(), SyncError> {
        self.mutate(MutationKind::DeleteShow, self.api.delete_show(id))
            .await
    }

    pub async fn add_schedule(&self, req: ScheduleRequest) -> Result<Schedule, SyncError> {
        self.mutate(MutationKind::AddSchedule, self.api.add_schedule(req))
            .await
    }

    pub async fn edit_schedule(
        &self,
        id: ScheduleId,
        req: ScheduleRequest,
    ) -> Result<Schedule, SyncError> {
        self.mutate(MutationKind::EditSchedule, self.api.edit_schedule(id, req))
            .await
    }

    pub async fn delete_schedule(&self, id: ScheduleId) -> Result<(), SyncError> {
        self.mutate(MutationKind::DeleteSchedule, self.api.delete_schedule(id))
            .await
    }

    pub async fn assign_role(&self, principal: &Principal, role: UserRole) -> Result<(), SyncError> {
        self.mutate(
            MutationKind::AssignRole,
            self.api.assign_caller_user_role(principal, role),
        )
        .await
    }

    /// Runs one write. The cache is only touched when the write succeeds.
    async fn mutate<T>(
        &self,
        kind: MutationKind,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, SyncError> {
        let call_id = self.start_mutation(kind).await;
        let _ = self.events.send(SyncEvent::MutationStarted(kind));

        match call.await {
            Ok(value) => {
                self.cache.invalidate(kind.invalidates()).await;
                self.settle_mutation(kind, call_id, MutationStatus::Success).await;
                let _ = self.events.send(SyncEvent::MutationSucceeded(kind));
                info!(?kind, "mutation succeeded");
                Ok(value)
            }
            Err(err) => {
                let err = SyncError::remote(&err);
                warn!(?kind, error = %err, "mutation failed");
                self.settle_mutation(kind, call_id, MutationStatus::Error(err.to_string()))
                    .await;
                let _ = self.events.send(SyncEvent::MutationFailed {
                    kind,
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn start_mutation(&self, kind: MutationKind) -> u64 {
        let mut mutations = self.mutations.lock().await;
        let slot = mutations.entry(kind).or_default();
        slot.latest += 1;
        slot.status = MutationStatus::Pending;
        slot.latest
    }

    async fn settle_mutation(&self, kind: MutationKind, call_id: u64, status: MutationStatus) {
        let mut mutations = self.mutations.lock().await;
        if let Some(slot) = mutations.get_mut(&kind).filter(|slot| slot.latest == call_id) {
            slot.status = status;
        }
    }
}

#[cfg(test)]
#[path = "tests/sync_tests.rs"]
mod tests;
