use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering},
        Arc,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{
        DayOfWeek, ImageRef, Principal, Schedule, ScheduleId, Show, ShowId, UserProfile, UserRole,
    },
    protocol::{AddShowRequest, EditShowRequest, ScheduleRequest},
};
use tokio::sync::{Mutex, Semaphore};

use crate::{api::BackendApi, blob::ExternalBlob};

/// In-memory backend that counts every remote call.
pub(crate) struct FakeBackend {
    shows: Mutex<Vec<Show>>,
    schedules: Mutex<Vec<Schedule>>,
    profile: Mutex<Option<UserProfile>>,
    role: Mutex<UserRole>,
    calls: std::sync::Mutex<HashMap<&'static str, usize>>,
    next_schedule_id: AtomicI64,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    held: AtomicBool,
    gate: Semaphore,
}

impl FakeBackend {
    pub(crate) fn new(role: UserRole) -> Arc<Self> {
        Arc::new(Self {
            shows: Mutex::new(vec![sample_show("morning-drive", "Morning Drive")]),
            schedules: Mutex::new(vec![Schedule {
                id: ScheduleId(1),
                show_id: ShowId::new("morning-drive"),
                start_time: 600,
                end_time: 900,
                day_of_week: DayOfWeek::Monday,
            }]),
            profile: Mutex::new(None),
            role: Mutex::new(role),
            calls: std::sync::Mutex::new(HashMap::new()),
            next_schedule_id: AtomicI64::new(2),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
        })
    }

    pub(crate) fn admin() -> Arc<Self> {
        Self::new(UserRole::Admin)
    }

    pub(crate) fn calls(&self, name: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Blocks show-list reads until [`FakeBackend::release`] is called.
    pub(crate) fn hold_reads(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub(crate) fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.gate.add_permits(1024);
    }

    pub(crate) async fn set_role(&self, role: UserRole) {
        *self.role.lock().await = role;
    }

    pub(crate) async fn set_profile(&self, profile: Option<UserProfile>) {
        *self.profile.lock().await = profile;
    }

    fn record(&self, name: &'static str) {
        *self
            .calls
            .lock()
            .expect("calls lock")
            .entry(name)
            .or_insert(0) += 1;
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("backend unavailable"));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("write rejected"));
        }
        Ok(())
    }
}

pub(crate) fn sample_show(id: &str, title: &str) -> Show {
    Show {
        id: ShowId::new(id),
        title: title.to_string(),
        description: format!("{title} description"),
        image: ImageRef::new(format!("https://radio.example/blobs/{id}")),
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn get_all_shows(&self) -> Result<Vec<Show>> {
        self.record("get_all_shows");
        if self.held.load(Ordering::SeqCst) {
            let _permit = self.gate.acquire().await?;
        }
        self.check_read()?;
        Ok(self.shows.lock().await.clone())
    }

    async fn get_show(&self, id: &ShowId) -> Result<Show> {
        self.record("get_show");
        self.check_read()?;
        self.shows
            .lock()
            .await
            .iter()
            .find(|show| &show.id == id)
            .cloned()
            .ok_or_else(|| anyhow!("show not found"))
    }

    async fn add_show(&self, req: AddShowRequest) -> Result<Show> {
        self.record("add_show");
        self.check_write()?;
        let show = Show {
            id: req.id,
            title: req.title,
            description: req.description,
            image: req.image,
        };
        self.shows.lock().await.push(show.clone());
        Ok(show)
    }

    async fn edit_show(&self, id: &ShowId, req: EditShowRequest) -> Result<Show> {
        self.record("edit_show");
        self.check_write()?;
        let mut shows = self.shows.lock().await;
        let show = shows
            .iter_mut()
            .find(|show| &show.id == id)
            .ok_or_else(|| anyhow!("show not found"))?;
        show.title = req.title;
        show.description = req.description;
        show.image = req.image;
        Ok(show.clone())
    }

    async fn delete_show(&self, id: &ShowId) -> Result<()> {
        self.record("delete_show");
        self.check_write()?;
        self.shows.lock().await.retain(|show| &show.id != id);
        self.schedules
            .lock()
            .await
            .retain(|schedule| &schedule.show_id != id);
        Ok(())
    }

    async fn get_all_schedules(&self) -> Result<Vec<Schedule>> {
        self.record("get_all_schedules");
        self.check_read()?;
        Ok(self.schedules.lock().await.clone())
    }

    async fn get_schedules_by_day(&self, day: DayOfWeek) -> Result<Vec<Schedule>> {
        self.record("get_schedules_by_day");
        self.check_read()?;
        Ok(self
            .schedules
            .lock()
            .await
            .iter()
            .filter(|schedule| schedule.day_of_week == day)
            .cloned()
            .collect())
    }

    async fn get_schedules_by_show(&self, show_id: &ShowId) -> Result<Vec<Schedule>> {
        self.record("get_schedules_by_show");
        self.check_read()?;
        Ok(self
            .schedules
            .lock()
            .await
            .iter()
            .filter(|schedule| &schedule.show_id == show_id)
            .cloned()
            .collect())
    }

    async fn get_upcoming_schedules(&self, current_time: u32) -> Result<Vec<Schedule>> {
        self.record("get_upcoming_schedules");
        self.check_read()?;
        let mut upcoming: Vec<Schedule> = self
            .schedules
            .lock()
            .await
            .iter()
            .filter(|schedule| schedule.start_time >= current_time)
            .cloned()
            .collect();
        upcoming.sort_by_key(|schedule| schedule.start_time);
        Ok(upcoming)
    }

    async fn add_schedule(&self, req: ScheduleRequest) -> Result<Schedule> {
        self.record("add_schedule");
        self.check_write()?;
        let schedule = Schedule {
            id: ScheduleId(self.next_schedule_id.fetch_add(1, Ordering::SeqCst)),
            show_id: req.show_id,
            start_time: req.start_time,
            end_time: req.end_time,
            day_of_week: req.day_of_week,
        };
        self.schedules.lock().await.push(schedule.clone());
        Ok(schedule)
    }

    async fn edit_schedule(&self, id: ScheduleId, req: ScheduleRequest) -> Result<Schedule> {
        self.record("edit_schedule");
        self.check_write()?;
        let mut schedules = self.schedules.lock().await;
        let schedule = schedules
            .iter_mut()
            .find(|schedule| schedule.id == id)
            .ok_or_else(|| anyhow!("schedule not found"))?;
        schedule.show_id = req.show_id;
        schedule.start_time = req.start_time;
        schedule.end_time = req.end_time;
        schedule.day_of_week = req.day_of_week;
        Ok(schedule.clone())
    }

    async fn delete_schedule(&self, id: ScheduleId) -> Result<()> {
        self.record("delete_schedule");
        self.check_write()?;
        self.schedules
            .lock()
            .await
            .retain(|schedule| schedule.id != id);
        Ok(())
    }

    async fn get_caller_user_profile(&self) -> Result<Option<UserProfile>> {
        self.record("get_caller_user_profile");
        self.check_read()?;
        Ok(self.profile.lock().await.clone())
    }

    async fn save_caller_user_profile(&self, profile: UserProfile) -> Result<()> {
        self.record("save_caller_user_profile");
        self.check_write()?;
        *self.profile.lock().await = Some(profile);
        Ok(())
    }

    async fn get_user_profile(&self, _principal: &Principal) -> Result<Option<UserProfile>> {
        self.record("get_user_profile");
        self.check_read()?;
        Ok(self.profile.lock().await.clone())
    }

    async fn get_caller_user_role(&self) -> Result<UserRole> {
        self.record("get_caller_user_role");
        self.check_read()?;
        Ok(*self.role.lock().await)
    }

    async fn is_caller_admin(&self) -> Result<bool> {
        self.record("is_caller_admin");
        self.check_read()?;
        Ok(self.role.lock().await.is_admin())
    }

    async fn assign_caller_user_role(&self, _principal: &Principal, role: UserRole) -> Result<()> {
        self.record("assign_caller_user_role");
        self.check_write()?;
        *self.role.lock().await = role;
        Ok(())
    }

    async fn upload_blob(&self, blob: &ExternalBlob) -> Result<ImageRef> {
        self.record("upload_blob");
        if let Some(existing) = blob.existing_ref() {
            return Ok(existing);
        }
        self.check_write()?;
        if let Some(report) = blob.progress() {
            report(50);
            report(100);
        }
        Ok(ImageRef::new("https://radio.example/blobs/uploaded"))
    }
}
