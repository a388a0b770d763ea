use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use shared::domain::Principal;
use tracing::warn;

use crate::{
    admin::{AdminConsole, AdminError},
    error::SyncError,
    forms::{FormError, ProfileDraft},
    session::{LoginStatus, SessionContext},
    views::{ShowCard, WeeklySchedule},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Home,
    AdminDashboard,
}

/// Header and page selection derived from the session and caller role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppView {
    pub page: Page,
    pub is_authenticated: bool,
    pub is_admin: bool,
    pub show_profile_setup: bool,
    pub auth_button_label: &'static str,
    pub auth_button_disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomePage {
    pub shows: Vec<ShowCard>,
    pub schedule: WeeklySchedule,
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileSetupError {
    #[error(transparent)]
    Form(#[from] FormError),
    #[error(transparent)]
    Remote(#[from] SyncError),
}

/// Root composition: public home page or admin dashboard.
pub struct AppShell {
    session: Arc<SessionContext>,
    dashboard_requested: AtomicBool,
}

impl AppShell {
    pub fn new(session: Arc<SessionContext>) -> Self {
        Self {
            session,
            dashboard_requested: AtomicBool::new(false),
        }
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn toggle_dashboard(&self) {
        self.dashboard_requested.fetch_xor(true, Ordering::Relaxed);
    }

    pub async fn view(&self) -> AppView {
        let status = self.session.status().await;
        let is_authenticated = self.session.is_authenticated().await;
        let sync = self.session.sync().await;

        let is_admin = match sync.is_caller_admin().await {
            Ok(is_admin) => is_admin,
            Err(err) => {
                warn!(error = %err, "admin check failed; showing public view");
                false
            }
        };
        let show_profile_setup = is_authenticated && matches!(sync.caller_profile().await, Ok(None));

        let page = if self.dashboard_requested.load(Ordering::Relaxed) && is_admin {
            Page::AdminDashboard
        } else {
            Page::Home
        };
        let logging_in = status == LoginStatus::LoggingIn;
        let auth_button_label = if logging_in {
            "Logging in..."
        } else if is_authenticated {
            "Logout"
        } else {
            "Login"
        };

        AppView {
            page,
            is_authenticated,
            is_admin,
            show_profile_setup,
            auth_button_label,
            auth_button_disabled: logging_in,
        }
    }

    /// Header button: logs out when signed in, otherwise logs in as `principal`.
    pub async fn toggle_auth(&self, principal: Principal) -> Result<()> {
        if self.session.is_authenticated().await {
            self.dashboard_requested.store(false, Ordering::Relaxed);
            self.session.logout().await
        } else {
            self.session.login(principal).await
        }
    }

    pub async fn home(&self) -> Result<HomePage, SyncError> {
        let sync = self.session.sync().await;
        let shows = sync.shows().await?;
        let schedules = sync.schedules().await?;
        Ok(HomePage {
            shows: shows.iter().map(ShowCard::from_show).collect(),
            schedule: WeeklySchedule::build(&schedules, &shows),
        })
    }

    pub async fn admin_console(&self) -> Result<AdminConsole, AdminError> {
        AdminConsole::open(self.session.sync().await).await
    }

    pub async fn complete_profile(&self, draft: &ProfileDraft) -> Result<(), ProfileSetupError> {
        let profile = draft.validate()?;
        self.session.sync().await.save_profile(profile).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/app_tests.rs"]
mod tests;
