use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::stream;
use reqwest::{Body, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{
        DayOfWeek, ImageRef, Principal, Schedule, ScheduleId, Show, ShowId, UserProfile, UserRole,
    },
    error::{ApiError, ApiException},
    protocol::{
        AddShowRequest, AssignRoleRequest, BlobUploadResponse, EditShowRequest, LoginRequest,
        LoginResponse, SaveProfileRequest, ScheduleRequest, BLOBS_ROUTE, CALLER_IS_ADMIN_ROUTE,
        CALLER_PROFILE_ROUTE, CALLER_ROLE_ROUTE, SCHEDULES_ROUTE, SESSION_ROUTE, SHOWS_ROUTE,
        UPCOMING_SCHEDULES_ROUTE,
    },
};
use tracing::{debug, info};
use url::Url;

use crate::{
    api::BackendApi,
    blob::{ExternalBlob, UploadProgress},
};

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// [`BackendApi`] over the catalog server's JSON routes.
#[derive(Clone)]
pub struct HttpBackend {
    http: Client,
    base: Url,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(server_url: &str) -> Result<Self> {
        let base = Url::parse(server_url.trim())
            .with_context(|| format!("invalid server url '{server_url}'"))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("server url '{server_url}' cannot carry paths"));
        }
        Ok(Self {
            http: Client::new(),
            base,
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn server_url(&self) -> &Url {
        &self.base
    }

    /// Exchanges a principal for a session token.
    pub async fn login(&self, principal: &Principal) -> Result<LoginResponse> {
        let response = self
            .http
            .post(self.route(SESSION_ROUTE, &[])?)
            .json(&LoginRequest {
                principal: principal.clone(),
            })
            .send()
            .await?;
        let login: LoginResponse = read_json(response).await?;
        info!(principal = %principal, role = %login.role, "catalog session opened");
        Ok(login)
    }

    /// Joins the base URL with a fixed route and escaped dynamic segments.
    fn route(&self, fixed: &str, dynamic: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("server url cannot carry paths"))?;
            segments.pop_if_empty();
            segments.extend(fixed.split('/').filter(|s| !s.is_empty()));
            segments.extend(dynamic);
        }
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.authorized(self.http.get(url)).send().await?;
        read_json(response).await
    }

    fn absolute(&self, url: &str) -> Result<String> {
        Ok(self
            .base
            .join(url)
            .with_context(|| format!("invalid blob url '{url}'"))?
            .to_string())
    }

    async fn upload_bytes(
        &self,
        bytes: Arc<[u8]>,
        content_type: &str,
        progress: Option<UploadProgress>,
    ) -> Result<BlobUploadResponse> {
        let total = bytes.len();
        let chunks: Vec<std::io::Result<Vec<u8>>> = bytes
            .chunks(UPLOAD_CHUNK_BYTES)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        let reporter = progress.clone();
        let mut sent = 0usize;
        let body = stream::iter(chunks.into_iter().map(move |chunk| {
            if let (Ok(data), Some(report)) = (&chunk, &reporter) {
                sent += data.len();
                // 100 is reserved for the server's acknowledgement.
                report(upload_percent(sent, total).min(99));
            }
            chunk
        }));

        if let Some(report) = &progress {
            report(0);
        }
        let response = self
            .authorized(self.http.post(self.route(BLOBS_ROUTE, &[])?))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::CONTENT_LENGTH, total)
            .body(Body::wrap_stream(body))
            .send()
            .await?;
        let stored: BlobUploadResponse = read_json(response).await?;
        if let Some(report) = &progress {
            report(100);
        }
        debug!(blob_id = %stored.blob_id, size_bytes = stored.size_bytes, "blob uploaded");
        Ok(stored)
    }
}

pub(crate) fn upload_percent(sent: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent.min(total) * 100) / total) as u8
}

/// Decodes a success body, or lifts the server's [`ApiError`] into the
/// returned error.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = check(response).await?;
    Ok(response.json().await?)
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => Err(ApiException::from(api_error).into()),
        Err(_) if body.trim().is_empty() => Err(anyhow!("request failed with status {status}")),
        Err(_) => Err(anyhow!("request failed with status {status}: {body}")),
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn get_all_shows(&self) -> Result<Vec<Show>> {
        self.get_json(self.route(SHOWS_ROUTE, &[])?).await
    }

    async fn get_show(&self, id: &ShowId) -> Result<Show> {
        self.get_json(self.route(SHOWS_ROUTE, &[id.as_str()])?).await
    }

    async fn add_show(&self, req: AddShowRequest) -> Result<Show> {
        let response = self
            .authorized(self.http.post(self.route(SHOWS_ROUTE, &[])?))
            .json(&req)
            .send()
            .await?;
        read_json(response).await
    }

    async fn edit_show(&self, id: &ShowId, req: EditShowRequest) -> Result<Show> {
        let response = self
            .authorized(self.http.put(self.route(SHOWS_ROUTE, &[id.as_str()])?))
            .json(&req)
            .send()
            .await?;
        read_json(response).await
    }

    async fn delete_show(&self, id: &ShowId) -> Result<()> {
        let response = self
            .authorized(self.http.delete(self.route(SHOWS_ROUTE, &[id.as_str()])?))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn get_all_schedules(&self) -> Result<Vec<Schedule>> {
        self.get_json(self.route(SCHEDULES_ROUTE, &[])?).await
    }

    async fn get_schedules_by_day(&self, day: DayOfWeek) -> Result<Vec<Schedule>> {
        self.get_json(self.route(SCHEDULES_ROUTE, &["day", day.label()])?)
            .await
    }

    async fn get_schedules_by_show(&self, show_id: &ShowId) -> Result<Vec<Schedule>> {
        self.get_json(self.route(SCHEDULES_ROUTE, &["show", show_id.as_str()])?)
            .await
    }

    async fn get_upcoming_schedules(&self, current_time: u32) -> Result<Vec<Schedule>> {
        let mut url = self.route(UPCOMING_SCHEDULES_ROUTE, &[])?;
        url.query_pairs_mut()
            .append_pair("current_time", &current_time.to_string());
        self.get_json(url).await
    }

    async fn add_schedule(&self, req: ScheduleRequest) -> Result<Schedule> {
        let response = self
            .authorized(self.http.post(self.route(SCHEDULES_ROUTE, &[])?))
            .json(&req)
            .send()
            .await?;
        read_json(response).await
    }

    async fn edit_schedule(&self, id: ScheduleId, req: ScheduleRequest) -> Result<Schedule> {
        let id = id.to_string();
        let response = self
            .authorized(self.http.put(self.route(SCHEDULES_ROUTE, &[id.as_str()])?))
            .json(&req)
            .send()
            .await?;
        read_json(response).await
    }

    async fn delete_schedule(&self, id: ScheduleId) -> Result<()> {
        let id = id.to_string();
        let response = self
            .authorized(self.http.delete(self.route(SCHEDULES_ROUTE, &[id.as_str()])?))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn get_caller_user_profile(&self) -> Result<Option<UserProfile>> {
        self.get_json(self.route(CALLER_PROFILE_ROUTE, &[])?).await
    }

    async fn save_caller_user_profile(&self, profile: UserProfile) -> Result<()> {
        let response = self
            .authorized(self.http.put(self.route(CALLER_PROFILE_ROUTE, &[])?))
            .json(&SaveProfileRequest { profile })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn get_user_profile(&self, principal: &Principal) -> Result<Option<UserProfile>> {
        self.get_json(self.route("/users", &[principal.as_str(), "profile"])?)
            .await
    }

    async fn get_caller_user_role(&self) -> Result<UserRole> {
        self.get_json(self.route(CALLER_ROLE_ROUTE, &[])?).await
    }

    async fn is_caller_admin(&self) -> Result<bool> {
        self.get_json(self.route(CALLER_IS_ADMIN_ROUTE, &[])?).await
    }

    async fn assign_caller_user_role(&self, principal: &Principal, role: UserRole) -> Result<()> {
        let response = self
            .authorized(
                self.http
                    .put(self.route("/users", &[principal.as_str(), "role"])?),
            )
            .json(&AssignRoleRequest { role })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn upload_blob(&self, blob: &ExternalBlob) -> Result<ImageRef> {
        if let Some(existing) = blob.existing_ref() {
            return Ok(existing);
        }
        let Some(bytes) = blob.pending_bytes() else {
            return Err(anyhow!("blob has neither bytes nor url"));
        };
        let stored = self
            .upload_bytes(bytes, blob.content_type(), blob.progress())
            .await?;
        Ok(ImageRef::new(self.absolute(&stored.url)?))
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
