//! Form drafts for shows, schedules and profiles.
//!
//! Each draft validates locally and produces the payload for one mutation.
//! A draft that fails validation never reaches the backend.

use shared::{
    domain::{DayOfWeek, ImageRef, Schedule, Show, ShowId, UserProfile},
    protocol::ScheduleRequest,
    schedule_time::{TimeError, TimeOfDay},
};
use thiserror::Error;

use crate::{blob::ExternalBlob, sync::ShowInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("Please fill in all fields")]
    MissingFields,
    #[error("Please select an image")]
    MissingImage,
    #[error("Please select an image file")]
    NotAnImage,
    #[error("End time must be after start time")]
    EndNotAfterStart,
    #[error("Invalid time: {0}")]
    InvalidTime(TimeError),
}

/// An image file picked for upload. Only `image/*` types are accepted.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    bytes: Vec<u8>,
    mime_type: String,
}

impl ImageUpload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Result<Self, FormError> {
        let mime_type = mime_type.into();
        if !mime_type.trim().to_ascii_lowercase().starts_with("image/") {
            return Err(FormError::NotAnImage);
        }
        Ok(Self { bytes, mime_type })
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_blob(self) -> ExternalBlob {
        ExternalBlob::from_bytes(self.bytes).with_content_type(self.mime_type)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShowDraft {
    pub id: String,
    pub title: String,
    pub description: String,
    pub image: Option<ImageUpload>,
}

impl ShowDraft {
    pub fn validate(self) -> Result<(ShowId, ShowInput), FormError> {
        let id = self.id.trim();
        let title = self.title.trim();
        let description = self.description.trim();
        if id.is_empty() || title.is_empty() || description.is_empty() {
            return Err(FormError::MissingFields);
        }
        let image = self.image.ok_or(FormError::MissingImage)?;
        Ok((
            ShowId::new(id),
            ShowInput {
                title: title.to_string(),
                description: description.to_string(),
                image: image.into_blob(),
            },
        ))
    }
}

/// Edits an existing show. Without a new image the stored one is kept.
#[derive(Debug, Clone)]
pub struct ShowEditDraft {
    pub id: ShowId,
    pub title: String,
    pub description: String,
    pub image: Option<ImageUpload>,
    current_image: ImageRef,
}

impl ShowEditDraft {
    pub fn from_show(show: &Show) -> Self {
        Self {
            id: show.id.clone(),
            title: show.title.clone(),
            description: show.description.clone(),
            image: None,
            current_image: show.image.clone(),
        }
    }

    pub fn validate(self) -> Result<(ShowId, ShowInput), FormError> {
        let title = self.title.trim();
        let description = self.description.trim();
        if title.is_empty() || description.is_empty() {
            return Err(FormError::MissingFields);
        }
        let image = match self.image {
            Some(upload) => upload.into_blob(),
            None => ExternalBlob::from(&self.current_image),
        };
        Ok((
            self.id,
            ShowInput {
                title: title.to_string(),
                description: description.to_string(),
                image,
            },
        ))
    }
}

/// Add/edit schedule form. Minutes default to `00`; hours must be chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleDraft {
    pub show_id: Option<ShowId>,
    pub day_of_week: Option<DayOfWeek>,
    pub start_hour: Option<u8>,
    pub start_minute: u8,
    pub end_hour: Option<u8>,
    pub end_minute: u8,
    /// Start and end minutes of the entry being edited. They stay valid even
    /// when off the quarter-hour grid.
    pub stored_minutes: (Option<u8>, Option<u8>),
}

impl ScheduleDraft {
    /// Pre-fills the form from a stored entry by decoding its HHMM times.
    /// Times that do not decode leave the hour unselected.
    pub fn from_schedule(schedule: &Schedule) -> Self {
        let start = TimeOfDay::decode(schedule.start_time).ok();
        let end = TimeOfDay::decode(schedule.end_time).ok();
        Self {
            show_id: Some(schedule.show_id.clone()),
            day_of_week: Some(schedule.day_of_week),
            start_hour: start.map(TimeOfDay::hour),
            start_minute: start.map(TimeOfDay::minute).unwrap_or(0),
            end_hour: end.map(TimeOfDay::hour),
            end_minute: end.map(TimeOfDay::minute).unwrap_or(0),
            stored_minutes: (start.map(TimeOfDay::minute), end.map(TimeOfDay::minute)),
        }
    }

    pub fn validate(&self) -> Result<ScheduleRequest, FormError> {
        let (Some(show_id), Some(day_of_week), Some(start_hour), Some(end_hour)) = (
            self.show_id.as_ref().filter(|id| !id.as_str().trim().is_empty()),
            self.day_of_week,
            self.start_hour,
            self.end_hour,
        ) else {
            return Err(FormError::MissingFields);
        };

        let start = form_time(start_hour, self.start_minute, self.stored_minutes.0)?.encode();
        let end = form_time(end_hour, self.end_minute, self.stored_minutes.1)?.encode();
        if start >= end {
            return Err(FormError::EndNotAfterStart);
        }
        Ok(ScheduleRequest {
            show_id: show_id.clone(),
            start_time: start,
            end_time: end,
            day_of_week,
        })
    }
}

fn form_time(hour: u8, minute: u8, stored: Option<u8>) -> Result<TimeOfDay, FormError> {
    if stored == Some(minute) {
        TimeOfDay::new(hour, minute)
    } else {
        TimeOfDay::quarter_hour(hour, minute)
    }
    .map_err(FormError::InvalidTime)
}

#[derive(Debug, Clone, Default)]
pub struct ProfileDraft {
    pub name: String,
}

impl ProfileDraft {
    pub fn validate(&self) -> Result<UserProfile, FormError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(FormError::MissingFields);
        }
        Ok(UserProfile {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "tests/forms_tests.rs"]
mod tests;
