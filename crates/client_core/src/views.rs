use std::collections::HashMap;

use chrono::{Local, NaiveTime, Timelike};
use shared::{
    domain::{DayOfWeek, Schedule, ScheduleId, Show, ShowId},
    schedule_time::format_range,
};

pub const PLACEHOLDER_IMAGE: &str = "/assets/generated/show-placeholder.dim_400x300.jpg";
pub const UNKNOWN_SHOW: &str = "Unknown Show";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowCard {
    pub id: ShowId,
    pub title: String,
    pub description: String,
    pub image_url: String,
}

impl ShowCard {
    pub fn from_show(show: &Show) -> Self {
        let image_url = match show.image.as_str().trim() {
            "" => PLACEHOLDER_IMAGE.to_string(),
            url => url.to_string(),
        };
        Self {
            id: show.id.clone(),
            title: show.title.clone(),
            description: show.description.clone(),
            image_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub id: ScheduleId,
    pub show_id: ShowId,
    pub show_title: String,
    pub start_time: u32,
    pub end_time: u32,
    /// e.g. `2:30 PM - 4:00 PM`
    pub time_range: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySchedule {
    pub day: DayOfWeek,
    pub entries: Vec<ScheduleEntry>,
}

/// Seven day groups, Monday first, each sorted by start time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklySchedule {
    days: Vec<DaySchedule>,
}

impl WeeklySchedule {
    pub fn build(schedules: &[Schedule], shows: &[Show]) -> Self {
        let titles: HashMap<&ShowId, &str> = shows
            .iter()
            .map(|show| (&show.id, show.title.as_str()))
            .collect();

        let days = DayOfWeek::ALL
            .iter()
            .map(|&day| {
                let mut entries: Vec<ScheduleEntry> = schedules
                    .iter()
                    .filter(|schedule| schedule.day_of_week == day)
                    .map(|schedule| ScheduleEntry {
                        id: schedule.id,
                        show_id: schedule.show_id.clone(),
                        show_title: titles
                            .get(&schedule.show_id)
                            .copied()
                            .unwrap_or(UNKNOWN_SHOW)
                            .to_string(),
                        start_time: schedule.start_time,
                        end_time: schedule.end_time,
                        time_range: format_range(schedule.start_time, schedule.end_time),
                    })
                    .collect();
                entries.sort_by_key(|entry| entry.start_time);
                DaySchedule { day, entries }
            })
            .collect();
        Self { days }
    }

    pub fn days(&self) -> &[DaySchedule] {
        &self.days
    }

    pub fn day(&self, day: DayOfWeek) -> Option<&DaySchedule> {
        self.days.iter().find(|group| group.day == day)
    }

    pub fn is_empty(&self) -> bool {
        self.days.iter().all(|group| group.entries.is_empty())
    }
}

/// Wall-clock time as HHMM, minutes not rounded.
pub fn hhmm(time: NaiveTime) -> u32 {
    time.hour() * 100 + time.minute()
}

pub fn local_hhmm() -> u32 {
    hhmm(Local::now().time())
}

#[cfg(test)]
#[path = "tests/views_tests.rs"]
mod tests;
