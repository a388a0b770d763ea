//! HHMM time encoding used by schedule entries.
//!
//! A time of day is stored as a single integer `hour * 100 + minute`, so
//! `1430` is 2:30 PM. Form input is restricted to quarter hours; decoding
//! accepts any valid minute.

use std::fmt;

use thiserror::Error;

/// Minute values offered by schedule forms.
pub const QUARTER_HOUR_MINUTES: [u8; 4] = [0, 15, 30, 45];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("hour {0} is outside 0-23")]
    HourOutOfRange(u32),
    #[error("minute {0} is outside 0-59")]
    MinuteOutOfRange(u32),
    #[error("minute {0} is not a quarter hour")]
    NotQuarterHour(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self, TimeError> {
        if hour > 23 {
            return Err(TimeError::HourOutOfRange(hour.into()));
        }
        if minute > 59 {
            return Err(TimeError::MinuteOutOfRange(minute.into()));
        }
        Ok(Self { hour, minute })
    }

    /// Like [`TimeOfDay::new`] but only admits the minutes in [`QUARTER_HOUR_MINUTES`].
    pub fn quarter_hour(hour: u8, minute: u8) -> Result<Self, TimeError> {
        if !QUARTER_HOUR_MINUTES.contains(&minute) {
            return Err(TimeError::NotQuarterHour(minute));
        }
        Self::new(hour, minute)
    }

    pub fn decode(encoded: u32) -> Result<Self, TimeError> {
        let hour = encoded / 100;
        let minute = encoded % 100;
        if hour > 23 {
            return Err(TimeError::HourOutOfRange(hour));
        }
        if minute > 59 {
            return Err(TimeError::MinuteOutOfRange(minute));
        }
        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }

    pub fn encode(self) -> u32 {
        u32::from(self.hour) * 100 + u32::from(self.minute)
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }
}

/// 12-hour clock rendering: `0:05` is `12:05 AM`, `12:00` is `12:00 PM`.
impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let period = if self.hour >= 12 { "PM" } else { "AM" };
        let display_hour = match self.hour % 12 {
            0 => 12,
            h => h,
        };
        write!(f, "{display_hour}:{:02} {period}", self.minute)
    }
}

pub fn encode(hour: u8, minute: u8) -> Result<u32, TimeError> {
    TimeOfDay::quarter_hour(hour, minute).map(TimeOfDay::encode)
}

pub fn format_time(encoded: u32) -> Result<String, TimeError> {
    TimeOfDay::decode(encoded).map(|time| time.to_string())
}

/// Renders `start - end`, falling back to the raw integer for values that
/// do not decode.
pub fn format_range(start: u32, end: u32) -> String {
    let render = |value: u32| format_time(value).unwrap_or_else(|_| value.to_string());
    format!("{} - {}", render(start), render(end))
}

/// Checks a start/end pair as stored on a schedule entry.
pub fn validate_range(start: u32, end: u32) -> Result<(), RangeError> {
    TimeOfDay::decode(start).map_err(RangeError::Start)?;
    TimeOfDay::decode(end).map_err(RangeError::End)?;
    if start >= end {
        return Err(RangeError::NotIncreasing { start, end });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("invalid start time: {0}")]
    Start(TimeError),
    #[error("invalid end time: {0}")]
    End(TimeError),
    #[error("end time {end} must be after start time {start}")]
    NotIncreasing { start: u32, end: u32 },
}
