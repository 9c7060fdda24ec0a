//! Zone alarms: a set of conditions, how they combine, and when the alarm may
//! fire.

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::condition::{ConditionTracker, CountCondition, RateCondition};
use crate::error::{Result, ZoneError};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// How an alarm's conditions combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combine {
    /// Every condition must hold
    #[default]
    All,
    /// At least one condition must hold
    Any,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneAlarm {
    pub name: String,
    #[serde(default)]
    pub count_conditions: Vec<CountCondition>,
    #[serde(default)]
    pub rate_conditions: Vec<RateCondition>,
    #[serde(default)]
    pub combine: Combine,
    #[serde(default)]
    pub use_active_time: bool,
    #[serde(default = "midnight")]
    pub active_start_time: NaiveTime,
    #[serde(default = "midnight")]
    pub active_end_time: NaiveTime,
    /// Seconds the conditions must hold continuously before an alert opens
    #[serde(default)]
    pub min_duration: f64,
}

fn midnight() -> NaiveTime {
    NaiveTime::default()
}

impl ZoneAlarm {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count_conditions: Vec::new(),
            rate_conditions: Vec::new(),
            combine: Combine::All,
            use_active_time: false,
            active_start_time: midnight(),
            active_end_time: midnight(),
            min_duration: 0.0,
        }
    }

    pub fn with_count(mut self, condition: CountCondition) -> Self {
        self.count_conditions.push(condition);
        self
    }

    pub fn with_rate(mut self, condition: RateCondition) -> Self {
        self.rate_conditions.push(condition);
        self
    }

    pub fn combine(mut self, combine: Combine) -> Self {
        self.combine = combine;
        self
    }

    /// Restrict the alarm to a time-of-day window. Wraps past midnight when
    /// `start > end`.
    pub fn active_between(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.use_active_time = true;
        self.active_start_time = start;
        self.active_end_time = end;
        self
    }

    pub fn min_duration(mut self, seconds: f64) -> Self {
        self.min_duration = seconds;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.count_conditions.is_empty() && self.rate_conditions.is_empty() {
            return Err(ZoneError::InvalidCondition {
                alarm: self.name.clone(),
                reason: "alarm has no conditions".to_string(),
            });
        }
        if !(self.min_duration.is_finite() && self.min_duration >= 0.0) {
            return Err(ZoneError::InvalidCondition {
                alarm: self.name.clone(),
                reason: format!("min_duration {} must be >= 0", self.min_duration),
            });
        }
        for c in &self.count_conditions {
            c.validate(&self.name)?;
        }
        for c in &self.rate_conditions {
            c.validate(&self.name)?;
        }
        Ok(())
    }

    /// Whether the active-time gate is open at `timestamp` (seconds since the
    /// Unix epoch), shifted into local time by `utc_offset` seconds.
    pub fn gate_open(&self, timestamp: f64, utc_offset: i32) -> bool {
        if !self.use_active_time {
            return true;
        }
        let now = time_of_day(timestamp + utc_offset as f64);
        let (start, end) = (self.active_start_time, self.active_end_time);
        if start <= end {
            start <= now && now <= end
        } else {
            now >= start || now <= end
        }
    }

    pub(crate) fn trackers(&self) -> Vec<ConditionTracker> {
        self.count_conditions
            .iter()
            .map(ConditionTracker::count)
            .chain(self.rate_conditions.iter().map(ConditionTracker::rate))
            .collect()
    }

    pub(crate) fn combined(&self, results: &[bool]) -> bool {
        match self.combine {
            Combine::All => results.iter().all(|&r| r),
            Combine::Any => results.iter().any(|&r| r),
        }
    }
}

fn time_of_day(seconds: f64) -> NaiveTime {
    let secs = seconds.rem_euclid(SECONDS_PER_DAY);
    let whole = secs.floor();
    let nanos = (((secs - whole) * 1e9) as u32).min(999_999_999);
    NaiveTime::from_num_seconds_from_midnight_opt(whole as u32, nanos).unwrap_or_default()
}

/// Local wall-clock time for log lines.
pub(crate) fn clock(timestamp: f64, utc_offset: i32) -> String {
    let t = time_of_day(timestamp + utc_offset as f64);
    format!("{:02}:{:02}:{:02}", t.hour(), t.minute(), t.second())
}
