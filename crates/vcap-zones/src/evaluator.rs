//! Zone alarm evaluation over an ordered stream of detection snapshots.
//!
//! Each (zone, alarm) pair moves between three states:
//!
//! ```text
//!            conditions hold            gate open and held >= min_duration
//!   Idle ─────────────────────▶ Satisfying ─────────────────────────────▶ Alerting
//!    ▲                              │  ▲                                      │
//!    └──── conditions fail ─────────┘  └──────────── gate closes ─────────────┤
//!    ▲                                                                        │
//!    └───────────────────────────── conditions fail ──────────────────────────┘
//! ```
//!
//! Entering `Alerting` opens an [`Alert`] with `start_time = now`; leaving it
//! closes the alert with `end_time = now`. The result depends only on the
//! snapshots and their timestamps, so replaying a sequence reproduces it.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vcap_core::DetectionNode;

use crate::alarm::{clock, ZoneAlarm};
use crate::condition::ConditionTracker;
use crate::error::{Result, ZoneError};
use crate::zone::Zone;

/// Detections of one frame at one point in time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameSnapshot {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    #[serde(default)]
    pub detections: Vec<DetectionNode>,
}

impl FrameSnapshot {
    pub fn new(timestamp: f64, detections: Vec<DetectionNode>) -> Self {
        Self {
            timestamp,
            detections,
        }
    }
}

/// An alarm firing. `end_time` is `None` while the alert is open.
///
/// The same shape is published on the alert stream: once when the alert
/// opens and once when it closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub zone: String,
    pub alarm: String,
    pub alert_id: u64,
    pub start_time: f64,
    pub end_time: Option<f64>,
}

impl Alert {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Seconds between start and end, `None` while open.
    pub fn duration(&self) -> Option<f64> {
        self.end_time.map(|end| end - self.start_time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AlarmState {
    Idle,
    /// Conditions have held since `since` but no alert is open
    Satisfying { since: f64 },
    Alerting { since: f64, alert: Alert },
}

/// Per-zone result of one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStatus {
    pub zone: String,
    pub timestamp: f64,
    /// Detections whose centre lies in the zone
    pub within: Vec<DetectionNode>,
    /// Alerts opened or closed by this snapshot, then those still open
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameEvaluation {
    pub timestamp: f64,
    pub zones: Vec<ZoneStatus>,
    /// Alert transitions in zone then alarm order
    pub events: Vec<Alert>,
}

#[derive(Debug, Clone)]
struct AlarmRuntime {
    alarm: ZoneAlarm,
    trackers: Vec<ConditionTracker>,
    state: AlarmState,
}

impl AlarmRuntime {
    fn new(alarm: ZoneAlarm) -> Self {
        Self {
            trackers: alarm.trackers(),
            alarm,
            state: AlarmState::Idle,
        }
    }
}

#[derive(Debug, Clone)]
struct ZoneRuntime {
    zone: Zone,
    alarms: Vec<AlarmRuntime>,
}

impl ZoneRuntime {
    fn new(zone: Zone) -> Self {
        let alarms = zone.alarms.iter().cloned().map(AlarmRuntime::new).collect();
        Self { zone, alarms }
    }
}

#[derive(Debug, Clone)]
pub struct ZoneEvaluator {
    zones: Vec<ZoneRuntime>,
    utc_offset: i32,
    last_timestamp: Option<f64>,
    next_alert_id: u64,
}

impl ZoneEvaluator {
    pub fn new(zones: Vec<Zone>) -> Result<Self> {
        let mut evaluator = Self {
            zones: Vec::with_capacity(zones.len()),
            utc_offset: 0,
            last_timestamp: None,
            next_alert_id: 1,
        };
        for zone in zones {
            evaluator.add_zone(zone)?;
        }
        Ok(evaluator)
    }

    /// Offset in seconds added to snapshot timestamps before the active-time
    /// gate reads the time of day.
    pub fn with_utc_offset(mut self, seconds: i32) -> Self {
        self.utc_offset = seconds;
        self
    }

    pub fn utc_offset(&self) -> i32 {
        self.utc_offset
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter().map(|z| &z.zone)
    }

    pub fn add_zone(&mut self, zone: Zone) -> Result<()> {
        zone.validate()?;
        if self.zones.iter().any(|z| z.zone.name == zone.name) {
            return Err(ZoneError::DuplicateZone(zone.name));
        }
        debug!(zone = %zone.name, alarms = zone.alarms.len(), "zone added");
        self.zones.push(ZoneRuntime::new(zone));
        Ok(())
    }

    /// Remove a zone, closing its open alerts at the last snapshot time.
    pub fn remove_zone(&mut self, name: &str) -> Result<Vec<Alert>> {
        let index = self
            .zones
            .iter()
            .position(|z| z.zone.name == name)
            .ok_or_else(|| ZoneError::UnknownZone(name.to_string()))?;
        let mut runtime = self.zones.remove(index);

        let mut closed = Vec::new();
        if let Some(now) = self.last_timestamp {
            for alarm in &mut runtime.alarms {
                if let Some(alert) = close(alarm, now, AlarmState::Idle, self.utc_offset) {
                    closed.push(alert);
                }
            }
        }
        Ok(closed)
    }

    pub fn state(&self, zone: &str, alarm: &str) -> Option<&AlarmState> {
        self.zones
            .iter()
            .find(|z| z.zone.name == zone)?
            .alarms
            .iter()
            .find(|a| a.alarm.name == alarm)
            .map(|a| &a.state)
    }

    pub fn open_alerts(&self) -> Vec<Alert> {
        self.zones
            .iter()
            .flat_map(|z| z.alarms.iter())
            .filter_map(|a| match &a.state {
                AlarmState::Alerting { alert, .. } => Some(alert.clone()),
                _ => None,
            })
            .collect()
    }

    /// Advance every alarm to the snapshot's timestamp.
    ///
    /// Timestamps must not decrease; a rejected snapshot leaves the evaluator
    /// untouched. Detections without a valid polygon are skipped.
    pub fn ingest(&mut self, snapshot: &FrameSnapshot) -> Result<FrameEvaluation> {
        let now = snapshot.timestamp;
        if !now.is_finite() {
            return Err(ZoneError::InvalidTimestamp(now));
        }
        if let Some(last) = self.last_timestamp {
            if now < last {
                return Err(ZoneError::OutOfOrder { last, got: now });
            }
        }
        self.last_timestamp = Some(now);

        let detections = usable_detections(now, &snapshot.detections);
        let utc_offset = self.utc_offset;
        let mut events = Vec::new();
        let mut statuses = Vec::with_capacity(self.zones.len());

        for runtime in &mut self.zones {
            let polygon = &runtime.zone.coords;
            let mut zone_events = Vec::new();

            for alarm in &mut runtime.alarms {
                let results: Vec<bool> = alarm
                    .trackers
                    .iter_mut()
                    .map(|t| t.observe(now, polygon, &detections))
                    .collect();
                let holds = alarm.alarm.combined(&results);
                let gate = alarm.alarm.gate_open(now, utc_offset);

                if let Some(event) = step(
                    alarm,
                    &runtime.zone.name,
                    now,
                    holds,
                    gate,
                    utc_offset,
                    &mut self.next_alert_id,
                ) {
                    zone_events.push(event);
                }
            }

            let mut alerts = zone_events.clone();
            alerts.extend(runtime.alarms.iter().filter_map(|a| match &a.state {
                AlarmState::Alerting { alert, .. }
                    if !zone_events.iter().any(|e| e.alert_id == alert.alert_id) =>
                {
                    Some(alert.clone())
                }
                _ => None,
            }));

            statuses.push(ZoneStatus {
                zone: runtime.zone.name.clone(),
                timestamp: now,
                within: runtime
                    .zone
                    .within(&detections)
                    .into_iter()
                    .cloned()
                    .collect(),
                alerts,
            });
            events.extend(zone_events);
        }

        Ok(FrameEvaluation {
            timestamp: now,
            zones: statuses,
            events,
        })
    }

    /// Close every open alert with `end_time = now` and return the closed
    /// alerts. Condition windows are kept so evaluation can resume.
    pub fn flush(&mut self, now: f64) -> Result<Vec<Alert>> {
        if !now.is_finite() {
            return Err(ZoneError::InvalidTimestamp(now));
        }
        if let Some(last) = self.last_timestamp {
            if now < last {
                return Err(ZoneError::OutOfOrder { last, got: now });
            }
        }
        self.last_timestamp = Some(now);

        let utc_offset = self.utc_offset;
        let mut closed = Vec::new();
        for runtime in &mut self.zones {
            for alarm in &mut runtime.alarms {
                if let Some(alert) = close(alarm, now, AlarmState::Idle, utc_offset) {
                    closed.push(alert);
                }
            }
        }
        Ok(closed)
    }
}

/// Detections with a usable polygon. The rest are logged and left out.
fn usable_detections(now: f64, detections: &[DetectionNode]) -> Cow<'_, [DetectionNode]> {
    if detections.iter().all(|d| d.validate().is_ok()) {
        return Cow::Borrowed(detections);
    }
    Cow::Owned(
        detections
            .iter()
            .filter(|d| match d.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(timestamp = now, "Ignoring detection: {}", e);
                    false
                }
            })
            .cloned()
            .collect(),
    )
}

/// Apply one observation to an alarm; returns the alert it opened or closed.
fn step(
    alarm: &mut AlarmRuntime,
    zone: &str,
    now: f64,
    holds: bool,
    gate: bool,
    utc_offset: i32,
    next_alert_id: &mut u64,
) -> Option<Alert> {
    if !holds {
        return match alarm.state {
            AlarmState::Idle => None,
            AlarmState::Satisfying { .. } => {
                alarm.state = AlarmState::Idle;
                None
            }
            AlarmState::Alerting { .. } => close(alarm, now, AlarmState::Idle, utc_offset),
        };
    }

    match alarm.state {
        AlarmState::Idle | AlarmState::Satisfying { .. } => {
            let since = match alarm.state {
                AlarmState::Satisfying { since } => since,
                _ => now,
            };
            if gate && now - since >= alarm.alarm.min_duration {
                let alert = Alert {
                    zone: zone.to_string(),
                    alarm: alarm.alarm.name.clone(),
                    alert_id: *next_alert_id,
                    start_time: now,
                    end_time: None,
                };
                *next_alert_id += 1;
                info!(
                    zone,
                    alarm = %alarm.alarm.name,
                    alert_id = alert.alert_id,
                    at = %clock(now, utc_offset),
                    "alert opened"
                );
                alarm.state = AlarmState::Alerting {
                    since,
                    alert: alert.clone(),
                };
                Some(alert)
            } else {
                alarm.state = AlarmState::Satisfying { since };
                None
            }
        }
        AlarmState::Alerting { since, .. } if !gate => {
            close(alarm, now, AlarmState::Satisfying { since }, utc_offset)
        }
        AlarmState::Alerting { .. } => None,
    }
}

/// Close an open alert, moving the alarm to `next`. No-op unless alerting.
fn close(alarm: &mut AlarmRuntime, now: f64, next: AlarmState, utc_offset: i32) -> Option<Alert> {
    if !matches!(alarm.state, AlarmState::Alerting { .. }) {
        return None;
    }
    match std::mem::replace(&mut alarm.state, next) {
        AlarmState::Alerting { mut alert, .. } => {
            alert.end_time = Some(now);
            info!(
                zone = %alert.zone,
                alarm = %alert.alarm,
                alert_id = alert.alert_id,
                duration = now - alert.start_time,
                at = %clock(now, utc_offset),
                "alert closed"
            );
            Some(alert)
        }
        _ => None,
    }
}
