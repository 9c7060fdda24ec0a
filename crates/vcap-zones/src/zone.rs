use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use vcap_core::{point_in_polygon, DetectionNode, Point};

use crate::alarm::ZoneAlarm;
use crate::error::{Result, ZoneError};

/// A named polygon in pixel space with the alarms watching it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub coords: Vec<Point>,
    #[serde(default)]
    pub alarms: Vec<ZoneAlarm>,
}

impl Zone {
    pub fn new(name: impl Into<String>, coords: Vec<Point>) -> Self {
        Self {
            name: name.into(),
            coords,
            alarms: Vec::new(),
        }
    }

    pub fn with_alarm(mut self, alarm: ZoneAlarm) -> Self {
        self.alarms.push(alarm);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ZoneError::EmptyZoneName);
        }
        if self.coords.len() < 3 || self.coords.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(ZoneError::InvalidPolygon {
                zone: self.name.clone(),
                points: self.coords.len(),
            });
        }

        let mut seen = BTreeSet::new();
        for alarm in &self.alarms {
            if !seen.insert(alarm.name.as_str()) {
                return Err(ZoneError::DuplicateAlarm {
                    zone: self.name.clone(),
                    alarm: alarm.name.clone(),
                });
            }
            alarm.validate()?;
        }
        Ok(())
    }

    /// Whether the centre of the detection's bounding rectangle is inside.
    pub fn contains(&self, node: &DetectionNode) -> bool {
        point_in_polygon(&node.center(), &self.coords)
    }

    /// Detections whose centre lies in the zone.
    pub fn within<'a>(&self, detections: &'a [DetectionNode]) -> Vec<&'a DetectionNode> {
        detections.iter().filter(|d| self.contains(d)).collect()
    }
}
