//! Alarm conditions.
//!
//! A count condition holds when, over its window, the number of matching
//! detections in the zone satisfied the comparison for at least
//! `window_threshold` of the time. A rate condition holds when the number of
//! detections entering and/or leaving the zone per second over its window
//! satisfies the comparison.

use serde::{Deserialize, Serialize};
use vcap_core::{point_in_polygon, DetectionNode, Point};

use crate::error::{Result, ZoneError};
use crate::window::SlidingWindow;

/// Comparison applied to a count or rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Comparator {
    #[serde(alias = "<")]
    LessThan,
    #[serde(alias = "<=")]
    LessThanOrEqualTo,
    #[serde(alias = "==", alias = "=")]
    EqualTo,
    #[serde(alias = "!=")]
    NotEqualTo,
    #[serde(alias = ">=")]
    GreaterThanOrEqualTo,
    #[serde(alias = ">")]
    GreaterThan,
}

impl Comparator {
    pub fn test(&self, value: f64, check: f64) -> bool {
        match self {
            Self::LessThan => value < check,
            Self::LessThanOrEqualTo => value <= check,
            Self::EqualTo => value == check,
            Self::NotEqualTo => value != check,
            Self::GreaterThanOrEqualTo => value >= check,
            Self::GreaterThan => value > check,
        }
    }
}

impl std::fmt::Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::LessThan => "<",
            Self::LessThanOrEqualTo => "<=",
            Self::EqualTo => "==",
            Self::NotEqualTo => "!=",
            Self::GreaterThanOrEqualTo => ">=",
            Self::GreaterThan => ">",
        };
        write!(f, "{}", s)
    }
}

/// Which point of a detection's bounding rectangle is tested against the
/// zone polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntersectionPoint {
    Center,
    #[default]
    Bottom,
    Top,
    Left,
    Right,
}

impl IntersectionPoint {
    pub fn of(&self, node: &DetectionNode) -> Point {
        let bbox = node.bbox();
        match self {
            Self::Center => bbox.center(),
            Self::Bottom => bbox.bottom(),
            Self::Top => bbox.top(),
            Self::Left => bbox.left(),
            Self::Right => bbox.right(),
        }
    }
}

/// Attribute a detection must carry, e.g. `color = red`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub category: String,
    pub value: String,
}

/// Selects the detections a condition counts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionFilter {
    #[serde(default)]
    pub with_class_name: Option<String>,
    #[serde(default)]
    pub with_attribute: Option<AttributeFilter>,
    #[serde(default)]
    pub intersection_point: IntersectionPoint,
}

impl DetectionFilter {
    pub fn matches(&self, node: &DetectionNode) -> bool {
        if let Some(name) = &self.with_class_name {
            if &node.name != name {
                return false;
            }
        }
        if let Some(attr) = &self.with_attribute {
            if !node.has_attribute(&attr.category, &attr.value) {
                return false;
            }
        }
        true
    }

    /// Matching detections whose intersection point lies in `polygon`.
    pub fn count_in(&self, polygon: &[Point], detections: &[DetectionNode]) -> usize {
        detections
            .iter()
            .filter(|d| self.matches(d))
            .filter(|d| point_in_polygon(&self.intersection_point.of(d), polygon))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountCondition {
    pub test: Comparator,
    pub check_value: f64,
    #[serde(flatten)]
    pub filter: DetectionFilter,
    /// Seconds of history considered
    pub window_duration: f64,
    /// Fraction of the window (0..=1) during which the comparison must hold
    pub window_threshold: f64,
}

impl CountCondition {
    pub fn new(test: Comparator, check_value: f64) -> Self {
        Self {
            test,
            check_value,
            filter: DetectionFilter::default(),
            window_duration: 0.0,
            window_threshold: 1.0,
        }
    }

    pub fn with_class_name(mut self, name: impl Into<String>) -> Self {
        self.filter.with_class_name = Some(name.into());
        self
    }

    pub fn with_attribute(mut self, category: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter.with_attribute = Some(AttributeFilter {
            category: category.into(),
            value: value.into(),
        });
        self
    }

    pub fn intersection_point(mut self, point: IntersectionPoint) -> Self {
        self.filter.intersection_point = point;
        self
    }

    pub fn window(mut self, duration: f64, threshold: f64) -> Self {
        self.window_duration = duration;
        self.window_threshold = threshold;
        self
    }

    pub(crate) fn validate(&self, alarm: &str) -> Result<()> {
        let invalid = |reason: String| ZoneError::InvalidCondition {
            alarm: alarm.to_string(),
            reason,
        };
        if !self.check_value.is_finite() {
            return Err(invalid("check_value must be finite".to_string()));
        }
        if !(self.window_duration.is_finite() && self.window_duration >= 0.0) {
            return Err(invalid(format!(
                "window_duration {} must be a non-negative number of seconds",
                self.window_duration
            )));
        }
        if !(0.0..=1.0).contains(&self.window_threshold) {
            return Err(invalid(format!(
                "window_threshold {} must be within [0, 1]",
                self.window_threshold
            )));
        }
        Ok(())
    }
}

/// Which zone crossings a rate condition counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Entering,
    Exiting,
    EnteringOrExiting,
}

impl Direction {
    /// Crossings implied by a change in the in-zone count between frames.
    fn events(&self, prev: f64, cur: f64) -> f64 {
        match self {
            Self::Entering => (cur - prev).max(0.0),
            Self::Exiting => (prev - cur).max(0.0),
            Self::EnteringOrExiting => (cur - prev).abs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateCondition {
    pub test: Comparator,
    /// Events per second
    pub check_value: f64,
    #[serde(default)]
    pub direction: Direction,
    #[serde(flatten)]
    pub filter: DetectionFilter,
    /// Seconds over which the rate is measured, must be positive
    pub window_duration: f64,
}

impl RateCondition {
    pub fn new(test: Comparator, check_value: f64, direction: Direction, window_duration: f64) -> Self {
        Self {
            test,
            check_value,
            direction,
            filter: DetectionFilter::default(),
            window_duration,
        }
    }

    pub fn with_class_name(mut self, name: impl Into<String>) -> Self {
        self.filter.with_class_name = Some(name.into());
        self
    }

    pub(crate) fn validate(&self, alarm: &str) -> Result<()> {
        if !self.check_value.is_finite() {
            return Err(ZoneError::InvalidCondition {
                alarm: alarm.to_string(),
                reason: "check_value must be finite".to_string(),
            });
        }
        if !(self.window_duration.is_finite() && self.window_duration > 0.0) {
            return Err(ZoneError::InvalidCondition {
                alarm: alarm.to_string(),
                reason: format!(
                    "rate window_duration {} must be a positive number of seconds",
                    self.window_duration
                ),
            });
        }
        Ok(())
    }
}

/// Runtime state of one condition: its window of in-zone counts.
#[derive(Debug, Clone)]
pub(crate) enum ConditionTracker {
    Count(CountCondition, SlidingWindow),
    Rate(RateCondition, SlidingWindow),
}

impl ConditionTracker {
    pub(crate) fn count(condition: &CountCondition) -> Self {
        Self::Count(
            condition.clone(),
            SlidingWindow::new(condition.window_duration),
        )
    }

    pub(crate) fn rate(condition: &RateCondition) -> Self {
        Self::Rate(
            condition.clone(),
            SlidingWindow::new(condition.window_duration),
        )
    }

    /// Record this frame and report whether the condition holds at `now`.
    pub(crate) fn observe(&mut self, now: f64, polygon: &[Point], detections: &[DetectionNode]) -> bool {
        match self {
            Self::Count(cond, window) => {
                let count = cond.filter.count_in(polygon, detections) as f64;
                window.push(now, count);
                let (test, check) = (cond.test, cond.check_value);
                window
                    .fraction(now, |c| test.test(c, check))
                    .map(|f| f >= cond.window_threshold)
                    .unwrap_or(false)
            }
            Self::Rate(cond, window) => {
                let count = cond.filter.count_in(polygon, detections) as f64;
                window.push(now, count);
                let direction = cond.direction;
                let events = window.sum_changes(now, |p, c| direction.events(p, c));
                let rate = events / window.duration();
                cond.test.test(rate, cond.check_value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcap_core::rect_to_coords;

    fn zone() -> Vec<Point> {
        rect_to_coords([0.0, 0.0, 100.0, 100.0])
    }

    fn person(rect: [f64; 4]) -> DetectionNode {
        DetectionNode::new("person", rect_to_coords(rect))
    }

    #[test]
    fn test_comparators() {
        assert!(Comparator::LessThan.test(0.0, 1.0));
        assert!(!Comparator::LessThan.test(1.0, 1.0));
        assert!(Comparator::LessThanOrEqualTo.test(1.0, 1.0));
        assert!(Comparator::EqualTo.test(2.0, 2.0));
        assert!(Comparator::NotEqualTo.test(2.0, 3.0));
        assert!(Comparator::GreaterThanOrEqualTo.test(3.0, 3.0));
        assert!(Comparator::GreaterThan.test(4.0, 3.0));
    }

    #[test]
    fn test_comparator_accepts_symbols() {
        let c: Comparator = serde_json::from_str("\"<\"").unwrap();
        assert_eq!(c, Comparator::LessThan);
        let c: Comparator = serde_json::from_str("\"GREATER_THAN_OR_EQUAL_TO\"").unwrap();
        assert_eq!(c, Comparator::GreaterThanOrEqualTo);
    }

    #[test]
    fn test_intersection_point_decides_containment() {
        // Box straddling the bottom edge of the zone: centre inside, bottom outside
        let straddling = person([40.0, 80.0, 60.0, 110.0]);
        let centre = DetectionFilter {
            intersection_point: IntersectionPoint::Center,
            ..Default::default()
        };
        let bottom = DetectionFilter::default();
        assert_eq!(centre.count_in(&zone(), &[straddling.clone()]), 1);
        assert_eq!(bottom.count_in(&zone(), &[straddling]), 0);
    }

    #[test]
    fn test_class_and_attribute_filters() {
        let filter = DetectionFilter {
            with_class_name: Some("vehicle".into()),
            with_attribute: Some(AttributeFilter {
                category: "color".into(),
                value: "red".into(),
            }),
            intersection_point: IntersectionPoint::Center,
        };
        let red = DetectionNode::new("vehicle", rect_to_coords([10.0, 10.0, 20.0, 20.0]))
            .with_attribute("color", "red");
        let blue = red.clone().with_attribute("color", "blue");
        let walker = person([10.0, 10.0, 20.0, 20.0]);
        assert_eq!(filter.count_in(&zone(), &[red, blue, walker]), 1);
    }

    #[test]
    fn test_count_condition_validation() {
        assert!(CountCondition::new(Comparator::LessThan, 1.0)
            .window(5.0, 0.5)
            .validate("a")
            .is_ok());
        assert!(CountCondition::new(Comparator::LessThan, 1.0)
            .window(-1.0, 0.5)
            .validate("a")
            .is_err());
        assert!(CountCondition::new(Comparator::LessThan, 1.0)
            .window(5.0, 1.5)
            .validate("a")
            .is_err());
    }

    #[test]
    fn test_rate_condition_requires_positive_window() {
        let cond = RateCondition::new(Comparator::GreaterThan, 0.5, Direction::Entering, 0.0);
        assert!(cond.validate("a").is_err());
    }

    #[test]
    fn test_rate_tracker_counts_entries_per_second() {
        let cond = RateCondition::new(Comparator::GreaterThanOrEqualTo, 0.5, Direction::Entering, 4.0)
            .with_class_name("person");
        let mut tracker = ConditionTracker::rate(&cond);

        let inside = person([10.0, 10.0, 20.0, 20.0]);
        assert!(!tracker.observe(0.0, &zone(), &[]));
        assert!(!tracker.observe(1.0, &zone(), &[inside.clone()]));
        // two entries within 4s -> 0.5/s
        assert!(tracker.observe(2.0, &zone(), &[inside.clone(), inside.clone()]));
        // entries age out of the window
        assert!(!tracker.observe(6.0, &zone(), &[inside.clone(), inside]));
    }

    #[test]
    fn test_count_condition_json_shape() {
        let json = r#"{
            "test": "LESS_THAN",
            "check_value": 1,
            "with_class_name": "person",
            "with_attribute": null,
            "window_duration": 5.0,
            "window_threshold": 0.5,
            "intersection_point": "BOTTOM"
        }"#;
        let cond: CountCondition = serde_json::from_str(json).unwrap();
        assert_eq!(
            cond,
            CountCondition::new(Comparator::LessThan, 1.0)
                .with_class_name("person")
                .window(5.0, 0.5)
                .intersection_point(IntersectionPoint::Bottom)
        );
    }
}
