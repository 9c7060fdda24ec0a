//! Pixel-space geometry for detections and zones.

use serde::{Deserialize, Serialize};

use crate::detection::DetectionNode;

/// A point in pixel coordinates. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Axis-aligned bounding rectangle of a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    /// X coordinate of top-left corner (pixels)
    pub x: f64,
    /// Y coordinate of top-left corner (pixels)
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest rectangle containing every point. `None` for an empty slice.
    pub fn from_coords(coords: &[Point]) -> Option<Self> {
        let first = coords.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &coords[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn top(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y)
    }

    pub fn bottom(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height)
    }

    pub fn left(&self) -> Point {
        Point::new(self.x, self.y + self.height / 2.0)
    }

    pub fn right(&self) -> Point {
        Point::new(self.x + self.width, self.y + self.height / 2.0)
    }

    /// Calculate intersection over union with another box
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Convert `[x1, y1, x2, y2]` into a clockwise four-point polygon.
pub fn rect_to_coords(rect: [f64; 4]) -> Vec<Point> {
    let [x1, y1, x2, y2] = rect;
    vec![
        Point::new(x1, y1),
        Point::new(x2, y1),
        Point::new(x2, y2),
        Point::new(x1, y2),
    ]
}

/// Whether `point` lies inside `polygon` (even-odd rule).
///
/// Points exactly on an edge may land on either side.
pub fn point_in_polygon(point: &Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > point.y) != (pj.y > point.y) {
            let x_cross = (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Whether the bounding rectangles of two detections share any area.
///
/// Two rectangles that only touch along an edge count as overlapped.
pub fn is_overlapped(a: &DetectionNode, b: &DetectionNode) -> bool {
    let (ba, bb) = (a.bbox(), b.bbox());

    if ba.x > bb.x + bb.width || bb.x > ba.x + ba.width {
        return false;
    }
    if ba.y > bb.y + bb.height || bb.y > ba.y + ba.height {
        return false;
    }
    true
}

/// Distance between the centres of two detections.
pub fn distance(a: &DetectionNode, b: &DetectionNode) -> f64 {
    a.center().distance(&b.center())
}

/// Zero when the detections overlap, otherwise the distance between centres.
pub fn proximity(a: &DetectionNode, b: &DetectionNode) -> f64 {
    if is_overlapped(a, b) {
        0.0
    } else {
        distance(a, b)
    }
}

/// A pair of detections closer than the allowed minimum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Violation {
    pub first: usize,
    pub second: usize,
    pub distance: f64,
}

/// Every pair of detections whose [`proximity`] is below `min_distance`.
///
/// Indices refer to positions in `detections`; `first < second`.
pub fn distancing_violations(detections: &[DetectionNode], min_distance: f64) -> Vec<Violation> {
    let mut out = Vec::new();
    for i in 0..detections.len() {
        for j in (i + 1)..detections.len() {
            let d = proximity(&detections[i], &detections[j]);
            if d < min_distance {
                out.push(Violation {
                    first: i,
                    second: j,
                    distance: d,
                });
            }
        }
    }
    out
}
