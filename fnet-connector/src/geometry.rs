//! Path projection and split-point placement
//!
//! Positions along a conduit are expressed as a fraction of its total path
//! length, measured from the first vertex. Split points may not be placed
//! close to existing branch attachments; those zones are modelled as
//! forbidden intervals and requested positions inside one are snapped to the
//! nearer boundary.
//!
//! Degenerate geometry never fails: a path of zero length projects every
//! point to 0.0 and produces no forbidden intervals.

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

fn segment_length(from: Point, to: Point) -> f64 {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    (dx * dx + dy * dy).sqrt()
}

/// Polyline geometry of a conduit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConduitPath {
    points: Vec<Point>,
}

impl ConduitPath {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Parse the stored JSON form: an array of `[x, y]` pairs
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let raw: Vec<[f64; 2]> = serde_json::from_str(text)?;
        Ok(Self::new(raw.into_iter().map(|[x, y]| Point::new(x, y)).collect()))
    }

    pub fn to_json(&self) -> String {
        let raw: Vec<[f64; 2]> = self.points.iter().map(|p| [p.x, p.y]).collect();
        serde_json::to_string(&raw).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| segment_length(w[0], w[1]))
            .sum()
    }

    /// Nearest-point projection of `point` onto the path
    ///
    /// Returns the fraction of total length from the start, in [0, 1].
    /// Equidistant candidates resolve to the earliest segment.
    pub fn project(&self, point: Point) -> f64 {
        let total = self.length();
        if !(total > 0.0) {
            return 0.0;
        }
        if !point.is_finite() {
            warn!("Cannot project non-finite point ({}, {}), using start of path", point.x, point.y);
            return 0.0;
        }

        let mut best_dist_sq = f64::INFINITY;
        let mut best_along = 0.0;
        let mut walked = 0.0;

        for w in self.points.windows(2) {
            let (a, b) = (w[0], w[1]);
            let seg_len = segment_length(a, b);

            let t = if seg_len > 0.0 {
                let dx = b.x - a.x;
                let dy = b.y - a.y;
                (((point.x - a.x) * dx + (point.y - a.y) * dy) / (seg_len * seg_len)).clamp(0.0, 1.0)
            } else {
                0.0
            };

            let px = a.x + t * (b.x - a.x);
            let py = a.y + t * (b.y - a.y);
            let dist_sq = (point.x - px).powi(2) + (point.y - py).powi(2);

            if dist_sq < best_dist_sq {
                best_dist_sq = dist_sq;
                best_along = walked + t * seg_len;
            }
            walked += seg_len;
        }

        (best_along / total).clamp(0.0, 1.0)
    }

    /// Point on the path at `fraction` of its length
    ///
    /// Paths without vertices yield the origin.
    pub fn point_at(&self, fraction: f64) -> Point {
        let Some(first) = self.points.first().copied() else {
            return Point::new(0.0, 0.0);
        };
        let total = self.length();
        if !(total > 0.0) {
            return first;
        }

        let target = fraction.clamp(0.0, 1.0) * total;
        let mut walked = 0.0;
        for w in self.points.windows(2) {
            let seg_len = segment_length(w[0], w[1]);
            if seg_len > 0.0 && walked + seg_len >= target {
                let t = (target - walked) / seg_len;
                return Point::new(
                    w[0].x + t * (w[1].x - w[0].x),
                    w[0].y + t * (w[1].y - w[0].y),
                );
            }
            walked += seg_len;
        }

        self.points.last().copied().unwrap_or(first)
    }
}

/// Closed fraction range `[start, end]` excluded from split placement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, fraction: f64) -> bool {
        self.start <= fraction && fraction <= self.end
    }
}

/// Where a branch is attached to a conduit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AttachmentLocation {
    /// Approximate map position, projected onto the path
    Point(Point),
    /// Position already known as a fraction of the path
    Fraction(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BranchAttachment {
    pub id: i64,
    pub location: AttachmentLocation,
}

/// Forbidden intervals around the given branch attachments
///
/// `tolerance` is an absolute distance along the path; it is converted to a
/// fraction using the total path length. Overlapping intervals are merged and
/// the result is sorted by start.
pub fn forbidden_intervals(
    path: &ConduitPath,
    attachments: &[BranchAttachment],
    tolerance: f64,
) -> Vec<Interval> {
    let total = path.length();
    if !(total > 0.0) {
        if !attachments.is_empty() {
            warn!("Conduit path has no length, ignoring {} branch attachments", attachments.len());
        }
        return Vec::new();
    }

    let eps = tolerance.max(0.0) / total;
    let intervals = attachments
        .iter()
        .map(|attachment| {
            let s = match attachment.location {
                AttachmentLocation::Point(p) => path.project(p),
                AttachmentLocation::Fraction(f) if f.is_finite() => f.clamp(0.0, 1.0),
                AttachmentLocation::Fraction(_) => 0.0,
            };
            Interval::new((s - eps).max(0.0), (s + eps).min(1.0))
        })
        .collect();

    merge_intervals(intervals)
}

/// Sort and merge overlapping (or touching) intervals
pub fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                last.end = last.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// Move `fraction` out of any forbidden interval
///
/// Inside an interval the nearer boundary wins; an exact tie goes to the
/// lower boundary. Fractions outside every interval are returned unchanged.
pub fn snap(fraction: f64, intervals: &[Interval]) -> f64 {
    match intervals.iter().find(|i| i.contains(fraction)) {
        Some(i) if (fraction - i.start) <= (i.end - fraction) => i.start,
        Some(i) => i.end,
        None => fraction,
    }
}

/// Result of tracking the pointer along a conduit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SplitMarker {
    /// Snapped fraction along the path
    pub fraction: f64,
    /// Map position of the snapped fraction
    pub point: Point,
    /// True when the raw projection fell inside a forbidden interval
    pub snapped: bool,
}

/// Path plus forbidden zones of one conduit, prepared for split picking
#[derive(Debug, Clone, PartialEq)]
pub struct SplitGeometry {
    path: ConduitPath,
    intervals: Vec<Interval>,
}

impl SplitGeometry {
    pub fn new(path: ConduitPath, attachments: &[BranchAttachment], tolerance: f64) -> Self {
        let intervals = forbidden_intervals(&path, attachments, tolerance);
        Self { path, intervals }
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Project + snap for one pointer position
    pub fn track(&self, pointer: Point) -> SplitMarker {
        self.resolve(self.path.project(pointer))
    }

    /// Snap a fraction given directly instead of by pointer
    ///
    /// Values outside `[0, 1]` are clamped; non-finite values resolve to 0.
    pub fn resolve(&self, fraction: f64) -> SplitMarker {
        let raw = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        let fraction = snap(raw, &self.intervals);
        SplitMarker {
            fraction,
            point: self.path.point_at(fraction),
            snapped: fraction != raw,
        }
    }
}
