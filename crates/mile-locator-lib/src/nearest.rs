//! Nearest-road resolver
//!
//! Projects a point onto a set of polylines and keeps the closest projection per physical
//! road. Works on planar (local frame) coordinates.

use crate::collection::{MileMarker, RoadPolyline};
use crate::utils::{closest_with_distance, planar_distance};

use geo::{ClosestPoint, LineString, Point};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Label of a marker that applies to any road orientation
pub const ANY_ROUTE: &str = "unknown";

/// Anything with a road identity and a polyline: raw roads and chainage segments alike
pub trait Polyline {
    /// Identity used for deduplication (one physical carriageway)
    fn road_id(&self) -> &str;
    fn road_number(&self) -> &str;
    fn line(&self) -> &LineString<f64>;
}

impl Polyline for RoadPolyline {
    fn road_id(&self) -> &str {
        &self.id
    }

    fn road_number(&self) -> &str {
        &self.road_number
    }

    fn line(&self) -> &LineString<f64> {
        &self.line
    }
}

/// Which roads a point may be projected onto
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteFilter {
    /// Any road (direction identifier `unknown`)
    #[default]
    Any,
    /// Only roads carrying this road number
    Road(String),
}

impl RouteFilter {
    /// Interpret a direction identifier; `unknown` and empty labels match every road
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        if label.is_empty() || label == ANY_ROUTE {
            RouteFilter::Any
        } else {
            RouteFilter::Road(label.to_string())
        }
    }

    #[inline]
    pub fn accepts(&self, road_number: &str) -> bool {
        match self {
            RouteFilter::Any => true,
            RouteFilter::Road(wanted) => wanted == road_number,
        }
    }
}

/// A point projected onto a road
#[derive(Debug)]
pub struct Projection<'a, R> {
    /// Nearest point on the road
    pub point: Point<f64>,
    pub road: &'a R,
    /// Planar distance from the source point to `point`
    pub distance: f64,
}

impl<R> Clone for Projection<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Projection<'_, R> {}

/// The `count` nearest distinct roads to `point`, closest first
///
/// Roads rejected by `route` are skipped. Equal distances keep input order and only the
/// closest projection per road identifier survives, so the result never holds the same
/// road twice.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn nearest_roads<'a, R: Polyline>(
    point: Point<f64>,
    roads: &'a [R],
    route: &RouteFilter,
    count: usize,
) -> Vec<Projection<'a, R>> {
    let mut projections: Vec<Projection<'a, R>> = roads
        .iter()
        .filter(|road| route.accepts(road.road_number()))
        .filter_map(|road| {
            let (projected, distance) = closest_with_distance(road.line(), point)?;
            Some(Projection {
                point: projected,
                road,
                distance,
            })
        })
        .collect();

    // Stable sort: ties keep their input order
    projections.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    let mut seen: HashSet<&'a str> = HashSet::new();
    projections
        .into_iter()
        .filter(|p| {
            let road: &'a R = p.road;
            seen.insert(road.road_id())
        })
        .take(count)
        .collect()
}

/// The marker closest to `point` (first one on ties)
pub fn nearest_marker(point: Point<f64>, markers: &[MileMarker]) -> Option<&MileMarker> {
    markers
        .iter()
        .min_by(|a, b| {
            planar_distance(a.point.0, point.0).total_cmp(&planar_distance(b.point.0, point.0))
        })
}

/// The marker closest to any part of `geometry`
pub fn nearest_marker_to_geometry<'a, G>(
    geometry: &G,
    markers: &'a [MileMarker],
) -> Option<&'a MileMarker>
where
    G: ClosestPoint<f64>,
{
    markers
        .iter()
        .filter_map(|marker| {
            closest_with_distance(geometry, marker.point).map(|(_, distance)| (marker, distance))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(marker, _)| marker)
}
