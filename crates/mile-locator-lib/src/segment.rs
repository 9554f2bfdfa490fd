//! Network segmenter - chainage-bounded road segments
//!
//! Every chainage marker is projected onto its two nearest carriageways. The projections
//! collected on a road are ordered along it, and each adjacent pair cuts out one segment
//! whose ends carry the markers' chainage.

use crate::collection::{MileMarker, RoadPolyline};
use crate::nearest::{Polyline, nearest_roads};
use crate::utils::{closest_with_distance, planar_distance, planar_length};

use geo::{Coord, LineLocatePoint, LineString, Point};
use std::collections::HashMap;

/// One end of a segment: a marker projected onto the road
#[derive(Debug, Clone, PartialEq)]
pub struct StationPoint {
    /// Projection of the marker onto the road
    pub point: Point<f64>,
    /// Chainage of the marker in kilometres
    pub chainage: f64,
    /// Mile string of the marker
    pub marker: String,
}

/// A piece of a road between two consecutive stations
///
/// The polyline keeps the vertex order of its parent road and `start` is the station at
/// its first vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadSegment {
    pub line: LineString<f64>,
    /// Identifier of the parent road
    pub road_id: String,
    pub road_number: String,
    pub start: StationPoint,
    pub end: StationPoint,
}

impl Polyline for RoadSegment {
    fn road_id(&self) -> &str {
        &self.road_id
    }

    fn road_number(&self) -> &str {
        &self.road_number
    }

    fn line(&self) -> &LineString<f64> {
        &self.line
    }
}

impl RoadSegment {
    /// Planar length in kilometres
    pub fn length(&self) -> f64 {
        planar_length(&self.line)
    }
}

/// Distance from the start of `line` to the projection of `point`, in line units
pub fn along_distance(line: &LineString<f64>, point: Point<f64>) -> Option<f64> {
    line.line_locate_point(&point)
        .map(|fraction| fraction * planar_length(line))
}

/// Sub-polyline between two distances along `line`
///
/// Vertex order is preserved whichever bound comes first. Returns `None` for an empty
/// range.
pub fn slice_along(line: &LineString<f64>, from: f64, to: f64) -> Option<LineString<f64>> {
    let (from, to) = if from <= to { (from, to) } else { (to, from) };
    if to - from <= f64::EPSILON {
        return None;
    }

    let mut coords: Vec<Coord<f64>> = Vec::new();
    let mut walked = 0.0;
    for segment in line.lines() {
        let length = segment.dx().hypot(segment.dy());
        let (segment_start, segment_end) = (walked, walked + length);
        walked = segment_end;

        if length <= 0.0 || segment_end <= from {
            continue;
        }
        let at = |distance: f64| {
            let t = ((distance - segment_start) / length).clamp(0.0, 1.0);
            Coord {
                x: segment.start.x + t * segment.dx(),
                y: segment.start.y + t * segment.dy(),
            }
        };

        if coords.is_empty() {
            coords.push(at(from));
        }
        if segment_end < to {
            coords.push(segment.end);
        } else {
            coords.push(at(to));
            break;
        }
    }

    coords.dedup();
    (coords.len() >= 2).then(|| LineString::new(coords))
}

/// Chainage of `point` on `segment`
///
/// Path length from the start station is added or subtracted following the direction in
/// which chainage grows from `start` to `end`.
pub fn chainage_at(segment: &RoadSegment, point: Point<f64>) -> f64 {
    let along = along_distance(&segment.line, point).unwrap_or(0.0);
    if segment.end.chainage >= segment.start.chainage {
        segment.start.chainage + along
    } else {
        segment.start.chainage - along
    }
}

/// Split `roads` into segments bounded by consecutive chainage markers
///
/// A pair is only cut from a road when its first station lies within
/// `on_road_tolerance_km` of that road. Markers whose projections coincide produce no
/// zero-length segment.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn split_network(
    roads: &[RoadPolyline],
    markers: &[MileMarker],
    on_road_tolerance_km: f64,
) -> Vec<RoadSegment> {
    let mut buckets: HashMap<&str, Vec<StationPoint>> = HashMap::new();
    for marker in markers {
        let projections = nearest_roads(marker.point, roads, &marker.route, 2);
        if projections.is_empty() {
            tracing::warn!("Chainage marker {} matches no road, skipping", marker.name);
            continue;
        }
        for projection in projections {
            buckets
                .entry(projection.road.id.as_str())
                .or_default()
                .push(StationPoint {
                    point: projection.point,
                    chainage: marker.chainage,
                    marker: marker.name.clone(),
                });
        }
    }

    let mut segments = Vec::new();
    for road in roads {
        let Some(stations) = buckets.get(road.id.as_str()) else {
            continue;
        };

        let mut ordered: Vec<(f64, &StationPoint)> = stations
            .iter()
            .filter_map(|s| along_distance(&road.line, s.point).map(|along| (along, s)))
            .collect();
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

        for pair in ordered.windows(2) {
            let (start_along, start) = pair[0];
            let (end_along, end) = pair[1];

            let on_road = closest_with_distance(&road.line, start.point)
                .is_some_and(|(_, distance)| distance <= on_road_tolerance_km);
            if !on_road || planar_distance(start.point.0, end.point.0) <= f64::EPSILON {
                continue;
            }

            if let Some(line) = slice_along(&road.line, start_along, end_along) {
                segments.push(RoadSegment {
                    line,
                    road_id: road.id.clone(),
                    road_number: road.road_number.clone(),
                    start: start.clone(),
                    end: end.clone(),
                });
            }
        }
    }

    tracing::debug!(
        "Split {} roads with {} markers into {} segments",
        roads.len(),
        markers.len(),
        segments.len()
    );
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nearest::RouteFilter;

    fn road(id: &str, coords: Vec<(f64, f64)>) -> RoadPolyline {
        RoadPolyline {
            id: id.to_string(),
            road_number: "1".to_string(),
            line: LineString::from(coords),
        }
    }

    fn marker(km: f64, x: f64, y: f64) -> MileMarker {
        MileMarker {
            name: format!("{:03}K+000", km as u32),
            chainage: km,
            route: RouteFilter::Any,
            point: Point::new(x, y),
        }
    }

    /// Two carriageways 10 m apart, one drawn west to east and one east to west
    fn twin_roads() -> Vec<RoadPolyline> {
        vec![
            road("east", vec![(-0.5, 0.0), (2.5, 0.0)]),
            road("west", vec![(2.5, 0.01), (-0.5, 0.01)]),
        ]
    }

    fn twin_markers() -> Vec<MileMarker> {
        vec![
            marker(0.0, 0.0, 0.005),
            marker(1.0, 1.0, 0.005),
            marker(2.0, 2.0, 0.005),
        ]
    }

    #[test]
    fn test_slice_along_keeps_vertices() {
        let line = LineString::from(vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0)]);
        let slice = slice_along(&line, 1.0, 3.0).unwrap();
        assert_eq!(
            slice,
            LineString::from(vec![(1.0, 0.0), (2.0, 0.0), (2.0, 1.0)])
        );

        // Bounds in either order give the same slice
        assert_eq!(slice_along(&line, 3.0, 1.0).unwrap(), slice);
    }

    #[test]
    fn test_slice_along_at_vertex() {
        let line = LineString::from(vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0)]);
        let slice = slice_along(&line, 2.0, 4.0).unwrap();
        assert_eq!(slice, LineString::from(vec![(2.0, 0.0), (2.0, 2.0)]));
    }

    #[test]
    fn test_slice_along_empty_range() {
        let line = LineString::from(vec![(0.0, 0.0), (2.0, 0.0)]);
        assert!(slice_along(&line, 1.0, 1.0).is_none());
    }

    #[test]
    fn test_along_distance() {
        let line = LineString::from(vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0)]);
        let along = along_distance(&line, Point::new(2.5, 1.0)).unwrap();
        assert!((along - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_split_twin_carriageways() {
        let roads = twin_roads();
        let segments = split_network(&roads, &twin_markers(), 0.002);
        assert_eq!(segments.len(), 4);

        for segment in &segments {
            assert!((segment.length() - 1.0).abs() < 1e-9);
            assert_eq!(segment.road_number, "1");
            assert!((segment.end.chainage - segment.start.chainage).abs() == 1.0);
        }

        let east: Vec<&RoadSegment> = segments.iter().filter(|s| s.road_id == "east").collect();
        assert_eq!(east[0].start.chainage, 0.0);
        assert_eq!(east[1].end.chainage, 2.0);

        // The westbound road meets the markers in decreasing chainage
        let west: Vec<&RoadSegment> = segments.iter().filter(|s| s.road_id == "west").collect();
        assert_eq!(west[0].start.chainage, 2.0);
        assert_eq!(west[1].end.chainage, 0.0);
    }

    #[test]
    fn test_every_marker_bounds_a_segment() {
        let markers = twin_markers();
        let segments = split_network(&twin_roads(), &markers, 0.002);
        for marker in &markers {
            assert!(
                segments
                    .iter()
                    .any(|s| s.start.marker == marker.name || s.end.marker == marker.name),
                "{} bounds no segment",
                marker.name
            );
        }
    }

    #[test]
    fn test_segment_starts_on_first_vertex() {
        let segments = split_network(&twin_roads(), &twin_markers(), 0.002);
        for segment in &segments {
            let first = segment.line.0[0];
            assert!(planar_distance(first, segment.start.point.0) < 1e-9);
        }
    }

    #[test]
    fn test_single_road_network_collapses_buckets() {
        // Both nearest roads of every marker are the same road: still splits
        let roads = vec![road("only", vec![(-0.5, 0.0), (2.5, 0.0)])];
        let segments = split_network(&roads, &twin_markers(), 0.002);
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn test_chainage_at_follows_gradient() {
        let segments = split_network(&twin_roads(), &twin_markers(), 0.002);
        let east = segments
            .iter()
            .find(|s| s.road_id == "east" && s.start.chainage == 1.0)
            .unwrap();
        assert!((chainage_at(east, Point::new(1.25, 0.0)) - 1.25).abs() < 1e-9);

        let west = segments
            .iter()
            .find(|s| s.road_id == "west" && s.start.chainage == 2.0)
            .unwrap();
        assert!((chainage_at(west, Point::new(1.5, 0.01)) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_markers_without_matching_road_are_skipped() {
        let mut markers = twin_markers();
        markers.push(MileMarker {
            route: RouteFilter::Road("99".to_string()),
            ..marker(3.0, 3.0, 0.0)
        });
        let segments = split_network(&twin_roads(), &markers, 0.002);
        assert_eq!(segments.len(), 4);
    }
}
