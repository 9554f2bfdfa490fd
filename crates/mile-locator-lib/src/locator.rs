//! Linear-referencing orchestrator
//!
//! One request runs in a local planar frame centred on the query point:
//! 1. Every reference collection is projected and cut down to the working window.
//! 2. The nearest road must lie within the network threshold, otherwise the request ends
//!    with an out-of-range report that still carries the network-independent answers.
//! 3. Roads are split at the chainage markers; the two segments nearest the point are
//!    the target (its own carriageway) and the reference (the opposite one).
//! 4. Chainage, heading, topological relations, proximity and boundary answers are
//!    merged into one [`LocationReport`], with geometry echoes mapped back to
//!    longitude/latitude.

use crate::chainage::format_chainage;
use crate::collection::{
    Feature, MileMarker, NamedCollection, ReferenceData, RoadPolyline, read_gpx_points,
};
use crate::config::{Config, ROAD_COLLECTION};
use crate::direction::{
    AlongRoadRelation, Extremity, Heading, along_road_relation, resolve_direction,
};
use crate::filter::{filter_collection, within_radius};
use crate::nearest::{
    Projection, RouteFilter, nearest_marker, nearest_marker_to_geometry, nearest_roads,
};
use crate::proximity::classify_collection;
use crate::report::{DirectionReport, LocationReport, RelationReport, ReportData, TOO_FAR_MESSAGE};
use crate::segment::{RoadSegment, StationPoint, chainage_at, split_network};
use crate::topology::{Relation, boundary_straddle, evaluate, intersection_areas};
use crate::utils::LocalFrame;
use crate::{LocateError, Result};

use geo::{Centroid, Coord, Geometry, Point};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

/// A point to locate, in longitude/latitude
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub point: Point<f64>,
    /// Restricts the roads the point may be projected onto
    pub route: RouteFilter,
}

impl Query {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            point: Point::new(longitude, latitude),
            route: RouteFilter::Any,
        }
    }

    pub fn with_route(mut self, route: RouteFilter) -> Self {
        self.route = route;
        self
    }

    /// One query per GPX waypoint (or track point when there are no waypoints)
    pub fn from_gpx(path: impl AsRef<Path>) -> Result<Vec<Self>> {
        Ok(read_gpx_points(path)?
            .into_iter()
            .map(|point| Self {
                point,
                route: RouteFilter::Any,
            })
            .collect())
    }

    /// Coordinates must be finite and inside the longitude/latitude ranges
    pub fn validate(&self) -> Result<()> {
        let (x, y) = (self.point.x(), self.point.y());
        if !x.is_finite() || !y.is_finite() {
            return Err(LocateError::InputValidation(format!(
                "coordinates must be finite numbers, got ({x}, {y})"
            )));
        }
        if !(-180.0..=180.0).contains(&x) || !(-90.0..=90.0).contains(&y) {
            return Err(LocateError::InputValidation(format!(
                "coordinates out of range: longitude {x}, latitude {y}"
            )));
        }
        Ok(())
    }
}

/// Reference data of one request, projected and cut to the working window
struct Window {
    frame: LocalFrame,
    roads: Vec<RoadPolyline>,
    markers: Vec<MileMarker>,
    facilities: Vec<NamedCollection>,
    boundaries: Vec<NamedCollection>,
    warnings: Vec<String>,
}

/// Where a point sits on the segmented network (local frame)
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// Segment of the point's own carriageway
    pub target: RoadSegment,
    /// Nearest segment of another carriageway
    pub reference: Option<RoadSegment>,
    /// Projection of the point onto the target segment
    pub projected: Point<f64>,
    /// Chainage of the projection in kilometres
    pub chainage: f64,
    pub heading: Option<Heading>,
    /// The whole segmented network of the window
    pub segments: Vec<RoadSegment>,
}

/// The end-to-end "locate this point" pipeline
///
/// Holds only configuration; reference data is passed per call and never modified, so a
/// single locator can serve concurrent requests.
#[derive(Debug, Clone, Default)]
pub struct Locator {
    config: Config,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Locator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Locate one point against the reference data
    ///
    /// Never fails: problems are reported through the report's status, message and
    /// warnings.
    pub fn locate(&self, query: &Query, data: &ReferenceData) -> LocationReport {
        #[cfg(feature = "profiling")]
        profiling::scope!("locator::locate");

        if let Err(err) = query.validate() {
            tracing::warn!("Rejected query: {err}");
            return LocationReport::error(err.to_string(), ReportData::default());
        }

        let window = self.window(query, data);
        let origin = Point::new(0.0, 0.0);
        let mut report = ReportData {
            warnings: window.warnings.clone(),
            ..Default::default()
        };

        match self.resolve_network(origin, &window.roads, &window.markers, &query.route) {
            Ok(placement) => {
                report.chainage_label = Some(format_chainage(placement.chainage));
                report.direction = DirectionReport::new(placement.heading);
                self.describe_surroundings(origin, &window, Some(&placement), &mut report);
                report.geometry_echoes = self.echoes(query, &window, Some(&placement));
                tracing::info!(
                    "Located ({:.6}, {:.6}) on road {} at {} heading {}",
                    query.point.x(),
                    query.point.y(),
                    placement.target.road_number,
                    report.chainage_label.as_deref().unwrap_or("?"),
                    placement.heading.map_or("unresolved", Heading::as_str)
                );
                LocationReport::success(report)
            }
            Err(err) => {
                self.describe_surroundings(origin, &window, None, &mut report);
                report.geometry_echoes = self.echoes(query, &window, None);
                tracing::info!(
                    "Could not place ({:.6}, {:.6}) on the network: {err}",
                    query.point.x(),
                    query.point.y()
                );
                let message = match err {
                    LocateError::OutOfRange { .. } => {
                        report.warnings.push(err.to_string());
                        TOO_FAR_MESSAGE.to_string()
                    }
                    other => other.to_string(),
                };
                LocationReport::error(message, report)
            }
        }
    }

    /// Locate many points in parallel against the same reference data
    pub fn locate_many(&self, queries: &[Query], data: &ReferenceData) -> Vec<LocationReport> {
        tracing::info!("Locating {} points", queries.len());
        queries
            .par_iter()
            .map(|query| self.locate(query, data))
            .collect()
    }

    /// The nearest road to `point`, if within the network threshold (inclusive)
    pub fn nearest_road<'a>(
        &self,
        point: Point<f64>,
        roads: &'a [RoadPolyline],
        route: &RouteFilter,
    ) -> Result<Projection<'a, RoadPolyline>> {
        let threshold_km = self.config.network_threshold_km;
        match nearest_roads(point, roads, route, 1).into_iter().next() {
            Some(nearest) if nearest.distance <= threshold_km => Ok(nearest),
            Some(nearest) => Err(LocateError::OutOfRange {
                distance_km: nearest.distance,
                threshold_km,
            }),
            None => Err(LocateError::OutOfRange {
                distance_km: f64::INFINITY,
                threshold_km,
            }),
        }
    }

    /// Place a point on the network built from `roads` and `markers` (local frame)
    pub fn resolve_network(
        &self,
        point: Point<f64>,
        roads: &[RoadPolyline],
        markers: &[MileMarker],
        route: &RouteFilter,
    ) -> Result<Placement> {
        self.nearest_road(point, roads, route)?;

        let segments = split_network(roads, markers, self.config.on_road_tolerance_km);
        let (target, reference, projected) = {
            let nearest = nearest_roads(point, &segments, route, 2);
            let first = nearest.first().ok_or_else(|| {
                LocateError::GeometryPrecondition(
                    "no chainage-bounded segment around the point".to_string(),
                )
            })?;
            (
                first.road.clone(),
                nearest.get(1).map(|p| p.road.clone()),
                first.point,
            )
        };

        let chainage = chainage_at(&target, projected);
        let heading = match &reference {
            Some(reference) => {
                let (a, b) = extremities(&target, markers);
                resolve_direction(&target.line, &reference.line, a, b, &self.config.direction)
            }
            None => {
                tracing::warn!("No reference segment near the point, heading left unresolved");
                None
            }
        };

        Ok(Placement {
            target,
            reference,
            projected,
            chainage,
            heading,
            segments,
        })
    }

    /// Evaluate `relation` between an arbitrary geometry (longitude/latitude) and every
    /// reference collection, roads included
    pub fn relate(
        &self,
        query: &Geometry<f64>,
        relation: Relation,
        data: &ReferenceData,
    ) -> Result<RelationReport> {
        let centre = query.centroid().ok_or_else(|| {
            LocateError::InputValidation("query geometry is empty".to_string())
        })?;
        let frame = LocalFrame::centered_on(centre.0);
        let local = frame.project(query);

        let roads = NamedCollection::new(
            ROAD_COLLECTION,
            self.config.columns.road_number.clone(),
            data.roads.clone(),
        )
        .project(&frame);
        let others: Vec<NamedCollection> = data
            .facilities
            .iter()
            .chain(data.boundaries.iter())
            .map(|c| c.project(&frame))
            .collect();
        let collections: Vec<&NamedCollection> =
            std::iter::once(&roads).chain(others.iter()).collect();
        let names: Vec<String> = collections.iter().map(|c| c.name.clone()).collect();

        let matches = evaluate(&local, relation, &collections, &names);
        let mut areas = BTreeMap::new();
        if relation == Relation::Intersects {
            for collection in &collections {
                let found = intersection_areas(&local, collection);
                if !found.is_empty() {
                    areas.insert(collection.name.clone(), found);
                }
            }
        }
        Ok(RelationReport {
            relation,
            matches,
            intersection_areas: areas,
        })
    }

    fn window(&self, query: &Query, data: &ReferenceData) -> Window {
        let frame = LocalFrame::centered_on(query.point.0);
        let origin = Point::new(0.0, 0.0);
        let radius = self.config.window_radius_km;
        let columns = &self.config.columns;
        let mut warnings = Vec::new();

        let nearby = |features: &[Feature]| -> Vec<Feature> {
            features
                .iter()
                .map(|f| f.project(&frame))
                .filter(|f| within_radius(origin, &f.geometry, radius))
                .collect()
        };

        let mut roads = Vec::new();
        for feature in nearby(&data.roads) {
            match RoadPolyline::from_feature(&feature, columns) {
                Ok(road) => roads.push(road),
                Err(err) => {
                    tracing::warn!("Skipping road: {err}");
                    warnings.push(format!("Skipped road: {err}"));
                }
            }
        }

        let mut markers = Vec::new();
        for feature in nearby(&data.markers) {
            match MileMarker::from_feature(&feature, columns) {
                Ok(marker) => markers.push(marker),
                Err(err) => {
                    tracing::warn!("Skipping chainage marker: {err}");
                    warnings.push(format!("Skipped chainage marker: {err}"));
                }
            }
        }

        let cut = |collections: &[NamedCollection]| -> Vec<NamedCollection> {
            collections
                .iter()
                .map(|c| filter_collection(origin, &c.project(&frame), radius))
                .collect()
        };
        let facilities: Vec<NamedCollection> = cut(&data.facilities)
            .into_iter()
            .map(|c| self.with_facility_road_column(c))
            .collect();
        let boundaries = cut(&data.boundaries);

        tracing::debug!(
            "Working window: {} roads, {} markers, {} facility and {} boundary collections",
            roads.len(),
            markers.len(),
            facilities.len(),
            boundaries.len()
        );
        Window {
            frame,
            roads,
            markers,
            facilities,
            boundaries,
            warnings,
        }
    }

    /// Relations, proximity, boundary straddle and along-road answers
    ///
    /// Without a placement only the network-independent parts are filled.
    fn describe_surroundings(
        &self,
        origin: Point<f64>,
        window: &Window,
        placement: Option<&Placement>,
        report: &mut ReportData,
    ) {
        let columns = &self.config.columns;
        let query: Geometry<f64> = origin.into();

        let route_collection = placement.map(|placement| {
            NamedCollection::new(
                ROAD_COLLECTION,
                columns.road_number.clone(),
                placement
                    .segments
                    .iter()
                    .map(|s| {
                        Feature::new(s.line.clone())
                            .with_property(columns.road_id.clone(), s.road_id.clone())
                            .with_property(columns.road_number.clone(), s.road_number.clone())
                    })
                    .collect(),
            )
        });
        let collections: Vec<&NamedCollection> = route_collection
            .iter()
            .chain(window.facilities.iter())
            .chain(window.boundaries.iter())
            .collect();

        for (relation, names) in self.config.relations.iter() {
            let mut matches = evaluate(&query, relation, &collections, names);
            if let (Relation::Within, Some(placement)) = (relation, placement) {
                matches.insert(
                    ROAD_COLLECTION.to_string(),
                    vec![placement.target.road_number.clone()],
                );
            }
            if relation == Relation::Intersects {
                for collection in collections.iter().filter(|c| names.contains(&c.name)) {
                    let areas = intersection_areas(&query, collection);
                    if !areas.is_empty() {
                        report.intersection_areas.insert(collection.name.clone(), areas);
                    }
                }
            }
            report.topological_matches.insert(relation, matches);
        }

        for boundaries in &window.boundaries {
            report.boundary_straddle.insert(
                boundaries.name.clone(),
                boundary_straddle(origin, boundaries, self.config.boundary_threshold_km),
            );
        }

        for facilities in &window.facilities {
            let facilities = self.facilities_on_road(facilities, placement);
            let outcome =
                classify_collection(origin, &facilities, self.config.proximity_share_threshold);
            let labels = |indices: &[usize]| -> Vec<String> {
                indices
                    .iter()
                    .filter_map(|&i| facilities.features.get(i))
                    .map(|f| f.label(&facilities.label_column))
                    .collect()
            };

            if !outcome.near.is_empty() {
                report
                    .proximity_classification
                    .near
                    .insert(facilities.name.clone(), labels(&outcome.near));
            }
            if !outcome.middle.is_empty() {
                report
                    .proximity_classification
                    .middle
                    .insert(facilities.name.clone(), labels(&outcome.middle));
            }

            let (Some(placement), [near]) = (placement, outcome.near.as_slice()) else {
                continue;
            };
            let Some(heading) = placement.heading else {
                continue;
            };
            let Some(facility) = facilities.features.get(*near) else {
                continue;
            };
            let (Some(point_marker), Some(facility_marker)) = (
                nearest_marker(placement.projected, &window.markers),
                nearest_marker_to_geometry(&facility.geometry, &window.markers),
            ) else {
                continue;
            };
            let label = facility.label(&facilities.label_column);
            match along_road_relation(heading, point_marker.chainage, facility_marker.chainage) {
                Some(AlongRoadRelation::InFront) => report.along_road.in_front.push(label),
                Some(AlongRoadRelation::Passed) => report.along_road.passed.push(label),
                None => {}
            }
        }
    }

    /// Collections without their own road-number column take the configured one, if their
    /// features carry it
    fn with_facility_road_column(&self, collection: NamedCollection) -> NamedCollection {
        if collection.road_number_column.is_some() {
            return collection;
        }
        let column = self.config.columns.facility_road_number.as_str();
        if collection.features.iter().any(|f| f.property(column).is_some()) {
            collection.with_road_number_column(column)
        } else {
            collection
        }
    }

    /// Facilities sharing the target road's number, when both are known
    fn facilities_on_road(
        &self,
        facilities: &NamedCollection,
        placement: Option<&Placement>,
    ) -> NamedCollection {
        match (placement, &facilities.road_number_column) {
            (Some(placement), Some(column)) => facilities.with_features(
                facilities
                    .features
                    .iter()
                    .filter(|f| f.label(column) == placement.target.road_number)
                    .cloned()
                    .collect(),
            ),
            _ => facilities.clone(),
        }
    }

    /// Input point, target stations and segments, in longitude/latitude
    fn echoes(
        &self,
        query: &Query,
        window: &Window,
        placement: Option<&Placement>,
    ) -> Vec<geojson::Feature> {
        let frame = &window.frame;
        let mut input = Feature::new(query.point).with_property("Name", "Input_Point");
        let Some(placement) = placement else {
            return vec![
                input
                    .with_property("Mile", serde_json::Value::Null)
                    .with_property("Direction", serde_json::Value::Null)
                    .with_property("index", serde_json::Value::Null)
                    .to_geojson(),
            ];
        };

        let target = &placement.target;
        input = input
            .with_property("Mile", format_chainage(placement.chainage))
            .with_property(
                "Direction",
                placement
                    .heading
                    .map_or(serde_json::Value::Null, |h| h.as_str().into()),
            )
            .with_property("index", target.road_number.clone());

        let mut echoes = vec![
            input,
            Feature::new(target.start.point)
                .with_property("Name", "Start_Point")
                .with_property("Mile", target.start.marker.clone())
                .unproject(frame),
            Feature::new(target.end.point)
                .with_property("Name", "End_Point")
                .with_property("Mile", target.end.marker.clone())
                .unproject(frame),
            Feature::new(target.line.clone())
                .with_property("Name", "Target_Road")
                .with_property(self.config.columns.road_number.clone(), target.road_number.clone())
                .unproject(frame),
        ];
        if let Some(reference) = &placement.reference {
            echoes.push(
                Feature::new(reference.line.clone())
                    .with_property("Name", "Refer_Road")
                    .with_property(
                        self.config.columns.road_number.clone(),
                        reference.road_number.clone(),
                    )
                    .unproject(frame),
            );
        }
        echoes.iter().map(Feature::to_geojson).collect()
    }
}

/// Target segment ends, each with the chainage of its nearest marker
fn extremities(segment: &RoadSegment, markers: &[MileMarker]) -> (Extremity, Extremity) {
    let end = |coord: Option<&Coord<f64>>, fallback: &StationPoint| {
        let point = coord.map_or(fallback.point, |c| Point::from(*c));
        Extremity {
            point,
            chainage: nearest_marker(point, markers).map_or(fallback.chainage, |m| m.chainage),
        }
    };
    (
        end(segment.line.0.first(), &segment.start),
        end(segment.line.0.last(), &segment.end),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::LineString;

    fn road(id: &str, coords: Vec<(f64, f64)>) -> RoadPolyline {
        RoadPolyline {
            id: id.to_string(),
            road_number: "1".to_string(),
            line: LineString::from(coords),
        }
    }

    fn marker(km: u32, x: f64) -> MileMarker {
        MileMarker {
            name: format!("{km:03}K+000"),
            chainage: km as f64,
            route: RouteFilter::Any,
            point: Point::new(x, 0.005),
        }
    }

    fn twin_roads() -> Vec<RoadPolyline> {
        vec![
            road("east", vec![(-0.5, 0.0), (2.5, 0.0)]),
            road("west", vec![(2.5, 0.01), (-0.5, 0.01)]),
        ]
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let locator = Locator::default();
        let roads = vec![road("r", vec![(-1.0, -0.2), (1.0, -0.2)])];
        let origin = Point::new(0.0, 0.0);

        let nearest = locator.nearest_road(origin, &roads, &RouteFilter::Any).unwrap();
        assert!((nearest.distance - 0.2).abs() < 1e-12);

        let far = vec![road("r", vec![(-1.0, -0.2001), (1.0, -0.2001)])];
        assert!(matches!(
            locator.nearest_road(origin, &far, &RouteFilter::Any),
            Err(LocateError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_no_roads_is_out_of_range() {
        let locator = Locator::default();
        let result = locator.nearest_road(Point::new(0.0, 0.0), &[], &RouteFilter::Any);
        assert!(matches!(result, Err(LocateError::OutOfRange { .. })));
    }

    #[test]
    fn test_resolve_network_on_twin_carriageways() {
        let locator = Locator::default();
        let markers = vec![marker(0, 0.0), marker(1, 1.0), marker(2, 2.0)];
        let placement = locator
            .resolve_network(
                Point::new(1.5, -0.05),
                &twin_roads(),
                &markers,
                &RouteFilter::Any,
            )
            .unwrap();

        assert_eq!(placement.target.road_id, "east");
        assert_eq!(placement.reference.as_ref().unwrap().road_id, "west");
        assert!((placement.chainage - 1.5).abs() < 1e-9);
        assert_eq!(placement.heading, Some(Heading::South));
        assert_eq!(format_chainage(placement.chainage), "1.5K");
    }

    #[test]
    fn test_resolve_network_without_markers() {
        let locator = Locator::default();
        let result = locator.resolve_network(
            Point::new(1.5, -0.05),
            &twin_roads(),
            &[],
            &RouteFilter::Any,
        );
        assert!(matches!(result, Err(LocateError::GeometryPrecondition(_))));
    }

    #[test]
    fn test_invalid_query_is_reported() {
        let report = Locator::default().locate(&Query::new(121.0, 95.0), &ReferenceData::default());
        assert!(!report.is_success());
        assert!(report.message.starts_with("Invalid input"));

        let report =
            Locator::default().locate(&Query::new(f64::NAN, 25.0), &ReferenceData::default());
        assert!(!report.is_success());
    }

    #[test]
    fn test_facility_road_column_from_config() {
        let mut config = Config::default();
        config.columns.facility_road_number = "route_no".to_string();
        let locator = Locator::new(config);

        let tagged = NamedCollection::new(
            "RouteAncillaryFacilities",
            "roadname",
            vec![Feature::new(Point::new(0.0, 0.0)).with_property("route_no", "1")],
        );
        let adopted = locator.with_facility_road_column(tagged.clone());
        assert_eq!(adopted.road_number_column.as_deref(), Some("route_no"));

        // An explicit column wins over the configured one
        let explicit = locator.with_facility_road_column(tagged.with_road_number_column("roadnum"));
        assert_eq!(explicit.road_number_column.as_deref(), Some("roadnum"));

        // Without the property nothing is filtered
        let untagged = NamedCollection::new(
            "RouteAncillaryFacilities",
            "roadname",
            vec![Feature::new(Point::new(0.0, 0.0)).with_property("roadnum", "1")],
        );
        assert!(locator.with_facility_road_column(untagged).road_number_column.is_none());
    }

    #[test]
    fn test_empty_reference_data_is_too_far() {
        let report = Locator::default().locate(&Query::new(121.0, 25.0), &ReferenceData::default());
        assert!(!report.is_success());
        assert_eq!(report.message, TOO_FAR_MESSAGE);
        assert_eq!(report.data.geometry_echoes.len(), 1);
    }
}
