//! Reference data - named feature collections, roads and chainage markers
//!
//! Reference collections are read-only inputs: they are loaded once (usually from GeoJSON
//! FeatureCollections) and shared by every location request. Per request they are
//! projected into a local frame and cut down to a working window, producing fresh values
//! that never alias the loaded data.

use crate::chainage::parse_chainage;
use crate::config::Columns;
use crate::nearest::RouteFilter;
use crate::utils::LocalFrame;
use crate::{LocateError, Result};

use geo::{Geometry, LineString, Point};
use geojson::GeoJson;
use serde_json::{Map, Value};
use std::path::Path;

/// A geometry with its property map
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            geometry: geometry.into(),
            properties: Map::new(),
        }
    }

    /// Builder-style property setter
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Property rendered as a label: strings verbatim, missing or null as an empty
    /// string, anything else through its JSON representation
    pub fn label(&self, column: &str) -> String {
        match self.properties.get(column) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    /// Same feature with its geometry mapped into `frame`
    pub fn project(&self, frame: &LocalFrame) -> Self {
        Self {
            geometry: frame.project(&self.geometry),
            properties: self.properties.clone(),
        }
    }

    /// Same feature with its geometry mapped from `frame` back to longitude/latitude
    pub fn unproject(&self, frame: &LocalFrame) -> Self {
        Self {
            geometry: frame.unproject(&self.geometry),
            properties: self.properties.clone(),
        }
    }

    /// Convert a GeoJSON feature; features without geometry are rejected
    pub fn from_geojson(feature: geojson::Feature) -> Result<Self> {
        let geometry = feature
            .geometry
            .ok_or_else(|| LocateError::InvalidGeometry("feature without geometry".to_string()))?;
        let geometry = Geometry::<f64>::try_from(geometry)?;
        Ok(Self {
            geometry,
            properties: feature.properties.unwrap_or_default(),
        })
    }

    pub fn to_geojson(&self) -> geojson::Feature {
        geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&self.geometry))),
            id: None,
            properties: Some(self.properties.clone()),
            foreign_members: None,
        }
    }
}

/// A named reference collection with the column holding each feature's label
#[derive(Debug, Clone, PartialEq)]
pub struct NamedCollection {
    pub name: String,
    pub label_column: String,
    /// Column holding the road number, for collections tied to a road (facilities)
    pub road_number_column: Option<String>,
    pub features: Vec<Feature>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl NamedCollection {
    pub fn new(
        name: impl Into<String>,
        label_column: impl Into<String>,
        features: Vec<Feature>,
    ) -> Self {
        Self {
            name: name.into(),
            label_column: label_column.into(),
            road_number_column: None,
            features,
        }
    }

    /// Declare the column tying features to a road number
    pub fn with_road_number_column(mut self, column: impl Into<String>) -> Self {
        self.road_number_column = Some(column.into());
        self
    }

    /// Parse a GeoJSON document (FeatureCollection, Feature or bare Geometry)
    pub fn from_geojson_str(
        name: impl Into<String>,
        label_column: impl Into<String>,
        text: &str,
    ) -> Result<Self> {
        let features = match text.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(collection) => collection
                .features
                .into_iter()
                .map(Feature::from_geojson)
                .collect::<Result<Vec<_>>>()?,
            GeoJson::Feature(feature) => vec![Feature::from_geojson(feature)?],
            GeoJson::Geometry(geometry) => vec![Feature::new(Geometry::<f64>::try_from(geometry)?)],
        };
        let collection = Self::new(name, label_column, features);
        tracing::debug!(
            "Loaded {} features into collection '{}'",
            collection.features.len(),
            collection.name
        );
        Ok(collection)
    }

    /// Read a GeoJSON file
    pub fn from_path(
        name: impl Into<String>,
        label_column: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_geojson_str(name, label_column, &text)
    }

    /// Same collection with every geometry mapped into `frame`
    pub fn project(&self, frame: &LocalFrame) -> Self {
        Self {
            name: self.name.clone(),
            label_column: self.label_column.clone(),
            road_number_column: self.road_number_column.clone(),
            features: self.features.iter().map(|f| f.project(frame)).collect(),
        }
    }

    /// Same collection metadata with a different feature set
    pub fn with_features(&self, features: Vec<Feature>) -> Self {
        Self {
            name: self.name.clone(),
            label_column: self.label_column.clone(),
            road_number_column: self.road_number_column.clone(),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.features
            .iter()
            .map(|f| f.label(&self.label_column))
            .collect()
    }
}

/// A road polyline with its identity
#[derive(Debug, Clone, PartialEq)]
pub struct RoadPolyline {
    /// Identifier of one physical carriageway
    pub id: String,
    /// Road number shared by both carriageways
    pub road_number: String,
    pub line: LineString<f64>,
}

impl RoadPolyline {
    /// Read a road from a feature; multi-part roads use their first part
    pub fn from_feature(feature: &Feature, columns: &Columns) -> Result<Self> {
        let line = match &feature.geometry {
            Geometry::LineString(line) => line.clone(),
            Geometry::MultiLineString(lines) => lines.0.first().cloned().ok_or_else(|| {
                LocateError::InvalidGeometry("road with an empty MultiLineString".to_string())
            })?,
            other => {
                return Err(LocateError::InvalidGeometry(format!(
                    "road must be a LineString, got {}",
                    geometry_type_name(other)
                )));
            }
        };
        if line.0.len() < 2 {
            return Err(LocateError::InvalidGeometry(format!(
                "road '{}' has fewer than two vertices",
                feature.label(&columns.road_id)
            )));
        }
        Ok(Self {
            id: feature.label(&columns.road_id),
            road_number: feature.label(&columns.road_number),
            line,
        })
    }
}

/// A chainage marker (station) with its decoded chainage
#[derive(Debug, Clone, PartialEq)]
pub struct MileMarker {
    /// Mile string as stored, e.g. `007K+250`
    pub name: String,
    /// Decoded chainage in kilometres
    pub chainage: f64,
    /// Roads this marker may be projected onto
    pub route: RouteFilter,
    pub point: Point<f64>,
}

impl MileMarker {
    /// Read a marker from a point feature
    ///
    /// Fails with [`LocateError::Format`] when the mile string does not parse.
    pub fn from_feature(feature: &Feature, columns: &Columns) -> Result<Self> {
        let point = match &feature.geometry {
            Geometry::Point(point) => *point,
            Geometry::MultiPoint(points) => points.0.first().copied().ok_or_else(|| {
                LocateError::InvalidGeometry("marker with an empty MultiPoint".to_string())
            })?,
            other => {
                return Err(LocateError::InvalidGeometry(format!(
                    "marker must be a Point, got {}",
                    geometry_type_name(other)
                )));
            }
        };
        let name = feature.label(&columns.marker_mile);
        let chainage = parse_chainage(&name)?;
        Ok(Self {
            name,
            chainage,
            route: RouteFilter::from_label(&feature.label(&columns.marker_route)),
            point,
        })
    }
}

/// All reference collections a location request runs against
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceData {
    /// Road polylines (one feature per carriageway)
    pub roads: Vec<Feature>,
    /// Chainage markers
    pub markers: Vec<Feature>,
    /// Roadside facility collections (proximity, along-road relation)
    pub facilities: Vec<NamedCollection>,
    /// Administrative boundary collections (containment, straddling)
    pub boundaries: Vec<NamedCollection>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ReferenceData {
    pub fn new(roads: Vec<Feature>, markers: Vec<Feature>) -> Self {
        Self {
            roads,
            markers,
            facilities: Vec::new(),
            boundaries: Vec::new(),
        }
    }

    pub fn with_facilities(mut self, collection: NamedCollection) -> Self {
        self.facilities.push(collection);
        self
    }

    pub fn with_boundaries(mut self, collection: NamedCollection) -> Self {
        self.boundaries.push(collection);
        self
    }

    /// Facility or boundary collection by name
    pub fn collection(&self, name: &str) -> Option<&NamedCollection> {
        self.facilities
            .iter()
            .chain(self.boundaries.iter())
            .find(|c| c.name == name)
    }
}

/// Read query points from a GPX file: waypoints, or track points when there are none
pub fn read_gpx_points(path: impl AsRef<Path>) -> Result<Vec<Point<f64>>> {
    let file = std::fs::File::open(path.as_ref())?;
    let reader = std::io::BufReader::new(file);
    let gpx = gpx::read(reader)?;
    Ok(gpx_points(&gpx))
}

/// Query points of a parsed GPX document
pub fn gpx_points(gpx: &gpx::Gpx) -> Vec<Point<f64>> {
    if !gpx.waypoints.is_empty() {
        return gpx.waypoints.iter().map(|w| w.point()).collect();
    }
    gpx.tracks
        .iter()
        .flat_map(|track| track.segments.iter())
        .flat_map(|segment| segment.points.iter())
        .map(|w| w.point())
        .collect()
}

pub(crate) fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Coord, MultiLineString};
    use gpx::{Gpx, Track, TrackSegment, Waypoint};
    use serde_json::json;

    const ROADS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"id": "r1", "roadnum": "1"},
             "geometry": {"type": "LineString", "coordinates": [[121.0, 25.0], [121.1, 25.0]]}},
            {"type": "Feature", "properties": {"id": 7, "roadnum": null},
             "geometry": {"type": "MultiLineString", "coordinates": [[[121.0, 25.1], [121.1, 25.1]]]}}
        ]
    }"#;

    #[test]
    fn test_load_feature_collection() {
        let collection = NamedCollection::from_geojson_str("Route", "roadnum", ROADS).unwrap();
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.name, "Route");
        assert_eq!(collection.labels(), vec!["1".to_string(), String::new()]);
    }

    #[test]
    fn test_load_single_geometry() {
        let collection = NamedCollection::from_geojson_str(
            "Point",
            "name",
            r#"{"type": "Point", "coordinates": [121.0, 25.0]}"#,
        )
        .unwrap();
        assert_eq!(collection.len(), 1);
        assert!(matches!(collection.features[0].geometry, Geometry::Point(_)));
    }

    #[test]
    fn test_invalid_geojson_is_an_error() {
        let err = NamedCollection::from_geojson_str("x", "name", "{not json").unwrap_err();
        assert!(matches!(err, LocateError::GeoJson(_)));
    }

    #[test]
    fn test_label_rendering() {
        let feature = Feature::new(Point::new(0.0, 0.0))
            .with_property("name", "Taipei")
            .with_property("code", 42)
            .with_property("empty", Value::Null);
        assert_eq!(feature.label("name"), "Taipei");
        assert_eq!(feature.label("code"), "42");
        assert_eq!(feature.label("empty"), "");
        assert_eq!(feature.label("missing"), "");
    }

    #[test]
    fn test_road_from_feature() {
        let columns = Columns::default();
        let collection = NamedCollection::from_geojson_str("Route", "roadnum", ROADS).unwrap();

        let road = RoadPolyline::from_feature(&collection.features[0], &columns).unwrap();
        assert_eq!(road.id, "r1");
        assert_eq!(road.road_number, "1");
        assert_eq!(road.line.0.len(), 2);

        // MultiLineString roads use their first part, numeric ids are stringified
        let road = RoadPolyline::from_feature(&collection.features[1], &columns).unwrap();
        assert_eq!(road.id, "7");
        assert_eq!(road.line.0[0], Coord { x: 121.0, y: 25.1 });
    }

    #[test]
    fn test_road_rejects_bad_geometry() {
        let columns = Columns::default();
        let point = Feature::new(Point::new(0.0, 0.0));
        assert!(matches!(
            RoadPolyline::from_feature(&point, &columns),
            Err(LocateError::InvalidGeometry(_))
        ));

        let short = Feature::new(LineString::from(vec![(0.0, 0.0)]));
        assert!(RoadPolyline::from_feature(&short, &columns).is_err());

        let empty = Feature::new(MultiLineString::<f64>::new(vec![]));
        assert!(RoadPolyline::from_feature(&empty, &columns).is_err());
    }

    #[test]
    fn test_marker_from_feature() {
        let columns = Columns::default();
        let feature = Feature::new(Point::new(121.0, 25.0))
            .with_property("name", "007K+250")
            .with_property("index", "unknown");
        let marker = MileMarker::from_feature(&feature, &columns).unwrap();
        assert_eq!(marker.chainage, 7.25);
        assert_eq!(marker.route, RouteFilter::Any);

        let directed = feature.clone().with_property("index", "3");
        let marker = MileMarker::from_feature(&directed, &columns).unwrap();
        assert_eq!(marker.route, RouteFilter::Road("3".to_string()));

        let broken = feature.with_property("name", "north gate");
        assert!(matches!(
            MileMarker::from_feature(&broken, &columns),
            Err(LocateError::Format { .. })
        ));
    }

    #[test]
    fn test_project_keeps_properties() {
        let frame = LocalFrame::centered_on(Coord { x: 121.0, y: 25.0 });
        let feature = Feature::new(Point::new(121.0, 25.0)).with_property("name", "origin");
        let projected = feature.project(&frame);
        assert_eq!(projected.properties, feature.properties);
        match projected.geometry {
            Geometry::Point(p) => assert!(p.x().abs() < 1e-12 && p.y().abs() < 1e-12),
            _ => panic!("expected a point"),
        }
    }

    #[test]
    fn test_geojson_roundtrip_of_properties() {
        let feature = Feature::new(Point::new(121.0, 25.0)).with_property("Mile", "1.05K");
        let geojson = feature.to_geojson();
        assert_eq!(
            geojson.properties.as_ref().and_then(|p| p.get("Mile")),
            Some(&json!("1.05K"))
        );
        let back = Feature::from_geojson(geojson).unwrap();
        assert_eq!(back, feature);
    }

    #[test]
    fn test_reference_data_collection_lookup() {
        let data = ReferenceData::default()
            .with_facilities(NamedCollection::new("RouteAncillaryFacilities", "roadname", vec![]))
            .with_boundaries(NamedCollection::new("County", "countyname", vec![]));
        assert!(data.collection("County").is_some());
        assert!(data.collection("RouteAncillaryFacilities").is_some());
        assert!(data.collection("Nowhere").is_none());
    }

    #[test]
    fn test_gpx_points_prefer_waypoints() {
        let mut gpx = Gpx::default();
        let mut track = Track::default();
        let mut segment = TrackSegment::default();
        segment.points.push(Waypoint::new(Point::new(121.0, 25.0)));
        segment.points.push(Waypoint::new(Point::new(121.1, 25.0)));
        track.segments.push(segment);
        gpx.tracks.push(track);
        assert_eq!(gpx_points(&gpx).len(), 2);

        gpx.waypoints.push(Waypoint::new(Point::new(120.0, 24.0)));
        assert_eq!(gpx_points(&gpx), vec![Point::new(120.0, 24.0)]);
    }
}
