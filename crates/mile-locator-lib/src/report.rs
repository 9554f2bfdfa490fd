//! Location report - the serialized answer of the locator
//!
//! Reports serialize to camelCase JSON. Geometry echoes are emitted as a GeoJSON
//! FeatureCollection in longitude/latitude.

use crate::direction::Heading;
use crate::topology::{IntersectionArea, Relation};

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Message of a report aborted because the point is too far from every road
pub const TOO_FAR_MESSAGE: &str = "The input point is too far from the road.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Error,
}

/// Carriageway direction as `{"Route": ["N"]}`; `[null]` when unresolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectionReport {
    #[serde(rename = "Route")]
    pub route: Vec<Option<Heading>>,
}

impl Default for DirectionReport {
    fn default() -> Self {
        Self { route: vec![None] }
    }
}

impl DirectionReport {
    pub fn new(heading: Option<Heading>) -> Self {
        Self {
            route: vec![heading],
        }
    }

    pub fn heading(&self) -> Option<Heading> {
        self.route.first().copied().flatten()
    }
}

/// Near/middle classification per facility collection (labels)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProximityReport {
    pub near: BTreeMap<String, Vec<String>>,
    pub middle: BTreeMap<String, Vec<String>>,
}

/// Facilities ahead of or behind the point along its carriageway
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlongRoad {
    pub in_front: Vec<String>,
    pub passed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    /// Chainage of the point, e.g. `7.25K`
    pub chainage_label: Option<String>,
    pub direction: DirectionReport,
    /// relation -> collection -> matching labels
    pub topological_matches: BTreeMap<Relation, BTreeMap<String, Vec<String>>>,
    /// collection -> overlap areas (km²), polygonal queries only
    pub intersection_areas: BTreeMap<String, Vec<IntersectionArea>>,
    pub proximity_classification: ProximityReport,
    /// collection -> the two boundaries the point sits between
    pub boundary_straddle: BTreeMap<String, Vec<String>>,
    pub along_road: AlongRoad,
    /// Non-fatal problems met while building the report
    pub warnings: Vec<String>,
    #[serde(serialize_with = "as_feature_collection")]
    pub geometry_echoes: Vec<geojson::Feature>,
}

fn as_feature_collection<S>(features: &[geojson::Feature], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    geojson::FeatureCollection {
        bbox: None,
        features: features.to_vec(),
        foreign_members: None,
    }
    .serialize(serializer)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationReport {
    pub status: ReportStatus,
    pub message: String,
    pub data: ReportData,
}

impl LocationReport {
    pub fn success(data: ReportData) -> Self {
        Self {
            status: ReportStatus::Success,
            message: "Success".to_string(),
            data,
        }
    }

    pub fn error(message: impl Into<String>, data: ReportData) -> Self {
        Self {
            status: ReportStatus::Error,
            message: message.into(),
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReportStatus::Success
    }

    pub fn to_json(&self) -> crate::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Result of evaluating one relation for an arbitrary query geometry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationReport {
    pub relation: Relation,
    /// collection -> matching labels
    pub matches: BTreeMap<String, Vec<String>>,
    /// collection -> overlap areas (km²), intersects with a polygonal query only
    pub intersection_areas: BTreeMap<String, Vec<IntersectionArea>>,
}
