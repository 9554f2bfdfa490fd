//! Topological batch evaluator
//!
//! Applies one DE-9IM predicate between a query geometry and every feature of a set of
//! named collections, collecting the labels of the matches.

use crate::collection::NamedCollection;
use crate::filter::within_radius;
use crate::{LocateError, Result};

use geo::{Area, BooleanOps, Geometry, MultiPolygon, Point, Relate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A named topological predicate
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Equals,
    Disjoint,
    Touches,
    Contains,
    Covers,
    Intersects,
    Within,
    Crosses,
    Overlaps,
}

impl Relation {
    pub const ALL: [Relation; 9] = [
        Relation::Equals,
        Relation::Disjoint,
        Relation::Touches,
        Relation::Contains,
        Relation::Covers,
        Relation::Intersects,
        Relation::Within,
        Relation::Crosses,
        Relation::Overlaps,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Relation::Equals => "equals",
            Relation::Disjoint => "disjoint",
            Relation::Touches => "touches",
            Relation::Contains => "contains",
            Relation::Covers => "covers",
            Relation::Intersects => "intersects",
            Relation::Within => "within",
            Relation::Crosses => "crosses",
            Relation::Overlaps => "overlaps",
        }
    }

    /// Whether `query` stands in this relation to `feature`
    pub fn holds(self, query: &Geometry<f64>, feature: &Geometry<f64>) -> bool {
        let matrix = query.relate(feature);
        match self {
            Relation::Equals => matrix.is_equal_topo(),
            Relation::Disjoint => matrix.is_disjoint(),
            Relation::Touches => matrix.is_touches(),
            Relation::Contains => matrix.is_contains(),
            Relation::Covers => matrix.is_covers(),
            Relation::Intersects => matrix.is_intersects(),
            Relation::Within => matrix.is_within(),
            Relation::Crosses => matrix.is_crosses(),
            Relation::Overlaps => matrix.is_overlaps(),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Relation {
    type Err = LocateError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Relation::ALL
            .into_iter()
            .find(|r| r.name() == wanted)
            .ok_or_else(|| LocateError::InputValidation(format!("unknown relation '{s}'")))
    }
}

/// Labels of the features of `collection` that `query` stands in `relation` to
pub fn matching_labels(
    query: &Geometry<f64>,
    relation: Relation,
    collection: &NamedCollection,
) -> Vec<String> {
    collection
        .features
        .iter()
        .filter(|f| relation.holds(query, &f.geometry))
        .map(|f| f.label(&collection.label_column))
        .collect()
}

/// Evaluate `relation` against every collection named in `names`
///
/// Names that match no collection are skipped. Labels keep collection order.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn evaluate(
    query: &Geometry<f64>,
    relation: Relation,
    collections: &[&NamedCollection],
    names: &[String],
) -> BTreeMap<String, Vec<String>> {
    let mut result = BTreeMap::new();
    for name in names {
        match collections.iter().find(|c| &c.name == name) {
            Some(collection) => {
                result.insert(name.clone(), matching_labels(query, relation, collection));
            }
            None => tracing::debug!("No collection named '{name}' for {relation}"),
        }
    }
    result
}

/// Area shared by the query and one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionArea {
    pub label: String,
    /// Area in squared units of the input frame (km² in the local frame)
    pub area: f64,
}

fn as_multi_polygon(geometry: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        Geometry::Rect(r) => Some(MultiPolygon::new(vec![r.to_polygon()])),
        Geometry::Triangle(t) => Some(MultiPolygon::new(vec![t.to_polygon()])),
        _ => None,
    }
}

/// Overlap areas between a polygonal query and the intersecting polygonal features
///
/// Non-polygonal queries or features have no meaningful area and are left out.
pub fn intersection_areas(
    query: &Geometry<f64>,
    collection: &NamedCollection,
) -> Vec<IntersectionArea> {
    let Some(query_area) = as_multi_polygon(query) else {
        return Vec::new();
    };
    collection
        .features
        .iter()
        .filter(|f| Relation::Intersects.holds(query, &f.geometry))
        .filter_map(|f| {
            let shape = as_multi_polygon(&f.geometry)?;
            Some(IntersectionArea {
                label: f.label(&collection.label_column),
                area: query_area.intersection(&shape).unsigned_area(),
            })
        })
        .collect()
}

/// Pair of boundaries the point straddles
///
/// Lists the features within `threshold_km` of `point`; exactly two make a straddled
/// pair, any other count yields an empty list.
pub fn boundary_straddle(
    point: Point<f64>,
    collection: &NamedCollection,
    threshold_km: f64,
) -> Vec<String> {
    let near: Vec<String> = collection
        .features
        .iter()
        .filter(|f| within_radius(point, &f.geometry, threshold_km))
        .map(|f| f.label(&collection.label_column))
        .collect();
    if near.len() == 2 { near } else { Vec::new() }
}
