//! Azimuths and compass labels between geometries
//!
//! Bearings are computed on the sphere from longitude/latitude input.

pub use crate::utils::bearing_deg;
use crate::utils::{LocalFrame, closest_with_distance, normalize_degrees};
use crate::{LocateError, Result};

use geo::{Centroid, Geometry, Point};
use serde::{Deserialize, Serialize};

/// 8-point compass bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compass {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Compass {
    const ORDER: [Compass; 8] = [
        Compass::N,
        Compass::NE,
        Compass::E,
        Compass::SE,
        Compass::S,
        Compass::SW,
        Compass::W,
        Compass::NW,
    ];

    /// Bucket of a bearing in degrees; each bucket spans 45° centred on its direction
    pub fn from_bearing(bearing: f64) -> Self {
        let index = (normalize_degrees(bearing) / 45.0).round() as usize % 8;
        Self::ORDER[index]
    }
}

/// Overlapping fuzzy sectors used for "which side" answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FuzzyDirection {
    North,
    East,
    South,
    West,
}

impl FuzzyDirection {
    /// Sector centre and half-width in degrees
    fn sector(self) -> (f64, f64) {
        match self {
            FuzzyDirection::North => (0.0, 30.0),
            FuzzyDirection::East => (90.0, 60.0),
            FuzzyDirection::South => (180.0, 30.0),
            FuzzyDirection::West => (270.0, 60.0),
        }
    }
}

/// Every fuzzy sector containing `bearing` (sector edges included)
pub fn fuzzy_directions(bearing: f64) -> Vec<FuzzyDirection> {
    [
        FuzzyDirection::North,
        FuzzyDirection::East,
        FuzzyDirection::South,
        FuzzyDirection::West,
    ]
    .into_iter()
    .filter(|direction| {
        let (centre, margin) = direction.sector();
        let diff = ((bearing - centre + 180.0).rem_euclid(360.0) - 180.0).abs();
        diff <= margin
    })
    .collect()
}

/// Direction of a target geometry as seen from a reference geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AzimuthRelation {
    /// Bearing from the reference centroid to the target, degrees in [0, 360)
    pub bearing: f64,
    pub compass: Compass,
    pub directions: Vec<FuzzyDirection>,
}

/// Bearing and fuzzy sectors from `reference` to `target` (longitude/latitude)
///
/// The target is reduced to the point itself, the point of a line nearest the reference
/// centroid, or its centroid for anything else.
pub fn azimuth_relation(
    target: &Geometry<f64>,
    reference: &Geometry<f64>,
) -> Result<AzimuthRelation> {
    let origin = reference.centroid().ok_or_else(|| {
        LocateError::InputValidation("reference geometry is empty".to_string())
    })?;
    let effective = effective_point(target, origin)?;

    let bearing = bearing_deg(origin.0, effective.0);
    Ok(AzimuthRelation {
        bearing,
        compass: Compass::from_bearing(bearing),
        directions: fuzzy_directions(bearing),
    })
}

fn effective_point(target: &Geometry<f64>, origin: Point<f64>) -> Result<Point<f64>> {
    let empty = || LocateError::InputValidation("target geometry is empty".to_string());
    match target {
        Geometry::Point(point) => Ok(*point),
        Geometry::LineString(line) => {
            let frame = LocalFrame::centered_on(origin.0);
            let local = frame.project(line);
            let (nearest, _) =
                closest_with_distance(&local, Point::new(0.0, 0.0)).ok_or_else(empty)?;
            Ok(Point::from(frame.to_geographic(nearest.0)))
        }
        other => other.centroid().ok_or_else(empty),
    }
}
