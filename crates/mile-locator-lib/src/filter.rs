//! Spatial filter
//!
//! Cuts reference collections down to the working window around the query point before
//! any of the expensive steps run. All inputs are expected in the local planar frame.

use crate::collection::{Feature, NamedCollection};
use crate::utils::closest_with_distance;

use geo::{Geometry, Intersects, Point};

/// Whether a disc of `radius_km` around `point` touches `geometry`
///
/// The disc boundary is inclusive: a feature exactly `radius_km` away is kept.
#[inline]
pub fn within_radius(point: Point<f64>, geometry: &Geometry<f64>, radius_km: f64) -> bool {
    if geometry.intersects(&point) {
        return true;
    }
    closest_with_distance(geometry, point).is_some_and(|(_, distance)| distance <= radius_km)
}

/// Features touching the disc of `radius_km` around `point`, in input order
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn filter_features(point: Point<f64>, features: &[Feature], radius_km: f64) -> Vec<Feature> {
    let kept: Vec<Feature> = features
        .iter()
        .filter(|f| within_radius(point, &f.geometry, radius_km))
        .cloned()
        .collect();
    tracing::debug!(
        "Spatial filter kept {} of {} features within {radius_km} km",
        kept.len(),
        features.len()
    );
    kept
}

/// [`filter_features`] over a named collection, keeping its metadata
pub fn filter_collection(
    point: Point<f64>,
    collection: &NamedCollection,
    radius_km: f64,
) -> NamedCollection {
    collection.with_features(filter_features(point, &collection.features, radius_km))
}
