//! Proximity classifier - Voronoi "area capture"
//!
//! Each facility is reduced to a seed point and the plane is tessellated around the seeds.
//! Inserting the query point as one more seed carves a new cell out of its neighbours.
//! A neighbour that loses a lot of area while its new boundary stays close to the query
//! point is "near":
//!
//! ```text
//! near degree = (area before - area after) / (distance to the new cell boundary)²
//! ```
//!
//! Degrees are normalized to shares summing to one. One facility above the share
//! threshold makes the point "near" it, two make it sit in the "middle" of them.

use crate::collection::NamedCollection;
use crate::utils::closest_with_distance;

use geo::{
    Area, BooleanOps, BoundingRect, Centroid, Coord, Intersects, LineString, Point, Polygon, Rect,
};
use serde::{Deserialize, Serialize};
use voronoice::{BoundingBox, ClipBehavior, VoronoiBuilder};

/// Normalized near-degree share of one facility
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FacilityShare {
    /// Index of the facility in the seed list
    pub index: usize,
    pub share: f64,
}

/// Result of classifying a point against one facility set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProximityOutcome {
    /// The single facility the point is near, if any
    pub near: Vec<usize>,
    /// The two facilities the point sits between, if any
    pub middle: Vec<usize>,
    /// Shares of every facility whose cell lost area, in seed order
    pub shares: Vec<FacilityShare>,
}

/// Seed point of every feature (area-weighted centroid), with its feature index
pub fn facility_seeds(collection: &NamedCollection) -> Vec<(usize, Point<f64>)> {
    collection
        .features
        .iter()
        .enumerate()
        .filter_map(|(i, f)| f.geometry.centroid().map(|c| (i, c)))
        .collect()
}

/// Working box around all seeds and the query, with a margin so no seed sits on an edge
fn working_box(seeds: &[Point<f64>], query: Point<f64>) -> Option<Rect<f64>> {
    let mut coords: Vec<Coord<f64>> = seeds.iter().map(|p| p.0).collect();
    coords.push(query.0);
    let rect = LineString::new(coords).bounding_rect()?;
    let margin = (rect.width().max(rect.height()) * 0.1).max(0.1);
    Some(Rect::new(
        Coord {
            x: rect.min().x - margin,
            y: rect.min().y - margin,
        },
        Coord {
            x: rect.max().x + margin,
            y: rect.max().y + margin,
        },
    ))
}

/// Voronoi cells of `sites` clipped to `bounds`, indexed like `sites`
///
/// Falls back to bisector clipping when no triangulation exists (fewer than three or
/// collinear sites).
fn tessellate(sites: &[Point<f64>], bounds: Rect<f64>) -> Vec<Polygon<f64>> {
    if let Some(cells) = voronoi_cells(sites, bounds) {
        return cells;
    }
    tracing::debug!(
        "No Voronoi diagram for {} sites, clipping bisectors instead",
        sites.len()
    );
    bisector_cells(sites, bounds)
}

fn voronoi_cells(sites: &[Point<f64>], bounds: Rect<f64>) -> Option<Vec<Polygon<f64>>> {
    if sites.len() < 3 {
        return None;
    }
    let center = bounds.center();
    let diagram = VoronoiBuilder::default()
        .set_sites(
            sites
                .iter()
                .map(|p| voronoice::Point { x: p.x(), y: p.y() })
                .collect(),
        )
        .set_bounding_box(BoundingBox::new(
            voronoice::Point {
                x: center.x,
                y: center.y,
            },
            bounds.width(),
            bounds.height(),
        ))
        .set_clip_behavior(ClipBehavior::Clip)
        .set_lloyd_relaxation_iterations(0)
        .build()?;

    let mut cells = vec![empty_cell(); sites.len()];
    for cell in diagram.iter_cells() {
        let ring: Vec<Coord<f64>> = cell
            .iter_vertices()
            .map(|v| Coord { x: v.x, y: v.y })
            .collect();
        if let Some(slot) = cells.get_mut(cell.site()) {
            *slot = Polygon::new(LineString::new(ring), vec![]);
        }
    }
    // A degenerate triangulation leaves some sites without a cell
    if cells.iter().any(|c| c.exterior().0.is_empty()) {
        return None;
    }
    Some(cells)
}

/// Each cell is the working box cut by the bisector half-planes towards every other site
fn bisector_cells(sites: &[Point<f64>], bounds: Rect<f64>) -> Vec<Polygon<f64>> {
    let reach = 2.0 * (bounds.width() + bounds.height()) + 1.0;
    sites
        .iter()
        .map(|site| {
            let mut cell = bounds.to_polygon();
            for other in sites.iter().filter(|other| *other != site) {
                let half_plane = closer_half_plane(site.0, other.0, reach);
                match cell.intersection(&half_plane).0.into_iter().next() {
                    Some(clipped) => cell = clipped,
                    None => return empty_cell(),
                }
            }
            cell
        })
        .collect()
}

/// Points closer to `site` than to `other`, as a counter-clockwise rectangle standing on
/// their bisector and reaching `reach` from its midpoint
fn closer_half_plane(site: Coord<f64>, other: Coord<f64>, reach: f64) -> Polygon<f64> {
    let mid = (site + other) / 2.0;
    let away = site - other;
    let towards_site = away / away.x.hypot(away.y) * reach;
    let along = Coord {
        x: -towards_site.y,
        y: towards_site.x,
    };
    Polygon::new(
        LineString::new(vec![
            mid - along,
            mid - along + towards_site,
            mid + along + towards_site,
            mid + along,
        ]),
        vec![],
    )
}

fn empty_cell() -> Polygon<f64> {
    Polygon::new(LineString::new(vec![]), vec![])
}

/// Classify `query` against facility seed points (local planar frame)
///
/// Returned indices refer to positions in `seeds`.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn classify_proximity(
    query: Point<f64>,
    seeds: &[Point<f64>],
    share_threshold: f64,
) -> ProximityOutcome {
    if seeds.is_empty() {
        return ProximityOutcome::default();
    }
    let Some(bounds) = working_box(seeds, query) else {
        return ProximityOutcome::default();
    };

    let mut with_query = seeds.to_vec();
    with_query.push(query);
    let before = tessellate(seeds, bounds);
    let after = tessellate(&with_query, bounds);
    let Some(query_cell) = after.get(seeds.len()) else {
        return ProximityOutcome::default();
    };
    if query_cell.exterior().0.is_empty() {
        tracing::warn!("Query point has an empty Voronoi cell, skipping proximity");
        return ProximityOutcome::default();
    }

    let degrees: Vec<(usize, f64)> = before
        .iter()
        .zip(after.iter())
        .enumerate()
        .filter(|(_, (old, new))| old.intersects(query_cell) && new.intersects(query_cell))
        .filter_map(|(i, (old, new))| {
            let (_, distance) = closest_with_distance(new.exterior(), query)?;
            if distance <= f64::EPSILON {
                return None;
            }
            let stolen = old.unsigned_area() - new.unsigned_area();
            Some((i, stolen / distance.powi(2)))
        })
        .filter(|(_, degree)| *degree > 0.0)
        .collect();

    let total: f64 = degrees.iter().map(|(_, d)| d).sum();
    if total <= 0.0 {
        return ProximityOutcome::default();
    }
    let shares: Vec<FacilityShare> = degrees
        .iter()
        .map(|&(index, degree)| FacilityShare {
            index,
            share: degree / total,
        })
        .collect();

    let emitted: Vec<usize> = shares
        .iter()
        .filter(|s| s.share > share_threshold)
        .map(|s| s.index)
        .collect();
    tracing::debug!(
        "Proximity shares over {} neighbours, {} above {share_threshold}",
        shares.len(),
        emitted.len()
    );

    match emitted.len() {
        1 => ProximityOutcome {
            near: emitted,
            middle: Vec::new(),
            shares,
        },
        2 => ProximityOutcome {
            near: Vec::new(),
            middle: emitted,
            shares,
        },
        _ => ProximityOutcome {
            near: Vec::new(),
            middle: Vec::new(),
            shares,
        },
    }
}

/// Classify `query` against a facility collection; indices refer to its features
pub fn classify_collection(
    query: Point<f64>,
    collection: &NamedCollection,
    share_threshold: f64,
) -> ProximityOutcome {
    let seeds = facility_seeds(collection);
    let points: Vec<Point<f64>> = seeds.iter().map(|(_, p)| *p).collect();
    let outcome = classify_proximity(query, &points, share_threshold);

    let to_feature = |i: usize| seeds.get(i).map(|(feature, _)| *feature);
    ProximityOutcome {
        near: outcome.near.into_iter().filter_map(to_feature).collect(),
        middle: outcome.middle.into_iter().filter_map(to_feature).collect(),
        shares: outcome
            .shares
            .into_iter()
            .filter_map(|s| {
                Some(FacilityShare {
                    index: to_feature(s.index)?,
                    share: s.share,
                })
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Feature;

    fn grid_seeds() -> Vec<Point<f64>> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
            Point::new(10.0, 10.0),
        ]
    }

    #[test]
    fn test_tessellation_covers_working_box() {
        let seeds = grid_seeds();
        let bounds = working_box(&seeds, Point::new(1.0, 1.0)).unwrap();
        let cells = tessellate(&seeds, bounds);
        assert_eq!(cells.len(), 4);

        let total: f64 = cells.iter().map(|c| c.unsigned_area()).sum();
        let expected = bounds.width() * bounds.height();
        assert!((total - expected).abs() < 1e-6 * expected);

        // Cells are indexed like their seeds
        for (cell, seed) in cells.iter().zip(seeds.iter()) {
            assert!(cell.intersects(seed));
        }
    }

    #[test]
    fn test_point_near_one_facility() {
        let outcome = classify_proximity(Point::new(1.0, 1.0), &grid_seeds(), 0.4);
        assert_eq!(outcome.near, vec![0]);
        assert!(outcome.middle.is_empty());
    }

    #[test]
    fn test_point_between_two_facilities() {
        let outcome = classify_proximity(Point::new(5.0, 0.2), &grid_seeds(), 0.4);
        assert!(outcome.near.is_empty());
        assert_eq!(outcome.middle, vec![0, 1]);
    }

    #[test]
    fn test_shares_sum_to_one() {
        for query in [
            Point::new(1.0, 1.0),
            Point::new(5.0, 0.2),
            Point::new(4.0, 6.0),
            Point::new(9.0, 2.0),
        ] {
            let outcome = classify_proximity(query, &grid_seeds(), 0.4);
            assert!(!outcome.shares.is_empty());
            let sum: f64 = outcome.shares.iter().map(|s| s.share).sum();
            assert!((sum - 1.0).abs() < 1e-9, "{query:?}: {sum}");
        }
    }

    #[test]
    fn test_bisector_cells_match_voronoi_cells() {
        let seeds = grid_seeds();
        let bounds = working_box(&seeds, Point::new(1.0, 1.0)).unwrap();
        let clipped = bisector_cells(&seeds, bounds);
        let voronoi = voronoi_cells(&seeds, bounds).unwrap();
        for (a, b) in clipped.iter().zip(voronoi.iter()) {
            assert!((a.unsigned_area() - 36.0).abs() < 1e-9);
            assert!((a.unsigned_area() - b.unsigned_area()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_single_facility_is_near() {
        let outcome = classify_proximity(Point::new(0.5, 0.5), &[Point::new(0.0, 0.0)], 0.4);
        assert_eq!(outcome.near, vec![0]);
        assert_eq!(outcome.shares.len(), 1);
        assert!((outcome.shares[0].share - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_two_facilities_straddled() {
        let seeds = [Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        let outcome = classify_proximity(Point::new(5.0, 0.2), &seeds, 0.4);
        assert!(outcome.near.is_empty());
        assert_eq!(outcome.middle, vec![0, 1]);
    }

    #[test]
    fn test_collinear_facilities() {
        let seeds = [
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(10.0, 0.0),
        ];
        let outcome = classify_proximity(Point::new(0.5, 0.05), &seeds, 0.4);
        assert_eq!(outcome.near, vec![0]);
        assert!(outcome.middle.is_empty());

        let sum: f64 = outcome.shares.iter().map(|s| s.share).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_facilities() {
        let outcome = classify_proximity(Point::new(1.0, 1.0), &[], 0.4);
        assert_eq!(outcome, ProximityOutcome::default());
    }

    #[test]
    fn test_classify_collection_maps_feature_indices() {
        let mut features: Vec<Feature> = grid_seeds()
            .into_iter()
            .enumerate()
            .map(|(i, p)| Feature::new(p).with_property("roadname", format!("F{i}")))
            .collect();
        // A feature without a centroid shifts seed indices
        features.insert(
            0,
            Feature::new(geo::MultiPoint::<f64>::new(vec![])).with_property("roadname", "void"),
        );
        let collection = NamedCollection::new("RouteAncillaryFacilities", "roadname", features);

        let outcome = classify_collection(Point::new(1.0, 1.0), &collection, 0.4);
        assert_eq!(outcome.near, vec![1]);
        assert_eq!(collection.features[1].label("roadname"), "F0");
    }
}
