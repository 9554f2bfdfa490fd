//! Direction resolver
//!
//! Finds which carriageway direction a target segment belongs to. The reference segment
//! (the opposite carriageway) is slid along the four cardinal axes until it touches the
//! target; the contact axis says on which side of the road the target lies, and the
//! chainage gradient of the target's ends turns that into a heading.

use crate::utils::closest_with_distance;

use geo::{Intersects, LineString, Point, Translate};
use serde::{Deserialize, Serialize};

/// Translation directions, tried in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinal {
    North,
    East,
    South,
    West,
}

impl Cardinal {
    pub const ALL: [Cardinal; 4] = [
        Cardinal::North,
        Cardinal::East,
        Cardinal::South,
        Cardinal::West,
    ];

    /// Bearing in degrees clockwise from north
    pub fn degrees(self) -> u16 {
        match self {
            Cardinal::North => 0,
            Cardinal::East => 90,
            Cardinal::South => 180,
            Cardinal::West => 270,
        }
    }

    /// Unit vector in the local frame (x east, y north)
    fn unit(self) -> (f64, f64) {
        match self {
            Cardinal::North => (0.0, 1.0),
            Cardinal::East => (1.0, 0.0),
            Cardinal::South => (0.0, -1.0),
            Cardinal::West => (-1.0, 0.0),
        }
    }
}

/// Carriageway heading of a road segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Heading {
    #[serde(rename = "N")]
    North,
    #[serde(rename = "S")]
    South,
}

impl Heading {
    pub fn as_str(self) -> &'static str {
        match self {
            Heading::North => "N",
            Heading::South => "S",
        }
    }
}

/// Translate-and-test search parameters, in kilometres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionSearch {
    /// First translation distance. Default: 0.001
    pub initial_km: f64,
    /// Increment between attempts. Default: 0.001
    pub step_km: f64,
    /// Largest translation tried. Default: 0.2
    pub max_km: f64,
}

impl Default for DirectionSearch {
    fn default() -> Self {
        Self {
            initial_km: 0.001,
            step_km: 0.001,
            max_km: 0.2,
        }
    }
}

impl DirectionSearch {
    /// Translation distances tried along each axis, `initial_km..=max_km`
    pub fn distances(&self) -> impl Iterator<Item = f64> + '_ {
        let steps = if self.step_km > 0.0 && self.max_km >= self.initial_km {
            ((self.max_km - self.initial_km) / self.step_km).round() as usize
        } else {
            0
        };
        (0..=steps).map(move |i| self.initial_km + i as f64 * self.step_km)
    }
}

/// A segment end with the chainage of its nearest marker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extremity {
    pub point: Point<f64>,
    pub chainage: f64,
}

/// Where a facility sits relative to the travelling point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlongRoadRelation {
    /// Still ahead of the point
    InFront,
    /// Already behind the point
    Passed,
}

/// Smallest planar distance between two polylines that do not intersect
fn separation(a: &LineString<f64>, b: &LineString<f64>) -> f64 {
    let from_a = a
        .points()
        .filter_map(|p| closest_with_distance(b, p).map(|(_, d)| d));
    let from_b = b
        .points()
        .filter_map(|p| closest_with_distance(a, p).map(|(_, d)| d));
    from_a.chain(from_b).fold(f64::INFINITY, f64::min)
}

/// First cardinal axis along which `reference` can be slid into contact with `target`
///
/// Contact means intersecting, or coming closer than half a step, so that parallel
/// carriageways which a discrete sweep would jump over are still caught.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn contact_direction(
    target: &LineString<f64>,
    reference: &LineString<f64>,
    search: &DirectionSearch,
) -> Option<Cardinal> {
    let tolerance = search.step_km / 2.0;
    for cardinal in Cardinal::ALL {
        let (ux, uy) = cardinal.unit();
        for distance in search.distances() {
            let moved = reference.translate(ux * distance, uy * distance);
            if moved.intersects(target) || separation(&moved, target) <= tolerance {
                tracing::debug!(
                    "Reference segment meets the target {distance:.3} km towards {cardinal:?}"
                );
                return Some(cardinal);
            }
        }
        tracing::debug!("No contact towards {cardinal:?}");
    }
    None
}

/// Turn a contact axis and the chainage of the target's ends into a heading
///
/// The ends are ordered by increasing chainage; their coordinate order along the axis
/// perpendicular to the contact gives the rotation to north, which decides the heading.
pub fn resolve_heading(contact: Option<Cardinal>, a: Extremity, b: Extremity) -> Option<Heading> {
    let contact = contact?;
    let (low, high) = if a.chainage < b.chainage {
        (a.point, b.point)
    } else {
        (b.point, a.point)
    };

    let degree_to_north: u16 = match contact {
        Cardinal::North | Cardinal::South => {
            if low.x() > high.x() {
                90
            } else {
                270
            }
        }
        Cardinal::East | Cardinal::West => {
            if low.y() > high.y() {
                0
            } else {
                180
            }
        }
    };

    let target = contact.degrees();
    let heading = if degree_to_north == 0 {
        if target == 90 {
            Heading::North
        } else {
            Heading::South
        }
    } else if target > degree_to_north {
        Heading::North
    } else {
        Heading::South
    };
    Some(heading)
}

/// Full direction resolution for a target segment and its reference segment
pub fn resolve_direction(
    target: &LineString<f64>,
    reference: &LineString<f64>,
    a: Extremity,
    b: Extremity,
    search: &DirectionSearch,
) -> Option<Heading> {
    let heading = resolve_heading(contact_direction(target, reference, search), a, b);
    if heading.is_none() {
        tracing::warn!("Could not resolve the carriageway direction");
    }
    heading
}

/// Compare the chainage of the point with the chainage of a facility
///
/// Northbound traffic has passed what lies below its chainage, southbound traffic what
/// lies above it. Equal chainages give no relation.
pub fn along_road_relation(
    heading: Heading,
    point_chainage: f64,
    facility_chainage: f64,
) -> Option<AlongRoadRelation> {
    use std::cmp::Ordering;

    let ordering = point_chainage.partial_cmp(&facility_chainage)?;
    match (heading, ordering) {
        (_, Ordering::Equal) => None,
        (Heading::North, Ordering::Greater) | (Heading::South, Ordering::Less) => {
            Some(AlongRoadRelation::InFront)
        }
        (Heading::North, Ordering::Less) | (Heading::South, Ordering::Greater) => {
            Some(AlongRoadRelation::Passed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(coords: Vec<(f64, f64)>) -> LineString<f64> {
        LineString::from(coords)
    }

    fn extremity(x: f64, y: f64, chainage: f64) -> Extremity {
        Extremity {
            point: Point::new(x, y),
            chainage,
        }
    }

    #[test]
    fn test_search_distances() {
        let search = DirectionSearch::default();
        let distances: Vec<f64> = search.distances().collect();
        assert_eq!(distances.len(), 200);
        assert!((distances[0] - 0.001).abs() < 1e-12);
        assert!((distances[199] - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_contact_parallel_carriageways() {
        // Reference 10 m north of the target: it must move south to meet it
        let target = line(vec![(0.0, 0.0), (1.0, 0.0)]);
        let reference = line(vec![(0.0, 0.01), (1.0, 0.01)]);
        let contact = contact_direction(&target, &reference, &DirectionSearch::default());
        assert_eq!(contact, Some(Cardinal::South));

        // And north when it lies to the south
        let reference = line(vec![(0.0, -0.02), (1.0, -0.02)]);
        let contact = contact_direction(&target, &reference, &DirectionSearch::default());
        assert_eq!(contact, Some(Cardinal::North));
    }

    #[test]
    fn test_contact_north_south_road() {
        let target = line(vec![(0.0, 0.0), (0.0, 1.0)]);
        let reference = line(vec![(0.015, 0.0), (0.015, 1.0)]);
        let contact = contact_direction(&target, &reference, &DirectionSearch::default());
        assert_eq!(contact, Some(Cardinal::West));
    }

    #[test]
    fn test_contact_out_of_reach() {
        let target = line(vec![(0.0, 0.0), (1.0, 0.0)]);
        let reference = line(vec![(5.0, 5.0), (6.0, 5.0)]);
        assert_eq!(
            contact_direction(&target, &reference, &DirectionSearch::default()),
            None
        );
    }

    #[test]
    fn test_reversed_reference_gives_same_heading() {
        let target = line(vec![(0.0, 0.0), (1.0, 0.0)]);
        let reference = line(vec![(0.0, 0.01), (1.0, 0.01)]);
        let reversed = line(vec![(1.0, 0.01), (0.0, 0.01)]);
        let a = extremity(0.0, 0.0, 1.0);
        let b = extremity(1.0, 0.0, 2.0);
        let search = DirectionSearch::default();

        let forward = resolve_direction(&target, &reference, a, b, &search);
        let backward = resolve_direction(&target, &reversed, a, b, &search);
        assert!(forward.is_some());
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_resolve_heading_east_west_road() {
        // Chainage grows eastward
        let a = extremity(0.0, 0.0, 1.0);
        let b = extremity(1.0, 0.0, 2.0);
        assert_eq!(
            resolve_heading(Some(Cardinal::South), a, b),
            Some(Heading::South)
        );
        assert_eq!(
            resolve_heading(Some(Cardinal::North), a, b),
            Some(Heading::South)
        );

        // Chainage grows westward
        let a = extremity(0.0, 0.0, 2.0);
        let b = extremity(1.0, 0.0, 1.0);
        assert_eq!(
            resolve_heading(Some(Cardinal::South), a, b),
            Some(Heading::North)
        );
    }

    #[test]
    fn test_resolve_heading_north_south_road() {
        // Chainage grows northward
        let a = extremity(0.0, 0.0, 1.0);
        let b = extremity(0.0, 1.0, 2.0);
        assert_eq!(
            resolve_heading(Some(Cardinal::West), a, b),
            Some(Heading::North)
        );
        assert_eq!(
            resolve_heading(Some(Cardinal::East), a, b),
            Some(Heading::South)
        );

        // Chainage grows southward: rotation to north is zero
        let a = extremity(0.0, 1.0, 1.0);
        let b = extremity(0.0, 0.0, 2.0);
        assert_eq!(
            resolve_heading(Some(Cardinal::East), a, b),
            Some(Heading::North)
        );
        assert_eq!(
            resolve_heading(Some(Cardinal::West), a, b),
            Some(Heading::South)
        );
    }

    #[test]
    fn test_resolve_heading_without_contact() {
        let a = extremity(0.0, 0.0, 1.0);
        let b = extremity(1.0, 0.0, 2.0);
        assert_eq!(resolve_heading(None, a, b), None);
    }

    #[test]
    fn test_heading_serializes_as_letter() {
        assert_eq!(serde_json::to_string(&Heading::North).unwrap(), "\"N\"");
        assert_eq!(serde_json::to_string(&Heading::South).unwrap(), "\"S\"");
    }

    #[test]
    fn test_along_road_relation() {
        use AlongRoadRelation::*;
        assert_eq!(along_road_relation(Heading::North, 5.0, 3.0), Some(InFront));
        assert_eq!(along_road_relation(Heading::North, 2.0, 3.0), Some(Passed));
        assert_eq!(along_road_relation(Heading::South, 2.0, 3.0), Some(InFront));
        assert_eq!(along_road_relation(Heading::South, 5.0, 3.0), Some(Passed));
        assert_eq!(along_road_relation(Heading::North, 3.0, 3.0), None);
        assert_eq!(along_road_relation(Heading::South, f64::NAN, 3.0), None);
    }
}
