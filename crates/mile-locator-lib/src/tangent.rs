//! Outer bitangents between two convex polygons
//!
//! Both vertex lists are sorted counter-clockwise around their mean point, then the
//! rightmost vertex of the left polygon and the leftmost vertex of the right polygon are
//! walked until the joining line supports both shapes. The tangents feed an azimuth range
//! telling in which compass sector one polygon lies as seen from the other.

use crate::azimuth::{Compass, bearing_deg};
use crate::utils::normalize_degrees;
use crate::{LocateError, Result};

use geo::Coord;
use serde::{Deserialize, Serialize};

/// One supporting line, as a vertex of each polygon
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TangentPair {
    /// Vertex of the first polygon given to [`outer_tangents`]
    pub on_first: Coord<f64>,
    /// Vertex of the second polygon
    pub on_second: Coord<f64>,
}

/// Both outer tangents and any precondition warnings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OuterTangents {
    pub upper: TangentPair,
    pub lower: TangentPair,
    /// Non-empty when an input was not convex; the tangents are then unreliable
    pub warnings: Vec<String>,
}

/// Azimuths derived from the two tangents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AzimuthRange {
    /// Bearing along the upper tangent, first polygon towards second
    pub upper_deg: f64,
    /// Bearing along the lower tangent, first polygon towards second
    pub lower_deg: f64,
    /// `[min, max]` of the two bearings
    pub range: [f64; 2],
    /// The range seen from the second polygon, rotated by 180°
    pub reversed: [f64; 2],
    /// Compass bucket of each bound of `range`
    pub compass: [Compass; 2],
}

/// Sign of the turn a -> b -> c: positive clockwise, negative counter-clockwise
#[inline(always)]
fn orientation(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>) -> i8 {
    let value = (b.y - a.y) * (c.x - b.x) - (c.y - b.y) * (b.x - a.x);
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

/// Vertices sorted counter-clockwise around their mean, starting from the +x axis
fn polar_sorted(points: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let n = points.len() as f64;
    let sum = points.iter().fold(Coord { x: 0.0, y: 0.0 }, |acc, p| acc + *p);
    let mean = Coord {
        x: sum.x / n,
        y: sum.y / n,
    };

    let angle = |p: &Coord<f64>| {
        let d = *p - mean;
        d.y.atan2(d.x).rem_euclid(std::f64::consts::TAU)
    };
    let mut sorted = points.to_vec();
    sorted.sort_by(|p, q| angle(p).total_cmp(&angle(q)));
    sorted
}

/// Whether consecutive turns of a closed vertex cycle never change direction
fn is_convex(points: &[Coord<f64>]) -> bool {
    let n = points.len();
    let mut sign = 0;
    for i in 0..n {
        let turn = orientation(points[i], points[(i + 1) % n], points[(i + 2) % n]);
        if turn == 0 {
            continue;
        }
        if sign == 0 {
            sign = turn;
        } else if turn != sign {
            return false;
        }
    }
    true
}

fn validated(points: &[Coord<f64>], name: &str) -> Result<Vec<Coord<f64>>> {
    if points.len() < 3 {
        return Err(LocateError::InputValidation(format!(
            "{name} polygon needs at least 3 vertices, got {}",
            points.len()
        )));
    }
    if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(LocateError::InputValidation(format!(
            "{name} polygon has non-finite coordinates"
        )));
    }
    // A closing vertex repeating the first one would be sorted twice
    let mut points = points.to_vec();
    if points.len() > 3 && points.first() == points.last() {
        points.pop();
    }
    Ok(points)
}

#[derive(Clone, Copy)]
enum Side {
    Upper,
    Lower,
}

/// Walk from the facing extremal vertices until the line a[ia]-b[ib] supports both
///
/// The upper walk turns `a` counter-clockwise and `b` clockwise; the lower walk is its
/// mirror image.
fn walk(a: &[Coord<f64>], b: &[Coord<f64>], side: Side) -> Result<(Coord<f64>, Coord<f64>)> {
    let (n1, n2) = (a.len(), b.len());
    let next = |i: usize, n: usize| (i + 1) % n;
    let prev = |i: usize, n: usize| (n + i - 1) % n;

    let mut ia = (0..n1)
        .reduce(|best, i| if a[i].x > a[best].x { i } else { best })
        .unwrap_or(0);
    let mut ib = (0..n2)
        .reduce(|best, i| if b[i].x < b[best].x { i } else { best })
        .unwrap_or(0);

    // Each move rotates the supporting line by one vertex
    let budget = 2 * (n1 + n2) + 4;
    let mut moves = 0;
    let step = |moves: &mut usize| {
        *moves += 1;
        if *moves > budget {
            Err(non_convergence())
        } else {
            Ok(())
        }
    };

    let mut done = false;
    while !done {
        done = true;
        match side {
            Side::Upper => {
                while orientation(b[ib], a[ia], a[next(ia, n1)]) >= 0 {
                    ia = next(ia, n1);
                    step(&mut moves)?;
                }
                while orientation(a[ia], b[ib], b[prev(ib, n2)]) <= 0 {
                    ib = prev(ib, n2);
                    done = false;
                    step(&mut moves)?;
                }
            }
            Side::Lower => {
                while orientation(b[ib], a[ia], a[prev(ia, n1)]) <= 0 {
                    ia = prev(ia, n1);
                    step(&mut moves)?;
                }
                while orientation(a[ia], b[ib], b[next(ib, n2)]) >= 0 {
                    ib = next(ib, n2);
                    done = false;
                    step(&mut moves)?;
                }
            }
        }
    }
    Ok((a[ia], b[ib]))
}

fn non_convergence() -> LocateError {
    LocateError::GeometryPrecondition(
        "tangent search did not converge; polygons must be convex and disjoint".to_string(),
    )
}

/// Upper and lower outer tangents between two convex polygons
///
/// Input vertex lists are left untouched; a repeated closing vertex is ignored. Polygons
/// that are not convex produce a warning in the result instead of an error, since the
/// walk still terminates on most such inputs.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn outer_tangents(first: &[Coord<f64>], second: &[Coord<f64>]) -> Result<OuterTangents> {
    let first = polar_sorted(&validated(first, "first")?);
    let second = polar_sorted(&validated(second, "second")?);

    let mut warnings = Vec::new();
    for (name, points) in [("first", &first), ("second", &second)] {
        if !is_convex(points) {
            tracing::warn!("The {name} polygon is not convex, tangents may be meaningless");
            warnings.push(format!("{name} polygon is not convex"));
        }
    }

    // The walk starts from the left polygon
    let max_first = first.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let min_second = second.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let swapped = min_second < max_first;
    let (left, right) = if swapped {
        (&second, &first)
    } else {
        (&first, &second)
    };

    let pair = |(on_left, on_right): (Coord<f64>, Coord<f64>)| {
        if swapped {
            TangentPair {
                on_first: on_right,
                on_second: on_left,
            }
        } else {
            TangentPair {
                on_first: on_left,
                on_second: on_right,
            }
        }
    };

    Ok(OuterTangents {
        upper: pair(walk(left, right, Side::Upper)?),
        lower: pair(walk(left, right, Side::Lower)?),
        warnings,
    })
}

/// Bearings of both tangents (longitude/latitude input) and their compass range
pub fn azimuth_range(tangents: &OuterTangents) -> AzimuthRange {
    let upper_deg = bearing_deg(tangents.upper.on_first, tangents.upper.on_second);
    let lower_deg = bearing_deg(tangents.lower.on_first, tangents.lower.on_second);
    let range = [upper_deg.min(lower_deg), upper_deg.max(lower_deg)];
    AzimuthRange {
        upper_deg,
        lower_deg,
        range,
        reversed: [
            normalize_degrees(range[0] + 180.0),
            normalize_degrees(range[1] + 180.0),
        ],
        compass: [Compass::from_bearing(range[0]), Compass::from_bearing(range[1])],
    }
}
