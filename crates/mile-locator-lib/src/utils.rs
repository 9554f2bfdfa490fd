//! Utility functions for coordinate conversions and planar measurements

use geo::{Closest, ClosestPoint, Coord, LineString, MapCoords, Point};

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Kilometres spanned by one degree of latitude
const KM_PER_DEGREE: f64 = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;

/// A local planar frame in kilometres, centred on a geographic origin
///
/// Equirectangular projection: x grows east, y grows north. Accurate enough for the
/// few-kilometre working windows the locator operates on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    origin: Coord<f64>,
    cos_lat: f64,
}

impl LocalFrame {
    /// Create a frame centred on `origin` (longitude, latitude in degrees)
    pub fn centered_on(origin: Coord<f64>) -> Self {
        Self {
            origin,
            cos_lat: origin.y.to_radians().cos(),
        }
    }

    /// Geographic origin of the frame
    #[inline]
    pub fn origin(&self) -> Coord<f64> {
        self.origin
    }

    /// Convert (longitude, latitude) to frame kilometres
    #[inline(always)]
    pub fn to_local(&self, coord: Coord<f64>) -> Coord<f64> {
        Coord {
            x: (coord.x - self.origin.x) * KM_PER_DEGREE * self.cos_lat,
            y: (coord.y - self.origin.y) * KM_PER_DEGREE,
        }
    }

    /// Convert frame kilometres back to (longitude, latitude)
    #[inline(always)]
    pub fn to_geographic(&self, coord: Coord<f64>) -> Coord<f64> {
        Coord {
            x: self.origin.x + coord.x / (KM_PER_DEGREE * self.cos_lat),
            y: self.origin.y + coord.y / KM_PER_DEGREE,
        }
    }

    /// Project any geometry into the frame
    pub fn project<G>(&self, geometry: &G) -> G::Output
    where
        G: MapCoords<f64, f64>,
    {
        geometry.map_coords(|c| self.to_local(c))
    }

    /// Map any frame geometry back to longitude/latitude
    pub fn unproject<G>(&self, geometry: &G) -> G::Output
    where
        G: MapCoords<f64, f64>,
    {
        geometry.map_coords(|c| self.to_geographic(c))
    }
}

/// Planar distance between two coordinates
#[inline(always)]
pub fn planar_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Planar length of a polyline
pub fn planar_length(line: &LineString<f64>) -> f64 {
    line.lines().map(|l| l.dx().hypot(l.dy())).sum()
}

/// Nearest point on `geometry` to `point`, with its planar distance
///
/// Returns `None` when the nearest point is not unique in a way `geo` cannot resolve
/// (e.g. empty geometries).
pub fn closest_with_distance<G>(geometry: &G, point: Point<f64>) -> Option<(Point<f64>, f64)>
where
    G: ClosestPoint<f64>,
{
    match geometry.closest_point(&point) {
        Closest::Intersection(p) => Some((p, 0.0)),
        Closest::SinglePoint(p) => Some((p, planar_distance(p.0, point.0))),
        Closest::Indeterminate => None,
    }
}

/// Great-circle distance between two (longitude, latitude) coordinates in kilometres
#[inline]
pub fn haversine_km(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let lat1 = a.y.to_radians();
    let lat2 = b.y.to_radians();
    let delta_lat = (b.y - a.y).to_radians();
    let delta_lon = (b.x - a.x).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Initial great-circle bearing from `a` to `b`, degrees clockwise from north in [0, 360)
#[inline]
pub fn bearing_deg(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let lat1 = a.y.to_radians();
    let lat2 = b.y.to_radians();
    let delta_lon = (b.x - a.x).to_radians();

    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();
    normalize_degrees(y.atan2(x).to_degrees())
}

/// Wrap an angle in degrees into [0, 360)
#[inline(always)]
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}
