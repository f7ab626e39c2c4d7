//! Geographic utilities: projection to planar coordinates and planar
//! distance/heading arithmetic.

use std::f64::consts::PI;

use geo::{Distance, Euclidean, Point};

/// Earth radius used by the spherical web mercator projection (meters).
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude where web mercator becomes square; the poles map to infinity.
pub const MERCATOR_MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Maps geographic coordinates to integer planar coordinates.
///
/// Implementations must be pure and total; invalid coordinates are
/// rejected before projection.
pub trait Projector {
    fn project(&self, lat: f64, lon: f64) -> (i64, i64);
}

/// Spherical web mercator in meters, floored to whole meters. Latitudes
/// beyond [`MERCATOR_MAX_LATITUDE`] are clamped to it.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercator;

impl Projector for WebMercator {
    fn project(&self, lat: f64, lon: f64) -> (i64, i64) {
        let lat = lat.clamp(-MERCATOR_MAX_LATITUDE, MERCATOR_MAX_LATITUDE);
        let x = EARTH_RADIUS * lon.to_radians();
        let y = EARTH_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
        (x.floor() as i64, y.floor() as i64)
    }
}

impl<F> Projector for F
where
    F: Fn(f64, f64) -> (i64, i64),
{
    fn project(&self, lat: f64, lon: f64) -> (i64, i64) {
        self(lat, lon)
    }
}

/// Euclidean distance between two planar positions.
pub fn planar_distance(from: (i64, i64), to: (i64, i64)) -> f64 {
    Euclidean::distance(
        Point::new(from.0 as f64, from.1 as f64),
        Point::new(to.0 as f64, to.1 as f64),
    )
}

/// Bearing from one planar position to another in degrees, 0° along +Y,
/// increasing clockwise, in [0, 360).
pub fn heading_degrees(from: (i64, i64), to: (i64, i64)) -> f64 {
    let dx = (to.0 - from.0) as f64;
    let dy = (to.1 - from.1) as f64;
    dx.atan2(dy).to_degrees().rem_euclid(360.0)
}
