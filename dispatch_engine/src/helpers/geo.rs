use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points, in metres.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.latitude.to_radians(), a.longitude.to_radians());
    let (lat2, lon2) = (b.latitude.to_radians(), b.longitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_distance() {
        let p = GeoPoint::new(51.5074, -0.1278);
        assert!(haversine_m(p, p) < 1e-6);
    }

    #[test]
    fn london_to_brighton() {
        let london = GeoPoint::new(51.5074, -0.1278);
        let brighton = GeoPoint::new(50.8225, -0.1372);
        let d = haversine_m(london, brighton);
        // Roughly 76 km as the crow flies.
        assert!((70_000.0..82_000.0).contains(&d), "distance was {d}");
    }
}
