//! Great-circle distance, distance labels and nearest-first ordering.

use crate::machines::{Coordinate, Machine};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometers.
///
/// The longitude delta only enters through `sin²(Δλ/2)`, so pairs straddling
/// the antimeridian resolve to the short path.
#[must_use]
pub fn distance_km(from: Coordinate, to: Coordinate) -> f64 {
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + (d_lon / 2.0).sin().powi(2) * lat1.cos() * lat2.cos();
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Unit suffixes for [`format_distance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistanceUnits {
    pub meters: String,
    pub kilometers: String,
}

impl Default for DistanceUnits {
    fn default() -> Self {
        Self {
            meters: "m".to_string(),
            kilometers: "km".to_string(),
        }
    }
}

/// Render a distance for display.
///
/// The sign is ignored. Under one kilometer the value is shown in whole
/// meters rounded half-up (`0.0005` → `"1m"`); otherwise in kilometers with
/// `decimal_places` digits.
#[must_use]
pub fn format_distance(distance_km: f64, decimal_places: usize, units: &DistanceUnits) -> String {
    let magnitude = distance_km.abs();
    if magnitude < 1.0 {
        let meters = (magnitude * 1000.0).round();
        return format!("{meters:.0}{}", units.meters);
    }
    format!("{magnitude:.decimal_places$}{}", units.kilometers)
}

/// Anything with a position on the map.
pub trait Located {
    fn coordinate(&self) -> Coordinate;
}

impl Located for Coordinate {
    fn coordinate(&self) -> Coordinate {
        *self
    }
}

impl Located for Machine {
    fn coordinate(&self) -> Coordinate {
        self.coordinate
    }
}

impl<T: Located> Located for &T {
    fn coordinate(&self) -> Coordinate {
        (*self).coordinate()
    }
}

/// An item paired with its distance from a reference point.
#[derive(Debug, Clone, PartialEq)]
pub struct Nearby<T> {
    pub item: T,
    pub distance_km: f64,
}

/// Pair every item with its distance from `origin`, nearest first.
///
/// The input slice is left untouched. The sort is stable, so equidistant
/// items keep their original relative order.
#[must_use]
pub fn sort_by_distance<T: Located>(items: &[T], origin: Coordinate) -> Vec<Nearby<&T>> {
    let mut ranked: Vec<Nearby<&T>> = items
        .iter()
        .map(|item| Nearby {
            distance_km: distance_km(origin, item.coordinate()),
            item,
        })
        .collect();
    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKYO: Coordinate = Coordinate::new(35.6895, 139.6917);
    const OSAKA: Coordinate = Coordinate::new(34.6937, 135.5023);

    fn fmt(km: f64) -> String {
        format_distance(km, 1, &DistanceUnits::default())
    }

    #[test]
    fn distance_is_symmetric() {
        let pairs = [
            (TOKYO, OSAKA),
            (Coordinate::new(-33.9, 151.2), Coordinate::new(51.5, -0.12)),
            (Coordinate::new(0.0, 179.9), Coordinate::new(0.0, -179.9)),
        ];
        for (a, b) in pairs {
            assert!((distance_km(a, b) - distance_km(b, a)).abs() < 1e-9);
        }
    }

    #[test]
    fn distance_to_self_is_zero() {
        assert!(distance_km(TOKYO, TOKYO).abs() < f64::EPSILON);
        let pole = Coordinate::new(90.0, 0.0);
        assert!(distance_km(pole, pole).abs() < f64::EPSILON);
    }

    #[test]
    fn tokyo_to_osaka_is_about_400_km() {
        let d = distance_km(TOKYO, OSAKA);
        assert!((395.0..=405.0).contains(&d), "got {d}");
    }

    #[test]
    fn antimeridian_pairs_take_the_short_path() {
        let d = distance_km(Coordinate::new(0.0, 179.9), Coordinate::new(0.0, -179.9));
        assert!(d < 50.0, "got {d}");
        let d = distance_km(Coordinate::new(64.0, -179.99), Coordinate::new(64.0, 179.99));
        assert!(d < 5.0, "got {d}");
    }

    #[test]
    fn pole_to_pole_is_half_the_circumference() {
        let d = distance_km(Coordinate::new(90.0, 0.0), Coordinate::new(-90.0, 0.0));
        let expected = 20_000.0;
        assert!((d - expected).abs() / expected < 0.005, "got {d}");
    }

    #[test]
    fn format_under_one_km_uses_meters() {
        assert_eq!(fmt(0.5), "500m");
        assert_eq!(fmt(0.0), "0m");
        assert_eq!(fmt(0.999), "999m");
    }

    #[test]
    fn format_rounds_half_up_at_meter_boundary() {
        assert_eq!(fmt(0.0005), "1m");
        assert_eq!(fmt(0.0004), "0m");
    }

    #[test]
    fn format_ignores_sign() {
        assert_eq!(fmt(-0.5), "500m");
        assert_eq!(fmt(-2.567), "2.6km");
    }

    #[test]
    fn format_kilometers_with_precision() {
        assert_eq!(fmt(2.567), "2.6km");
        assert_eq!(fmt(1.0), "1.0km");
        assert_eq!(format_distance(2.567, 2, &DistanceUnits::default()), "2.57km");
        assert_eq!(format_distance(12.0, 0, &DistanceUnits::default()), "12km");
    }

    #[test]
    fn format_custom_units() {
        let units = DistanceUnits {
            meters: " メートル".to_string(),
            kilometers: " キロ".to_string(),
        };
        assert_eq!(format_distance(0.25, 1, &units), "250 メートル");
        assert_eq!(format_distance(3.0, 1, &units), "3.0 キロ");
    }

    #[test]
    fn sort_by_distance_orders_nearest_first_without_mutating_input() {
        let points = vec![OSAKA, TOKYO, Coordinate::new(35.0, 139.0)];
        let before = points.clone();
        let ranked = sort_by_distance(&points, TOKYO);

        assert_eq!(points, before);
        assert_eq!(ranked.len(), points.len());
        assert_eq!(*ranked[0].item, TOKYO);
        assert_eq!(*ranked[2].item, OSAKA);
        assert!(ranked
            .windows(2)
            .all(|w| w[0].distance_km <= w[1].distance_km));
    }

    #[test]
    fn sort_by_distance_keeps_ties_in_original_order() {
        // Due north and due south of the equator origin are equidistant.
        let north = Coordinate::new(1.0, 0.0);
        let south = Coordinate::new(-1.0, 0.0);
        let far = Coordinate::new(5.0, 0.0);
        let origin = Coordinate::new(0.0, 0.0);

        let items = [far, north, south];
        let ranked = sort_by_distance(&items, origin);
        assert_eq!(*ranked[0].item, north);
        assert_eq!(*ranked[1].item, south);

        let items = [south, far, north];
        let ranked = sort_by_distance(&items, origin);
        assert_eq!(*ranked[0].item, south);
        assert_eq!(*ranked[1].item, north);
    }

    #[test]
    fn sort_by_distance_of_empty_slice_is_empty() {
        let empty: [Coordinate; 0] = [];
        assert!(sort_by_distance(&empty, TOKYO).is_empty());
    }
}
