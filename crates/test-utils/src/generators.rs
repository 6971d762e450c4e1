//! Synthetic swath generators for creating predictable observation data.
//!
//! Each generator returns plain `(lat, lon, values)` tuples so the data
//! can feed any observation-source implementation without depending on
//! engine types.

/// One synthetic observation: latitude, longitude, per-band values.
pub type SwathPoint = (f64, f64, Vec<f32>);

/// Creates a swath of observations along the equator.
///
/// Observation `i` sits at longitude `-170 + i * step` on the equator,
/// and band `b` carries the value `b * 1000 + i`, so every value
/// identifies its origin.
///
/// # Example
///
/// ```
/// use test_utils::equator_swath;
///
/// let swath = equator_swath(5, 2, 1.0);
/// assert_eq!(swath.len(), 5);
/// assert_eq!(swath[3].1, -167.0);       // lon of observation 3
/// assert_eq!(swath[3].2, vec![3.0, 1003.0]);
/// ```
pub fn equator_swath(count: usize, bands: usize, step: f64) -> Vec<SwathPoint> {
    (0..count)
        .map(|i| {
            let values = (0..bands).map(|b| (b * 1000 + i) as f32).collect();
            (0.0, -170.0 + i as f64 * step, values)
        })
        .collect()
}

/// Creates a swath scattered over the globe on a deterministic walk.
///
/// Positions follow a golden-angle spiral so consecutive observations
/// land in different latitude bands without any randomness. Band `b` of
/// observation `i` carries `b * 1000 + i`.
pub fn global_swath(count: usize, bands: usize) -> Vec<SwathPoint> {
    // Golden angle in degrees; irrational enough that longitudes never
    // repeat over realistic swath sizes.
    const GOLDEN_ANGLE: f64 = 137.50776405003785;

    (0..count)
        .map(|i| {
            let t = (i as f64 + 0.5) / count as f64;
            let lat = (1.0 - 2.0 * t).asin().to_degrees();
            let lon = ((i as f64 * GOLDEN_ANGLE + 180.0) % 360.0) - 180.0;
            let values = (0..bands).map(|b| (b * 1000 + i) as f32).collect();
            (lat, lon, values)
        })
        .collect()
}

/// Creates a swath confined to one small region.
///
/// All observations fall inside the given bounds, spread on a regular
/// diagonal, each carrying the single-band value `i`.
pub fn regional_swath(
    count: usize,
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
) -> Vec<SwathPoint> {
    (0..count)
        .map(|i| {
            let t = (i as f64 + 0.5) / count as f64;
            let lat = min_lat + t * (max_lat - min_lat);
            let lon = min_lon + t * (max_lon - min_lon);
            (lat, lon, vec![i as f32])
        })
        .collect()
}
