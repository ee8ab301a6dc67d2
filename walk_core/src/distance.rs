//! GPS distance accumulation.
//!
//! Only the most recent accepted fix is retained. Movement shorter than the
//! configured minimum is treated as jitter: it is not accumulated and the
//! anchor fix is kept, so slow walking still registers once the user has
//! moved far enough from the anchor.

use crate::config::DistanceConfig;
use crate::GeoFix;

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two coordinates, in kilometres
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Great-circle distance between two fixes, in kilometres
pub fn fix_distance_km(from: &GeoFix, to: &GeoFix) -> f64 {
    haversine_km(from.latitude, from.longitude, to.latitude, to.longitude)
}

#[derive(Clone, Debug)]
pub struct DistanceAccumulator {
    config: DistanceConfig,
    anchor: Option<GeoFix>,
    cumulative_km: f64,
    accepted_fixes: u64,
    rejected_fixes: u64,
}

impl DistanceAccumulator {
    pub fn new(config: DistanceConfig) -> Self {
        Self {
            config,
            anchor: None,
            cumulative_km: 0.0,
            accepted_fixes: 0,
            rejected_fixes: 0,
        }
    }

    /// Process one fix and return the distance it added, in kilometres
    pub fn on_fix(&mut self, fix: &GeoFix) -> f64 {
        if !fix.is_well_formed() {
            tracing::warn!(
                "Dropping malformed fix ({}, {})",
                fix.latitude,
                fix.longitude
            );
            self.rejected_fixes += 1;
            return 0.0;
        }

        if let (Some(limit), Some(accuracy)) = (self.config.max_accuracy_m, fix.accuracy_m) {
            if accuracy > limit {
                tracing::debug!("Dropping fix with accuracy {:.0}m (limit {:.0}m)", accuracy, limit);
                self.rejected_fixes += 1;
                return 0.0;
            }
        }

        self.accepted_fixes += 1;

        let increment_km = match self.anchor.as_ref() {
            Some(anchor) => fix_distance_km(anchor, fix),
            None => {
                tracing::debug!("First fix retained as anchor");
                self.anchor = Some(fix.clone());
                return 0.0;
            }
        };

        if increment_km * 1000.0 < self.config.min_movement_m {
            tracing::trace!("Ignoring {:.1}m of jitter", increment_km * 1000.0);
            return 0.0;
        }

        self.anchor = Some(fix.clone());
        self.cumulative_km += increment_km;
        tracing::debug!(
            "Moved {:.1}m, session total {:.3}km",
            increment_km * 1000.0,
            self.cumulative_km
        );
        increment_km
    }

    pub fn cumulative_km(&self) -> f64 {
        self.cumulative_km
    }

    pub fn anchor(&self) -> Option<&GeoFix> {
        self.anchor.as_ref()
    }

    pub fn accepted_fixes(&self) -> u64 {
        self.accepted_fixes
    }

    pub fn rejected_fixes(&self) -> u64 {
        self.rejected_fixes
    }

    pub fn reset(&mut self) {
        self.anchor = None;
        self.cumulative_km = 0.0;
        self.accepted_fixes = 0;
        self.rejected_fixes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Degrees of latitude per metre along a meridian
    const DEG_PER_M: f64 = 1.0 / 111_194.93;

    fn fix_north_of(origin_lat: f64, metres: f64, t: u64) -> GeoFix {
        GeoFix::new(origin_lat + metres * DEG_PER_M, 16.0, t)
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude on the mean sphere
        let km = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert!((km - 111.19).abs() < 0.01, "got {}", km);
    }

    #[test]
    fn test_haversine_zero() {
        assert_eq!(haversine_km(45.8, 15.9, 45.8, 15.9), 0.0);
    }

    #[test]
    fn test_first_fix_produces_no_increment() {
        let mut acc = DistanceAccumulator::new(DistanceConfig::default());
        assert_eq!(acc.on_fix(&GeoFix::new(45.0, 16.0, 0)), 0.0);
        assert!(acc.anchor().is_some());
        assert_eq!(acc.cumulative_km(), 0.0);
    }

    #[test]
    fn test_jitter_is_discarded() {
        let mut acc = DistanceAccumulator::new(DistanceConfig::default());
        acc.on_fix(&fix_north_of(45.0, 0.0, 0));
        for (i, m) in [3.0, -4.0, 5.0, 2.0].iter().enumerate() {
            assert_eq!(acc.on_fix(&fix_north_of(45.0, *m, (i as u64 + 1) * 1000)), 0.0);
        }
        assert_eq!(acc.cumulative_km(), 0.0);
    }

    #[test]
    fn test_slow_movement_accumulates_from_anchor() {
        let mut acc = DistanceAccumulator::new(DistanceConfig::default());
        acc.on_fix(&fix_north_of(45.0, 0.0, 0));
        // 4m per fix: nothing until the anchor is 12m behind
        assert_eq!(acc.on_fix(&fix_north_of(45.0, 4.0, 1000)), 0.0);
        assert_eq!(acc.on_fix(&fix_north_of(45.0, 8.0, 2000)), 0.0);
        let inc = acc.on_fix(&fix_north_of(45.0, 12.0, 3000));
        assert!((inc * 1000.0 - 12.0).abs() < 0.05, "got {}", inc * 1000.0);
    }

    #[test]
    fn test_oscillation_never_decreases_distance() {
        let mut acc = DistanceAccumulator::new(DistanceConfig::default());
        let mut previous = 0.0;
        for i in 0..20 {
            let metres = if i % 2 == 0 { 0.0 } else { 25.0 };
            acc.on_fix(&fix_north_of(45.0, metres, i * 1000));
            assert!(acc.cumulative_km() >= previous);
            previous = acc.cumulative_km();
        }
        // 19 legs of 25m each
        assert!((acc.cumulative_km() - 0.475).abs() < 0.001);
    }

    #[test]
    fn test_inaccurate_fix_is_dropped() {
        let mut acc = DistanceAccumulator::new(DistanceConfig::default());
        acc.on_fix(&fix_north_of(45.0, 0.0, 0));
        let noisy = fix_north_of(45.0, 500.0, 1000).with_accuracy(250.0);
        assert_eq!(acc.on_fix(&noisy), 0.0);
        assert_eq!(acc.rejected_fixes(), 1);

        let good = fix_north_of(45.0, 50.0, 2000).with_accuracy(8.0);
        assert!(acc.on_fix(&good) > 0.0);
    }

    #[test]
    fn test_malformed_fix_keeps_anchor() {
        let mut acc = DistanceAccumulator::new(DistanceConfig::default());
        acc.on_fix(&GeoFix::new(45.0, 16.0, 0));
        assert_eq!(acc.on_fix(&GeoFix::new(f64::NAN, 16.0, 1000)), 0.0);
        assert_eq!(acc.anchor().map(|a| a.latitude), Some(45.0));
    }

    #[test]
    fn test_reset() {
        let mut acc = DistanceAccumulator::new(DistanceConfig::default());
        acc.on_fix(&fix_north_of(45.0, 0.0, 0));
        acc.on_fix(&fix_north_of(45.0, 100.0, 1000));
        assert!(acc.cumulative_km() > 0.0);
        acc.reset();
        assert_eq!(acc.cumulative_km(), 0.0);
        assert!(acc.anchor().is_none());
    }
}
