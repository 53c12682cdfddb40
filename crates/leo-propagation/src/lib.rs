//! SGP4 propagation and coordinate transforms.
//!
//! Produces geocentric Cartesian tracks for constellation satellites and
//! slant ranges between satellites and between a satellite and a ground
//! station. All positions are in the inertial (ECI) frame; the WGS84
//! gravity model is used in "improved" mode.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PropagationError {
    #[error("SGP4 initialization failed for satellite {satnum}: {source}")]
    Init {
        satnum: u64,
        #[source]
        source: sgp4::Error,
    },
    #[error("SGP4 propagation failed for satellite {satnum} at t={minutes_since_epoch} min: {source}")]
    Propagate {
        satnum: u64,
        minutes_since_epoch: f64,
        #[source]
        source: sgp4::Error,
    },
}

pub type Result<T> = std::result::Result<T, PropagationError>;

/// Default drag / ballistic terms used by the constellation builder, matching
/// the reference simulator's fixed choices for circular LEO orbits.
pub const DEFAULT_BSTAR: f64 = 2.8098e-05;
pub const DEFAULT_NDOT: f64 = 6.969196665e-13;
pub const DEFAULT_NDDOT: f64 = 0.0;
pub const DEFAULT_ECCENTRICITY: f64 = 0.001;
pub const DEFAULT_ARG_OF_PERIGEE_DEG: f64 = 0.0;

/// Raw orbital elements for one satellite, in the units SGP4 wants.
#[derive(Debug, Clone, Copy)]
pub struct OrbitalElements {
    /// Satellite number used purely for SGP4 bookkeeping / error messages.
    pub satnum: u64,
    /// Epoch, as a naive UTC datetime.
    pub epoch: NaiveDateTime,
    pub eccentricity: f64,
    pub argument_of_perigee_deg: f64,
    pub inclination_deg: f64,
    pub mean_anomaly_deg: f64,
    /// Mean motion in revolutions/day (Kozai convention), matching the
    /// `sgp4` crate's `Elements::mean_motion` units.
    pub mean_motion_rev_day: f64,
    pub right_ascension_deg: f64,
}

impl OrbitalElements {
    fn to_sgp4_elements(self) -> sgp4::Elements {
        sgp4::Elements {
            object_name: None,
            international_designator: None,
            norad_id: self.satnum,
            classification: sgp4::Classification::Unclassified,
            datetime: self.epoch,
            mean_motion_dot: DEFAULT_NDOT,
            mean_motion_ddot: DEFAULT_NDDOT,
            drag_term: DEFAULT_BSTAR,
            element_set_number: 1,
            inclination: self.inclination_deg,
            right_ascension: self.right_ascension_deg,
            eccentricity: self.eccentricity,
            argument_of_perigee: self.argument_of_perigee_deg,
            mean_anomaly: self.mean_anomaly_deg,
            mean_motion: self.mean_motion_rev_day,
            revolution_number: 1,
            ephemeris_type: 0,
        }
    }
}

/// Geocentric inertial position, metres.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EciPosition {
    pub x_m: f64,
    pub y_m: f64,
    pub z_m: f64,
}

impl EciPosition {
    pub fn range_km(&self, other: &EciPosition) -> f64 {
        let dx = (self.x_m - other.x_m) / 1000.0;
        let dy = (self.y_m - other.y_m) / 1000.0;
        let dz = (self.z_m - other.z_m) / 1000.0;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// One sample of a satellite track: minute offset plus position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackPoint {
    pub t_seconds: i64,
    pub position: EciPosition,
}

/// A satellite's precomputed trajectory over the simulation window, plus the
/// compiled SGP4 constants needed to evaluate it at arbitrary epochs.
pub struct Propagator {
    satnum: u64,
    constants: sgp4::Constants,
}

impl Propagator {
    pub fn new(elements: OrbitalElements) -> Result<Self> {
        let satnum = elements.satnum;
        let sgp4_elements = elements.to_sgp4_elements();
        let constants =
            sgp4::Constants::from_elements(&sgp4_elements).map_err(|source| PropagationError::Init {
                satnum,
                source,
            })?;
        Ok(Self { satnum, constants })
    }

    /// Position at `minutes_since_epoch`, in metres.
    pub fn position_at(&self, minutes_since_epoch: f64) -> Result<EciPosition> {
        let prediction = self
            .constants
            .propagate(minutes_since_epoch)
            .map_err(|source| PropagationError::Propagate {
                satnum: self.satnum,
                minutes_since_epoch,
                source,
            })?;
        Ok(EciPosition {
            x_m: prediction.position[0] * 1000.0,
            y_m: prediction.position[1] * 1000.0,
            z_m: prediction.position[2] * 1000.0,
        })
    }

    /// Track sampled at one-minute resolution for `minute_offsets`.
    pub fn track(&self, minute_offsets: &[i64]) -> Result<Vec<TrackPoint>> {
        minute_offsets
            .iter()
            .map(|&t| {
                let position = self.position_at(t as f64)?;
                Ok(TrackPoint {
                    t_seconds: t * 60,
                    position,
                })
            })
            .collect()
    }
}

/// Earth radius and flattening, WGS84.
const WGS84_A_M: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const SECONDS_PER_SIDEREAL_DAY: f64 = 86_164.090_54;

/// Lifts a geodetic ground-station position (altitude 0) into the ECI frame
/// at the given epoch, for use with [`EciPosition::range_km`].
///
/// This rotates the WGS84 ECEF position by the Greenwich sidereal angle at
/// `epoch`, which is equivalent to a topocentric range computation up to the
/// (negligible, for this simulator's minute resolution) difference between
/// mean and apparent sidereal time.
pub fn gt_eci_position(lat_deg: f64, lon_deg: f64, epoch: NaiveDateTime) -> EciPosition {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();

    let sin_lat = lat.sin();
    let n = WGS84_A_M / (1.0 - WGS84_F * (2.0 - WGS84_F) * sin_lat * sin_lat).sqrt();

    let x_ecef = n * lat.cos() * lon.cos();
    let y_ecef = n * lat.cos() * lon.sin();
    let z_ecef = n * (1.0 - WGS84_F).powi(2) * sin_lat;

    let theta = gmst_radians(epoch);
    EciPosition {
        x_m: x_ecef * theta.cos() - y_ecef * theta.sin(),
        y_m: x_ecef * theta.sin() + y_ecef * theta.cos(),
        z_m: z_ecef,
    }
}

/// Greenwich mean sidereal time, in radians, for a naive-UTC datetime.
/// Reference epoch is 1949-12-31 00:00 UT (the SGP4 epoch origin used
/// throughout this simulator), so the angle is purely a function of elapsed
/// seconds modulo one sidereal day.
fn gmst_radians(epoch: NaiveDateTime) -> f64 {
    let reference = NaiveDateTime::parse_from_str("1949-12-31 00:00:00", "%Y-%m-%d %H:%M:%S")
        .expect("valid reference datetime");
    let elapsed_seconds = (epoch - reference).num_seconds() as f64
        + epoch.nanosecond() as f64 / 1_000_000_000.0;
    let fraction = (elapsed_seconds / SECONDS_PER_SIDEREAL_DAY).fract();
    fraction * 2.0 * std::f64::consts::PI
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn epoch_days_since_1949(dt: NaiveDateTime) -> f64 {
        let reference = NaiveDate::from_ymd_opt(1949, 12, 31)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (dt - reference).num_seconds() as f64 / 86_400.0
    }

    fn sample_elements(satnum: u64, raan_deg: f64, mean_anomaly_deg: f64) -> OrbitalElements {
        let epoch = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let _ = epoch_days_since_1949(epoch);
        OrbitalElements {
            satnum,
            epoch,
            eccentricity: DEFAULT_ECCENTRICITY,
            argument_of_perigee_deg: DEFAULT_ARG_OF_PERIGEE_DEG,
            inclination_deg: 53.0,
            mean_anomaly_deg,
            mean_motion_rev_day: 15.15, // ~550km altitude
            right_ascension_deg: raan_deg,
        }
    }

    #[test]
    fn propagates_to_leo_altitude_radius() {
        let propagator = Propagator::new(sample_elements(1, 0.0, 0.0)).unwrap();
        let pos = propagator.position_at(0.0).unwrap();
        let r_km = (pos.x_m.powi(2) + pos.y_m.powi(2) + pos.z_m.powi(2)).sqrt() / 1000.0;
        // 550km altitude -> geocentric radius ~6928km
        assert!(r_km > 6800.0 && r_km < 7100.0, "unexpected radius {r_km}");
    }

    #[test]
    fn track_samples_expected_minute_offsets() {
        let propagator = Propagator::new(sample_elements(2, 0.0, 0.0)).unwrap();
        let track = propagator.track(&[0, 1, 2]).unwrap();
        assert_eq!(track.len(), 3);
        assert_eq!(track[1].t_seconds, 60);
        assert_eq!(track[2].t_seconds, 120);
    }

    #[test]
    fn range_km_is_symmetric_and_positive_between_distinct_points() {
        let a = EciPosition { x_m: 0.0, y_m: 0.0, z_m: 7_000_000.0 };
        let b = EciPosition { x_m: 1_000_000.0, y_m: 0.0, z_m: 7_000_000.0 };
        assert_eq!(a.range_km(&b), b.range_km(&a));
        assert!(a.range_km(&b) > 0.0);
    }

    #[test]
    fn gt_eci_position_sits_near_earth_surface() {
        let epoch = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let pos = gt_eci_position(0.0, 0.0, epoch);
        let r_km = (pos.x_m.powi(2) + pos.y_m.powi(2) + pos.z_m.powi(2)).sqrt() / 1000.0;
        assert!(r_km > 6300.0 && r_km < 6450.0, "unexpected radius {r_km}");
    }
}
