//! Per-channel calibration and angle conversion.
//!
//! The walker thinks in joint radians where 0 is the servo centre. Real servos
//! are mounted mirrored on some joints and never sit exactly at their nominal
//! centre, so every channel carries a direction and a trim in degrees.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, TAU};

use crate::errors::ServoError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelCalibration {
    pub reversed: bool,
    pub trim_degrees: f32,
}

impl Default for ChannelCalibration {
    fn default() -> Self {
        ChannelCalibration {
            reversed: false,
            trim_degrees: 0.0,
        }
    }
}

/// Pulse width limits of a hobby servo, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseRange {
    pub min_us: f32,
    pub max_us: f32,
}

impl Default for PulseRange {
    fn default() -> Self {
        PulseRange {
            min_us: 544.0,
            max_us: 2400.0,
        }
    }
}

impl PulseRange {
    /// Linear map of 0..180 servo degrees onto the pulse range.
    pub fn pulse_us(&self, degrees: f32) -> f32 {
        let degrees = degrees.clamp(0.0, 180.0);
        self.min_us + (degrees / 180.0) * (self.max_us - self.min_us)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub channels: Vec<ChannelCalibration>,
}

lazy_static! {
    // ankle, knee, hip for each leg: front left, middle left, back left,
    // back right, middle right, front right.
    pub static ref HEXAPOD_CALIBRATION: Calibration = {
        let mut channels = Vec::with_capacity(18);
        for leg in 0..6 {
            let front = leg == 0 || leg == 5;
            channels.push(ChannelCalibration {
                reversed: true,
                trim_degrees: if front { 10.0 } else { 0.0 },
            });
            channels.push(ChannelCalibration {
                reversed: false,
                trim_degrees: if front { 20.0 } else { 0.0 },
            });
            channels.push(ChannelCalibration::default());
        }
        Calibration { channels }
    };
}

impl Calibration {
    pub fn uniform(count: usize) -> Self {
        Calibration {
            channels: vec![ChannelCalibration::default(); count],
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Converts a joint angle in radians (0 = centre) into servo degrees
    /// (90 = centre), applying direction and trim.
    pub fn servo_degrees(&self, channel: u8, rads: f32) -> Result<f32, ServoError> {
        let cal = self
            .channels
            .get(channel as usize)
            .ok_or(ServoError::InvalidChannel {
                channel,
                count: self.channels.len(),
            })?;

        let sign = if cal.reversed { -1.0 } else { 1.0 };
        let rads = (rads * sign + FRAC_PI_2).rem_euclid(TAU);
        Ok(rads.to_degrees() + cal.trim_degrees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_centre_maps_to_ninety_degrees() {
        let cal = Calibration::uniform(3);
        assert_abs_diff_eq!(cal.servo_degrees(1, 0.0).unwrap(), 90.0, epsilon = 1e-4);
    }

    #[test]
    fn test_reversed_channel_mirrors_angle() {
        let cal = HEXAPOD_CALIBRATION.clone();
        // Channel 3 is the middle-left ankle: reversed, no trim.
        let up = cal.servo_degrees(3, 0.5).unwrap();
        let down = cal.servo_degrees(3, -0.5).unwrap();
        assert_abs_diff_eq!(up + down, 180.0, epsilon = 1e-3);
        assert!(up < 90.0);
    }

    #[test]
    fn test_front_legs_are_trimmed() {
        let cal = HEXAPOD_CALIBRATION.clone();
        assert_abs_diff_eq!(cal.servo_degrees(1, 0.0).unwrap(), 110.0, epsilon = 1e-4);
        assert_abs_diff_eq!(cal.servo_degrees(16, 0.0).unwrap(), 110.0, epsilon = 1e-4);
        assert_abs_diff_eq!(cal.servo_degrees(4, 0.0).unwrap(), 90.0, epsilon = 1e-4);
    }

    #[test]
    fn test_unknown_channel_is_rejected() {
        let cal = Calibration::uniform(2);
        assert!(matches!(
            cal.servo_degrees(5, 0.0),
            Err(ServoError::InvalidChannel { channel: 5, count: 2 })
        ));
    }

    #[test]
    fn test_pulse_range_is_clamped() {
        let range = PulseRange::default();
        assert_abs_diff_eq!(range.pulse_us(-10.0), 544.0);
        assert_abs_diff_eq!(range.pulse_us(180.0), 2400.0);
        assert_abs_diff_eq!(range.pulse_us(90.0), 1472.0);
    }
}
