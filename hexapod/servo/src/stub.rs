use tracing::trace;

use crate::calibration::Calibration;
use crate::driver::ServoDriver;
use crate::errors::ServoError;

/// In-memory driver used for simulation and tests. Every write is checked
/// and converted exactly like the hardware driver would, then kept.
#[derive(Debug, Clone)]
pub struct StubDriver {
    calibration: Calibration,
    angles: Vec<Option<f32>>,
    history: Vec<(u8, f32)>,
    enabled: bool,
}

impl StubDriver {
    pub fn new(channel_count: usize) -> Self {
        Self::with_calibration(Calibration::uniform(channel_count))
    }

    pub fn with_calibration(calibration: Calibration) -> Self {
        let count = calibration.len();
        Self {
            calibration,
            angles: vec![None; count],
            history: Vec::new(),
            enabled: false,
        }
    }

    /// Last joint angle written to `channel`, in radians.
    pub fn angle(&self, channel: u8) -> Option<f32> {
        self.angles.get(channel as usize).copied().flatten()
    }

    /// Every `(channel, radians)` write in order.
    pub fn history(&self) -> &[(u8, f32)] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

impl ServoDriver for StubDriver {
    fn kind(&self) -> &'static str {
        "stub"
    }

    fn channel_count(&self) -> usize {
        self.angles.len()
    }

    fn move_servo(&mut self, channel: u8, rads: f32) -> Result<(), ServoError> {
        self.check_channel(channel)?;
        let degrees = self.calibration.servo_degrees(channel, rads)?;
        trace!("stub servo {} -> {:.3} rad ({:.1}°)", channel, rads, degrees);
        self.angles[channel as usize] = Some(rads);
        self.history.push((channel, rads));
        Ok(())
    }

    fn enable(&mut self, enabled: bool) -> Result<(), ServoError> {
        self.enabled = enabled;
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_writes_in_order() {
        let mut stub = StubDriver::new(4);
        stub.move_servo(2, 0.25).unwrap();
        stub.move_servo(0, -0.5).unwrap();
        assert_eq!(stub.history(), &[(2, 0.25), (0, -0.5)]);
        assert_eq!(stub.angle(2), Some(0.25));
        assert_eq!(stub.angle(1), None);
    }

    #[test]
    fn test_rejects_out_of_range_channel() {
        let mut stub = StubDriver::new(4);
        assert!(stub.move_servo(4, 0.0).is_err());
        assert!(stub.history().is_empty());
    }

    #[test]
    fn test_enable_toggles() {
        let mut stub = StubDriver::new(1);
        assert!(!stub.is_enabled());
        stub.enable(true).unwrap();
        assert!(stub.is_enabled());
    }
}
