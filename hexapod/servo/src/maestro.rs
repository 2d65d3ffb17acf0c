//! Serial servo controller speaking the Maestro compact protocol.
//!
//! Targets are sent in quarter-microseconds. A target of zero stops the pulse
//! train on that channel, which is how the servos are released.

use serialport::SerialPort;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::calibration::{Calibration, PulseRange};
use crate::driver::ServoDriver;
use crate::errors::ServoError;

const SET_TARGET: u8 = 0x84;
const TIMEOUT: Duration = Duration::from_millis(100);

pub struct MaestroDriver {
    port: Box<dyn SerialPort>,
    port_name: String,
    calibration: Calibration,
    pulse_range: PulseRange,
    targets: Vec<Option<u16>>,
    enabled: bool,
}

impl MaestroDriver {
    pub fn new(
        port_name: &str,
        baud_rate: u32,
        calibration: Calibration,
        pulse_range: PulseRange,
    ) -> Result<Self, ServoError> {
        if calibration.is_empty() {
            return Err(ServoError::CalibrationMismatch {
                expected: 1,
                got: 0,
            });
        }

        let port = serialport::new(port_name, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .flow_control(serialport::FlowControl::None)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(TIMEOUT)
            .open()?;
        info!("Servo controller opened on {} at {} baud", port_name, baud_rate);

        let count = calibration.len();
        Ok(Self {
            port,
            port_name: port_name.to_string(),
            calibration,
            pulse_range,
            targets: vec![None; count],
            enabled: false,
        })
    }

    pub fn port(&self) -> &str {
        &self.port_name
    }

    fn write_target(&mut self, channel: u8, quarter_us: u16) -> Result<(), ServoError> {
        let packet = target_packet(channel, quarter_us);
        self.port.write_all(&packet)?;
        Ok(())
    }
}

fn target_packet(channel: u8, quarter_us: u16) -> [u8; 4] {
    [
        SET_TARGET,
        channel,
        (quarter_us & 0x7F) as u8,
        ((quarter_us >> 7) & 0x7F) as u8,
    ]
}

impl ServoDriver for MaestroDriver {
    fn kind(&self) -> &'static str {
        "maestro"
    }

    fn channel_count(&self) -> usize {
        self.targets.len()
    }

    fn move_servo(&mut self, channel: u8, rads: f32) -> Result<(), ServoError> {
        self.check_channel(channel)?;
        let degrees = self.calibration.servo_degrees(channel, rads)?;
        let quarter_us = (self.pulse_range.pulse_us(degrees) * 4.0).round() as u16;
        self.targets[channel as usize] = Some(quarter_us);

        // Released servos keep their target until re-enabled.
        if self.enabled {
            self.write_target(channel, quarter_us)?;
        }
        Ok(())
    }

    fn enable(&mut self, enabled: bool) -> Result<(), ServoError> {
        debug!("{} servos on {}", if enabled { "Enabling" } else { "Releasing" }, self.port_name);
        self.enabled = enabled;

        for channel in 0..self.targets.len() {
            let target = if enabled { self.targets[channel] } else { Some(0) };
            if let Some(quarter_us) = target {
                if let Err(e) = self.write_target(channel as u8, quarter_us) {
                    error!("Failed to update servo {} on {}: {}", channel, self.port_name, e);
                    return Err(e);
                }
            }
        }
        self.port.flush()?;
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
