// Defines error types for the servo crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServoError {
    #[error("Invalid servo channel {channel} (driver has {count} channels)")]
    InvalidChannel { channel: u8, count: usize },

    #[error("Calibration table has {got} entries, driver needs {expected}")]
    CalibrationMismatch { expected: usize, got: usize },

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
