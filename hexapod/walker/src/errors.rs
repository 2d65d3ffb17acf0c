// Defines error types for the walker crate.

use servo::ServoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MoveError {
    #[error("Leg {leg} cannot reach ({x:.1}, {y:.1}, {z:.1})")]
    OutOfRange { leg: usize, x: f32, y: f32, z: f32 },

    #[error("Unknown leg {0}")]
    UnknownLeg(usize),

    #[error("Servo error: {0}")]
    Servo(#[from] ServoError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Expected 6 legs, got {0}")]
    LegCount(usize),

    #[error("Leg {leg} uses channel {channel}, driver has {count} channels")]
    InvalidChannel { leg: usize, channel: u8, count: usize },

    #[error("Channel {0} is assigned more than once")]
    DuplicateChannel(u8),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Servo error: {0}")]
    Servo(#[from] ServoError),
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command code '{0}'")]
    UnknownCode(char),

    #[error("Command '{code}' expects {expected} parameter(s), got {got}")]
    ParameterCount {
        code: char,
        expected: usize,
        got: usize,
    },

    #[error("Command '{code}' has a malformed number '{text}'")]
    InvalidNumber { code: char, text: String },

    #[error("Unknown gait selector {0}")]
    UnknownGait(i32),

    #[error("Invalid value for '{code}': {reason}")]
    InvalidValue { code: char, reason: String },

    #[error("Servo error: {0}")]
    Servo(#[from] ServoError),
}
