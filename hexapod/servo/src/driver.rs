use std::sync::{Arc, Mutex};

use crate::errors::ServoError;
use crate::maestro::MaestroDriver;
use crate::stub::StubDriver;

/// Result type for driver operations
type DriverResult = Result<(), ServoError>;

pub trait ServoDriver: Send {
    fn kind(&self) -> &'static str;
    fn channel_count(&self) -> usize;
    /// Moves `channel` to a joint angle in radians, 0 being the servo centre.
    fn move_servo(&mut self, channel: u8, rads: f32) -> DriverResult;
    fn enable(&mut self, enabled: bool) -> DriverResult;
    fn is_enabled(&self) -> bool;

    fn check_channel(&self, channel: u8) -> DriverResult {
        if (channel as usize) < self.channel_count() {
            Ok(())
        } else {
            Err(ServoError::InvalidChannel {
                channel,
                count: self.channel_count(),
            })
        }
    }
}

pub enum DriverType {
    Maestro(MaestroDriver),
    Stub(StubDriver),
}

/// Driver handle shared between the control loop and the command handler.
pub type SharedDriver = Arc<Mutex<DriverType>>;

impl DriverType {
    pub fn into_shared(self) -> SharedDriver {
        Arc::new(Mutex::new(self))
    }

    pub fn as_stub(&self) -> Option<&StubDriver> {
        match self {
            DriverType::Stub(s) => Some(s),
            _ => None,
        }
    }
}

impl ServoDriver for DriverType {
    fn kind(&self) -> &'static str {
        match self {
            DriverType::Maestro(d) => d.kind(),
            DriverType::Stub(d) => d.kind(),
        }
    }

    fn channel_count(&self) -> usize {
        match self {
            DriverType::Maestro(d) => d.channel_count(),
            DriverType::Stub(d) => d.channel_count(),
        }
    }

    fn move_servo(&mut self, channel: u8, rads: f32) -> DriverResult {
        match self {
            DriverType::Maestro(d) => d.move_servo(channel, rads),
            DriverType::Stub(d) => d.move_servo(channel, rads),
        }
    }

    fn enable(&mut self, enabled: bool) -> DriverResult {
        match self {
            DriverType::Maestro(d) => d.enable(enabled),
            DriverType::Stub(d) => d.enable(enabled),
        }
    }

    fn is_enabled(&self) -> bool {
        match self {
            DriverType::Maestro(d) => d.is_enabled(),
            DriverType::Stub(d) => d.is_enabled(),
        }
    }
}

impl std::fmt::Debug for DriverType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverType")
            .field("kind", &self.kind())
            .field("channels", &self.channel_count())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
