mod calibration;
mod driver;
mod errors;
mod maestro;
mod stub;

pub use calibration::{Calibration, ChannelCalibration, PulseRange, HEXAPOD_CALIBRATION};
pub use driver::{DriverType, ServoDriver, SharedDriver};
pub use errors::ServoError;
pub use maestro::MaestroDriver;
pub use stub::StubDriver;

pub const HEXAPOD_CHANNELS: usize = 18;
