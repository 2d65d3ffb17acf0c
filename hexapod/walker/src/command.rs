//! Text commands from the operator.
//!
//! A command is a single code letter followed by its numbers, e.g. `X50`,
//! `X -50`, `A3 90` or `A3-20`.

use num_traits::FromPrimitive;
use servo::{ServoDriver, SharedDriver};
use std::sync::{Arc, PoisonError};
use tracing::{debug, info, warn};

use crate::config::RobotConfig;
use crate::errors::CommandError;
use crate::gait::GaitKind;
use crate::intent::{Posture, RobotIntent};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SelectGait(GaitKind),
    Trigger(Posture),
    TargetX(f32),
    TargetY(f32),
    StridePercent(f32),
    Rotate(f32),
    /// Nonzero turns on the spot with a tripod gait, zero walks straight.
    TripodRotate(f32),
    HeightStep(i32),
    StrideStep(i32),
    HeightPercent(f32),
    /// Raw channel write in servo degrees, 90 being centre.
    RawServo { channel: u8, degrees: f32 },
    SecondsPerStride(f32),
    VelocityMode(bool),
    Enable(bool),
}

/// Reads numbers left to right. Each is an optional sign, digits and an
/// optional fraction, so `A3-20` is channel 3 and -20 degrees. Whitespace and
/// commas between numbers are skipped.
fn numbers(code: char, rest: &str) -> Result<Vec<f32>, CommandError> {
    let bytes = rest.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut values = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() || bytes[i] == b',' {
            i += 1;
            continue;
        }

        let start = i;
        if matches!(bytes[i], b'+' | b'-') {
            i += 1;
        }
        let integral = i;
        i = digits_from(i);
        let mut has_digits = i > integral;
        if i < bytes.len() && bytes[i] == b'.' {
            let fraction = i + 1;
            i = digits_from(fraction);
            has_digits |= i > fraction;
        }

        let invalid = || CommandError::InvalidNumber {
            code,
            text: rest[start..].trim_end().to_string(),
        };
        if !has_digits {
            return Err(invalid());
        }
        values.push(rest[start..i].parse::<f32>().map_err(|_| invalid())?);
    }
    Ok(values)
}

fn exactly<const N: usize>(code: char, values: &[f32]) -> Result<[f32; N], CommandError> {
    values
        .try_into()
        .map_err(|_| CommandError::ParameterCount {
            code,
            expected: N,
            got: values.len(),
        })
}

fn integer(code: char, value: f32) -> Result<i32, CommandError> {
    if value.fract() == 0.0 && value.abs() <= i32::MAX as f32 {
        Ok(value as i32)
    } else {
        Err(CommandError::InvalidNumber {
            code,
            text: value.to_string(),
        })
    }
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let line = line.trim();
        let mut chars = line.chars();
        let code = chars.next().ok_or(CommandError::Empty)?.to_ascii_uppercase();
        let values = numbers(code, chars.as_str())?;

        let command = match code {
            'G' => {
                let [n] = exactly::<1>(code, &values)?;
                match integer(code, n)? {
                    6 => Command::Trigger(Posture::SafeHome),
                    7 => Command::Trigger(Posture::Idle),
                    8 => Command::Trigger(Posture::StandUp),
                    n => Command::SelectGait(
                        GaitKind::from_i32(n).ok_or(CommandError::UnknownGait(n))?,
                    ),
                }
            }
            'X' => Command::TargetX(exactly::<1>(code, &values)?[0]),
            'Y' => Command::TargetY(exactly::<1>(code, &values)?[0]),
            'S' => Command::StridePercent(exactly::<1>(code, &values)?[0]),
            'R' => Command::Rotate(exactly::<1>(code, &values)?[0]),
            'T' => Command::TripodRotate(exactly::<1>(code, &values)?[0]),
            'U' => Command::HeightStep(integer(code, exactly::<1>(code, &values)?[0])?),
            'L' => Command::StrideStep(integer(code, exactly::<1>(code, &values)?[0])?),
            'H' => Command::HeightPercent(exactly::<1>(code, &values)?[0]),
            'A' => {
                let [channel, degrees] = exactly::<2>(code, &values)?;
                let channel = integer(code, channel)?;
                let channel = u8::try_from(channel).map_err(|_| CommandError::InvalidValue {
                    code,
                    reason: format!("channel {} out of range", channel),
                })?;
                Command::RawServo { channel, degrees }
            }
            'B' => Command::SecondsPerStride(exactly::<1>(code, &values)?[0]),
            'C' => Command::VelocityMode(integer(code, exactly::<1>(code, &values)?[0])? == 0),
            'E' => Command::Enable(integer(code, exactly::<1>(code, &values)?[0])? != 0),
            other => return Err(CommandError::UnknownCode(other)),
        };
        Ok(command)
    }
}

/// Applies commands to the shared intent. Cheap to clone; one per transport.
#[derive(Clone)]
pub struct CommandHandler {
    intent: Arc<RobotIntent>,
    driver: SharedDriver,
    config: Arc<RobotConfig>,
}

impl CommandHandler {
    pub fn new(intent: Arc<RobotIntent>, driver: SharedDriver, config: Arc<RobotConfig>) -> Self {
        CommandHandler {
            intent,
            driver,
            config,
        }
    }

    pub fn intent(&self) -> &Arc<RobotIntent> {
        &self.intent
    }

    /// Parses and applies one line. Bad commands are logged and dropped.
    /// Returns false once the robot is shutting down.
    pub fn handle(&self, line: &str) -> bool {
        if !line.trim().is_empty() {
            match Command::try_from(line) {
                Ok(command) => {
                    if let Err(e) = self.apply(command) {
                        warn!("Command {:?} failed: {}", line.trim(), e);
                    }
                }
                Err(e) => warn!("Ignoring command {:?}: {}", line.trim(), e),
            }
        }
        !self.intent.is_aborted()
    }

    pub fn apply(&self, command: Command) -> Result<(), CommandError> {
        debug!("Applying {:?}", command);
        let intent = &self.intent;
        let stride = &self.config.stride;
        let height = &self.config.height;

        match command {
            Command::SelectGait(kind) => {
                info!("Selected gait {:?}", kind);
                intent.set_gait(kind);
            }
            Command::Trigger(posture) => {
                info!("Requested {:?}", posture);
                intent.request(posture);
            }
            Command::TargetX(x) => intent.set_x(x),
            Command::TargetY(y) => intent.set_y(y),
            Command::Rotate(r) => intent.set_rotate(r),
            Command::StridePercent(percent) => {
                let share = percent.clamp(0.0, 100.0) / 100.0;
                let length = stride.clamp(stride.max * share);
                intent.set_stride(length);
                intent.set_turn_angle(
                    (stride.max_turn_degrees * share)
                        .clamp(stride.min_turn_degrees, stride.max_turn_degrees),
                );
            }
            Command::TripodRotate(r) => {
                if r != 0.0 {
                    intent.set_rotate(r);
                    intent.set_gait(GaitKind::TripodRotate);
                } else {
                    intent.set_x(0.0);
                    intent.set_y(0.0);
                    intent.set_rotate(0.0);
                    intent.set_gait(GaitKind::Tripod);
                }
            }
            Command::HeightStep(n) => {
                let target = match n.signum() {
                    1 => height.clamp(intent.height() + height.step),
                    -1 => height.clamp(intent.height() - height.step),
                    _ => height.neutral,
                };
                intent.set_height(target);
            }
            Command::StrideStep(n) => {
                let length = match n.signum() {
                    1 => stride.clamp(intent.stride() + stride.step),
                    -1 => stride.clamp(intent.stride() - stride.step),
                    _ => stride.optimal,
                };
                intent.set_stride(length);
                intent.set_turn_angle(stride.turn_for_stride(length));
            }
            Command::HeightPercent(percent) => intent.set_height(height.from_percent(percent)),
            Command::RawServo { channel, degrees } => {
                let rads = degrees.to_radians() - std::f32::consts::FRAC_PI_2;
                self.driver
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .move_servo(channel, rads)?;
            }
            Command::SecondsPerStride(seconds) => {
                if !(seconds > 0.0) {
                    return Err(CommandError::InvalidValue {
                        code: 'B',
                        reason: "seconds per stride must be positive".to_string(),
                    });
                }
                intent.set_seconds_per_stride(seconds);
            }
            Command::VelocityMode(velocity) => {
                info!("{} input mode", if velocity { "Velocity" } else { "Stride" });
                intent.set_velocity_mode(velocity);
            }
            Command::Enable(enabled) => {
                self.driver
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .enable(enabled)?;
            }
        }
        Ok(())
    }
}
