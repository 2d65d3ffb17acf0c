//! Robot geometry and tuning parameters.
//!
//! Everything has a compiled-in default matching the reference robot. A JSON
//! file may override any subset of fields.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::errors::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Channels {
    pub ankle: u8,
    pub knee: u8,
    pub hip: u8,
}

impl Channels {
    pub fn as_array(&self) -> [u8; 3] {
        [self.ankle, self.knee, self.hip]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegConfig {
    pub name: String,
    /// Angle of the hip pivot around the body centre, degrees from +x.
    pub mount_degrees: f32,
    /// Direction the leg points when at rest, degrees from +x.
    pub home_degrees: f32,
    pub channels: Channels,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub coxa: f32,
    pub femur: f32,
    pub tibia: f32,
    /// Distance from body centre to each hip pivot.
    pub base_radius: f32,
}

impl Default for Dimensions {
    fn default() -> Self {
        Dimensions {
            coxa: 36.5,
            femur: 32.5,
            tibia: 65.0,
            base_radius: 93.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaitConfig {
    /// How far a foot is lifted off the ground, mm.
    pub max_raise: f32,
    /// Vertical speed of a lift, mm/s.
    pub raise_speed: f32,
    /// Lower bound on walking speed, mm/s.
    pub min_speed: f32,
    pub seconds_per_stride: f32,
}

impl Default for GaitConfig {
    fn default() -> Self {
        GaitConfig {
            max_raise: 16.0,
            raise_speed: 200.0,
            min_speed: 5.0,
            seconds_per_stride: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrideLimits {
    pub min: f32,
    pub optimal: f32,
    pub max: f32,
    pub step: f32,
    pub min_turn_degrees: f32,
    pub max_turn_degrees: f32,
}

impl Default for StrideLimits {
    fn default() -> Self {
        StrideLimits {
            min: 10.0,
            optimal: 30.0,
            max: 60.0,
            step: 5.0,
            min_turn_degrees: 2.0,
            max_turn_degrees: 20.0,
        }
    }
}

impl StrideLimits {
    pub fn clamp(&self, stride: f32) -> f32 {
        stride.clamp(self.min, self.max)
    }

    /// Turn angle matching the current stride, as a share of the maximum.
    pub fn turn_for_stride(&self, stride: f32) -> f32 {
        (self.max_turn_degrees * stride / self.max).clamp(self.min_turn_degrees, self.max_turn_degrees)
    }
}

/// Body height is the distance from the hip plane down to the feet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightLimits {
    pub min: f32,
    pub neutral: f32,
    pub max: f32,
    pub step: f32,
}

impl Default for HeightLimits {
    fn default() -> Self {
        HeightLimits {
            min: 40.0,
            neutral: 65.0,
            max: 85.0,
            step: 5.0,
        }
    }
}

impl HeightLimits {
    pub fn clamp(&self, height: f32) -> f32 {
        height.clamp(self.min, self.max)
    }

    /// Maps -100..100 onto min..max with 0 at neutral.
    pub fn from_percent(&self, percent: f32) -> f32 {
        let percent = percent.clamp(-100.0, 100.0) / 100.0;
        if percent >= 0.0 {
            self.neutral + (self.max - self.neutral) * percent
        } else {
            self.neutral + (self.neutral - self.min) * percent
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostureConfig {
    /// Body height of the resting stance.
    pub idle_height: f32,
    pub crouch_height: f32,
    /// Speed of whole-body transitions, mm/s.
    pub transition_speed: f32,
    /// Pause between idle control loop iterations, ms.
    pub loop_pause_ms: u64,
}

impl Default for PostureConfig {
    fn default() -> Self {
        PostureConfig {
            idle_height: 40.0,
            crouch_height: 50.0,
            transition_speed: 40.0,
            loop_pause_ms: 10,
        }
    }
}

lazy_static! {
    pub static ref DEFAULT_LEGS: Vec<LegConfig> = {
        [
            ("front left", 120.0),
            ("middle left", 180.0),
            ("back left", 240.0),
            ("back right", 300.0),
            ("middle right", 0.0),
            ("front right", 60.0),
        ]
        .iter()
        .enumerate()
        .map(|(i, (name, degrees))| {
            let base = (i * 3) as u8;
            LegConfig {
                name: name.to_string(),
                mount_degrees: *degrees,
                home_degrees: *degrees,
                channels: Channels {
                    ankle: base,
                    knee: base + 1,
                    hip: base + 2,
                },
            }
        })
        .collect()
    };
}

fn default_legs() -> Vec<LegConfig> {
    DEFAULT_LEGS.clone()
}

fn default_update_frequency() -> f32 {
    50.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    #[serde(default)]
    pub dimensions: Dimensions,
    /// Interpolation ticks per second.
    #[serde(default = "default_update_frequency")]
    pub update_frequency: f32,
    #[serde(default = "default_legs")]
    pub legs: Vec<LegConfig>,
    #[serde(default)]
    pub gait: GaitConfig,
    #[serde(default)]
    pub stride: StrideLimits,
    #[serde(default)]
    pub height: HeightLimits,
    #[serde(default)]
    pub posture: PostureConfig,
}

impl Default for RobotConfig {
    fn default() -> Self {
        RobotConfig {
            dimensions: Dimensions::default(),
            update_frequency: default_update_frequency(),
            legs: default_legs(),
            gait: GaitConfig::default(),
            stride: StrideLimits::default(),
            height: HeightLimits::default(),
            posture: PostureConfig::default(),
        }
    }
}

impl RobotConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        info!("Loaded robot config from {}", path.display());
        Ok(config)
    }

    /// Checks the config against itself and against a driver with
    /// `channel_count` channels.
    pub fn validate(&self, channel_count: usize) -> Result<(), ConfigError> {
        if self.legs.len() != 6 {
            return Err(ConfigError::LegCount(self.legs.len()));
        }

        let mut seen = HashSet::new();
        for (leg, cfg) in self.legs.iter().enumerate() {
            for channel in cfg.channels.as_array() {
                if channel as usize >= channel_count {
                    return Err(ConfigError::InvalidChannel {
                        leg,
                        channel,
                        count: channel_count,
                    });
                }
                if !seen.insert(channel) {
                    return Err(ConfigError::DuplicateChannel(channel));
                }
            }
        }

        let d = &self.dimensions;
        if !(d.coxa > 0.0 && d.femur > 0.0 && d.tibia > 0.0 && d.base_radius >= 0.0) {
            return invalid("dimensions", "segment lengths must be positive");
        }
        if !(self.update_frequency > 0.0) {
            return invalid("update_frequency", "must be positive");
        }
        if !(self.gait.max_raise > 0.0 && self.gait.raise_speed > 0.0) {
            return invalid("gait", "raise height and speed must be positive");
        }
        if !(self.gait.seconds_per_stride > 0.0) {
            return invalid("gait.seconds_per_stride", "must be positive");
        }

        let s = &self.stride;
        if !(0.0 < s.min && s.min <= s.optimal && s.optimal <= s.max) {
            return invalid("stride", "expected 0 < min <= optimal <= max");
        }
        if !(0.0 < s.min_turn_degrees && s.min_turn_degrees <= s.max_turn_degrees) {
            return invalid("stride", "expected 0 < min_turn_degrees <= max_turn_degrees");
        }

        let h = &self.height;
        if !(0.0 < h.min && h.min <= h.neutral && h.neutral <= h.max) {
            return invalid("height", "expected 0 < min <= neutral <= max");
        }
        if !(self.posture.transition_speed > 0.0) {
            return invalid("posture.transition_speed", "must be positive");
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> Result<(), ConfigError> {
    Err(ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config_is_valid() {
        let config = RobotConfig::default();
        assert!(config.validate(18).is_ok());
        assert_eq!(config.legs[2].channels.as_array(), [6, 7, 8]);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            RobotConfig::from_json(r#"{ "update_frequency": 25, "gait": { "max_raise": 20 } }"#)
                .unwrap();
        assert_relative_eq!(config.update_frequency, 25.0);
        assert_relative_eq!(config.gait.max_raise, 20.0);
        assert_relative_eq!(config.gait.raise_speed, 200.0);
        assert_eq!(config.legs.len(), 6);
    }

    #[test]
    fn test_rejects_channels_beyond_driver() {
        let config = RobotConfig::default();
        assert!(matches!(
            config.validate(12),
            Err(ConfigError::InvalidChannel { leg: 4, channel: 12, count: 12 })
        ));
    }

    #[test]
    fn test_rejects_duplicate_channel() {
        let mut config = RobotConfig::default();
        config.legs[1].channels.hip = 0;
        assert!(matches!(config.validate(18), Err(ConfigError::DuplicateChannel(0))));
    }

    #[test]
    fn test_rejects_bad_json() {
        assert!(matches!(
            RobotConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_height_percent_is_piecewise() {
        let h = HeightLimits::default();
        assert_relative_eq!(h.from_percent(0.0), 65.0);
        assert_relative_eq!(h.from_percent(100.0), 85.0);
        assert_relative_eq!(h.from_percent(-100.0), 40.0);
        assert_relative_eq!(h.from_percent(-50.0), 52.5);
    }

    #[test]
    fn test_turn_angle_follows_stride() {
        let s = StrideLimits::default();
        assert_relative_eq!(s.turn_for_stride(60.0), 20.0);
        assert_relative_eq!(s.turn_for_stride(30.0), 10.0);
        assert_relative_eq!(s.turn_for_stride(1.0), 2.0);
    }
}
