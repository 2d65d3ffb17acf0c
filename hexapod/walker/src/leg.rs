//! Per-leg kinematics.
//!
//! Foot positions are kept in a frame aligned with the body axes (+x right,
//! +y forward, +z up) with its origin at the leg's hip pivot. Before solving,
//! a position is rotated into the leg's own frame, where +x points straight
//! out from the hip.

use nalgebra::{Matrix2, Rotation2, Vector2, Vector3};
use servo::{ServoDriver, SharedDriver};
use std::f32::consts::FRAC_PI_2;
use std::sync::PoisonError;
use tracing::{error, trace};

use crate::config::{Channels, Dimensions, LegConfig};
use crate::errors::MoveError;

pub type Position = Vector3<f32>;

/// Law of cosines: the angle opposite side `c`. `None` when the sides cannot
/// form a triangle.
pub fn triangle_angle(a: f32, b: f32, c: f32) -> Option<f32> {
    let (a, b, c) = (a.abs(), b.abs(), c.abs());
    if a + b < c || a + c < b || b + c < a {
        return None;
    }

    let cos = (a * a + b * b - c * c) / (2.0 * a * b);
    let angle = cos.clamp(-1.0, 1.0).acos();
    angle.is_finite().then_some(angle)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointAngles {
    pub hip: f32,
    pub knee: f32,
    pub ankle: f32,
}

impl JointAngles {
    fn is_finite(&self) -> bool {
        self.hip.is_finite() && self.knee.is_finite() && self.ankle.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reach {
    Reachable(JointAngles),
    Unreachable,
}

impl Reach {
    pub fn angles(self) -> Option<JointAngles> {
        match self {
            Reach::Reachable(angles) => Some(angles),
            Reach::Unreachable => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LegGeometry {
    pub name: String,
    pub coxa: f32,
    pub femur: f32,
    pub tibia: f32,
    pub channels: Channels,
    /// Hip pivot relative to the body centre.
    pub origin: Vector2<f32>,
    body_to_leg: Matrix2<f32>,
    home: Matrix2<f32>,
}

impl LegGeometry {
    pub fn new(config: &LegConfig, dimensions: &Dimensions) -> Self {
        let mount = config.mount_degrees.to_radians();
        let home = config.home_degrees.to_radians();
        LegGeometry {
            name: config.name.clone(),
            coxa: dimensions.coxa,
            femur: dimensions.femur,
            tibia: dimensions.tibia,
            channels: config.channels,
            origin: Vector2::new(mount.cos(), mount.sin()) * dimensions.base_radius,
            body_to_leg: Rotation2::new(-mount).into_inner(),
            home: Rotation2::new(home).into_inner(),
        }
    }

    /// Solves for a position in the leg's own frame.
    pub fn inverse_kinematics(&self, x: f32, y: f32, z: f32) -> Reach {
        let f = x.hypot(y) - self.coxa;
        let d = f.hypot(z);
        if d > self.femur + self.tibia {
            return Reach::Unreachable;
        }

        let (Some(knee_inner), Some(ankle_inner)) = (
            triangle_angle(self.femur, d, self.tibia),
            triangle_angle(self.femur, self.tibia, d),
        ) else {
            return Reach::Unreachable;
        };

        let angles = JointAngles {
            hip: y.atan2(x),
            knee: knee_inner - (-z).atan2(f),
            ankle: ankle_inner - FRAC_PI_2,
        };
        if angles.is_finite() {
            Reach::Reachable(angles)
        } else {
            Reach::Unreachable
        }
    }

    /// Foot position in the leg's own frame for the given joint angles.
    pub fn forward_kinematics(&self, angles: &JointAngles) -> Position {
        let inner = angles.ankle + FRAC_PI_2;
        let radial = self.femur * angles.knee.cos() - self.tibia * (angles.knee + inner).cos();
        let z = self.femur * angles.knee.sin() - self.tibia * (angles.knee + inner).sin();
        let r = self.coxa + radial;
        Position::new(r * angles.hip.cos(), r * angles.hip.sin(), z)
    }

    pub fn to_leg_frame(&self, position: &Position) -> Position {
        let xy = self.body_to_leg * position.xy();
        Position::new(xy.x, xy.y, position.z)
    }

    pub fn home_coordinates(&self) -> Position {
        let xy = self.home * Vector2::new(self.coxa + self.femur, 0.0);
        Position::new(xy.x, xy.y, -self.tibia)
    }

    /// Rotates `position` by `rad` about the body centre.
    pub fn rotate_about_body(&self, position: &Position, rad: f32) -> Position {
        let about_centre = position.xy() + self.origin;
        let rotated = Rotation2::new(rad) * about_centre - self.origin;
        Position::new(rotated.x, rotated.y, position.z)
    }
}

pub struct Leg {
    id: usize,
    geometry: LegGeometry,
    position: Position,
    on_ground: bool,
    driver: SharedDriver,
}

impl Leg {
    pub fn new(id: usize, geometry: LegGeometry, driver: SharedDriver) -> Self {
        let position = geometry.home_coordinates();
        Leg {
            id,
            geometry,
            position,
            on_ground: true,
            driver,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn geometry(&self) -> &LegGeometry {
        &self.geometry
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn on_ground(&self) -> bool {
        self.on_ground
    }

    pub fn set_on_ground(&mut self, on_ground: bool) {
        self.on_ground = on_ground;
    }

    pub fn home_coordinates(&self) -> Position {
        self.geometry.home_coordinates()
    }

    /// Moves the foot to `target`. Unless `raw`, the target is in the
    /// body-aligned frame. The stored position only changes on success.
    pub fn move_to(&mut self, target: Position, raw: bool) -> Result<(), MoveError> {
        let angles = self.solve(&target, raw)?;
        self.write_angles(&angles)?;
        self.position = target;
        Ok(())
    }

    /// Joint angles for `target` without moving.
    pub fn solve(&self, target: &Position, raw: bool) -> Result<JointAngles, MoveError> {
        let local = if raw {
            *target
        } else {
            self.geometry.to_leg_frame(target)
        };

        match self.geometry.inverse_kinematics(local.x, local.y, local.z) {
            Reach::Reachable(angles) => Ok(angles),
            Reach::Unreachable => Err(MoveError::OutOfRange {
                leg: self.id,
                x: target.x,
                y: target.y,
                z: target.z,
            }),
        }
    }

    pub fn move_by(&mut self, delta: Position) -> Result<(), MoveError> {
        self.move_to(self.position + delta, false)
    }

    /// Moves in the horizontal plane, keeping the current height.
    pub fn move_xy(&mut self, x: f32, y: f32) -> Result<(), MoveError> {
        self.move_to(Position::new(x, y, self.position.z), false)
    }

    pub fn home(&mut self) -> Result<(), MoveError> {
        self.move_to(self.home_coordinates(), false)
    }

    pub fn rotate_by(&mut self, rad: f32) -> Result<(), MoveError> {
        self.move_to(self.calc_rotation(rad, false), false)
    }

    /// Where `rotate_by(rad)` would put the foot, starting from home or from
    /// the current position.
    pub fn calc_rotation(&self, rad: f32, use_home: bool) -> Position {
        let start = if use_home {
            self.home_coordinates()
        } else {
            self.position
        };
        self.geometry.rotate_about_body(&start, rad)
    }

    /// Horizontal distance the home foot travels for a `rad` rotation.
    pub fn rotation_chord(&self, rad: f32) -> f32 {
        let home = self.home_coordinates();
        (self.calc_rotation(rad, true) - home).xy().norm()
    }

    fn write_angles(&self, angles: &JointAngles) -> Result<(), MoveError> {
        let channels = self.geometry.channels;
        let mut driver = self.driver.lock().unwrap_or_else(PoisonError::into_inner);
        for (channel, rads) in [
            (channels.ankle, angles.ankle),
            (channels.knee, angles.knee),
            (channels.hip, angles.hip),
        ] {
            trace!("leg {} servo {} -> {:.3}", self.id, channel, rads);
            if let Err(e) = driver.move_servo(channel, rads) {
                error!("Failed to move leg {} servo {}: {}", self.id, channel, e);
                return Err(e.into());
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Leg")
            .field("id", &self.id)
            .field("name", &self.geometry.name)
            .field("position", &self.position)
            .field("on_ground", &self.on_ground)
            .finish()
    }
}
