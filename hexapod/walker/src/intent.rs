//! Operator intent shared between the command handler and the control loop.
//!
//! Every field is its own atomic. Writers store whole values and readers may
//! see fields from different commands; the loop re-reads everything on each
//! iteration.

use num_traits::{FromPrimitive, ToPrimitive};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::config::RobotConfig;
use crate::gait::GaitKind;

/// f32 stored as its bit pattern.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        AtomicF32(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// One-shot posture requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posture {
    SafeHome,
    Idle,
    StandUp,
}

#[derive(Debug)]
pub struct RobotIntent {
    gait: AtomicU8,
    x: AtomicF32,
    y: AtomicF32,
    rotate: AtomicF32,
    stride: AtomicF32,
    turn_angle: AtomicF32,
    height: AtomicF32,
    seconds_per_stride: AtomicF32,
    velocity_mode: AtomicBool,
    safe_home: AtomicBool,
    idle: AtomicBool,
    stand_up: AtomicBool,
    abort: AtomicBool,
}

impl RobotIntent {
    pub fn new(config: &RobotConfig) -> Self {
        RobotIntent {
            gait: AtomicU8::new(GaitKind::None as u8),
            x: AtomicF32::new(0.0),
            y: AtomicF32::new(0.0),
            rotate: AtomicF32::new(0.0),
            stride: AtomicF32::new(config.stride.optimal),
            turn_angle: AtomicF32::new(config.stride.turn_for_stride(config.stride.optimal)),
            height: AtomicF32::new(config.height.neutral),
            seconds_per_stride: AtomicF32::new(config.gait.seconds_per_stride),
            velocity_mode: AtomicBool::new(true),
            safe_home: AtomicBool::new(false),
            idle: AtomicBool::new(false),
            stand_up: AtomicBool::new(false),
            abort: AtomicBool::new(false),
        }
    }

    pub fn gait(&self) -> GaitKind {
        GaitKind::from_u8(self.gait.load(Ordering::Relaxed)).unwrap_or(GaitKind::None)
    }

    pub fn set_gait(&self, gait: GaitKind) {
        if let Some(value) = gait.to_u8() {
            self.gait.store(value, Ordering::Relaxed);
        }
    }

    pub fn x(&self) -> f32 {
        self.x.load()
    }

    pub fn set_x(&self, x: f32) {
        self.x.store(x.clamp(-100.0, 100.0));
    }

    pub fn y(&self) -> f32 {
        self.y.load()
    }

    pub fn set_y(&self, y: f32) {
        self.y.store(y.clamp(-100.0, 100.0));
    }

    pub fn rotate(&self) -> f32 {
        self.rotate.load()
    }

    pub fn set_rotate(&self, rotate: f32) {
        self.rotate.store(rotate.clamp(-100.0, 100.0));
    }

    /// Stride length in mm.
    pub fn stride(&self) -> f32 {
        self.stride.load()
    }

    pub fn set_stride(&self, stride: f32) {
        self.stride.store(stride);
    }

    /// Turn angle per cycle in degrees.
    pub fn turn_angle(&self) -> f32 {
        self.turn_angle.load()
    }

    pub fn set_turn_angle(&self, degrees: f32) {
        self.turn_angle.store(degrees);
    }

    /// Target body height in mm.
    pub fn height(&self) -> f32 {
        self.height.load()
    }

    pub fn set_height(&self, height: f32) {
        self.height.store(height);
    }

    pub fn seconds_per_stride(&self) -> f32 {
        self.seconds_per_stride.load()
    }

    pub fn set_seconds_per_stride(&self, seconds: f32) {
        self.seconds_per_stride.store(seconds);
    }

    /// In velocity mode the joystick scales speed; otherwise it scales the
    /// stride.
    pub fn velocity_mode(&self) -> bool {
        self.velocity_mode.load(Ordering::Relaxed)
    }

    pub fn set_velocity_mode(&self, velocity: bool) {
        self.velocity_mode.store(velocity, Ordering::Relaxed);
    }

    fn trigger(&self, posture: Posture) -> &AtomicBool {
        match posture {
            Posture::SafeHome => &self.safe_home,
            Posture::Idle => &self.idle,
            Posture::StandUp => &self.stand_up,
        }
    }

    pub fn request(&self, posture: Posture) {
        self.trigger(posture).store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self, posture: Posture) -> bool {
        self.trigger(posture).load(Ordering::SeqCst)
    }

    pub fn clear(&self, posture: Posture) {
        self.trigger(posture).store(false, Ordering::SeqCst);
    }

    /// Pending posture with the highest priority.
    pub fn pending_posture(&self) -> Option<Posture> {
        [Posture::Idle, Posture::SafeHome, Posture::StandUp]
            .into_iter()
            .find(|&p| self.is_requested(p))
    }

    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }
}
