//! Wave and tripod gaits, translating or turning.
//!
//! All four gaits share one algorithm and differ only in how the legs are
//! grouped and whether a stride is a distance or an angle. Legs are laid out
//! around home so that each group is one increment further along than the
//! previous one. A phase lifts one group and swings it forward by a whole
//! stride while every grounded leg pushes back by one increment.

use nalgebra::Vector2;
use num_derive::{FromPrimitive, ToPrimitive};
use std::collections::HashMap;
use std::ops::{Mul, Sub};
use tracing::{debug, warn};

use crate::body::Hexapod;
use crate::errors::MoveError;
use crate::leg::{Leg, Position};
use crate::timed::LegMotion;

/// Gait selector, numbered as in the `G` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
pub enum GaitKind {
    None = 1,
    Wave = 2,
    Tripod = 3,
    TripodRotate = 4,
    WaveRotate = 5,
}

const WAVE_GROUPS: &[&[usize]] = &[&[2], &[1], &[0], &[3], &[4], &[5]];
const TRIPOD_GROUPS: &[&[usize]] = &[&[0, 2, 4], &[1, 3, 5]];

impl GaitKind {
    pub fn is_translate(self) -> bool {
        matches!(self, GaitKind::Wave | GaitKind::Tripod)
    }

    pub fn is_rotate(self) -> bool {
        matches!(self, GaitKind::WaveRotate | GaitKind::TripodRotate)
    }

    /// Leg groups in the order they are lifted.
    pub fn groups(self) -> &'static [&'static [usize]] {
        match self {
            GaitKind::None => &[],
            GaitKind::Wave | GaitKind::WaveRotate => WAVE_GROUPS,
            GaitKind::Tripod | GaitKind::TripodRotate => TRIPOD_GROUPS,
        }
    }

    /// Share of the whole stride's travel time spent in one phase.
    fn phase_share(self) -> f32 {
        match self {
            GaitKind::Wave | GaitKind::WaveRotate => 1.0 / 6.0,
            _ => 1.0,
        }
    }
}

/// How far one full gait cycle carries the body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stride {
    /// Body travel in mm.
    Linear(Vector2<f32>),
    /// Body rotation in degrees, positive counter-clockwise.
    Angular(f32),
}

impl Stride {
    fn zero(self) -> Stride {
        match self {
            Stride::Linear(_) => Stride::Linear(Vector2::zeros()),
            Stride::Angular(_) => Stride::Angular(0.0),
        }
    }

    pub fn magnitude(self) -> f32 {
        match self {
            Stride::Linear(v) => v.norm(),
            Stride::Angular(a) => a.abs(),
        }
    }

    /// True when `self` points against `previous`, which cannot be smoothed.
    fn reverses(self, previous: Stride) -> bool {
        match (self, previous) {
            (Stride::Linear(v), Stride::Linear(p)) => p.norm() == 0.0 || v.dot(&p) < 0.0,
            (Stride::Angular(a), Stride::Angular(p)) => a.signum() != p.signum() || p == 0.0,
            _ => true,
        }
    }

    fn motion(self, leg: usize) -> LegMotion {
        match self {
            Stride::Linear(v) => LegMotion::Translate(leg, Position::new(v.x, v.y, 0.0)),
            Stride::Angular(a) => LegMotion::Rotate(leg, a.to_radians()),
        }
    }

    /// Foot position this far along from home.
    fn place(self, leg: &Leg) -> Position {
        match self {
            Stride::Linear(v) => leg.home_coordinates() + Position::new(v.x, v.y, 0.0),
            Stride::Angular(a) => leg.calc_rotation(a.to_radians(), true),
        }
    }
}

impl Mul<f32> for Stride {
    type Output = Stride;

    fn mul(self, k: f32) -> Stride {
        match self {
            Stride::Linear(v) => Stride::Linear(v * k),
            Stride::Angular(a) => Stride::Angular(a * k),
        }
    }
}

impl Sub for Stride {
    type Output = Stride;

    fn sub(self, other: Stride) -> Stride {
        match (self, other) {
            (Stride::Linear(a), Stride::Linear(b)) => Stride::Linear(a - b),
            (Stride::Angular(a), Stride::Angular(b)) => Stride::Angular(a - b),
            (a, _) => a,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Legs were laid out from home before stepping.
    pub init: bool,
    pub phase_seconds: f32,
}

/// Runs gait cycles and remembers the stride of the gait that last moved
/// the feet.
#[derive(Debug, Default)]
pub struct GaitEngine {
    memory: HashMap<GaitKind, Stride>,
}

impl GaitEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_stride(&self, kind: GaitKind) -> Option<Stride> {
        self.memory.get(&kind).copied()
    }

    /// Forgets every stride, so the next step of any gait starts with a
    /// fresh layout.
    pub fn reset(&mut self) {
        self.memory.clear();
    }

    /// Runs `repetitions` full cycles of `kind`. Returns `None` when the
    /// request was rejected without moving.
    pub fn step(
        &mut self,
        body: &mut Hexapod,
        kind: GaitKind,
        repetitions: usize,
        stride: Stride,
        speed: f32,
        init: bool,
    ) -> Result<Option<StepReport>, MoveError> {
        let groups = kind.groups();
        let matches_kind = match stride {
            Stride::Linear(_) => kind.is_translate(),
            Stride::Angular(_) => kind.is_rotate(),
        };
        if !matches_kind {
            warn!("{:?} cannot run with {:?}", kind, stride);
            return Ok(None);
        }
        if !(speed.is_finite() && speed > 0.0) {
            warn!("Ignoring {:?} step with speed {}", kind, speed);
            return Ok(None);
        }
        let magnitude = stride.magnitude();
        if !(magnitude.is_finite() && magnitude > 0.0) {
            warn!("Ignoring {:?} step with empty stride", kind);
            return Ok(None);
        }

        let n = groups.len();
        let inc = stride * (1.0 / (n - 1) as f32);
        let half = stride * 0.5;

        let phase_seconds = match stride {
            Stride::Linear(_) => magnitude / speed * kind.phase_share(),
            Stride::Angular(_) => {
                let chord = match inc {
                    Stride::Angular(a) => body.leg(0)?.rotation_chord(a.abs().to_radians()),
                    Stride::Linear(_) => 0.0,
                };
                chord / speed
            }
        };

        // Memory must only follow strides the feet actually made.
        if body.interpolator().ticks(phase_seconds) == 0 {
            warn!(
                "Ignoring {:?} step with {:?}: phase of {:.4}s is shorter than a tick",
                kind, stride, phase_seconds
            );
            return Ok(None);
        }

        let last = self.memory.get(&kind).copied();
        let init = init || last.map_or(true, |last| stride.reverses(last));

        let mut carried = stride.zero();
        if init {
            debug!("Laying out legs for {:?} with {:?}", kind, stride);
            for (g, group) in groups.iter().enumerate() {
                let offset = inc * g as f32 - half;
                body.reposition(&[*group], |leg| offset.place(leg))?;
            }
        } else if let Some(last) = last {
            if last != stride {
                carried = stride - last;
                debug!("Absorbing stride change {:?} on first phase", carried);
            }
        }
        // The feet now follow this gait's layout; any other gait's stride is stale.
        self.memory.retain(|k, _| *k == kind);
        self.memory.insert(kind, stride);

        for _ in 0..repetitions {
            for (phase, group) in groups.iter().enumerate() {
                let d = carried * 0.5;
                let spread = carried * (1.0 / (n - 1) as f32);

                let mut motions = Vec::with_capacity(body.legs().len());
                for (j, others) in groups.iter().enumerate() {
                    let amount = if j == phase {
                        stride - d
                    } else {
                        inc.zero() - inc - (d - spread * j as f32)
                    };
                    motions.extend(others.iter().map(|&leg| amount.motion(leg)));
                }

                debug!("{:?} phase {} lifts {:?}", kind, phase, group);
                body.raise_legs(group, true)?;
                body.interpolate(&motions, phase_seconds)?;
                body.raise_legs(group, false)?;

                carried = stride.zero();
            }
        }

        Ok(Some(StepReport {
            init,
            phase_seconds,
        }))
    }
}
