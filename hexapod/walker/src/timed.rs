//! Fixed-rate interpolation of leg motions.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::errors::MoveError;
use crate::leg::{Leg, Position};

/// Called with every leg after each interpolation tick.
pub type TickObserver = Arc<dyn Fn(&[Leg]) + Send + Sync>;

/// Total displacement of one leg over an interpolated move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LegMotion {
    Translate(usize, Position),
    /// Rotation about the body centre, radians.
    Rotate(usize, f32),
}

impl LegMotion {
    pub fn leg(&self) -> usize {
        match self {
            LegMotion::Translate(leg, _) | LegMotion::Rotate(leg, _) => *leg,
        }
    }

    /// Fails if the leg could not reach the end of this motion.
    fn check_reach(&self, legs: &[Leg]) -> Result<(), MoveError> {
        let id = self.leg();
        let leg = legs.get(id).ok_or(MoveError::UnknownLeg(id))?;
        let end = match self {
            LegMotion::Translate(_, delta) => leg.position() + delta,
            LegMotion::Rotate(_, rad) => leg.calc_rotation(*rad, false),
        };
        leg.solve(&end, false).map(|_| ())
    }

    fn apply_fraction(&self, legs: &mut [Leg], ticks: f32) -> Result<(), MoveError> {
        let id = self.leg();
        let leg = legs.get_mut(id).ok_or(MoveError::UnknownLeg(id))?;
        match self {
            LegMotion::Translate(_, delta) => leg.move_by(delta / ticks),
            LegMotion::Rotate(_, rad) => leg.rotate_by(rad / ticks),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Interpolator {
    frequency: f32,
    paced: bool,
}

impl Interpolator {
    pub fn new(frequency: f32) -> Self {
        Interpolator {
            frequency,
            paced: true,
        }
    }

    /// Ticks run back to back without sleeping.
    pub fn unpaced(frequency: f32) -> Self {
        Interpolator {
            frequency,
            paced: false,
        }
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn set_paced(&mut self, paced: bool) {
        self.paced = paced;
    }

    pub fn ticks(&self, duration: f32) -> usize {
        let n = (duration * self.frequency).round();
        if n.is_finite() && n > 0.0 {
            n as usize
        } else {
            0
        }
    }

    /// Applies `motions` in equal slices over `duration` seconds and returns
    /// the number of ticks run. A duration shorter than half a tick does
    /// nothing.
    pub fn run(
        &self,
        legs: &mut [Leg],
        motions: &[LegMotion],
        duration: f32,
        observer: Option<&TickObserver>,
    ) -> Result<usize, MoveError> {
        let n = self.ticks(duration);
        if n == 0 {
            return Ok(0);
        }

        for motion in motions {
            motion.check_reach(legs)?;
        }

        let period = Duration::from_secs_f32(1.0 / self.frequency);
        trace!("interpolating {} motions over {} ticks", motions.len(), n);

        for _ in 0..n {
            let start = Instant::now();
            for motion in motions {
                motion.apply_fraction(legs, n as f32)?;
            }
            if let Some(observer) = observer {
                observer(&*legs);
            }

            if self.paced {
                let remaining = period.saturating_sub(start.elapsed());
                if !remaining.is_zero() {
                    spin_sleep::sleep(remaining);
                }
            }
        }

        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RobotConfig;
    use crate::leg::LegGeometry;
    use approx::assert_abs_diff_eq;
    use servo::{DriverType, StubDriver};
    use std::sync::Mutex;

    fn legs() -> Vec<Leg> {
        let config = RobotConfig::default();
        let driver = DriverType::Stub(StubDriver::new(18)).into_shared();
        config
            .legs
            .iter()
            .enumerate()
            .map(|(i, cfg)| Leg::new(i, LegGeometry::new(cfg, &config.dimensions), driver.clone()))
            .collect()
    }

    #[test]
    fn test_tick_count_rounds() {
        let timed = Interpolator::unpaced(50.0);
        assert_eq!(timed.ticks(1.0), 50);
        assert_eq!(timed.ticks(0.08), 4);
        assert_eq!(timed.ticks(0.009), 0);
        assert_eq!(timed.ticks(-1.0), 0);
        assert_eq!(timed.ticks(f32::NAN), 0);
    }

    #[test]
    fn test_increments_sum_to_delta() {
        let timed = Interpolator::unpaced(50.0);
        let mut legs = legs();
        let start = legs[3].position();
        let delta = Position::new(7.0, -11.0, 3.0);

        let n = timed
            .run(&mut legs, &[LegMotion::Translate(3, delta)], 0.38, None)
            .unwrap();
        assert_eq!(n, 19);
        assert_abs_diff_eq!(legs[3].position(), start + delta, epsilon = 1e-4);
    }

    #[test]
    fn test_zero_ticks_is_noop() {
        let timed = Interpolator::unpaced(50.0);
        let mut legs = legs();
        let start = legs[0].position();

        let n = timed
            .run(&mut legs, &[LegMotion::Translate(0, Position::new(10.0, 0.0, 0.0))], 0.005, None)
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(legs[0].position(), start);
    }

    #[test]
    fn test_unreachable_end_moves_nothing() {
        let timed = Interpolator::unpaced(50.0);
        let mut legs = legs();
        let before: Vec<Position> = legs.iter().map(|l| l.position()).collect();

        let result = timed.run(
            &mut legs,
            &[
                LegMotion::Translate(0, Position::new(0.0, 0.0, 5.0)),
                LegMotion::Translate(1, Position::new(0.0, 0.0, -100.0)),
            ],
            0.5,
            None,
        );
        assert!(matches!(result, Err(MoveError::OutOfRange { leg: 1, .. })));
        let after: Vec<Position> = legs.iter().map(|l| l.position()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_rotation_slices_sum() {
        let timed = Interpolator::unpaced(50.0);
        let mut legs = legs();
        let expected = legs[1].calc_rotation(0.2, false);

        timed
            .run(&mut legs, &[LegMotion::Rotate(1, 0.2)], 0.2, None)
            .unwrap();
        assert_abs_diff_eq!(legs[1].position(), expected, epsilon = 1e-3);
    }

    #[test]
    fn test_observer_sees_every_tick() {
        let timed = Interpolator::unpaced(50.0);
        let mut legs = legs();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer: TickObserver = Arc::new(move |legs: &[Leg]| {
            sink.lock().unwrap().push(legs[5].position().z);
        });

        timed
            .run(
                &mut legs,
                &[LegMotion::Translate(5, Position::new(0.0, 0.0, 8.0))],
                0.08,
                Some(&observer),
            )
            .unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_abs_diff_eq!(seen[0], -63.0, epsilon = 1e-4);
        assert_abs_diff_eq!(seen[3], -57.0, epsilon = 1e-4);
    }

    #[test]
    fn test_paced_run_takes_its_duration() {
        let timed = Interpolator::new(100.0);
        let mut legs = legs();
        let start = Instant::now();
        timed
            .run(&mut legs, &[LegMotion::Translate(0, Position::new(1.0, 0.0, 0.0))], 0.05, None)
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(45));
    }
}
