//! The control loop.
//!
//! One thread owns the body and runs [`Controller::run`]. Each iteration reads
//! the shared intent, then does exactly one thing: a posture change, one gait
//! cycle, one height adjustment or nothing.

use nalgebra::Vector2;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::body::Hexapod;
use crate::config::RobotConfig;
use crate::errors::MoveError;
use crate::gait::{GaitEngine, GaitKind, Stride};
use crate::intent::{Posture, RobotIntent};
use crate::leg::Position;

/// Percent of full deflection below which an axis counts as centred.
const DEADZONE: f32 = 0.5;

/// Legs visited by a safe-home pass, alternating sides.
const SAFE_HOME_ORDER: [usize; 6] = [0, 3, 1, 4, 2, 5];

#[derive(Debug)]
pub enum LoopAction {
    Posture(Posture),
    Gait {
        kind: GaitKind,
        init: bool,
        stride: Stride,
        speed: f32,
    },
    HeightChange {
        from: f32,
        to: f32,
    },
    Idle,
    Fault(MoveError),
}

pub struct Controller {
    body: Hexapod,
    gaits: GaitEngine,
    intent: Arc<RobotIntent>,
    config: Arc<RobotConfig>,
    last_gait: Option<GaitKind>,
    applied_height: f32,
}

impl Controller {
    pub fn new(body: Hexapod, intent: Arc<RobotIntent>, config: Arc<RobotConfig>) -> Self {
        let applied_height = config.height.neutral;
        Controller {
            body,
            gaits: GaitEngine::new(),
            intent,
            config,
            last_gait: None,
            applied_height,
        }
    }

    pub fn body(&self) -> &Hexapod {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Hexapod {
        &mut self.body
    }

    pub fn applied_height(&self) -> f32 {
        self.applied_height
    }

    /// Runs the loop on its own thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("walker-control".to_string())
            .spawn(move || self.run())
    }

    pub fn run(mut self) {
        info!("Control loop started");
        let pause = Duration::from_millis(self.config.posture.loop_pause_ms);

        while !self.intent.is_aborted() {
            match self.step_once() {
                LoopAction::Idle => {}
                LoopAction::Fault(e) => debug!("Iteration ended in fault: {}", e),
                action => debug!("{:?}", action),
            }
            thread::sleep(pause);
        }

        info!("Control loop stopping");
        if let Err(e) = self.body.set_enabled(false) {
            error!("Failed to release servos: {}", e);
        }
    }

    /// One loop iteration.
    pub fn step_once(&mut self) -> LoopAction {
        if let Some(posture) = self.intent.pending_posture() {
            return self.run_posture(posture);
        }

        let kind = self.intent.gait();
        let changed = self.last_gait != Some(kind);
        self.last_gait = Some(kind);

        if kind.is_translate() {
            let (x, y) = (self.intent.x(), self.intent.y());
            let deflection = x.hypot(y);
            if deflection > DEADZONE {
                let direction = Vector2::new(x, y) / deflection;
                let (length, speed) = self.scale(kind, self.intent.stride(), deflection);
                return self.run_gait(kind, Stride::Linear(direction * length), speed, changed);
            }
        } else if kind.is_rotate() {
            let rotate = self.intent.rotate();
            if rotate.abs() > DEADZONE {
                let (angle, speed) = self.scale(kind, self.intent.turn_angle(), rotate.abs());
                return self.run_gait(kind, Stride::Angular(angle * rotate.signum()), speed, changed);
            }
        }

        let target = self.intent.height();
        if (target - self.applied_height).abs() > 0.01 {
            return self.change_height(target);
        }

        LoopAction::Idle
    }

    /// Stride and speed for a `deflection` percent input. In velocity mode the
    /// input scales speed, otherwise it scales the stride.
    fn scale(&self, kind: GaitKind, full: f32, deflection: f32) -> (f32, f32) {
        let share = (deflection / 100.0).min(1.0);
        let seconds = self.intent.seconds_per_stride();
        let (length, speed_share) = if self.intent.velocity_mode() {
            (full, share)
        } else {
            (full * share, 1.0)
        };

        let travel = if kind.is_rotate() {
            self.body
                .leg(0)
                .map(|leg| leg.rotation_chord(length.to_radians()))
                .unwrap_or(length)
        } else {
            length
        };
        let speed = (travel / seconds * speed_share).max(self.config.gait.min_speed);
        (length, speed)
    }

    fn run_gait(&mut self, kind: GaitKind, stride: Stride, speed: f32, init: bool) -> LoopAction {
        if init {
            info!("Starting {:?}", kind);
        }
        match self.gaits.step(&mut self.body, kind, 1, stride, speed, init) {
            Ok(Some(report)) => LoopAction::Gait {
                kind,
                init: report.init,
                stride,
                speed,
            },
            Ok(None) => LoopAction::Idle,
            Err(e) => self.contain(e),
        }
    }

    fn change_height(&mut self, target: f32) -> LoopAction {
        let from = self.applied_height;
        let dz = from - target;
        match self.body.shift_height(dz, self.config.posture.transition_speed) {
            Ok(_) => {
                self.applied_height = target;
                LoopAction::HeightChange { from, to: target }
            }
            Err(e) => {
                // Drop the request so it is not retried every iteration.
                self.intent.set_height(from);
                self.contain(e)
            }
        }
    }

    fn contain(&mut self, error: MoveError) -> LoopAction {
        warn!("Move rejected, gait will restart: {}", error);
        self.last_gait = None;
        self.gaits.reset();
        LoopAction::Fault(error)
    }

    fn run_posture(&mut self, posture: Posture) -> LoopAction {
        info!("Running {:?}", posture);
        let result = match posture {
            Posture::SafeHome => self.safe_home(),
            Posture::Idle => self.idle_position(),
            Posture::StandUp => self.stand_up(),
        };
        self.intent.clear(posture);
        self.last_gait = None;
        self.gaits.reset();

        match result {
            Ok(()) => LoopAction::Posture(posture),
            Err(e) => {
                warn!("{:?} did not complete: {}", posture, e);
                LoopAction::Fault(e)
            }
        }
    }

    /// Returns each foot to its home x/y one leg at a time.
    pub fn safe_home(&mut self) -> Result<(), MoveError> {
        for id in SAFE_HOME_ORDER {
            self.body.raise_leg(id, true)?;
            let leg = self.body.leg_mut(id)?;
            let home = leg.home_coordinates();
            leg.move_xy(home.x, home.y)?;
            self.body.raise_leg(id, false)?;
        }
        Ok(())
    }

    /// Makes sure the servos hold a known pose, homing them if they were off.
    fn ensure_known_pose(&mut self) -> Result<(), MoveError> {
        if !self.body.is_enabled() {
            self.body.home_all()?;
            self.body.set_enabled(true)?;
            self.applied_height = self.config.height.neutral;
        }
        Ok(())
    }

    fn lower_to(&mut self, height: f32) -> Result<(), MoveError> {
        let speed = self.config.posture.transition_speed;
        self.body
            .transition(speed, |leg| Position::new(leg.position().x, leg.position().y, -height))?;
        self.applied_height = height;
        Ok(())
    }

    /// Settles the body into the low rest stance and releases the servos.
    pub fn idle_position(&mut self) -> Result<(), MoveError> {
        self.ensure_known_pose()?;
        let height = self.config.posture.idle_height;
        self.lower_to(height)?;
        self.intent.set_height(height);
        self.body.set_enabled(false)?;
        Ok(())
    }

    /// Crouch, rise to the home stance, then tidy up any drifted feet.
    pub fn stand_up(&mut self) -> Result<(), MoveError> {
        self.ensure_known_pose()?;
        self.lower_to(self.config.posture.crouch_height)?;

        let speed = self.config.posture.transition_speed;
        self.body.transition(speed, |leg| leg.home_coordinates())?;
        self.applied_height = self.config.height.neutral;
        self.intent.set_height(self.applied_height);

        self.safe_home()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandHandler;
    use crate::leg::Leg;
    use crate::timed::TickObserver;
    use approx::assert_abs_diff_eq;
    use servo::{DriverType, ServoDriver, SharedDriver, StubDriver};
    use std::time::Instant;

    fn controller() -> (Controller, CommandHandler, SharedDriver) {
        let config = Arc::new(RobotConfig::default());
        let driver = DriverType::Stub(StubDriver::new(18)).into_shared();
        let mut body = Hexapod::new(&config, driver.clone()).unwrap();
        body.interpolator_mut().set_paced(false);
        let intent = Arc::new(RobotIntent::new(&config));
        let handler = CommandHandler::new(intent.clone(), driver.clone(), config.clone());
        (Controller::new(body, intent, config), handler, driver)
    }

    #[test]
    fn test_nothing_to_do() {
        let (mut controller, _, _) = controller();
        assert!(matches!(controller.step_once(), LoopAction::Idle));
    }

    #[test]
    fn test_wave_starts_along_x() {
        let (mut controller, handler, _) = controller();
        controller.body_mut().home_all().unwrap();
        handler.handle("G2");
        handler.handle("X50");
        handler.handle("Y0");

        match controller.step_once() {
            LoopAction::Gait {
                kind,
                init,
                stride: Stride::Linear(v),
                speed,
            } => {
                assert_eq!(kind, GaitKind::Wave);
                assert!(init);
                assert_abs_diff_eq!(v.x, 30.0, epsilon = 1e-4);
                assert_abs_diff_eq!(v.y, 0.0, epsilon = 1e-4);
                // Half deflection at 30 mm per second.
                assert_abs_diff_eq!(speed, 15.0, epsilon = 1e-4);
            }
            other => panic!("unexpected {:?}", other),
        }

        // Same gait again continues without a new layout.
        match controller.step_once() {
            LoopAction::Gait { init, .. } => assert!(!init),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_stride_mode_scales_stride() {
        let (mut controller, handler, _) = controller();
        controller.body_mut().home_all().unwrap();
        handler.handle("C1");
        handler.handle("G3");
        handler.handle("Y-50");

        match controller.step_once() {
            LoopAction::Gait {
                stride: Stride::Linear(v),
                speed,
                ..
            } => {
                assert_abs_diff_eq!(v.y, -15.0, epsilon = 1e-4);
                assert_abs_diff_eq!(speed, 15.0, epsilon = 1e-4);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rotate_uses_turn_angle_and_sign() {
        let (mut controller, handler, _) = controller();
        controller.body_mut().home_all().unwrap();
        handler.handle("T-100");

        match controller.step_once() {
            LoopAction::Gait {
                kind,
                stride: Stride::Angular(a),
                ..
            } => {
                assert_eq!(kind, GaitKind::TripodRotate);
                assert_abs_diff_eq!(a, -10.0, epsilon = 1e-4);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_switching_gait_restarts_layout() {
        let (mut controller, handler, _) = controller();
        controller.body_mut().home_all().unwrap();
        handler.handle("G3");
        handler.handle("X100");
        assert!(matches!(controller.step_once(), LoopAction::Gait { init: true, .. }));
        handler.handle("G2");
        assert!(matches!(
            controller.step_once(),
            LoopAction::Gait { kind: GaitKind::Wave, init: true, .. }
        ));
    }

    #[test]
    fn test_returning_to_gait_restarts_layout() {
        let (mut controller, handler, _) = controller();
        controller.body_mut().home_all().unwrap();
        handler.handle("G2");
        handler.handle("X100");
        assert!(matches!(controller.step_once(), LoopAction::Gait { init: true, .. }));

        // Selected for one iteration, then back before it ever ran.
        handler.handle("G1");
        handler.handle("G2");
        assert!(matches!(controller.step_once(), LoopAction::Gait { init: false, .. }));

        handler.handle("G1");
        controller.step_once();
        handler.handle("G2");
        assert!(matches!(
            controller.step_once(),
            LoopAction::Gait { kind: GaitKind::Wave, init: true, .. }
        ));
    }

    #[test]
    fn test_tiny_stride_leaves_layout() {
        let (mut controller, handler, _) = controller();
        controller.body_mut().home_all().unwrap();
        handler.handle("C1");
        handler.handle("G2");
        handler.handle("X100");
        assert!(matches!(controller.step_once(), LoopAction::Gait { init: true, .. }));
        let laid_out: Vec<Position> = controller.body().legs().iter().map(|l| l.position()).collect();

        // Too short a stride to produce a single tick per phase.
        handler.handle("X0.8");
        assert!(matches!(controller.step_once(), LoopAction::Idle));

        handler.handle("X100");
        assert!(matches!(controller.step_once(), LoopAction::Gait { init: false, .. }));
        for (leg, expected) in controller.body().legs().iter().zip(&laid_out) {
            assert_abs_diff_eq!(leg.position(), *expected, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_height_change_is_absorbed_once() {
        let (mut controller, handler, _) = controller();
        controller.body_mut().home_all().unwrap();
        handler.handle("U1");

        match controller.step_once() {
            LoopAction::HeightChange { from, to } => {
                assert_abs_diff_eq!(from, 65.0);
                assert_abs_diff_eq!(to, 70.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        for leg in controller.body().legs() {
            assert_abs_diff_eq!(leg.position().z, -70.0, epsilon = 1e-3);
        }
        assert!(matches!(controller.step_once(), LoopAction::Idle));
    }

    #[test]
    fn test_out_of_range_is_contained() {
        let (mut controller, handler, _) = controller();
        controller.body_mut().home_all().unwrap();
        // Far beyond the legs' reach.
        controller.intent.set_height(200.0);

        let before: Vec<Position> = controller.body().legs().iter().map(|l| l.position()).collect();
        assert!(matches!(
            controller.step_once(),
            LoopAction::Fault(MoveError::OutOfRange { .. })
        ));
        let after: Vec<Position> = controller.body().legs().iter().map(|l| l.position()).collect();
        assert_eq!(before, after);
        assert_abs_diff_eq!(controller.applied_height(), 65.0);
        assert_abs_diff_eq!(controller.intent.height(), 65.0);

        // The loop carries on and can still walk.
        handler.handle("G3");
        handler.handle("X100");
        assert!(matches!(controller.step_once(), LoopAction::Gait { init: true, .. }));
    }

    #[test]
    fn test_idle_position_releases_servos() {
        let (mut controller, handler, driver) = controller();
        handler.handle("G7");

        assert!(matches!(controller.step_once(), LoopAction::Posture(Posture::Idle)));
        assert_eq!(controller.intent.pending_posture(), None);
        assert!(!driver.lock().unwrap().is_enabled());
        for leg in controller.body().legs() {
            assert_abs_diff_eq!(leg.position().z, -40.0, epsilon = 1e-3);
        }
        assert_abs_diff_eq!(controller.intent.height(), 40.0);
        assert!(matches!(controller.step_once(), LoopAction::Idle));
    }

    #[test]
    fn test_stand_up_ends_at_home() {
        let (mut controller, handler, driver) = controller();
        handler.handle("G8");

        assert!(matches!(controller.step_once(), LoopAction::Posture(Posture::StandUp)));
        assert!(driver.lock().unwrap().is_enabled());
        for leg in controller.body().legs() {
            assert_abs_diff_eq!(leg.position(), leg.home_coordinates(), epsilon = 1e-3);
            assert!(leg.on_ground());
        }
        assert_abs_diff_eq!(controller.applied_height(), 65.0);
    }

    #[test]
    fn test_safe_home_after_walking() {
        let (mut controller, handler, _) = controller();
        controller.body_mut().home_all().unwrap();
        handler.handle("G3");
        handler.handle("X100");
        controller.step_once();
        handler.handle("G6");

        assert!(matches!(controller.step_once(), LoopAction::Posture(Posture::SafeHome)));
        for leg in controller.body().legs() {
            let home = leg.home_coordinates();
            assert_abs_diff_eq!(leg.position().x, home.x, epsilon = 1e-3);
            assert_abs_diff_eq!(leg.position().y, home.y, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_run_pauses_after_posture() {
        let mut config = RobotConfig::default();
        config.posture.loop_pause_ms = 150;
        let config = Arc::new(config);
        let driver = DriverType::Stub(StubDriver::new(18)).into_shared();
        let mut body = Hexapod::new(&config, driver).unwrap();
        body.interpolator_mut().set_paced(false);
        body.home_all().unwrap();
        let intent = Arc::new(RobotIntent::new(&config));

        // Abort while the posture is still moving, so the loop ends right
        // after that iteration.
        let abort = intent.clone();
        let observer: TickObserver = Arc::new(move |_: &[Leg]| abort.request_abort());
        body.set_observer(Some(observer));
        intent.request(Posture::SafeHome);

        let start = Instant::now();
        Controller::new(body, intent.clone(), config).run();
        assert!(start.elapsed() >= Duration::from_millis(150));
        assert_eq!(intent.pending_posture(), None);
    }

    #[test]
    fn test_run_exits_on_abort() {
        let (controller, handler, _) = controller();
        handler.intent().request_abort();
        let handle = controller.spawn().unwrap();
        handle.join().unwrap();
    }
}
