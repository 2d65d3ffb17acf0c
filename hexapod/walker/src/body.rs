use servo::{ServoDriver, ServoError, SharedDriver};
use std::sync::PoisonError;
use tracing::{debug, info};

use crate::config::{GaitConfig, RobotConfig};
use crate::errors::{ConfigError, MoveError};
use crate::leg::{Leg, LegGeometry, Position};
use crate::timed::{Interpolator, LegMotion, TickObserver};

pub const LEG_COUNT: usize = 6;

/// The six legs together with the interpolator that paces them. Only the
/// control thread holds this.
pub struct Hexapod {
    legs: Vec<Leg>,
    interpolator: Interpolator,
    driver: SharedDriver,
    gait: GaitConfig,
    observer: Option<TickObserver>,
}

impl Hexapod {
    pub fn new(config: &RobotConfig, driver: SharedDriver) -> Result<Self, ConfigError> {
        let channel_count = driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .channel_count();
        config.validate(channel_count)?;

        let legs = config
            .legs
            .iter()
            .enumerate()
            .map(|(id, leg)| Leg::new(id, LegGeometry::new(leg, &config.dimensions), driver.clone()))
            .collect();

        debug!(
            "Created hexapod with {} legs on {} channels",
            LEG_COUNT, channel_count
        );

        Ok(Hexapod {
            legs,
            interpolator: Interpolator::new(config.update_frequency),
            driver,
            gait: config.gait,
            observer: None,
        })
    }

    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    pub fn leg(&self, id: usize) -> Result<&Leg, MoveError> {
        self.legs.get(id).ok_or(MoveError::UnknownLeg(id))
    }

    pub fn leg_mut(&mut self, id: usize) -> Result<&mut Leg, MoveError> {
        self.legs.get_mut(id).ok_or(MoveError::UnknownLeg(id))
    }

    pub fn interpolator(&self) -> &Interpolator {
        &self.interpolator
    }

    pub fn interpolator_mut(&mut self) -> &mut Interpolator {
        &mut self.interpolator
    }

    pub fn set_observer(&mut self, observer: Option<TickObserver>) {
        self.observer = observer;
    }

    pub fn on_ground_count(&self) -> usize {
        self.legs.iter().filter(|leg| leg.on_ground()).count()
    }

    pub fn is_enabled(&self) -> bool {
        self.driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_enabled()
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<(), ServoError> {
        info!("{} servos", if enabled { "Enabling" } else { "Releasing" });
        self.driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .enable(enabled)
    }

    pub fn interpolate(&mut self, motions: &[LegMotion], duration: f32) -> Result<usize, MoveError> {
        self.interpolator
            .run(&mut self.legs, motions, duration, self.observer.as_ref())
    }

    pub fn raise_leg(&mut self, leg: usize, lift: bool) -> Result<(), MoveError> {
        self.raise_legs(&[leg], lift)
    }

    /// Lifts or lowers a group of feet by the configured raise height. The
    /// on-ground flags change before the vertical move starts and are put back
    /// if it is rejected.
    pub fn raise_legs(&mut self, group: &[usize], lift: bool) -> Result<(), MoveError> {
        let raise = self.gait.max_raise;
        let dz = if lift { raise } else { -raise };

        let mut motions = Vec::with_capacity(group.len());
        let mut previous = Vec::with_capacity(group.len());
        for &id in group {
            let leg = self.leg_mut(id)?;
            previous.push((id, leg.on_ground()));
            leg.set_on_ground(!lift);
            motions.push(LegMotion::Translate(id, Position::new(0.0, 0.0, dz)));
        }

        if let Err(e) = self.interpolate(&motions, raise / self.gait.raise_speed) {
            for (id, on_ground) in previous {
                self.legs[id].set_on_ground(on_ground);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Lifts each group in turn, places its feet at the horizontal positions
    /// returned by `target` and puts them down again.
    pub fn reposition<F>(&mut self, groups: &[&[usize]], target: F) -> Result<(), MoveError>
    where
        F: Fn(&Leg) -> Position,
    {
        for group in groups {
            self.raise_legs(group, true)?;
            for &id in group.iter() {
                let leg = self.leg_mut(id)?;
                let to = target(leg);
                leg.move_xy(to.x, to.y)?;
            }
            self.raise_legs(group, false)?;
        }
        Ok(())
    }

    /// Moves every foot to its own target in one interpolated transition at
    /// `speed` mm/s.
    pub fn transition<F>(&mut self, speed: f32, target: F) -> Result<usize, MoveError>
    where
        F: Fn(&Leg) -> Position,
    {
        let motions: Vec<LegMotion> = self
            .legs
            .iter()
            .map(|leg| LegMotion::Translate(leg.id(), target(leg) - leg.position()))
            .collect();
        let distance = motions
            .iter()
            .map(|m| match m {
                LegMotion::Translate(_, delta) => delta.norm(),
                LegMotion::Rotate(..) => 0.0,
            })
            .fold(0.0, f32::max);

        self.interpolate(&motions, distance / speed)
    }

    /// Vertical move of all feet. Positive `dz` lowers the body.
    pub fn shift_height(&mut self, dz: f32, speed: f32) -> Result<usize, MoveError> {
        let motions: Vec<LegMotion> = (0..self.legs.len())
            .map(|id| LegMotion::Translate(id, Position::new(0.0, 0.0, dz)))
            .collect();
        self.interpolate(&motions, dz.abs() / speed)
    }

    /// Puts every foot at home directly, without interpolation.
    pub fn home_all(&mut self) -> Result<(), MoveError> {
        for leg in self.legs.iter_mut() {
            leg.home()?;
            leg.set_on_ground(true);
        }
        Ok(())
    }
}
