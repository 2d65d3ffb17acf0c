mod body;
mod command;
mod config;
mod controller;
mod errors;
mod gait;
mod intent;
mod leg;
mod timed;
mod transport;

pub use body::{Hexapod, LEG_COUNT};
pub use command::{Command, CommandHandler};
pub use config::{
    Channels, Dimensions, GaitConfig, HeightLimits, LegConfig, PostureConfig, RobotConfig,
    StrideLimits, DEFAULT_LEGS,
};
pub use controller::{Controller, LoopAction};
pub use errors::{CommandError, ConfigError, MoveError};
pub use gait::{GaitEngine, GaitKind, StepReport, Stride};
pub use intent::{AtomicF32, Posture, RobotIntent};
pub use leg::{triangle_angle, JointAngles, Leg, LegGeometry, Position, Reach};
pub use timed::{Interpolator, LegMotion, TickObserver};
pub use transport::{spawn_stdin, TcpTransport};
