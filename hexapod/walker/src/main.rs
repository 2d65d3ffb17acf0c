use clap::Parser;
use eyre::{eyre, WrapErr};
use servo::{
    DriverType, MaestroDriver, PulseRange, ServoDriver, StubDriver, HEXAPOD_CALIBRATION,
    HEXAPOD_CHANNELS,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use walker::{
    spawn_stdin, CommandHandler, Controller, Hexapod, Posture, RobotConfig, RobotIntent,
    TcpTransport,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Drive a six-legged walking robot")]
struct Args {
    /// JSON file overriding the built-in robot config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port of the servo controller; without it the robot is simulated
    #[arg(long)]
    port: Option<String>,

    #[arg(long, default_value_t = 115200)]
    baud: u32,

    /// Address to accept command connections on, e.g. 0.0.0.0:8900; reads
    /// stdin when absent
    #[arg(long)]
    listen: Option<String>,

    /// Stand up as soon as the control loop starts
    #[arg(long)]
    stand_up: bool,

    /// Run interpolation without real-time pacing
    #[arg(long)]
    unpaced: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> eyre::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match &args.config {
        Some(path) => RobotConfig::load(path)
            .wrap_err_with(|| format!("loading config from {}", path.display()))?,
        None => RobotConfig::default(),
    };
    let config = Arc::new(config);

    let driver = match &args.port {
        Some(port) => DriverType::Maestro(MaestroDriver::new(
            port,
            args.baud,
            HEXAPOD_CALIBRATION.clone(),
            PulseRange::default(),
        )?),
        None => {
            info!("No servo port given, simulating {} channels", HEXAPOD_CHANNELS);
            DriverType::Stub(StubDriver::with_calibration(HEXAPOD_CALIBRATION.clone()))
        }
    };
    info!("Using {} servo driver", driver.kind());
    let driver = driver.into_shared();

    let intent = Arc::new(RobotIntent::new(&config));
    let abort = intent.clone();
    ctrlc::set_handler(move || {
        abort.request_abort();
    })?;

    let mut body = Hexapod::new(&config, driver.clone())?;
    body.interpolator_mut().set_paced(!args.unpaced);

    if args.stand_up {
        intent.request(Posture::StandUp);
    }
    let control = Controller::new(body, intent.clone(), config.clone()).spawn()?;

    let handler = CommandHandler::new(intent.clone(), driver, config);
    match &args.listen {
        Some(addr) => {
            TcpTransport::bind(addr)
                .wrap_err_with(|| format!("binding {}", addr))?
                .spawn(handler)?;
        }
        None => {
            spawn_stdin(handler)?;
        }
    }

    info!("Press Ctrl+C to exit");
    control
        .join()
        .map_err(|_| eyre!("control thread panicked"))?;
    info!("Stopped");
    Ok(())
}
