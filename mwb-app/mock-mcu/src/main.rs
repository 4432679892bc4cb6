use std::path::PathBuf;

use clap::Parser;
use embassy_executor::{Executor, Spawner};
use embassy_time::{Duration, Ticker};
use mwb_core::{
    mk_static,
    utils::{
        connection::{
            Downlink, LinkState, Uplink,
            frame::MAX_FRAME_LEN,
            protocol::{ChassisCommandSink, SuspendOnOffline, TelemetrySource},
        },
        controllers::{ChassisCommand, MecanumChassis, MotorActuator, driver::AtomicEncoder},
        scheduler::Heartbeat,
    },
};
use static_cell::StaticCell;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod sim;

use config::RobotConfig;
use sim::{HostPort, Plant, PlantWheel, SimDrive, SimHost};

type Robot = Heartbeat<
    'static,
    &'static AtomicEncoder,
    SimDrive,
    HostPort,
    TelemetrySource,
    SuspendOnOffline<'static>,
>;

static COMMAND: ChassisCommand = ChassisCommand::new();
static LINK: LinkState = LinkState::new();
static PLANT: [PlantWheel; 4] = [const { PlantWheel::new() }; 4];

#[derive(Parser, Debug)]
#[clap(version = "1.0")]
struct Opts {
    /// Forward velocity command (m/s)
    #[clap(long, default_value_t = 0.1, allow_negative_numbers = true)]
    vx: f32,
    /// Leftward velocity command (m/s)
    #[clap(long, default_value_t = 0.0, allow_negative_numbers = true)]
    vy: f32,
    /// Yaw rate command (rad/s)
    #[clap(long, default_value_t = 0.0, allow_negative_numbers = true)]
    omega: f32,
    /// Base ticks to simulate; 0 runs until interrupted
    #[clap(long, default_value_t = 3000)]
    ticks: u64,
    /// JSON robot configuration
    #[clap(long)]
    config: Option<PathBuf>,
    /// Stop sending commands after this many base ticks
    #[clap(long)]
    host_silent_after: Option<u64>,
    /// Flip one bit in every n-th command frame
    #[clap(long)]
    corrupt_every: Option<u32>,
    /// Base ticks between host commands
    #[clap(long, default_value_t = 20)]
    command_period: u64,
}

#[embassy_executor::task]
async fn heartbeat_task(
    robot: &'static mut Robot,
    mut plant: Plant,
    ticks: u64,
    period: Duration,
) {
    let mut ticker = Ticker::every(period);
    loop {
        plant.step();
        robot.tick();

        if ticks != 0 && robot.ticks() >= ticks {
            let telemetry = robot.chassis().telemetry();
            let state = robot.chassis().state();
            let frames = robot.uplink_mut().transport_mut().received();
            info!(
                ticks = robot.ticks(),
                ?state,
                frame_errors = LINK.error_count(),
                send_failures = robot.send_failures(),
                telemetry_frames = frames,
                "simulation finished"
            );
            info!(targets = ?telemetry.target, measured = ?telemetry.measured, plant = ?plant.omega(), "wheel rates");
            info!(twist = ?telemetry.twist, "estimated body twist");
            std::process::exit(0);
        }
        ticker.next().await;
    }
}

#[embassy_executor::task]
async fn host_task(
    mut downlink: Downlink<'static, ChassisCommandSink<'static>>,
    mut host: SimHost,
    period: Duration,
    period_ticks: u64,
) {
    let mut ticker = Ticker::every(period);
    let mut buf = [0u8; MAX_FRAME_LEN];
    loop {
        ticker.next().await;
        if let Some(len) = host.next_frame(period_ticks, &mut buf) {
            // rejected frames are counted by the link
            let _ = downlink.receive(&buf[..len]);
        }
    }
}

#[embassy_executor::task]
async fn main_task(
    spawner: Spawner,
    opts: Opts,
    config: RobotConfig,
) {
    let base_period = Duration::from_micros((config.motor.heartbeat_period_s as f64 * 1e6).round() as u64);

    let wheels = core::array::from_fn(|i| MotorActuator::new(config.motor, &PLANT[i].encoder, SimDrive(&PLANT[i])));

    let chassis = MecanumChassis::new(config.chassis, &COMMAND, wheels);
    if let Err(e) = chassis.enable() {
        error!(%e, "chassis enable failed");
    }

    let log_every = 1000 / config.heartbeat.telemetry_divisor.max(1);
    let uplink = Uplink::new(
        config.link,
        &LINK,
        HostPort::new(config.link.head, log_every),
        TelemetrySource,
        SuspendOnOffline::new(&COMMAND),
    );
    let robot = mk_static!(Robot, Heartbeat::new(config.heartbeat, chassis, uplink));
    let plant = Plant::new(&PLANT, &config.motor);

    let downlink = Downlink::new(config.link, &LINK, ChassisCommandSink::new(&COMMAND));
    let host = SimHost::new(
        config.link.head,
        downlink.config().rx_len,
        (opts.vx, opts.vy, opts.omega),
        opts.corrupt_every,
        opts.host_silent_after,
    );
    let command_period = opts.command_period.max(1);
    let host_period = base_period * command_period as u32;

    info!(?opts, "starting mecanum simulation");
    if let Err(e) = spawner.spawn(heartbeat_task(robot, plant, opts.ticks, base_period)) {
        error!(?e, "cannot spawn heartbeat task");
        return;
    }
    if let Err(e) = spawner.spawn(host_task(downlink, host, host_period, command_period)) {
        error!(?e, "cannot spawn host task");
    }
}

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let opts = Opts::parse();
    let config = match opts.config.as_deref().map(RobotConfig::load) {
        Some(Ok(cfg)) => cfg,
        Some(Err(e)) => {
            error!(%e, "falling back to default configuration");
            RobotConfig::default()
        }
        None => RobotConfig::default(),
    };

    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        if let Err(e) = spawner.spawn(main_task(spawner, opts, config)) {
            error!(?e, "cannot spawn main task");
        }
    });
}
