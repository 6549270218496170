//! `simlink-cli` – headless bridge dry run.
//!
//! This binary is the entry point for the simlink stack.  It:
//!
//! 1. Loads `~/.simlink/config.toml`, writing the defaults when the file is
//!    absent.
//! 2. Builds an in-process simulator, controller manager and logging command
//!    sink, and wires them into a [`RobotBridge`].
//! 3. Switches to the configured controller, cycles until the first joint
//!    sample arrives from a simulated sensor publisher, seeds the configured
//!    task and replays it through the safety gate.
//! 4. Intercepts **Ctrl-C** to stop the replay and shut the bridge down.

mod config;

use colored::Colorize;
use nalgebra::{Quaternion, Vector3};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

use simlink_hal::{CommandSink, PhysicsEngine, SimEngine, SimulatorStateWriter, TracingSink};
use simlink_kernel::{DispatchOutcome, SafetyGate};
use simlink_middleware::{
    DEFAULT_CAPACITY, JOINT_STATES_TOPIC, JOINT_VELOCITY_TOPIC, ROBOT_BASE_TOPIC, SensorHub, SensorPublisher,
    SimControllerManager, SimServiceBehaviour, mocap_topic, sensor_channel,
};
use simlink_perception::PoseFrameTransformer;
use simlink_runtime::{CartesianSeeder, RobotBridge, torques_for_robot};
use simlink_types::{
    ActuationMode, BodyPose, BridgeError, ControlSequence, NUM_JOINTS, SensorMessage, SensorPayload, SwitchOutcome,
};

/// Interval between simulated sensor samples.
const SENSOR_PERIOD: Duration = Duration::from_millis(10);
/// Cycles allowed before giving up on the first joint sample.
const FIRST_SAMPLE_CYCLES: usize = 200;

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the filter (defaults to "info"); SIMLINK_LOG_FORMAT=json
    // switches to newline-delimited JSON.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("SIMLINK_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping replay …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; replay cannot be interrupted");
    }

    // ── Config vault ──────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Ok(None) => {
            let cfg = config::defaults_with_env();
            match config::save(&config::Config::default()) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::defaults_with_env()
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            std::process::exit(1);
        }
    };

    match runtime.block_on(dry_run(&cfg, shutdown)) {
        Ok(summary) => print_summary(&cfg, &summary),
        Err(e) => {
            error!(error = %e, "dry run aborted");
            println!("\n  {} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dry run
// ─────────────────────────────────────────────────────────────────────────────

struct RunSummary {
    switch: SwitchOutcome,
    controller: String,
    first_sample_cycles: usize,
    seed_steps: usize,
    replay: ReplayCounts,
    halted: bool,
    elapsed: chrono::Duration,
}

/// What happened to the seed commands at the safety gate.
#[derive(Debug, Default, PartialEq, Eq)]
struct ReplayCounts {
    published: usize,
    suppressed: usize,
    /// Dispatches made after the gate latched, published or not.
    after_halt: usize,
    interrupted: bool,
}

async fn dry_run(cfg: &config::Config, shutdown: Arc<AtomicBool>) -> Result<RunSummary, BridgeError> {
    let started = chrono::Utc::now();

    // ── Simulator ─────────────────────────────────────────────────────────
    let mut builder = SimEngine::builder().timestep(cfg.timestep).grippers(2);
    let mut bodies = vec![cfg.bridge.goal_body.clone()];
    bodies.extend(cfg.bridge.objects.iter().map(|o| o.name.clone()));
    if !bodies.contains(&cfg.seed_object) {
        bodies.push(cfg.seed_object.clone());
    }
    for name in &bodies {
        builder = builder.free_body(name.clone());
    }
    let mut engine = builder.build();

    let writer = SimulatorStateWriter::new(&cfg.writer);
    let goal = engine
        .body_id(&cfg.bridge.goal_body)
        .ok_or_else(|| BridgeError::UnknownBody(cfg.bridge.goal_body.clone()))?;
    writer.set_body_position(&mut engine, goal, &Vector3::new(0.4, -0.1, 0.35))?;

    // ── Bridge ────────────────────────────────────────────────────────────
    let (publisher, queue) = sensor_channel(DEFAULT_CAPACITY);
    let hub = SensorHub::with_robot_topics(queue);
    let transformer = PoseFrameTransformer::new(&cfg.frame)?;
    let gate = SafetyGate::new(cfg.safety.clone(), TracingSink::new());
    let mut bridge = RobotBridge::new(engine, hub, writer, transformer, gate, cfg.bridge.clone())?;

    let manager = SimControllerManager::new(SimServiceBehaviour::Accept);
    let switch = bridge.request_controller_switch(&manager, &cfg.target_controller).await;
    if switch != SwitchOutcome::Ok {
        warn!(outcome = ?switch, "continuing dry run on the initial controller");
    }

    let objects: Vec<String> = cfg.bridge.objects.iter().map(|o| o.name.clone()).collect();
    let feed = tokio::spawn(simulated_sensors(publisher, objects, shutdown.clone()));

    let first_sample_cycles = bridge.wait_for_first_sample(SENSOR_PERIOD, FIRST_SAMPLE_CYCLES).await?;
    bridge.cycle();

    // ── Seed ──────────────────────────────────────────────────────────────
    let seeder = CartesianSeeder::new(cfg.seeder.clone())?;
    let task = cfg.task.build();
    info!(task = task.name(), object = %cfg.seed_object, horizon = cfg.seeder.horizon, "building seed");
    let seed = bridge.seed(&seeder, task.as_ref(), &cfg.seed_object)?;

    // ── Replay through the safety gate ────────────────────────────────────
    let replay = replay(&mut bridge, &seed.controls, &shutdown)?;

    shutdown.store(true, Ordering::SeqCst);
    if let Err(e) = feed.await {
        warn!(error = %e, "sensor feed task ended abnormally");
    }
    bridge.shutdown();

    Ok(RunSummary {
        switch,
        controller: bridge.current_controller().to_string(),
        first_sample_cycles,
        seed_steps: seed.controls.len(),
        replay,
        halted: bridge.gate().is_halted(),
        elapsed: chrono::Utc::now() - started,
    })
}

/// Dispatch every seed command as robot torques until the seed ends or
/// `shutdown` is set.  A halt does not stop the replay; the gate's halt
/// policy decides what the arm receives from then on.
fn replay<E: PhysicsEngine, S: CommandSink>(
    bridge: &mut RobotBridge<E, S>,
    controls: &ControlSequence,
    shutdown: &AtomicBool,
) -> Result<ReplayCounts, BridgeError> {
    let bias: Vec<f64> = bridge.engine().bias_forces().to_vec();
    let mut counts = ReplayCounts::default();
    for (control, _gripper_open) in controls.iter() {
        if shutdown.load(Ordering::SeqCst) {
            counts.interrupted = true;
            break;
        }
        if bridge.gate().is_halted() {
            counts.after_halt += 1;
        }
        let torques: [f64; NUM_JOINTS] = torques_for_robot(control, &bias);
        match bridge.dispatch(ActuationMode::Torque, &torques)? {
            DispatchOutcome::Published(_) => counts.published += 1,
            DispatchOutcome::Suppressed => counts.suppressed += 1,
        }
    }
    Ok(counts)
}

/// Publish a resting arm, the robot base and every tracked object until
/// `shutdown` is set.
async fn simulated_sensors(publisher: SensorPublisher, objects: Vec<String>, shutdown: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(SENSOR_PERIOD);
    // Motion-capture axes: y up.
    let object_pose = BodyPose::new(Vector3::new(0.5, 0.0, -0.2), Quaternion::identity());
    while !shutdown.load(Ordering::SeqCst) {
        ticker.tick().await;
        let mut batch = vec![
            SensorMessage::new(JOINT_STATES_TOPIC, SensorPayload::JointPositions(vec![0.0; NUM_JOINTS])),
            SensorMessage::new(JOINT_VELOCITY_TOPIC, SensorPayload::JointVelocities(vec![0.0; NUM_JOINTS])),
            SensorMessage::new(ROBOT_BASE_TOPIC, SensorPayload::Pose(BodyPose::identity())),
        ];
        batch.extend(
            objects
                .iter()
                .map(|name| SensorMessage::new(mocap_topic(name), SensorPayload::Pose(object_pose))),
        );
        for message in batch {
            if let Err(e) = publisher.publish(message) {
                warn!(error = %e, "simulated sample not delivered");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner / summary
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"       _           ___       __  "#.bold().cyan());
    println!("{}", r#"  ___ (_)_ _  ___ / (_)__  / /__"#.bold().cyan());
    println!("{}", r#" (_-</ /  ' \/ -_) / / _ \/  '_/"#.bold().cyan());
    println!("{}", r#"/___/_/_/_/_/\__/_/_/_//_/_/\_\ "#.bold().cyan());
    println!();
    println!("  {} {}", "simlink".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Real-robot ↔ simulator bridge");
    println!();
}

fn print_summary(cfg: &config::Config, summary: &RunSummary) {
    let switch = match summary.switch {
        SwitchOutcome::Ok => "ok".green(),
        SwitchOutcome::Rejected => "rejected".yellow(),
        SwitchOutcome::Unreachable => "unreachable".red(),
    };
    let gate = if summary.halted { "halted".red().bold() } else { "armed".green() };

    println!();
    println!("{}", "  Dry run summary".bold());
    println!("    Controller switch : {} (active: {})", switch, summary.controller.bold());
    println!("    First joint state : after {} cycle(s)", summary.first_sample_cycles);
    println!(
        "    Seed              : {:?} on {} – {} step(s)",
        cfg.task,
        cfg.seed_object.bold(),
        summary.seed_steps
    );
    let replay = &summary.replay;
    println!(
        "    Replay            : {} published, {} suppressed, {} after halt{}",
        replay.published,
        replay.suppressed,
        replay.after_halt,
        if replay.interrupted { " (interrupted)".yellow().to_string() } else { String::new() }
    );
    println!("    Safety gate       : {}", gate);
    println!("    Elapsed           : {} ms", summary.elapsed.num_milliseconds());
    println!();
}
