//! # Coin Track Simulation Server
//! Drives a simulated vehicle around one of three predefined tracks, either on request from the
//! coin device over TCP or by hand from the terminal.
//!
//! ## Modes
//! - **Manual:** pick a track from the menu; blocks until the run completes or times out.
//! - **TCP server:** listens for `START_TRACK_<n>`, `STOP_SIMULATION` and `STATUS` lines.
//!
//! ## Outputs
//! - `data/runs.csv`: one summary row per run.
//! - `data/logs/trajectory_track_N.csv`: per-tick pose and control of the latest run on track N.

use std::{
    io::{stdin, stdout, Write},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
    thread,
    time::Duration,
};

use clap::Parser;
use log::{error, info};

use coin_track::component_b::{
    engine::{Engine, KinematicEngine},
    protocol::Command,
    server::CommandServer,
    simulation::SimulationSettings,
    supervisor::{EngineFactory, Supervisor, SupervisorHandle, SupervisorOptions},
    track::TrackId,
};
use coin_track::utils::{
    config::{ServerConfig, load_or_default},
    error::EngineError,
};

const MANUAL_POLL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "coin_sim", about = "Track simulation server for the coin device")]
struct Cli {
    /// TOML file with server settings
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Physics/control rate
    #[arg(long)]
    tick_hz: Option<f64>,
    /// Skip the menu and serve TCP right away
    #[arg(long)]
    serve: bool,
    /// Skip the menu and run one track manually
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3))]
    track: Option<u8>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let mut config: ServerConfig = match load_or_default(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(hz) = cli.tick_hz {
        config.tick_hz = hz;
    }

    info!("=== COIN TRACK SIMULATION START ===");

    if cli.serve {
        return run_server(&config);
    }
    if let Some(track) = cli.track.and_then(TrackId::from_number) {
        return run_manual(&config, track);
    }

    loop {
        match prompt_menu().as_str() {
            "1" => {
                if let Some(track) = prompt_track() {
                    run_manual(&config, track);
                }
            }
            "2" | "" => {
                prompt_bind(&mut config);
                return run_server(&config);
            }
            "3" => {
                println!("Exiting. Goodbye!");
                info!("=== COIN TRACK SIMULATION FINISHED ===");
                return ExitCode::SUCCESS;
            }
            other => println!("Unrecognized option '{}', please try again.", other),
        }
    }
}

fn engine_factory() -> EngineFactory {
    Arc::new(|_track: TrackId| -> Result<Box<dyn Engine>, EngineError> { Ok(Box::new(KinematicEngine::default())) })
}

fn supervisor_options(config: &ServerConfig) -> SupervisorOptions {
    let mut simulation = SimulationSettings::from_hz(config.tick_hz);
    simulation.time_budget = config.time_budget_secs.map(Duration::from_secs);
    SupervisorOptions {
        simulation,
        data_dir: Some(PathBuf::from(&config.data_dir)),
        record_trajectory: config.record_trajectory,
    }
}

fn spawn_supervisor(config: &ServerConfig) -> Option<(SupervisorHandle, thread::JoinHandle<()>)> {
    match Supervisor::new(engine_factory(), supervisor_options(config)).spawn() {
        Ok(pair) => Some(pair),
        Err(e) => {
            error!("Could not start supervisor: {}", e);
            None
        }
    }
}

fn run_server(config: &ServerConfig) -> ExitCode {
    let Some((supervisor, supervisor_thread)) = spawn_supervisor(config) else {
        return ExitCode::FAILURE;
    };

    let server = match CommandServer::bind(&config.bind_addr(), supervisor.clone()) {
        Ok(server) => server,
        Err(e) => {
            error!("Could not listen on {}: {}", config.bind_addr(), e);
            supervisor.shutdown();
            let _ = supervisor_thread.join();
            return ExitCode::FAILURE;
        }
    };

    println!("Listening on {}. Commands: START_TRACK_1..3, STOP_SIMULATION, STATUS", server.local_addr());
    server.serve();
    let _ = supervisor_thread.join();
    info!("=== COIN TRACK SIMULATION FINISHED ===");
    ExitCode::SUCCESS
}

fn run_manual(config: &ServerConfig, track: TrackId) -> ExitCode {
    let Some((supervisor, supervisor_thread)) = spawn_supervisor(config) else {
        return ExitCode::FAILURE;
    };

    let response = supervisor.execute(Command::StartTrack(track));
    println!("{}", response);
    if response.is_ok() {
        while supervisor.is_active() {
            thread::sleep(MANUAL_POLL);
        }
        println!("Track {} finished. Summary appended to {}/runs.csv", track.number(), config.data_dir);
    }

    supervisor.shutdown();
    let _ = supervisor_thread.join();
    ExitCode::SUCCESS
}

fn prompt_menu() -> String {
    println!("\n┌─────────────────────────────────────────────┐");
    println!("│     SELECT MODE                             │");
    println!("├─────────────────────────────────────────────┤");
    println!("│  1) Manual run (pick a track)               │");
    println!("│  2) TCP server (wait for the coin device)   │");
    println!("│  3) Exit                                    │");
    println!("└─────────────────────────────────────────────┘");
    print!("Select [1/2/3] (default: 2): ");
    let _ = stdout().flush();

    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    input.trim().to_string()
}

fn prompt_track() -> Option<TrackId> {
    for id in TrackId::ALL {
        println!("  {}) {}", id.number(), id.label());
    }
    print!("Track [1/2/3]: ");
    let _ = stdout().flush();
    let mut input = String::new();
    let _ = stdin().read_line(&mut input);

    let track = input.trim().parse::<u8>().ok().and_then(TrackId::from_number);
    if track.is_none() {
        println!("Unknown track '{}'.", input.trim());
    }
    track
}

fn prompt_bind(config: &mut ServerConfig) {
    print!("Host [default: {}]: ", config.host);
    let _ = stdout().flush();
    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    if !input.trim().is_empty() {
        config.host = input.trim().to_string();
    }

    print!("Port [default: {}]: ", config.port);
    let _ = stdout().flush();
    input.clear();
    let _ = stdin().read_line(&mut input);
    if let Ok(port) = input.trim().parse::<u16>() {
        config.port = port;
    }
}
