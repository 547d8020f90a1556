//! Coin device process with simulated chutes.
//!
//! Samples three chute beams every tick, counts coins, sends `START_TRACK_<n>` to the simulation
//! server whenever a chute gains `dispatch_threshold` coins, and appends a telemetry row to CSV
//! every `telemetry_threshold` coins.

use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::Parser;
use log::{error, info, warn};

use coin_track::component_a::{
    channel::CommandChannel,
    device::DeviceLoop,
    sensor::{Chute, SimulatedChutes, SimulatedScale},
    telemetry::{CsvTelemetrySink, TelemetryUploader},
};
use coin_track::utils::config::{DeviceConfig, load_or_default};

/// Mass of one coin as seen by the simulated scale.
const COIN_GRAMS: f64 = 5.0;
/// Beam samples a falling coin stays visible for.
const PULSE_TICKS: u32 = 2;

#[derive(Parser, Debug)]
#[command(name = "coin_device", about = "Coin counting device (simulated sensors)")]
struct Cli {
    /// TOML file with device settings
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Per-tick probability of a coin in each chute
    #[arg(long, default_value_t = 0.05)]
    drop_rate: f64,
    #[arg(long)]
    seed: Option<u64>,
    /// Stop after this many ticks instead of running forever
    #[arg(long)]
    ticks: Option<u64>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let mut config: DeviceConfig = match load_or_default(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(host) = cli.host {
        config.server_host = host;
    }
    if let Some(port) = cli.port {
        config.server_port = port;
    }

    let seed = cli.seed.unwrap_or_else(rand::random);
    info!("[Device] seed {}", seed);
    let chutes = SimulatedChutes::new(seed, [cli.drop_rate; 3], PULSE_TICKS, config.inverted_logic);
    let scale = SimulatedScale::new(
        seed.wrapping_add(1),
        chutes.dropped_handle(Chute::One),
        COIN_GRAMS,
        config.scale_factor,
    );

    let channel = match CommandChannel::connect(
        config.server_host.clone(),
        config.server_port,
        config.connect_timeout(),
        config.send_timeout(),
    ) {
        Ok(channel) => channel,
        Err(e) => {
            warn!("[Device] Server not reachable yet ({}); will retry on dispatch", e);
            CommandChannel::new(
                config.server_host.clone(),
                config.server_port,
                config.connect_timeout(),
                config.send_timeout(),
            )
        }
    };

    let uploader = match CsvTelemetrySink::open(&config.telemetry_csv) {
        Ok(sink) => Some(TelemetryUploader::spawn(
            Box::new(sink),
            config.telemetry_attempts,
            Duration::from_millis(config.telemetry_retry_ms),
        )),
        Err(e) => {
            warn!("[Device] Telemetry disabled: {}", e);
            None
        }
    };

    let mut device = match DeviceLoop::new(config, chutes, scale, channel) {
        Ok(device) => device,
        Err(e) => {
            error!("[Device] Fatal: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(uploader) = uploader {
        device = device.with_uploader(uploader);
    }

    device.run(cli.ticks);

    let (tally, telemetry) = device.shutdown();
    info!("[Device] Final tally {:?} (global {})", tally.per_chute, tally.global);
    if let Some(stats) = telemetry {
        info!("[Device] Telemetry: {} uploaded, {} dropped", stats.uploaded, stats.dropped);
    }
    ExitCode::SUCCESS
}
