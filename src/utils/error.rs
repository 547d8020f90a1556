//! Error taxonomy shared by both processes.
//!
//! - **ChannelError:** transient socket faults on the device side. Logged, command dropped, retried
//!   on the next qualifying tick.
//! - **ProtocolError:** unrecognised command text. Reported to the client, no state change.
//! - **DeviceError:** sensor/scale bring-up failure. Aborts startup.
//! - **EngineError:** physics capability failure. Ends the running simulation in `Error`.
//! - **TelemetryError:** sink failure. Retried a bounded number of times by the uploader.
//! - **ConfigError:** unreadable or malformed configuration file.

use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("could not resolve {0}")]
    Resolve(String),
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("send failed: {0}")]
    Send(#[from] io::Error),
    #[error("not connected")]
    NotConnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Comando no reconocido. Comandos válidos: START_TRACK_1, START_TRACK_2, START_TRACK_3, STOP_SIMULATION, STATUS"
)]
pub struct ProtocolError {
    pub received: String,
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("sensor initialisation failed: {0}")]
    Sensor(String),
    #[error("scale initialisation failed: {0}")]
    Scale(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("physics engine disconnected")]
    Disconnected,
    #[error("unknown body handle {0}")]
    UnknownBody(u32),
    #[error("engine backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry io: {0}")]
    Io(#[from] io::Error),
    #[error("telemetry encoding: {0}")]
    Csv(#[from] csv::Error),
    #[error("telemetry sink rejected record: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
