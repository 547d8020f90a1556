//! protocol.rs
//! Text command protocol between the coin device and the simulation server.
//!
//! Requests are single words, case-insensitive and trimmed. Responses are one line prefixed
//! `OK:`, `ERROR:` or `INFO:`.

use std::{fmt, str::FromStr};

use crate::component_b::track::TrackId;
use crate::utils::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartTrack(TrackId),
    StopSimulation,
    Status,
}

impl Command {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let normalized = text.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "START_TRACK_1" => Ok(Command::StartTrack(TrackId::One)),
            "START_TRACK_2" => Ok(Command::StartTrack(TrackId::Two)),
            "START_TRACK_3" => Ok(Command::StartTrack(TrackId::Three)),
            "STOP_SIMULATION" => Ok(Command::StopSimulation),
            "STATUS" => Ok(Command::Status),
            _ => Err(ProtocolError { received: text.trim().to_string() }),
        }
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::parse(s)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::StartTrack(track) => write!(f, "START_TRACK_{}", track.number()),
            Command::StopSimulation => f.write_str("STOP_SIMULATION"),
            Command::Status => f.write_str("STATUS"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok(String),
    Error(String),
    Info(String),
}

impl Response {
    pub fn ok(msg: impl Into<String>) -> Self {
        Response::Ok(msg.into())
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Response::Error(msg.into())
    }

    pub fn info(msg: impl Into<String>) -> Self {
        Response::Info(msg.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok(_))
    }
}

impl From<ProtocolError> for Response {
    fn from(err: ProtocolError) -> Self {
        Response::Error(err.to_string())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok(msg) => write!(f, "OK: {}", msg),
            Response::Error(msg) => write!(f, "ERROR: {}", msg),
            Response::Info(msg) => write!(f, "INFO: {}", msg),
        }
    }
}

/// Splits one read from a socket into commands. A chunk without line breaks is one command.
pub fn split_commands(chunk: &str) -> impl Iterator<Item = &str> {
    chunk
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
}

/// Longest unterminated tail kept between reads before it is handled as a command anyway.
const MAX_PENDING: usize = 1024;

/// Rebuilds commands from the reads of one connection.
///
/// Until the peer sends its first line break every read is one command, for clients that write
/// bare commands. From then on an unterminated tail is held until the read that ends it.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: String,
    line_framed: bool,
}

impl LineFramer {
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        if !self.line_framed && !chunk.contains(['\n', '\r']) {
            return split_commands(chunk).map(str::to_owned).collect();
        }
        self.line_framed = true;
        self.pending.push_str(chunk);

        let cut = match self.pending.rfind(['\n', '\r']) {
            Some(idx) => idx + 1,
            None if self.pending.len() > MAX_PENDING => self.pending.len(),
            None => return Vec::new(),
        };
        let tail = self.pending.split_off(cut);
        let complete = std::mem::replace(&mut self.pending, tail);
        split_commands(&complete).map(str::to_owned).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive_and_trimmed() {
        assert_eq!(Command::parse("  status \n"), Ok(Command::Status));
        assert_eq!(Command::parse("start_track_2"), Ok(Command::StartTrack(TrackId::Two)));
        assert_eq!("Stop_Simulation".parse::<Command>(), Ok(Command::StopSimulation));
    }

    #[test]
    fn unknown_command_maps_to_error_line() {
        let err = Command::parse("START_TRACK_9").unwrap_err();
        assert_eq!(err.received, "START_TRACK_9");
        assert_eq!(
            Response::from(err).to_string(),
            "ERROR: Comando no reconocido. Comandos válidos: START_TRACK_1, START_TRACK_2, START_TRACK_3, STOP_SIMULATION, STATUS"
        );
    }

    #[test]
    fn display_matches_wire_form() {
        assert_eq!(Command::StartTrack(TrackId::Three).to_string(), "START_TRACK_3");
        assert_eq!(Response::info("No hay simulación activa").to_string(), "INFO: No hay simulación activa");
    }

    #[test]
    fn chunk_splitting() {
        let cmds: Vec<&str> = split_commands("STATUS\r\nstop_simulation\n\n").collect();
        assert_eq!(cmds, vec!["STATUS", "stop_simulation"]);
        assert_eq!(split_commands("START_TRACK_1").count(), 1);
    }

    #[test]
    fn framer_holds_tail_once_lines_are_used() {
        let mut framer = LineFramer::default();
        assert_eq!(framer.push("STATUS\nSTA"), vec!["STATUS"]);
        assert!(framer.push("RT_TRA").is_empty());
        assert_eq!(framer.push("CK_2\r\nstatus\n"), vec!["START_TRACK_2", "status"]);
    }

    #[test]
    fn framer_treats_bare_reads_as_commands() {
        let mut framer = LineFramer::default();
        assert_eq!(framer.push("STATUS"), vec!["STATUS"]);
        assert_eq!(framer.push(" stop_simulation "), vec!["stop_simulation"]);
        assert!(framer.push("\n").is_empty());
    }

    #[test]
    fn framer_flushes_oversized_tail() {
        let mut framer = LineFramer::default();
        assert!(framer.push("\n").is_empty());
        let junk = "x".repeat(MAX_PENDING + 1);
        assert_eq!(framer.push(&junk), vec![junk.clone()]);
        assert_eq!(framer.push("STATUS\n"), vec!["STATUS"]);
    }
}
