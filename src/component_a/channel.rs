//! channel.rs
//! Fire-and-forget command link from the device to the simulation server.
//! - one lazily (re)opened TCP connection, each command written as a single `\n`-terminated line
//! - a fault drops the connection and reports `false`; the next qualifying send reconnects
//! - only the start-up connect may wait the full connect timeout; reconnects from the device tick
//!   are capped at the I/O timeout
//! - server replies are drained without blocking and only logged

use std::{
    io::{ErrorKind, Read, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::{debug, info, warn};

use crate::component_b::protocol::Command;
use crate::utils::error::ChannelError;

/// Where dispatch decisions are delivered. Returns true only when the command went out.
pub trait CommandSink {
    fn send(&mut self, command: &Command) -> bool;

    fn close(&mut self) {}
}

pub struct CommandChannel {
    host: String,
    port: u16,
    connect_timeout: Duration,
    io_timeout: Duration,
    stream: Option<TcpStream>,
    sent: u64,
    failures: u64,
}

impl CommandChannel {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
            io_timeout,
            stream: None,
            sent: 0,
            failures: 0,
        }
    }

    /// Opens a connection right away instead of on the first send.
    pub fn connect(
        host: impl Into<String>,
        port: u16,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let mut channel = Self::new(host, port, connect_timeout, io_timeout);
        channel.ensure_connected(connect_timeout)?;
        Ok(channel)
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Failed sends plus connections found closed by the server.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Dial timeout for reconnects made while sending.
    pub fn reconnect_timeout(&self) -> Duration {
        self.connect_timeout.min(self.io_timeout)
    }

    fn resolve(&self) -> Result<Vec<SocketAddr>, ChannelError> {
        let target = format!("{}:{}", self.host, self.port);
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|_| ChannelError::Resolve(target.clone()))?
            .collect();
        if addrs.is_empty() {
            return Err(ChannelError::Resolve(target));
        }
        Ok(addrs)
    }

    fn ensure_connected(&mut self, dial_timeout: Duration) -> Result<&mut TcpStream, ChannelError> {
        if self.stream.is_none() {
            let mut last_err = None;
            for addr in self.resolve()? {
                match TcpStream::connect_timeout(&addr, dial_timeout) {
                    Ok(stream) => {
                        stream.set_write_timeout(Some(self.io_timeout))?;
                        stream.set_nodelay(true)?;
                        info!("[Channel] Connected to {}", addr);
                        self.stream = Some(stream);
                        break;
                    }
                    Err(source) => {
                        last_err = Some(ChannelError::Connect { addr: addr.to_string(), source });
                    }
                }
            }
            if let Some(err) = last_err.filter(|_| self.stream.is_none()) {
                return Err(err);
            }
        }
        self.stream.as_mut().ok_or(ChannelError::NotConnected)
    }

    /// Writes one command line. On any fault the connection is discarded.
    pub fn send_text(&mut self, text: &str) -> Result<(), ChannelError> {
        let line = format!("{}\n", text.trim());
        // A close seen here means the server dropped us since the last send.
        self.drain_replies();
        let dial_timeout = self.reconnect_timeout();
        let result = self
            .ensure_connected(dial_timeout)
            .and_then(|stream| {
                stream.write_all(line.as_bytes())?;
                stream.flush()?;
                Ok(())
            });

        match result {
            Ok(()) => {
                self.sent += 1;
                self.drain_replies();
                Ok(())
            }
            Err(e) => {
                self.failures += 1;
                self.stream = None;
                Err(e)
            }
        }
    }

    /// Logs whatever the server has replied so far without waiting for more.
    fn drain_replies(&mut self) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        if stream.set_nonblocking(true).is_err() {
            return;
        }

        let mut buf = [0u8; 1024];
        let mut peer_closed = false;
        loop {
            match stream.read(&mut buf) {
                Ok(0) => {
                    peer_closed = true;
                    break;
                }
                Ok(n) => {
                    for line in String::from_utf8_lossy(&buf[..n]).lines() {
                        debug!("[Channel] Server replied: {}", line);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!("[Channel] Reply read failed: {}", e);
                    peer_closed = true;
                    break;
                }
            }
        }

        if peer_closed || stream.set_nonblocking(false).is_err() {
            info!("[Channel] Server closed the connection");
            self.failures += 1;
            self.stream = None;
        }
    }
}

impl CommandSink for CommandChannel {
    fn send(&mut self, command: &Command) -> bool {
        match self.send_text(&command.to_string()) {
            Ok(()) => {
                info!("[Channel] Sent {}", command);
                true
            }
            Err(e) => {
                warn!("[Channel] Could not send {}: {}", command, e);
                false
            }
        }
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            info!("[Channel] Connection closed");
        }
    }
}
