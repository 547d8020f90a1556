//! server.rs
//! TCP front end of the simulation process.
//! - one thread per client; every recognised or unrecognised command gets exactly one reply line
//! - command handling is delegated to the supervisor actor
//! - shutting the server down also tears down the running simulation

use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use log::{debug, error, info, warn};
use socket2::{Domain, SockAddr, Socket, Type};

use crate::component_b::{
    protocol::{Command, LineFramer, Response},
    supervisor::SupervisorHandle,
};

const READ_CHUNK: usize = 1024;
const BACKLOG: i32 = 5;

/// Parses one command line and runs it; unknown text becomes an `ERROR:` reply.
pub fn respond(text: &str, supervisor: &SupervisorHandle) -> Response {
    match Command::parse(text) {
        Ok(command) => supervisor.execute(command),
        Err(e) => {
            warn!("[Server] Unrecognised command {:?}", e.received);
            e.into()
        }
    }
}

pub struct CommandServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    supervisor: SupervisorHandle,
    running: Arc<AtomicBool>,
}

/// Stops a serving `CommandServer` from another thread.
#[derive(Clone)]
pub struct ServerHandle {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            // Wake the blocking accept.
            let _ = TcpStream::connect(self.addr);
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl CommandServer {
    pub fn bind(addr: &str, supervisor: SupervisorHandle) -> io::Result<Self> {
        let addr = addr
            .to_socket_addrs()?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, format!("no IPv4 address for {addr}")))?;

        let socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(addr))?;
        socket.listen(BACKLOG)?;

        let listener: TcpListener = socket.into();
        let local_addr = listener.local_addr()?;
        info!("[Server] Listening on {}", local_addr);

        Ok(Self { listener, local_addr, supervisor, running: Arc::new(AtomicBool::new(true)) })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        let addr = match self.local_addr {
            SocketAddr::V4(v4) if v4.ip().is_unspecified() => SocketAddr::from(([127, 0, 0, 1], v4.port())),
            other => other,
        };
        ServerHandle { addr, running: self.running.clone() }
    }

    /// Accepts clients until `ServerHandle::shutdown`, then stops the simulation.
    pub fn serve(self) {
        for stream in self.listener.incoming() {
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            match stream {
                Ok(stream) => {
                    let supervisor = self.supervisor.clone();
                    let spawned = thread::Builder::new()
                        .name("sim_client".into())
                        .spawn(move || handle_client(stream, supervisor));
                    if let Err(e) = spawned {
                        error!("[Server] Could not spawn client thread: {}", e);
                    }
                }
                Err(e) => error!("[Server] Accept failed: {}", e),
            }
        }

        info!("[Server] Shutting down");
        self.supervisor.shutdown();
    }
}

fn handle_client(mut stream: TcpStream, supervisor: SupervisorHandle) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".into());
    info!("[Server] Client connected: {}", peer);

    let mut buf = [0u8; READ_CHUNK];
    let mut framer = LineFramer::default();
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("[Server] Read from {} failed: {}", peer, e);
                break;
            }
        };

        let chunk = String::from_utf8_lossy(&buf[..n]);
        for line in framer.push(&chunk) {
            info!("[Server] {} -> {}", peer, line);
            let response = respond(&line, &supervisor);
            if let Err(e) = writeln!(stream, "{}", response) {
                debug!("[Server] Reply to {} failed: {}", peer, e);
                return;
            }
        }
    }

    info!("[Server] Client disconnected: {}", peer);
}
