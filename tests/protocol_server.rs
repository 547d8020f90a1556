use std::{
    io::{BufRead, BufReader, Write},
    net::TcpStream,
    sync::Arc,
    thread,
    time::Duration,
};

use coin_track::component_b::{
    engine::{Engine, KinematicEngine},
    server::{CommandServer, ServerHandle},
    simulation::SimulationSettings,
    supervisor::{EngineFactory, Supervisor, SupervisorOptions},
    track::TrackId,
};
use coin_track::utils::error::EngineError;

struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Self { stream, reader }
    }

    fn send(&mut self, text: &str) {
        self.stream.write_all(text.as_bytes()).unwrap();
    }

    fn line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        line.trim_end().to_string()
    }

    fn ask(&mut self, command: &str) -> String {
        self.send(&format!("{command}\n"));
        self.line()
    }
}

fn start_server() -> (ServerHandle, thread::JoinHandle<()>, thread::JoinHandle<()>) {
    let factory: EngineFactory =
        Arc::new(|_: TrackId| -> Result<Box<dyn Engine>, EngineError> { Ok(Box::new(KinematicEngine::default())) });
    let options = SupervisorOptions {
        simulation: SimulationSettings::from_hz(120.0),
        data_dir: None,
        record_trajectory: false,
    };
    let (supervisor, supervisor_thread) = Supervisor::new(factory, options).spawn().unwrap();
    let server = CommandServer::bind("127.0.0.1:0", supervisor).unwrap();
    let handle = server.handle();
    let server_thread = thread::spawn(move || server.serve());
    (handle, server_thread, supervisor_thread)
}

#[test]
fn status_and_unknown_commands() {
    let (handle, server_thread, supervisor_thread) = start_server();
    let mut client = Client::connect(handle.addr());

    assert_eq!(client.ask("status"), "OK: Servidor activo - Sin simulación");
    assert_eq!(
        client.ask("START_TRACK_9"),
        "ERROR: Comando no reconocido. Comandos válidos: START_TRACK_1, START_TRACK_2, START_TRACK_3, STOP_SIMULATION, STATUS"
    );
    assert_eq!(client.ask("STOP_SIMULATION"), "INFO: No hay simulación activa");

    drop(client);
    handle.shutdown();
    server_thread.join().unwrap();
    supervisor_thread.join().unwrap();
}

#[test]
fn start_status_stop_cycle() {
    let (handle, server_thread, supervisor_thread) = start_server();
    let mut client = Client::connect(handle.addr());

    assert_eq!(client.ask("START_TRACK_2"), "OK: Simulación iniciada - Pista en S (200 monedas)");
    assert_eq!(client.ask("STATUS"), "OK: Servidor activo - Simulación en ejecución");
    assert_eq!(client.ask("stop_simulation"), "OK: Simulación detenida");
    assert_eq!(client.ask("STATUS"), "OK: Servidor activo - Sin simulación");

    drop(client);
    handle.shutdown();
    server_thread.join().unwrap();
    supervisor_thread.join().unwrap();
}

#[test]
fn one_reply_per_command_in_a_single_write() {
    let (handle, server_thread, supervisor_thread) = start_server();
    let mut client = Client::connect(handle.addr());

    client.send("STATUS\r\nbogus\nSTATUS\n");
    assert_eq!(client.line(), "OK: Servidor activo - Sin simulación");
    assert!(client.line().starts_with("ERROR: Comando no reconocido"));
    assert_eq!(client.line(), "OK: Servidor activo - Sin simulación");

    drop(client);
    handle.shutdown();
    server_thread.join().unwrap();
    supervisor_thread.join().unwrap();
}

#[test]
fn command_split_across_writes_gets_one_reply() {
    let (handle, server_thread, supervisor_thread) = start_server();
    let mut client = Client::connect(handle.addr());
    assert_eq!(client.ask("STATUS"), "OK: Servidor activo - Sin simulación");

    client.send("STA");
    thread::sleep(Duration::from_millis(100));
    client.send("TUS\n");
    assert_eq!(client.line(), "OK: Servidor activo - Sin simulación");
    assert_eq!(client.ask("STOP_SIMULATION"), "INFO: No hay simulación activa");

    drop(client);
    handle.shutdown();
    server_thread.join().unwrap();
    supervisor_thread.join().unwrap();
}

#[test]
fn shutdown_stops_running_simulation() {
    let (handle, server_thread, supervisor_thread) = start_server();
    let mut client = Client::connect(handle.addr());
    assert!(client.ask("START_TRACK_1").starts_with("OK:"));

    handle.shutdown();
    server_thread.join().unwrap();
    // Joins only after the simulation thread was stopped and torn down.
    supervisor_thread.join().unwrap();
}
