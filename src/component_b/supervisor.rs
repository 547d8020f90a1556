//! supervisor.rs
//! Owns the one simulation that may exist at a time.
//!
//! - Runs as an actor thread; connection handlers talk to it through a crossbeam channel and a
//!   one-shot reply channel, so "at most one active simulation" needs no lock.
//! - Starting a track first stops and joins whatever is running.
//! - Each run gets its own high-priority thread; its summary is exported when the run ends.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Receiver, Sender, bounded, unbounded};
use log::{debug, error, info, warn};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::component_b::{
    engine::Engine,
    protocol::{Command, Response},
    simulation::{SimulationLoop, SimulationSettings},
    track::{Track, TrackId},
};
use crate::utils::{
    error::EngineError,
    export::{export_run, trajectory_path},
    metrics::{EventRecorder, RunSummary},
};

/// Builds a fresh engine connection for each run.
pub type EngineFactory = Arc<dyn Fn(TrackId) -> Result<Box<dyn Engine>, EngineError> + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct SupervisorOptions {
    pub simulation: SimulationSettings,
    /// Where run summaries and trajectories go; `None` disables all file output.
    pub data_dir: Option<PathBuf>,
    pub record_trajectory: bool,
}

enum Request {
    Execute(Command, Sender<Response>),
    IsActive(Sender<bool>),
    Shutdown(Sender<()>),
}

struct ActiveRun {
    track: TrackId,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<RunSummary>,
}

impl ActiveRun {
    fn join(self) -> Option<RunSummary> {
        match self.handle.join() {
            Ok(summary) => Some(summary),
            Err(_) => {
                error!("[Supervisor] Simulation thread for track {} panicked", self.track.number());
                None
            }
        }
    }
}

/// Cloneable front door to the supervisor thread.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: Sender<Request>,
}

impl SupervisorHandle {
    pub fn execute(&self, command: Command) -> Response {
        let (reply_tx, reply_rx) = bounded(1);
        if self.tx.send(Request::Execute(command, reply_tx)).is_err() {
            return Response::error("Servidor detenido");
        }
        reply_rx.recv().unwrap_or_else(|_| Response::error("Servidor detenido"))
    }

    /// True while a simulation thread is still running.
    pub fn is_active(&self) -> bool {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx.send(Request::IsActive(reply_tx)).is_ok() && reply_rx.recv().unwrap_or(false)
    }

    /// Stops any running simulation and ends the supervisor. Returns once teardown is done.
    pub fn shutdown(&self) {
        let (ack_tx, ack_rx) = bounded(1);
        if self.tx.send(Request::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

pub struct Supervisor {
    factory: EngineFactory,
    options: SupervisorOptions,
    active: Option<ActiveRun>,
}

impl Supervisor {
    pub fn new(factory: EngineFactory, options: SupervisorOptions) -> Self {
        Self { factory, options, active: None }
    }

    /// Moves the supervisor onto its own thread.
    pub fn spawn(self) -> std::io::Result<(SupervisorHandle, JoinHandle<()>)> {
        let (tx, rx) = unbounded();
        let handle = thread::Builder::new()
            .name("sim_supervisor".into())
            .spawn(move || self.run(rx))?;
        Ok((SupervisorHandle { tx }, handle))
    }

    fn run(mut self, rx: Receiver<Request>) {
        while let Ok(request) = rx.recv() {
            match request {
                Request::Execute(command, reply) => {
                    let response = self.handle(command);
                    let _ = reply.send(response);
                }
                Request::IsActive(reply) => {
                    self.reap_finished();
                    let _ = reply.send(self.active.is_some());
                }
                Request::Shutdown(ack) => {
                    self.stop_active();
                    let _ = ack.send(());
                    break;
                }
            }
        }
        // All handles dropped without an explicit shutdown.
        self.stop_active();
        info!("[Supervisor] Stopped");
    }

    pub fn handle(&mut self, command: Command) -> Response {
        debug!("[Supervisor] {}", command);
        match command {
            Command::StartTrack(track) => self.start(track),
            Command::StopSimulation => self.stop(),
            Command::Status => self.status(),
        }
    }

    fn start(&mut self, track: TrackId) -> Response {
        if let Some(previous) = self.stop_active() {
            info!("[Supervisor] Replaced run on track {} ({})", previous.track, previous.outcome);
        }

        let engine = match (self.factory)(track) {
            Ok(engine) => engine,
            Err(e) => {
                error!("[Supervisor] Engine unavailable for track {}: {}", track.number(), e);
                return Response::error(format!("No se pudo iniciar la simulación - {}", e));
            }
        };

        let mut sim = SimulationLoop::new(Track::predefined(track), engine, self.options.simulation);
        let mut exporter = None;
        if let (Some(dir), true) = (&self.options.data_dir, self.options.record_trajectory) {
            match trajectory_path(dir, track.number()) {
                Ok(path) => {
                    let recorder = EventRecorder::new();
                    exporter = Some(recorder.start_exporter(path.to_string_lossy().into_owned(), track.number()));
                    sim = sim.with_recorder(recorder);
                }
                Err(e) => warn!("[Supervisor] Trajectory disabled: {}", e),
            }
        }

        let stop = sim.stop_handle();
        let data_dir = self.options.data_dir.clone();
        let spawned = thread::Builder::new()
            .name(format!("simulation_track_{}", track.number()))
            .spawn_with_priority(ThreadPriority::Max, move |priority| {
                if let Err(e) = priority {
                    debug!("[Simulation] Running at default priority: {:?}", e);
                }
                let summary = sim.run();
                if let Some(exporter) = exporter {
                    let _ = exporter.join();
                }
                if let Some(dir) = data_dir {
                    export_run(&dir, &summary);
                }
                summary
            });

        match spawned {
            Ok(handle) => {
                self.active = Some(ActiveRun { track, stop, handle });
                info!("[Supervisor] Track {} started", track.number());
                Response::ok(format!("Simulación iniciada - Pista {}", track.label()))
            }
            Err(e) => {
                error!("[Supervisor] Could not spawn simulation thread: {}", e);
                Response::error(format!("No se pudo iniciar la simulación - {}", e))
            }
        }
    }

    fn stop(&mut self) -> Response {
        self.reap_finished();
        match self.stop_active() {
            Some(_) => Response::ok("Simulación detenida"),
            None => Response::info("No hay simulación activa"),
        }
    }

    fn status(&mut self) -> Response {
        self.reap_finished();
        if self.active.is_some() {
            Response::ok("Servidor activo - Simulación en ejecución")
        } else {
            Response::ok("Servidor activo - Sin simulación")
        }
    }

    /// Forgets a run whose thread has already ended on its own.
    fn reap_finished(&mut self) {
        if self.active.as_ref().is_some_and(|run| run.handle.is_finished()) {
            if let Some(summary) = self.active.take().and_then(ActiveRun::join) {
                debug!("[Supervisor] Track {} had ended: {}", summary.track, summary.outcome);
            }
        }
    }

    /// Signals the active run to stop and waits for its teardown.
    fn stop_active(&mut self) -> Option<RunSummary> {
        let run = self.active.take()?;
        run.stop.store(true, Ordering::Release);
        run.join()
    }
}
