//! Per-run event recording for the simulation side.
//!
//! - **EventRecorder:** lock-free queue (16K capacity) drained by a background thread into a
//!   trajectory CSV (nanosecond timestamps relative to recorder creation).
//! - **RunSummary:** one line per finished run, appended by `export::append_run_summary`.
//!
//! Event tracing captures: run start → per-tick pose/control → waypoint reached → stall impulse → run end.

use std::{
    fs::File,
    io::{BufWriter, Write},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_queue::ArrayQueue;
use log::error;
use serde::Serialize;

/// Simulation lifecycle events. Each variant carries the tick index and a nanosecond timestamp.
#[derive(Debug, Clone)]
pub enum Event {
    RunStarted {
        track: u8,
        ts_ns: u64,
    },
    /// Pose read at tick start plus the control output applied this tick.
    Tick {
        tick: u64,
        ts_ns: u64,
        x: f64,
        y: f64,
        heading: f64,
        cursor: usize,
        force: f64,
        torque: f64,
    },
    WaypointReached {
        tick: u64,
        ts_ns: u64,
        index: usize,
    },
    StallImpulse {
        tick: u64,
        ts_ns: u64,
    },
    RunFinished {
        tick: u64,
        ts_ns: u64,
        outcome: &'static str,
    },
}

impl Event {
    /// CSV row: tick,event,ts_ns,x,y,heading,cursor,force,torque
    pub fn to_csv_row(&self) -> String {
        match self {
            Event::RunStarted { track, ts_ns } => {
                format!("0,RunStarted,{},,,,track={},,", ts_ns, track)
            }
            Event::Tick { tick, ts_ns, x, y, heading, cursor, force, torque } => {
                format!(
                    "{},Tick,{},{:.4},{:.4},{:.4},{},{:.3},{:.3}",
                    tick, ts_ns, x, y, heading, cursor, force, torque
                )
            }
            Event::WaypointReached { tick, ts_ns, index } => {
                format!("{},WaypointReached,{},,,,{},,", tick, ts_ns, index)
            }
            Event::StallImpulse { tick, ts_ns } => {
                format!("{},StallImpulse,{},,,,,,", tick, ts_ns)
            }
            Event::RunFinished { tick, ts_ns, outcome } => {
                format!("{},RunFinished,{},,,,{},,", tick, ts_ns, outcome)
            }
        }
    }
}

const EVENT_QUEUE_CAPACITY: usize = 16_384;

/// Non-blocking event recorder with background CSV export.
///
/// `record()` pushes to a lock-free queue and returns immediately; a full queue drops the event.
/// `close()` tells the exporter to drain what is left and exit.
#[derive(Clone)]
pub struct EventRecorder {
    queue: Arc<ArrayQueue<Event>>,
    closed: Arc<AtomicBool>,
    run_start: Instant,
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRecorder {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(EVENT_QUEUE_CAPACITY)),
            closed: Arc::new(AtomicBool::new(false)),
            run_start: Instant::now(),
        }
    }

    #[inline]
    pub fn record(&self, event: Event) {
        let _ = self.queue.push(event);
    }

    /// Nanosecond timestamp since recorder creation.
    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.run_start.elapsed().as_nanos() as u64
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Pops everything queued so far. Used when no exporter is attached.
    pub fn drain(&self) -> Vec<Event> {
        let mut out = Vec::with_capacity(self.queue.len());
        while let Some(event) = self.queue.pop() {
            out.push(event);
        }
        out
    }

    /// Spawns a thread draining the queue into `output_csv` until `close()` is called.
    pub fn start_exporter(&self, output_csv: String, track: u8) -> thread::JoinHandle<()> {
        let queue = self.queue.clone();
        let closed = self.closed.clone();

        thread::spawn(move || {
            let file = match File::create(&output_csv) {
                Ok(file) => file,
                Err(e) => {
                    error!("Failed to create trajectory CSV {}: {}", output_csv, e);
                    return;
                }
            };

            let mut writer = BufWriter::new(file);
            let _ = writeln!(writer, "# track={}", track);
            let _ = writeln!(writer, "tick,event,ts_ns,x,y,heading,cursor,force,torque");

            loop {
                match queue.pop() {
                    Some(event) => {
                        let _ = writeln!(writer, "{}", event.to_csv_row());
                    }
                    None => {
                        if closed.load(Ordering::Acquire) && queue.is_empty() {
                            break;
                        }
                        thread::sleep(Duration::from_millis(10));
                    }
                }
            }

            let _ = writer.flush();
        })
    }
}

/// Counters collected by one simulation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub track: u8,
    pub outcome: String,
    pub ticks: u64,
    pub waypoints_reached: usize,
    pub track_points: usize,
    pub stall_impulses: u64,
    pub elapsed_ms: u64,
    pub max_speed: f64,
}
