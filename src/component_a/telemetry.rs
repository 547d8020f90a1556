//! telemetry.rs
//! Periodic device snapshots pushed to a remote-style sink.
//!
//! - `TelemetryPolicy` gates records on the global tally (every `threshold` coins).
//! - `TelemetryUploader` owns the sink on a background thread so a slow or failing sink never
//!   stalls the sensing tick. Each record is retried a bounded number of times, then dropped.
//! - `CsvTelemetrySink` appends records to a local CSV file.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

use crossbeam::channel::{Sender, TrySendError, bounded};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;

use crate::component_a::{counter::TallySnapshot, sensor::Chute, watermark::Watermark};
use crate::utils::error::TelemetryError;

const UPLOAD_QUEUE: usize = 64;

/// Wall-clock stamp in the device's local time, `YYYY-MM-DD HH:MM:SS`.
pub fn timestamp_now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub timestamp: String,
    pub global_count: u64,
    pub chute1_count: u64,
    pub chute2_count: u64,
    pub chute3_count: u64,
    pub chute1_weight: f64,
    pub chute2_weight: f64,
    pub chute3_weight: f64,
    /// Always 0: sensor faults are logged, not counted.
    pub error_count: u32,
    /// Track number of the last delivered dispatch this tick, 0 if none.
    pub car_position: u8,
    pub car_moving: bool,
}

impl TelemetryRecord {
    /// Only chute 1 has a load cell; the other weights are reported as 0.
    pub fn from_tally(tally: &TallySnapshot, chute1_weight: f64, dispatched: Option<Chute>) -> Self {
        Self {
            timestamp: timestamp_now(),
            global_count: tally.global,
            chute1_count: tally.per_chute[0],
            chute2_count: tally.per_chute[1],
            chute3_count: tally.per_chute[2],
            chute1_weight,
            chute2_weight: 0.0,
            chute3_weight: 0.0,
            error_count: 0,
            car_position: dispatched.map(|c| c.number()).unwrap_or(0),
            car_moving: dispatched.is_some(),
        }
    }
}

pub trait TelemetrySink: Send {
    fn upload(&mut self, record: &TelemetryRecord) -> Result<(), TelemetryError>;
}

pub struct CsvTelemetrySink {
    path: PathBuf,
    writer: csv::Writer<fs::File>,
}

impl CsvTelemetrySink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let fresh = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let writer = csv::WriterBuilder::new().has_headers(fresh).from_writer(file);
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TelemetrySink for CsvTelemetrySink {
    fn upload(&mut self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub uploaded: u64,
    pub dropped: u64,
    pub retries: u64,
}

pub struct TelemetryUploader {
    tx: Option<Sender<TelemetryRecord>>,
    stats: Arc<Mutex<UploadStats>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TelemetryUploader {
    pub fn spawn(mut sink: Box<dyn TelemetrySink>, attempts: u32, retry_pause: Duration) -> Self {
        let (tx, rx) = bounded::<TelemetryRecord>(UPLOAD_QUEUE);
        let stats = Arc::new(Mutex::new(UploadStats::default()));
        let shared = stats.clone();
        let attempts = attempts.max(1);

        let handle = thread::Builder::new()
            .name("telemetry_uploader".into())
            .spawn(move || {
                while let Ok(record) = rx.recv() {
                    let mut delivered = false;
                    for attempt in 1..=attempts {
                        match sink.upload(&record) {
                            Ok(()) => {
                                delivered = true;
                                break;
                            }
                            Err(e) => {
                                warn!("[Telemetry] Upload attempt {}/{} failed: {}", attempt, attempts, e);
                                if attempt < attempts {
                                    shared.lock().retries += 1;
                                    thread::sleep(retry_pause);
                                }
                            }
                        }
                    }

                    let mut s = shared.lock();
                    if delivered {
                        s.uploaded += 1;
                        info!("[Telemetry] Record at global count {} uploaded", record.global_count);
                    } else {
                        s.dropped += 1;
                        error!("[Telemetry] Record at global count {} dropped", record.global_count);
                    }
                }
                debug!("[Telemetry] Uploader exiting");
            })
            .ok();

        if handle.is_none() {
            error!("[Telemetry] Could not start uploader thread, records will be dropped");
        }

        Self { tx: Some(tx), stats, handle }
    }

    /// Queues a record without blocking. False when the queue is full or the uploader is gone.
    pub fn submit(&self, record: TelemetryRecord) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("[Telemetry] Upload queue full, record skipped");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn stats(&self) -> UploadStats {
        *self.stats.lock()
    }

    /// Flushes queued records and stops the background thread.
    pub fn finish(mut self) -> UploadStats {
        self.shutdown();
        self.stats()
    }

    fn shutdown(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("[Telemetry] Uploader thread panicked");
            }
        }
    }
}

impl Drop for TelemetryUploader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Emits a record every `threshold` global coins.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryPolicy {
    mark: Watermark,
}

impl TelemetryPolicy {
    pub fn new(threshold: u64) -> Self {
        Self { mark: Watermark::new(threshold) }
    }

    pub fn is_due(&self, global: u64) -> bool {
        self.mark.is_due(global)
    }

    pub fn confirm(&mut self, global: u64) {
        self.mark.advance(global);
    }

    pub fn watermark(&self) -> u64 {
        self.mark.mark()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakySink {
        fail_first: u32,
        calls: Arc<Mutex<u32>>,
        accepted: Arc<Mutex<Vec<TelemetryRecord>>>,
    }

    impl TelemetrySink for FlakySink {
        fn upload(&mut self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
            let mut calls = self.calls.lock();
            *calls += 1;
            if *calls <= self.fail_first {
                return Err(TelemetryError::Rejected("offline".into()));
            }
            self.accepted.lock().push(record.clone());
            Ok(())
        }
    }

    fn record(global: u64) -> TelemetryRecord {
        let tally = TallySnapshot { per_chute: [global, 0, 0], global };
        TelemetryRecord::from_tally(&tally, 12.5, Some(Chute::One))
    }

    #[test]
    fn retries_then_delivers() {
        let accepted = Arc::new(Mutex::new(Vec::new()));
        let sink = FlakySink { fail_first: 2, calls: Arc::default(), accepted: accepted.clone() };

        let uploader = TelemetryUploader::spawn(Box::new(sink), 3, Duration::from_millis(1));
        assert!(uploader.submit(record(5)));
        let stats = uploader.finish();

        assert_eq!(stats, UploadStats { uploaded: 1, dropped: 0, retries: 2 });
        assert_eq!(accepted.lock()[0].global_count, 5);
    }

    #[test]
    fn gives_up_after_bounded_attempts() {
        let calls = Arc::new(Mutex::new(0));
        let sink = FlakySink { fail_first: u32::MAX, calls: calls.clone(), accepted: Arc::default() };

        let uploader = TelemetryUploader::spawn(Box::new(sink), 3, Duration::from_millis(1));
        uploader.submit(record(5));
        let stats = uploader.finish();

        assert_eq!(stats.dropped, 1);
        assert_eq!(*calls.lock(), 3);
    }

    #[test]
    fn record_fields() {
        let r = record(10);
        assert_eq!(r.car_position, 1);
        assert!(r.car_moving);
        assert_eq!(r.error_count, 0);
        assert_eq!(r.timestamp.len(), "2024-01-01 00:00:00".len());
    }

    #[test]
    fn csv_sink_writes_header_once() {
        let dir = std::env::temp_dir().join(format!("coin_track_telemetry_{}", std::process::id()));
        let path = dir.join("telemetry.csv");
        let _ = fs::remove_file(&path);

        CsvTelemetrySink::open(&path).unwrap().upload(&record(5)).unwrap();
        CsvTelemetrySink::open(&path).unwrap().upload(&record(10)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("timestamp,global_count"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn policy_fires_every_threshold() {
        let mut policy = TelemetryPolicy::new(5);
        assert!(!policy.is_due(4));
        assert!(policy.is_due(5));
        policy.confirm(5);
        assert!(!policy.is_due(9));
        assert!(policy.is_due(10));
    }
}
