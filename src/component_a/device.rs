//! device.rs
//! Sensing/dispatch loop of the coin device.
//!
//! Every tick (100 ms by default):
//! - sample the three chute beams and count coin edges
//! - every `weight_read_every` ticks, read chute 1's scale (3-sample average)
//! - send at most one `START_TRACK_<c>` command, moving that chute's watermark only on success
//! - queue a telemetry record each time the global tally crosses the next threshold
//!
//! A faulted tick is logged and followed by a longer back-off; the loop keeps going.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use log::{debug, error, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};

use crate::component_a::{
    channel::CommandSink,
    counter::{CoinCounter, TallySnapshot},
    dispatch::DispatchPolicy,
    edge::SensorChannel,
    sensor::{Chute, ChuteSensors, WeightScale},
    telemetry::{TelemetryPolicy, TelemetryRecord, TelemetryUploader, UploadStats},
};
use crate::utils::{config::DeviceConfig, error::DeviceError};

const TARE_SAMPLES: u32 = 10;
const WEIGHT_SAMPLES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub tally: TallySnapshot,
    pub weight_grams: f64,
    pub dispatched: Option<Chute>,
    pub telemetry_queued: bool,
}

pub struct DeviceLoop<S, W, C> {
    config: DeviceConfig,
    sensors: S,
    scale: W,
    channel: C,
    beams: [SensorChannel; 3],
    counter: CoinCounter,
    dispatch: DispatchPolicy,
    telemetry: TelemetryPolicy,
    uploader: Option<TelemetryUploader>,
    weight_grams: f64,
    tick: u64,
    faults: u64,
    running: Arc<AtomicBool>,
}

impl<S, W, C> DeviceLoop<S, W, C>
where
    S: ChuteSensors,
    W: WeightScale,
    C: CommandSink,
{
    /// Tares the scale and latches the initial beam levels. Either failing aborts start-up.
    pub fn new(config: DeviceConfig, mut sensors: S, mut scale: W, channel: C) -> Result<Self, DeviceError> {
        scale.tare(TARE_SAMPLES)?;
        info!("[Device] Scale tared");

        let levels = sensors.read_levels()?;
        let beams = Chute::ALL.map(|c| SensorChannel::new(c, levels[c.index()], config.inverted_logic));

        Ok(Self {
            dispatch: DispatchPolicy::new(config.dispatch_threshold),
            telemetry: TelemetryPolicy::new(config.telemetry_threshold),
            config,
            sensors,
            scale,
            channel,
            beams,
            counter: CoinCounter::new(),
            uploader: None,
            weight_grams: 0.0,
            tick: 0,
            faults: 0,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn with_uploader(mut self, uploader: TelemetryUploader) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Clearing the flag ends `run` after the current tick.
    pub fn running_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn tally(&self) -> TallySnapshot {
        self.counter.snapshot()
    }

    pub fn dispatch_policy(&self) -> &DispatchPolicy {
        &self.dispatch
    }

    pub fn faults(&self) -> u64 {
        self.faults
    }

    /// One sensing/dispatch tick.
    pub fn step(&mut self) -> Result<TickReport, DeviceError> {
        let every = self.config.weight_read_every.max(1);
        if self.tick % every == 0 {
            self.weight_grams = match self.scale.read_grams(WEIGHT_SAMPLES) {
                Ok(grams) => grams,
                Err(e) => {
                    warn!("[Device] Weight read failed: {}", e);
                    0.0
                }
            };
        }
        self.tick += 1;

        let levels = self.sensors.read_levels()?;
        for beam in self.beams.iter_mut() {
            let chute = beam.chute();
            if beam.sample(levels[chute.index()]) {
                self.counter.on_edge(chute);
                debug!("[Device] Coin in chute {}", chute.number());
            }
        }

        let tally = self.counter.snapshot();
        debug!(
            "[Device] tick {} | chutes {:?} | global {} | weight {:.1} g",
            self.tick, tally.per_chute, tally.global, self.weight_grams
        );

        let mut dispatched = None;
        if let Some(decision) = self.dispatch.decide(&tally) {
            if self.channel.send(&decision.command) {
                self.dispatch.confirm(&decision);
                dispatched = Some(decision.chute);
                info!(
                    "[Device] Chute {} reached {} coins, {} sent",
                    decision.chute.number(),
                    decision.tally,
                    decision.command
                );
            }
        }

        let mut telemetry_queued = false;
        if self.telemetry.is_due(tally.global) {
            if let Some(uploader) = &self.uploader {
                let record = TelemetryRecord::from_tally(&tally, self.weight_grams, dispatched);
                if uploader.submit(record) {
                    self.telemetry.confirm(tally.global);
                    telemetry_queued = true;
                }
            }
        }

        Ok(TickReport { tally, weight_grams: self.weight_grams, dispatched, telemetry_queued })
    }

    /// Ticks until the running flag is cleared or `max_ticks` have elapsed.
    pub fn run(&mut self, max_ticks: Option<u64>) {
        let tick = self.config.tick();
        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        let mut next_deadline = Instant::now() + tick;
        let mut done = 0u64;

        info!("[Device] Sensing loop started, tick {:?}", tick);
        while self.running.load(Ordering::Relaxed) && max_ticks.is_none_or(|max| done < max) {
            done += 1;
            match self.step() {
                Ok(_) => {
                    let now = Instant::now();
                    if now < next_deadline {
                        sleeper.sleep(next_deadline - now);
                        next_deadline += tick;
                    } else {
                        next_deadline = now + tick;
                    }
                }
                Err(e) => {
                    self.faults += 1;
                    error!("[Device] Tick failed: {}", e);
                    sleeper.sleep(self.config.backoff());
                    next_deadline = Instant::now() + tick;
                }
            }
        }
        info!("[Device] Sensing loop stopped after {} ticks", done);
    }

    /// Closes the command link and flushes pending telemetry.
    pub fn shutdown(mut self) -> (TallySnapshot, Option<UploadStats>) {
        self.channel.close();
        let stats = self.uploader.take().map(TelemetryUploader::finish);
        (self.counter.snapshot(), stats)
    }
}
