//! simulation.rs
//! One track run: Idle → Running → {Completed, TimedOut, UserStopped, Error}.
//!
//! Per tick: read pose → advance waypoint cursor → stall check → pursuit control (+ governor) →
//! physics step → sleep to hold the tick rate → lap/timeout check.
//! Stop requests are polled at the top of every tick, so a stop lands within one tick.
//! Whatever the outcome, the engine is disconnected exactly once.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};

use crate::component_b::{
    engine::{BodyHandle, Engine, Pose},
    lap::LapMonitor,
    pursuit::PursuitController,
    recovery::StuckRecovery,
    track::{Point2, Track},
    tracker::WaypointTracker,
};
use crate::utils::error::EngineError;
use crate::utils::metrics::{Event, EventRecorder, RunSummary};

/// Resting height of a freshly spawned body.
const SPAWN_HEIGHT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    TimedOut,
    UserStopped,
    Error,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Idle | RunState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "Idle",
            RunState::Running => "Running",
            RunState::Completed => "Completed",
            RunState::TimedOut => "TimedOut",
            RunState::UserStopped => "UserStopped",
            RunState::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationSettings {
    /// Zero disables pacing (tests, offline runs).
    pub tick: Duration,
    /// Replaces the track's own budget when set.
    pub time_budget: Option<Duration>,
}

impl SimulationSettings {
    pub fn from_hz(hz: f64) -> Self {
        let tick = if hz > 0.0 { Duration::from_secs_f64(1.0 / hz) } else { Duration::ZERO };
        Self { tick, time_budget: None }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self::from_hz(60.0)
    }
}

pub struct SimulationLoop {
    engine: Box<dyn Engine>,
    body: Option<BodyHandle>,
    tracker: WaypointTracker,
    controller: PursuitController,
    recovery: StuckRecovery,
    lap: LapMonitor,
    settings: SimulationSettings,
    stop: Arc<AtomicBool>,
    recorder: Option<EventRecorder>,
    state: RunState,
    torn_down: bool,
    ticks: u64,
    last_position: Option<Point2>,
    max_speed: f64,
}

impl SimulationLoop {
    pub fn new(track: Track, engine: Box<dyn Engine>, settings: SimulationSettings) -> Self {
        let start = track.start();
        Self {
            engine,
            body: None,
            tracker: WaypointTracker::new(track),
            controller: PursuitController::default(),
            recovery: StuckRecovery::new(start),
            lap: LapMonitor::default(),
            settings,
            stop: Arc::new(AtomicBool::new(false)),
            recorder: None,
            state: RunState::Idle,
            torn_down: false,
            ticks: 0,
            last_position: None,
            max_speed: 0.0,
        }
    }

    pub fn with_recorder(mut self, recorder: EventRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Flag polled once per tick; setting it ends the run as `UserStopped`.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn record(&self, event: Event) {
        if let Some(rec) = &self.recorder {
            rec.record(event);
        }
    }

    fn now_ns(&self) -> u64 {
        self.recorder.as_ref().map(|r| r.now_ns()).unwrap_or(0)
    }

    /// Runs to a terminal state and returns the run summary.
    pub fn run(mut self) -> RunSummary {
        let track_id = self.tracker.track().id();
        let started = Instant::now();
        let budget = self.settings.time_budget.unwrap_or_else(|| track_id.time_budget());

        let start = self.tracker.track().start();
        match self.engine.create_body(Pose::new(start.x, start.y, SPAWN_HEIGHT, 0.0)) {
            Ok(body) => self.body = Some(body),
            Err(e) => {
                error!("[Simulation] Could not create body: {}", e);
                self.state = RunState::Error;
                return self.finish(started);
            }
        }

        self.state = RunState::Running;
        info!(
            "[Simulation] Track {} ({}) running, {} waypoints, budget {:?}",
            track_id.number(),
            track_id.name(),
            self.tracker.track().points().len(),
            budget
        );
        self.record(Event::RunStarted { track: track_id.number(), ts_ns: self.now_ns() });

        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        let mut next_deadline = Instant::now() + self.settings.tick;

        let outcome = loop {
            match self.tick(started, budget) {
                Ok(Some(terminal)) => break terminal,
                Ok(None) => {}
                Err(e) => {
                    error!("[Simulation] Engine failure on tick {}: {}", self.ticks, e);
                    break RunState::Error;
                }
            }

            if !self.settings.tick.is_zero() {
                let now = Instant::now();
                if now < next_deadline {
                    sleeper.sleep(next_deadline - now);
                    next_deadline += self.settings.tick;
                } else {
                    // Overran: resync instead of bursting to catch up.
                    debug!("[Simulation] tick {} overran by {:?}", self.ticks, now - next_deadline);
                    next_deadline = now + self.settings.tick;
                }
            }

            if let Some(terminal) = self.check_end(started, budget) {
                break terminal;
            }
        };

        self.state = outcome;
        self.finish(started)
    }

    /// Body of one tick up to and including the physics step.
    fn tick(&mut self, started: Instant, budget: Duration) -> Result<Option<RunState>, EngineError> {
        if self.stop.load(Ordering::Acquire) || self.engine.quit_requested() {
            info!("[Simulation] Stop requested");
            return Ok(Some(RunState::UserStopped));
        }
        if started.elapsed() > budget {
            info!("[Simulation] Time budget exhausted");
            return Ok(Some(RunState::TimedOut));
        }

        let body = self.body.ok_or(EngineError::Disconnected)?;
        let pose = self.engine.pose(body)?;
        let position = Point2::new(pose.position.x, pose.position.y);

        let before = self.tracker.cursor();
        let target = self.tracker.update(position);
        if self.tracker.cursor() != before {
            debug!("[Simulation] Advancing to point {}: ({}, {})", self.tracker.cursor(), target.x, target.y);
            self.record(Event::WaypointReached {
                tick: self.ticks,
                ts_ns: self.now_ns(),
                index: before,
            });
        }

        if self.recovery.check(self.engine.as_mut(), body, position)? {
            warn!("[Simulation] Body looks stuck at ({:.2}, {:.2}), applying impulse", position.x, position.y);
            self.record(Event::StallImpulse { tick: self.ticks, ts_ns: self.now_ns() });
        }

        let control = self.controller.drive(self.engine.as_mut(), body, &pose, target)?;
        self.max_speed = self.max_speed.max(self.engine.velocity(body)?.planar_norm());

        self.record(Event::Tick {
            tick: self.ticks,
            ts_ns: self.now_ns(),
            x: position.x,
            y: position.y,
            heading: pose.heading,
            cursor: self.tracker.cursor(),
            force: control.forward_force,
            torque: control.steering_torque,
        });

        self.engine.step()?;
        self.ticks += 1;
        self.last_position = Some(position);
        Ok(None)
    }

    /// Lap and timeout check, evaluated against the pose read at the start of the tick.
    fn check_end(&self, started: Instant, budget: Duration) -> Option<RunState> {
        if let Some(position) = self.last_position {
            if let Some(kind) = self.lap.evaluate(self.tracker.track(), self.tracker.cursor(), position) {
                info!(
                    "[Simulation] Track complete ({:?}), waypoints visited {}/{}",
                    kind,
                    self.tracker.cursor(),
                    self.tracker.track().points().len()
                );
                return Some(RunState::Completed);
            }
        }
        if started.elapsed() > budget {
            info!("[Simulation] Time budget exhausted");
            return Some(RunState::TimedOut);
        }
        None
    }

    fn finish(&mut self, started: Instant) -> RunSummary {
        self.teardown();

        let track = self.tracker.track();
        self.record(Event::RunFinished {
            tick: self.ticks,
            ts_ns: self.now_ns(),
            outcome: self.state.as_str(),
        });
        if let Some(rec) = &self.recorder {
            rec.close();
        }

        info!("[Simulation] Track {} finished: {}", track.id().number(), self.state.as_str());

        RunSummary {
            track: track.id().number(),
            outcome: self.state.as_str().to_string(),
            ticks: self.ticks,
            waypoints_reached: self.tracker.cursor(),
            track_points: track.points().len(),
            stall_impulses: self.recovery.impulses(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            max_speed: self.max_speed,
        }
    }

    /// Disconnects the engine; later calls are no-ops.
    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.engine.disconnect();
        debug!("[Simulation] Engine disconnected");
    }
}

impl Drop for SimulationLoop {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component_b::engine::{Frame, KinematicEngine, Vec3};
    use crate::component_b::track::TrackId;
    use std::sync::atomic::AtomicUsize;

    /// Replays a fixed pose sequence, one pose per `step()`; forces are ignored.
    struct ScriptedEngine {
        poses: Vec<Pose>,
        idx: usize,
        fail_at: Option<usize>,
        quit_at: Option<usize>,
        connected: bool,
        disconnects: Arc<AtomicUsize>,
    }

    impl ScriptedEngine {
        fn new(poses: Vec<Pose>, disconnects: Arc<AtomicUsize>) -> Self {
            Self { poses, idx: 0, fail_at: None, quit_at: None, connected: true, disconnects }
        }
    }

    impl Engine for ScriptedEngine {
        fn create_body(&mut self, _pose: Pose) -> Result<BodyHandle, EngineError> {
            Ok(BodyHandle(0))
        }
        fn pose(&self, _body: BodyHandle) -> Result<Pose, EngineError> {
            if self.fail_at == Some(self.idx) {
                return Err(EngineError::Backend("scripted failure".into()));
            }
            Ok(self.poses[self.idx.min(self.poses.len() - 1)])
        }
        fn velocity(&self, _body: BodyHandle) -> Result<Vec3, EngineError> {
            Ok(Vec3::default())
        }
        fn apply_force(&mut self, _: BodyHandle, _: Vec3, _: Vec3, _: Frame) -> Result<(), EngineError> {
            Ok(())
        }
        fn apply_torque(&mut self, _: BodyHandle, _: Vec3, _: Frame) -> Result<(), EngineError> {
            Ok(())
        }
        fn set_friction(&mut self, _: BodyHandle, _: f64, _: f64) -> Result<(), EngineError> {
            Ok(())
        }
        fn step(&mut self) -> Result<(), EngineError> {
            self.idx += 1;
            Ok(())
        }
        fn disconnect(&mut self) {
            self.connected = false;
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        fn is_connected(&self) -> bool {
            self.connected
        }
        fn quit_requested(&mut self) -> bool {
            self.quit_at == Some(self.idx)
        }
    }

    fn fast() -> SimulationSettings {
        SimulationSettings { tick: Duration::ZERO, time_budget: Some(Duration::from_secs(5)) }
    }

    fn poses_along(track: &Track) -> Vec<Pose> {
        track.points().iter().map(|p| Pose::new(p.x, p.y, SPAWN_HEIGHT, 0.0)).collect()
    }

    #[test]
    fn open_track_completes_at_final_point() {
        let track = Track::predefined(TrackId::Three);
        let disconnects = Arc::new(AtomicUsize::new(0));
        let engine = ScriptedEngine::new(poses_along(&track), disconnects.clone());

        let recorder = EventRecorder::new();
        let summary = SimulationLoop::new(track, Box::new(engine), fast())
            .with_recorder(recorder.clone())
            .run();

        assert_eq!(summary.outcome, "Completed");
        assert_eq!(summary.waypoints_reached, 7);
        assert_eq!(summary.ticks, 8);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);

        let events = recorder.drain();
        assert!(matches!(events.first(), Some(Event::RunStarted { track: 3, .. })));
        assert!(matches!(events.last(), Some(Event::RunFinished { outcome: "Completed", .. })));
    }

    #[test]
    fn closed_track_completes_back_at_start() {
        let track = Track::predefined(TrackId::One);
        let disconnects = Arc::new(AtomicUsize::new(0));
        let engine = ScriptedEngine::new(poses_along(&track), disconnects.clone());

        let summary = SimulationLoop::new(track, Box::new(engine), fast()).run();
        assert_eq!(summary.outcome, "Completed");
        assert!(summary.waypoints_reached >= 12);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_flag_ends_run_as_user_stopped() {
        let track = Track::predefined(TrackId::Two);
        let disconnects = Arc::new(AtomicUsize::new(0));
        let engine = ScriptedEngine::new(vec![Pose::default()], disconnects.clone());

        let sim = SimulationLoop::new(track, Box::new(engine), fast());
        sim.stop_handle().store(true, Ordering::Release);
        let summary = sim.run();

        assert_eq!(summary.outcome, "UserStopped");
        assert_eq!(summary.ticks, 0);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn quit_input_ends_run_as_user_stopped() {
        let track = Track::predefined(TrackId::Two);
        let disconnects = Arc::new(AtomicUsize::new(0));
        let mut engine = ScriptedEngine::new(vec![Pose::new(5.0, 5.0, 0.5, 0.0)], disconnects.clone());
        engine.quit_at = Some(3);

        let summary = SimulationLoop::new(track, Box::new(engine), fast()).run();
        assert_eq!(summary.outcome, "UserStopped");
        assert_eq!(summary.ticks, 3);
    }

    #[test]
    fn stationary_body_times_out() {
        let track = Track::predefined(TrackId::One);
        let disconnects = Arc::new(AtomicUsize::new(0));
        let engine = ScriptedEngine::new(vec![Pose::new(5.0, 5.0, 0.5, 0.0)], disconnects.clone());
        let settings = SimulationSettings {
            tick: Duration::from_millis(1),
            time_budget: Some(Duration::from_millis(600)),
        };

        let summary = SimulationLoop::new(track, Box::new(engine), settings).run();
        assert_eq!(summary.outcome, "TimedOut");
        assert!(summary.stall_impulses >= 1);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn engine_failure_ends_in_error_with_single_teardown() {
        let track = Track::predefined(TrackId::One);
        let disconnects = Arc::new(AtomicUsize::new(0));
        let mut engine = ScriptedEngine::new(vec![Pose::new(5.0, 5.0, 0.5, 0.0)], disconnects.clone());
        engine.fail_at = Some(2);

        let summary = SimulationLoop::new(track, Box::new(engine), fast()).run();
        assert_eq!(summary.outcome, "Error");
        assert_eq!(summary.ticks, 2);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn kinematic_engine_finishes_every_track() {
        for id in TrackId::ALL {
            let settings = SimulationSettings { tick: Duration::ZERO, time_budget: Some(Duration::from_secs(20)) };
            let summary =
                SimulationLoop::new(Track::predefined(id), Box::new(KinematicEngine::default()), settings).run();
            assert_eq!(summary.outcome, "Completed", "track {} ended after {} ticks", id.number(), summary.ticks);
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!RunState::Idle.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::TimedOut.is_terminal());
        assert!(RunState::Error.is_terminal());
    }
}
