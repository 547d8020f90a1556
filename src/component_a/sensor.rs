//! sensor.rs
//! Chute hardware capabilities (IR beam per chute, load cell under chute 1) and simulated
//! stand-ins so the device process runs without hardware.
//!
//! - IR beams are active-low by default: a coin blocking the beam reads `false`.
//! - The load cell follows the usual bridge-amplifier contract: tare stores an offset, readings
//!   are `(raw - offset) / scale`.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::component_b::track::TrackId;
use crate::utils::error::DeviceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chute {
    One,
    Two,
    Three,
}

impl Chute {
    /// Priority order used by the dispatch policy.
    pub const ALL: [Chute; 3] = [Chute::One, Chute::Two, Chute::Three];

    pub fn index(&self) -> usize {
        match self {
            Chute::One => 0,
            Chute::Two => 1,
            Chute::Three => 2,
        }
    }

    pub fn number(&self) -> u8 {
        self.index() as u8 + 1
    }

    /// Each chute drives the track with the same number.
    pub fn track(&self) -> TrackId {
        match self {
            Chute::One => TrackId::One,
            Chute::Two => TrackId::Two,
            Chute::Three => TrackId::Three,
        }
    }
}

pub trait ChuteSensors {
    /// Current digital level of each chute's beam sensor, chute 1 first.
    fn read_levels(&mut self) -> Result<[bool; 3], DeviceError>;
}

pub trait WeightScale {
    fn tare(&mut self, samples: u32) -> Result<(), DeviceError>;
    fn read_grams(&mut self, samples: u32) -> Result<f64, DeviceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Beam {
    Clear,
    Blocked { remaining: u32 },
    /// One forced clear tick after a coin so back-to-back coins still produce edges.
    Settling,
}

/// Random coin drops. Each coin blocks its beam for `pulse_ticks` samples.
pub struct SimulatedChutes {
    rng: StdRng,
    drop_probability: [f64; 3],
    pulse_ticks: u32,
    inverted_logic: bool,
    beams: [Beam; 3],
    dropped: [Arc<AtomicU64>; 3],
}

impl SimulatedChutes {
    pub fn new(seed: u64, drop_probability: [f64; 3], pulse_ticks: u32, inverted_logic: bool) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            drop_probability: drop_probability.map(|p| p.clamp(0.0, 1.0)),
            pulse_ticks: pulse_ticks.max(1),
            inverted_logic,
            beams: [Beam::Clear; 3],
            dropped: Default::default(),
        }
    }

    /// Running count of simulated coins for `chute`; the simulated scale reads it.
    pub fn dropped_handle(&self, chute: Chute) -> Arc<AtomicU64> {
        self.dropped[chute.index()].clone()
    }

    fn advance(&mut self, i: usize) -> bool {
        let (next, blocked) = match self.beams[i] {
            Beam::Blocked { remaining } if remaining > 1 => {
                (Beam::Blocked { remaining: remaining - 1 }, true)
            }
            Beam::Blocked { .. } => (Beam::Settling, false),
            Beam::Settling => (Beam::Clear, false),
            Beam::Clear => {
                if self.rng.random_bool(self.drop_probability[i]) {
                    self.dropped[i].fetch_add(1, Ordering::Relaxed);
                    (Beam::Blocked { remaining: self.pulse_ticks }, true)
                } else {
                    (Beam::Clear, false)
                }
            }
        };
        self.beams[i] = next;
        blocked
    }
}

impl ChuteSensors for SimulatedChutes {
    fn read_levels(&mut self) -> Result<[bool; 3], DeviceError> {
        let mut levels = [false; 3];
        for (i, level) in levels.iter_mut().enumerate() {
            let blocked = self.advance(i);
            *level = blocked != self.inverted_logic;
        }
        Ok(levels)
    }
}

/// Load cell whose raw counts grow with the coins dropped into its chute.
pub struct SimulatedScale {
    rng: StdRng,
    coins: Arc<AtomicU64>,
    coin_grams: f64,
    scale: f64,
    raw_bias: f64,
    offset: Option<f64>,
}

impl SimulatedScale {
    pub fn new(seed: u64, coins: Arc<AtomicU64>, coin_grams: f64, scale: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            coins,
            coin_grams,
            scale,
            raw_bias: 8_400.0,
            offset: None,
        }
    }

    fn read_raw(&mut self) -> f64 {
        let load = self.coins.load(Ordering::Relaxed) as f64 * self.coin_grams;
        self.raw_bias + load * self.scale + self.rng.random_range(-50.0..50.0)
    }

    fn read_average(&mut self, samples: u32) -> f64 {
        let n = samples.max(1);
        (0..n).map(|_| self.read_raw()).sum::<f64>() / n as f64
    }
}

impl WeightScale for SimulatedScale {
    fn tare(&mut self, samples: u32) -> Result<(), DeviceError> {
        if self.scale.abs() < f64::EPSILON {
            return Err(DeviceError::Scale("scale factor must be non-zero".into()));
        }
        let offset = self.read_average(samples);
        self.offset = Some(offset);
        Ok(())
    }

    fn read_grams(&mut self, samples: u32) -> Result<f64, DeviceError> {
        let offset = self
            .offset
            .ok_or_else(|| DeviceError::Scale("read before tare".into()))?;
        Ok((self.read_average(samples) - offset) / self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_coin_is_followed_by_a_clear_sample() {
        let mut chutes = SimulatedChutes::new(7, [1.0, 0.0, 0.0], 2, false);
        let seq: Vec<bool> = (0..8).map(|_| chutes.read_levels().unwrap()[0]).collect();
        // blocked, blocked, clear (settling), clear, then the next coin.
        assert_eq!(&seq[..5], &[true, true, false, false, true]);
        assert!(chutes.dropped_handle(Chute::One).load(Ordering::Relaxed) >= 2);
    }

    #[test]
    fn inverted_logic_reads_low_when_blocked() {
        let mut chutes = SimulatedChutes::new(1, [1.0, 0.0, 0.0], 1, true);
        let levels = chutes.read_levels().unwrap();
        assert_eq!(levels, [false, true, true]);
    }

    #[test]
    fn scale_tracks_coin_load_after_tare() {
        let coins = Arc::new(AtomicU64::new(0));
        let mut scale = SimulatedScale::new(3, coins.clone(), 5.0, 992.0);
        assert!(scale.read_grams(3).is_err());

        scale.tare(20).unwrap();
        coins.store(4, Ordering::Relaxed);
        let grams = scale.read_grams(5).unwrap();
        assert!((grams - 20.0).abs() < 0.5, "grams = {grams}");
    }

    #[test]
    fn zero_scale_factor_is_fatal() {
        let mut scale = SimulatedScale::new(3, Arc::new(AtomicU64::new(0)), 5.0, 0.0);
        assert!(matches!(scale.tare(5), Err(DeviceError::Scale(_))));
    }

    #[test]
    fn chute_to_track() {
        assert_eq!(Chute::Two.track(), TrackId::Two);
        assert_eq!(Chute::Three.number(), 3);
    }
}
