//! Sampling cadence: which decoded frames are offered to the similarity engine.
//!
//! Frames that are not selected are dropped before fingerprinting and never
//! touch the unique/duplicate counters.

use serde::{Deserialize, Serialize};

/// Tolerance applied before rounding the cadence up, so 30 / 0.1 stays 300.
const RATIO_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Sampler {
    /// Every decoded frame is considered.
    EveryFrame,
    /// Only frames whose index is a multiple of `interval` are considered.
    FixedCadence { interval: u64 },
}

impl Sampler {
    /// Picks the sampler for a source rate and optional target rate.
    #[must_use]
    pub fn new(source_fps: f64, target_fps: Option<f64>) -> Self {
        match target_fps {
            Some(target) => Sampler::FixedCadence {
                interval: sampling_interval(source_fps, target),
            },
            None => Sampler::EveryFrame,
        }
    }

    #[must_use]
    pub fn should_consider(&self, decoded_frame_index: u64) -> bool {
        match *self {
            Sampler::EveryFrame => true,
            Sampler::FixedCadence { interval } => decoded_frame_index % interval == 0,
        }
    }

    /// Distance between considered frames, 1 when every frame is considered.
    #[must_use]
    pub fn interval(&self) -> u64 {
        match *self {
            Sampler::EveryFrame => 1,
            Sampler::FixedCadence { interval } => interval,
        }
    }
}

/// `ceil(source_fps / target_fps)`, never less than 1.
#[must_use]
pub fn sampling_interval(source_fps: f64, target_fps: f64) -> u64 {
    let ratio = source_fps / target_fps;
    if !ratio.is_finite() || ratio <= 1.0 {
        return 1;
    }
    ((ratio - RATIO_EPSILON).ceil() as u64).max(1)
}

/// Stateless form of [`Sampler::should_consider`].
#[must_use]
pub fn should_consider(decoded_frame_index: u64, source_fps: f64, target_fps: Option<f64>) -> bool {
    Sampler::new(source_fps, target_fps).should_consider(decoded_frame_index)
}
