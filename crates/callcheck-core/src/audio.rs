//! Waveform power profiling and attenuation judgement.
//!
//! Every call leg leaves two wav files behind: the audio a party played and
//! the audio it recorded off the wire. Comparing their average power tells
//! us whether the gateway attenuated the signal; comparing how much of each
//! file is actually signal tells us how much to trust that number.

use std::path::Path;

use tracing::debug;

use crate::domain::error::Result;
use crate::domain::verdict::{AudioVolume, AudioVolumeConfidence};

/// Attenuation at or above this many dB counts as attenuated.
pub const POWER_THRESHOLD_DB: f64 = 6.0;

/// A recording may contribute up to 10% more signal frames than the file
/// that was played before the comparison is considered unreliable.
pub const FRAME_COUNT_TOLERANCE: f64 = 1.1;

/// Squared normalized amplitude below this is treated as silence.
const SILENCE_FLOOR: f64 = 1e-6;

/// Power statistics of one wav file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerProfile {
    /// Average power over contributing samples, in dB relative to full
    /// scale. Negative infinity when the file is pure silence.
    pub average_power_db: f64,
    /// Samples whose energy clears the silence floor.
    pub contributing_frames: u64,
    /// Total samples in the file.
    pub total_frames: u64,
}

impl PowerProfile {
    /// Profile a wav file, normalizing samples to [-1.0, 1.0] regardless of
    /// the on-disk sample format.
    pub fn from_wav(path: &Path) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        let mut sum_sq = 0.0f64;
        let mut contributing = 0u64;
        let mut total = 0u64;

        match spec.sample_format {
            hound::SampleFormat::Float => {
                for sample in reader.samples::<f32>() {
                    accumulate(f64::from(sample?), &mut sum_sq, &mut contributing, &mut total);
                }
            }
            hound::SampleFormat::Int => {
                // Full scale for n-bit signed PCM.
                let scale = f64::from(1u32 << (spec.bits_per_sample - 1));
                for sample in reader.samples::<i32>() {
                    let normalized = f64::from(sample?) / scale;
                    accumulate(normalized, &mut sum_sq, &mut contributing, &mut total);
                }
            }
        }

        let average_power_db = if contributing == 0 {
            f64::NEG_INFINITY
        } else {
            10.0 * (sum_sq / contributing as f64).log10()
        };
        debug!(
            path = %path.display(),
            average_power_db,
            contributing,
            total,
            "profiled waveform"
        );
        Ok(Self {
            average_power_db,
            contributing_frames: contributing,
            total_frames: total,
        })
    }
}

fn accumulate(sample: f64, sum_sq: &mut f64, contributing: &mut u64, total: &mut u64) {
    *total += 1;
    let energy = sample * sample;
    if energy > SILENCE_FLOOR {
        *sum_sq += energy;
        *contributing += 1;
    }
}

/// Judge the recorded leg against the played leg.
///
/// The volume verdict is the power drop measured over contributing samples
/// only, so leading and trailing silence in either file does not dilute it.
/// Confidence degrades when the recording holds noticeably more signal than
/// was played, which means it picked up something other than the prompt.
pub fn attenuation(
    played: &PowerProfile,
    recorded: &PowerProfile,
) -> (AudioVolume, AudioVolumeConfidence) {
    let drop_db = played.average_power_db - recorded.average_power_db;
    let volume = if drop_db >= POWER_THRESHOLD_DB {
        AudioVolume::Attenuated
    } else {
        AudioVolume::NotAttenuated
    };

    let limit = played.contributing_frames as f64 * FRAME_COUNT_TOLERANCE;
    let confidence = if recorded.contributing_frames as f64 > limit {
        AudioVolumeConfidence::Low
    } else {
        AudioVolumeConfidence::Good
    };

    (volume, confidence)
}
