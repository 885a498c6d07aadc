//! Microphone capture: fixed-size 16 kHz mono frames.
//!
//! The device runs at whatever rate it prefers; each callback buffer is
//! downmixed to mono, resampled to 16 kHz with linear interpolation and
//! accumulated into 4096-sample frames for the session worker. The
//! callback checks the session's active flag first, so a stream whose
//! session was torn down captures nothing while cpal winds it down.

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc, Mutex,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::error::SessionError;

/// Outbound audio sample rate expected by the transport.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Samples per capture frame.
pub const FRAME_SAMPLES: usize = 4096;

/// Average interleaved channels down to mono.
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resample by `ratio` (output rate / input rate).
/// Only downsampling is applied; at-or-below-target rates pass through.
fn resample(samples: Vec<f32>, ratio: f64) -> Vec<f32> {
    if ratio >= 1.0 || samples.is_empty() {
        return samples;
    }
    let new_len = (samples.len() as f64 * ratio) as usize;
    (0..new_len)
        .map(|i| {
            let src_idx = i as f64 / ratio;
            let idx0 = src_idx as usize;
            let idx1 = (idx0 + 1).min(samples.len() - 1);
            let frac = src_idx - idx0 as f64;
            let s0 = samples[idx0] as f64;
            let s1 = samples[idx1] as f64;
            (s0 + frac * (s1 - s0)) as f32
        })
        .collect()
}

/// RMS of a sample block, for the input level meter.
fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64).powi(2)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Start microphone capture into the shared frame queue.
///
/// Returns the cpal stream, which must be kept alive by the session
/// worker and is released by dropping it. Any acquisition failure maps
/// to `SessionError::Permission` and is terminal for the session.
pub fn start_capture(
    frames: Arc<Mutex<VecDeque<Vec<f32>>>>,
    active: Arc<AtomicBool>,
    rms: Arc<AtomicU32>,
) -> Result<cpal::Stream, SessionError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or_else(|| {
        SessionError::Permission("No microphone available. Please connect a microphone.".to_string())
    })?;
    let config = device
        .default_input_config()
        .map_err(|e| SessionError::Permission(e.to_string()))?;

    let sample_rate = config.sample_rate();
    let channels = config.channels() as usize;
    let resample_ratio = INPUT_SAMPLE_RATE as f64 / sample_rate as f64;
    let err_fn = |err| eprintln!("[Capture] Audio stream error: {}", err);

    let mut pending: Vec<f32> = Vec::with_capacity(FRAME_SAMPLES * 2);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config.into(),
            move |data: &[f32], _: &_| {
                if !active.load(Ordering::Relaxed) {
                    return;
                }

                let mono = downmix(data, channels);
                let resampled = resample(mono, resample_ratio);

                rms.store(rms_level(&resampled).to_bits(), Ordering::Relaxed);

                pending.extend_from_slice(&resampled);
                while pending.len() >= FRAME_SAMPLES {
                    let frame: Vec<f32> = pending.drain(..FRAME_SAMPLES).collect();
                    if let Ok(mut queue) = frames.lock() {
                        queue.push_back(frame);
                    }
                }
            },
            err_fn,
            None,
        ),
        _ => {
            return Err(SessionError::Permission(
                "Unsupported microphone sample format".to_string(),
            ))
        }
    }
    .map_err(|e| SessionError::Permission(e.to_string()))?;

    stream
        .play()
        .map_err(|e| SessionError::Permission(e.to_string()))?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_channels() {
        let stereo = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(downmix(&stereo, 2), vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn downmix_passes_mono_through() {
        let mono = [0.1, 0.2, 0.3];
        assert_eq!(downmix(&mono, 1), mono.to_vec());
    }

    #[test]
    fn resample_halves_at_ratio_half() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let out = resample(samples, 0.5);
        assert_eq!(out.len(), 50);
        // A linear ramp survives linear interpolation exactly.
        assert!((out[10] - 20.0).abs() < 1e-4);
    }

    #[test]
    fn resample_is_identity_at_target_rate() {
        let samples = vec![0.1f32, 0.2, 0.3];
        assert_eq!(resample(samples.clone(), 1.0), samples);
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms_level(&[0.0; 64]), 0.0);
        assert_eq!(rms_level(&[]), 0.0);
    }

    #[test]
    fn rms_of_full_scale_square_wave_is_one() {
        let square = [1.0f32, -1.0, 1.0, -1.0];
        assert!((rms_level(&square) - 1.0).abs() < 1e-6);
    }
}
