//! Gapless, cancellable playback of decoded model audio.
//!
//! Decoded buffers are scheduled against a monotonic frame clock that the
//! output callback advances. Each new buffer starts at
//! `max(now, next_start)` and pushes `next_start` past its own end, so
//! playback is contiguous and strictly ordered no matter how arrival
//! timing jitters. Barge-in stops everything at once and pulls the
//! cursor back to "now" so the next buffer plays immediately.
//!
//! The queue is shared between the session thread (scheduling) and the
//! cpal output callback (rendering), so all of its state sits behind one
//! mutex.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::error::SessionError;

/// Sample rate of inbound model audio and of the output clock.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// A scheduled buffer bound to its start time on the output clock. The
/// entry itself is the playback handle: it stays in the active set until
/// it finishes naturally or an interrupt clears it.
#[derive(Debug)]
struct ScheduledBuffer {
    start_frame: u64,
    samples: Vec<f32>,
}

/// Scheduler state: the active-buffer set plus the two clock cursors.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    /// Monotonic output clock in frames, advanced by `render`.
    frames_elapsed: u64,
    /// Earliest frame the next buffer may start at.
    next_start_frame: u64,
    active: Vec<ScheduledBuffer>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current clock position in frames.
    pub fn now(&self) -> u64 {
        self.frames_elapsed
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Schedule a decoded mono buffer; returns its start frame.
    pub fn schedule(&mut self, samples: Vec<f32>) -> u64 {
        let start_frame = self.frames_elapsed.max(self.next_start_frame);
        self.next_start_frame = start_frame + samples.len() as u64;
        self.active.push(ScheduledBuffer {
            start_frame,
            samples,
        });
        start_frame
    }

    /// Barge-in: drop every pending/playing buffer and reset the start
    /// cursor to the current clock so the next buffer plays immediately.
    /// Stopping a buffer that already finished is a harmless no-op.
    pub fn interrupt(&mut self) {
        self.active.clear();
        self.next_start_frame = self.frames_elapsed;
    }

    /// Reset the whole queue, clock included. Used on session teardown.
    pub fn reset(&mut self) {
        self.active.clear();
        self.frames_elapsed = 0;
        self.next_start_frame = 0;
    }

    /// Render mono frames into `out`, advancing the clock by `out.len()`.
    /// Buffers that end before the new clock position leave the active set.
    pub fn render(&mut self, out: &mut [f32]) {
        for (i, slot) in out.iter_mut().enumerate() {
            let frame = self.frames_elapsed + i as u64;
            let mut value = 0.0f32;
            for buffer in &self.active {
                if frame >= buffer.start_frame {
                    let idx = (frame - buffer.start_frame) as usize;
                    if idx < buffer.samples.len() {
                        value += buffer.samples[idx];
                    }
                }
            }
            *slot = value;
        }
        self.frames_elapsed += out.len() as u64;
        let clock = self.frames_elapsed;
        self.active
            .retain(|b| b.start_frame + b.samples.len() as u64 > clock);
    }
}

/// Open the speaker output stream feeding from the shared queue.
///
/// Mirrors the input side: stereo f32 at 24 kHz with an i16 fallback,
/// mono frames duplicated onto both channels. The returned stream is
/// already playing and must be kept alive by the session worker.
pub fn open_output(queue: Arc<Mutex<PlaybackQueue>>) -> Result<cpal::Stream, SessionError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| SessionError::Playback("No audio output device available".to_string()))?;

    let config = cpal::StreamConfig {
        channels: 2,
        sample_rate: OUTPUT_SAMPLE_RATE,
        buffer_size: cpal::BufferSize::Default,
    };

    let err_fn = |err| eprintln!("[Playback] Audio stream error: {}", err);

    let queue_f32 = queue.clone();
    let mut mono: Vec<f32> = Vec::new();
    let stream = match device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / 2;
            mono.resize(frames, 0.0);
            if let Ok(mut q) = queue_f32.lock() {
                q.render(&mut mono);
            } else {
                mono.fill(0.0);
            }
            for (frame, &sample) in data.chunks_mut(2).zip(mono.iter()) {
                frame[0] = sample;
                frame[1] = sample;
            }
        },
        err_fn,
        None,
    ) {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("[Playback] f32 output stream failed ({}), trying i16", e);
            let mut mono: Vec<f32> = Vec::new();
            device
                .build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        let frames = data.len() / 2;
                        mono.resize(frames, 0.0);
                        if let Ok(mut q) = queue.lock() {
                            q.render(&mut mono);
                        } else {
                            mono.fill(0.0);
                        }
                        for (frame, &sample) in data.chunks_mut(2).zip(mono.iter()) {
                            let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
                            frame[0] = value;
                            frame[1] = value;
                        }
                    },
                    err_fn,
                    None,
                )
                .map_err(|e2| SessionError::Playback(e2.to_string()))?
        }
    };

    stream
        .play()
        .map_err(|e| SessionError::Playback(e.to_string()))?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advance(queue: &mut PlaybackQueue, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames];
        queue.render(&mut out);
        out
    }

    #[test]
    fn back_to_back_buffers_never_overlap() {
        let mut queue = PlaybackQueue::new();
        // 1.0 s then 0.5 s arriving together while the clock is idle at 0.
        let first = queue.schedule(vec![0.5; OUTPUT_SAMPLE_RATE as usize]);
        let second = queue.schedule(vec![0.25; OUTPUT_SAMPLE_RATE as usize / 2]);
        assert_eq!(first, 0);
        assert_eq!(second, OUTPUT_SAMPLE_RATE as u64);
    }

    #[test]
    fn start_times_are_contiguous_and_never_in_the_past() {
        let mut queue = PlaybackQueue::new();
        let durations = [3000usize, 120, 4800, 1, 2400];
        let mut previous_end = 0u64;
        for (i, &len) in durations.iter().enumerate() {
            // Let the clock jitter forward between arrivals.
            advance(&mut queue, i * 700);
            let now = queue.now();
            let start = queue.schedule(vec![0.1; len]);
            assert!(start >= now, "buffer {} started in the past", i);
            assert!(start >= previous_end, "buffer {} overlapped", i);
            previous_end = start + len as u64;
        }
    }

    #[test]
    fn buffer_after_idle_gap_starts_at_current_clock() {
        let mut queue = PlaybackQueue::new();
        queue.schedule(vec![0.1; 100]);
        advance(&mut queue, 5000);
        assert_eq!(queue.active_count(), 0);
        let start = queue.schedule(vec![0.1; 10]);
        assert_eq!(start, 5000);
    }

    #[test]
    fn render_plays_samples_at_their_scheduled_offset() {
        let mut queue = PlaybackQueue::new();
        queue.schedule(vec![1.0; 4]);
        queue.schedule(vec![-1.0; 4]);
        let out = advance(&mut queue, 10);
        assert_eq!(&out[..4], &[1.0; 4]);
        assert_eq!(&out[4..8], &[-1.0; 4]);
        assert_eq!(&out[8..], &[0.0; 2]);
        assert_eq!(queue.active_count(), 0);
    }

    #[test]
    fn interrupt_clears_active_set_and_resets_cursor() {
        let mut queue = PlaybackQueue::new();
        queue.schedule(vec![0.1; 48_000]);
        queue.schedule(vec![0.1; 48_000]);
        advance(&mut queue, 1000);
        assert_eq!(queue.active_count(), 2);

        queue.interrupt();
        assert_eq!(queue.active_count(), 0);

        let interrupt_clock = queue.now();
        let start = queue.schedule(vec![0.1; 10]);
        assert_eq!(start, interrupt_clock);

        // Nothing from the cancelled buffers leaks into the output.
        let out = advance(&mut queue, 10);
        assert_eq!(out, vec![0.1; 10]);
    }

    #[test]
    fn reset_zeroes_the_clock() {
        let mut queue = PlaybackQueue::new();
        queue.schedule(vec![0.1; 100]);
        advance(&mut queue, 50);
        queue.reset();
        assert_eq!(queue.now(), 0);
        assert_eq!(queue.active_count(), 0);
        assert_eq!(queue.schedule(vec![0.1; 10]), 0);
    }
}
