//! Optional WAV sink for model audio received during a session.

use std::path::{Path, PathBuf};

use anyhow::Result;

use super::playback::OUTPUT_SAMPLE_RATE;

/// Writes every decoded model-audio buffer to a 24 kHz mono 16-bit file.
pub struct SessionRecorder {
    writer: hound::WavWriter<std::io::BufWriter<std::fs::File>>,
    path: PathBuf,
}

impl SessionRecorder {
    /// Create a timestamped recording under `dir`.
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let filename = format!(
            "session-{}.wav",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        );
        let path = dir.join(filename);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: OUTPUT_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&path, spec)?;
        Ok(Self { writer, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append raw little-endian PCM bytes as received from the server.
    pub fn write_pcm(&mut self, bytes: &[u8]) -> Result<()> {
        for chunk in bytes.chunks_exact(2) {
            self.writer
                .write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
        }
        Ok(())
    }

    /// Flush headers and close the file.
    pub fn finalize(self) -> Result<()> {
        self.writer.finalize()?;
        Ok(())
    }
}
