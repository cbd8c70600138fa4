//! WAV sink for emitted PCM chunks.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Context;
use parley_core::PcmChunk;

pub struct WavSink {
    writer: hound::WavWriter<BufWriter<File>>,
    samples_written: u64,
}

impl WavSink {
    /// Create (or truncate) a mono 16-bit WAV at `sample_rate`.
    pub fn create(path: &Path, sample_rate: u32) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("creating WAV file {}", path.display()))?;
        Ok(Self {
            writer,
            samples_written: 0,
        })
    }

    pub fn write_chunk(&mut self, chunk: &PcmChunk) -> anyhow::Result<()> {
        for &sample in chunk.samples() {
            self.writer.write_sample(sample)?;
        }
        self.samples_written += chunk.len() as u64;
        Ok(())
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Flush and patch the WAV header.
    pub fn finalize(self) -> anyhow::Result<u64> {
        let written = self.samples_written;
        self.writer.finalize().context("finalizing WAV file")?;
        Ok(written)
    }
}
