// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::HashMap;
use std::path::PathBuf;

use hound::{SampleFormat, WavReader};
use tracing::debug;

/// Decoded multi-channel PCM for one track. Channels are deinterleaved and
/// equal length; samples are f32 regardless of the on-disk format.
#[derive(Clone, Debug)]
pub struct DecodedBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl DecodedBuffer {
    /// Creates a buffer, validating that at least one channel exists, all
    /// channels have the same length and the sample rate is positive.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<DecodedBuffer, LoadError> {
        if sample_rate == 0 {
            return Err(LoadError::Invalid("sample rate must be positive".to_string()));
        }
        if channels.is_empty() {
            return Err(LoadError::Invalid("buffer has no channels".to_string()));
        }
        let frames = channels[0].len();
        if channels.iter().any(|channel| channel.len() != frames) {
            return Err(LoadError::Invalid(
                "channels must be equal length".to_string(),
            ));
        }
        Ok(DecodedBuffer {
            channels,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn num_frames(&self) -> usize {
        self.channels[0].len()
    }

    /// The duration of this buffer in input-track seconds.
    pub fn duration_sec(&self) -> f64 {
        self.num_frames() as f64 / self.sample_rate as f64
    }

    /// Averages all channels into a mono signal for analysis.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels.len() == 1 {
            return self.channels[0].clone();
        }
        let scale = 1.0 / self.channels.len() as f32;
        (0..self.num_frames())
            .map(|frame| {
                self.channels
                    .iter()
                    .map(|channel| channel[frame])
                    .sum::<f32>()
                    * scale
            })
            .collect()
    }
}

/// Errors produced while loading and decoding a track.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("unknown locator: {0}")]
    UnknownLocator(String),

    #[error("invalid buffer: {0}")]
    Invalid(String),
}

/// The audio-loading collaborator. Given a locator, produces decoded PCM or
/// fails; any retry or caching policy lives behind this trait.
pub trait Loader: Send {
    fn load(&self, locator: &str) -> Result<DecodedBuffer, LoadError>;
}

/// Loads WAV files from disk, resolving locators relative to a base
/// directory. Integer samples are scaled to [-1, 1] by their bit depth.
pub struct WavFileLoader {
    base: PathBuf,
}

impl WavFileLoader {
    pub fn new<P: Into<PathBuf>>(base: P) -> WavFileLoader {
        WavFileLoader { base: base.into() }
    }
}

impl Loader for WavFileLoader {
    fn load(&self, locator: &str) -> Result<DecodedBuffer, LoadError> {
        let path = self.base.join(locator);
        let reader = WavReader::open(&path)?;
        let spec = reader.spec();
        let num_channels = spec.channels as usize;
        let mut channels: Vec<Vec<f32>> = vec![Vec::new(); num_channels];

        match spec.sample_format {
            SampleFormat::Float => {
                for (i, sample) in reader.into_samples::<f32>().enumerate() {
                    channels[i % num_channels].push(sample?);
                }
            }
            SampleFormat::Int => {
                let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
                for (i, sample) in reader.into_samples::<i32>().enumerate() {
                    channels[i % num_channels].push(sample? as f32 * scale);
                }
            }
        }

        debug!(
            locator = locator,
            channels = num_channels,
            sample_rate = spec.sample_rate,
            "Decoded track."
        );

        DecodedBuffer::new(channels, spec.sample_rate)
    }
}

/// An in-memory loader keyed by locator, for tests and embedding callers
/// that decode elsewhere.
#[derive(Default)]
pub struct MemoryLoader {
    buffers: HashMap<String, DecodedBuffer>,
}

impl MemoryLoader {
    pub fn new() -> MemoryLoader {
        MemoryLoader::default()
    }

    /// Registers a buffer under the given locator, replacing any previous one.
    pub fn insert(&mut self, locator: &str, buffer: DecodedBuffer) {
        self.buffers.insert(locator.to_string(), buffer);
    }
}

impl Loader for MemoryLoader {
    fn load(&self, locator: &str) -> Result<DecodedBuffer, LoadError> {
        self.buffers
            .get(locator)
            .cloned()
            .ok_or_else(|| LoadError::UnknownLocator(locator.to_string()))
    }
}

#[cfg(test)]
mod test {
    use hound::{SampleFormat, WavSpec, WavWriter};

    use super::{DecodedBuffer, Loader, MemoryLoader, WavFileLoader};

    #[test]
    fn test_buffer_validation() {
        assert!(DecodedBuffer::new(vec![], 44100).is_err());
        assert!(DecodedBuffer::new(vec![vec![0.0]], 0).is_err());
        assert!(DecodedBuffer::new(vec![vec![0.0, 0.0], vec![0.0]], 44100).is_err());

        let buffer = DecodedBuffer::new(vec![vec![0.0; 44100]], 44100).unwrap();
        assert_eq!(buffer.num_frames(), 44100);
        assert!((buffer.duration_sec() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_mono_mixdown() {
        let buffer =
            DecodedBuffer::new(vec![vec![1.0, 0.0, -1.0], vec![0.0, 0.0, -1.0]], 8000).unwrap();
        assert_eq!(buffer.to_mono(), vec![0.5, 0.0, -1.0]);
    }

    #[test]
    fn test_wav_loader_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(dir.path().join("click.wav"), spec).expect("writer");
        for frame in 0..8 {
            let value = if frame == 0 { i16::MAX } else { 0 };
            writer.write_sample(value).expect("write");
            writer.write_sample(0i16).expect("write");
        }
        writer.finalize().expect("finalize");

        let loader = WavFileLoader::new(dir.path());
        let buffer = loader.load("click.wav").expect("load");
        assert_eq!(buffer.channels().len(), 2);
        assert_eq!(buffer.num_frames(), 8);
        assert_eq!(buffer.sample_rate(), 8000);
        // 16-bit max scales to just under 1.0.
        assert!((buffer.channels()[0][0] - 1.0).abs() < 1e-3);
        assert_eq!(buffer.channels()[1][0], 0.0);

        assert!(loader.load("missing.wav").is_err());
    }

    #[test]
    fn test_memory_loader() {
        let mut loader = MemoryLoader::new();
        loader.insert(
            "a",
            DecodedBuffer::new(vec![vec![0.25, 0.5]], 8000).unwrap(),
        );

        assert_eq!(loader.load("a").unwrap().num_frames(), 2);
        assert!(loader.load("b").is_err());
    }
}
