//! Decoding fetched bytes into PCM buffers.
//!
//! Decoding goes through rodio's format probing (WAV, FLAC, Vorbis, MP3).
//! The result is a fully materialized, interleaved `f32` buffer so voices can
//! loop and seek without touching the decoder again.

use rodio::decoder::DecoderError;
use rodio::{Decoder, Source};
use std::io::Cursor;
use thiserror::Error;

/// Errors that can occur while decoding a track.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// No decoder recognized the data.
    #[error("unrecognized audio format")]
    UnrecognizedFormat,
    /// The data was recognized but could not be decoded.
    #[error("failed to decode audio: {0}")]
    Corrupt(String),
    /// The stream decoded to zero frames.
    #[error("audio stream contains no samples")]
    Empty,
    /// Channel count or sample rate is unusable.
    #[error("invalid audio layout: {channels} channels at {sample_rate} Hz")]
    InvalidLayout {
        /// Reported channel count.
        channels: u16,
        /// Reported sample rate.
        sample_rate: u32,
    },
}

impl From<DecoderError> for DecodeError {
    fn from(e: DecoderError) -> Self {
        match e {
            DecoderError::UnrecognizedFormat => DecodeError::UnrecognizedFormat,
            other => DecodeError::Corrupt(other.to_string()),
        }
    }
}

/// A decoded track: interleaved samples plus their layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    channels: u16,
    sample_rate: u32,
    samples: Vec<f32>,
}

impl PcmBuffer {
    /// Wraps interleaved samples.
    ///
    /// A trailing partial frame is dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the layout is unusable or no whole frame remains
    pub fn new(channels: u16, sample_rate: u32, mut samples: Vec<f32>) -> Result<Self, DecodeError> {
        if channels == 0 || sample_rate == 0 {
            return Err(DecodeError::InvalidLayout {
                channels,
                sample_rate,
            });
        }
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        if samples.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(Self {
            channels,
            sample_rate,
            samples,
        })
    }

    /// Number of interleaved channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Native sample rate of the recording.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Playback length in seconds at rate 1.0.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Returns one frame as a stereo pair.
    ///
    /// Mono is duplicated to both sides; channels beyond the second are ignored.
    #[inline]
    pub fn stereo_frame(&self, frame: usize) -> (f32, f32) {
        let base = frame * self.channels as usize;
        let left = self.samples[base];
        let right = if self.channels > 1 {
            self.samples[base + 1]
        } else {
            left
        };
        (left, right)
    }
}

/// Converts raw resource bytes into PCM.
pub trait PcmDecoder: Send + Sync {
    /// Decodes a complete resource.
    fn decode(&self, bytes: Vec<u8>) -> Result<PcmBuffer, DecodeError>;
}

/// Decoder backed by rodio's format probing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RodioDecoder;

impl PcmDecoder for RodioDecoder {
    fn decode(&self, bytes: Vec<u8>) -> Result<PcmBuffer, DecodeError> {
        let decoder = Decoder::new(Cursor::new(bytes))?;
        let channels = decoder.channels();
        let sample_rate = decoder.sample_rate();
        let samples: Vec<f32> = decoder.convert_samples::<f32>().collect();
        PcmBuffer::new(channels, sample_rate, samples)
    }
}
