//! PCM audio as it moves between the room, the detector and the providers

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Input block size for the FFT resampler
const RESAMPLE_CHUNK: usize = 1024;

/// Reported level of an all-zero frame
const SILENCE_DB: f32 = -96.0;

/// Rates the room, recognizer and synthesizer agree on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleRate {
    Hz8000,
    /// Recognizer input
    #[default]
    Hz16000,
    /// Typical synthesizer output
    Hz24000,
    /// WebRTC rooms
    Hz48000,
}

impl SampleRate {
    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Hz8000 => 8_000,
            Self::Hz16000 => 16_000,
            Self::Hz24000 => 24_000,
            Self::Hz48000 => 48_000,
        }
    }

    /// `None` for rates outside the supported set
    pub fn from_u32(rate: u32) -> Option<Self> {
        [Self::Hz8000, Self::Hz16000, Self::Hz24000, Self::Hz48000]
            .into_iter()
            .find(|r| r.as_u32() == rate)
    }

    pub fn samples_per_ms(&self) -> usize {
        self.as_u32() as usize / 1000
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channels {
    #[default]
    Mono,
    /// Interleaved left/right
    Stereo,
}

impl Channels {
    pub fn count(&self) -> usize {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }
}

/// A block of normalized `f32` samples in `[-1.0, 1.0]`
///
/// Samples sit behind an `Arc` so frames are cheap to clone while buffered
/// for an utterance. `duration` and `energy_db` are derived once at
/// construction.
#[derive(Clone)]
pub struct AudioFrame {
    pub samples: Arc<[f32]>,
    pub sample_rate: SampleRate,
    pub channels: Channels,
    /// Capture order within a track
    pub sequence: u64,
    pub duration: Duration,
    /// RMS level in dBFS
    pub energy_db: f32,
}

impl fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioFrame(#{} {} samples @ {} Hz x{}, {:?}, {:.1} dB)",
            self.sequence,
            self.samples.len(),
            self.sample_rate.as_u32(),
            self.channels.count(),
            self.duration,
            self.energy_db
        )
    }
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: SampleRate, channels: Channels, sequence: u64) -> Self {
        let per_second = sample_rate.as_u32() as f64 * channels.count() as f64;
        let duration = Duration::from_secs_f64(samples.len() as f64 / per_second);
        let energy_db = level_db(&samples);

        Self {
            samples: samples.into(),
            sample_rate,
            channels,
            sequence,
            duration,
            energy_db,
        }
    }

    /// Decode little-endian 16-bit PCM; a trailing odd byte is dropped
    pub fn from_pcm16(bytes: &[u8], sample_rate: SampleRate, channels: Channels, sequence: u64) -> Self {
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self::from_i16(&samples, sample_rate, channels, sequence)
    }

    pub fn from_i16(samples: &[i16], sample_rate: SampleRate, channels: Channels, sequence: u64) -> Self {
        let samples = samples.iter().map(|&s| s as f32 / 32_768.0).collect();
        Self::new(samples, sample_rate, channels, sequence)
    }

    /// Samples clipped to full scale
    pub fn to_i16(&self) -> Vec<i16> {
        self.samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect()
    }

    /// Little-endian 16-bit PCM
    pub fn to_pcm16(&self) -> Vec<u8> {
        self.to_i16().into_iter().flat_map(i16::to_le_bytes).collect()
    }

    /// Consecutive frames of at most `frame_len` samples, numbered on from
    /// this frame's sequence
    pub fn split(&self, frame_len: usize) -> Vec<AudioFrame> {
        if frame_len == 0 || self.samples.len() <= frame_len {
            return vec![self.clone()];
        }
        self.samples
            .chunks(frame_len)
            .zip(self.sequence..)
            .map(|(chunk, seq)| AudioFrame::new(chunk.to_vec(), self.sample_rate, self.channels, seq))
            .collect()
    }

    /// Join frames end to end, taking format and sequence from the first
    pub fn concat(frames: &[AudioFrame]) -> Option<AudioFrame> {
        let first = frames.first()?;
        let total = frames.iter().map(|f| f.samples.len()).sum();
        let mut samples = Vec::with_capacity(total);
        for frame in frames {
            samples.extend_from_slice(&frame.samples);
        }
        Some(AudioFrame::new(samples, first.sample_rate, first.channels, first.sequence))
    }

    /// Convert to `target_rate`, mixing down to mono first
    ///
    /// The output always holds `len * target / source` samples. Frames shorter
    /// than one FFT block, or an FFT failure, use linear interpolation.
    pub fn resample(&self, target_rate: SampleRate) -> Self {
        if self.channels != Channels::Mono {
            return self.to_mono().resample(target_rate);
        }
        if self.sample_rate == target_rate || self.samples.is_empty() {
            return self.clone();
        }

        let from = self.sample_rate.as_u32() as usize;
        let to = target_rate.as_u32() as usize;
        let samples = if self.samples.len() < RESAMPLE_CHUNK {
            linear_resample(&self.samples, from, to)
        } else {
            fft_resample(&self.samples, from, to).unwrap_or_else(|e| {
                tracing::warn!(error = %e, from, to, "FFT resampling failed, interpolating linearly");
                linear_resample(&self.samples, from, to)
            })
        };
        Self::new(samples, target_rate, Channels::Mono, self.sequence)
    }

    /// Average interleaved stereo pairs
    pub fn to_mono(&self) -> Self {
        match self.channels {
            Channels::Mono => self.clone(),
            Channels::Stereo => {
                let samples = self
                    .samples
                    .chunks_exact(2)
                    .map(|lr| (lr[0] + lr[1]) * 0.5)
                    .collect();
                Self::new(samples, self.sample_rate, Channels::Mono, self.sequence)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn level_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return SILENCE_DB;
    }
    let mean_square = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    let rms = mean_square.sqrt();
    if rms > 0.0 {
        20.0 * rms.log10()
    } else {
        SILENCE_DB
    }
}

fn fft_resample(input: &[f32], from: usize, to: usize) -> Result<Vec<f32>, Box<dyn StdError>> {
    use rubato::{FftFixedIn, Resampler};

    let wanted = input.len() * to / from;
    let mut resampler = FftFixedIn::<f32>::new(from, to, RESAMPLE_CHUNK, 2, 1)?;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(wanted + delay + RESAMPLE_CHUNK);

    let mut blocks = input.chunks_exact(RESAMPLE_CHUNK);
    for block in blocks.by_ref() {
        output.extend_from_slice(&resampler.process(&[block][..], None)?[0]);
    }

    // Feed the tail once, then flush empty input until the delayed samples are out.
    let tail = blocks.remainder();
    let mut tail = (!tail.is_empty()).then_some(tail);
    while output.len() < wanted + delay {
        let out = match tail.take() {
            Some(rest) => resampler.process_partial(Some(&[rest][..]), None)?,
            None => resampler.process_partial(None::<&[&[f32]]>, None)?,
        };
        if out[0].is_empty() {
            break;
        }
        output.extend_from_slice(&out[0]);
    }

    output.drain(..delay.min(output.len()));
    output.resize(wanted, 0.0);
    Ok(output)
}

fn linear_resample(input: &[f32], from: usize, to: usize) -> Vec<f32> {
    let step = from as f64 / to as f64;
    let last = input.len().saturating_sub(1);
    (0..input.len() * to / from)
        .map(|i| {
            let pos = i as f64 * step;
            let lo = (pos as usize).min(last);
            let hi = (lo + 1).min(last);
            let t = (pos - lo as f64) as f32;
            input[lo] + (input[hi] - input[lo]) * t
        })
        .collect()
}
