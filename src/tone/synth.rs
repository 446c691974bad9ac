use std::f64::consts::TAU;
use std::path::Path;

use anyhow::{Context, Result};

pub const BASE_FREQUENCY_HZ: f64 = 220.0;
pub const MASTER_GAIN: f32 = 0.4;
pub const ATTACK_SECS: f64 = 0.005;
pub const DECAY_SECS: f64 = 3.0;
pub const ENVELOPE_FLOOR: f64 = 0.001;
pub const PARTIAL_PEAK_SCALE: f64 = 0.5;
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Partial {
    pub ratio: f64,
    pub amplitude: f64,
}

impl Partial {
    pub fn frequency_hz(&self) -> f64 {
        BASE_FREQUENCY_HZ * self.ratio
    }

    pub fn peak_gain(&self) -> f64 {
        self.amplitude * PARTIAL_PEAK_SCALE
    }
}

/// Inharmonic partials of the gong, relative to the 220 Hz fundamental.
pub const GONG_PARTIALS: [Partial; 6] = [
    Partial {
        ratio: 1.0,
        amplitude: 0.8,
    },
    Partial {
        ratio: 1.5,
        amplitude: 0.5,
    },
    Partial {
        ratio: 2.37,
        amplitude: 0.35,
    },
    Partial {
        ratio: 3.17,
        amplitude: 0.2,
    },
    Partial {
        ratio: 4.2,
        amplitude: 0.15,
    },
    Partial {
        ratio: 5.5,
        amplitude: 0.08,
    },
];

/// Gain of one partial `t` seconds into the chime: a 5 ms linear attack to
/// `peak`, then an exponential fall to the floor at the 3 s mark, then silence.
pub fn envelope_gain(peak: f64, t: f64) -> f64 {
    if !(0.0..DECAY_SECS).contains(&t) {
        return 0.0;
    }
    if t < ATTACK_SECS {
        return peak * t / ATTACK_SECS;
    }
    let progress = (t - ATTACK_SECS) / (DECAY_SECS - ATTACK_SECS);
    peak * (ENVELOPE_FLOOR / peak).powf(progress)
}

/// Mixed output of all partials at `t` seconds, master gain applied.
pub fn chime_sample_at(t: f64) -> f32 {
    let sum = GONG_PARTIALS
        .iter()
        .map(|partial| {
            (TAU * partial.frequency_hz() * t).sin() * envelope_gain(partial.peak_gain(), t)
        })
        .sum::<f64>();
    MASTER_GAIN * sum as f32
}

/// One playing chime. Voices own their own position, so any number of them
/// can overlap without touching each other's envelopes.
#[derive(Debug, Clone)]
pub struct ChimeVoice {
    sample_rate: u32,
    position: u64,
    total_samples: u64,
}

impl ChimeVoice {
    pub fn new(sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1);
        Self {
            sample_rate,
            position: 0,
            total_samples: (DECAY_SECS * f64::from(sample_rate)).round() as u64,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.total_samples
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn next_sample(&mut self) -> Option<f32> {
        if self.is_finished() {
            return None;
        }
        let t = self.position as f64 / f64::from(self.sample_rate);
        self.position += 1;
        Some(chime_sample_at(t))
    }
}

/// Sums every live voice into one mono stream.
#[derive(Debug, Default)]
pub struct VoiceMixer {
    voices: Vec<ChimeVoice>,
}

impl VoiceMixer {
    pub fn add(&mut self, voice: ChimeVoice) {
        self.voices.push(voice);
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn next_sample(&mut self) -> f32 {
        let mixed = self
            .voices
            .iter_mut()
            .filter_map(ChimeVoice::next_sample)
            .sum::<f32>();
        self.voices.retain(|voice| !voice.is_finished());
        mixed.clamp(-1.0, 1.0)
    }
}

pub fn render_chime(sample_rate: u32) -> Vec<f32> {
    let mut voice = ChimeVoice::new(sample_rate);
    std::iter::from_fn(|| voice.next_sample()).collect()
}

/// Writes one chime as a mono 32-bit float WAV file.
pub fn write_chime_wav(path: &Path, sample_rate: u32) -> Result<u64> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("unable to create WAV file {}", path.display()))?;
    let samples = render_chime(sample_rate);
    for sample in &samples {
        writer.write_sample(*sample)?;
    }
    writer
        .finalize()
        .with_context(|| format!("unable to finish WAV file {}", path.display()))?;
    Ok(samples.len() as u64)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn envelope_ramps_up_then_decays_to_floor() {
        let peak = 0.4;
        assert_eq!(envelope_gain(peak, 0.0), 0.0);
        assert!((envelope_gain(peak, ATTACK_SECS / 2.0) - peak / 2.0).abs() < 1e-9);
        assert!((envelope_gain(peak, ATTACK_SECS) - peak).abs() < 1e-9);
        assert!(envelope_gain(peak, 1.0) < peak);
        assert!(envelope_gain(peak, 2.0) < envelope_gain(peak, 1.0));
        let tail = envelope_gain(peak, DECAY_SECS - 1e-6);
        assert!((tail - ENVELOPE_FLOOR).abs() < 1e-4);
        assert_eq!(envelope_gain(peak, DECAY_SECS), 0.0);
        assert_eq!(envelope_gain(peak, -0.1), 0.0);
    }

    #[test]
    fn partials_match_gong_table() {
        let frequencies = GONG_PARTIALS
            .iter()
            .map(Partial::frequency_hz)
            .collect::<Vec<_>>();
        assert!((frequencies[0] - 220.0).abs() < 1e-9);
        assert!((frequencies[1] - 330.0).abs() < 1e-9);
        assert!((frequencies[5] - 1210.0).abs() < 1e-9);
        assert!((GONG_PARTIALS[0].peak_gain() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn rendered_chime_lasts_three_seconds() {
        let samples = render_chime(8_000);
        assert_eq!(samples.len(), 24_000);
        assert_eq!(samples[0], 0.0);
        let peak = samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
        assert!(peak > 0.1);
        assert!(peak <= 0.42);
        let tail = samples[samples.len() - 100..]
            .iter()
            .fold(0.0_f32, |acc, s| acc.max(s.abs()));
        assert!(tail < 0.01);
    }

    #[test]
    fn overlapping_voices_sum_independently() {
        let sample_rate = 4_000;
        let solo = render_chime(sample_rate);
        let mut mixer = VoiceMixer::default();
        mixer.add(ChimeVoice::new(sample_rate));
        let offset = 1_000;
        let mut mixed = Vec::new();
        for index in 0..solo.len() {
            if index == offset {
                mixer.add(ChimeVoice::new(sample_rate));
            }
            mixed.push(mixer.next_sample());
        }
        for index in [10, 500, offset + 5, 5_000, solo.len() - 1] {
            let expected = if index >= offset {
                solo[index] + solo[index - offset]
            } else {
                solo[index]
            };
            assert!((mixed[index] - expected).abs() < 1e-6, "sample {index}");
        }
        assert_eq!(mixer.active_voices(), 1);
    }

    #[test]
    fn finished_voices_leave_the_mixer() {
        let mut mixer = VoiceMixer::default();
        mixer.add(ChimeVoice::new(100));
        for _ in 0..300 {
            mixer.next_sample();
        }
        assert_eq!(mixer.active_voices(), 0);
        assert_eq!(mixer.next_sample(), 0.0);
    }

    #[test]
    fn writes_mono_float_wav() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("chime.wav");
        let written = write_chime_wav(&path, 8_000).expect("write wav");
        assert_eq!(written, 24_000);
        let reader = hound::WavReader::open(&path).expect("open wav");
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 8_000);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);
        assert_eq!(reader.len(), 24_000);
    }
}
