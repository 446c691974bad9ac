use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use tracing::{debug, info, warn};

use crate::error::ChimeError;
use crate::tone::synth::{ChimeVoice, VoiceMixer};

/// Anything that can sound a chime. Playing is fire-and-forget: failures are
/// handled inside and never reach the caller.
pub trait ChimeOutput {
    fn play_chime(&mut self);
}

impl<T: ChimeOutput + ?Sized> ChimeOutput for Box<T> {
    fn play_chime(&mut self) {
        (**self).play_chime();
    }
}

#[derive(Debug, Default)]
pub struct SilentOutput;

impl ChimeOutput for SilentOutput {
    fn play_chime(&mut self) {
        info!("chime (muted)");
    }
}

/// Plays chimes on the default output device.
///
/// The device stream is opened on the first chime and reused afterwards; each
/// chime becomes a new voice in the shared mixer. If anything fails the stream
/// is dropped and the next chime starts over.
#[derive(Default)]
pub struct ChimePlayer {
    engine: Option<AudioEngine>,
}

struct AudioEngine {
    stream: cpal::Stream,
    mixer: Arc<Mutex<VoiceMixer>>,
    sample_rate: u32,
}

impl ChimePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_play(&mut self) -> Result<(), ChimeError> {
        if self.engine.is_none() {
            self.engine = Some(AudioEngine::open()?);
        }
        let Some(engine) = self.engine.as_ref() else {
            return Err(ChimeError::AudioUnavailable(
                "audio engine missing after open".to_string(),
            ));
        };

        engine
            .stream
            .play()
            .map_err(|err| ChimeError::AudioUnavailable(format!("could not resume stream: {err}")))?;
        let mut mixer = engine
            .mixer
            .lock()
            .map_err(|_| ChimeError::AudioUnavailable("mixer lock poisoned".to_string()))?;
        mixer.add(ChimeVoice::new(engine.sample_rate));
        debug!(voices = mixer.active_voices(), "chime scheduled");
        Ok(())
    }
}

impl ChimeOutput for ChimePlayer {
    fn play_chime(&mut self) {
        if let Err(err) = self.try_play() {
            warn!(%err, "chime not played");
            self.engine = None;
        }
    }
}

/// Keeps a `ChimePlayer` on a dedicated thread. The audio stream cannot leave
/// the thread that opened it, so this is the output to use when chimes are
/// triggered from a timer thread.
pub struct ChimeWorker {
    sender: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl ChimeWorker {
    pub fn spawn() -> Self {
        Self::spawn_with(ChimePlayer::new)
    }

    pub fn spawn_with<O, F>(make_output: F) -> Self
    where
        O: ChimeOutput,
        F: FnOnce() -> O + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel::<()>();
        let join = thread::Builder::new()
            .name("chime-audio".to_string())
            .spawn(move || {
                let mut output = make_output();
                while receiver.recv().is_ok() {
                    output.play_chime();
                }
            });
        let join = match join {
            Ok(join) => Some(join),
            Err(err) => {
                warn!(%err, "could not start audio thread");
                None
            }
        };
        Self {
            sender: Some(sender),
            join,
        }
    }
}

impl ChimeOutput for ChimeWorker {
    fn play_chime(&mut self) {
        let delivered = self
            .sender
            .as_ref()
            .is_some_and(|sender| sender.send(()).is_ok());
        if !delivered {
            let err = ChimeError::AudioUnavailable("audio thread is not running".to_string());
            warn!(%err, "chime not played");
        }
    }
}

impl Drop for ChimeWorker {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl AudioEngine {
    fn open() -> Result<Self, ChimeError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| ChimeError::AudioUnavailable("no output device".to_string()))?;
        let supported = device.default_output_config().map_err(|err| {
            ChimeError::AudioUnavailable(format!("no usable output config: {err}"))
        })?;

        let sample_rate = supported.sample_rate().0;
        let channels = usize::from(supported.channels()).max(1);
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.config();
        let mixer = Arc::new(Mutex::new(VoiceMixer::default()));

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, channels, &mixer)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, channels, &mixer)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, channels, &mixer)?,
            other => {
                return Err(ChimeError::AudioUnavailable(format!(
                    "unsupported sample format {other:?}"
                )));
            }
        };

        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate,
            channels,
            "audio output ready"
        );
        Ok(Self {
            stream,
            mixer,
            sample_rate,
        })
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    mixer: &Arc<Mutex<VoiceMixer>>,
) -> Result<cpal::Stream, ChimeError>
where
    T: SizedSample + FromSample<f32>,
{
    let mixer = Arc::clone(mixer);
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut guard = mixer.lock().ok();
                for frame in data.chunks_mut(channels) {
                    let value = guard
                        .as_mut()
                        .map(|mixer| mixer.next_sample())
                        .unwrap_or(0.0);
                    let sample = T::from_sample(value);
                    for slot in frame.iter_mut() {
                        *slot = sample;
                    }
                }
            },
            |err| warn!(%err, "audio stream error"),
            None,
        )
        .map_err(|err| ChimeError::AudioUnavailable(format!("could not build output stream: {err}")))
}
