use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error};

use crate::audio::buffer::{ChannelMix, SlotTable, MAX_CHANNELS};
use crate::error::AudioError;

/// Sample format of data handed to [`AudioSink::submit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkSampleFormat {
    /// Signed 8-bit samples, one byte each
    Pcm8,
    /// Signed 16-bit little-endian samples
    Pcm16,
}

/// Called by the sink whenever a submitted slot finishes playing. Must be
/// cheap and non-blocking; it runs on the audio output thread.
pub type CompletionNotifier = Arc<dyn Fn() + Send + Sync>;

/// Output half of the playback engine.
///
/// The buffer engine pushes decoded slot buffers in; the sink plays them
/// and flips the matching slot-table flag when each one drains. Mix gains
/// are per source channel and take effect immediately, including for
/// buffers already queued.
pub trait AudioSink {
    /// Attach the completion plumbing. Called once, before any submit.
    fn install(&mut self, slots: Arc<SlotTable>, notifier: CompletionNotifier);

    /// Prepare output for a new track.
    fn configure(
        &mut self,
        sample_rate: f32,
        format: SinkSampleFormat,
        channels: usize,
    ) -> Result<(), AudioError>;

    fn set_mix(&mut self, channel: usize, mix: ChannelMix);

    /// Queue one slot's worth of samples on a source channel.
    fn submit(&mut self, channel: usize, slot: usize, data: &[u8]) -> Result<(), AudioError>;

    fn set_paused(&mut self, paused: bool);

    fn is_paused(&self) -> bool;

    /// Drop everything queued and stop output until the next configure.
    fn reset(&mut self);
}

struct SlotChunk {
    slot: usize,
    samples: Vec<f32>,
    pos: usize,
}

struct CpalShared {
    queues: [Mutex<VecDeque<SlotChunk>>; MAX_CHANNELS],
    mixes: [Mutex<ChannelMix>; MAX_CHANNELS],
    paused: AtomicBool,
    control: Mutex<SinkControl>,
}

#[derive(Default)]
struct SinkControl {
    slots: Option<Arc<SlotTable>>,
    notifier: Option<CompletionNotifier>,
}

/// Real audio output through the default cpal device.
///
/// The device is acquired lazily in `configure` so construction never
/// fails; a missing device surfaces as a per-track error and the
/// transport's skip logic handles it like any other bad track.
pub struct CpalSink {
    shared: Arc<CpalShared>,
    stream: Option<cpal::Stream>,
    format: SinkSampleFormat,
    channels: usize,
}

impl CpalSink {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(CpalShared {
                queues: [Mutex::new(VecDeque::new()), Mutex::new(VecDeque::new())],
                mixes: [
                    Mutex::new(ChannelMix::SILENT),
                    Mutex::new(ChannelMix::SILENT),
                ],
                paused: AtomicBool::new(false),
                control: Mutex::new(SinkControl::default()),
            }),
            stream: None,
            format: SinkSampleFormat::Pcm16,
            channels: 0,
        }
    }
}

impl Default for CpalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for CpalSink {
    fn install(&mut self, slots: Arc<SlotTable>, notifier: CompletionNotifier) {
        let mut control = self.shared.control.lock().unwrap();
        control.slots = Some(slots);
        control.notifier = Some(notifier);
    }

    fn configure(
        &mut self,
        sample_rate: f32,
        format: SinkSampleFormat,
        channels: usize,
    ) -> Result<(), AudioError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        // Tear down any previous stream before rebuilding
        self.stream = None;
        for queue in &self.shared.queues {
            queue.lock().unwrap().clear();
        }
        self.format = format;
        self.channels = channels;

        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| AudioError::SinkUnavailable("no default output device".into()))?;

        let config = cpal::StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(sample_rate as u32),
            buffer_size: cpal::BufferSize::Default,
        };
        debug!(
            "opening output stream: {} Hz, {} source channel(s)",
            sample_rate as u32, channels
        );

        let shared = Arc::clone(&self.shared);
        let stream = device
            .build_output_stream(
                &config,
                move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render(&shared, channels, out);
                },
                |err| error!("output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::InitializationFailed(e.to_string()))?;
        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn set_mix(&mut self, channel: usize, mix: ChannelMix) {
        *self.shared.mixes[channel].lock().unwrap() = mix;
    }

    fn submit(&mut self, channel: usize, slot: usize, data: &[u8]) -> Result<(), AudioError> {
        let samples: Vec<f32> = match self.format {
            SinkSampleFormat::Pcm8 => data.iter().map(|&b| b as i8 as f32 / 128.0).collect(),
            SinkSampleFormat::Pcm16 => data
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
                .collect(),
        };
        self.shared.queues[channel]
            .lock()
            .unwrap()
            .push_back(SlotChunk { slot, samples, pos: 0 });
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) {
        self.shared.paused.store(paused, Ordering::SeqCst);
    }

    fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    fn reset(&mut self) {
        self.stream = None;
        for queue in &self.shared.queues {
            queue.lock().unwrap().clear();
        }
    }
}

/// Output callback body. Mixes the front chunk of every source channel
/// into the interleaved stereo buffer; emits silence while paused or
/// starved. Completion work is O(1) per finished chunk: a flag flip and
/// one notifier call.
fn render(shared: &CpalShared, channels: usize, out: &mut [f32]) {
    out.fill(0.0);
    if shared.paused.load(Ordering::SeqCst) {
        return;
    }
    for channel in 0..channels {
        let mix = *shared.mixes[channel].lock().unwrap();
        let mut queue = shared.queues[channel].lock().unwrap();
        for frame in out.chunks_exact_mut(2) {
            let chunk = match queue.front_mut() {
                Some(chunk) => chunk,
                None => break,
            };
            let sample = chunk.samples[chunk.pos];
            chunk.pos += 1;
            frame[0] += sample * mix.left;
            frame[1] += sample * mix.right;
            if chunk.pos == chunk.samples.len() {
                let finished = queue.pop_front().unwrap();
                let control = shared.control.lock().unwrap();
                if let Some(slots) = &control.slots {
                    slots.mark_done(channel, finished.slot);
                }
                if let Some(notifier) = &control.notifier {
                    notifier();
                }
            }
        }
    }
}

/// Scripted sink for engine tests: records every call and completes slots
/// only when the test says so.
#[cfg(test)]
pub struct ManualSink {
    state: Arc<Mutex<ManualState>>,
}

#[cfg(test)]
#[derive(Clone)]
pub struct ManualSinkHandle {
    state: Arc<Mutex<ManualState>>,
}

#[cfg(test)]
#[derive(Default)]
struct ManualState {
    configured: Option<(f32, SinkSampleFormat, usize)>,
    configure_count: usize,
    mixes: [Option<ChannelMix>; MAX_CHANNELS],
    submissions: Vec<(usize, usize, usize)>,
    queued: [[bool; 2]; MAX_CHANNELS],
    paused: bool,
    slots: Option<Arc<SlotTable>>,
    notifier: Option<CompletionNotifier>,
}

#[cfg(test)]
impl ManualSink {
    pub fn new() -> (Self, ManualSinkHandle) {
        let state = Arc::new(Mutex::new(ManualState::default()));
        (
            Self { state: Arc::clone(&state) },
            ManualSinkHandle { state },
        )
    }
}

#[cfg(test)]
impl ManualSinkHandle {
    /// Complete every queued channel buffer for a slot, as the audio
    /// thread would when the slot drains.
    pub fn complete_slot(&self, slot: usize) {
        let notifier = {
            let mut state = self.state.lock().unwrap();
            let mut any = false;
            for channel in 0..MAX_CHANNELS {
                if state.queued[channel][slot] {
                    state.queued[channel][slot] = false;
                    if let Some(slots) = &state.slots {
                        slots.mark_done(channel, slot);
                    }
                    any = true;
                }
            }
            if any { state.notifier.clone() } else { None }
        };
        if let Some(notifier) = notifier {
            notifier();
        }
    }

    pub fn configured(&self) -> Option<(f32, SinkSampleFormat, usize)> {
        self.state.lock().unwrap().configured
    }

    pub fn configure_count(&self) -> usize {
        self.state.lock().unwrap().configure_count
    }

    pub fn mix(&self, channel: usize) -> Option<ChannelMix> {
        self.state.lock().unwrap().mixes[channel]
    }

    /// (channel, slot, byte length) of every submit call so far
    pub fn submissions(&self) -> Vec<(usize, usize, usize)> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }
}

#[cfg(test)]
impl AudioSink for ManualSink {
    fn install(&mut self, slots: Arc<SlotTable>, notifier: CompletionNotifier) {
        let mut state = self.state.lock().unwrap();
        state.slots = Some(slots);
        state.notifier = Some(notifier);
    }

    fn configure(
        &mut self,
        sample_rate: f32,
        format: SinkSampleFormat,
        channels: usize,
    ) -> Result<(), AudioError> {
        let mut state = self.state.lock().unwrap();
        state.configured = Some((sample_rate, format, channels));
        state.configure_count += 1;
        state.queued = [[false; 2]; MAX_CHANNELS];
        Ok(())
    }

    fn set_mix(&mut self, channel: usize, mix: ChannelMix) {
        self.state.lock().unwrap().mixes[channel] = Some(mix);
    }

    fn submit(&mut self, channel: usize, slot: usize, data: &[u8]) -> Result<(), AudioError> {
        let mut state = self.state.lock().unwrap();
        state.submissions.push((channel, slot, data.len()));
        state.queued[channel][slot] = true;
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) {
        self.state.lock().unwrap().paused = paused;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    fn reset(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.queued = [[false; 2]; MAX_CHANNELS];
    }
}
