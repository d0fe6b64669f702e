use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;

use crate::audio::decoder::SampleDecoder;
use crate::audio::sink::{AudioSink, CompletionNotifier, SinkSampleFormat};
use crate::audio::Encoding;
use crate::error::AudioError;

/// Bytes of decoded data per slot, per channel
pub const SLOT_CAPACITY: usize = 0x8000;
/// Slots per channel; one plays while the other refills
pub const SLOT_COUNT: usize = 2;
pub const MAX_CHANNELS: usize = 2;

/// Stereo gain pair applied to one source channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMix {
    pub left: f32,
    pub right: f32,
}

impl ChannelMix {
    pub const SILENT: ChannelMix = ChannelMix { left: 0.0, right: 0.0 };
}

/// Routing for a source channel into the stereo output.
///
/// Mono sources go to both speakers at full gain. Stereo sources map
/// directly, unless mono output is forced, in which case each side
/// contributes half to both speakers.
pub fn mix_for(channel_count: usize, channel: usize, force_mono: bool) -> ChannelMix {
    match (channel_count, force_mono) {
        (1, _) => ChannelMix { left: 1.0, right: 1.0 },
        (_, true) => ChannelMix { left: 0.5, right: 0.5 },
        (_, false) => {
            if channel == 0 {
                ChannelMix { left: 1.0, right: 0.0 }
            } else {
                ChannelMix { left: 0.0, right: 1.0 }
            }
        }
    }
}

/// Shared completion flags, one per (channel, slot). Flipped by the sink's
/// output thread, read by the transport worker. A flag is true when the
/// slot is free (nothing submitted, or the submitted buffer has drained).
#[derive(Debug)]
pub struct SlotTable {
    done: [[AtomicBool; SLOT_COUNT]; MAX_CHANNELS],
    active_channels: AtomicUsize,
}

impl SlotTable {
    pub fn new() -> Self {
        Self {
            done: [
                [AtomicBool::new(true), AtomicBool::new(true)],
                [AtomicBool::new(true), AtomicBool::new(true)],
            ],
            active_channels: AtomicUsize::new(0),
        }
    }

    /// Free every slot and record how many channels the current track has.
    pub fn reset(&self, channels: usize) {
        self.active_channels.store(channels, Ordering::SeqCst);
        for row in &self.done {
            for flag in row {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }

    pub fn mark_busy(&self, channel: usize, slot: usize) {
        self.done[channel][slot].store(false, Ordering::SeqCst);
    }

    pub fn mark_done(&self, channel: usize, slot: usize) {
        self.done[channel][slot].store(true, Ordering::SeqCst);
    }

    pub fn is_done(&self, channel: usize, slot: usize) -> bool {
        self.done[channel][slot].load(Ordering::SeqCst)
    }

    /// True when every active channel has drained the given slot
    pub fn pair_done(&self, slot: usize) -> bool {
        let channels = self.active_channels.load(Ordering::SeqCst);
        (0..channels).all(|ch| self.is_done(ch, slot))
    }

    /// True when nothing at all is still queued or playing
    pub fn all_done(&self) -> bool {
        (0..SLOT_COUNT).all(|slot| self.pair_done(slot))
    }
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one refill pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillOutcome {
    /// At least one channel produced data and was submitted
    Filled,
    /// Every channel is out of samples; nothing was submitted
    Exhausted,
}

/// Double-buffered feeder between a [`SampleDecoder`] and an [`AudioSink`].
///
/// Each refill decodes every channel before submitting any of them, so a
/// slot is always handed to the sink as a complete unit and the channels
/// can never drift against each other mid-slot.
pub struct BufferEngine {
    sink: Box<dyn AudioSink>,
    slots: Arc<SlotTable>,
    staged: [Vec<u8>; MAX_CHANNELS],
    channels: usize,
}

impl BufferEngine {
    pub fn new(mut sink: Box<dyn AudioSink>, notifier: CompletionNotifier) -> Self {
        let slots = Arc::new(SlotTable::new());
        sink.install(Arc::clone(&slots), notifier);
        Self {
            sink,
            slots,
            staged: [vec![0; SLOT_CAPACITY], vec![0; SLOT_CAPACITY]],
            channels: 0,
        }
    }

    pub fn slots(&self) -> &Arc<SlotTable> {
        &self.slots
    }

    /// Configure the sink for a freshly opened track and prime both slots.
    pub fn load(
        &mut self,
        decoder: &mut SampleDecoder,
        force_mono: bool,
    ) -> Result<(), AudioError> {
        let container = decoder.container();
        self.channels = container.channel_count();
        let format = match container.encoding() {
            Encoding::Pcm8 => SinkSampleFormat::Pcm8,
            _ => SinkSampleFormat::Pcm16,
        };
        debug!(
            "loading track into engine: {} Hz, {:?}, {} channel(s)",
            container.sample_rate(),
            format,
            self.channels
        );

        self.sink.reset();
        self.slots.reset(self.channels);
        self.sink
            .configure(container.sample_rate(), format, self.channels)?;
        self.reconfigure_mix(force_mono);
        self.sink.set_paused(false);

        for slot in 0..SLOT_COUNT {
            if !decoder.can_read() {
                break;
            }
            self.refill(decoder, slot)?;
        }
        Ok(())
    }

    /// Decode one slot's worth of every channel, then submit the lot.
    ///
    /// One dry channel invalidates the whole slot: a partial commit would
    /// leave the channels out of step for the rest of the track, so the
    /// slot is abandoned and exhaustion reported instead.
    pub fn refill(
        &mut self,
        decoder: &mut SampleDecoder,
        slot: usize,
    ) -> Result<RefillOutcome, AudioError> {
        let mut lengths = [0usize; MAX_CHANNELS];
        for channel in 0..self.channels {
            lengths[channel] = decoder.read(channel, &mut self.staged[channel])?;
        }
        if lengths[..self.channels].iter().any(|&n| n == 0) {
            return Ok(RefillOutcome::Exhausted);
        }
        for channel in 0..self.channels {
            self.slots.mark_busy(channel, slot);
            self.sink
                .submit(channel, slot, &self.staged[channel][..lengths[channel]])?;
        }
        Ok(RefillOutcome::Filled)
    }

    /// Re-apply mix routing for the current track.
    pub fn reconfigure_mix(&mut self, force_mono: bool) {
        for channel in 0..self.channels {
            self.sink
                .set_mix(channel, mix_for(self.channels, channel, force_mono));
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.sink.set_paused(paused);
    }

    pub fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }

    /// Stop output and free every slot.
    pub fn reset(&mut self) {
        self.sink.reset();
        self.slots.reset(0);
    }
}
