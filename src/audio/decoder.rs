use std::path::Path;

use crate::audio::adpcm::{dsp_byte_offset, DspState, ImaState, DSP_FRAME_BYTES, DSP_FRAME_SAMPLES};
use crate::audio::container::{AdpcmSeed, Container, Encoding};
use crate::error::{DecodeError, ParseError};

/// Which stored context snapshot to restore when repositioning
#[derive(Debug, Clone, Copy)]
enum Snapshot {
    Start,
    Loop,
}

#[derive(Debug, Clone, Copy)]
enum CursorState {
    Pcm,
    Ima(ImaState),
    Dsp(DspState),
}

/// Read position of one channel. `frame` counts samples handed to the
/// caller; for DSP-ADPCM the tail of the last decoded frame waits in
/// `pending` until the next read drains it.
#[derive(Debug)]
struct ChannelCursor {
    frame: u32,
    state: CursorState,
    pending: [i16; DSP_FRAME_SAMPLES as usize],
    pending_len: usize,
    pending_pos: usize,
}

impl ChannelCursor {
    fn seek(&mut self, frame: u32, seed: &AdpcmSeed, snapshot: Snapshot) {
        self.frame = frame;
        self.pending_len = 0;
        self.pending_pos = 0;
        self.state = match (seed, snapshot) {
            (AdpcmSeed::None, _) => CursorState::Pcm,
            (AdpcmSeed::Ima { start, .. }, Snapshot::Start) => {
                CursorState::Ima(ImaState::from_context(*start))
            }
            (AdpcmSeed::Ima { at_loop, .. }, Snapshot::Loop) => {
                CursorState::Ima(ImaState::from_context(*at_loop))
            }
            (AdpcmSeed::Dsp { start, .. }, Snapshot::Start) => {
                CursorState::Dsp(DspState::from_context(*start))
            }
            (AdpcmSeed::Dsp { at_loop, .. }, Snapshot::Loop) => {
                CursorState::Dsp(DspState::from_context(*at_loop))
            }
        };
    }
}

/// Pull-based sample decoder over an open container.
///
/// Each channel advances independently; `read` produces little-endian
/// PCM bytes (one byte per sample for PCM8 sources, two otherwise) and
/// never blocks past the end frame. Repositioning restores the decode
/// context snapshots stored in the container.
#[derive(Debug)]
pub struct SampleDecoder {
    container: Container,
    cursors: Vec<ChannelCursor>,
    scratch: Vec<u8>,
}

impl SampleDecoder {
    /// Parse a container and stand up decode cursors at the stream start.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ParseError> {
        Ok(Self::new(Container::open(path)?))
    }

    pub fn new(container: Container) -> Self {
        let mut cursors = Vec::with_capacity(container.channel_count());
        for channel in 0..container.channel_count() {
            let mut cursor = ChannelCursor {
                frame: 0,
                state: CursorState::Pcm,
                pending: [0; DSP_FRAME_SAMPLES as usize],
                pending_len: 0,
                pending_pos: 0,
            };
            cursor.seek(0, container.seed(channel), Snapshot::Start);
            cursors.push(cursor);
        }
        Self { container, cursors, scratch: Vec::new() }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Bytes one decoded sample occupies in the output of `read`
    pub fn output_sample_width(&self) -> usize {
        match self.container.encoding() {
            Encoding::Pcm8 => 1,
            _ => 2,
        }
    }

    /// True while every channel still has frames left before the end frame
    pub fn can_read(&self) -> bool {
        let end = self.container.end_frame();
        self.cursors.iter().all(|c| c.frame < end)
    }

    /// Samples consumed so far on the given channel
    pub fn frames_read(&self, channel: usize) -> u32 {
        self.cursors[channel].frame
    }

    /// Reposition every channel to the loop start frame.
    pub fn to_loop_point(&mut self) {
        let frame = self.container.loop_start();
        for (channel, cursor) in self.cursors.iter_mut().enumerate() {
            cursor.seek(frame, self.container.seed(channel), Snapshot::Loop);
        }
    }

    /// Reposition every channel to the beginning of the stream.
    pub fn to_start(&mut self) {
        for (channel, cursor) in self.cursors.iter_mut().enumerate() {
            cursor.seek(0, self.container.seed(channel), Snapshot::Start);
        }
    }

    /// Decode samples from one channel into `out`, returning the number of
    /// bytes written. A short count means the end frame (or a truncated
    /// data region) was reached; subsequent reads return zero.
    pub fn read(&mut self, channel: usize, out: &mut [u8]) -> Result<usize, DecodeError> {
        let end = self.container.end_frame();
        let frame = self.cursors[channel].frame;
        let remaining = end.saturating_sub(frame) as usize;

        match self.container.encoding() {
            Encoding::Pcm8 | Encoding::Pcm16 => {
                let width = self.container.encoding().sample_width();
                let want = (out.len() / width).min(remaining);
                if want == 0 {
                    return Ok(0);
                }
                let offset = self.container.sample_offset(channel) as u64
                    + frame as u64 * width as u64;
                let got = self.container.read_data(offset, &mut out[..want * width])?;
                let got_frames = got / width;
                self.cursors[channel].frame += got_frames as u32;
                Ok(got_frames * width)
            }
            Encoding::ImaAdpcm => self.read_ima(channel, out, remaining),
            Encoding::DspAdpcm => self.read_dsp(channel, out, remaining),
        }
    }

    fn read_ima(
        &mut self,
        channel: usize,
        out: &mut [u8],
        remaining: usize,
    ) -> Result<usize, DecodeError> {
        let want = (out.len() / 2).min(remaining);
        if want == 0 {
            return Ok(0);
        }
        let frame = self.cursors[channel].frame;
        // Two samples per byte, low nibble first; an odd frame resumes at
        // the high nibble of its byte
        let parity = (frame % 2) as usize;
        let nbytes = (parity + want + 1) / 2;
        let offset = self.container.sample_offset(channel) as u64 + frame as u64 / 2;

        self.scratch.resize(nbytes, 0);
        let got = self.container.read_data(offset, &mut self.scratch)?;
        let available = (got * 2).saturating_sub(parity);
        let count = want.min(available);

        let state = match &mut self.cursors[channel].state {
            CursorState::Ima(state) => state,
            _ => unreachable!("ima read on non-ima cursor"),
        };
        for i in 0..count {
            let at = parity + i;
            let byte = self.scratch[at / 2];
            let nibble = if at % 2 == 0 { byte & 0x0F } else { byte >> 4 };
            let sample = state.decode_nibble(nibble);
            out[i * 2..i * 2 + 2].copy_from_slice(&sample.to_le_bytes());
        }
        self.cursors[channel].frame += count as u32;
        Ok(count * 2)
    }

    fn read_dsp(
        &mut self,
        channel: usize,
        out: &mut [u8],
        remaining: usize,
    ) -> Result<usize, DecodeError> {
        let want = (out.len() / 2).min(remaining);
        if want == 0 {
            return Ok(0);
        }
        let coefficients = match self.container.seed(channel) {
            AdpcmSeed::Dsp { coefficients, .. } => *coefficients,
            _ => unreachable!("dsp read on non-dsp cursor"),
        };
        let sample_offset = self.container.sample_offset(channel) as u64;
        let mut state = match self.cursors[channel].state {
            CursorState::Dsp(state) => state,
            _ => unreachable!("dsp read on non-dsp cursor"),
        };

        let mut produced = 0usize;
        loop {
            // Drain leftovers from the previously decoded frame first
            {
                let cursor = &mut self.cursors[channel];
                while cursor.pending_pos < cursor.pending_len && produced < want {
                    let sample = cursor.pending[cursor.pending_pos];
                    out[produced * 2..produced * 2 + 2].copy_from_slice(&sample.to_le_bytes());
                    cursor.pending_pos += 1;
                    produced += 1;
                }
            }
            if produced == want {
                break;
            }

            // Pending is empty here, so the next frame starts on a frame
            // boundary (loop points are aligned down at open)
            let base_frame = self.cursors[channel].frame + produced as u32;
            let frames_needed =
                ((want - produced) as u32 + DSP_FRAME_SAMPLES - 1) / DSP_FRAME_SAMPLES;
            let nbytes = (frames_needed * DSP_FRAME_BYTES) as usize;
            self.scratch.resize(nbytes, 0);
            let offset = sample_offset + dsp_byte_offset(base_frame);
            let got = self.container.read_data(offset, &mut self.scratch)?;
            let got_frames = got / DSP_FRAME_BYTES as usize;
            if got_frames == 0 {
                break;
            }

            for f in 0..got_frames {
                let frame_bytes = &self.scratch[f * 8..f * 8 + 8];
                let mut samples = [0i16; DSP_FRAME_SAMPLES as usize];
                state.decode_frame(&coefficients, frame_bytes, &mut samples);
                let take = (want - produced).min(DSP_FRAME_SAMPLES as usize);
                for (i, sample) in samples[..take].iter().enumerate() {
                    out[(produced + i) * 2..(produced + i) * 2 + 2]
                        .copy_from_slice(&sample.to_le_bytes());
                }
                produced += take;
                if take < DSP_FRAME_SAMPLES as usize {
                    // Stash the tail for the next call
                    let cursor = &mut self.cursors[channel];
                    cursor.pending = samples;
                    cursor.pending_pos = take;
                    cursor.pending_len = DSP_FRAME_SAMPLES as usize;
                    break;
                }
            }
            if got_frames < frames_needed as usize {
                break;
            }
        }

        let cursor = &mut self.cursors[channel];
        cursor.state = CursorState::Dsp(state);
        cursor.frame += produced as u32;
        Ok(produced * 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::container::ImaContext;
    use crate::audio::tests::fixtures::{quantize_f32, sine_i16, CwavFixture};

    #[test]
    fn test_pcm16_read_returns_requested_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let samples = sine_i16(440.0, 32728, 8000);
        let path = CwavFixture::pcm16(32728, vec![samples.clone()])
            .write_to(dir.path(), "tone.cwav");
        let mut decoder = SampleDecoder::open(&path).unwrap();

        let mut buf = vec![0u8; 8000];
        let n = decoder.read(0, &mut buf).unwrap();
        assert_eq!(n, 8000);
        assert_eq!(decoder.frames_read(0), 4000);
        for (i, sample) in samples[..4000].iter().enumerate() {
            assert_eq!(&buf[i * 2..i * 2 + 2], &sample.to_le_bytes());
        }
    }

    #[test]
    fn test_pcm16_partial_final_read_then_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = CwavFixture::pcm16(32728, vec![sine_i16(440.0, 32728, 1000)])
            .write_to(dir.path(), "tone.cwav");
        let mut decoder = SampleDecoder::open(&path).unwrap();

        let mut buf = vec![0u8; 1500];
        assert_eq!(decoder.read(0, &mut buf).unwrap(), 1500);
        assert!(decoder.can_read());
        // Only 250 frames remain
        assert_eq!(decoder.read(0, &mut buf).unwrap(), 500);
        assert!(!decoder.can_read());
        assert_eq!(decoder.read(0, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_encoded_float_source_round_trips_sample_exact() {
        let dir = tempfile::tempdir().unwrap();
        // Values chosen so truncation and rounding disagree
        let source = vec![0.5f32, -0.5, 0.000_04, -0.000_04, 0.999_99];
        let samples = quantize_f32(&source);
        assert_eq!(samples, vec![16383, -16383, 1, -1, 32766]);
        let path = CwavFixture::pcm16(44100, vec![samples.clone()])
            .write_to(dir.path(), "quantized.cwav");

        let mut decoder = SampleDecoder::open(&path).unwrap();
        let mut buf = vec![0u8; samples.len() * 2];
        assert_eq!(decoder.read(0, &mut buf).unwrap(), buf.len());
        let decoded: Vec<i16> = buf
            .chunks(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_pcm8_reads_single_byte_samples() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..100u8).collect();
        let path = CwavFixture::pcm8(8000, vec![data.clone()])
            .write_to(dir.path(), "bytes.cwav");
        let mut decoder = SampleDecoder::open(&path).unwrap();
        assert_eq!(decoder.output_sample_width(), 1);

        let mut buf = vec![0u8; 100];
        assert_eq!(decoder.read(0, &mut buf).unwrap(), 100);
        assert_eq!(buf, data);
    }

    #[test]
    fn test_stereo_channels_advance_independently() {
        let dir = tempfile::tempdir().unwrap();
        let left: Vec<i16> = (0..500).collect();
        let right: Vec<i16> = (0..500).map(|s| -s).collect();
        let path = CwavFixture::pcm16(44100, vec![left, right])
            .write_to(dir.path(), "stereo.cwav");
        let mut decoder = SampleDecoder::open(&path).unwrap();

        let mut buf = vec![0u8; 1000];
        assert_eq!(decoder.read(0, &mut buf).unwrap(), 1000);
        assert_eq!(decoder.frames_read(0), 500);
        assert_eq!(decoder.frames_read(1), 0);
        // One channel exhausted is enough to stop the stream
        assert!(!decoder.can_read());
        assert_eq!(decoder.read(1, &mut buf).unwrap(), 1000);
        assert_eq!(&buf[..2], &(0i16).to_le_bytes());
        assert_eq!(&buf[2..4], &(-1i16).to_le_bytes());
    }

    #[test]
    fn test_loop_reposition_restores_pcm_playback() {
        let dir = tempfile::tempdir().unwrap();
        let samples: Vec<i16> = (0..200).collect();
        let path = CwavFixture::pcm16(44100, vec![samples])
            .with_loop(50)
            .write_to(dir.path(), "looped.cwav");
        let mut decoder = SampleDecoder::open(&path).unwrap();
        assert!(decoder.container().loop_flag());
        assert_eq!(decoder.container().loop_start(), 50);

        let mut buf = vec![0u8; 400];
        assert_eq!(decoder.read(0, &mut buf).unwrap(), 400);
        assert!(!decoder.can_read());

        decoder.to_loop_point();
        assert!(decoder.can_read());
        assert_eq!(decoder.frames_read(0), 50);
        let mut buf = vec![0u8; 4];
        decoder.read(0, &mut buf).unwrap();
        assert_eq!(&buf[..2], &(50i16).to_le_bytes());

        // Repositioning is idempotent
        decoder.to_loop_point();
        decoder.to_loop_point();
        assert_eq!(decoder.frames_read(0), 50);

        decoder.to_start();
        assert_eq!(decoder.frames_read(0), 0);
        decoder.read(0, &mut buf).unwrap();
        assert_eq!(&buf[..2], &(0i16).to_le_bytes());
    }

    #[test]
    fn test_ima_decode_and_odd_loop_resume() {
        let dir = tempfile::tempdir().unwrap();
        // Nibbles (low first): 0x0, 0x7, 0x8, 0x0 -> samples 0, 11, 9, 10
        let start = ImaContext { predictor: 0, step_index: 0 };
        // Context as it stands after decoding frame 0
        let at_loop = ImaContext { predictor: 0, step_index: 0 };
        let path = CwavFixture::ima(8000, vec![(vec![0x70, 0x08], start, at_loop)], 4)
            .with_loop(1)
            .write_to(dir.path(), "ima.cwav");
        let mut decoder = SampleDecoder::open(&path).unwrap();

        let mut buf = vec![0u8; 8];
        assert_eq!(decoder.read(0, &mut buf).unwrap(), 8);
        let samples: Vec<i16> = buf
            .chunks(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(samples, vec![0, 11, 9, 10]);

        // Resume at frame 1: the first decoded nibble must be the high
        // nibble of byte 0
        decoder.to_loop_point();
        let mut buf = vec![0u8; 6];
        assert_eq!(decoder.read(0, &mut buf).unwrap(), 6);
        let samples: Vec<i16> = buf
            .chunks(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(samples, vec![11, 9, 10]);
    }

    #[test]
    fn test_dsp_decode_across_partial_reads() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = vec![0x00, 0x12, 0xF0, 0, 0, 0, 0, 0];
        data.extend_from_slice(&[0x00, 0x34, 0, 0, 0, 0, 0, 0]);
        let path = CwavFixture::dsp(8000, vec![data], [0i16; 16], 20)
            .write_to(dir.path(), "dsp.cwav");
        let mut decoder = SampleDecoder::open(&path).unwrap();

        // 10 samples now, 10 later; frame two's tail is clipped by the
        // end frame
        let mut first = vec![0u8; 20];
        assert_eq!(decoder.read(0, &mut first).unwrap(), 20);
        let mut second = vec![0u8; 64];
        assert_eq!(decoder.read(0, &mut second).unwrap(), 20);
        assert!(!decoder.can_read());

        let mut samples: Vec<i16> = first
            .chunks(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        samples.extend(second[..20].chunks(2).map(|c| i16::from_le_bytes([c[0], c[1]])));
        let mut expected = vec![1i16, 2, -1, 0];
        expected.extend(std::iter::repeat(0).take(10));
        expected.extend_from_slice(&[3, 4]);
        expected.extend(std::iter::repeat(0).take(4));
        assert_eq!(samples, expected);
    }
}
