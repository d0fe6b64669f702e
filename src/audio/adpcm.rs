//! ADPCM decode primitives.
//!
//! Two compressed encodings appear in containers: IMA-ADPCM (4 bits per
//! sample, two samples per byte, low nibble first) and DSP-ADPCM (8-byte
//! frames carrying a coefficient/shift header byte plus 14 samples, high
//! nibble first). Both decoders are pure functions over an explicit
//! context struct so the sample decoder can snapshot and restore state at
//! the stream start and at the loop point.

use crate::audio::container::{DspContext, ImaContext};

/// Samples carried by one DSP-ADPCM frame
pub const DSP_FRAME_SAMPLES: u32 = 14;
/// Bytes occupied by one DSP-ADPCM frame
pub const DSP_FRAME_BYTES: u32 = 8;

const IMA_STEP_TABLE: [i32; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

const IMA_INDEX_TABLE: [i8; 16] = [-1, -1, -1, -1, 2, 4, 6, 8, -1, -1, -1, -1, 2, 4, 6, 8];

/// Mutable IMA decode state. Built from a stored [`ImaContext`] seed and
/// convertible back for snapshotting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImaState {
    predictor: i32,
    step_index: i32,
}

impl ImaState {
    pub fn from_context(ctx: ImaContext) -> Self {
        Self {
            predictor: ctx.predictor as i32,
            // Stored seeds are untrusted; clamp rather than index out of range
            step_index: (ctx.step_index as i32).clamp(0, 88),
        }
    }

    pub fn to_context(self) -> ImaContext {
        ImaContext {
            predictor: self.predictor as i16,
            step_index: self.step_index as u8,
        }
    }

    /// Decode one 4-bit code and return the reconstructed sample.
    pub fn decode_nibble(&mut self, nibble: u8) -> i16 {
        let step = IMA_STEP_TABLE[self.step_index as usize];
        let mut diff = step >> 3;
        if nibble & 4 != 0 {
            diff += step;
        }
        if nibble & 2 != 0 {
            diff += step >> 1;
        }
        if nibble & 1 != 0 {
            diff += step >> 2;
        }
        if nibble & 8 != 0 {
            self.predictor -= diff;
        } else {
            self.predictor += diff;
        }
        self.predictor = self.predictor.clamp(i16::MIN as i32, i16::MAX as i32);
        self.step_index =
            (self.step_index + IMA_INDEX_TABLE[(nibble & 0xF) as usize] as i32).clamp(0, 88);
        self.predictor as i16
    }
}

/// Mutable DSP decode state: the two-sample history the predictor runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DspState {
    hist1: i32,
    hist2: i32,
}

impl DspState {
    pub fn from_context(ctx: DspContext) -> Self {
        Self {
            hist1: ctx.prev as i32,
            hist2: ctx.prev2 as i32,
        }
    }

    pub fn to_context(self, header: u16) -> DspContext {
        DspContext {
            header,
            prev: self.hist1 as i16,
            prev2: self.hist2 as i16,
        }
    }

    /// Decode one 8-byte frame into 14 samples. The first byte selects the
    /// coefficient pair (high nibble) and scale shift (low nibble); the
    /// remaining 7 bytes carry signed 4-bit codes, high nibble first.
    pub fn decode_frame(&mut self, coefficients: &[i16; 16], frame: &[u8], out: &mut [i16]) {
        debug_assert_eq!(frame.len(), DSP_FRAME_BYTES as usize);
        debug_assert_eq!(out.len(), DSP_FRAME_SAMPLES as usize);

        let header = frame[0];
        let shift = (header & 0x0F) as i32;
        // Coefficient index is 3 bits in practice; mask keeps a corrupt
        // header from indexing past the table
        let pair = ((header >> 4) & 0x07) as usize;
        let c1 = coefficients[pair * 2] as i32;
        let c2 = coefficients[pair * 2 + 1] as i32;

        for (i, sample) in out.iter_mut().enumerate() {
            let byte = frame[1 + i / 2];
            let code = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
            // Sign-extend the 4-bit code
            let code = ((code as i32) << 28) >> 28;

            let predicted = (code << shift) * 2048 + 1024 + c1 * self.hist1 + c2 * self.hist2;
            let value = (predicted >> 11).clamp(i16::MIN as i32, i16::MAX as i32);
            self.hist2 = self.hist1;
            self.hist1 = value;
            *sample = value as i16;
        }
    }
}

/// Byte offset of the frame holding sample `frame_index`, from the start of
/// a channel's DSP-ADPCM sample data.
pub fn dsp_byte_offset(frame_index: u32) -> u64 {
    (frame_index as u64 / DSP_FRAME_SAMPLES as u64) * DSP_FRAME_BYTES as u64
}
