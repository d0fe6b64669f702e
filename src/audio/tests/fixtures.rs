//! Bit-exact container image builder for tests.
//!
//! Produces the same layout as the reference encoder: primary header at
//! zero, optional extension header at 0x40 with the vendor comment block
//! right behind it, then the info block, then the data block.

use std::path::{Path, PathBuf};

use crate::audio::container::{DspContext, ImaContext};

/// PCM16 quantization the reference encoder uses: truncation toward zero,
/// not rounding
pub fn quantize_f32(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|s| (s * 32767.0) as i16).collect()
}

/// Half-amplitude sine wave, handy as recognizable sample data
pub fn sine_i16(freq: f32, rate: u32, frames: usize) -> Vec<i16> {
    (0..frames)
        .map(|i| {
            let t = i as f32 / rate as f32;
            ((t * freq * std::f32::consts::TAU).sin() * 32767.0 * 0.5) as i16
        })
        .collect()
}

enum SeedSpec {
    None,
    Ima(ImaContext, ImaContext),
    Dsp([i16; 16], DspContext, DspContext),
}

struct ChannelSpec {
    data: Vec<u8>,
    seed: SeedSpec,
}

pub struct CwavFixture {
    encoding: u8,
    rate: u32,
    end_frame: u32,
    loop_flag: bool,
    loop_start: u32,
    channels: Vec<ChannelSpec>,
    tags: Vec<(String, String)>,
    unknown_ext: Vec<u16>,
}

impl CwavFixture {
    pub fn pcm16(rate: u32, channels: Vec<Vec<i16>>) -> Self {
        let end_frame = channels.first().map(|c| c.len()).unwrap_or(0) as u32;
        let channels = channels
            .into_iter()
            .map(|samples| ChannelSpec {
                data: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
                seed: SeedSpec::None,
            })
            .collect();
        Self {
            encoding: 1,
            rate,
            end_frame,
            loop_flag: false,
            loop_start: 0,
            channels,
            tags: Vec::new(),
            unknown_ext: Vec::new(),
        }
    }

    pub fn pcm8(rate: u32, channels: Vec<Vec<u8>>) -> Self {
        let end_frame = channels.first().map(|c| c.len()).unwrap_or(0) as u32;
        let channels = channels
            .into_iter()
            .map(|data| ChannelSpec { data, seed: SeedSpec::None })
            .collect();
        Self {
            encoding: 0,
            rate,
            end_frame,
            loop_flag: false,
            loop_start: 0,
            channels,
            tags: Vec::new(),
            unknown_ext: Vec::new(),
        }
    }

    /// Raw IMA nibble data plus the start and loop-point contexts
    pub fn ima(
        rate: u32,
        channels: Vec<(Vec<u8>, ImaContext, ImaContext)>,
        end_frame: u32,
    ) -> Self {
        let channels = channels
            .into_iter()
            .map(|(data, start, at_loop)| ChannelSpec {
                data,
                seed: SeedSpec::Ima(start, at_loop),
            })
            .collect();
        Self {
            encoding: 3,
            rate,
            end_frame,
            loop_flag: false,
            loop_start: 0,
            channels,
            tags: Vec::new(),
            unknown_ext: Vec::new(),
        }
    }

    /// Raw 8-byte DSP frames with a shared coefficient table and zeroed
    /// start/loop contexts
    pub fn dsp(rate: u32, channels: Vec<Vec<u8>>, coefficients: [i16; 16], end_frame: u32) -> Self {
        let channels = channels
            .into_iter()
            .map(|data| ChannelSpec {
                data,
                seed: SeedSpec::Dsp(coefficients, DspContext::default(), DspContext::default()),
            })
            .collect();
        Self {
            encoding: 2,
            rate,
            end_frame,
            loop_flag: false,
            loop_start: 0,
            channels,
            tags: Vec::new(),
            unknown_ext: Vec::new(),
        }
    }

    pub fn with_loop(mut self, start: u32) -> Self {
        self.loop_flag = true;
        self.loop_start = start;
        self
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.push((key.to_string(), value.to_string()));
        self
    }

    /// Add an extension reference of a type the reader does not know
    pub fn with_unknown_extension(mut self, type_id: u16) -> Self {
        self.unknown_ext.push(type_id);
        self
    }

    /// Byte offset of the info block in a built image
    pub fn info_block_offset(image: &[u8]) -> usize {
        u32::from_le_bytes([image[0x18], image[0x19], image[0x1A], image[0x1B]]) as usize
    }

    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }

    pub fn build(&self) -> Vec<u8> {
        let c = self.channels.len();

        // Vendor comment block, if any tags were requested
        let vcom = if self.tags.is_empty() {
            Vec::new()
        } else {
            let vendor = b"hwav-player tests";
            let mut block = Vec::new();
            block.extend_from_slice(b"VCOM");
            block.extend_from_slice(&0u32.to_le_bytes()); // size, patched below
            block.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
            block.extend_from_slice(vendor);
            block.extend_from_slice(&(self.tags.len() as u32).to_le_bytes());
            for (key, value) in &self.tags {
                let entry = format!("{}={}", key, value);
                block.extend_from_slice(&(entry.len() as u32).to_le_bytes());
                block.extend_from_slice(entry.as_bytes());
            }
            let size = (block.len() as u32).to_le_bytes();
            block[4..8].copy_from_slice(&size);
            block
        };

        let ext_count = usize::from(!vcom.is_empty()) + self.unknown_ext.len();
        let hwav_size = if ext_count > 0 { 6 + 12 * ext_count } else { 0 };
        let vcom_off = 0x40 + hwav_size;
        let info_off = vcom_off + vcom.len();

        let rec_size: usize = match self.encoding {
            2 => 46,
            3 => 8,
            _ => 0,
        };
        let info_size = 0x20 + (8 + 0x14) * c + rec_size * c;

        let payload_total: usize = self.channels.iter().map(|ch| ch.data.len()).sum();
        let data_off = info_off + info_size;
        let data_size = 8 + payload_total;
        let file_size = data_off + data_size;

        let mut img = Vec::with_capacity(file_size);
        img.extend_from_slice(b"CWAV");
        img.extend_from_slice(&0xFEFFu16.to_le_bytes());
        img.extend_from_slice(&0x40u16.to_le_bytes());
        img.extend_from_slice(&0x0201_0000u32.to_le_bytes());
        img.extend_from_slice(&(file_size as u32).to_le_bytes());
        img.extend_from_slice(&2u16.to_le_bytes());
        img.extend_from_slice(&0u16.to_le_bytes());
        push_sized_ref(&mut img, 0x7000, info_off as u32, info_size as u32);
        push_sized_ref(&mut img, 0x7001, data_off as u32, data_size as u32);
        img.resize(0x40, 0);

        if ext_count > 0 {
            img.extend_from_slice(b"HWAV");
            img.extend_from_slice(&(ext_count as u16).to_le_bytes());
            if !vcom.is_empty() {
                push_sized_ref(&mut img, 0x8000, vcom_off as u32, vcom.len() as u32);
            }
            for &type_id in &self.unknown_ext {
                push_sized_ref(&mut img, type_id, 0, 4);
            }
            img.extend_from_slice(&vcom);
        }

        // Info block
        img.extend_from_slice(b"INFO");
        img.extend_from_slice(&(info_size as u32).to_le_bytes());
        img.push(self.encoding);
        img.push(self.loop_flag as u8);
        img.extend_from_slice(&0u16.to_le_bytes());
        img.extend_from_slice(&self.rate.to_le_bytes());
        img.extend_from_slice(&self.loop_start.to_le_bytes());
        img.extend_from_slice(&self.end_frame.to_le_bytes());
        img.extend_from_slice(&0u32.to_le_bytes());
        img.extend_from_slice(&(c as u32).to_le_bytes());

        // Channel references, relative to the reference-count field
        for i in 0..c {
            img.extend_from_slice(&0x7100u16.to_le_bytes());
            img.extend_from_slice(&0u16.to_le_bytes());
            img.extend_from_slice(&((4 + 8 * c + 0x14 * i) as u32).to_le_bytes());
        }

        // Channel infos
        let recs_base = 0x20 + (8 + 0x14) * c;
        let mut running_offset = 8usize;
        for (i, ch) in self.channels.iter().enumerate() {
            let channel_base = 0x20 + 8 * c + 0x14 * i;
            img.extend_from_slice(&0x1F00u16.to_le_bytes());
            img.extend_from_slice(&0u16.to_le_bytes());
            img.extend_from_slice(&(running_offset as u32).to_le_bytes());
            running_offset += ch.data.len();

            let (adpcm_type, adpcm_rel): (u16, u32) = match &ch.seed {
                SeedSpec::None => (0, 0),
                SeedSpec::Ima(..) => (0x0301, (recs_base + rec_size * i - channel_base) as u32),
                SeedSpec::Dsp(..) => (0x0300, (recs_base + rec_size * i - channel_base) as u32),
            };
            img.extend_from_slice(&adpcm_type.to_le_bytes());
            img.extend_from_slice(&0u16.to_le_bytes());
            img.extend_from_slice(&adpcm_rel.to_le_bytes());
            img.extend_from_slice(&0u32.to_le_bytes()); // reserved
        }

        // ADPCM seed records
        for ch in &self.channels {
            match &ch.seed {
                SeedSpec::None => {}
                SeedSpec::Ima(start, at_loop) => {
                    img.extend_from_slice(&start.predictor.to_le_bytes());
                    img.push(start.step_index);
                    img.push(0);
                    img.extend_from_slice(&at_loop.predictor.to_le_bytes());
                    img.push(at_loop.step_index);
                    img.push(0);
                }
                SeedSpec::Dsp(coefficients, start, at_loop) => {
                    for coef in coefficients {
                        img.extend_from_slice(&coef.to_le_bytes());
                    }
                    for ctx in [start, at_loop] {
                        img.extend_from_slice(&ctx.header.to_le_bytes());
                        img.extend_from_slice(&ctx.prev.to_le_bytes());
                        img.extend_from_slice(&ctx.prev2.to_le_bytes());
                    }
                    img.extend_from_slice(&0u16.to_le_bytes());
                }
            }
        }

        // Data block
        img.extend_from_slice(b"DATA");
        img.extend_from_slice(&(data_size as u32).to_le_bytes());
        for ch in &self.channels {
            img.extend_from_slice(&ch.data);
        }

        debug_assert_eq!(img.len(), file_size);
        img
    }
}

fn push_sized_ref(img: &mut Vec<u8>, type_id: u16, offset: u32, size: u32) {
    img.extend_from_slice(&type_id.to_le_bytes());
    img.extend_from_slice(&0u16.to_le_bytes());
    img.extend_from_slice(&offset.to_le_bytes());
    img.extend_from_slice(&size.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_matches_declared_file_size() {
        let image = CwavFixture::pcm16(44100, vec![vec![0i16; 64], vec![0i16; 64]])
            .with_tag("title", "x")
            .build();
        let declared = u32::from_le_bytes([image[12], image[13], image[14], image[15]]);
        assert_eq!(declared as usize, image.len());
    }

    #[test]
    fn test_info_block_offset_points_at_magic() {
        let image = CwavFixture::pcm16(44100, vec![vec![0i16; 16]]).build();
        let at = CwavFixture::info_block_offset(&image);
        assert_eq!(&image[at..at + 4], b"INFO");
    }

    #[test]
    fn test_extension_header_sits_at_fixed_offset() {
        let image = CwavFixture::pcm16(44100, vec![vec![0i16; 16]])
            .with_tag("artist", "someone")
            .build();
        assert_eq!(&image[0x40..0x44], b"HWAV");
        assert_eq!(&image[0x52..0x56], b"VCOM");
    }
}
