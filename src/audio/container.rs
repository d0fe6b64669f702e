use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use log::{debug, warn};

use crate::error::ParseError;

/// Reference type tags used by the container format
const TYPEID_DSP_ADPCM_INFO: u16 = 0x0300;
const TYPEID_IMA_ADPCM_INFO: u16 = 0x0301;
const TYPEID_SAMPLE_DATA: u16 = 0x1F00;
const TYPEID_INFO_BLOCK: u16 = 0x7000;
const TYPEID_DATA_BLOCK: u16 = 0x7001;
const TYPEID_CHANNEL_INFO: u16 = 0x7100;
const TYPEID_VORBIS_COMMENT: u16 = 0x8000;

/// Fixed constants of the primary header
const CWAV_MAGIC: &[u8; 4] = b"CWAV";
const HWAV_MAGIC: &[u8; 4] = b"HWAV";
const INFO_MAGIC: &[u8; 4] = b"INFO";
const VCOM_MAGIC: &[u8; 4] = b"VCOM";
/// Only little-endian containers are accepted
const ENDIAN_MARKER_LE: u16 = 0xFEFF;
const HEADER_SIZE: u16 = 0x40;
const FORMAT_VERSION: u32 = 0x0201_0000;
/// The extension header, when present, always sits right after the
/// primary header + padding
const HWAV_HEADER_OFFSET: u64 = 0x40;

/// Byte offset of the channel-reference-count field inside the info block;
/// channel references are resolved relative to it
const INFO_REFS_BASE: usize = 0x1C;
/// On-disk size of a channel info record
const CHANNEL_INFO_SIZE: usize = 0x14;
/// Largest info block we accept (2 ADPCM channels)
const INFO_BLOCK_CAP: u32 = 0xC0;
/// Largest extension block we will buffer
const EXTENSION_BLOCK_CAP: u32 = 1 << 20;

/// Sample encodings supported by the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Pcm8 = 0,
    Pcm16 = 1,
    DspAdpcm = 2,
    ImaAdpcm = 3,
}

impl Encoding {
    pub fn from_code(code: u8) -> Result<Self, ParseError> {
        match code {
            0 => Ok(Encoding::Pcm8),
            1 => Ok(Encoding::Pcm16),
            2 => Ok(Encoding::DspAdpcm),
            3 => Ok(Encoding::ImaAdpcm),
            code => Err(ParseError::UnsupportedEncoding { code }),
        }
    }

    /// Width in bytes of one stored sample for the PCM encodings
    pub fn sample_width(&self) -> usize {
        match self {
            Encoding::Pcm8 => 1,
            _ => 2,
        }
    }
}

/// Running decode state for one DSP-ADPCM channel at a resume point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DspContext {
    /// Predictor/scale header byte of the frame the context belongs to
    pub header: u16,
    pub prev: i16,
    pub prev2: i16,
}

/// Running decode state for one IMA-ADPCM channel at a resume point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImaContext {
    pub predictor: i16,
    pub step_index: u8,
}

/// Per-channel decode-context seed values read from the info block
#[derive(Debug, Clone, PartialEq)]
pub enum AdpcmSeed {
    None,
    Dsp {
        coefficients: [i16; 16],
        start: DspContext,
        at_loop: DspContext,
    },
    Ima {
        start: ImaContext,
        at_loop: ImaContext,
    },
}

/// A (type, offset, size) triple locating a sub-block
#[derive(Debug, Clone, Copy)]
struct SizedReference {
    type_id: u16,
    offset: u32,
    size: u32,
}

impl SizedReference {
    fn parse(r: &mut LeReader<'_>) -> Result<Self, ParseError> {
        let type_id = r.read_u16()?;
        let _padding = r.read_u16()?;
        let offset = r.read_u32()?;
        let size = r.read_u32()?;
        Ok(Self { type_id, offset, size })
    }

    /// A sized reference is valid iff offset + size fits inside the
    /// containing region. Both fields are content-controlled, so the
    /// addition is done in u64.
    fn check_bounds(&self, region_len: u64, field: &'static str) -> Result<(), ParseError> {
        if self.offset as u64 + self.size as u64 > region_len {
            return Err(ParseError::Bounds { field });
        }
        Ok(())
    }

    fn expect_type(&self, type_id: u16, field: &'static str) -> Result<(), ParseError> {
        if self.type_id != type_id {
            return Err(ParseError::Format { reason: field });
        }
        Ok(())
    }
}

/// Little-endian cursor over an in-memory block
struct LeReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> LeReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        if self.remaining() < n {
            return Err(ParseError::Format { reason: "truncated block" });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> Result<(), ParseError> {
        self.read_bytes(n).map(|_| ())
    }

    fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, ParseError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_i16(&mut self) -> Result<i16, ParseError> {
        Ok(self.read_u16()? as i16)
    }

    fn read_u32(&mut self) -> Result<u32, ParseError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// A validated, decode-ready CWAV/HWAV container.
///
/// Owns the backing file handle for its whole lifetime; the handle is
/// released on drop. Every offset used later by the decoder has been
/// bounds-checked here, so a corrupt file fails closed at open time.
#[derive(Debug)]
pub struct Container {
    file: File,
    channel_count: usize,
    sample_rate: f32,
    encoding: Encoding,
    loop_flag: bool,
    end_frame: u32,
    loop_start: u32,
    data_offset: u32,
    sample_offsets: [u32; 2],
    seeds: [AdpcmSeed; 2],
    title: String,
    artist: Option<String>,
}

impl Container {
    /// Open and fully validate a container file.
    ///
    /// On any failure the file handle is dropped before returning; no
    /// partial state leaks to the caller.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ParseError> {
        let path = path.as_ref();
        debug!("loading container: {}", path.display());

        let mut file = File::open(path)?;
        let file_length = file.metadata()?.len();

        let mut header = [0u8; 0x2C];
        read_exact_at(&mut file, 0, &mut header)?;
        let mut r = LeReader::new(&header);

        if r.read_bytes(4)? != CWAV_MAGIC {
            return Err(ParseError::Format { reason: "bad magic" });
        }
        if r.read_u16()? != ENDIAN_MARKER_LE {
            return Err(ParseError::Format { reason: "unsupported endianness" });
        }
        if r.read_u16()? != HEADER_SIZE {
            return Err(ParseError::Format { reason: "unexpected header size" });
        }
        if r.read_u32()? != FORMAT_VERSION {
            return Err(ParseError::Format { reason: "unsupported format version" });
        }
        if r.read_u32()? as u64 != file_length {
            return Err(ParseError::Format { reason: "declared file size mismatch" });
        }
        if r.read_u16()? != 2 {
            return Err(ParseError::Format { reason: "unexpected block count" });
        }
        r.skip(2)?;

        let info_ref = SizedReference::parse(&mut r)?;
        let data_ref = SizedReference::parse(&mut r)?;
        info_ref.expect_type(TYPEID_INFO_BLOCK, "info block type tag")?;
        info_ref.check_bounds(file_length, "info block")?;
        data_ref.expect_type(TYPEID_DATA_BLOCK, "data block type tag")?;
        data_ref.check_bounds(file_length, "data block")?;

        // The extension header, if any, sits at a fixed offset right after
        // the primary header. Metadata is optional end to end: anything
        // malformed inside it is skipped, never fatal.
        let (title, artist) = read_extension_metadata(&mut file, file_length)?;

        if info_ref.size > INFO_BLOCK_CAP {
            return Err(ParseError::Oversized { field: "info block", size: info_ref.size });
        }
        let mut info_buf = vec![0u8; info_ref.size as usize];
        read_exact_at(&mut file, info_ref.offset as u64, &mut info_buf)?;

        let mut r = LeReader::new(&info_buf);
        if r.read_bytes(4)? != INFO_MAGIC {
            return Err(ParseError::Format { reason: "bad info block magic" });
        }
        if r.read_u32()? != info_ref.size {
            return Err(ParseError::Format { reason: "info block size mismatch" });
        }
        let encoding = Encoding::from_code(r.read_u8()?)?;
        let loop_flag = r.read_u8()? != 0;
        r.skip(2)?;
        let sample_rate = r.read_u32()? as f32;
        let mut loop_start = r.read_u32()?;
        let end_frame = r.read_u32()?;
        r.skip(4)?;
        let channel_count = r.read_u32()?;
        if channel_count != 1 && channel_count != 2 {
            return Err(ParseError::Format { reason: "unsupported channel count" });
        }
        let channel_count = channel_count as usize;

        // A loop point past the stream end can never be played back to
        if loop_start > end_frame {
            return Err(ParseError::Bounds { field: "loop start frame" });
        }
        // Sanity floor: the data block must hold at least the pre-loop region
        if (loop_start as u64) * channel_count as u64 * 2 > data_ref.size as u64 {
            return Err(ParseError::Bounds { field: "loop start frame" });
        }

        let mut sample_offsets = [0u32; 2];
        let mut seeds = [AdpcmSeed::None, AdpcmSeed::None];
        for channel in 0..channel_count {
            let type_id = r.read_u16()?;
            r.skip(2)?;
            let rel = r.read_u32()? as usize;
            if type_id != TYPEID_CHANNEL_INFO {
                return Err(ParseError::Format { reason: "channel reference type tag" });
            }
            // Channel references are relative to the reference-count field
            let base = INFO_REFS_BASE
                .checked_add(rel)
                .ok_or(ParseError::Bounds { field: "channel info" })?;
            if base + CHANNEL_INFO_SIZE > info_buf.len() {
                return Err(ParseError::Bounds { field: "channel info" });
            }
            let mut cr = LeReader::new(&info_buf[base..base + CHANNEL_INFO_SIZE]);

            let samples_type = cr.read_u16()?;
            cr.skip(2)?;
            let samples_offset = cr.read_u32()?;
            if samples_type != TYPEID_SAMPLE_DATA {
                return Err(ParseError::Format { reason: "sample data type tag" });
            }
            if samples_offset > data_ref.size {
                return Err(ParseError::Bounds { field: "sample data offset" });
            }
            sample_offsets[channel] = samples_offset;

            let adpcm_type = cr.read_u16()?;
            cr.skip(2)?;
            let adpcm_rel = cr.read_u32()? as usize;
            match encoding {
                Encoding::DspAdpcm => {
                    if adpcm_type != TYPEID_DSP_ADPCM_INFO {
                        return Err(ParseError::Format { reason: "dsp adpcm info type tag" });
                    }
                    seeds[channel] =
                        parse_dsp_seed(&info_buf, base, adpcm_rel)?;
                }
                Encoding::ImaAdpcm => {
                    if adpcm_type != TYPEID_IMA_ADPCM_INFO {
                        return Err(ParseError::Format { reason: "ima adpcm info type tag" });
                    }
                    seeds[channel] =
                        parse_ima_seed(&info_buf, base, adpcm_rel)?;
                }
                Encoding::Pcm8 | Encoding::Pcm16 => {}
            }
        }

        // DSP-ADPCM frames hold 14 samples; a resume point must sit on a
        // frame boundary
        if encoding == Encoding::DspAdpcm {
            loop_start -= loop_start % 14;
        }

        let title = title.unwrap_or_else(|| title_from_path(path));

        Ok(Container {
            file,
            channel_count,
            sample_rate,
            encoding,
            loop_flag,
            end_frame,
            loop_start,
            data_offset: data_ref.offset,
            sample_offsets,
            seeds,
            title,
            artist,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn loop_flag(&self) -> bool {
        self.loop_flag
    }

    /// Loop-exclusive total sample count per channel
    pub fn end_frame(&self) -> u32 {
        self.end_frame
    }

    /// Frame playback resumes at when looping
    pub fn loop_start(&self) -> u32 {
        self.loop_start
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }

    pub fn seed(&self, channel: usize) -> &AdpcmSeed {
        &self.seeds[channel]
    }

    pub(crate) fn sample_offset(&self, channel: usize) -> u32 {
        self.sample_offsets[channel]
    }

    /// Read raw bytes from the sample data region. `offset` is relative to
    /// the start of the data block. Returns the number of bytes actually
    /// read; a short count means the file ended early.
    pub(crate) fn read_data(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.seek(SeekFrom::Start(self.data_offset as u64 + offset))?;
        let mut total = 0;
        while total < buf.len() {
            match self.file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }
}

fn parse_dsp_seed(
    info_buf: &[u8],
    channel_base: usize,
    rel: usize,
) -> Result<AdpcmSeed, ParseError> {
    // coefficients + two contexts + padding
    const DSP_INFO_SIZE: usize = 32 + 6 + 6 + 2;
    let base = channel_base
        .checked_add(rel)
        .ok_or(ParseError::Bounds { field: "dsp adpcm info" })?;
    if base + DSP_INFO_SIZE > info_buf.len() {
        return Err(ParseError::Bounds { field: "dsp adpcm info" });
    }
    let mut r = LeReader::new(&info_buf[base..base + DSP_INFO_SIZE]);
    let mut coefficients = [0i16; 16];
    for c in coefficients.iter_mut() {
        *c = r.read_i16()?;
    }
    let start = DspContext {
        header: r.read_u16()?,
        prev: r.read_i16()?,
        prev2: r.read_i16()?,
    };
    let at_loop = DspContext {
        header: r.read_u16()?,
        prev: r.read_i16()?,
        prev2: r.read_i16()?,
    };
    Ok(AdpcmSeed::Dsp { coefficients, start, at_loop })
}

fn parse_ima_seed(
    info_buf: &[u8],
    channel_base: usize,
    rel: usize,
) -> Result<AdpcmSeed, ParseError> {
    const IMA_INFO_SIZE: usize = 8;
    let base = channel_base
        .checked_add(rel)
        .ok_or(ParseError::Bounds { field: "ima adpcm info" })?;
    if base + IMA_INFO_SIZE > info_buf.len() {
        return Err(ParseError::Bounds { field: "ima adpcm info" });
    }
    let mut r = LeReader::new(&info_buf[base..base + IMA_INFO_SIZE]);
    let start = ImaContext {
        predictor: r.read_i16()?,
        step_index: r.read_u8()?,
    };
    r.skip(1)?;
    let at_loop = ImaContext {
        predictor: r.read_i16()?,
        step_index: r.read_u8()?,
    };
    Ok(AdpcmSeed::Ima { start, at_loop })
}

/// Look for the extension header and harvest title/artist tags from a
/// vendor comment block if one is present. Unknown extension types are
/// skipped. Only structural violations of the outer references are fatal.
fn read_extension_metadata(
    file: &mut File,
    file_length: u64,
) -> Result<(Option<String>, Option<String>), ParseError> {
    let mut head = [0u8; 6];
    read_exact_at(file, HWAV_HEADER_OFFSET, &mut head)?;
    if &head[..4] != HWAV_MAGIC {
        return Ok((None, None));
    }
    debug!("extension header detected");

    let count = u16::from_le_bytes([head[4], head[5]]);
    let mut title = None;
    let mut artist = None;
    for i in 0..count as u64 {
        let mut ref_buf = [0u8; 12];
        read_exact_at(file, HWAV_HEADER_OFFSET + 6 + 12 * i, &mut ref_buf)?;
        let ext_ref = SizedReference::parse(&mut LeReader::new(&ref_buf))?;
        ext_ref.check_bounds(file_length, "extension block")?;

        match ext_ref.type_id {
            TYPEID_VORBIS_COMMENT => {
                if ext_ref.size > EXTENSION_BLOCK_CAP {
                    warn!("skipping oversized vendor comment block ({} bytes)", ext_ref.size);
                    continue;
                }
                let mut block = vec![0u8; ext_ref.size as usize];
                read_exact_at(file, ext_ref.offset as u64, &mut block)?;
                if let Some((t, a)) = parse_vendor_comment(&block, ext_ref.size) {
                    title = t.or(title);
                    artist = a.or(artist);
                }
            }
            // Unknown extended block; just ignore it
            other => debug!("skipping unknown extension block type {:#06x}", other),
        }
    }
    Ok((title, artist))
}

/// Parse a vendor comment block. Malformed payloads yield None; the tags
/// are optional metadata and must never make the open fail.
fn parse_vendor_comment(block: &[u8], declared_size: u32) -> Option<(Option<String>, Option<String>)> {
    let mut r = LeReader::new(block);
    if r.read_bytes(4).ok()? != VCOM_MAGIC {
        return None;
    }
    if r.read_u32().ok()? != declared_size {
        return None;
    }
    // Vendor string; we just skip it
    let vendor_len = r.read_u32().ok()? as usize;
    r.skip(vendor_len).ok()?;

    let tag_count = r.read_u32().ok()?;
    let mut title = None;
    let mut artist = None;
    for _ in 0..tag_count {
        let len = r.read_u32().ok()? as usize;
        let record = r.read_bytes(len).ok()?;
        let eq = record.iter().position(|&b| b == b'=')?;
        let key = String::from_utf8_lossy(&record[..eq]).to_lowercase();
        let value = String::from_utf8_lossy(&record[eq + 1..]).into_owned();
        debug!("found tag: |{}|=|{}|", key, value);
        match key.as_str() {
            "title" => title = Some(value),
            "artist" => artist = Some(value),
            _ => {}
        }
    }
    Some((title, artist))
}

/// Synthesize a display title from the file name: strip directory and
/// extension, replace `-`/`_` with spaces.
fn title_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.chars()
        .map(|c| if c == '-' || c == '_' { ' ' } else { c })
        .collect()
}

fn read_exact_at(file: &mut File, offset: u64, buf: &mut [u8]) -> Result<(), ParseError> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)?;
    Ok(())
}
