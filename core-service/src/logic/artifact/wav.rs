//! RIFF/WAVE decoding
//!
//! Accepts PCM 8/16/24/32-bit and IEEE float 32-bit, any channel count.
//! Multi-channel audio is averaged down to mono.

use crate::logic::detector::DetectorError;

const FORMAT_PCM: u16 = 1;
const FORMAT_FLOAT: u16 = 3;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Decoded mono audio
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Copy)]
struct FormatChunk {
    format: u16,
    channels: u16,
    sample_rate: u32,
    block_align: u16,
    bits: u16,
}

fn malformed(msg: &str) -> DetectorError {
    DetectorError::Malformed(format!("wav: {}", msg))
}

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes.get(at..at + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    bytes.get(at..at + 4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Decode a complete WAV file
pub fn decode(bytes: &[u8]) -> Result<DecodedAudio, DetectorError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(malformed("missing RIFF/WAVE header"));
    }

    let mut fmt: Option<FormatChunk> = None;
    let mut pos = 12;

    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let declared = read_u32(bytes, pos + 4).ok_or_else(|| malformed("truncated chunk header"))? as usize;
        let body_start = pos + 8;

        if id == b"fmt " {
            let body = bytes
                .get(body_start..body_start + declared)
                .ok_or_else(|| malformed("truncated fmt chunk"))?;
            fmt = Some(parse_format(body)?);
        } else if id == b"data" {
            let format = fmt.ok_or_else(|| malformed("data chunk before fmt chunk"))?;
            // Streamed recordings often carry a bogus length; take what is there
            let end = body_start.saturating_add(declared).min(bytes.len());
            return decode_samples(&bytes[body_start..end], format);
        }

        // Chunks are padded to even length
        pos = body_start + declared + (declared & 1);
    }

    Err(malformed("no data chunk"))
}

fn parse_format(body: &[u8]) -> Result<FormatChunk, DetectorError> {
    let mut format = read_u16(body, 0).ok_or_else(|| malformed("short fmt chunk"))?;
    let channels = read_u16(body, 2).ok_or_else(|| malformed("short fmt chunk"))?;
    let sample_rate = read_u32(body, 4).ok_or_else(|| malformed("short fmt chunk"))?;
    let block_align = read_u16(body, 12).ok_or_else(|| malformed("short fmt chunk"))?;
    let bits = read_u16(body, 14).ok_or_else(|| malformed("short fmt chunk"))?;

    if format == FORMAT_EXTENSIBLE {
        // Sub-format GUID starts at offset 24; its first two bytes carry the format code
        format = read_u16(body, 24).ok_or_else(|| malformed("short extensible fmt chunk"))?;
    }

    if channels == 0 || sample_rate == 0 || block_align == 0 {
        return Err(malformed("zero channels, rate or block align"));
    }

    let supported = matches!((format, bits), (FORMAT_PCM, 8 | 16 | 24 | 32) | (FORMAT_FLOAT, 32));
    if !supported {
        return Err(DetectorError::UnsupportedArtifact(format!(
            "wav format {} with {} bits per sample",
            format, bits
        )));
    }

    if (bits as usize / 8) * channels as usize > block_align as usize {
        return Err(malformed("block align smaller than frame"));
    }

    Ok(FormatChunk { format, channels, sample_rate, block_align, bits })
}

fn decode_samples(data: &[u8], fmt: FormatChunk) -> Result<DecodedAudio, DetectorError> {
    let width = fmt.bits as usize / 8;
    let frame = fmt.block_align as usize;
    let channels = fmt.channels as usize;

    let samples = data
        .chunks_exact(frame)
        .map(|frame_bytes| {
            let sum: f32 = (0..channels)
                .map(|ch| sample_at(&frame_bytes[ch * width..ch * width + width], fmt))
                .sum();
            sum / channels as f32
        })
        .collect();

    Ok(DecodedAudio { samples, sample_rate: fmt.sample_rate })
}

fn sample_at(b: &[u8], fmt: FormatChunk) -> f32 {
    match (fmt.format, fmt.bits) {
        (FORMAT_PCM, 8) => (b[0] as f32 - 128.0) / 128.0,
        (FORMAT_PCM, 16) => i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0,
        (FORMAT_PCM, 24) => {
            let v = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
            v as f32 / 8_388_608.0
        }
        (FORMAT_PCM, 32) => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2_147_483_648.0,
        (FORMAT_FLOAT, 32) => {
            let v = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 }
        }
        _ => 0.0,
    }
}

/// Encode mono samples as 16-bit PCM WAV
pub fn encode_pcm16(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        let v = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}
