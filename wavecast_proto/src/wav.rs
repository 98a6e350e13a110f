//! The canonical RIFF/WAVE container for uncompressed PCM.
//!
//! Players wrap each raw block in this container before handing it to their
//! audio backend, so every block is independently decodable. The layout is
//! the fixed 44-byte header followed by the sample payload; all multi-byte
//! fields are little-endian.

use crate::format::AudioParams;

/// Length of the fixed container header in bytes.
pub const HEADER_LEN: usize = 44;

/// Format code for linear PCM in the `fmt ` chunk.
///
/// This value is defined by the WAVE specification and must not change.
pub const FORMAT_LINEAR_PCM: u16 = 1;

/// Length of the `fmt ` chunk body for linear PCM.
pub const FMT_CHUNK_LEN: u32 = 16;

/// Wraps raw PCM bytes in a self-describing WAVE container.
///
/// The header is byte-exact for the given parameters:
///
/// | offset | field | value |
/// |---|---|---|
/// | 0 | chunk id | `"RIFF"` |
/// | 4 | chunk size | total length − 8 |
/// | 8 | format | `"WAVE"` |
/// | 12 | subchunk id | `"fmt "` |
/// | 16 | subchunk size | 16 |
/// | 20 | format code | 1 (linear PCM) |
/// | 22 | channels | `params.channels` |
/// | 24 | sample rate | `params.sample_rate` |
/// | 28 | byte rate | `sample_rate * channels * bit_depth / 8` |
/// | 32 | block align | `channels * bit_depth / 8` |
/// | 34 | bits per sample | `params.bit_depth` |
/// | 36 | subchunk id | `"data"` |
/// | 40 | subchunk size | payload length |
pub fn wav_from_pcm(pcm: &[u8], params: &AudioParams) -> Vec<u8> {
    let mut container = Vec::with_capacity(HEADER_LEN + pcm.len());
    container.extend_from_slice(&header_for(params, pcm.len() as u32));
    container.extend_from_slice(pcm);
    container
}

fn header_for(params: &AudioParams, data_len: u32) -> [u8; HEADER_LEN] {
    let mut header = arrayvec::ArrayVec::<u8, HEADER_LEN>::new_const();

    header.try_extend_from_slice(b"RIFF").unwrap();
    header
        .try_extend_from_slice(&(data_len + (HEADER_LEN as u32 - 8)).to_le_bytes())
        .unwrap();
    header.try_extend_from_slice(b"WAVE").unwrap();
    header.try_extend_from_slice(b"fmt ").unwrap();
    header
        .try_extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes())
        .unwrap();
    header
        .try_extend_from_slice(&FORMAT_LINEAR_PCM.to_le_bytes())
        .unwrap();
    header
        .try_extend_from_slice(&params.channels.to_le_bytes())
        .unwrap();
    header
        .try_extend_from_slice(&params.sample_rate.to_le_bytes())
        .unwrap();
    header
        .try_extend_from_slice(&params.byte_rate().to_le_bytes())
        .unwrap();
    header
        .try_extend_from_slice(&params.block_align().to_le_bytes())
        .unwrap();
    header
        .try_extend_from_slice(&params.bit_depth.to_le_bytes())
        .unwrap();
    header.try_extend_from_slice(b"data").unwrap();
    header.try_extend_from_slice(&data_len.to_le_bytes()).unwrap();

    assert_eq!(header.len(), header.capacity(), "ERROR: missing fields");

    header.into_inner().unwrap()
}

/// Error returned when a container cannot be split back into PCM.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("container shorter than its fixed header")]
    Truncated,
    #[error("unexpected tag at offset {0}")]
    BadTag(usize),
    #[error("unsupported format code {0}")]
    UnsupportedFormat(u16),
    #[error("declared payload length {declared} exceeds available {available}")]
    BadPayloadLength { declared: u32, available: usize },
}

/// Splits a WAVE container back into its format and raw PCM payload.
///
/// The inverse of [`wav_from_pcm`]; used by container-level decoders and by
/// round-trip tests. Only linear PCM with the canonical 44-byte header is
/// accepted.
pub fn split_pcm(container: &[u8]) -> Result<(AudioParams, &[u8]), ContainerError> {
    let rem = expect_tag(container, b"RIFF", 0)?;
    let (_riff_len, rem) = take_u32(rem)?;
    let rem = expect_tag(rem, b"WAVE", 8)?;
    let rem = expect_tag(rem, b"fmt ", 12)?;

    let (fmt_len, rem) = take_u32(rem)?;
    if fmt_len != FMT_CHUNK_LEN {
        return Err(ContainerError::BadTag(16));
    }

    let (format_code, rem) = take_u16(rem)?;
    if format_code != FORMAT_LINEAR_PCM {
        return Err(ContainerError::UnsupportedFormat(format_code));
    }

    let (channels, rem) = take_u16(rem)?;
    let (sample_rate, rem) = take_u32(rem)?;
    let (_byte_rate, rem) = take_u32(rem)?;
    let (_block_align, rem) = take_u16(rem)?;
    let (bit_depth, rem) = take_u16(rem)?;

    let rem = expect_tag(rem, b"data", 36)?;
    let (data_len, rem) = take_u32(rem)?;

    if data_len as usize > rem.len() {
        return Err(ContainerError::BadPayloadLength {
            declared: data_len,
            available: rem.len(),
        });
    }

    let params = AudioParams {
        sample_rate,
        bit_depth,
        channels,
    };

    Ok((params, &rem[..data_len as usize]))
}

#[inline(always)]
fn expect_tag<'a>(buf: &'a [u8], tag: &[u8; 4], offset: usize) -> Result<&'a [u8], ContainerError> {
    let (&found, rem) = buf.split_first_chunk().ok_or(ContainerError::Truncated)?;
    if &found == tag {
        Ok(rem)
    } else {
        Err(ContainerError::BadTag(offset))
    }
}

#[inline(always)]
fn take_u32(buf: &[u8]) -> Result<(u32, &[u8]), ContainerError> {
    let (&bytes, rem) = buf.split_first_chunk().ok_or(ContainerError::Truncated)?;
    Ok((u32::from_le_bytes(bytes), rem))
}

#[inline(always)]
fn take_u16(buf: &[u8]) -> Result<(u16, &[u8]), ContainerError> {
    let (&bytes, rem) = buf.split_first_chunk().ok_or(ContainerError::Truncated)?;
    Ok((u16::from_le_bytes(bytes), rem))
}
