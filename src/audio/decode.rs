// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Decoding of raw sample bytes into in-memory buffers.
//!
//! Anything symphonia can probe (WAV, FLAC, MP3, OGG/Vorbis, ...) is decoded
//! in one pass and, if needed, resampled to the output device rate so voices
//! can be mixed without further conversion.

use std::io::Cursor;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::IntoSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use super::buffer::DecodedBuffer;

/// Error types for decoding.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unrecognized audio format: {0}")]
    Probe(#[source] SymphoniaError),

    #[error("no audio track found")]
    NoTrack,

    #[error("sample rate not specified")]
    UnknownSampleRate,

    #[error("codec error: {0}")]
    Codec(#[source] SymphoniaError),

    #[error("no audio frames decoded")]
    Empty,
}

/// Returns the file extension of a locator, ignoring any query string or fragment.
/// Used as a format hint for the probe.
pub fn extension_hint(locator: &str) -> Option<&str> {
    let path = locator.split(['?', '#']).next().unwrap_or(locator);
    let file_name = path.rsplit('/').next()?;
    let (stem, extension) = file_name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension)
}

/// Decodes a complete audio file held in memory.
///
/// If `target_sample_rate` is given and differs from the file's rate, the result is
/// resampled to it.
pub fn decode(
    bytes: Vec<u8>,
    extension: Option<&str>,
    target_sample_rate: Option<u32>,
) -> Result<DecodedBuffer, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(DecodeError::Probe)?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(DecodeError::UnknownSampleRate)?;
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(DecodeError::Codec)?;

    let mut samples = Vec::new();
    while let Some(packet) = next_packet(format_reader.as_mut(), decoder.as_mut())? {
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let decoded_channels = append_interleaved(decoded, &mut samples);
                // Trust the decoder over missing container metadata.
                if channels == 0 {
                    channels = decoded_channels as u16;
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                // A corrupt packet is skipped rather than failing the whole sample.
                debug!(error = e, "Skipping undecodable packet");
            }
            Err(e) => return Err(DecodeError::Codec(e)),
        }
    }

    if channels == 0 || samples.is_empty() {
        return Err(DecodeError::Empty);
    }

    match target_sample_rate {
        Some(target) if target != sample_rate && target > 0 && sample_rate > 0 => {
            debug!(
                source_rate = sample_rate,
                target_rate = target,
                "Transcoding sample"
            );
            let transcoded = transcode(&samples, channels, sample_rate, target);
            Ok(DecodedBuffer::new(transcoded, channels, target))
        }
        _ => Ok(DecodedBuffer::new(samples, channels, sample_rate)),
    }
}

/// Reads the next packet. Returns `Ok(None)` at the end of the stream.
fn next_packet(
    format_reader: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
) -> Result<Option<Packet>, DecodeError> {
    loop {
        match format_reader.next_packet() {
            Ok(packet) => return Ok(Some(packet)),
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None)
            }
            // Some formats report a decode error at the end of the stream.
            Err(SymphoniaError::DecodeError(_)) => return Ok(None),
            Err(e) => return Err(DecodeError::Codec(e)),
        }
    }
}

/// Appends the decoded packet to `output` as interleaved f32. Returns the packet's
/// channel count.
fn append_interleaved(decoded: AudioBufferRef, output: &mut Vec<f32>) -> usize {
    match decoded {
        AudioBufferRef::F32(buf) => interleave(&buf, output),
        AudioBufferRef::F64(buf) => interleave(&buf, output),
        AudioBufferRef::S8(buf) => interleave(&buf, output),
        AudioBufferRef::S16(buf) => interleave(&buf, output),
        AudioBufferRef::S24(buf) => interleave(&buf, output),
        AudioBufferRef::S32(buf) => interleave(&buf, output),
        AudioBufferRef::U8(buf) => interleave(&buf, output),
        AudioBufferRef::U16(buf) => interleave(&buf, output),
        AudioBufferRef::U24(buf) => interleave(&buf, output),
        AudioBufferRef::U32(buf) => interleave(&buf, output),
    }
}

fn interleave<T>(buf: &AudioBuffer<T>, output: &mut Vec<f32>) -> usize
where
    T: Sample + IntoSample<f32>,
{
    let frames = buf.frames();
    let channels = buf.spec().channels.count();
    output.reserve(frames * channels);
    for frame in 0..frames {
        for channel in 0..channels {
            output.push(buf.chan(channel)[frame].into_sample());
        }
    }
    channels
}

/// Transcodes interleaved samples from one sample rate to another using linear
/// interpolation. Good enough for one-shots and drum hits.
pub(crate) fn transcode(
    samples: &[f32],
    channel_count: u16,
    source_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    let channels = channel_count as usize;
    let source_frames = samples.len() / channels;
    // Integer math so exact ratios don't pick up a stray frame from rounding.
    let target_frames =
        (source_frames as u64 * target_rate as u64).div_ceil(source_rate as u64) as usize;
    let step = source_rate as f64 / target_rate as f64;

    let mut output = Vec::with_capacity(target_frames * channels);

    for target_frame in 0..target_frames {
        let source_pos = target_frame as f64 * step;
        let source_frame = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        for channel in 0..channels {
            let idx0 = source_frame * channels + channel;
            let idx1 = (source_frame + 1) * channels + channel;

            let s0 = samples.get(idx0).copied().unwrap_or(0.0);
            let s1 = samples.get(idx1).copied().unwrap_or(s0);

            output.push(s0 + (s1 - s0) * frac);
        }
    }

    output
}
