//! Opus decoding for browser recordings.
//!
//! `MediaRecorder` produces Opus in WebM (Chrome, Firefox) or Ogg (Firefox,
//! Safari). Symphonia demuxes both containers but has no Opus codec, so
//! packets from an Opus track are decoded here with libopus.

use super::{MonoAudio, downmix_into};
use crate::error::{Result, SpeechError};
use audiopus::coder::Decoder;
use audiopus::{Channels, SampleRate};
use symphonia::core::codecs::CodecParameters;
use symphonia::core::errors::Error as SymphError;
use symphonia::core::formats::FormatReader;
use tracing::debug;

/// Opus always decodes at 48 kHz.
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

/// Longest Opus packet: 120 ms at 48 kHz, per channel.
const MAX_PACKET_SAMPLES: usize = 5_760;

/// Minimum size of an `OpusHead` identification header.
const OPUS_HEAD_LEN: usize = 19;

/// The fields of an `OpusHead` header the decoder needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpusHead {
    channels: u8,
    pre_skip: u16,
}

/// Parse an `OpusHead` block (Ogg identification packet, WebM `CodecPrivate`).
fn parse_opus_head(extra: &[u8]) -> Option<OpusHead> {
    if extra.len() < OPUS_HEAD_LEN || !extra.starts_with(b"OpusHead") {
        return None;
    }
    Some(OpusHead {
        channels: extra[9],
        pre_skip: u16::from_le_bytes([extra[10], extra[11]]),
    })
}

/// Decode every packet of the Opus track `track_id` into mono 48 kHz audio.
///
/// Channel count and pre-skip come from the `OpusHead` in the track's extra
/// data, falling back to the container's own parameters. Undecodable packets
/// are skipped.
///
/// # Errors
///
/// Returns [`SpeechError::Audio`] for more than two channels, if libopus
/// rejects the stream parameters, or on a container read error.
pub(super) fn decode_packets(
    format: &mut dyn FormatReader,
    track_id: u32,
    params: &CodecParameters,
) -> Result<MonoAudio> {
    let head = params.extra_data.as_deref().and_then(parse_opus_head);

    let channels = head
        .map(|h| usize::from(h.channels))
        .or_else(|| params.channels.map(|c| c.count()))
        .or_else(|| params.channel_layout.map(|l| l.into_channels().count()))
        .unwrap_or(1);
    let pre_skip = head
        .map(|h| usize::from(h.pre_skip))
        .or_else(|| params.delay.map(|d| d as usize))
        .unwrap_or(0);

    let opus_channels = match channels {
        1 => Channels::Mono,
        2 => Channels::Stereo,
        n => {
            return Err(SpeechError::Audio(format!(
                "unsupported opus channel count: {n}"
            )));
        }
    };

    let mut decoder = Decoder::new(SampleRate::Hz48000, opus_channels)
        .map_err(|e| SpeechError::Audio(format!("failed to create opus decoder: {e}")))?;

    let mut pcm = vec![0.0f32; MAX_PACKET_SAMPLES * channels];
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(SpeechError::Audio(format!("audio read error: {e}"))),
        };

        if packet.track_id() != track_id || packet.buf().is_empty() {
            continue;
        }

        let frames = match decoder.decode_float(Some(packet.buf()), &mut pcm[..], false) {
            Ok(n) => n,
            Err(e) => {
                debug!("skipping opus packet: {e}");
                continue;
            }
        };
        let end = (frames * channels).min(pcm.len());
        downmix_into(&pcm[..end], channels, &mut samples);
    }

    samples.drain(..pre_skip.min(samples.len()));

    Ok(MonoAudio {
        samples,
        sample_rate: OPUS_SAMPLE_RATE,
    })
}
