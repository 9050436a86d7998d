//! Audio file helpers: decoding uploads and writing synthesized speech.
//!
//! Uploads are demuxed with `symphonia` (WAV, MP3, AAC/MP4, Ogg, WebM),
//! down-mixed to mono and resampled for the recognizer. Opus tracks, the
//! format browsers record in, are decoded by [`opus`]. Synthesized speech is
//! written as 16-bit PCM WAV with `hound`.

mod opus;

use crate::error::{Result, SpeechError};
use std::path::Path;

/// Sample rate expected by the speech recognizer.
pub const STT_SAMPLE_RATE: u32 = 16_000;

/// Decoded mono audio.
#[derive(Debug, Clone)]
pub struct MonoAudio {
    /// Samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl MonoAudio {
    /// Duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Resample to `target_rate`.
    pub fn resampled(self, target_rate: u32) -> Self {
        if self.sample_rate == target_rate {
            return self;
        }
        Self {
            samples: resample_linear_mono(&self.samples, self.sample_rate, target_rate),
            sample_rate: target_rate,
        }
    }
}

/// Decode an audio file into mono f32 samples at its native rate.
///
/// Multi-channel input is averaged per frame. Corrupt packets are skipped.
///
/// # Errors
///
/// Returns [`SpeechError::Audio`] if the container cannot be probed or has
/// no decodable audio track.
pub fn decode_to_mono(path: &Path) -> Result<MonoAudio> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::{CODEC_TYPE_OPUS, DecoderOptions};
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SpeechError::Audio(format!("unrecognized audio format: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| SpeechError::Audio("no default audio track".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    if codec_params.codec == CODEC_TYPE_OPUS {
        return opus::decode_packets(format.as_mut(), track_id, &codec_params);
    }

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| SpeechError::Audio("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| SpeechError::Audio(format!("unsupported codec: {e}")))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(SpeechError::Audio(format!("audio read error: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(SpeechError::Audio(format!("audio decode error: {e}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let frames = decoded.frames() as u64;
        let required = usize::try_from(frames)
            .unwrap_or(usize::MAX)
            .saturating_mul(channels);

        if sample_buf.as_ref().is_none_or(|b| b.capacity() < required) {
            sample_buf = Some(SampleBuffer::<f32>::new(frames, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.clear();
        buf.copy_interleaved_ref(decoded);

        downmix_into(buf.samples(), channels, &mut samples);
    }

    Ok(MonoAudio {
        samples,
        sample_rate,
    })
}

/// Average interleaved frames into mono and append to `out`.
fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}

/// Linear-interpolation resampler for mono audio.
pub fn resample_linear_mono(input: &[f32], from_sr: u32, to_sr: u32) -> Vec<f32> {
    if input.is_empty() || from_sr == to_sr || from_sr == 0 || to_sr == 0 {
        return input.to_vec();
    }

    let ratio = to_sr as f64 / from_sr as f64;
    let out_len = ((input.len() as f64) * ratio).round() as usize;
    let last = input.len() - 1;

    (0..out_len)
        .map(|i| {
            let src_pos = i as f64 / ratio;
            let i0 = (src_pos.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            let t = (src_pos - i0 as f64) as f32;
            input[i0] * (1.0 - t) + input[i1] * t
        })
        .collect()
}

/// Write mono f32 samples as a 16-bit PCM WAV file.
///
/// # Errors
///
/// Returns [`SpeechError::Audio`] if the file cannot be created or written.
pub fn write_wav_mono(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| SpeechError::Audio(format!("failed to create wav writer: {e}")))?;

    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer
            .write_sample(v)
            .map_err(|e| SpeechError::Audio(format!("failed to write wav sample: {e}")))?;
    }

    writer
        .finalize()
        .map_err(|e| SpeechError::Audio(format!("failed to finalize wav: {e}")))
}
