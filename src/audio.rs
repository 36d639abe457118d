//! Audio I/O for the signal-processing backends

use crate::error::{DownbeatError, Result};
use hound::WavReader;
use std::path::Path;

/// Mono samples normalised to [-1, 1]
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Duration in seconds
    pub fn duration_sec(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Load an audio file as mono samples
pub fn load_audio_file<P: AsRef<Path>>(path: P) -> Result<DecodedAudio> {
    let path = path.as_ref();

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "wav" | "wave" => match load_wav_file(path) {
            Ok(audio) => Ok(audio),
            Err(err) => decode_compressed(path).map_err(|_| err),
        },
        _ => decode_compressed(path),
    }
}

/// Smallest RIFF/WAVE header in front of the sample data
const MIN_WAV_HEADER_BYTES: u64 = 44;

/// Duration from the WAV header, without reading sample data.
///
/// The declared length is capped by the sample frames the file can actually
/// hold. Returns `None` for anything hound cannot parse as WAV.
pub fn wav_duration_sec<P: AsRef<Path>>(path: P) -> Option<f64> {
    let path = path.as_ref();
    let reader = WavReader::open(path).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }

    let block_align = spec.channels as u64 * ((spec.bits_per_sample as u64 + 7) / 8);
    let file_len = std::fs::metadata(path).ok()?.len();
    let frames_present = file_len.saturating_sub(MIN_WAV_HEADER_BYTES) / block_align.max(1);

    let declared = reader.duration() as u64;
    if declared > frames_present {
        log::warn!(
            "{} declares {} sample frames but holds at most {}",
            path.display(),
            declared,
            frames_present
        );
    }

    Some(declared.min(frames_present) as f64 / spec.sample_rate as f64)
}

/// Load WAV file
fn load_wav_file(path: &Path) -> Result<DecodedAudio> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.bits_per_sample > 32 {
        return Err(DownbeatError::Decode(format!(
            "Unsupported bit depth: {}",
            spec.bits_per_sample
        )));
    }

    let mut interleaved: Vec<f32> = Vec::with_capacity(reader.len() as usize);
    match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            for sample in reader.samples::<i32>() {
                interleaved.push(sample? as f32 / max_value);
            }
        }
        hound::SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                interleaved.push(sample?);
            }
        }
    }

    Ok(DecodedAudio {
        samples: mix_to_mono(&interleaved, spec.channels as usize),
        sample_rate: spec.sample_rate,
    })
}

/// Average interleaved channels down to one
pub fn mix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear-interpolation resampler
pub fn resample_linear(samples: &[f32], source_sr: u32, target_sr: u32) -> Vec<f32> {
    if source_sr == target_sr || samples.is_empty() || source_sr == 0 {
        return samples.to_vec();
    }

    let ratio = source_sr as f64 / target_sr as f64;
    let out_len = (samples.len() as f64 / ratio).floor() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx.min(last)];
            let b = samples[(idx + 1).min(last)];
            a + (b - a) * frac
        })
        .collect()
}

#[cfg(any(feature = "spectral", feature = "neural"))]
fn decode_compressed(path: &Path) -> Result<DecodedAudio> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let decode_err = |e: SymphoniaError| DownbeatError::Decode(e.to_string());

    let src = std::fs::File::open(path)
        .map_err(|e| DownbeatError::Decode(format!("{}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(decode_err)?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DownbeatError::Decode("no supported audio tracks".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(decode_err)?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_err(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend(mix_to_mono(buffer.samples(), spec.channels.count()));
            }
            Err(SymphoniaError::DecodeError(msg)) => {
                log::debug!("Skipping undecodable packet: {}", msg);
            }
            Err(e) => return Err(decode_err(e)),
        }
    }

    if sample_rate == 0 {
        return Err(DownbeatError::Decode("unknown sample rate".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

#[cfg(not(any(feature = "spectral", feature = "neural")))]
fn decode_compressed(path: &Path) -> Result<DecodedAudio> {
    Err(DownbeatError::Decode(format!(
        "{}: compressed formats need the `spectral` or `neural` feature",
        path.display()
    )))
}
