//! WAV file reading and writing.

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;
use tracing::debug;

use super::mix::StereoSignal;
use super::signal::AudioSignal;
use crate::error::{MediaError, MediaResult};

/// Sample encoding for written files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WavEncoding {
    #[default]
    Pcm16,
    Float32,
}

/// Read a PCM or float WAV file, averaging channels down to mono.
pub fn read_mono(path: impl AsRef<Path>) -> MediaResult<AudioSignal> {
    let path = path.as_ref();
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.sample_rate == 0 {
        return Err(MediaError::Wav(hound::Error::FormatError("invalid sample rate")));
    }
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let samples: Vec<f32> = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    debug!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        bits = spec.bits_per_sample,
        samples = samples.len(),
        "Loaded WAV"
    );

    Ok(AudioSignal::new(samples, spec.sample_rate))
}

fn spec_for(channels: u16, sample_rate: u32, encoding: WavEncoding) -> WavSpec {
    match encoding {
        WavEncoding::Pcm16 => WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
        WavEncoding::Float32 => WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    }
}

fn write_sample<W: std::io::Write + std::io::Seek>(
    writer: &mut WavWriter<W>,
    sample: f32,
    encoding: WavEncoding,
) -> MediaResult<()> {
    let sample = sample.clamp(-1.0, 1.0);
    match encoding {
        WavEncoding::Pcm16 => writer.write_sample((sample * i16::MAX as f32).round() as i16)?,
        WavEncoding::Float32 => writer.write_sample(sample)?,
    }
    Ok(())
}

/// Write a mono WAV file.
pub fn write_mono(path: impl AsRef<Path>, signal: &AudioSignal, encoding: WavEncoding) -> MediaResult<()> {
    let mut writer = WavWriter::create(path.as_ref(), spec_for(1, signal.sample_rate(), encoding))?;
    for &sample in signal.samples() {
        write_sample(&mut writer, sample, encoding)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Write a two-channel WAV file.
pub fn write_stereo(path: impl AsRef<Path>, signal: &StereoSignal, encoding: WavEncoding) -> MediaResult<()> {
    let mut writer = WavWriter::create(path.as_ref(), spec_for(2, signal.sample_rate, encoding))?;
    for (&left, &right) in signal.left.iter().zip(&signal.right) {
        write_sample(&mut writer, left, encoding)?;
        write_sample(&mut writer, right, encoding)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mono_pcm16_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mono.wav");
        let signal = AudioSignal::new(vec![0.0, 0.5, -0.5, 1.0], 8000);

        write_mono(&path, &signal, WavEncoding::Pcm16).unwrap();
        let read = read_mono(&path).unwrap();

        assert_eq!(read.sample_rate(), 8000);
        assert_eq!(read.len(), 4);
        for (a, b) in read.samples().iter().zip(signal.samples()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_stereo_is_downmixed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        let stereo = StereoSignal {
            left: vec![0.5, 0.25],
            right: vec![-0.5, 0.75],
            sample_rate: 16000,
        };

        write_stereo(&path, &stereo, WavEncoding::Float32).unwrap();
        let mono = read_mono(&path).unwrap();

        assert_eq!(mono.samples(), &[0.0, 0.5]);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(matches!(read_mono("/no/such/file.wav"), Err(MediaError::Wav(_))));
    }
}
