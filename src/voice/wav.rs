//! WAV container helpers
//!
//! Synthesizers hand back either a complete WAV file or raw 16-bit mono PCM.
//! Batch replies concatenate raw PCM and wrap it once at the end.

use std::io::Cursor;

use crate::{Error, Result};

/// Wrap little-endian 16-bit mono PCM into a WAV file
///
/// A trailing odd byte is ignored.
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for pair in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Decoded WAV payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcm {
    /// Little-endian 16-bit samples
    pub data: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Extract 16-bit PCM from a WAV file
///
/// # Errors
///
/// Returns error if the input is not a 16-bit integer WAV
pub fn wav_to_pcm(wav: &[u8]) -> Result<Pcm> {
    let reader = hound::WavReader::new(Cursor::new(wav)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();

    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(Error::Audio(format!(
            "unsupported WAV format: {} bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let mut data = Vec::with_capacity(reader.len() as usize * 2);
    for sample in reader.into_samples::<i16>() {
        let sample = sample.map_err(|e| Error::Audio(e.to_string()))?;
        data.extend_from_slice(&sample.to_le_bytes());
    }

    Ok(Pcm {
        data,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_survives_wav_wrapping() {
        let samples: Vec<i16> = vec![0, 1200, -1200, i16::MAX, i16::MIN];
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        let wav = pcm_to_wav(&pcm, 22050).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(wav.len(), 44 + pcm.len());

        let decoded = wav_to_pcm(&wav).unwrap();
        assert_eq!(decoded.data, pcm);
        assert_eq!(decoded.sample_rate, 22050);
        assert_eq!(decoded.channels, 1);
    }

    #[test]
    fn test_empty_pcm_is_valid_wav() {
        let wav = pcm_to_wav(&[], 16000).unwrap();
        assert_eq!(wav.len(), 44);
        assert!(wav_to_pcm(&wav).unwrap().data.is_empty());
    }

    #[test]
    fn test_rejects_non_wav() {
        assert!(wav_to_pcm(b"not a wav file").is_err());
    }
}
