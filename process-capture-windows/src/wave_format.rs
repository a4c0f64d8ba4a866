//! Conversion between `WAVEFORMATEX` and the core stream format.

use windows::Win32::Media::Audio::{WAVEFORMATEX, WAVEFORMATEXTENSIBLE};

use process_capture_core::models::error::ActivationError;
use process_capture_core::models::format::{SampleFormat, StreamFormat};

const TAG_PCM: u16 = 1;
const TAG_IEEE_FLOAT: u16 = 3;
const TAG_EXTENSIBLE: u16 = 0xFFFE;

/// Build the format handed to `IAudioClient::Initialize` for process
/// loopback, which performs no negotiation.
pub(crate) fn to_wave_format(format: StreamFormat) -> WAVEFORMATEX {
    let bits = (format.sample_format.bytes_per_sample() * 8) as u16;
    let block_align = format.block_align() as u16;
    WAVEFORMATEX {
        wFormatTag: if format.sample_format.is_float() {
            TAG_IEEE_FLOAT
        } else {
            TAG_PCM
        },
        nChannels: format.channels,
        nSamplesPerSec: format.sample_rate,
        nAvgBytesPerSec: format.sample_rate * block_align as u32,
        nBlockAlign: block_align,
        wBitsPerSample: bits,
        cbSize: 0,
    }
}

/// Read a device mix format.
///
/// # Safety
/// `ptr` must point to a valid `WAVEFORMATEX`, followed by the extensible
/// tail when its tag says so.
pub(crate) unsafe fn from_wave_format(ptr: *const WAVEFORMATEX) -> Result<StreamFormat, ActivationError> {
    // WAVEFORMATEX is packed; read by value.
    let wave = std::ptr::read_unaligned(ptr);
    let tag = wave.wFormatTag;
    let bits = wave.wBitsPerSample;
    let channels = wave.nChannels;
    let sample_rate = wave.nSamplesPerSec;

    let effective_tag = if tag == TAG_EXTENSIBLE {
        let extensible = std::ptr::read_unaligned(ptr as *const WAVEFORMATEXTENSIBLE);
        // KSDATAFORMAT_SUBTYPE_* GUIDs carry the plain format tag in Data1.
        let sub_format = extensible.SubFormat;
        sub_format.data1 as u16
    } else {
        tag
    };

    let sample_format = sample_format_for(effective_tag, bits).ok_or_else(|| {
        ActivationError::UnsupportedFormat(format!("format tag {:#06x} with {} bits", effective_tag, bits))
    })?;

    let format = StreamFormat::new(sample_rate, channels, sample_format);
    format.validate().map_err(ActivationError::UnsupportedFormat)?;
    Ok(format)
}

fn sample_format_for(tag: u16, bits: u16) -> Option<SampleFormat> {
    match (tag, bits) {
        (TAG_IEEE_FLOAT, 32) => Some(SampleFormat::F32),
        (TAG_PCM, 16) => Some(SampleFormat::I16),
        (TAG_PCM, 24) => Some(SampleFormat::I24),
        (TAG_PCM, 32) => Some(SampleFormat::I32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_default_is_ieee_float() {
        let wave = to_wave_format(StreamFormat::process_default());
        let (tag, align, avg) = (wave.wFormatTag, wave.nBlockAlign, wave.nAvgBytesPerSec);
        assert_eq!(tag, TAG_IEEE_FLOAT);
        assert_eq!(align, 8);
        assert_eq!(avg, 48_000 * 8);
    }

    #[test]
    fn wave_format_reads_back() {
        let format = StreamFormat::new(44_100, 2, SampleFormat::I16);
        let wave = to_wave_format(format);
        assert_eq!(unsafe { from_wave_format(&wave) }, Ok(format));
    }

    #[test]
    fn unknown_tags_are_rejected() {
        assert_eq!(sample_format_for(TAG_IEEE_FLOAT, 64), None);
        assert_eq!(sample_format_for(0x55, 16), None);
    }
}
