//! WAV fixture builders
//!
//! `WavBuilder` writes RIFF/RIFX images byte by byte so tests can produce
//! encodings hound does not write (big-endian, AMB GUIDs, odd chunks) and
//! deliberately inconsistent headers.

use hound::{WavSpec, WavWriter};
use std::path::Path;

pub const WAVE_FORMAT_PCM: u16 = 0x0001;
pub const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
pub const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Trailing 12 bytes of the AMB B-format GUIDs
pub const AMB_GUID_TAIL: [u8; 12] = [
    0x21, 0x07, 0xD3, 0x11, 0x86, 0x44, 0xC8, 0xC1, 0xCA, 0x00, 0x00, 0x00,
];

/// Trailing 12 bytes of the KSDATAFORMAT GUIDs
pub const KS_GUID_TAIL: [u8; 12] = [
    0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
];

#[derive(Clone)]
pub struct WavBuilder {
    big_endian: bool,
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    bits: u16,
    block_align: Option<u16>,
    byte_rate: Option<u32>,
    extensible: Option<(u16, [u8; 12])>,
    fmt_padding: usize,
    leading_chunks: Vec<([u8; 4], Vec<u8>)>,
    data: Vec<u8>,
    omit_fmt: bool,
    omit_data: bool,
}

impl WavBuilder {
    pub fn pcm(channels: u16, sample_rate: u32, bits: u16) -> Self {
        Self {
            big_endian: false,
            format_tag: WAVE_FORMAT_PCM,
            channels,
            sample_rate,
            bits,
            block_align: None,
            byte_rate: None,
            extensible: None,
            fmt_padding: 0,
            leading_chunks: Vec::new(),
            data: Vec::new(),
            omit_fmt: false,
            omit_data: false,
        }
    }

    pub fn float(channels: u16, sample_rate: u32, bits: u16) -> Self {
        Self {
            format_tag: WAVE_FORMAT_IEEE_FLOAT,
            ..Self::pcm(channels, sample_rate, bits)
        }
    }

    /// Write a RIFX (big-endian) image
    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    /// WAVE_FORMAT_EXTENSIBLE with sub-format code `sub_format` and GUID tail
    pub fn extensible(mut self, sub_format: u16, guid_tail: [u8; 12]) -> Self {
        self.extensible = Some((sub_format, guid_tail));
        self
    }

    /// Append `bytes` of vendor data to the fmt chunk
    pub fn fmt_padding(mut self, bytes: usize) -> Self {
        self.fmt_padding = bytes;
        self
    }

    /// Insert a chunk before fmt
    pub fn chunk(mut self, id: &[u8; 4], body: &[u8]) -> Self {
        self.leading_chunks.push((*id, body.to_vec()));
        self
    }

    pub fn block_align(mut self, value: u16) -> Self {
        self.block_align = Some(value);
        self
    }

    pub fn byte_rate(mut self, value: u32) -> Self {
        self.byte_rate = Some(value);
        self
    }

    pub fn without_fmt(mut self) -> Self {
        self.omit_fmt = true;
        self
    }

    pub fn without_data(mut self) -> Self {
        self.omit_data = true;
        self
    }

    /// Raw data chunk body
    pub fn data(mut self, bytes: Vec<u8>) -> Self {
        self.data = bytes;
        self
    }

    /// 16-bit samples in the image's byte order
    pub fn samples_i16(self, samples: &[i16]) -> Self {
        let be = self.big_endian;
        let bytes = samples
            .iter()
            .flat_map(|s| if be { s.to_be_bytes() } else { s.to_le_bytes() })
            .collect();
        self.data(bytes)
    }

    /// 24-bit samples (given as i32 in the 24-bit range) in the image's byte order
    pub fn samples_i24(self, samples: &[i32]) -> Self {
        let be = self.big_endian;
        let bytes = samples
            .iter()
            .flat_map(|s| {
                let b = s.to_le_bytes();
                if be {
                    [b[2], b[1], b[0]]
                } else {
                    [b[0], b[1], b[2]]
                }
            })
            .collect();
        self.data(bytes)
    }

    pub fn samples_i32(self, samples: &[i32]) -> Self {
        let be = self.big_endian;
        let bytes = samples
            .iter()
            .flat_map(|s| if be { s.to_be_bytes() } else { s.to_le_bytes() })
            .collect();
        self.data(bytes)
    }

    pub fn samples_f32(self, samples: &[f32]) -> Self {
        let be = self.big_endian;
        let bytes = samples
            .iter()
            .flat_map(|s| if be { s.to_be_bytes() } else { s.to_le_bytes() })
            .collect();
        self.data(bytes)
    }

    pub fn samples_f64(self, samples: &[f64]) -> Self {
        let be = self.big_endian;
        let bytes = samples
            .iter()
            .flat_map(|s| if be { s.to_be_bytes() } else { s.to_le_bytes() })
            .collect();
        self.data(bytes)
    }

    pub fn samples_u8(self, samples: &[u8]) -> Self {
        self.data(samples.to_vec())
    }

    fn u16(&self, out: &mut Vec<u8>, value: u16) {
        out.extend_from_slice(&if self.big_endian { value.to_be_bytes() } else { value.to_le_bytes() });
    }

    fn u32(&self, out: &mut Vec<u8>, value: u32) {
        out.extend_from_slice(&if self.big_endian { value.to_be_bytes() } else { value.to_le_bytes() });
    }

    fn push_chunk(&self, out: &mut Vec<u8>, id: &[u8; 4], body: &[u8]) {
        out.extend_from_slice(id);
        self.u32(out, body.len() as u32);
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
    }

    fn fmt_body(&self) -> Vec<u8> {
        let block_align = self
            .block_align
            .unwrap_or(self.channels * (self.bits / 8));
        let byte_rate = self
            .byte_rate
            .unwrap_or(self.sample_rate * block_align as u32);

        let mut body = Vec::new();
        let tag = if self.extensible.is_some() {
            WAVE_FORMAT_EXTENSIBLE
        } else {
            self.format_tag
        };
        self.u16(&mut body, tag);
        self.u16(&mut body, self.channels);
        self.u32(&mut body, self.sample_rate);
        self.u32(&mut body, byte_rate);
        self.u16(&mut body, block_align);
        self.u16(&mut body, self.bits);

        if let Some((sub_format, guid_tail)) = self.extensible {
            self.u16(&mut body, 22);
            self.u16(&mut body, self.bits);
            self.u32(&mut body, 0);
            self.u32(&mut body, sub_format as u32);
            body.extend_from_slice(&guid_tail);
        }

        body.extend(std::iter::repeat(0xEE).take(self.fmt_padding));
        body
    }

    pub fn build(&self) -> Vec<u8> {
        let mut chunks = Vec::new();
        for (id, body) in &self.leading_chunks {
            self.push_chunk(&mut chunks, id, body);
        }
        if !self.omit_fmt {
            let body = self.fmt_body();
            self.push_chunk(&mut chunks, b"fmt ", &body);
        }
        if !self.omit_data {
            self.push_chunk(&mut chunks, b"data", &self.data);
        }

        let mut out = Vec::with_capacity(chunks.len() + 12);
        out.extend_from_slice(if self.big_endian { b"RIFX" } else { b"RIFF" });
        self.u32(&mut out, chunks.len() as u32 + 4);
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(&chunks);
        out
    }
}

/// Write a 16-bit PCM file with hound
pub fn write_hound_wav<P: AsRef<Path>>(
    path: P,
    channels: u16,
    sample_rate: u32,
    samples: &[i16],
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

pub fn f32_bytes(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_ne_bytes()).collect()
}

pub fn f32_values(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
