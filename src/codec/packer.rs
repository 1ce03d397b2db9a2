use serde::{Serialize, Deserialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Poly;

/// Turns documents into bytes for media that store opaque values.
pub trait PolyCodec: Send + Sync {
    fn encode(&self, poly: &Poly) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Poly>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionType {
    None,
    LZ4,      // Fast compression, ratio 2-3x
    Zstd,     // Better ratio, slower
    Snappy,
}

/// Plain JSON, no packing.
#[derive(Debug, Clone, Default)]
pub struct JsonCodec;

impl PolyCodec for JsonCodec {
    fn encode(&self, poly: &Poly) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(poly)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Poly> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn name(&self) -> &str {
        "json"
    }
}

/// JSON followed by block compression.
///
/// Layout: `[compression tag: u8][original size: u32 LE][payload]`. The tag lets
/// a reader configured for another compression still decode old values.
#[derive(Debug, Clone)]
pub struct CompressedCodec {
    pub compression: CompressionType,
}

impl CompressedCodec {
    pub fn new(compression: CompressionType) -> Self {
        CompressedCodec { compression }
    }
}

impl PolyCodec for CompressedCodec {
    fn encode(&self, poly: &Poly) -> Result<Vec<u8>> {
        let raw = serde_json::to_vec(poly)?;
        let payload = compress(&raw, self.compression)?;

        let mut out = Vec::with_capacity(payload.len() + 5);
        out.push(compression_tag(self.compression));
        out.extend_from_slice(&(raw.len() as u32).to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Poly> {
        if bytes.len() < 5 {
            return Err(Error::new(ErrorKind::Parse, "Encoded poly too short".to_string()));
        }
        let compression = compression_from_tag(bytes[0])?;
        let original_size = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        let raw = decompress(&bytes[5..], compression, original_size)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn name(&self) -> &str {
        match self.compression {
            CompressionType::None => "json",
            CompressionType::LZ4 => "json+lz4",
            CompressionType::Zstd => "json+zstd",
            CompressionType::Snappy => "json+snappy",
        }
    }
}

fn compression_tag(compression: CompressionType) -> u8 {
    match compression {
        CompressionType::None => 0,
        CompressionType::LZ4 => 1,
        CompressionType::Zstd => 2,
        CompressionType::Snappy => 3,
    }
}

fn compression_from_tag(tag: u8) -> Result<CompressionType> {
    match tag {
        0 => Ok(CompressionType::None),
        1 => Ok(CompressionType::LZ4),
        2 => Ok(CompressionType::Zstd),
        3 => Ok(CompressionType::Snappy),
        other => Err(Error::new(ErrorKind::Parse, format!("Unknown compression tag {}", other))),
    }
}

pub fn compress(data: &[u8], compression: CompressionType) -> Result<Vec<u8>> {
    let compressed = match compression {
        CompressionType::None => data.to_vec(),

        CompressionType::LZ4 => {
            lz4::block::compress(data, None, false)?
        }

        CompressionType::Zstd => {
            zstd::encode_all(data, 3)?  // Level 3 is balanced
        }

        CompressionType::Snappy => {
            use snap::raw::Encoder;
            let mut encoder = Encoder::new();
            encoder.compress_vec(data)
                .map_err(|e| Error::new(ErrorKind::Io, e.to_string()))?
        }
    };
    Ok(compressed)
}

pub fn decompress(data: &[u8], compression: CompressionType, original_size: usize) -> Result<Vec<u8>> {
    match compression {
        CompressionType::None => Ok(data.to_vec()),

        CompressionType::LZ4 => {
            lz4::block::decompress(data, Some(original_size as i32))
                .map_err(|e| Error::new(ErrorKind::Io, e.to_string()))
        }

        CompressionType::Zstd => {
            zstd::decode_all(data)
                .map_err(|e| Error::new(ErrorKind::Io, e.to_string()))
        }

        CompressionType::Snappy => {
            use snap::raw::Decoder;
            let mut decoder = Decoder::new();
            decoder.decompress_vec(data)
                .map_err(|e| Error::new(ErrorKind::Io, e.to_string()))
        }
    }
}

/// Build the codec named by the engine configuration.
pub fn codec_for(compression: CompressionType) -> Box<dyn PolyCodec> {
    match compression {
        CompressionType::None => Box::new(JsonCodec),
        other => Box::new(CompressedCodec::new(other)),
    }
}
