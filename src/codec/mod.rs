pub mod packer;

pub use packer::{codec_for, CompressedCodec, CompressionType, JsonCodec, PolyCodec};
