use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use crc32fast::Hasher;
use serde::{Serialize, Deserialize};
use tracing::warn;
use crate::codec::packer::PolyCodec;
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::record::StoredPoly;
use crate::storage::registry::DatasetRecord;

const FORMAT_VERSION: u32 = 1;

// [ bincode(DatasetFile) ]
// [ crc32 of the above: u32 LE ]
#[derive(Serialize, Deserialize)]
struct DatasetFile {
    version: u32,
    name: String,
    config: Vec<u8>,
    metadata: Vec<u8>,
    documents: Vec<Vec<u8>>,  // codec-encoded, write metadata included
}

pub struct LoadedDataset {
    pub name: String,
    pub record: DatasetRecord,
    pub documents: Vec<StoredPoly>,
}

/// Write one dataset atomically: a temporary file renamed over the old one.
pub fn save_dataset<'a, I>(
    path: &Path,
    codec: &dyn PolyCodec,
    name: &str,
    record: &DatasetRecord,
    documents: I,
) -> Result<usize>
where
    I: IntoIterator<Item = &'a StoredPoly>,
{
    let mut encoded = Vec::new();
    for stored in documents {
        encoded.push(codec.encode(&stored.to_poly())?);
    }
    let count = encoded.len();

    let file = DatasetFile {
        version: FORMAT_VERSION,
        name: name.to_string(),
        config: codec.encode(&record.config)?,
        metadata: codec.encode(&record.metadata)?,
        documents: encoded,
    };
    let mut data = bincode::serialize(&file)?;

    let mut hasher = Hasher::new();
    hasher.update(&data);
    data.extend_from_slice(&hasher.finalize().to_le_bytes());

    let tmp = path.with_extension("poly.tmp");
    {
        let mut out = File::create(&tmp)?;
        out.write_all(&data)?;
        out.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(count)
}

/// Documents that fail to decode are skipped with a warning; a damaged
/// container fails the whole load.
pub fn load_dataset(path: &Path, codec: &dyn PolyCodec) -> Result<LoadedDataset> {
    let data = fs::read(path)?;
    if data.len() < 4 {
        return Err(corrupt(path, "file too short"));
    }
    let (body, trailer) = data.split_at(data.len() - 4);
    let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let mut hasher = Hasher::new();
    hasher.update(body);
    if hasher.finalize() != expected {
        return Err(corrupt(path, "checksum mismatch"));
    }

    let file: DatasetFile = bincode::deserialize(body)?;
    if file.version != FORMAT_VERSION {
        return Err(corrupt(path, &format!("unsupported format version {}", file.version)));
    }

    let record = DatasetRecord {
        config: codec.decode(&file.config)?,
        metadata: codec.decode(&file.metadata)?,
    };

    let mut documents = Vec::with_capacity(file.documents.len());
    for (position, bytes) in file.documents.iter().enumerate() {
        match codec.decode(bytes).and_then(StoredPoly::from_poly) {
            Ok(stored) => documents.push(stored),
            Err(e) => warn!(dataset = %file.name, position, error = %e, "skipping undecodable document"),
        }
    }

    Ok(LoadedDataset {
        name: file.name,
        record,
        documents,
    })
}

fn corrupt(path: &Path, reason: &str) -> Error {
    Error::new(ErrorKind::Parse, format!("{}: {}", path.display(), reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use crate::codec::packer::{CompressedCodec, CompressionType};
    use crate::core::types::Poly;
    use crate::storage::registry::{default_config, default_metadata};

    fn record() -> DatasetRecord {
        DatasetRecord { config: default_config(), metadata: default_metadata() }
    }

    #[test]
    fn round_trips_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blog.poly");
        let codec = CompressedCodec::new(CompressionType::Snappy);
        let tags: BTreeSet<String> = ["_date".to_string()].into();
        let docs = vec![
            StoredPoly::new(Poly::new("a").with("n", 1), tags.clone(), 10, 1),
            StoredPoly::new(Poly::new("b").with("n", 2), tags, 11, 2),
        ];

        assert_eq!(save_dataset(&path, &codec, "blog", &record(), &docs).unwrap(), 2);
        let loaded = load_dataset(&path, &codec).unwrap();
        assert_eq!(loaded.name, "blog");
        assert_eq!(loaded.documents, docs);
    }

    #[test]
    fn detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blog.poly");
        let codec = CompressedCodec::new(CompressionType::None);
        save_dataset(&path, &codec, "blog", &record(), Vec::<StoredPoly>::new().iter()).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes[0] ^= 0xFF;
        fs::write(&path, bytes).unwrap();
        let err = load_dataset(&path, &codec).err().unwrap();
        assert_eq!(err.kind, ErrorKind::Parse);
    }
}
