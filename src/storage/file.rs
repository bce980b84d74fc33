//! Map file
//!
//! Whole-map snapshot written on save and loaded on open.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AoError, Result};
use crate::map::{Entry, MapId};

use super::SUFFIX_TEMP_FILE;

/// Header size: magic (4) + version (2) + map id (4) + crc (4) + payload len (8)
pub const HEADER_SIZE: usize = 22;

const MAGIC: [u8; 4] = *b"AOMF";
const FORMAT_VERSION: u16 = 1;

#[derive(Serialize)]
struct PayloadRef<'a> {
    name: &'a str,
    entries: &'a [Entry],
}

#[derive(Deserialize)]
struct Payload {
    name: String,
    entries: Vec<Entry>,
}

/// Decoded contents of one map artifact
#[derive(Debug)]
pub struct MapFile {
    pub name: String,
    pub id: MapId,
    /// Entries in the key order they were saved in
    pub entries: Vec<Entry>,
}

impl MapFile {
    /// Write a snapshot to `path`.
    ///
    /// The snapshot goes to `{path}.tmp` first and is renamed over `path`
    /// after an fsync, so a crash mid-save leaves the previous snapshot intact.
    pub fn write(path: &Path, name: &str, id: MapId, entries: &[Entry]) -> Result<()> {
        let payload = bincode::serialize(&PayloadRef { name, entries })?;
        let crc = crc32fast::hash(&payload);

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&MAGIC);
        header.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        header.extend_from_slice(&id.0.to_be_bytes());
        header.extend_from_slice(&crc.to_be_bytes());
        header.extend_from_slice(&(payload.len() as u64).to_be_bytes());

        let tmp = temp_path(path);
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            writer.write_all(&header)?;
            writer.write_all(&payload)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Read and verify a snapshot
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;

        if bytes.len() < HEADER_SIZE {
            return Err(AoError::Corruption(format!(
                "{}: truncated header ({} bytes)",
                path.display(),
                bytes.len()
            )));
        }

        if bytes[0..4] != MAGIC {
            return Err(AoError::Corruption(format!("{}: bad magic", path.display())));
        }

        let version = u16::from_be_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(AoError::Corruption(format!(
                "{}: unsupported format version {}",
                path.display(),
                version
            )));
        }

        let id = u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let crc = u32::from_be_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[14..HEADER_SIZE]);
        let len = u64::from_be_bytes(len);

        let payload = &bytes[HEADER_SIZE..];
        if payload.len() as u64 != len {
            return Err(AoError::Corruption(format!(
                "{}: payload length {} does not match header {}",
                path.display(),
                payload.len(),
                len
            )));
        }

        if crc32fast::hash(payload) != crc {
            return Err(AoError::Corruption(format!(
                "{}: checksum mismatch",
                path.display()
            )));
        }

        let payload: Payload = bincode::deserialize(payload)?;

        Ok(Self {
            name: payload.name,
            id: MapId(id),
            entries: payload.entries,
        })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(SUFFIX_TEMP_FILE);
    PathBuf::from(name)
}
