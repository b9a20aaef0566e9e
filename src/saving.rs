use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{File, create_dir_all};
use std::io::{BufReader, BufWriter, Cursor, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::Result;
use crate::model::Ledger;

/// Write a ledger as gzip-compressed bincode.
///
/// The file is written next to its destination and renamed into place, so a
/// crash mid-write never leaves a truncated ledger behind.
pub fn save_ledger(ledger: &Ledger, path: &Path) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let encoder = GzEncoder::new(tmp.as_file_mut(), Compression::default());
        let mut writer = BufWriter::new(encoder);
        serialize_into(&mut writer, ledger)?;
        writer.flush()?;
        let encoder = writer.into_inner().map_err(|e| e.into_error())?;
        encoder.finish()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn load_ledger(path: &Path) -> Result<Ledger> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(GzDecoder::new(file));
    let ledger: Ledger = deserialize_from(&mut reader)?;
    Ok(ledger)
}

/// Same encoding as [`save_ledger`], into memory. Used for backup downloads.
pub fn encode_ledger(ledger: &Ledger) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    serialize_into(&mut encoder, ledger)?;
    Ok(encoder.finish()?)
}

pub fn decode_ledger(bytes: &[u8]) -> Result<Ledger> {
    let mut reader = BufReader::new(GzDecoder::new(Cursor::new(bytes)));
    let ledger: Ledger = deserialize_from(&mut reader)?;
    Ok(ledger)
}
