use std::fs;
use std::io::{self, Read, Write};

use camino::Utf8Path;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use zip::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::error::CollectError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Writes a single deflated entry into a fresh zip archive at `zip_path`,
/// replacing any existing archive.
pub fn write_zip_entry(
    zip_path: &Utf8Path,
    entry_name: &str,
    contents: &[u8],
) -> Result<(), CollectError> {
    let parent = zip_path
        .parent()
        .ok_or_else(|| CollectError::Filesystem(format!("invalid zip path {zip_path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| CollectError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix("stat-collect-zip")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CollectError::Filesystem(err.to_string()))?;

    let file = temp
        .reopen()
        .map_err(|err| CollectError::Filesystem(err.to_string()))?;
    let mut zip = ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    zip.start_file(entry_name, options)
        .map_err(|err| CollectError::Filesystem(err.to_string()))?;
    zip.write_all(contents)
        .map_err(|err| CollectError::Filesystem(err.to_string()))?;
    zip.finish()
        .map_err(|err| CollectError::Filesystem(err.to_string()))?;

    temp.persist(zip_path.as_std_path())
        .map_err(|err| CollectError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn read_zip_entry(zip_path: &Utf8Path, entry_name: &str) -> Result<Vec<u8>, CollectError> {
    let file = fs::File::open(zip_path.as_std_path())
        .map_err(|err| CollectError::Filesystem(format!("open zip {zip_path}: {err}")))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| CollectError::Filesystem(err.to_string()))?;
    let mut entry = archive
        .by_name(entry_name)
        .map_err(|err| CollectError::Filesystem(format!("{entry_name}: {err}")))?;
    let mut contents = Vec::new();
    entry
        .read_to_end(&mut contents)
        .map_err(|err| CollectError::Filesystem(err.to_string()))?;
    Ok(contents)
}

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Decodes the whole stream to make sure it is not truncated.
pub fn validate_gzip(bytes: &[u8]) -> Result<(), CollectError> {
    let mut decoder = GzDecoder::new(bytes);
    io::copy(&mut decoder, &mut io::sink())
        .map_err(|err| CollectError::parse("gzip payload", err))?;
    Ok(())
}

pub fn gzip_bytes(bytes: &[u8]) -> Result<Vec<u8>, CollectError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|err| CollectError::Filesystem(err.to_string()))?;
    encoder
        .finish()
        .map_err(|err| CollectError::Filesystem(err.to_string()))
}
