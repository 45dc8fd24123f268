//! Archive access
//!
//! Listing reads only the central directory, so multi-gigabyte archives can
//! be filtered before anything is extracted.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

use crate::error::{IngestError, Result};
use crate::models::ArchivedEntry;

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

pub trait Unpacker: Send + Sync {
    fn is_archive(&self, path: &Path) -> bool;

    /// Table of contents, directories excluded
    fn list_files(&self, archive: &Path) -> Result<Vec<ArchivedEntry>>;

    /// Extract everything into `destination`
    fn unpack(&self, archive: &Path, destination: &Path) -> Result<()>;

    /// Extract one entry and return where it was written
    fn extract_entry(&self, archive: &Path, name: &str, destination: &Path) -> Result<PathBuf> {
        let mut written = self.extract_entries(archive, &[name.to_string()], destination)?;
        written.pop().ok_or_else(|| IngestError::Archive {
            path: archive.to_path_buf(),
            message: format!("entry '{}' was not extracted", name),
            source: None,
        })
    }

    /// Extract several entries in one pass over the archive; outputs follow `names` order
    fn extract_entries(
        &self,
        archive: &Path,
        names: &[String],
        destination: &Path,
    ) -> Result<Vec<PathBuf>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZipUnpacker;

impl ZipUnpacker {
    pub fn new() -> Self {
        Self
    }

    fn open(&self, archive: &Path) -> Result<ZipArchive<BufReader<File>>> {
        let file = File::open(archive)?;
        ZipArchive::new(BufReader::new(file)).map_err(|e| IngestError::archive(archive, e))
    }
}

impl Unpacker for ZipUnpacker {
    fn is_archive(&self, path: &Path) -> bool {
        let mut magic = [0u8; 4];
        match File::open(path) {
            Ok(mut file) => file.read_exact(&mut magic).is_ok() && magic == ZIP_MAGIC,
            Err(_) => false,
        }
    }

    fn list_files(&self, archive: &Path) -> Result<Vec<ArchivedEntry>> {
        let mut zip = self.open(archive)?;
        let mut entries = Vec::with_capacity(zip.len());

        for index in 0..zip.len() {
            let entry = zip.by_index_raw(index).map_err(|e| IngestError::archive(archive, e))?;
            if entry.is_dir() {
                continue;
            }
            entries.push(ArchivedEntry {
                name: entry.name().to_string(),
                index,
                size: entry.size(),
            });
        }

        debug!(archive = %archive.display(), entries = entries.len(), "Listed archive");
        Ok(entries)
    }

    fn unpack(&self, archive: &Path, destination: &Path) -> Result<()> {
        std::fs::create_dir_all(destination)?;
        let mut zip = self.open(archive)?;
        zip.extract(destination).map_err(|e| IngestError::archive(archive, e))?;
        debug!(archive = %archive.display(), destination = %destination.display(), "Unpacked archive");
        Ok(())
    }

    fn extract_entries(
        &self,
        archive: &Path,
        names: &[String],
        destination: &Path,
    ) -> Result<Vec<PathBuf>> {
        let mut zip = self.open(archive)?;
        let mut written = Vec::with_capacity(names.len());

        for name in names {
            let mut entry = zip.by_name(name).map_err(|e| IngestError::archive(archive, e))?;
            let relative = entry.enclosed_name().ok_or_else(|| IngestError::Archive {
                path: archive.to_path_buf(),
                message: format!("entry '{}' escapes the destination folder", name),
                source: None,
            })?;
            let output = destination.join(relative);
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let mut file = File::create(&output)?;
            std::io::copy(&mut entry, &mut file)?;
            written.push(output);
        }

        debug!(archive = %archive.display(), entries = written.len(), "Extracted entries");
        Ok(written)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Write a zip with the given entries; shared with selector tests
    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, body) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_list_and_detect() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("gar.zip");
        write_zip(&archive, &[("01/AS_HOUSES_1_a.XML", b"<houses/>"), ("empty.txt", b"")]);

        let unpacker = ZipUnpacker::new();
        assert!(unpacker.is_archive(&archive));

        let plain = dir.path().join("plain.xml");
        std::fs::write(&plain, b"<x/>").unwrap();
        assert!(!unpacker.is_archive(&plain));
        assert!(!unpacker.is_archive(&dir.path().join("missing.zip")));

        let entries = unpacker.list_files(&archive).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "01/AS_HOUSES_1_a.XML");
        assert_eq!(entries[0].size, 9);
        assert_eq!(entries[1].size, 0);
    }

    #[test]
    fn test_extract_entry_and_unpack() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("gar.zip");
        write_zip(&archive, &[("01/a.XML", b"aaa"), ("b.XML", b"bb")]);
        let unpacker = ZipUnpacker::new();

        let single = dir.path().join("single");
        let written = unpacker.extract_entry(&archive, "01/a.XML", &single).unwrap();
        assert_eq!(written, single.join("01/a.XML"));
        assert_eq!(std::fs::read(&written).unwrap(), b"aaa");
        assert!(!single.join("b.XML").exists());

        let batch = dir.path().join("batch");
        let names = vec!["b.XML".to_string(), "01/a.XML".to_string()];
        let written = unpacker.extract_entries(&archive, &names, &batch).unwrap();
        assert_eq!(written, vec![batch.join("b.XML"), batch.join("01/a.XML")]);
        assert!(unpacker
            .extract_entries(&archive, &["missing.XML".to_string()], &batch)
            .is_err());

        let all = dir.path().join("all");
        unpacker.unpack(&archive, &all).unwrap();
        assert_eq!(std::fs::read(all.join("b.XML")).unwrap(), b"bb");
    }

    #[test]
    fn test_corrupt_archive_is_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bad.zip");
        std::fs::write(&archive, b"PK\x03\x04 not really a zip").unwrap();

        let err = ZipUnpacker::new().list_files(&archive).unwrap_err();
        assert!(matches!(err, IngestError::Archive { .. }));
    }
}
