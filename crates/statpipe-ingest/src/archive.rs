//! Archive bundle opening
//!
//! A bundle is read fully into memory and its member files listed in archive
//! order. The container format is detected from magic bytes:
//!
//! - **Tar** (.tar): the collectors' native format
//! - **Tar.gz** (.tar.gz, .tgz): gzip magic `1f 8b`, then tar
//! - **Zip** (.zip): `PK` local-file or empty-archive signature
//!
//! Directories, macOS resource forks (`._*` files and `__MACOSX/` folders)
//! and non-regular tar entries are counted as skipped and never surface as
//! members.

use flate2::read::GzDecoder;
use serde::Serialize;
use std::io::{Cursor, Read};
use tracing::debug;

use crate::error::ArchiveError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZIP_MAGIC: [u8; 4] = [b'P', b'K', 0x03, 0x04];
const ZIP_EMPTY_MAGIC: [u8; 4] = [b'P', b'K', 0x05, 0x06];

/// Hidden-file prefix written by macOS archivers
pub const HIDDEN_MARKER: &str = "._";
const RESOURCE_FORK_DIR: &str = "__MACOSX";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    Zip,
}

impl ArchiveFormat {
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(&GZIP_MAGIC) {
            ArchiveFormat::TarGz
        } else if bytes.starts_with(&ZIP_MAGIC) || bytes.starts_with(&ZIP_EMPTY_MAGIC) {
            ArchiveFormat::Zip
        } else {
            ArchiveFormat::Tar
        }
    }
}

/// One regular file inside a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberFile {
    /// Path relative to the archive root
    pub path: String,
    pub bytes: Vec<u8>,
}

/// An opened archive and its member files in listing order
#[derive(Debug, Clone)]
pub struct ArchiveBundle {
    name: String,
    format: ArchiveFormat,
    members: Vec<MemberFile>,
    skipped: usize,
}

/// Whether an entry path is an OS artifact rather than monitoring data
pub fn is_hidden(path: &str) -> bool {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let last = segments.next_back().unwrap_or("");
    last.starts_with(HIDDEN_MARKER) || path.split('/').any(|s| s == RESOURCE_FORK_DIR)
}

fn normalize_path(path: &str) -> String {
    path.trim_start_matches("./").to_string()
}

impl ArchiveBundle {
    /// Open `bytes` as an archive; `name` identifies the bundle in logs and
    /// reports
    pub fn open(name: impl Into<String>, bytes: &[u8]) -> Result<Self, ArchiveError> {
        let name = name.into();
        let format = ArchiveFormat::detect(bytes);
        let mut bundle = Self {
            name,
            format,
            members: Vec::new(),
            skipped: 0,
        };

        match format {
            ArchiveFormat::Tar => bundle.read_tar(bytes)?,
            ArchiveFormat::TarGz => {
                let mut decompressed = Vec::new();
                GzDecoder::new(bytes)
                    .read_to_end(&mut decompressed)
                    .map_err(|source| ArchiveError::Io {
                        name: bundle.name.clone(),
                        source,
                    })?;
                debug!("Decompressed {} -> {} bytes", bytes.len(), decompressed.len());
                bundle.read_tar(&decompressed)?;
            },
            ArchiveFormat::Zip => bundle.read_zip(bytes)?,
        }

        debug!(
            bundle = %bundle.name,
            format = ?bundle.format,
            members = bundle.members.len(),
            skipped = bundle.skipped,
            "Opened archive bundle"
        );
        Ok(bundle)
    }

    fn io_error(&self, source: std::io::Error) -> ArchiveError {
        ArchiveError::Io {
            name: self.name.clone(),
            source,
        }
    }

    fn push(&mut self, path: String, bytes: Vec<u8>) {
        if is_hidden(&path) {
            debug!(member = %path, "Skipping hidden entry");
            self.skipped += 1;
        } else {
            self.members.push(MemberFile { path, bytes });
        }
    }

    fn read_tar(&mut self, data: &[u8]) -> Result<(), ArchiveError> {
        let mut archive = tar::Archive::new(Cursor::new(data));
        let entries = archive.entries().map_err(|e| self.io_error(e))?;

        for entry_result in entries {
            let mut entry = entry_result.map_err(|e| self.io_error(e))?;
            if !entry.header().entry_type().is_file() {
                self.skipped += 1;
                continue;
            }

            let path = normalize_path(
                &entry
                    .path()
                    .map_err(|e| self.io_error(e))?
                    .to_string_lossy(),
            );
            let mut contents = Vec::new();
            entry
                .read_to_end(&mut contents)
                .map_err(|e| self.io_error(e))?;
            self.push(path, contents);
        }
        Ok(())
    }

    fn read_zip(&mut self, data: &[u8]) -> Result<(), ArchiveError> {
        let zip_error = |name: &str, source| ArchiveError::Zip {
            name: name.to_string(),
            source,
        };
        let mut archive =
            zip::ZipArchive::new(Cursor::new(data)).map_err(|e| zip_error(&self.name, e))?;

        for i in 0..archive.len() {
            let mut file = archive.by_index(i).map_err(|e| zip_error(&self.name, e))?;
            if file.is_dir() {
                self.skipped += 1;
                continue;
            }

            let path = normalize_path(file.name());
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)
                .map_err(|e| self.io_error(e))?;
            drop(file);
            self.push(path, contents);
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    pub fn members(&self) -> &[MemberFile] {
        &self.members
    }

    /// Entries that were not surfaced as members
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(tar::EntryType::Directory);
        dir.set_size(0);
        dir.set_mode(0o755);
        builder
            .append_data(&mut dir, "Acme/", std::io::empty())
            .unwrap();
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            writer.add_directory("Acme/", options).unwrap();
            for (path, data) in files {
                writer.start_file(*path, options).unwrap();
                writer.write_all(data).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_is_hidden() {
        assert!(is_hidden("._host1_srv1_2024-01-01_bpm.log"));
        assert!(is_hidden("Acme/._host1_srv1_2024-01-01_bpm.log"));
        assert!(is_hidden("__MACOSX/Acme/host1_srv1_2024-01-01_bpm.log"));
        assert!(!is_hidden("Acme/host1_srv1_2024-01-01_bpm.log"));
    }

    #[test]
    fn test_open_tar_skips_hidden_and_directories() {
        let bytes = tar_bytes(&[
            ("Acme/host1_srv1_2024-01-01_bpm.log", b"a"),
            ("Acme/._host1_srv1_2024-01-01_bpm.log", b"junk"),
            ("Acme/host1_srv1_2024-01-01_vpcache.log", b"b"),
        ]);
        let bundle = ArchiveBundle::open("bundle.tar", &bytes).unwrap();

        assert_eq!(bundle.format(), ArchiveFormat::Tar);
        let paths: Vec<&str> = bundle.members().iter().map(|m| m.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "Acme/host1_srv1_2024-01-01_bpm.log",
                "Acme/host1_srv1_2024-01-01_vpcache.log"
            ]
        );
        assert_eq!(bundle.members()[0].bytes, b"a");
        assert_eq!(bundle.skipped(), 2);
    }

    #[test]
    fn test_open_tar_gz() {
        let tar = tar_bytes(&[("host1_srv1_2024-01-01_bpm.log", b"data")]);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar).unwrap();
        let bytes = encoder.finish().unwrap();

        let bundle = ArchiveBundle::open("bundle.tar.gz", &bytes).unwrap();
        assert_eq!(bundle.format(), ArchiveFormat::TarGz);
        assert_eq!(bundle.members().len(), 1);
        assert_eq!(bundle.members()[0].bytes, b"data");
    }

    #[test]
    fn test_open_zip() {
        let bytes = zip_bytes(&[
            ("Acme/host1_srv1_2024-01-01_bpm.log", b"a"),
            ("__MACOSX/Acme/._host1_srv1_2024-01-01_bpm.log", b"junk"),
        ]);
        let bundle = ArchiveBundle::open("bundle.zip", &bytes).unwrap();
        assert_eq!(bundle.format(), ArchiveFormat::Zip);
        assert_eq!(bundle.members().len(), 1);
        assert_eq!(bundle.skipped(), 2);
    }

    #[test]
    fn test_open_corrupt_zip_fails() {
        let mut bytes = ZIP_MAGIC.to_vec();
        bytes.extend_from_slice(b"definitely not a zip archive");
        assert!(matches!(
            ArchiveBundle::open("broken.zip", &bytes),
            Err(ArchiveError::Zip { .. })
        ));
    }

    #[test]
    fn test_open_corrupt_gzip_fails() {
        let bytes = [0x1f, 0x8b, 0x00, 0x00, 0x01, 0x02];
        assert!(matches!(
            ArchiveBundle::open("broken.tgz", &bytes),
            Err(ArchiveError::Io { .. })
        ));
    }
}
