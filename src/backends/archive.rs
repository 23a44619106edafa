// src/backends/archive.rs

//! Reading downloaded artifacts in process
//!
//! DEB packages are AR archives holding a `control.tar.*` member; the
//! package name lives in its `control` file. RPM headers are read with the
//! `rpm` crate. Source archives are unpacked into a caller-owned directory.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::debug;
use xz2::read::XzDecoder;

/// Extract file from AR archive by name prefix
fn extract_ar_member(path: &Path, prefix: &str) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut archive = ar::Archive::new(file);

    while let Some(entry) = archive.next_entry() {
        let mut entry =
            entry.map_err(|e| Error::ParseError(format!("Failed to read AR entry: {}", e)))?;

        let entry_name = String::from_utf8_lossy(entry.header().identifier()).to_string();

        if entry_name.starts_with(prefix) {
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            return Ok(content);
        }
    }

    Err(Error::NotFoundError(format!(
        "{} not found in {}",
        prefix,
        path.display()
    )))
}

/// Contents of the `control` file inside a `.deb`
pub fn deb_control(path: &Path) -> Result<String> {
    for member in ["control.tar.gz", "control.tar.xz", "control.tar.zst", "control.tar"] {
        let Ok(tar_data) = extract_ar_member(path, member) else {
            continue;
        };

        let reader: Box<dyn Read> = if member.ends_with(".gz") {
            Box::new(GzDecoder::new(&tar_data[..]))
        } else if member.ends_with(".xz") {
            Box::new(XzDecoder::new(&tar_data[..]))
        } else if member.ends_with(".zst") {
            Box::new(zstd::Decoder::new(&tar_data[..])?)
        } else {
            Box::new(&tar_data[..])
        };

        let mut archive = Archive::new(reader);
        for entry in archive.entries()? {
            let mut entry = entry?;
            let entry_path = entry.path()?.to_string_lossy().to_string();

            if entry_path == "./control" || entry_path == "control" {
                let mut content = String::new();
                entry.read_to_string(&mut content)?;
                return Ok(content);
            }
        }
    }

    Err(Error::ParseError(format!(
        "Could not find a control file in {}",
        path.display()
    )))
}

/// `Package:` field of a `.deb`
pub fn deb_package_name(path: &Path) -> Result<String> {
    let control = deb_control(path)?;
    control
        .lines()
        .find_map(|line| line.strip_prefix("Package:"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::ParseError("Package name not found in control file".to_string()))
}

/// Name from an `.rpm` header
pub fn rpm_package_name(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut buf_reader = BufReader::new(file);

    let pkg = rpm::Package::parse(&mut buf_reader)
        .map_err(|e| Error::ParseError(format!("Failed to parse RPM: {}", e)))?;

    pkg.metadata
        .get_name()
        .map(str::to_string)
        .map_err(|e| Error::ParseError(format!("RPM has no name: {}", e)))
}

/// File name minus its extension, the last resort for a package name
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Archive formats the source backend can unpack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceArchive {
    TarGz,
    TarXz,
    Zip,
}

impl SourceArchive {
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(SourceArchive::TarGz)
        } else if name.ends_with(".tar.xz") {
            Some(SourceArchive::TarXz)
        } else if name.ends_with(".zip") {
            Some(SourceArchive::Zip)
        } else {
            None
        }
    }
}

/// Unpack a source archive into `dest` and return the source root
///
/// The root is the single top-level directory when the archive has one,
/// as release tarballs usually do, otherwise `dest` itself.
pub fn extract_source(archive: &Path, dest: &Path) -> Result<PathBuf> {
    let kind = SourceArchive::detect(archive).ok_or_else(|| {
        Error::InstallFailed(format!("Unsupported source archive: {}", archive.display()))
    })?;

    debug!("Extracting {} into {}", archive.display(), dest.display());
    fs::create_dir_all(dest)?;

    let file = File::open(archive)?;
    match kind {
        SourceArchive::TarGz => Archive::new(GzDecoder::new(file)).unpack(dest)?,
        SourceArchive::TarXz => Archive::new(XzDecoder::new(file)).unpack(dest)?,
        SourceArchive::Zip => {
            let mut zip = zip::ZipArchive::new(file)
                .map_err(|e| Error::InstallFailed(format!("Invalid zip archive: {}", e)))?;
            zip.extract(dest)
                .map_err(|e| Error::InstallFailed(format!("Failed to extract zip: {}", e)))?;
        }
    }

    source_root(dest)
}

fn source_root(dest: &Path) -> Result<PathBuf> {
    let entries: Vec<PathBuf> = fs::read_dir(dest)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();

    match entries.as_slice() {
        [only] if only.is_dir() => Ok(only.clone()),
        _ => Ok(dest.to_path_buf()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *content).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    /// Minimal `.deb` with a gzip control member
    pub(crate) fn build_deb(path: &Path, package: &str) {
        let control = format!(
            "Package: {}\nVersion: 1.0-1\nArchitecture: amd64\nDescription: test\n",
            package
        );
        let control_tar = tar_gz(&[("./control", control.as_bytes())]);
        let data_tar = tar_gz(&[]);

        let mut builder = ar::Builder::new(File::create(path).unwrap());
        let members: [(&str, &[u8]); 3] = [
            ("debian-binary", b"2.0\n"),
            ("control.tar.gz", control_tar.as_slice()),
            ("data.tar.gz", data_tar.as_slice()),
        ];
        for (name, data) in members {
            let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
            builder.append(&header, data).unwrap();
        }
    }

    #[test]
    fn test_deb_package_name() {
        let dir = tempfile::tempdir().unwrap();
        let deb = dir.path().join("tool_1.0_amd64.deb");
        build_deb(&deb, "tool-cli");

        assert_eq!(deb_package_name(&deb).unwrap(), "tool-cli");
        assert!(deb_control(&deb).unwrap().contains("Version: 1.0-1"));
    }

    #[test]
    fn test_deb_package_name_not_a_deb() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.deb");
        fs::write(&bogus, b"definitely not an ar archive").unwrap();
        assert!(deb_package_name(&bogus).is_err());
    }

    #[test]
    fn test_rpm_package_name_not_an_rpm() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.rpm");
        fs::write(&bogus, b"nope").unwrap();
        assert!(rpm_package_name(&bogus).is_err());
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem(Path::new("/tmp/tool_1.0_amd64.deb")), "tool_1.0_amd64");
    }

    #[test]
    fn test_source_archive_detect() {
        assert_eq!(SourceArchive::detect(Path::new("a.tar.gz")), Some(SourceArchive::TarGz));
        assert_eq!(SourceArchive::detect(Path::new("a.TGZ")), Some(SourceArchive::TarGz));
        assert_eq!(SourceArchive::detect(Path::new("a.tar.xz")), Some(SourceArchive::TarXz));
        assert_eq!(SourceArchive::detect(Path::new("a.zip")), Some(SourceArchive::Zip));
        assert_eq!(SourceArchive::detect(Path::new("a.deb")), None);
    }

    #[test]
    fn test_extract_tarball_single_root() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tool-1.0.tar.gz");
        fs::write(
            &archive,
            tar_gz(&[("tool-1.0/Makefile", b"all:\n"), ("tool-1.0/README", b"hi")]),
        )
        .unwrap();

        let dest = dir.path().join("out");
        let root = extract_source(&archive, &dest).unwrap();
        assert_eq!(root, dest.join("tool-1.0"));
        assert!(root.join("Makefile").exists());
    }

    #[test]
    fn test_extract_zip_flat() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tool.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("go.mod", options).unwrap();
            zip.write_all(b"module tool\n").unwrap();
            zip.start_file("main.go", options).unwrap();
            zip.write_all(b"package main\n").unwrap();
            zip.finish().unwrap();
        }

        let dest = dir.path().join("out");
        let root = extract_source(&archive, &dest).unwrap();
        assert_eq!(root, dest);
        assert!(root.join("go.mod").exists());
    }

    #[test]
    fn test_extract_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tool.tar.bz2");
        fs::write(&archive, b"x").unwrap();
        assert!(matches!(
            extract_source(&archive, &dir.path().join("out")),
            Err(Error::InstallFailed(_))
        ));
    }
}
