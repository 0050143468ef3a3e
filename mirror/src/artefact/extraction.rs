//! Archive expansion for the staging tree.
//!
//! Every top-level archive in the staging directory is unpacked in place and
//! then deleted. Entry paths and link targets are validated to prevent
//! zip-slip style escapes.

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path};

use crate::output::write_stderr_line;

/// Archive container formats recognised by filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Uncompressed `.tar`.
    Tar,
    /// Gzip-compressed tar (`.tar.gz`, `.tgz`).
    TarGz,
    /// Zstandard-compressed tar (`.tar.zst`, `.tzst`).
    TarZstd,
    /// `.zip` archive.
    Zip,
}

/// What a filename says about its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// A container this crate can expand.
    Supported(ArchiveFormat),
    /// A tar archive with a compression this crate cannot read.
    Unsupported,
    /// Not an archive.
    NotArchive,
}

impl ArchiveKind {
    /// Classify a filename.
    ///
    /// ```
    /// use caldb_mirror::artefact::extraction::{ArchiveFormat, ArchiveKind};
    ///
    /// assert_eq!(
    ///     ArchiveKind::from_filename("caldb_4.7.8_main.tar.gz"),
    ///     ArchiveKind::Supported(ArchiveFormat::TarGz)
    /// );
    /// assert_eq!(ArchiveKind::from_filename("x.tar.bz2"), ArchiveKind::Unsupported);
    /// assert_eq!(ArchiveKind::from_filename("README_caldb4.7.8.txt"), ArchiveKind::NotArchive);
    /// ```
    #[must_use]
    pub fn from_filename(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        let format = if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if lower.ends_with(".tar.zst") || lower.ends_with(".tzst") {
            Some(ArchiveFormat::TarZstd)
        } else if lower.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else if lower.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else {
            None
        };
        match format {
            Some(format) => Self::Supported(format),
            None if lower.contains(".tar") => Self::Unsupported,
            None => Self::NotArchive,
        }
    }
}

/// Errors arising from archive expansion.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during extraction.
    #[error("extraction I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip container could not be read.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The archive contains no entries.
    #[error("archive contains no entries")]
    EmptyArchive,

    /// The archive uses a compression this crate cannot read.
    #[error("unsupported archive format: {name}")]
    Unsupported {
        /// The archive filename.
        name: String,
    },
}

/// Failure of one archive during [`expand_archives`].
#[derive(Debug, thiserror::Error)]
#[error("could not expand {archive}: {source}")]
pub struct ExpansionFailure {
    /// The archive that failed.
    pub archive: Utf8PathBuf,
    /// What went wrong.
    #[source]
    pub source: ExtractionError,
}

/// Trait for extracting archives, enabling test mocking.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor {
    /// Extract the archive at `archive_path` into `dest_dir`.
    ///
    /// Returns the number of entries extracted.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::PathTraversal`] if any entry attempts to
    /// escape the destination directory, [`ExtractionError::EmptyArchive`] if
    /// the archive has no entries, and other variants on I/O or format errors.
    fn extract(
        &self,
        archive_path: &Path,
        format: ArchiveFormat,
        dest_dir: &Path,
    ) -> Result<usize, ExtractionError>;
}

/// Default extractor backed by `tar`, `flate2`, `zstd`, and `zip`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardExtractor;

impl ArchiveExtractor for StandardExtractor {
    fn extract(
        &self,
        archive_path: &Path,
        format: ArchiveFormat,
        dest_dir: &Path,
    ) -> Result<usize, ExtractionError> {
        let file = File::open(archive_path)?;
        let count = match format {
            ArchiveFormat::Tar => unpack_tar(file, dest_dir)?,
            ArchiveFormat::TarGz => unpack_tar(flate2::read::GzDecoder::new(file), dest_dir)?,
            ArchiveFormat::TarZstd => unpack_tar(zstd::Decoder::new(file)?, dest_dir)?,
            ArchiveFormat::Zip => unpack_zip(file, dest_dir)?,
        };
        if count == 0 {
            return Err(ExtractionError::EmptyArchive);
        }
        Ok(count)
    }
}

fn unpack_tar(reader: impl Read, dest_dir: &Path) -> Result<usize, ExtractionError> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_mtime(true);
    let mut count = 0;

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_path = entry.path()?.into_owned();
        validate_entry_path(&entry_path)?;

        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            let target = entry.link_name()?.map(Cow::into_owned).unwrap_or_default();
            validate_link_target(&entry_path, &target, kind.is_symlink())?;
        }

        // `unpack_in` refuses to write through a parent that resolves outside
        // `dest_dir`, so earlier symlink entries cannot redirect later ones.
        if !entry.unpack_in(dest_dir)? {
            return Err(traversal(&entry_path));
        }
        count += 1;
    }
    Ok(count)
}

fn unpack_zip(file: File, dest_dir: &Path) -> Result<usize, ExtractionError> {
    let mut archive = zip::ZipArchive::new(file)?;
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        validate_entry_path(Path::new(entry.name()))?;
    }
    archive.extract(dest_dir)?;
    Ok(archive.len())
}

/// Validate that an entry path does not escape the destination directory
/// via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
    if escapes {
        return Err(traversal(path));
    }
    Ok(())
}

/// Validate that a link entry cannot point outside the destination.
///
/// Hard link targets are archive-root relative. Symlink targets are resolved
/// against the directory holding the link and may climb no higher than the
/// archive root.
fn validate_link_target(
    entry_path: &Path,
    target: &Path,
    is_symlink: bool,
) -> Result<(), ExtractionError> {
    if target.as_os_str().is_empty() || target.is_absolute() {
        return Err(traversal(target));
    }
    let mut depth = if is_symlink {
        entry_path.parent().map_or(0, |parent| {
            parent
                .components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .count()
        })
    } else {
        0
    };
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                depth = depth.checked_sub(1).ok_or_else(|| traversal(target))?;
            }
            Component::RootDir | Component::Prefix(_) => return Err(traversal(target)),
        }
    }
    Ok(())
}

fn traversal(path: &Path) -> ExtractionError {
    ExtractionError::PathTraversal {
        path: path.display().to_string(),
    }
}

/// Expand every archive at the top level of `staging_dir` and delete it.
///
/// Archives are processed in filename order. The first failure stops the
/// run; archives already expanded stay expanded.
///
/// # Errors
///
/// Returns [`ExpansionFailure`] naming the archive that failed, including
/// archives whose format is not supported.
pub fn expand_archives(
    staging_dir: &Utf8Path,
    extractor: &dyn ArchiveExtractor,
    quiet: bool,
    stderr: &mut dyn Write,
) -> Result<usize, ExpansionFailure> {
    let listing_failure = |source: std::io::Error| ExpansionFailure {
        archive: staging_dir.to_owned(),
        source: ExtractionError::Io(source),
    };
    let mut archives = Vec::new();
    for entry in staging_dir.read_dir_utf8().map_err(listing_failure)? {
        let entry = entry.map_err(listing_failure)?;
        if !entry.file_type().map_err(listing_failure)?.is_file() {
            continue;
        }
        let kind = ArchiveKind::from_filename(entry.file_name());
        if kind != ArchiveKind::NotArchive {
            archives.push((entry.path().to_owned(), kind));
        }
    }
    archives.sort_by(|a, b| a.0.cmp(&b.0));

    for (archive, kind) in &archives {
        let fail = |source: ExtractionError| ExpansionFailure {
            archive: archive.clone(),
            source,
        };
        let ArchiveKind::Supported(format) = *kind else {
            return Err(fail(ExtractionError::Unsupported {
                name: archive.file_name().unwrap_or(archive.as_str()).to_owned(),
            }));
        };

        if !quiet {
            write_stderr_line(stderr, format!("Untarring {archive}"));
        }
        let entries = extractor
            .extract(archive.as_std_path(), format, staging_dir.as_std_path())
            .map_err(fail)?;
        debug!("expanded {entries} entries from {archive}");

        if !quiet {
            write_stderr_line(stderr, format!("Deleting archive {archive}"));
        }
        std::fs::remove_file(archive).map_err(|e| fail(ExtractionError::Io(e)))?;
    }
    info!("expanded {} archive(s) in {staging_dir}", archives.len());
    Ok(archives.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;

    fn tar_gz_with(path: &Path, files: &[(&str, &[u8])]) {
        let output = File::create(path).expect("create archive");
        let encoder = flate2::write::GzEncoder::new(output, flate2::Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, *contents)
                .expect("append");
        }
        builder
            .into_inner()
            .expect("tar finish")
            .finish()
            .expect("gzip finish");
    }

    enum TarEntry<'a> {
        File(&'a str, &'a [u8]),
        Symlink(&'a str, &'a Path),
        HardLink(&'a str, &'a Path),
    }

    fn tar_with(path: &Path, entries: &[TarEntry<'_>]) {
        let mut builder = tar::Builder::new(File::create(path).expect("create archive"));
        for entry in entries {
            let mut header = tar::Header::new_gnu();
            header.set_mode(0o644);
            match entry {
                TarEntry::File(name, contents) => {
                    header.set_size(contents.len() as u64);
                    header.set_cksum();
                    builder
                        .append_data(&mut header, name, *contents)
                        .expect("append file");
                }
                TarEntry::Symlink(name, target) | TarEntry::HardLink(name, target) => {
                    let kind = if matches!(entry, TarEntry::Symlink(..)) {
                        tar::EntryType::Symlink
                    } else {
                        tar::EntryType::Link
                    };
                    header.set_entry_type(kind);
                    header.set_size(0);
                    builder
                        .append_link(&mut header, name, target)
                        .expect("append link");
                }
            }
        }
        builder.finish().expect("tar finish");
    }

    fn zip_with(path: &Path, files: &[(&str, &[u8])]) {
        let mut writer = zip::ZipWriter::new(File::create(path).expect("create archive"));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, contents) in files {
            writer.start_file(*name, options).expect("start zip entry");
            writer.write_all(contents).expect("write zip entry");
        }
        writer.finish().expect("zip finish");
    }

    /// A staging directory with a sibling directory that archives must not reach.
    fn staging_with_outside() -> (tempfile::TempDir, Utf8PathBuf, PathBuf) {
        let temp = tempfile::tempdir().expect("temp dir");
        let dir = Utf8PathBuf::try_from(temp.path().join("staging")).expect("UTF-8 path");
        let outside = temp.path().join("outside");
        std::fs::create_dir_all(&dir).expect("staging dir");
        std::fs::create_dir_all(&outside).expect("outside dir");
        (temp, dir, outside)
    }

    fn staging() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
        (temp, path)
    }

    #[rstest]
    #[case::tar("a.tar", ArchiveKind::Supported(ArchiveFormat::Tar))]
    #[case::tgz("a.tgz", ArchiveKind::Supported(ArchiveFormat::TarGz))]
    #[case::tar_gz("A.TAR.GZ", ArchiveKind::Supported(ArchiveFormat::TarGz))]
    #[case::zst("a.tar.zst", ArchiveKind::Supported(ArchiveFormat::TarZstd))]
    #[case::zip("a.zip", ArchiveKind::Supported(ArchiveFormat::Zip))]
    #[case::bz2("a.tar.bz2", ArchiveKind::Unsupported)]
    #[case::text("MANIFEST_1.0_main.txt", ArchiveKind::NotArchive)]
    fn classifies_filenames(#[case] name: &str, #[case] expected: ArchiveKind) {
        assert_eq!(ArchiveKind::from_filename(name), expected);
    }

    #[test]
    fn extracts_real_tar_gz_into_nested_paths() {
        let (_temp, dir) = staging();
        let archive = dir.join("a.tar.gz");
        tar_gz_with(
            archive.as_std_path(),
            &[
                ("data/fam/bcf/gain.fits", &b"gain"[..]),
                ("docs/fam/index.txt", &b"index"[..]),
            ],
        );

        let count = StandardExtractor
            .extract(archive.as_std_path(), ArchiveFormat::TarGz, dir.as_std_path())
            .expect("extract");
        assert_eq!(count, 2);
        assert_eq!(
            std::fs::read(dir.join("data/fam/bcf/gain.fits")).expect("read"),
            b"gain"
        );
    }

    #[test]
    fn extracts_real_tar_zst() {
        let (_temp, dir) = staging();
        let archive = dir.join("b.tar.zst");
        let output = File::create(&archive).expect("create");
        let encoder = zstd::Encoder::new(output, 0).expect("zstd encoder");
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_cksum();
        builder
            .append_data(&mut header, "hello.txt", &b"hello"[..])
            .expect("append");
        builder
            .into_inner()
            .expect("tar finish")
            .finish()
            .expect("zstd finish");

        StandardExtractor
            .extract(archive.as_std_path(), ArchiveFormat::TarZstd, dir.as_std_path())
            .expect("extract");
        assert!(dir.join("hello.txt").exists());
    }

    #[test]
    fn extracts_real_uncompressed_tar() {
        let (_temp, dir) = staging();
        let archive = dir.join("c.tar");
        tar_with(
            archive.as_std_path(),
            &[TarEntry::File("data/fam/bcf/offset.fits", b"offset")],
        );

        let count = StandardExtractor
            .extract(archive.as_std_path(), ArchiveFormat::Tar, dir.as_std_path())
            .expect("extract");
        assert_eq!(count, 1);
        assert_eq!(
            std::fs::read(dir.join("data/fam/bcf/offset.fits")).expect("read"),
            b"offset"
        );
    }

    #[test]
    fn extracts_real_zip() {
        let (_temp, dir) = staging();
        let archive = dir.join("d.zip");
        zip_with(
            archive.as_std_path(),
            &[
                ("data/fam/cpf/qe.fits", &b"qe"[..]),
                ("docs/fam/notes.txt", &b"notes"[..]),
            ],
        );

        let count = StandardExtractor
            .extract(archive.as_std_path(), ArchiveFormat::Zip, dir.as_std_path())
            .expect("extract");
        assert_eq!(count, 2);
        assert_eq!(std::fs::read(dir.join("data/fam/cpf/qe.fits")).expect("read"), b"qe");
        assert!(dir.join("docs/fam/notes.txt").is_file());
    }

    #[test]
    fn zip_entry_climbing_out_is_rejected() {
        let (_temp, dir, outside) = staging_with_outside();
        let archive = dir.join("evil.zip");
        zip_with(
            archive.as_std_path(),
            &[("data/ok.txt", &b"ok"[..]), ("../outside/escape.txt", &b"x"[..])],
        );

        let result =
            StandardExtractor.extract(archive.as_std_path(), ArchiveFormat::Zip, dir.as_std_path());
        assert!(matches!(result, Err(ExtractionError::PathTraversal { .. })));
        assert!(!outside.join("escape.txt").exists());
        assert!(!dir.join("data/ok.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cannot_redirect_later_entries_outside_staging() {
        let (_temp, dir, outside) = staging_with_outside();
        let archive = dir.join("evil.tar");
        tar_with(
            archive.as_std_path(),
            &[
                TarEntry::Symlink("data", &outside),
                TarEntry::File("data/pwned.txt", b"pwned"),
            ],
        );

        let result =
            StandardExtractor.extract(archive.as_std_path(), ArchiveFormat::Tar, dir.as_std_path());
        assert!(matches!(result, Err(ExtractionError::PathTraversal { .. })));
        assert!(!outside.join("pwned.txt").exists());
    }

    #[cfg(unix)]
    #[rstest]
    #[case::relative_symlink(TarEntry::Symlink("data/fam/up", Path::new("../../../outside")))]
    #[case::absolute_hard_link(TarEntry::HardLink("data/copy", Path::new("/etc/hostname")))]
    #[case::climbing_hard_link(TarEntry::HardLink("data/copy", Path::new("../outside/f")))]
    fn links_leaving_staging_are_rejected(#[case] link: TarEntry<'static>) {
        let (_temp, dir, _outside) = staging_with_outside();
        let archive = dir.join("links.tar");
        tar_with(archive.as_std_path(), &[link]);

        let result =
            StandardExtractor.extract(archive.as_std_path(), ArchiveFormat::Tar, dir.as_std_path());
        assert!(matches!(result, Err(ExtractionError::PathTraversal { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_within_staging_are_kept() {
        let (_temp, dir) = staging();
        let archive = dir.join("links.tar");
        tar_with(
            archive.as_std_path(),
            &[
                TarEntry::File("data/fam/bcf/gain.fits", b"gain"),
                TarEntry::Symlink("data/fam/current", Path::new("bcf")),
                TarEntry::Symlink("latest", Path::new("data/fam/bcf")),
            ],
        );

        StandardExtractor
            .extract(archive.as_std_path(), ArchiveFormat::Tar, dir.as_std_path())
            .expect("extract");
        assert_eq!(
            std::fs::read(dir.join("data/fam/current/gain.fits")).expect("read"),
            b"gain"
        );
        assert!(dir.join("latest/gain.fits").is_file());
    }

    #[test]
    fn empty_archive_is_an_error() {
        let (_temp, dir) = staging();
        let archive = dir.join("empty.tar.gz");
        tar_gz_with(archive.as_std_path(), &[]);
        let result =
            StandardExtractor.extract(archive.as_std_path(), ArchiveFormat::TarGz, dir.as_std_path());
        assert!(matches!(result, Err(ExtractionError::EmptyArchive)));
    }

    #[test]
    fn corrupt_archive_is_an_error() {
        let (_temp, dir) = staging();
        let archive = dir.join("broken.tar.gz");
        std::fs::write(&archive, b"definitely not gzip").expect("write");
        let result =
            StandardExtractor.extract(archive.as_std_path(), ArchiveFormat::TarGz, dir.as_std_path());
        assert!(result.is_err());
    }

    #[rstest]
    #[case::parent_dir("../escape.txt")]
    #[case::nested_parent("foo/../../escape.txt")]
    #[case::absolute("/etc/passwd")]
    fn rejects_path_traversal(#[case] bad_path: &str) {
        let result = validate_entry_path(&PathBuf::from(bad_path));
        assert!(
            matches!(result, Err(ExtractionError::PathTraversal { .. })),
            "expected PathTraversal for {bad_path}"
        );
    }

    #[test]
    fn expand_archives_unpacks_and_deletes_only_archives() {
        let (_temp, dir) = staging();
        tar_gz_with(dir.join("a.tar.gz").as_std_path(), &[("data/fam/x.fits", &b"x"[..])]);
        std::fs::write(dir.join("MANIFEST_1.0_main.txt"), b"manifest").expect("write");

        let mut stderr = Vec::new();
        let expanded = expand_archives(&dir, &StandardExtractor, false, &mut stderr).expect("expand");

        assert_eq!(expanded, 1);
        assert!(!dir.join("a.tar.gz").exists());
        assert!(dir.join("data/fam/x.fits").exists());
        assert!(dir.join("MANIFEST_1.0_main.txt").exists());
        assert!(String::from_utf8_lossy(&stderr).contains("Untarring"));
    }

    #[test]
    fn expand_archives_stops_at_first_failure_and_keeps_archive() {
        let (_temp, dir) = staging();
        std::fs::write(dir.join("a.tar"), b"a").expect("write");
        std::fs::write(dir.join("b.tar"), b"b").expect("write");

        let mut extractor = MockArchiveExtractor::new();
        extractor
            .expect_extract()
            .times(1)
            .returning(|_, _, _| Err(ExtractionError::EmptyArchive));

        let mut stderr = Vec::new();
        let failure =
            expand_archives(&dir, &extractor, true, &mut stderr).expect_err("expansion fails");

        assert_eq!(failure.archive, dir.join("a.tar"));
        assert!(dir.join("a.tar").exists());
        assert!(dir.join("b.tar").exists());
    }

    #[test]
    fn unsupported_compression_fails_expansion() {
        let (_temp, dir) = staging();
        std::fs::write(dir.join("caldb.tar.bz2"), b"bz").expect("write");
        let mut extractor = MockArchiveExtractor::new();
        extractor.expect_extract().never();

        let mut stderr = Vec::new();
        let failure =
            expand_archives(&dir, &extractor, true, &mut stderr).expect_err("unsupported");
        assert!(matches!(failure.source, ExtractionError::Unsupported { .. }));
    }
}
