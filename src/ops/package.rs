//! Packaging a completed environment prefix.
//!
//! The archive name is a pure function of the environment's canonical name;
//! re-packaging an unchanged prefix reproduces the same name and logical
//! content set. The compression backend is injected: the default writes
//! `<name>.tar.zst` alongside a sorted content manifest with per-file
//! hashes.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::core::environment::Environment;
use crate::core::errors::PackagingError;
use crate::util::hash::sha256_file;

/// Archive creation backend.
pub trait ArchiveWriter: Send + Sync {
    /// Compress a directory tree into `dest`.
    fn compress(&self, dir: &Path, dest: &Path) -> Result<()>;
}

/// Default backend: a zstd-compressed tar of the prefix directory.
#[derive(Debug, Clone)]
pub struct TarZstdWriter {
    level: i32,
}

impl TarZstdWriter {
    pub fn new(level: i32) -> Self {
        TarZstdWriter { level }
    }
}

impl ArchiveWriter for TarZstdWriter {
    fn compress(&self, dir: &Path, dest: &Path) -> Result<()> {
        let file = File::create(dest)
            .with_context(|| format!("failed to create archive {}", dest.display()))?;
        let encoder = zstd::Encoder::new(file, self.level)
            .context("failed to initialize zstd encoder")?;

        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);
        let root = dir
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        builder
            .append_dir_all(&root, dir)
            .with_context(|| format!("failed to archive {}", dir.display()))?;

        let encoder = builder
            .into_inner()
            .context("failed to finish tar stream")?;
        encoder.finish().context("failed to finish zstd stream")?;
        Ok(())
    }
}

/// Packages completed environment prefixes.
pub struct Packager<'a> {
    writer: &'a dyn ArchiveWriter,
}

impl<'a> Packager<'a> {
    pub fn new(writer: &'a dyn ArchiveWriter) -> Self {
        Packager { writer }
    }

    /// Archive an environment's prefix tree.
    ///
    /// Only called once every non-best-effort stage of the environment has
    /// reached succeeded or skipped; the stage graph guarantees the
    /// ordering.
    pub fn package(&self, env: &Environment) -> Result<PathBuf, PackagingError> {
        let prefix = env.prefix();
        if !prefix.is_dir() {
            return Err(PackagingError::MissingPrefix {
                environment: env.id().to_string(),
                prefix: prefix.to_path_buf(),
            });
        }

        let archive = env.archive_path();
        let result = (|| -> Result<()> {
            write_manifest(prefix, &manifest_path(&archive))?;
            self.writer.compress(prefix, &archive)
        })();

        match result {
            Ok(()) => {
                tracing::info!(
                    environment = %env.id(),
                    archive = %archive.display(),
                    "packaged prefix"
                );
                Ok(archive)
            }
            Err(source) => Err(PackagingError::Archive {
                environment: env.id().to_string(),
                source,
            }),
        }
    }
}

fn manifest_path(archive: &Path) -> PathBuf {
    archive.with_extension("manifest.json")
}

/// Write the sorted logical content set of a prefix: relative path to
/// content hash, one entry per regular file.
fn write_manifest(prefix: &Path, dest: &Path) -> Result<()> {
    let mut entries: BTreeMap<String, String> = BTreeMap::new();

    for entry in WalkDir::new(prefix).sort_by_file_name() {
        let entry = entry.context("failed to walk prefix tree")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(prefix)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();
        entries.insert(rel, sha256_file(entry.path())?);
    }

    let json = serde_json::to_string_pretty(&entries).context("failed to encode manifest")?;
    crate::util::fs::write_file(dest, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::core::request::BuildRequest;
    use crate::core::EnvironmentSet;
    use crate::test_support::test_config;

    /// Records compress calls and creates an empty archive file.
    #[derive(Default)]
    struct RecordingWriter {
        calls: Mutex<Vec<(PathBuf, PathBuf)>>,
    }

    impl ArchiveWriter for RecordingWriter {
        fn compress(&self, dir: &Path, dest: &Path) -> Result<()> {
            std::fs::write(dest, b"")?;
            self.calls
                .lock()
                .unwrap()
                .push((dir.to_path_buf(), dest.to_path_buf()));
            Ok(())
        }
    }

    fn native_env(dir: &Path) -> Environment {
        let request = BuildRequest {
            build: Some("x86_64-linux-gnu".into()),
            ..BuildRequest::default()
        };
        let set = EnvironmentSet::for_request(&request.resolve().unwrap(), &test_config(dir));
        set.primary().clone()
    }

    #[test]
    fn test_archive_named_by_canonical_name() {
        let tmp = tempfile::TempDir::new().unwrap();
        let env = native_env(tmp.path());
        crate::util::fs::write_file(&env.prefix().join("bin/gcc"), b"elf").unwrap();

        let writer = RecordingWriter::default();
        let archive = Packager::new(&writer).package(&env).unwrap();

        assert_eq!(
            archive.file_name().unwrap().to_string_lossy(),
            "x86_64-linux-gnu-native-gcc15.tar.zst"
        );
    }

    #[test]
    fn test_repackaging_reproduces_name_and_content_set() {
        let tmp = tempfile::TempDir::new().unwrap();
        let env = native_env(tmp.path());
        crate::util::fs::write_file(&env.prefix().join("bin/gcc"), b"elf").unwrap();
        crate::util::fs::write_file(&env.prefix().join("lib64/libstdc++.so.6"), b"so").unwrap();

        let writer = RecordingWriter::default();
        let packager = Packager::new(&writer);

        let first = packager.package(&env).unwrap();
        let manifest_first = std::fs::read_to_string(manifest_path(&first)).unwrap();

        let second = packager.package(&env).unwrap();
        let manifest_second = std::fs::read_to_string(manifest_path(&second)).unwrap();

        assert_eq!(first, second);
        assert_eq!(manifest_first, manifest_second);
    }

    #[test]
    fn test_missing_prefix_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let env = native_env(tmp.path());

        let writer = RecordingWriter::default();
        let err = Packager::new(&writer).package(&env).unwrap_err();
        assert!(matches!(err, PackagingError::MissingPrefix { .. }));
    }

    #[test]
    fn test_tar_zstd_writer_produces_archive() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("tree");
        crate::util::fs::write_file(&dir.join("bin/tool"), b"contents").unwrap();

        let dest = tmp.path().join("tree.tar.zst");
        TarZstdWriter::new(3).compress(&dir, &dest).unwrap();

        let metadata = std::fs::metadata(&dest).unwrap();
        assert!(metadata.len() > 0);
    }
}
