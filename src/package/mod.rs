//! Packaging the finished release tree.
//!
//! Produces `<name>-sdk-<version>.tar.gz` from the release root,
//! `<name>-source-<version>.tar.gz` from the repository sources, and a
//! `sha256sum`-style checksum file covering both.

pub mod archive;

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::SdkConfig;
use crate::layout::ReleaseLayout;

use archive::{collect_tree, write_tar_gz, ArchiveEntry, ArchiveOptions, EntryKind};

/// Repository paths included in the source snapshot, when present.
pub const SOURCE_PATHS: &[&str] = &[
    "LICENSE.md",
    "LICENSES",
    "docs",
    "example",
    "libmicrokit",
    "loader",
    "monitor",
    "tool",
];

/// Build output inside the source paths that never belongs in a snapshot.
pub const SOURCE_EXCLUDES: &[&str] = &["tool/build"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOutputs {
    pub sdk_archive: PathBuf,
    pub source_archive: PathBuf,
    pub checksums: PathBuf,
}

pub struct Packager<'a> {
    config: &'a SdkConfig,
    release: ReleaseLayout,
}

impl<'a> Packager<'a> {
    pub fn new(config: &'a SdkConfig) -> Self {
        Self {
            config,
            release: ReleaseLayout::new(config),
        }
    }

    fn options(&self) -> ArchiveOptions {
        ArchiveOptions {
            mtime: self.config.archive_epoch,
            owner: self.config.name.clone(),
        }
    }

    /// Every entry of the release root, prefixed with its directory name.
    pub fn sdk_entries(&self) -> Result<Vec<ArchiveEntry>> {
        let root = self.release.root();
        if !root.is_dir() {
            bail!("release tree '{}' does not exist", root.display());
        }
        let mut entries = Vec::new();
        collect_tree(&root, &self.release.sdk_dir_name(), &[], &mut entries)?;
        Ok(entries)
    }

    /// The source snapshot: a synthetic top-level directory holding the
    /// repository's source paths.
    pub fn source_entries(&self) -> Result<Vec<ArchiveEntry>> {
        let repo = &self.config.repo_root;
        let prefix = self.release.source_dir_name();
        let exclude: Vec<PathBuf> = SOURCE_EXCLUDES.iter().map(|p| repo.join(p)).collect();

        let mut entries = vec![ArchiveEntry {
            name: prefix.clone(),
            path: repo.clone(),
            kind: EntryKind::Directory,
        }];
        for rel in SOURCE_PATHS {
            let path = repo.join(rel);
            if fs::symlink_metadata(&path).is_err() {
                continue;
            }
            collect_tree(&path, &format!("{prefix}/{rel}"), &exclude, &mut entries)?;
        }
        Ok(entries)
    }

    pub fn package_sdk(&self) -> Result<PathBuf> {
        let out = self.release.sdk_archive();
        let entries = self.sdk_entries()?;
        write_tar_gz(&entries, &out, &self.options())?;
        info!(path = %out.display(), entries = entries.len(), "wrote SDK archive");
        Ok(out)
    }

    pub fn package_source(&self) -> Result<PathBuf> {
        let out = self.release.source_archive();
        let entries = self.source_entries()?;
        write_tar_gz(&entries, &out, &self.options())?;
        info!(path = %out.display(), entries = entries.len(), "wrote source archive");
        Ok(out)
    }

    /// Both archives plus the checksum file.
    pub fn package(&self) -> Result<PackageOutputs> {
        let sdk_archive = self.package_sdk()?;
        let source_archive = self.package_source()?;
        let checksums = self.release.checksum_file();
        write_checksums(&[sdk_archive.as_path(), source_archive.as_path()], &checksums)?;
        Ok(PackageOutputs {
            sdk_archive,
            source_archive,
            checksums,
        })
    }
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// `<digest>  <file name>` per line, as `sha256sum -c` expects when run
/// from the directory holding the archives.
pub fn write_checksums(archives: &[&Path], out: &Path) -> Result<()> {
    let mut text = String::new();
    for archive in archives {
        let digest = sha256_file(archive)?;
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        writeln!(text, "{digest}  {name}")?;
    }
    fs::write(out, text).with_context(|| format!("writing '{}'", out.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn config_in(temp: &TempDir) -> SdkConfig {
        SdkConfig::new(
            temp.path().join("seL4"),
            temp.path().join("repo"),
            PathBuf::from("python3"),
            "x86_64-unknown-linux-musl",
        )
    }

    fn populate(config: &SdkConfig) {
        let root = ReleaseLayout::new(config).root();
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin/microkit"), "tool").unwrap();
        fs::create_dir_all(root.join("doc")).unwrap();
        fs::write(root.join("doc/microkit_user_manual.pdf"), "pdf").unwrap();

        let repo = &config.repo_root;
        fs::create_dir_all(repo.join("tool/build/x86_64-unknown-linux-musl")).unwrap();
        fs::write(repo.join("tool/build/x86_64-unknown-linux-musl/microkit"), "bin").unwrap();
        fs::write(repo.join("tool/microkit.py"), "print()").unwrap();
        fs::create_dir_all(repo.join("loader/src")).unwrap();
        fs::write(repo.join("loader/src/loader.c"), "void main(void);").unwrap();
        fs::write(repo.join("LICENSE.md"), "license").unwrap();
    }

    fn member_names(archive: &Path) -> Vec<String> {
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(archive).unwrap()));
        archive
            .entries()
            .unwrap()
            .map(|e| {
                e.unwrap()
                    .path()
                    .unwrap()
                    .to_string_lossy()
                    .trim_end_matches('/')
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn test_package_writes_both_archives_and_checksums() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        populate(&config);

        let outputs = Packager::new(&config).package().unwrap();
        assert!(outputs.sdk_archive.ends_with("release/microkit-sdk-1.2.6.tar.gz"));
        assert!(outputs.source_archive.ends_with("release/microkit-source-1.2.6.tar.gz"));

        let sums = fs::read_to_string(&outputs.checksums).unwrap();
        let lines: Vec<&str> = sums.lines().collect();
        assert_eq!(lines.len(), 2);
        let sdk_digest = sha256_file(&outputs.sdk_archive).unwrap();
        assert_eq!(lines[0], format!("{sdk_digest}  microkit-sdk-1.2.6.tar.gz"));
        assert!(lines[1].ends_with("  microkit-source-1.2.6.tar.gz"));
    }

    #[test]
    fn test_sdk_archive_is_rooted_at_versioned_dir() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        populate(&config);

        let archive = Packager::new(&config).package_sdk().unwrap();
        let names = member_names(&archive);
        assert_eq!(names[0], "microkit-sdk-1.2.6");
        assert!(names.iter().all(|n| n.starts_with("microkit-sdk-1.2.6")));
        assert!(names.contains(&"microkit-sdk-1.2.6/bin/microkit".to_string()));
    }

    #[test]
    fn test_source_snapshot_skips_build_output() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        populate(&config);

        let archive = Packager::new(&config).package_source().unwrap();
        let names = member_names(&archive);
        assert_eq!(names[0], "microkit-source-1.2.6");
        assert!(names.contains(&"microkit-source-1.2.6/LICENSE.md".to_string()));
        assert!(names.contains(&"microkit-source-1.2.6/tool/microkit.py".to_string()));
        assert!(names.contains(&"microkit-source-1.2.6/loader/src/loader.c".to_string()));
        assert!(!names.iter().any(|n| n.contains("tool/build")));
        assert!(!names.iter().any(|n| n.contains("monitor")));
    }

    #[test]
    fn test_repackaging_is_byte_identical() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        populate(&config);
        let packager = Packager::new(&config);

        let first = sha256_file(&packager.package_sdk().unwrap()).unwrap();
        // Rewriting a file moves its mtime; the archive must not notice.
        let tool = ReleaseLayout::new(&config).tool_path();
        fs::write(&tool, "tool").unwrap();
        let second = sha256_file(&packager.package_sdk().unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_release_tree_fails() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        assert!(Packager::new(&config).package_sdk().is_err());
    }
}
