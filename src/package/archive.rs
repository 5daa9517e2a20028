//! Reproducible `.tar.gz` writer.
//!
//! Archive bytes depend only on entry names and file contents: ownership,
//! timestamps and permission bits from the host are all replaced, entries
//! are written in sorted order and the gzip header carries no timestamp or
//! file name.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::{Compression, GzBuilder};
use tracing::warn;
use walkdir::WalkDir;

use crate::staging::mode::{is_executable_path, DIR_MODE, EXEC_MODE, FILE_MODE};

const COMPRESSION_LEVEL: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// One archive member and the path it is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Slash-separated name inside the archive.
    pub name: String,
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl ArchiveEntry {
    /// Mode recorded in the header, derived from the entry's place in the
    /// tree rather than from the host file.
    pub fn mode(&self) -> u32 {
        match self.kind {
            EntryKind::Directory => DIR_MODE,
            EntryKind::File if is_executable_path(Path::new(&self.name)) => EXEC_MODE,
            EntryKind::File => FILE_MODE,
        }
    }
}

/// Metadata stamped on every entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOptions {
    pub mtime: u64,
    /// User and group name; numeric ids are always 0.
    pub owner: String,
}

/// Append every entry under `root` to `entries`, named `<name>/<relative>`.
///
/// `root` itself becomes the entry `name`, so a single file can be added
/// too. Paths in `exclude` are skipped along with everything below them.
/// Anything other than a regular file or directory is an error.
pub fn collect_tree(
    root: &Path,
    name: &str,
    exclude: &[PathBuf],
    entries: &mut Vec<ArchiveEntry>,
) -> Result<()> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !exclude.iter().any(|x| e.path() == x.as_path()));

    for entry in walker {
        let entry = entry.with_context(|| format!("walking '{}'", root.display()))?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("relativizing '{}'", entry.path().display()))?;

        let mut member = name.to_string();
        for component in rel.components() {
            if let Component::Normal(part) = component {
                member.push('/');
                member.push_str(&part.to_string_lossy());
            }
        }

        let file_type = entry.file_type();
        let kind = if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            bail!(
                "cannot archive '{}': only regular files and directories are allowed",
                entry.path().display()
            );
        };

        entries.push(ArchiveEntry {
            name: member,
            path: entry.path().to_path_buf(),
            kind,
        });
    }
    Ok(())
}

/// Write `entries` as a gzip-compressed tar at `out`.
///
/// Entries are sorted by name first. The archive is written beside `out`
/// and renamed into place once complete.
pub fn write_tar_gz(
    entries: &[ArchiveEntry],
    out: &Path,
    options: &ArchiveOptions,
) -> Result<()> {
    let mut sorted: Vec<&ArchiveEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let partial = partial_path(out);
    if let Err(err) = write_stream(&sorted, &partial, options) {
        if let Err(cleanup) = fs::remove_file(&partial) {
            warn!(path = %partial.display(), error = %cleanup, "could not remove partial archive");
        }
        return Err(err.context(format!("writing '{}'", out.display())));
    }

    fs::rename(&partial, out)
        .with_context(|| format!("moving '{}' into place", out.display()))?;
    Ok(())
}

fn write_stream(entries: &[&ArchiveEntry], path: &Path, options: &ArchiveOptions) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating '{}'", path.display()))?;
    let encoder = GzBuilder::new()
        .mtime(0)
        .write(BufWriter::new(file), Compression::new(COMPRESSION_LEVEL));
    let mut builder = tar::Builder::new(encoder);

    for entry in entries {
        append_entry(&mut builder, entry, options)
            .with_context(|| format!("archiving '{}'", entry.path.display()))?;
    }

    let encoder = builder.into_inner().context("finishing tar stream")?;
    let mut writer = encoder.finish().context("finishing gzip stream")?;
    writer.flush()?;
    Ok(())
}

fn append_entry<W: Write>(
    builder: &mut tar::Builder<W>,
    entry: &ArchiveEntry,
    options: &ArchiveOptions,
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_mode(entry.mode());
    header.set_mtime(options.mtime);
    header.set_uid(0);
    header.set_gid(0);
    header.set_username(&options.owner)?;
    header.set_groupname(&options.owner)?;
    header.set_device_major(0)?;
    header.set_device_minor(0)?;

    match entry.kind {
        EntryKind::Directory => {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            header.set_cksum();
            builder.append_data(&mut header, &entry.name, std::io::empty())?;
        }
        EntryKind::File => {
            let file = File::open(&entry.path)?;
            let len = file.metadata()?.len();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(len);
            header.set_cksum();
            builder.append_data(&mut header, &entry.name, file)?;
        }
    }
    Ok(())
}

fn partial_path(out: &Path) -> PathBuf {
    let mut name = out
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    out.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn options() -> ArchiveOptions {
        ArchiveOptions {
            mtime: 1_616_367_257,
            owner: "microkit".to_string(),
        }
    }

    fn sample_tree(root: &Path) {
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::create_dir_all(root.join("board/zcu102/debug/elf")).unwrap();
        fs::write(root.join("bin/microkit"), "tool").unwrap();
        fs::write(root.join("board/zcu102/debug/elf/loader.elf"), "elf").unwrap();
        fs::write(root.join("LICENSE.md"), "license").unwrap();
    }

    fn archive_of(root: &Path, out: &Path) {
        let mut entries = Vec::new();
        collect_tree(root, "sdk", &[], &mut entries).unwrap();
        write_tar_gz(&entries, out, &options()).unwrap();
    }

    #[test]
    fn test_headers_are_normalized() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("tree");
        sample_tree(&root);
        fs::set_permissions(root.join("LICENSE.md"), fs::Permissions::from_mode(0o600)).unwrap();
        let out = temp.path().join("sdk.tar.gz");
        archive_of(&root, &out);

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&out).unwrap()));
        let mut names = Vec::new();
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            let header = entry.header();
            let name = entry.path().unwrap().to_string_lossy().trim_end_matches('/').to_string();

            assert_eq!(header.mtime().unwrap(), 1_616_367_257);
            assert_eq!(header.uid().unwrap(), 0);
            assert_eq!(header.gid().unwrap(), 0);
            assert_eq!(header.username().unwrap(), Some("microkit"));
            assert_eq!(header.groupname().unwrap(), Some("microkit"));

            let expected = match name.as_str() {
                "sdk/bin/microkit" => 0o755,
                "sdk/LICENSE.md" | "sdk/board/zcu102/debug/elf/loader.elf" => 0o644,
                _ => {
                    assert!(header.entry_type().is_dir(), "{name}");
                    0o755
                }
            };
            assert_eq!(header.mode().unwrap(), expected, "{name}");
            names.push(name);
        }

        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(names[0], "sdk");
        assert!(names.contains(&"sdk/bin/microkit".to_string()));
    }

    #[test]
    fn test_gzip_header_has_no_timestamp() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("tree");
        sample_tree(&root);
        let out = temp.path().join("sdk.tar.gz");
        archive_of(&root, &out);

        let bytes = fs::read(&out).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        // no FNAME flag
        assert_eq!(bytes[3] & 0x08, 0);
        assert!(!temp.path().join("sdk.tar.gz.partial").exists());
    }

    #[test]
    fn test_identical_content_gives_identical_bytes() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("first");
        let second = temp.path().join("second");
        sample_tree(&first);
        // Same content, created in another order with different host modes.
        fs::create_dir_all(second.join("board/zcu102/debug/elf")).unwrap();
        fs::write(second.join("LICENSE.md"), "license").unwrap();
        fs::write(second.join("board/zcu102/debug/elf/loader.elf"), "elf").unwrap();
        fs::create_dir_all(second.join("bin")).unwrap();
        fs::write(second.join("bin/microkit"), "tool").unwrap();
        let tool = second.join("bin/microkit");
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o500)).unwrap();

        let a = temp.path().join("a.tar.gz");
        let b = temp.path().join("b.tar.gz");
        archive_of(&first, &a);
        archive_of(&second, &b);
        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
    }

    #[test]
    fn test_symlink_is_rejected() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("tree");
        sample_tree(&root);
        std::os::unix::fs::symlink("LICENSE.md", root.join("COPYING")).unwrap();

        let mut entries = Vec::new();
        let err = collect_tree(&root, "sdk", &[], &mut entries).unwrap_err();
        assert!(err.to_string().contains("COPYING"));
    }

    #[test]
    fn test_excluded_paths_are_skipped() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("tool");
        fs::create_dir_all(root.join("build/x86_64/release")).unwrap();
        fs::write(root.join("build/x86_64/release/microkit"), "bin").unwrap();
        fs::write(root.join("microkit.py"), "py").unwrap();

        let mut entries = Vec::new();
        collect_tree(&root, "src/tool", &[root.join("build")], &mut entries).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["src/tool", "src/tool/microkit.py"]);
    }

    #[test]
    fn test_failed_write_leaves_no_partial_file() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("sdk.tar.gz");
        let entries = vec![ArchiveEntry {
            name: "sdk/gone.elf".to_string(),
            path: temp.path().join("gone.elf"),
            kind: EntryKind::File,
        }];
        let options = ArchiveOptions {
            mtime: 1,
            owner: "microkit".to_string(),
        };

        let err = write_tar_gz(&entries, &out, &options).unwrap_err();
        assert!(format!("{err:#}").contains("gone.elf"));
        assert!(!out.exists());
        assert!(!temp.path().join("sdk.tar.gz.partial").exists());
    }
}
