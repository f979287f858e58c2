//! Guarded extraction of key material archives.
//!
//! Test cases ship pre-generated key pairs as a tar archive, optionally
//! gzip compressed. A crafted archive must not be able to write outside
//! the destination directory, and it must not be able to cause partial
//! writes before detection: every entry path is validated in a pre-pass
//! before the first file is materialized, so detection leaves the
//! filesystem untouched.
//!
//! Containment is checked on normalized paths, component by component,
//! not on a common string prefix. Prefix comparison on raw strings
//! mistakes `/dest-evil` for a child of `/dest` and is blind to `..`
//! sequences that only resolve during extraction.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::debug;

//------------ extract -------------------------------------------------------

/// Extracts an archive into a destination directory.
///
/// Every entry is unpacked strictly below `dest`. If any entry would
/// escape the destination, the whole extraction fails before anything is
/// written. Symbolic and hard link entries are refused outright: their
/// targets can escape the destination even when their paths do not.
pub fn extract(archive: &Path, dest: &Path) -> Result<(), ExtractionError> {
    // Validation pre-pass. No write happens before it completes.
    let mut ar = open_archive(archive)?;
    let mut entries = 0usize;
    for entry in ar.entries()? {
        let entry = entry?;
        let path = entry.path()?.into_owned();
        resolve_within(dest, &path)?;
        match entry.header().entry_type() {
            EntryType::Regular | EntryType::Directory => entries += 1,
            EntryType::Symlink | EntryType::Link => {
                return Err(ExtractionError::LinkEntry { entry: path })
            }
            // Metadata entries carry no payload of their own.
            _ => {}
        }
    }

    fs::create_dir_all(dest).map_err(ExtractionError::Io)?;
    let mut ar = open_archive(archive)?;
    for entry in ar.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let target = resolve_within(dest, &path)?;
        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target).map_err(ExtractionError::Io)?;
            }
            EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(ExtractionError::Io)?;
                }
                entry.unpack(&target)?;
            }
            _ => {}
        }
    }
    debug!("extracted {} entries into {}", entries, dest.display());
    Ok(())
}

//------------ Helper Functions ----------------------------------------------

/// Opens an archive, transparently decompressing gzip input.
fn open_archive(
    path: &Path,
) -> Result<Archive<Box<dyn Read>>, ExtractionError> {
    let mut file = File::open(path).map_err(ExtractionError::Io)?;
    let mut magic = [0u8; 2];
    let got = file.read(&mut magic).map_err(ExtractionError::Io)?;
    file.seek(SeekFrom::Start(0)).map_err(ExtractionError::Io)?;
    let reader: Box<dyn Read> = if got == 2 && magic == [0x1f, 0x8b] {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Archive::new(reader))
}

/// Resolves an entry path to its destination below `dest`.
///
/// The entry path is normalized component by component: current
/// directory components disappear, a parent directory component removes
/// the last kept component. An entry that is absolute, or whose parent
/// components climb above the destination root, fails the check. The
/// returned path is the normalized destination and by construction lies
/// below `dest`.
fn resolve_within(
    dest: &Path,
    entry: &Path,
) -> Result<PathBuf, ExtractionError> {
    let mut normalized = PathBuf::new();
    for component in entry.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(ExtractionError::PathTraversal {
                        entry: entry.into(),
                    });
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractionError::PathTraversal {
                    entry: entry.into(),
                })
            }
        }
    }
    Ok(dest.join(normalized))
}

//------------ ExtractionError -----------------------------------------------

/// Extracting an archive failed.
#[derive(Debug)]
pub enum ExtractionError {
    /// Reading the archive or writing an entry gave an error.
    Io(io::Error),

    /// An entry would resolve outside the destination directory.
    PathTraversal {
        /// The offending entry path as stored in the archive.
        entry: PathBuf,
    },

    /// An entry was a symbolic or hard link.
    LinkEntry {
        /// The offending entry path as stored in the archive.
        entry: PathBuf,
    },
}

impl From<io::Error> for ExtractionError {
    fn from(err: io::Error) -> Self {
        ExtractionError::Io(err)
    }
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionError::Io(err) => {
                write!(f, "archive extraction failed: {}", err)
            }
            ExtractionError::PathTraversal { entry } => {
                write!(
                    f,
                    "archive entry '{}' escapes the destination",
                    entry.display()
                )
            }
            ExtractionError::LinkEntry { entry } => {
                write!(
                    f,
                    "archive entry '{}' is a link",
                    entry.display()
                )
            }
        }
    }
}

impl std::error::Error for ExtractionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractionError::Io(err) => Some(err),
            _ => None,
        }
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    /// Builds a tar archive from (path, content) pairs.
    fn build_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            // Write the entry path straight into the GNU name field.
            // `Header::set_path`/`Builder::append_data` reject `..`, which
            // is exactly what these traversal fixtures need to contain.
            let bytes = path.as_bytes();
            header.as_gnu_mut().unwrap().name[..bytes.len()]
                .copy_from_slice(bytes);
            header.set_cksum();
            builder
                .append(&header, io::Cursor::new(content))
                .unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn write_archive(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn extracts_nested_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let data = build_tar(&[
            ("keys/Kexample.+008+11111.key", b"DNSKEY data"),
            ("keys/Kexample.+008+11111.private", b"secret"),
        ]);
        let archive = write_archive(tmp.path(), "keys.tar", &data);
        let dest = tmp.path().join("out");
        extract(&archive, &dest).unwrap();
        assert_eq!(
            fs::read(dest.join("keys/Kexample.+008+11111.key")).unwrap(),
            b"DNSKEY data"
        );
        assert_eq!(
            fs::read(dest.join("keys/Kexample.+008+11111.private"))
                .unwrap(),
            b"secret"
        );
    }

    #[test]
    fn extracts_gzip_compressed_archives() {
        let tmp = tempfile::tempdir().unwrap();
        let tar = build_tar(&[("key.pem", b"pem")]);
        let mut encoder =
            GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar).unwrap();
        let data = encoder.finish().unwrap();
        let archive = write_archive(tmp.path(), "keys.tgz", &data);
        let dest = tmp.path().join("out");
        extract(&archive, &dest).unwrap();
        assert_eq!(fs::read(dest.join("key.pem")).unwrap(), b"pem");
    }

    #[test]
    fn traversal_aborts_before_any_write() {
        let tmp = tempfile::tempdir().unwrap();
        // The benign entry comes first; it still must not be written.
        let data = build_tar(&[
            ("innocent.key", b"fine"),
            ("../../etc/passwd", b"evil"),
        ]);
        let archive = write_archive(tmp.path(), "evil.tar", &data);
        let dest = tmp.path().join("out");
        let err = extract(&archive, &dest).unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::PathTraversal { ref entry }
                if entry == Path::new("../../etc/passwd")
        ));
        // Nothing was written, not even the destination directory.
        assert!(!dest.exists());
    }

    #[test]
    fn inner_parent_components_may_not_climb_out() {
        let tmp = tempfile::tempdir().unwrap();
        let data = build_tar(&[("a/../../b", b"evil")]);
        let archive = write_archive(tmp.path(), "evil.tar", &data);
        let dest = tmp.path().join("out");
        assert!(matches!(
            extract(&archive, &dest),
            Err(ExtractionError::PathTraversal { .. })
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn contained_parent_components_are_fine() {
        let tmp = tempfile::tempdir().unwrap();
        let data = build_tar(&[("a/../b.key", b"data")]);
        let archive = write_archive(tmp.path(), "keys.tar", &data);
        let dest = tmp.path().join("out");
        extract(&archive, &dest).unwrap();
        assert_eq!(fs::read(dest.join("b.key")).unwrap(), b"data");
        assert!(!dest.join("a").exists());
    }

    #[test]
    fn link_entries_are_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        header.set_cksum();
        builder
            .append_link(&mut header, "innocent.key", "../outside")
            .unwrap();
        let data = builder.into_inner().unwrap();
        let archive = write_archive(tmp.path(), "link.tar", &data);
        let dest = tmp.path().join("out");
        assert!(matches!(
            extract(&archive, &dest),
            Err(ExtractionError::LinkEntry { .. })
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn resolve_rejects_absolute_entries() {
        let err = resolve_within(
            Path::new("/tmp/dest"),
            Path::new("/etc/passwd"),
        )
        .unwrap_err();
        assert!(matches!(err, ExtractionError::PathTraversal { .. }));
    }

    #[test]
    fn resolve_normalizes_in_place() {
        let target = resolve_within(
            Path::new("/tmp/dest"),
            Path::new("./keys/./sub/../Kzone.key"),
        )
        .unwrap();
        assert_eq!(target, Path::new("/tmp/dest/keys/Kzone.key"));
    }
}
