//! The shared directory: what this node advertises, serves and downloads into.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use eachare_core::chunk::chunk_range;
use eachare_core::FileEntry;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

#[derive(Debug, thiserror::Error)]
pub enum SharedDirError {
    #[error("invalid file name {0:?}")]
    InvalidName(String),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SharedDirError + '_ {
    move |source| SharedDirError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Fail unless `dir` is an existing, readable directory.
pub fn verify(dir: &Path) -> Result<(), SharedDirError> {
    std::fs::read_dir(dir).map_err(io_err(dir))?;
    Ok(())
}

/// Path of `name` inside `dir`. Names that could escape the directory are rejected.
pub fn resolve(dir: &Path, name: &str) -> Result<PathBuf, SharedDirError> {
    if name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.chars().any(char::is_whitespace)
    {
        return Err(SharedDirError::InvalidName(name.to_string()));
    }
    Ok(dir.join(name))
}

/// Regular files in `dir`, sorted by name. Names that cannot travel on the wire are skipped.
pub async fn list(dir: &Path) -> Result<Vec<FileEntry>, SharedDirError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err(dir))?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err(dir))? {
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            continue;
        }
        files.push(FileEntry {
            name,
            size: meta.len(),
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Bytes of chunk `index` of `name`, or `None` if the file or the chunk does not exist.
pub async fn read_chunk(
    dir: &Path,
    name: &str,
    chunk_size: u64,
    index: u64,
) -> Result<Option<Vec<u8>>, SharedDirError> {
    let path = resolve(dir, name)?;
    let mut file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(&path)(e)),
    };
    let meta = file.metadata().await.map_err(io_err(&path))?;
    if !meta.is_file() {
        return Ok(None);
    }
    let Some(range) = chunk_range(index, meta.len(), chunk_size) else {
        return Ok(None);
    };
    file.seek(SeekFrom::Start(range.start))
        .await
        .map_err(io_err(&path))?;
    let mut buf = vec![0u8; (range.end - range.start) as usize];
    file.read_exact(&mut buf).await.map_err(io_err(&path))?;
    Ok(Some(buf))
}

/// Write `bytes` to `dir/name`, replacing any existing file.
pub async fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, SharedDirError> {
    let path = resolve(dir, name)?;
    tokio::fs::write(&path, bytes).await.map_err(io_err(&path))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_escaping_names() {
        let dir = Path::new("/tmp/shared");
        for bad in ["", ".", "..", "../etc/passwd", "a/b", "a\\b", "two words"] {
            assert!(resolve(dir, bad).is_err(), "{bad:?} accepted");
        }
        assert_eq!(resolve(dir, "notes.txt").unwrap(), dir.join("notes.txt"));
    }

    #[test]
    fn verify_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(verify(dir.path()).is_ok());
        assert!(verify(&dir.path().join("nope")).is_err());
    }

    #[tokio::test]
    async fn lists_regular_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.bin"), [0u8; 10]).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("has space.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let files = list(dir.path()).await.unwrap();
        assert_eq!(
            files,
            vec![
                FileEntry {
                    name: "a.txt".into(),
                    size: 5
                },
                FileEntry {
                    name: "b.bin".into(),
                    size: 10
                },
            ]
        );
    }

    #[tokio::test]
    async fn reads_chunks_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        std::fs::write(dir.path().join("data.bin"), &data).unwrap();

        let first = read_chunk(dir.path(), "data.bin", 300, 0).await.unwrap();
        assert_eq!(first.as_deref(), Some(&data[0..300]));
        let last = read_chunk(dir.path(), "data.bin", 300, 3).await.unwrap();
        assert_eq!(last.as_deref(), Some(&data[900..1000]));
        assert_eq!(read_chunk(dir.path(), "data.bin", 300, 4).await.unwrap(), None);
        assert_eq!(read_chunk(dir.path(), "missing.bin", 300, 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "out.bin", b"first").await.unwrap();
        let path = write_file(dir.path(), "out.bin", b"second").await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"second");
        assert!(write_file(dir.path(), "../out.bin", b"x").await.is_err());
    }
}
