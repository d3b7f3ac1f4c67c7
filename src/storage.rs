//! Atomic JSON file persistence shared by the repair store and the backup
//! manager.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

/// Temp file used while a write is in flight. Lives next to the target so the
/// final rename stays on one filesystem.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize `data` to `path` via temp file, fsync and rename. Readers see
/// either the previous file or the new one, never a partial write.
pub fn write_json_atomic<T, P>(path: P, data: &T) -> std::io::Result<()>
where
    T: Serialize + ?Sized,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    let file = File::create(&tmp)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, data)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Read and parse a JSON file. `Ok(None)` when the file does not exist.
pub fn read_json<T, P>(path: P) -> std::io::Result<Option<T>>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let file = match File::open(path.as_ref()) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let value = serde_json::from_reader(BufReader::new(file))?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        value: i32,
    }

    #[test]
    fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.json");
        let data = Sample {
            name: "a".into(),
            value: 1,
        };
        write_json_atomic(&path, &data).unwrap();
        let loaded: Option<Sample> = read_json(&path).unwrap();
        assert_eq!(loaded, Some(data));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<Sample> = read_json(dir.path().join("nope.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("c.json");
        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn interrupted_write_leaves_committed_file_intact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();

        // Process killed after writing part of the temp file, before rename.
        fs::write(temp_path(&path), b"[1, 2, 3, 4").unwrap();

        let loaded: Option<Vec<i32>> = read_json(&path).unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));

        write_json_atomic(&path, &vec![9]).unwrap();
        let loaded: Option<Vec<i32>> = read_json(&path).unwrap();
        assert_eq!(loaded, Some(vec![9]));
    }
}
